//! PE optional header structures and decoding
//!
//! Despite the name the optional header is mandatory for images. Its magic
//! selects between the PE32 and PE32+ layouts, which differ in the width of
//! the pointer-sized fields and in whether BaseOfData exists.

use log::debug;
use std::fmt;
use std::io::{Read, Seek};

use crate::pe::coff::join_flags;
use crate::pe::reader::{ByteCursor, PointerWidth};
use crate::pe::{PeError, Result};

/// Optional-header magic, identifying the image flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMagic {
    /// PE32, 32-bit address fields (0x10b)
    Pe32,
    /// ROM image (0x107)
    RomImage,
    /// PE32+, 64-bit address fields (0x20b)
    Pe32Plus,
}

impl ImageMagic {
    /// Map a raw magic value to its image flavor.
    pub fn decode(code: u16) -> Result<Self> {
        match code {
            0x10b => Ok(ImageMagic::Pe32),
            0x107 => Ok(ImageMagic::RomImage),
            0x20b => Ok(ImageMagic::Pe32Plus),
            other => Err(PeError::UnrecognizedMagic(other)),
        }
    }

    /// Width of the pointer-sized fields for this flavor. Only PE32+
    /// widens them to 64 bits.
    pub fn pointer_width(&self) -> PointerWidth {
        match self {
            ImageMagic::Pe32Plus => PointerWidth::Bits64,
            ImageMagic::Pe32 | ImageMagic::RomImage => PointerWidth::Bits32,
        }
    }
}

impl fmt::Display for ImageMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageMagic::Pe32 => write!(f, "PE32"),
            ImageMagic::RomImage => write!(f, "ROM"),
            ImageMagic::Pe32Plus => write!(f, "PE32+"),
        }
    }
}

/// Subsystem required to run an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Unknown,
    Native,
    WindowsGui,
    WindowsCui,
    Os2Cui,
    PosixCui,
    NativeWindows,
    WindowsCeGui,
    EfiApplication,
    EfiBootServiceDriver,
    EfiRuntimeDriver,
    EfiRom,
    Xbox,
}

impl Subsystem {
    /// Map a raw subsystem code to its named constant. Codes 4 and 6 are
    /// unassigned and rejected like any other unknown value.
    pub fn decode(code: u16) -> Result<Self> {
        match code {
            0 => Ok(Subsystem::Unknown),
            1 => Ok(Subsystem::Native),
            2 => Ok(Subsystem::WindowsGui),
            3 => Ok(Subsystem::WindowsCui),
            5 => Ok(Subsystem::Os2Cui),
            7 => Ok(Subsystem::PosixCui),
            8 => Ok(Subsystem::NativeWindows),
            9 => Ok(Subsystem::WindowsCeGui),
            10 => Ok(Subsystem::EfiApplication),
            11 => Ok(Subsystem::EfiBootServiceDriver),
            12 => Ok(Subsystem::EfiRuntimeDriver),
            13 => Ok(Subsystem::EfiRom),
            14 => Ok(Subsystem::Xbox),
            other => Err(PeError::UnrecognizedSubsystem(other)),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::Unknown => "UNKNOWN",
            Subsystem::Native => "NATIVE",
            Subsystem::WindowsGui => "WINDOWS_GUI",
            Subsystem::WindowsCui => "WINDOWS_CUI",
            Subsystem::Os2Cui => "OS2_CUI",
            Subsystem::PosixCui => "POSIX_CUI",
            Subsystem::NativeWindows => "NATIVE_WINDOWS",
            Subsystem::WindowsCeGui => "WINDOWS_CE_GUI",
            Subsystem::EfiApplication => "EFI_APPLICATION",
            Subsystem::EfiBootServiceDriver => "EFI_BOOT_SERVICE_DRIVER",
            Subsystem::EfiRuntimeDriver => "EFI_RUNTIME_DRIVER",
            Subsystem::EfiRom => "EFI_ROM",
            Subsystem::Xbox => "XBOX",
        };
        write!(f, "{}", name)
    }
}

/// DLL characteristic flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DllFlag {
    DynamicBase,
    ForceIntegrity,
    NxCompat,
    NoIsolation,
    NoSeh,
    NoBind,
    WdmDriver,
    TerminalServerAware,
}

impl DllFlag {
    const MASKS: [(u16, DllFlag); 8] = [
        (0x0040, DllFlag::DynamicBase),
        (0x0080, DllFlag::ForceIntegrity),
        (0x0100, DllFlag::NxCompat),
        (0x0200, DllFlag::NoIsolation),
        (0x0400, DllFlag::NoSeh),
        (0x0800, DllFlag::NoBind),
        (0x2000, DllFlag::WdmDriver),
        (0x8000, DllFlag::TerminalServerAware),
    ];

    /// Expand a raw bitmask into the named flags it sets; unknown bits are
    /// ignored, same as the COFF characteristics.
    pub fn decode_set(bits: u16) -> Vec<DllFlag> {
        Self::MASKS
            .iter()
            .filter(|(mask, _)| bits & mask != 0)
            .map(|(_, flag)| *flag)
            .collect()
    }
}

impl fmt::Display for DllFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DllFlag::DynamicBase => "DYNAMIC_BASE",
            DllFlag::ForceIntegrity => "FORCE_INTEGRITY",
            DllFlag::NxCompat => "NX_COMPAT",
            DllFlag::NoIsolation => "NO_ISOLATION",
            DllFlag::NoSeh => "NO_SEH",
            DllFlag::NoBind => "NO_BIND",
            DllFlag::WdmDriver => "WDM_DRIVER",
            DllFlag::TerminalServerAware => "TERMINAL_SERVER_AWARE",
        };
        write!(f, "{}", name)
    }
}

/// Data directory entry
#[derive(Debug, Clone, Copy)]
pub struct DataDirectory {
    /// Virtual address of the table
    pub virtual_address: u32,
    /// Size of the table
    pub size: u32,
}

impl DataDirectory {
    /// Size of a data directory entry in bytes
    pub const SIZE: usize = 8;

    fn read_from<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        Ok(Self {
            virtual_address: cursor.read_u32()?,
            size: cursor.read_u32()?,
        })
    }

    /// Check if this data directory is present (has a non-zero address and size)
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size != 0
    }
}

/// Optional header for a PE32 or PE32+ image
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    /// The state of the image file
    pub magic: ImageMagic,
    /// The major version number of the linker
    pub major_linker_version: u8,
    /// The minor version number of the linker
    pub minor_linker_version: u8,
    /// The size of the code section
    pub size_of_code: u32,
    /// The size of the initialized data section
    pub size_of_initialized_data: u32,
    /// The size of the uninitialized data section
    pub size_of_uninitialized_data: u32,
    /// The address of the entry point
    pub address_of_entry_point: u32,
    /// The address of the beginning of the code section
    pub base_of_code: u32,
    /// The address of the beginning of the data section; not stored in
    /// PE32+ images, recorded as zero there
    pub base_of_data: u32,
    /// The preferred address of the first byte of the image when loaded
    pub image_base: u64,
    /// The alignment of sections loaded in memory
    pub section_alignment: u32,
    /// The alignment of the raw data of sections in the image file
    pub file_alignment: u32,
    /// The major version number of the required OS
    pub major_operating_system_version: u16,
    /// The minor version number of the required OS
    pub minor_operating_system_version: u16,
    /// The major version number of the image
    pub major_image_version: u16,
    /// The minor version number of the image
    pub minor_image_version: u16,
    /// The major version number of the subsystem
    pub major_subsystem_version: u16,
    /// The minor version number of the subsystem
    pub minor_subsystem_version: u16,
    /// The size of the image in bytes
    pub size_of_image: u32,
    /// The combined size of the MS-DOS stub, PE header, and section headers
    pub size_of_headers: u32,
    /// The image file checksum
    pub checksum: u32,
    /// The subsystem required to run this image
    pub subsystem: Subsystem,
    /// DLL characteristics of the image
    pub dll_characteristics: Vec<DllFlag>,
    /// The size of the stack to reserve
    pub size_of_stack_reserve: u64,
    /// The size of the stack to commit
    pub size_of_stack_commit: u64,
    /// The size of the local heap to reserve
    pub size_of_heap_reserve: u64,
    /// The size of the local heap to commit
    pub size_of_heap_commit: u64,
    /// Data directories, as many as the header declares
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    /// Read the optional header at the cursor, including the data-directory
    /// table.
    ///
    /// The magic is read first because it fixes the width of every
    /// pointer-sized field that follows; the width decision is made once
    /// here and threaded through the remaining reads.
    pub fn read_from<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        let magic = ImageMagic::decode(cursor.read_u16()?)?;
        let width = magic.pointer_width();
        debug!("optional header magic: {} ({:?} fields)", magic, width);

        let major_linker_version = cursor.read_u8()?;
        let minor_linker_version = cursor.read_u8()?;
        let size_of_code = cursor.read_u32()?;
        let size_of_initialized_data = cursor.read_u32()?;
        let size_of_uninitialized_data = cursor.read_u32()?;
        let address_of_entry_point = cursor.read_u32()?;
        let base_of_code = cursor.read_u32()?;

        // PE32+ drops BaseOfData; the widened ImageBase takes its place.
        let base_of_data = match width {
            PointerWidth::Bits32 => cursor.read_u32()?,
            PointerWidth::Bits64 => 0,
        };
        let image_base = cursor.read_uint(width)?;

        let section_alignment = cursor.read_u32()?;
        let file_alignment = cursor.read_u32()?;
        let major_operating_system_version = cursor.read_u16()?;
        let minor_operating_system_version = cursor.read_u16()?;
        let major_image_version = cursor.read_u16()?;
        let minor_image_version = cursor.read_u16()?;
        let major_subsystem_version = cursor.read_u16()?;
        let minor_subsystem_version = cursor.read_u16()?;

        // Win32VersionValue, reserved; consumed to keep the cursor aligned
        let _ = cursor.read_u32()?;

        let size_of_image = cursor.read_u32()?;
        let size_of_headers = cursor.read_u32()?;
        let checksum = cursor.read_u32()?;
        let subsystem = Subsystem::decode(cursor.read_u16()?)?;
        let dll_characteristics = DllFlag::decode_set(cursor.read_u16()?);

        let size_of_stack_reserve = cursor.read_uint(width)?;
        let size_of_stack_commit = cursor.read_uint(width)?;
        let size_of_heap_reserve = cursor.read_uint(width)?;
        let size_of_heap_commit = cursor.read_uint(width)?;

        // LoaderFlags, reserved; consumed to keep the cursor aligned
        let _ = cursor.read_u32()?;

        let declared = cursor.read_u32()?;

        // The count is file-controlled; check it against the stream before
        // allocating or reading anything.
        let needed = u64::from(declared) * DataDirectory::SIZE as u64;
        let available = cursor.remaining()?;
        if needed > available {
            return Err(PeError::MalformedDataDirectoryCount { declared, available });
        }

        let mut data_directories = Vec::with_capacity(declared as usize);
        for _ in 0..declared {
            data_directories.push(DataDirectory::read_from(cursor)?);
        }

        Ok(Self {
            magic,
            major_linker_version,
            minor_linker_version,
            size_of_code,
            size_of_initialized_data,
            size_of_uninitialized_data,
            address_of_entry_point,
            base_of_code,
            base_of_data,
            image_base,
            section_alignment,
            file_alignment,
            major_operating_system_version,
            minor_operating_system_version,
            major_image_version,
            minor_image_version,
            major_subsystem_version,
            minor_subsystem_version,
            size_of_image,
            size_of_headers,
            checksum,
            subsystem,
            dll_characteristics,
            size_of_stack_reserve,
            size_of_stack_commit,
            size_of_heap_reserve,
            size_of_heap_commit,
            data_directories,
        })
    }

    /// Get a specific data directory
    pub fn get_data_directory(&self, index: usize) -> Option<&DataDirectory> {
        self.data_directories.get(index)
    }
}

impl fmt::Display for OptionalHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optional header")?;
        writeln!(f, "  Magic:               {}", self.magic)?;
        writeln!(
            f,
            "  Linker version:      {}.{}",
            self.major_linker_version, self.minor_linker_version
        )?;
        writeln!(f, "  Size of code:        0x{:x}", self.size_of_code)?;
        writeln!(f, "  Entry point:         0x{:x}", self.address_of_entry_point)?;
        writeln!(f, "  Base of code:        0x{:x}", self.base_of_code)?;
        if self.magic != ImageMagic::Pe32Plus {
            writeln!(f, "  Base of data:        0x{:x}", self.base_of_data)?;
        }
        writeln!(f, "  Image base:          0x{:x}", self.image_base)?;
        writeln!(f, "  Section alignment:   0x{:x}", self.section_alignment)?;
        writeln!(f, "  File alignment:      0x{:x}", self.file_alignment)?;
        writeln!(
            f,
            "  OS version:          {}.{}",
            self.major_operating_system_version, self.minor_operating_system_version
        )?;
        writeln!(
            f,
            "  Subsystem version:   {}.{}",
            self.major_subsystem_version, self.minor_subsystem_version
        )?;
        writeln!(f, "  Size of image:       0x{:x}", self.size_of_image)?;
        writeln!(f, "  Size of headers:     0x{:x}", self.size_of_headers)?;
        writeln!(f, "  Checksum:            0x{:08x}", self.checksum)?;
        writeln!(f, "  Subsystem:           {}", self.subsystem)?;
        writeln!(
            f,
            "  DLL characteristics: {}",
            join_flags(&self.dll_characteristics)
        )?;
        writeln!(f, "  Stack reserve:       0x{:x}", self.size_of_stack_reserve)?;
        writeln!(f, "  Stack commit:        0x{:x}", self.size_of_stack_commit)?;
        writeln!(f, "  Heap reserve:        0x{:x}", self.size_of_heap_reserve)?;
        writeln!(f, "  Heap commit:         0x{:x}", self.size_of_heap_commit)?;
        writeln!(f, "  Data directories:    {}", self.data_directories.len())?;
        for (index, dir) in self.data_directories.iter().enumerate() {
            writeln!(
                f,
                "    [{:2}] address 0x{:08x} size 0x{:08x}",
                index, dir.virtual_address, dir.size
            )?;
        }
        Ok(())
    }
}

//! COFF file header structures and decoding
//!
//! The COFF header is a fixed 20-byte record following the PE signature.

use std::fmt;
use std::io::{Read, Seek};

use crate::pe::reader::ByteCursor;
use crate::pe::{PeError, Result};

/// Target machine of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineType {
    /// Applicable to any machine (unmanaged PE only)
    Unknown,
    Alpha,
    Alpha64,
    Am33,
    Amd64,
    Arm,
    Arm64,
    ArmNt,
    Ebc,
    I386,
    Ia64,
    LoongArch32,
    LoongArch64,
    M32R,
    Mips16,
    MipsFpu,
    MipsFpu16,
    PowerPc,
    PowerPcFp,
    R4000,
    RiscV32,
    RiscV64,
    RiscV128,
    Sh3,
    Sh3Dsp,
    Sh4,
    Sh5,
    Thumb,
    WceMipsV2,
}

impl MachineType {
    /// Map a raw machine code to its named constant.
    ///
    /// The table is closed: a code outside it means either corruption or an
    /// architecture callers must not silently mishandle, so it is a hard
    /// decode error rather than a catch-all variant.
    pub fn decode(code: u16) -> Result<Self> {
        match code {
            0x0 => Ok(MachineType::Unknown),
            0x184 => Ok(MachineType::Alpha),
            0x284 => Ok(MachineType::Alpha64),
            0x1d3 => Ok(MachineType::Am33),
            0x8664 => Ok(MachineType::Amd64),
            0x1c0 => Ok(MachineType::Arm),
            0xaa64 => Ok(MachineType::Arm64),
            0x1c4 => Ok(MachineType::ArmNt),
            0xebc => Ok(MachineType::Ebc),
            0x14c => Ok(MachineType::I386),
            0x200 => Ok(MachineType::Ia64),
            0x6232 => Ok(MachineType::LoongArch32),
            0x6264 => Ok(MachineType::LoongArch64),
            0x9041 => Ok(MachineType::M32R),
            0x266 => Ok(MachineType::Mips16),
            0x366 => Ok(MachineType::MipsFpu),
            0x466 => Ok(MachineType::MipsFpu16),
            0x1f0 => Ok(MachineType::PowerPc),
            0x1f1 => Ok(MachineType::PowerPcFp),
            0x166 => Ok(MachineType::R4000),
            0x5032 => Ok(MachineType::RiscV32),
            0x5064 => Ok(MachineType::RiscV64),
            0x5128 => Ok(MachineType::RiscV128),
            0x1a2 => Ok(MachineType::Sh3),
            0x1a3 => Ok(MachineType::Sh3Dsp),
            0x1a6 => Ok(MachineType::Sh4),
            0x1a8 => Ok(MachineType::Sh5),
            0x1c2 => Ok(MachineType::Thumb),
            0x169 => Ok(MachineType::WceMipsV2),
            other => Err(PeError::UnrecognizedMachineType(other)),
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MachineType::Unknown => "UNKNOWN",
            MachineType::Alpha => "ALPHA",
            MachineType::Alpha64 => "ALPHA64",
            MachineType::Am33 => "AM33",
            MachineType::Amd64 => "AMD64",
            MachineType::Arm => "ARM",
            MachineType::Arm64 => "ARM64",
            MachineType::ArmNt => "ARMNT",
            MachineType::Ebc => "EBC",
            MachineType::I386 => "I386",
            MachineType::Ia64 => "IA64",
            MachineType::LoongArch32 => "LOONGARCH32",
            MachineType::LoongArch64 => "LOONGARCH64",
            MachineType::M32R => "M32R",
            MachineType::Mips16 => "MIPS16",
            MachineType::MipsFpu => "MIPSFPU",
            MachineType::MipsFpu16 => "MIPSFPU16",
            MachineType::PowerPc => "POWERPC",
            MachineType::PowerPcFp => "POWERPCFP",
            MachineType::R4000 => "R4000",
            MachineType::RiscV32 => "RISCV32",
            MachineType::RiscV64 => "RISCV64",
            MachineType::RiscV128 => "RISCV128",
            MachineType::Sh3 => "SH3",
            MachineType::Sh3Dsp => "SH3DSP",
            MachineType::Sh4 => "SH4",
            MachineType::Sh5 => "SH5",
            MachineType::Thumb => "THUMB",
            MachineType::WceMipsV2 => "WCEMIPSV2",
        };
        write!(f, "{}", name)
    }
}

/// Image characteristic flags from the COFF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoffFlag {
    RelocsStripped,
    ExecutableImage,
    LineNumsStripped,
    LocalSymsStripped,
    AggressiveWsTrim,
    LargeAddressAware,
    BytesReversedLo,
    Machine32Bit,
    DebugStripped,
    RemovableRunFromSwap,
    NetRunFromSwap,
    System,
    Dll,
    UpSystemOnly,
    BytesReversedHi,
}

impl CoffFlag {
    /// Published single-bit masks, in bit order. 0x40 is not assigned.
    const MASKS: [(u16, CoffFlag); 15] = [
        (0x0001, CoffFlag::RelocsStripped),
        (0x0002, CoffFlag::ExecutableImage),
        (0x0004, CoffFlag::LineNumsStripped),
        (0x0008, CoffFlag::LocalSymsStripped),
        (0x0010, CoffFlag::AggressiveWsTrim),
        (0x0020, CoffFlag::LargeAddressAware),
        (0x0080, CoffFlag::BytesReversedLo),
        (0x0100, CoffFlag::Machine32Bit),
        (0x0200, CoffFlag::DebugStripped),
        (0x0400, CoffFlag::RemovableRunFromSwap),
        (0x0800, CoffFlag::NetRunFromSwap),
        (0x1000, CoffFlag::System),
        (0x2000, CoffFlag::Dll),
        (0x4000, CoffFlag::UpSystemOnly),
        (0x8000, CoffFlag::BytesReversedHi),
    ];

    /// Expand a raw bitmask into the named flags it sets.
    ///
    /// Bits outside the published vocabulary are ignored, unlike the strict
    /// single-value decoders.
    pub fn decode_set(bits: u16) -> Vec<CoffFlag> {
        Self::MASKS
            .iter()
            .filter(|(mask, _)| bits & mask != 0)
            .map(|(_, flag)| *flag)
            .collect()
    }
}

impl fmt::Display for CoffFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoffFlag::RelocsStripped => "RELOCS_STRIPPED",
            CoffFlag::ExecutableImage => "EXECUTABLE_IMAGE",
            CoffFlag::LineNumsStripped => "LINE_NUMS_STRIPPED",
            CoffFlag::LocalSymsStripped => "LOCAL_SYMS_STRIPPED",
            CoffFlag::AggressiveWsTrim => "AGGRESSIVE_WS_TRIM",
            CoffFlag::LargeAddressAware => "LARGE_ADDRESS_AWARE",
            CoffFlag::BytesReversedLo => "BYTES_REVERSED_LO",
            CoffFlag::Machine32Bit => "MACHINE_32BIT",
            CoffFlag::DebugStripped => "DEBUG_STRIPPED",
            CoffFlag::RemovableRunFromSwap => "REMOVABLE_RUN_FROM_SWAP",
            CoffFlag::NetRunFromSwap => "NET_RUN_FROM_SWAP",
            CoffFlag::System => "SYSTEM",
            CoffFlag::Dll => "DLL",
            CoffFlag::UpSystemOnly => "UP_SYSTEM_ONLY",
            CoffFlag::BytesReversedHi => "BYTES_REVERSED_HI",
        };
        write!(f, "{}", name)
    }
}

/// COFF File Header
#[derive(Debug, Clone)]
pub struct CoffHeader {
    /// The architecture type of the computer
    pub machine: MachineType,
    /// The number of sections
    pub number_of_sections: u16,
    /// The low 32 bits of the time stamp of the image
    pub time_date_stamp: u32,
    /// The file offset of the COFF symbol table
    pub pointer_to_symbol_table: u32,
    /// The number of symbols in the symbol table
    pub number_of_symbols: u32,
    /// The size of the optional header
    pub size_of_optional_header: u16,
    /// The characteristics of the image
    pub characteristics: Vec<CoffFlag>,
}

impl CoffHeader {
    /// Size of the COFF header in bytes
    pub const SIZE: usize = 20;

    /// Read the fixed 20-byte COFF header at the cursor.
    ///
    /// An enum-decode failure aborts the whole read and propagates
    /// unchanged.
    pub fn read_from<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        Ok(Self {
            machine: MachineType::decode(cursor.read_u16()?)?,
            number_of_sections: cursor.read_u16()?,
            time_date_stamp: cursor.read_u32()?,
            pointer_to_symbol_table: cursor.read_u32()?,
            number_of_symbols: cursor.read_u32()?,
            size_of_optional_header: cursor.read_u16()?,
            characteristics: CoffFlag::decode_set(cursor.read_u16()?),
        })
    }

    /// Whether a given characteristic flag is set.
    pub fn has_characteristic(&self, flag: CoffFlag) -> bool {
        self.characteristics.contains(&flag)
    }
}

impl fmt::Display for CoffHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "COFF header")?;
        writeln!(f, "  Machine:              {}", self.machine)?;
        writeln!(f, "  Sections:             {}", self.number_of_sections)?;
        writeln!(f, "  Timestamp:            0x{:08x}", self.time_date_stamp)?;
        writeln!(f, "  Symbol table:         0x{:08x}", self.pointer_to_symbol_table)?;
        writeln!(f, "  Symbols:              {}", self.number_of_symbols)?;
        writeln!(f, "  Optional header size: {}", self.size_of_optional_header)?;
        writeln!(f, "  Characteristics:      {}", join_flags(&self.characteristics))
    }
}

/// Render a decoded flag set the way the header dump expects.
pub(crate) fn join_flags<T: fmt::Display>(flags: &[T]) -> String {
    flags
        .iter()
        .map(|flag| flag.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

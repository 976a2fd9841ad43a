use peview::pe::*;
use std::io::Cursor;

/// Build a minimal PE image in memory: "MZ" stub, PE header pointer at
/// 0x3c, "PE\0\0" at 0x80, an AMD64 COFF header with 3 sections, and an
/// optional header with the requested flavor and two data directories.
fn synthetic_image(plus: bool) -> Vec<u8> {
    let mut image = vec![0u8; 0x80];
    image[0] = b'M';
    image[1] = b'Z';
    image[0x3c..0x40].copy_from_slice(&0x80u32.to_le_bytes());
    image.extend_from_slice(b"PE\0\0");

    // COFF header
    let optional_size: u16 = if plus { 112 + 16 } else { 96 + 16 };
    image.extend_from_slice(&0x8664u16.to_le_bytes()); // machine: AMD64
    image.extend_from_slice(&3u16.to_le_bytes()); // sections
    image.extend_from_slice(&0x5f6a0000u32.to_le_bytes()); // timestamp
    image.extend_from_slice(&0u32.to_le_bytes()); // symbol table
    image.extend_from_slice(&0u32.to_le_bytes()); // symbol count
    image.extend_from_slice(&optional_size.to_le_bytes());
    image.extend_from_slice(&0x0022u16.to_le_bytes()); // EXECUTABLE_IMAGE | LARGE_ADDRESS_AWARE

    // Optional header
    let magic: u16 = if plus { 0x20b } else { 0x10b };
    image.extend_from_slice(&magic.to_le_bytes());
    image.push(14); // linker major
    image.push(0); // linker minor
    image.extend_from_slice(&0x800u32.to_le_bytes()); // size of code
    image.extend_from_slice(&0x600u32.to_le_bytes()); // initialized data
    image.extend_from_slice(&0u32.to_le_bytes()); // uninitialized data
    image.extend_from_slice(&0x1200u32.to_le_bytes()); // entry point
    image.extend_from_slice(&0x1000u32.to_le_bytes()); // base of code
    if plus {
        image.extend_from_slice(&0x140000000u64.to_le_bytes()); // image base
    } else {
        image.extend_from_slice(&0x2000u32.to_le_bytes()); // base of data
        image.extend_from_slice(&0x400000u32.to_le_bytes()); // image base
    }
    image.extend_from_slice(&0x1000u32.to_le_bytes()); // section alignment
    image.extend_from_slice(&0x200u32.to_le_bytes()); // file alignment
    image.extend_from_slice(&6u16.to_le_bytes()); // os major
    image.extend_from_slice(&0u16.to_le_bytes()); // os minor
    image.extend_from_slice(&0u16.to_le_bytes()); // image major
    image.extend_from_slice(&0u16.to_le_bytes()); // image minor
    image.extend_from_slice(&6u16.to_le_bytes()); // subsystem major
    image.extend_from_slice(&0u16.to_le_bytes()); // subsystem minor
    image.extend_from_slice(&0u32.to_le_bytes()); // win32 version value
    image.extend_from_slice(&0x6000u32.to_le_bytes()); // size of image
    image.extend_from_slice(&0x400u32.to_le_bytes()); // size of headers
    image.extend_from_slice(&0u32.to_le_bytes()); // checksum
    image.extend_from_slice(&3u16.to_le_bytes()); // subsystem: console
    image.extend_from_slice(&0x0100u16.to_le_bytes()); // NX_COMPAT
    if plus {
        image.extend_from_slice(&0x100000u64.to_le_bytes()); // stack reserve
        image.extend_from_slice(&0x1000u64.to_le_bytes()); // stack commit
        image.extend_from_slice(&0x100000u64.to_le_bytes()); // heap reserve
        image.extend_from_slice(&0x1000u64.to_le_bytes()); // heap commit
    } else {
        image.extend_from_slice(&0x100000u32.to_le_bytes());
        image.extend_from_slice(&0x1000u32.to_le_bytes());
        image.extend_from_slice(&0x100000u32.to_le_bytes());
        image.extend_from_slice(&0x1000u32.to_le_bytes());
    }
    image.extend_from_slice(&0u32.to_le_bytes()); // loader flags
    image.extend_from_slice(&2u32.to_le_bytes()); // data directory count
    image.extend_from_slice(&0x4000u32.to_le_bytes()); // [0] address
    image.extend_from_slice(&0x80u32.to_le_bytes()); // [0] size
    image.extend_from_slice(&0x4100u32.to_le_bytes()); // [1] address
    image.extend_from_slice(&0x20u32.to_le_bytes()); // [1] size
    image
}

fn decode(image: Vec<u8>) -> Result<PeHeaders> {
    let mut cursor = ByteCursor::new(Cursor::new(image));
    PeHeaders::read_from(&mut cursor)
}

#[test]
fn test_decode_pe32_image() {
    let headers = decode(synthetic_image(false)).expect("synthetic image should decode");

    assert_eq!(headers.coff.machine, MachineType::Amd64, "Machine type mismatch");
    assert_eq!(headers.coff.number_of_sections, 3);
    assert_eq!(headers.coff.time_date_stamp, 0x5f6a0000);
    assert_eq!(headers.coff.characteristics.len(), 2);
    assert!(headers.coff.has_characteristic(CoffFlag::ExecutableImage));
    assert!(headers.coff.has_characteristic(CoffFlag::LargeAddressAware));

    let optional = &headers.optional;
    assert_eq!(optional.magic, ImageMagic::Pe32);
    assert_eq!(optional.address_of_entry_point, 0x1200);
    assert_eq!(optional.base_of_data, 0x2000);
    assert_eq!(optional.image_base, 0x400000);
    assert_eq!(optional.subsystem, Subsystem::WindowsCui);
    assert_eq!(optional.dll_characteristics, vec![DllFlag::NxCompat]);
    assert_eq!(optional.size_of_stack_reserve, 0x100000);

    assert_eq!(optional.data_directories.len(), 2, "Data directory count mismatch");
    assert_eq!(optional.data_directories[0].virtual_address, 0x4000);
    assert_eq!(optional.data_directories[0].size, 0x80);
    assert_eq!(optional.data_directories[1].virtual_address, 0x4100);
    assert_eq!(optional.data_directories[1].size, 0x20);
}

#[test]
fn test_decode_pe32_plus_image() {
    let headers = decode(synthetic_image(true)).expect("synthetic image should decode");

    let optional = &headers.optional;
    assert_eq!(optional.magic, ImageMagic::Pe32Plus);
    // BaseOfData is not stored in PE32+ images
    assert_eq!(optional.base_of_data, 0);
    assert_eq!(optional.image_base, 0x140000000);
    assert_eq!(optional.size_of_stack_reserve, 0x100000);
    assert_eq!(optional.size_of_heap_commit, 0x1000);
    assert_eq!(optional.data_directories.len(), 2);
}

#[test]
fn test_truncation_never_yields_partial_result() {
    let image = synthetic_image(false);
    // Offset just past the data-directory count field; beyond it the
    // count check fires instead of a short read.
    let count_end = image.len() - 2 * 8;

    for length in 0..image.len() {
        let result = decode(image[..length].to_vec());
        match result {
            Err(PeError::TruncatedInput) => assert!(
                length < count_end,
                "TruncatedInput past the count field at length {}",
                length
            ),
            Err(PeError::MalformedDataDirectoryCount { .. }) => assert!(
                length >= count_end,
                "count check fired before the count was read at length {}",
                length
            ),
            other => panic!("length {}: expected a decode error, got {:?}", length, other),
        }
    }
}

#[test]
fn test_unknown_machine_code_carries_value() {
    let mut image = synthetic_image(false);
    image[0x84..0x86].copy_from_slice(&0xbeefu16.to_le_bytes());

    match decode(image) {
        Err(PeError::UnrecognizedMachineType(code)) => assert_eq!(code, 0xbeef),
        other => panic!("Expected UnrecognizedMachineType, got {:?}", other),
    }
}

#[test]
fn test_unknown_subsystem_code_carries_value() {
    let mut image = synthetic_image(false);
    // Subsystem lives 68 bytes into the optional header
    let subsystem_offset = 0x84 + 20 + 68;
    image[subsystem_offset..subsystem_offset + 2].copy_from_slice(&15u16.to_le_bytes());

    match decode(image) {
        Err(PeError::UnrecognizedSubsystem(code)) => assert_eq!(code, 15),
        other => panic!("Expected UnrecognizedSubsystem, got {:?}", other),
    }
}

#[test]
fn test_dump_renders_decoded_values() {
    let headers = decode(synthetic_image(false)).unwrap();
    let dump = headers.to_string();

    assert!(dump.contains("AMD64"));
    assert!(dump.contains("EXECUTABLE_IMAGE | LARGE_ADDRESS_AWARE"));
    assert!(dump.contains("PE32"));
    assert!(dump.contains("WINDOWS_CUI"));
}

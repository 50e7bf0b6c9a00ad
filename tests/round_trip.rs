//! Whole-file invariants: identity edits are byte-exact, fat archives
//! survive a split/pack cycle, and parsed models agree before and after.

use macho_kit::commands::DylibKind;
use macho_kit::consts::{CPU_TYPE_ARM64, CPU_TYPE_X86_64};
use macho_kit::testutil::MachBuilder;
use macho_kit::{Library, MachOEditor, read_file, write_fat};
use similar_asserts::assert_eq;

fn sample_dylib() -> Vec<u8> {
    MachBuilder::new_dylib("/usr/lib/libsample.dylib")
        .link("/usr/lib/libSystem.B.dylib")
        .symbol("_sample_init", 0x1_0000_0f00)
        .build()
}

#[test]
fn reparse_is_stable() {
    let bytes = sample_dylib();
    let first = Library::parse(bytes.clone()).unwrap();
    let second = Library::parse(first.bytes().to_vec()).unwrap();
    assert_eq!(first.header, second.header);
    assert_eq!(first.load_commands, second.load_commands);
    assert_eq!(first.symbols, second.symbols);
    assert_eq!(first.dylibs, second.dylibs);
}

#[test]
fn identity_install_name_edit_is_byte_exact() {
    let bytes = sample_dylib();
    let lib = Library::parse(bytes.clone()).unwrap();
    let renamed = MachOEditor::new(&lib)
        .set_install_name("/usr/lib/libsample.dylib")
        .unwrap();
    assert_eq!(renamed, bytes);
}

#[test]
fn insert_then_remove_restores_bytes() {
    let bytes = sample_dylib();
    let lib = Library::parse(bytes.clone()).unwrap();
    let grown = MachOEditor::new(&lib)
        .insert_dylib_command(DylibKind::Load, "/tmp/extra.dylib")
        .unwrap();
    let grown_lib = Library::parse(grown).unwrap();
    let index = grown_lib
        .load_commands
        .iter()
        .position(|lc| {
            lc.dylib()
                .is_some_and(|d| d.install_name == "/tmp/extra.dylib")
        })
        .unwrap();
    let restored = MachOEditor::new(&grown_lib)
        .remove_load_command(index)
        .unwrap();
    assert_eq!(restored, bytes);
}

#[test]
fn fat_pack_unpack_round_trips() {
    let arm = sample_dylib();
    let file = read_file(&arm).unwrap();
    let mut slices = file.slices;
    // a second architecture: same contents, different declared cpu
    let mut other = slices[0].clone();
    other.arch.cputype = CPU_TYPE_X86_64;
    other.arch.cpusubtype = 3;
    other.bytes[4..8].copy_from_slice(&CPU_TYPE_X86_64.to_le_bytes());
    slices.push(other);
    for slice in &mut slices {
        slice.arch.align = 12;
    }

    let fat = write_fat(&slices).unwrap();
    let reread = read_file(&fat).unwrap();
    assert!(reread.is_fat());
    assert_eq!(reread.slices.len(), 2);
    assert_eq!(reread.slices[0].arch.cputype, CPU_TYPE_ARM64);
    assert_eq!(reread.slices[1].arch.cputype, CPU_TYPE_X86_64);

    // repacking the split slices reproduces the archive byte-for-byte
    assert_eq!(write_fat(&reread.slices).unwrap(), fat);

    // and each embedded slice still parses on its own
    for slice in reread.slices {
        Library::parse_slice(slice).unwrap();
    }
}

#[test]
fn unknown_commands_survive_edits() {
    // 16-byte command with an unassigned cmd code and a recognizable tail
    let mut raw = Vec::new();
    raw.extend_from_slice(&0x6fu32.to_le_bytes());
    raw.extend_from_slice(&16u32.to_le_bytes());
    raw.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x12, 0x34, 0x56, 0x78]);

    let bytes = MachBuilder::new_dylib("/usr/lib/libopaque.dylib")
        .raw_command(raw.clone())
        .build();
    let lib = Library::parse(bytes).unwrap();

    let edited = MachOEditor::new(&lib)
        .set_install_name("/usr/lib/librenamed.dylib")
        .unwrap();
    let new_lib = Library::parse(edited).unwrap();
    let opaque = new_lib
        .load_commands
        .iter()
        .find(|lc| lc.cmd == 0x6f)
        .expect("unknown command still present");
    match &opaque.payload {
        macho_kit::commands::Payload::Unknown(tail) => {
            assert_eq!(tail, &[0xde, 0xad, 0xbe, 0xef, 0x12, 0x34, 0x56, 0x78]);
        }
        other => panic!("expected opaque payload, got {other:?}"),
    }
}

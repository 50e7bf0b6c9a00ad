//! The fixed-layout `loader.h` structures and the decoded load-command
//! model.
//!
//! Each raw struct derives `Pread`/`Pwrite`/`SizeWith` so a single
//! definition is both the parse schema and the assemble schema; endianness
//! is supplied as the scroll context at the call site.

use crate::consts::*;
use crate::errors::{Error, Result};
use crate::view::{ByteView, fixed_name};
use scroll::{Pread, Pwrite, SizeWith};

// usr/include/mach-o/loader.h
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawMachHeader {
    pub magic: u32,
    pub cputype: i32,
    pub cpusubtype: i32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
}

pub const MACH_HEADER_SIZE_32: usize = 28;
// The 64-bit header appends a reserved word
pub const MACH_HEADER_SIZE_64: usize = 32;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawSegmentCommand32 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u32,
    pub vmsize: u32,
    pub fileoff: u32,
    pub filesize: u32,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

pub const SEGMENT_COMMAND_SIZE_32: usize = 56;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawSegmentCommand64 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

pub const SEGMENT_COMMAND_SIZE_64: usize = 72;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawSection32 {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u32,
    pub size: u32,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

pub const SECTION_SIZE_32: usize = 68;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawSection64 {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

pub const SECTION_SIZE_64: usize = 80;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawSymtabCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

pub const SYMTAB_COMMAND_SIZE: usize = 24;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawDysymtabCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoff: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
}

pub const DYSYMTAB_COMMAND_SIZE: usize = 80;

// The pathname lives in the command tail at `name_offset` from the start
// of the load command
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawDylibCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub name_offset: u32,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
}

pub const DYLIB_COMMAND_SIZE: usize = 24;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawDylinkerCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub name_offset: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawUuidCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub uuid: [u8; 16],
}

pub const UUID_COMMAND_SIZE: usize = 24;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawBuildVersionCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub platform: u32,
    pub minos: u32,
    pub sdk: u32,
    pub ntools: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawVersionMinCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub version: u32,
    pub sdk: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawSourceVersionCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub version: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawDyldInfoCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub rebase_off: u32,
    pub rebase_size: u32,
    pub bind_off: u32,
    pub bind_size: u32,
    pub weak_bind_off: u32,
    pub weak_bind_size: u32,
    pub lazy_bind_off: u32,
    pub lazy_bind_size: u32,
    pub export_off: u32,
    pub export_size: u32,
}

pub const DYLD_INFO_COMMAND_SIZE: usize = 48;

// LC_CODE_SIGNATURE, LC_FUNCTION_STARTS, LC_DATA_IN_CODE,
// LC_DYLD_EXPORTS_TRIE, LC_DYLD_CHAINED_FIXUPS, ...
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawLinkeditDataCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub dataoff: u32,
    pub datasize: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawEntryPointCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub entryoff: u64,
    pub stacksize: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawEncryptionInfoCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub cryptoff: u32,
    pub cryptsize: u32,
    pub cryptid: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawNList32 {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: i16,
    pub n_value: u32,
}

pub const NLIST_SIZE_32: usize = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawNList64 {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: i16,
    pub n_value: u64,
}

pub const NLIST_SIZE_64: usize = 16;

/// A section within a segment, with names unpacked from their fixed-width
/// fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub segment_name: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub flags: u32,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DylibKind {
    /// `LC_ID_DYLIB` — the library naming itself
    Id,
    Load,
    LoadWeak,
    Reexport,
    LoadUpward,
    LazyLoad,
}

impl DylibKind {
    pub fn from_cmd(cmd: u32) -> Option<Self> {
        Some(match cmd {
            LC_ID_DYLIB => Self::Id,
            LC_LOAD_DYLIB => Self::Load,
            LC_LOAD_WEAK_DYLIB => Self::LoadWeak,
            LC_REEXPORT_DYLIB => Self::Reexport,
            LC_LOAD_UPWARD_DYLIB => Self::LoadUpward,
            LC_LAZY_LOAD_DYLIB => Self::LazyLoad,
            _ => return None,
        })
    }

    pub fn cmd(self) -> u32 {
        match self {
            Self::Id => LC_ID_DYLIB,
            Self::Load => LC_LOAD_DYLIB,
            Self::LoadWeak => LC_LOAD_WEAK_DYLIB,
            Self::Reexport => LC_REEXPORT_DYLIB,
            Self::LoadUpward => LC_LOAD_UPWARD_DYLIB,
            Self::LazyLoad => LC_LAZY_LOAD_DYLIB,
        }
    }

    pub fn is_import(self) -> bool {
        self != Self::Id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DylibRef {
    pub kind: DylibKind,
    pub install_name: String,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
}

/// The decoded payload of one load command. Anything the toolkit does not
/// model keeps its raw tail so edits round-trip byte-exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Segment(Segment),
    Symtab(RawSymtabCommand),
    Dysymtab(RawDysymtabCommand),
    Dylib(DylibRef),
    Dylinker(String),
    Rpath(String),
    Uuid([u8; 16]),
    BuildVersion {
        platform: u32,
        minos: u32,
        sdk: u32,
        ntools: u32,
    },
    VersionMin {
        platform: u32,
        version: u32,
        sdk: u32,
    },
    SourceVersion(u64),
    DyldInfo(RawDyldInfoCommand),
    LinkeditData {
        dataoff: u32,
        datasize: u32,
    },
    Main {
        entryoff: u64,
        stacksize: u64,
    },
    EncryptionInfo {
        cryptoff: u32,
        cryptsize: u32,
        cryptid: u32,
    },
    LinkerOption(Vec<String>),
    /// Unmodelled command; everything after `cmd`/`cmdsize`, verbatim.
    Unknown(Vec<u8>),
}

/// One load command: the shared `{cmd, cmdsize}` prefix, the file offset it
/// was read from (relative to the slice), and the decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub offset: usize,
    pub payload: Payload,
}

impl LoadCommand {
    pub fn name(&self) -> &'static str {
        lc_name(self.cmd)
    }

    pub fn segment(&self) -> Option<&Segment> {
        match &self.payload {
            Payload::Segment(seg) => Some(seg),
            _ => None,
        }
    }

    pub fn dylib(&self) -> Option<&DylibRef> {
        match &self.payload {
            Payload::Dylib(dylib) => Some(dylib),
            _ => None,
        }
    }
}

/// Decodes the load command starting at `offset`. `cmd`/`cmdsize` have
/// already been read and validated against the command region.
pub fn parse_payload(view: &ByteView<'_>, offset: usize, cmd: u32, cmdsize: u32) -> Result<Payload> {
    let end = offset + cmdsize as usize;
    Ok(match cmd {
        LC_SEGMENT | LC_SEGMENT_64 => Payload::Segment(parse_segment(view, offset, cmd)?),
        LC_SYMTAB => Payload::Symtab(view.read_struct(offset)?),
        LC_DYSYMTAB => Payload::Dysymtab(view.read_struct(offset)?),
        LC_ID_DYLIB | LC_LOAD_DYLIB | LC_LOAD_WEAK_DYLIB | LC_REEXPORT_DYLIB
        | LC_LOAD_UPWARD_DYLIB | LC_LAZY_LOAD_DYLIB => {
            let raw: RawDylibCommand = view.read_struct(offset)?;
            let name_at = offset + raw.name_offset as usize;
            if name_at >= end {
                return Err(Error::MalformedLoadCommands(format!(
                    "dylib name offset {} outside command at {offset}",
                    raw.name_offset
                )));
            }
            Payload::Dylib(DylibRef {
                // The cmd match above makes from_cmd infallible here
                kind: DylibKind::from_cmd(cmd).unwrap(),
                install_name: view.read_cstr(name_at)?,
                timestamp: raw.timestamp,
                current_version: raw.current_version,
                compatibility_version: raw.compatibility_version,
            })
        }
        LC_LOAD_DYLINKER | LC_ID_DYLINKER | LC_DYLD_ENVIRONMENT => {
            let raw: RawDylinkerCommand = view.read_struct(offset)?;
            Payload::Dylinker(view.read_cstr(offset + raw.name_offset as usize)?)
        }
        LC_RPATH => {
            let raw: RawDylinkerCommand = view.read_struct(offset)?;
            Payload::Rpath(view.read_cstr(offset + raw.name_offset as usize)?)
        }
        LC_UUID => {
            let raw: RawUuidCommand = view.read_struct(offset)?;
            Payload::Uuid(raw.uuid)
        }
        LC_BUILD_VERSION => {
            let raw: RawBuildVersionCommand = view.read_struct(offset)?;
            Payload::BuildVersion {
                platform: raw.platform,
                minos: raw.minos,
                sdk: raw.sdk,
                ntools: raw.ntools,
            }
        }
        LC_VERSION_MIN_MACOSX | LC_VERSION_MIN_IPHONEOS | LC_VERSION_MIN_TVOS
        | LC_VERSION_MIN_WATCHOS => {
            let raw: RawVersionMinCommand = view.read_struct(offset)?;
            Payload::VersionMin {
                platform: match cmd {
                    LC_VERSION_MIN_MACOSX => PLATFORM_MACOS,
                    LC_VERSION_MIN_IPHONEOS => PLATFORM_IOS,
                    LC_VERSION_MIN_TVOS => PLATFORM_TVOS,
                    _ => PLATFORM_WATCHOS,
                },
                version: raw.version,
                sdk: raw.sdk,
            }
        }
        LC_SOURCE_VERSION => {
            let raw: RawSourceVersionCommand = view.read_struct(offset)?;
            Payload::SourceVersion(raw.version)
        }
        LC_DYLD_INFO | LC_DYLD_INFO_ONLY => Payload::DyldInfo(view.read_struct(offset)?),
        LC_CODE_SIGNATURE | LC_SEGMENT_SPLIT_INFO | LC_FUNCTION_STARTS | LC_DATA_IN_CODE
        | LC_DYLIB_CODE_SIGN_DRS | LC_LINKER_OPTIMIZATION_HINT | LC_DYLD_EXPORTS_TRIE
        | LC_DYLD_CHAINED_FIXUPS => {
            let raw: RawLinkeditDataCommand = view.read_struct(offset)?;
            Payload::LinkeditData {
                dataoff: raw.dataoff,
                datasize: raw.datasize,
            }
        }
        LC_MAIN => {
            let raw: RawEntryPointCommand = view.read_struct(offset)?;
            Payload::Main {
                entryoff: raw.entryoff,
                stacksize: raw.stacksize,
            }
        }
        LC_ENCRYPTION_INFO | LC_ENCRYPTION_INFO_64 => {
            let raw: RawEncryptionInfoCommand = view.read_struct(offset)?;
            Payload::EncryptionInfo {
                cryptoff: raw.cryptoff,
                cryptsize: raw.cryptsize,
                cryptid: raw.cryptid,
            }
        }
        LC_LINKER_OPTION => {
            let count = view.read_u32(offset + 8)?;
            let mut strings = Vec::with_capacity(count as usize);
            let mut at = offset + 12;
            for _ in 0..count {
                if at >= end {
                    break;
                }
                let s = view.read_cstr(at)?;
                at += s.len() + 1;
                strings.push(s);
            }
            Payload::LinkerOption(strings)
        }
        _ => Payload::Unknown(view.read_bytes(offset + 8, cmdsize as usize - 8)?.to_vec()),
    })
}

fn parse_segment(view: &ByteView<'_>, offset: usize, cmd: u32) -> Result<Segment> {
    let cmdsize = view.read_u32(offset + 4)? as usize;
    let (mut segment, nsects, mut at, sect_size) = if cmd == LC_SEGMENT_64 {
        let raw: RawSegmentCommand64 = view.read_struct(offset)?;
        (
            Segment {
                name: fixed_name(&raw.segname),
                vmaddr: raw.vmaddr,
                vmsize: raw.vmsize,
                fileoff: raw.fileoff,
                filesize: raw.filesize,
                maxprot: raw.maxprot,
                initprot: raw.initprot,
                flags: raw.flags,
                sections: Vec::new(),
            },
            raw.nsects,
            offset + SEGMENT_COMMAND_SIZE_64,
            SECTION_SIZE_64,
        )
    } else {
        let raw: RawSegmentCommand32 = view.read_struct(offset)?;
        (
            Segment {
                name: fixed_name(&raw.segname),
                vmaddr: u64::from(raw.vmaddr),
                vmsize: u64::from(raw.vmsize),
                fileoff: u64::from(raw.fileoff),
                filesize: u64::from(raw.filesize),
                maxprot: raw.maxprot,
                initprot: raw.initprot,
                flags: raw.flags,
                sections: Vec::new(),
            },
            raw.nsects,
            offset + SEGMENT_COMMAND_SIZE_32,
            SECTION_SIZE_32,
        )
    };

    let fixed = at - offset;
    if fixed + nsects as usize * sect_size > cmdsize {
        return Err(Error::MalformedLoadCommands(format!(
            "segment {} declares {nsects} sections but cmdsize is {cmdsize}",
            segment.name
        )));
    }

    segment.sections.reserve(nsects as usize);
    for _ in 0..nsects {
        if cmd == LC_SEGMENT_64 {
            let raw: RawSection64 = view.read_struct(at)?;
            segment.sections.push(Section {
                name: fixed_name(&raw.sectname),
                segment_name: fixed_name(&raw.segname),
                addr: raw.addr,
                size: raw.size,
                offset: raw.offset,
                align: raw.align,
                reloff: raw.reloff,
                nreloc: raw.nreloc,
                flags: raw.flags,
                reserved1: raw.reserved1,
                reserved2: raw.reserved2,
            });
        } else {
            let raw: RawSection32 = view.read_struct(at)?;
            segment.sections.push(Section {
                name: fixed_name(&raw.sectname),
                segment_name: fixed_name(&raw.segname),
                addr: u64::from(raw.addr),
                size: u64::from(raw.size),
                offset: raw.offset,
                align: raw.align,
                reloff: raw.reloff,
                nreloc: raw.nreloc,
                flags: raw.flags,
                reserved1: raw.reserved1,
                reserved2: raw.reserved2,
            });
        }
        at += sect_size;
    }
    Ok(segment)
}

/// Assembles a complete `dylib_command` with its trailing pathname, padded
/// with NULs to pointer alignment as the linker does.
pub fn assemble_dylib_command(
    cmd: u32,
    install_name: &str,
    timestamp: u32,
    current_version: u32,
    compatibility_version: u32,
    ctx: crate::view::MachCtx,
) -> Vec<u8> {
    let name = crate::view::padded_cstring(install_name, ctx.ptr_size() as usize);
    let cmdsize = (DYLIB_COMMAND_SIZE + name.len()) as u32;
    let mut bytes = vec![0u8; cmdsize as usize];
    bytes
        .pwrite_with(
            RawDylibCommand {
                cmd,
                cmdsize,
                name_offset: DYLIB_COMMAND_SIZE as u32,
                timestamp,
                current_version,
                compatibility_version,
            },
            0,
            ctx.endian,
        )
        .unwrap();
    bytes[DYLIB_COMMAND_SIZE..].copy_from_slice(&name);
    bytes
}

pub fn lc_name(cmd: u32) -> &'static str {
    match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        LC_ID_DYLINKER => "LC_ID_DYLINKER",
        LC_SUB_FRAMEWORK => "LC_SUB_FRAMEWORK",
        LC_SUB_CLIENT => "LC_SUB_CLIENT",
        LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        LC_ROUTINES_64 => "LC_ROUTINES_64",
        LC_UUID => "LC_UUID",
        LC_RPATH => "LC_RPATH",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        LC_SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO",
        LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
        LC_LAZY_LOAD_DYLIB => "LC_LAZY_LOAD_DYLIB",
        LC_ENCRYPTION_INFO => "LC_ENCRYPTION_INFO",
        LC_DYLD_INFO => "LC_DYLD_INFO",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        LC_LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        LC_DYLD_ENVIRONMENT => "LC_DYLD_ENVIRONMENT",
        LC_MAIN => "LC_MAIN",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        LC_DYLIB_CODE_SIGN_DRS => "LC_DYLIB_CODE_SIGN_DRS",
        LC_ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64",
        LC_LINKER_OPTION => "LC_LINKER_OPTION",
        LC_LINKER_OPTIMIZATION_HINT => "LC_LINKER_OPTIMIZATION_HINT",
        LC_VERSION_MIN_TVOS => "LC_VERSION_MIN_TVOS",
        LC_VERSION_MIN_WATCHOS => "LC_VERSION_MIN_WATCHOS",
        LC_NOTE => "LC_NOTE",
        LC_BUILD_VERSION => "LC_BUILD_VERSION",
        LC_DYLD_EXPORTS_TRIE => "LC_DYLD_EXPORTS_TRIE",
        LC_DYLD_CHAINED_FIXUPS => "LC_DYLD_CHAINED_FIXUPS",
        _ => "LC_UNKNOWN",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use scroll::{LE, Pwrite};

    #[test]
    fn struct_round_trip() {
        let symtab = RawSymtabCommand {
            cmd: LC_SYMTAB,
            cmdsize: SYMTAB_COMMAND_SIZE as u32,
            symoff: 0x4000,
            nsyms: 12,
            stroff: 0x4400,
            strsize: 0x200,
        };
        let mut buf = [0u8; SYMTAB_COMMAND_SIZE];
        buf.pwrite_with(symtab, 0, LE).unwrap();
        let view = ByteView::new(&buf, LE);
        let parsed: RawSymtabCommand = view.read_struct(0).unwrap();
        assert_eq!(parsed, symtab);
    }

    #[test]
    fn segment_names_are_trimmed() {
        let mut segname = [0u8; 16];
        segname[..6].copy_from_slice(b"__TEXT");
        let raw = RawSegmentCommand64 {
            cmd: LC_SEGMENT_64,
            cmdsize: SEGMENT_COMMAND_SIZE_64 as u32,
            segname,
            vmaddr: 0x1_0000_0000,
            vmsize: 0x4000,
            fileoff: 0,
            filesize: 0x4000,
            maxprot: 5,
            initprot: 5,
            nsects: 0,
            flags: 0,
        };
        let mut buf = [0u8; SEGMENT_COMMAND_SIZE_64];
        buf.pwrite_with(raw, 0, LE).unwrap();
        let view = ByteView::new(&buf, LE);
        let seg = parse_segment(&view, 0, LC_SEGMENT_64).unwrap();
        assert_eq!(seg.name, "__TEXT");
        assert_eq!(seg.vmaddr, 0x1_0000_0000);
    }

    #[test]
    fn dylib_name_resolution() {
        let raw = RawDylibCommand {
            cmd: LC_LOAD_DYLIB,
            cmdsize: 48,
            name_offset: DYLIB_COMMAND_SIZE as u32,
            timestamp: 2,
            current_version: 0x0001_0000,
            compatibility_version: 0x0001_0000,
        };
        let mut buf = vec![0u8; 48];
        buf.pwrite_with(raw, 0, LE).unwrap();
        buf[DYLIB_COMMAND_SIZE..DYLIB_COMMAND_SIZE + 18].copy_from_slice(b"/usr/lib/libz.1.dy");
        buf[DYLIB_COMMAND_SIZE + 18..DYLIB_COMMAND_SIZE + 22].copy_from_slice(b"lib\0");
        let view = ByteView::new(&buf, LE);
        let payload = parse_payload(&view, 0, LC_LOAD_DYLIB, 48).unwrap();
        match payload {
            Payload::Dylib(dylib) => {
                assert_eq!(dylib.install_name, "/usr/lib/libz.1.dylib");
                assert_eq!(dylib.kind, DylibKind::Load);
            }
            other => panic!("expected dylib payload, got {other:?}"),
        }
    }
}

//! Synthesizes small, valid Mach-O images for the test suite.
//!
//! Not part of the supported API; it exists so both unit and integration
//! tests can build fixtures instead of carrying binary blobs.

use crate::commands::*;
use crate::consts::*;
use crate::view::MachCtx;
use scroll::{LE, Pwrite};

pub const TEXT_VM: u64 = 0x1_0000_0000;
pub const DATA_VM: u64 = 0x1_0000_1000;
pub const LINKEDIT_VM: u64 = 0x1_0000_2000;
pub const TEXT_SECTION_OFFSET: u32 = 0xf00;
pub const DATA_FILEOFF: u64 = 0x1000;
pub const LINKEDIT_FILEOFF: u64 = 0x2000;

/// Builds a minimal 64-bit little-endian Mach-O image:
/// `__TEXT` (one `__text` section), an optional `__DATA` segment with
/// caller-provided sections, and a `__LINKEDIT` segment holding the bind
/// streams, export trie and symbol table.
pub struct MachBuilder {
    filetype: u32,
    install_name: Option<String>,
    dylibs: Vec<(u32, String)>,
    uuid: [u8; 16],
    platform: u32,
    minos: u32,
    sdk: u32,
    data_sections: Vec<(String, Vec<u8>)>,
    bind_stream: Vec<u8>,
    weak_stream: Vec<u8>,
    lazy_stream: Vec<u8>,
    export_trie: Vec<u8>,
    symbols: Vec<(String, u64)>,
    extra_commands: Vec<Vec<u8>>,
}

impl MachBuilder {
    pub fn new_dylib(install_name: &str) -> Self {
        let mut uuid = [0u8; 16];
        for (i, byte) in uuid.iter_mut().enumerate() {
            *byte = (i as u8) * 0x11;
        }
        Self {
            filetype: MH_DYLIB,
            install_name: Some(install_name.to_string()),
            dylibs: Vec::new(),
            uuid,
            platform: PLATFORM_MACOS,
            minos: 0x000d_0000,
            sdk: 0x000e_0000,
            data_sections: Vec::new(),
            bind_stream: Vec::new(),
            weak_stream: Vec::new(),
            lazy_stream: Vec::new(),
            export_trie: Vec::new(),
            symbols: Vec::new(),
            extra_commands: Vec::new(),
        }
    }

    pub fn new_executable() -> Self {
        let mut builder = Self::new_dylib("");
        builder.filetype = MH_EXECUTE;
        builder.install_name = None;
        builder
    }

    pub fn link(mut self, install_name: &str) -> Self {
        self.dylibs.push((LC_LOAD_DYLIB, install_name.to_string()));
        self
    }

    pub fn link_weak(mut self, install_name: &str) -> Self {
        self.dylibs
            .push((LC_LOAD_WEAK_DYLIB, install_name.to_string()));
        self
    }

    pub fn data_section(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.data_sections.push((name.to_string(), bytes));
        self
    }

    pub fn bind_stream(mut self, stream: Vec<u8>) -> Self {
        self.bind_stream = stream;
        self
    }

    pub fn lazy_stream(mut self, stream: Vec<u8>) -> Self {
        self.lazy_stream = stream;
        self
    }

    pub fn export_trie(mut self, trie: Vec<u8>) -> Self {
        self.export_trie = trie;
        self
    }

    pub fn symbol(mut self, name: &str, addr: u64) -> Self {
        self.symbols.push((name.to_string(), addr));
        self
    }

    pub fn raw_command(mut self, bytes: Vec<u8>) -> Self {
        self.extra_commands.push(bytes);
        self
    }

    /// The VM address a `__DATA` section added by `data_section` ends up
    /// at, given the sections registered before it.
    pub fn data_addr_of(&self, index: usize) -> u64 {
        let mut cursor = 0u64;
        for (i, (_, bytes)) in self.data_sections.iter().enumerate() {
            if i == index {
                break;
            }
            cursor += (bytes.len() as u64).div_ceil(8) * 8;
        }
        DATA_VM + cursor
    }

    pub fn build(&self) -> Vec<u8> {
        let ctx = MachCtx::new(LE, true);

        // __LINKEDIT payload layout: binds, weak, lazy, exports, nlists,
        // string table
        let mut linkedit = Vec::new();
        let place = |linkedit: &mut Vec<u8>, chunk: &[u8]| {
            let at = LINKEDIT_FILEOFF as usize + linkedit.len();
            linkedit.extend_from_slice(chunk);
            (at as u32, chunk.len() as u32)
        };
        let (bind_off, bind_size) = place(&mut linkedit, &self.bind_stream);
        let (weak_off, weak_size) = place(&mut linkedit, &self.weak_stream);
        let (lazy_off, lazy_size) = place(&mut linkedit, &self.lazy_stream);
        let (export_off, export_size) = place(&mut linkedit, &self.export_trie);

        let mut nlists = Vec::new();
        let mut strtab = vec![0u8];
        for (name, addr) in &self.symbols {
            let strx = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            let mut entry = [0u8; NLIST_SIZE_64];
            entry
                .pwrite_with(
                    RawNList64 {
                        n_strx: strx,
                        n_type: N_SECT | N_EXT,
                        n_sect: 1,
                        n_desc: 0,
                        n_value: *addr,
                    },
                    0,
                    LE,
                )
                .unwrap();
            nlists.extend_from_slice(&entry);
        }
        let (symoff, _) = place(&mut linkedit, &nlists);
        let (stroff, strsize) = place(&mut linkedit, &strtab);
        assert!(linkedit.len() <= 0x1000, "linkedit payload too large");

        // __DATA contents
        let mut data_bytes = vec![0u8; 0x1000];
        let mut data_sections = Vec::new();
        let mut cursor = 0usize;
        for (name, bytes) in &self.data_sections {
            data_bytes[cursor..cursor + bytes.len()].copy_from_slice(bytes);
            data_sections.push((name.clone(), DATA_VM + cursor as u64, bytes.len() as u64));
            cursor += bytes.len().div_ceil(8) * 8;
        }
        let has_data = !self.data_sections.is_empty();

        // Load commands
        let mut lcs: Vec<Vec<u8>> = Vec::new();

        lcs.push(assemble_segment(
            "__TEXT",
            TEXT_VM,
            0x1000,
            0,
            0x1000,
            5,
            5,
            &[(
                "__text".to_string(),
                TEXT_VM + u64::from(TEXT_SECTION_OFFSET),
                0x100,
            )],
            |_| u64::from(TEXT_SECTION_OFFSET),
        ));
        if has_data {
            lcs.push(assemble_segment(
                "__DATA",
                DATA_VM,
                0x1000,
                DATA_FILEOFF,
                0x1000,
                7,
                3,
                &data_sections,
                |addr| DATA_FILEOFF + (addr - DATA_VM),
            ));
        }
        lcs.push(assemble_segment(
            "__LINKEDIT",
            LINKEDIT_VM,
            0x1000,
            LINKEDIT_FILEOFF,
            linkedit.len() as u64,
            1,
            1,
            &[],
            |_| 0,
        ));

        if let Some(name) = &self.install_name {
            lcs.push(assemble_dylib_command(
                LC_ID_DYLIB,
                name,
                2,
                0x0001_0000,
                0x0001_0000,
                ctx,
            ));
        }
        for (cmd, name) in &self.dylibs {
            lcs.push(assemble_dylib_command(
                *cmd,
                name,
                2,
                0x0001_0000,
                0x0001_0000,
                ctx,
            ));
        }

        let mut uuid_lc = vec![0u8; UUID_COMMAND_SIZE];
        uuid_lc
            .pwrite_with(
                RawUuidCommand {
                    cmd: LC_UUID,
                    cmdsize: UUID_COMMAND_SIZE as u32,
                    uuid: self.uuid,
                },
                0,
                LE,
            )
            .unwrap();
        lcs.push(uuid_lc);

        let mut build_lc = vec![0u8; 24];
        build_lc
            .pwrite_with(
                RawBuildVersionCommand {
                    cmd: LC_BUILD_VERSION,
                    cmdsize: 24,
                    platform: self.platform,
                    minos: self.minos,
                    sdk: self.sdk,
                    ntools: 0,
                },
                0,
                LE,
            )
            .unwrap();
        lcs.push(build_lc);

        let mut symtab_lc = vec![0u8; SYMTAB_COMMAND_SIZE];
        symtab_lc
            .pwrite_with(
                RawSymtabCommand {
                    cmd: LC_SYMTAB,
                    cmdsize: SYMTAB_COMMAND_SIZE as u32,
                    symoff,
                    nsyms: self.symbols.len() as u32,
                    stroff,
                    strsize,
                },
                0,
                LE,
            )
            .unwrap();
        lcs.push(symtab_lc);

        let has_dyld_info = bind_size > 0 || weak_size > 0 || lazy_size > 0 || export_size > 0;
        if has_dyld_info {
            let mut info_lc = vec![0u8; DYLD_INFO_COMMAND_SIZE];
            info_lc
                .pwrite_with(
                    RawDyldInfoCommand {
                        cmd: LC_DYLD_INFO_ONLY,
                        cmdsize: DYLD_INFO_COMMAND_SIZE as u32,
                        rebase_off: 0,
                        rebase_size: 0,
                        bind_off: if bind_size > 0 { bind_off } else { 0 },
                        bind_size,
                        weak_bind_off: if weak_size > 0 { weak_off } else { 0 },
                        weak_bind_size: weak_size,
                        lazy_bind_off: if lazy_size > 0 { lazy_off } else { 0 },
                        lazy_bind_size: lazy_size,
                        export_off: if export_size > 0 { export_off } else { 0 },
                        export_size,
                    },
                    0,
                    LE,
                )
                .unwrap();
            lcs.push(info_lc);
        }
        lcs.extend(self.extra_commands.iter().cloned());

        let sizeofcmds: usize = lcs.iter().map(Vec::len).sum();
        let ncmds = lcs.len() as u32;
        let lc_end = MACH_HEADER_SIZE_64 + sizeofcmds;
        assert!(
            lc_end <= TEXT_SECTION_OFFSET as usize,
            "load commands overflow the header area"
        );

        let mut file = vec![0u8; LINKEDIT_FILEOFF as usize + linkedit.len()];
        file.pwrite_with(
            RawMachHeader {
                magic: MH_MAGIC_64,
                cputype: CPU_TYPE_ARM64,
                cpusubtype: 0,
                filetype: self.filetype,
                ncmds,
                sizeofcmds: sizeofcmds as u32,
                flags: 0x0010_0085,
            },
            0,
            LE,
        )
        .unwrap();
        let mut at = MACH_HEADER_SIZE_64;
        for lc in &lcs {
            file[at..at + lc.len()].copy_from_slice(lc);
            at += lc.len();
        }
        if has_data {
            file[DATA_FILEOFF as usize..DATA_FILEOFF as usize + 0x1000]
                .copy_from_slice(&data_bytes);
        }
        file[LINKEDIT_FILEOFF as usize..].copy_from_slice(&linkedit);
        file
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble_segment(
    name: &str,
    vmaddr: u64,
    vmsize: u64,
    fileoff: u64,
    filesize: u64,
    maxprot: i32,
    initprot: i32,
    sections: &[(String, u64, u64)],
    offset_of: impl Fn(u64) -> u64,
) -> Vec<u8> {
    let cmdsize = SEGMENT_COMMAND_SIZE_64 + sections.len() * SECTION_SIZE_64;
    let mut bytes = vec![0u8; cmdsize];
    bytes
        .pwrite_with(
            RawSegmentCommand64 {
                cmd: LC_SEGMENT_64,
                cmdsize: cmdsize as u32,
                segname: fixed_bytes(name),
                vmaddr,
                vmsize,
                fileoff,
                filesize,
                maxprot,
                initprot,
                nsects: sections.len() as u32,
                flags: 0,
            },
            0,
            LE,
        )
        .unwrap();
    let mut at = SEGMENT_COMMAND_SIZE_64;
    for (sect_name, addr, size) in sections {
        bytes
            .pwrite_with(
                RawSection64 {
                    sectname: fixed_bytes(sect_name),
                    segname: fixed_bytes(name),
                    addr: *addr,
                    size: *size,
                    offset: offset_of(*addr) as u32,
                    align: 3,
                    reloff: 0,
                    nreloc: 0,
                    flags: 0,
                    reserved1: 0,
                    reserved2: 0,
                    reserved3: 0,
                },
                at,
                LE,
            )
            .unwrap();
        at += SECTION_SIZE_64;
    }
    bytes
}

fn fixed_bytes(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let len = name.len().min(16);
    out[..len].copy_from_slice(&name.as_bytes()[..len]);
    out
}

//! The queryable composition of one parsed slice: header, load commands,
//! segment map, symbols, bind tables, exports and imports.

use crate::bind::{BindStreamKind, BindTable, decode_bind_stream};
use crate::commands::{DylibKind, LoadCommand, Payload, Section, Segment};
use crate::consts::*;
use crate::errors::{Error, Result};
use crate::exports::{Export, parse_export_trie};
use crate::fat::{FatArch, Slice};
use crate::header::{MachHeader, parse_header};
use crate::segments::SegmentMap;
use crate::symbols::{SymbolEntry, parse_symbol_table};
use crate::view::{ByteView, MachCtx};

/// One `LC_LOAD_*_DYLIB` entry. `ordinal` is the 1-based position among
/// dylib-loading commands, matching what bind opcodes refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct DylibImport {
    pub install_name: String,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
    pub kind: DylibKind,
    pub ordinal: u32,
}

impl DylibImport {
    pub fn weak(&self) -> bool {
        self.kind == DylibKind::LoadWeak
    }
}

/// A fully parsed slice. Owns its bytes; read-only once built — edits go
/// through [`crate::edit::MachOEditor`], which produces new bytes.
#[derive(Debug, Clone)]
pub struct Library {
    bytes: Vec<u8>,
    pub arch: FatArch,
    pub ctx: MachCtx,
    pub header: MachHeader,
    pub load_commands: Vec<LoadCommand>,
    pub segments: Vec<Segment>,
    pub segment_map: SegmentMap,
    pub symbols: Vec<SymbolEntry>,
    pub binds: BindTable,
    pub weak_binds: BindTable,
    pub lazy_binds: BindTable,
    pub exports: Vec<Export>,
    pub dylibs: Vec<DylibImport>,
    pub install_name: Option<String>,
    pub uuid: Option<[u8; 16]>,
    pub platform: Option<u32>,
    pub minos: Option<u32>,
    pub sdk: Option<u32>,
    pub source_version: Option<u64>,
    pub entry_offset: Option<u64>,
}

impl Library {
    /// Parses a whole thin file. For fat inputs split with
    /// [`crate::fat::read_file`] first and use [`Library::parse_slice`].
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        let file = crate::fat::read_file(&bytes)?;
        if file.is_fat() {
            return Err(Error::UnsupportedEdit(
                "input is a fat archive; pick a slice first".into(),
            ));
        }
        let mut slices = file.slices;
        Self::parse_slice(slices.remove(0))
    }

    pub fn parse_slice(slice: Slice) -> Result<Self> {
        let Slice { bytes, arch } = slice;
        let (header, ctx, load_commands) = parse_header(&bytes)?;
        let view = ByteView::new(&bytes, ctx.endian);

        let segments: Vec<Segment> = load_commands
            .iter()
            .filter_map(|lc| lc.segment().cloned())
            .collect();
        let segment_map = SegmentMap::new(&segments);

        let mut dylibs = Vec::new();
        let mut install_name = None;
        let mut uuid = None;
        let mut platform = None;
        let mut minos = None;
        let mut sdk = None;
        let mut source_version = None;
        let mut entry_offset = None;
        let mut symtab = None;
        let mut dyld_info = None;
        let mut exports_trie_cmd = None;

        let mut next_ordinal = 1u32;
        for lc in &load_commands {
            match &lc.payload {
                Payload::Dylib(dylib) if dylib.kind.is_import() => {
                    dylibs.push(DylibImport {
                        install_name: dylib.install_name.clone(),
                        timestamp: dylib.timestamp,
                        current_version: dylib.current_version,
                        compatibility_version: dylib.compatibility_version,
                        kind: dylib.kind,
                        ordinal: next_ordinal,
                    });
                    next_ordinal += 1;
                }
                Payload::Dylib(dylib) => install_name = Some(dylib.install_name.clone()),
                Payload::Uuid(id) => uuid = Some(*id),
                Payload::BuildVersion {
                    platform: p,
                    minos: m,
                    sdk: s,
                    ..
                } => {
                    platform = Some(*p);
                    minos = Some(*m);
                    sdk = Some(*s);
                }
                Payload::VersionMin {
                    platform: p,
                    version,
                    sdk: s,
                } => {
                    // LC_BUILD_VERSION wins when both are present
                    if platform.is_none() {
                        platform = Some(*p);
                        minos = Some(*version);
                        sdk = Some(*s);
                    }
                }
                Payload::SourceVersion(v) => source_version = Some(*v),
                Payload::Main { entryoff, .. } => entry_offset = Some(*entryoff),
                Payload::Symtab(raw) => symtab = Some(*raw),
                Payload::DyldInfo(raw) => dyld_info = Some(*raw),
                Payload::LinkeditData { dataoff, datasize } if lc.cmd == LC_DYLD_EXPORTS_TRIE => {
                    exports_trie_cmd = Some((*dataoff, *datasize));
                }
                _ => {}
            }
        }

        let symbols = match &symtab {
            Some(raw) => parse_symbol_table(&view, ctx, raw)?,
            None => Vec::new(),
        };

        let mut binds = BindTable::default();
        let mut weak_binds = BindTable::default();
        let mut lazy_binds = BindTable::default();
        let mut exports = Vec::new();
        if let Some(info) = &dyld_info {
            let stream = |off: u32, size: u32| view.read_bytes(off as usize, size as usize);
            if info.bind_size > 0 {
                binds = decode_bind_stream(
                    stream(info.bind_off, info.bind_size)?,
                    &segments,
                    ctx,
                    BindStreamKind::Bind,
                )?;
            }
            if info.weak_bind_size > 0 {
                weak_binds = decode_bind_stream(
                    stream(info.weak_bind_off, info.weak_bind_size)?,
                    &segments,
                    ctx,
                    BindStreamKind::WeakBind,
                )?;
            }
            if info.lazy_bind_size > 0 {
                lazy_binds = decode_bind_stream(
                    stream(info.lazy_bind_off, info.lazy_bind_size)?,
                    &segments,
                    ctx,
                    BindStreamKind::LazyBind,
                )?;
            }
            if info.export_size > 0 {
                exports = parse_export_trie(stream(info.export_off, info.export_size)?)?;
            }
        }
        if let Some((dataoff, datasize)) = exports_trie_cmd {
            if datasize > 0 {
                exports = parse_export_trie(view.read_bytes(dataoff as usize, datasize as usize)?)?;
            }
        }

        Ok(Library {
            arch,
            ctx,
            header,
            load_commands,
            segments,
            segment_map,
            symbols,
            binds,
            weak_binds,
            lazy_binds,
            exports,
            dylibs,
            install_name,
            uuid,
            platform,
            minos,
            sdk,
            source_version,
            entry_offset,
            bytes,
        })
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn view(&self) -> ByteView<'_> {
        ByteView::new(&self.bytes, self.ctx.endian)
    }

    /// The name a host would report for this image: its install name for a
    /// dylib, otherwise the filetype.
    pub fn name(&self) -> &str {
        self.install_name
            .as_deref()
            .unwrap_or_else(|| filetype_name(self.header.filetype))
    }

    pub fn find_section(&self, segment_name: &str, section_name: &str) -> Option<&Section> {
        self.segments
            .iter()
            .filter(|seg| seg.name == segment_name)
            .flat_map(|seg| &seg.sections)
            .find(|sect| sect.name == section_name)
    }

    /// Locates a section by name in any `__DATA`-like segment, the way the
    /// Objective-C metadata sections move between `__DATA`, `__DATA_CONST`
    /// and `__DATA_DIRTY`.
    pub fn find_data_section(&self, section_name: &str) -> Option<&Section> {
        self.segments
            .iter()
            .filter(|seg| seg.name.starts_with("__DATA"))
            .flat_map(|seg| &seg.sections)
            .find(|sect| sect.name == section_name)
    }

    /// Reads `len` bytes at a virtual address.
    pub fn vm_read(&self, vaddr: u64, len: usize) -> Result<&[u8]> {
        let file_off = self.segment_map.vm_to_file(vaddr)?;
        self.view().read_bytes(file_off as usize, len)
    }

    /// Reads a pointer-sized word at a virtual address.
    pub fn vm_ptr(&self, vaddr: u64) -> Result<u64> {
        let file_off = self.segment_map.vm_to_file(vaddr)?;
        self.view().read_ptr(file_off as usize, self.ctx)
    }

    pub fn vm_u32(&self, vaddr: u64) -> Result<u32> {
        let file_off = self.segment_map.vm_to_file(vaddr)?;
        self.view().read_u32(file_off as usize)
    }

    /// Reads a NUL-terminated string at a virtual address.
    pub fn vm_cstr(&self, vaddr: u64) -> Result<String> {
        let file_off = self.segment_map.vm_to_file(vaddr)?;
        self.view().read_cstr(file_off as usize)
    }

    /// Index of the load command with the given `cmd`, if present.
    pub fn find_command(&self, cmd: u32) -> Option<usize> {
        self.load_commands.iter().position(|lc| lc.cmd == cmd)
    }
}

//! Byte-level Mach-O rewriting.
//!
//! Every operation is transactional: it reads the parsed [`Library`],
//! builds a fresh byte vector, and never touches the input. Re-parse the
//! result to keep editing.

use crate::commands::{
    DylibKind, Payload, RawDysymtabCommand, RawEncryptionInfoCommand, RawLinkeditDataCommand,
    RawDyldInfoCommand, RawSection32, RawSection64, RawSegmentCommand32, RawSegmentCommand64,
    RawSymtabCommand, SECTION_SIZE_32, SECTION_SIZE_64, SEGMENT_COMMAND_SIZE_32,
    SEGMENT_COMMAND_SIZE_64, assemble_dylib_command,
};
use crate::consts::{LC_ID_DYLIB, LC_SEGMENT_64};
use crate::errors::{Error, Result};
use crate::header::first_content_offset;
use crate::library::Library;
use scroll::{Pread, Pwrite};

/// Template metadata for freshly inserted dylib commands, matching what
/// the linker stamps: timestamp 2, versions 1.0.0.
const NEW_DYLIB_TIMESTAMP: u32 = 2;
const NEW_DYLIB_VERSION: u32 = 0x0001_0000;

pub struct MachOEditor<'a> {
    lib: &'a Library,
}

impl<'a> MachOEditor<'a> {
    pub fn new(lib: &'a Library) -> Self {
        Self { lib }
    }

    fn header_size(&self) -> usize {
        self.lib.header.size(self.lib.ctx)
    }

    fn lc_end(&self) -> usize {
        self.header_size() + self.lib.header.sizeofcmds as usize
    }

    /// File offset where mapped content begins; the load commands may only
    /// grow up to here.
    fn content_start(&self) -> u64 {
        first_content_offset(self.lib.bytes().len(), &self.lib.load_commands)
    }

    /// Splices a fully assembled load command into the list at `index`
    /// (append when `None`), updating `ncmds` and `sizeofcmds`.
    pub fn insert_load_command(&self, raw: Vec<u8>, index: Option<usize>) -> Result<Vec<u8>> {
        if raw.len() < 8 {
            return Err(Error::UnsupportedEdit(format!(
                "load command of {} bytes has no header",
                raw.len()
            )));
        }
        let declared: u32 = raw.pread_with(4, self.lib.ctx.endian)?;
        if declared as usize != raw.len() {
            return Err(Error::UnsupportedEdit(format!(
                "cmdsize {declared} does not match the {} assembled bytes",
                raw.len()
            )));
        }

        let commands = &self.lib.load_commands;
        let index = index.unwrap_or(commands.len());
        if index > commands.len() {
            return Err(Error::UnsupportedEdit(format!(
                "insertion index {index} past the {} existing commands",
                commands.len()
            )));
        }
        let splice_at = commands
            .get(index)
            .map(|lc| lc.offset)
            .unwrap_or_else(|| self.lc_end());

        let new_sizeofcmds = self.lib.header.sizeofcmds as u64 + raw.len() as u64;
        self.check_fits(new_sizeofcmds)?;

        let mut bytes = self.lib.bytes().to_vec();
        let lc_end = self.lc_end();
        // shift the commands after the insertion point into the padding
        bytes.copy_within(splice_at..lc_end, splice_at + raw.len());
        bytes[splice_at..splice_at + raw.len()].copy_from_slice(&raw);
        self.write_counts(
            &mut bytes,
            self.lib.header.ncmds + 1,
            new_sizeofcmds as u32,
        )?;
        Ok(bytes)
    }

    /// Removes the load command at `index`, shifting the rest left and
    /// zero-filling the freed tail.
    pub fn remove_load_command(&self, index: usize) -> Result<Vec<u8>> {
        let lc = self.lib.load_commands.get(index).ok_or_else(|| {
            Error::UnsupportedEdit(format!(
                "remove index {index} past the {} existing commands",
                self.lib.load_commands.len()
            ))
        })?;
        let removed = lc.cmdsize as usize;
        let start = lc.offset;
        let lc_end = self.lc_end();

        let mut bytes = self.lib.bytes().to_vec();
        bytes.copy_within(start + removed..lc_end, start);
        bytes[lc_end - removed..lc_end].fill(0);
        self.write_counts(
            &mut bytes,
            self.lib.header.ncmds - 1,
            self.lib.header.sizeofcmds - removed as u32,
        )?;
        Ok(bytes)
    }

    /// Adds a `LC_LOAD_*_DYLIB` command referencing `install_name`,
    /// appended after the existing dylib commands.
    pub fn insert_dylib_command(&self, kind: DylibKind, install_name: &str) -> Result<Vec<u8>> {
        if kind == DylibKind::Id {
            return Err(Error::UnsupportedEdit(
                "use set_install_name to change LC_ID_DYLIB".into(),
            ));
        }
        let raw = assemble_dylib_command(
            kind.cmd(),
            install_name,
            NEW_DYLIB_TIMESTAMP,
            NEW_DYLIB_VERSION,
            NEW_DYLIB_VERSION,
            self.lib.ctx,
        );
        // keep the new command adjacent to its siblings so ordinals stay
        // contiguous
        let index = self
            .lib
            .load_commands
            .iter()
            .rposition(|lc| lc.dylib().is_some())
            .map(|at| at + 1);
        self.insert_load_command(raw, index)
    }

    /// Replaces the `LC_ID_DYLIB` pathname, inheriting the original
    /// command's timestamp and version fields.
    pub fn set_install_name(&self, install_name: &str) -> Result<Vec<u8>> {
        let index = self.lib.find_command(LC_ID_DYLIB).ok_or_else(|| {
            Error::UnsupportedEdit("image has no LC_ID_DYLIB to rename".into())
        })?;
        let lc = &self.lib.load_commands[index];
        let dylib = lc.dylib().ok_or_else(|| {
            Error::UnsupportedEdit("LC_ID_DYLIB did not parse as a dylib command".into())
        })?;

        let raw = assemble_dylib_command(
            LC_ID_DYLIB,
            install_name,
            dylib.timestamp,
            dylib.current_version,
            dylib.compatibility_version,
            self.lib.ctx,
        );

        let old_size = lc.cmdsize as usize;
        let start = lc.offset;
        let lc_end = self.lc_end();
        let new_sizeofcmds = self.lib.header.sizeofcmds as u64 + raw.len() as u64 - old_size as u64;
        self.check_fits(new_sizeofcmds)?;

        let mut bytes = self.lib.bytes().to_vec();
        let tail = bytes[start + old_size..lc_end].to_vec();
        bytes[start..start + raw.len()].copy_from_slice(&raw);
        bytes[start + raw.len()..start + raw.len() + tail.len()].copy_from_slice(&tail);
        if raw.len() < old_size {
            let new_end = lc_end - (old_size - raw.len());
            bytes[new_end..lc_end].fill(0);
        }
        self.write_counts(&mut bytes, self.lib.header.ncmds, new_sizeofcmds as u32)?;
        Ok(bytes)
    }

    /// Opens up `extra` bytes of padding between the load commands and the
    /// first mapped content by shifting every file offset in the image
    /// forward in a single pass.
    pub fn add_header_padding(&self, extra: u32) -> Result<Vec<u8>> {
        let endian = self.lib.ctx.endian;
        let threshold = self.lc_end() as u64;
        let extra64 = u64::from(extra);
        let shift32 = |value: u32| -> u32 {
            if u64::from(value) >= threshold && value != 0 {
                value + extra
            } else {
                value
            }
        };
        let shift64 = |value: u64| -> u64 {
            if value >= threshold && value != 0 {
                value + extra64
            } else {
                value
            }
        };

        let old = self.lib.bytes();
        let mut bytes = Vec::with_capacity(old.len() + extra as usize);
        bytes.extend_from_slice(&old[..threshold as usize]);
        bytes.resize(threshold as usize + extra as usize, 0);
        bytes.extend_from_slice(&old[threshold as usize..]);

        for lc in &self.lib.load_commands {
            let at = lc.offset;
            match &lc.payload {
                Payload::Segment(_) if lc.cmd == LC_SEGMENT_64 => {
                    let mut raw: RawSegmentCommand64 = old.pread_with(at, endian)?;
                    let grows = raw.fileoff <= threshold
                        && threshold < raw.fileoff + raw.filesize.max(1);
                    raw.fileoff = shift64(raw.fileoff);
                    if grows {
                        raw.filesize += extra64;
                        raw.vmsize += extra64;
                    }
                    bytes.pwrite_with(raw, at, endian)?;
                    for sect in 0..raw.nsects as usize {
                        let sect_at = at + SEGMENT_COMMAND_SIZE_64 + sect * SECTION_SIZE_64;
                        let mut raw_sect: RawSection64 = old.pread_with(sect_at, endian)?;
                        raw_sect.offset = shift32(raw_sect.offset);
                        raw_sect.reloff = shift32(raw_sect.reloff);
                        bytes.pwrite_with(raw_sect, sect_at, endian)?;
                    }
                }
                Payload::Segment(_) => {
                    let mut raw: RawSegmentCommand32 = old.pread_with(at, endian)?;
                    let grows = u64::from(raw.fileoff) <= threshold
                        && threshold < u64::from(raw.fileoff) + u64::from(raw.filesize.max(1));
                    raw.fileoff = shift32(raw.fileoff);
                    if grows {
                        raw.filesize += extra;
                        raw.vmsize += extra;
                    }
                    bytes.pwrite_with(raw, at, endian)?;
                    for sect in 0..raw.nsects as usize {
                        let sect_at = at + SEGMENT_COMMAND_SIZE_32 + sect * SECTION_SIZE_32;
                        let mut raw_sect: RawSection32 = old.pread_with(sect_at, endian)?;
                        raw_sect.offset = shift32(raw_sect.offset);
                        raw_sect.reloff = shift32(raw_sect.reloff);
                        bytes.pwrite_with(raw_sect, sect_at, endian)?;
                    }
                }
                Payload::Symtab(_) => {
                    let mut raw: RawSymtabCommand = old.pread_with(at, endian)?;
                    raw.symoff = shift32(raw.symoff);
                    raw.stroff = shift32(raw.stroff);
                    bytes.pwrite_with(raw, at, endian)?;
                }
                Payload::Dysymtab(_) => {
                    let mut raw: RawDysymtabCommand = old.pread_with(at, endian)?;
                    raw.tocoff = shift32(raw.tocoff);
                    raw.modtaboff = shift32(raw.modtaboff);
                    raw.extrefsymoff = shift32(raw.extrefsymoff);
                    raw.indirectsymoff = shift32(raw.indirectsymoff);
                    raw.extreloff = shift32(raw.extreloff);
                    raw.locreloff = shift32(raw.locreloff);
                    bytes.pwrite_with(raw, at, endian)?;
                }
                Payload::DyldInfo(_) => {
                    let mut raw: RawDyldInfoCommand = old.pread_with(at, endian)?;
                    raw.rebase_off = shift32(raw.rebase_off);
                    raw.bind_off = shift32(raw.bind_off);
                    raw.weak_bind_off = shift32(raw.weak_bind_off);
                    raw.lazy_bind_off = shift32(raw.lazy_bind_off);
                    raw.export_off = shift32(raw.export_off);
                    bytes.pwrite_with(raw, at, endian)?;
                }
                Payload::LinkeditData { .. } => {
                    let mut raw: RawLinkeditDataCommand = old.pread_with(at, endian)?;
                    raw.dataoff = shift32(raw.dataoff);
                    bytes.pwrite_with(raw, at, endian)?;
                }
                Payload::EncryptionInfo { .. } => {
                    let mut raw: RawEncryptionInfoCommand = old.pread_with(at, endian)?;
                    raw.cryptoff = shift32(raw.cryptoff);
                    bytes.pwrite_with(raw, at, endian)?;
                }
                _ => {}
            }
        }
        Ok(bytes)
    }

    fn check_fits(&self, new_sizeofcmds: u64) -> Result<()> {
        let needed = self.header_size() as u64 + new_sizeofcmds;
        let available = self.content_start();
        if needed > available {
            return Err(Error::NoHeaderPadding { needed, available });
        }
        Ok(())
    }

    fn write_counts(&self, bytes: &mut [u8], ncmds: u32, sizeofcmds: u32) -> Result<()> {
        bytes.pwrite_with(ncmds, 16, self.lib.ctx.endian)?;
        bytes.pwrite_with(sizeofcmds, 20, self.lib.ctx.endian)?;
        Ok(())
    }
}

//! The `mach_header[_64]` and the load-command walk.

use crate::commands::{
    LoadCommand, MACH_HEADER_SIZE_32, MACH_HEADER_SIZE_64, Payload, RawMachHeader, parse_payload,
};
use crate::consts::*;
use crate::errors::{Error, Result};
use crate::view::{ByteView, MachCtx};
use scroll::{BE, LE, Pread};

/// The fixed Mach-O header. `magic` decides both bitness and byte order;
/// the 64-bit variant's trailing reserved word is reproduced on write but
/// not modelled.
#[derive(Debug, Clone, PartialEq)]
pub struct MachHeader {
    pub magic: u32,
    pub cputype: i32,
    pub cpusubtype: i32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: HeaderFlags,
}

impl MachHeader {
    pub fn size(&self, ctx: MachCtx) -> usize {
        if ctx.is_64 {
            MACH_HEADER_SIZE_64
        } else {
            MACH_HEADER_SIZE_32
        }
    }
}

/// Classifies a header magic read as a little-endian word: a byte-swapped
/// match means the slice itself is big-endian.
pub fn classify_magic(magic_le: u32) -> Result<MachCtx> {
    match magic_le {
        MH_MAGIC => Ok(MachCtx::new(LE, false)),
        MH_MAGIC_64 => Ok(MachCtx::new(LE, true)),
        MH_CIGAM => Ok(MachCtx::new(BE, false)),
        MH_CIGAM_64 => Ok(MachCtx::new(BE, true)),
        other => Err(Error::BadMagic(other)),
    }
}

/// Parses the fixed header and walks all `ncmds` load commands.
///
/// The walk enforces the structural invariants: every command's declared
/// `cmdsize` must be non-zero (a zero would loop forever), must not run
/// past the declared command region, and the sizes must sum to exactly
/// `sizeofcmds`.
pub fn parse_header(bytes: &[u8]) -> Result<(MachHeader, MachCtx, Vec<LoadCommand>)> {
    let magic_le: u32 = bytes.pread_with(0, LE)?;
    let ctx = classify_magic(magic_le)?;
    let view = ByteView::new(bytes, ctx.endian);

    let raw: RawMachHeader = view.read_struct(0)?;
    let header = MachHeader {
        magic: raw.magic,
        cputype: raw.cputype,
        cpusubtype: raw.cpusubtype,
        filetype: raw.filetype,
        ncmds: raw.ncmds,
        sizeofcmds: raw.sizeofcmds,
        flags: HeaderFlags::from_bits_retain(raw.flags),
    };

    let header_size = header.size(ctx);
    let region_end = header_size
        .checked_add(header.sizeofcmds as usize)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            Error::Truncated(format!(
                "load command region of {} bytes exceeds slice of {} bytes",
                header.sizeofcmds,
                bytes.len()
            ))
        })?;

    let mut commands = Vec::with_capacity(header.ncmds as usize);
    let mut offset = header_size;
    for index in 0..header.ncmds {
        if offset + 8 > region_end {
            return Err(Error::MalformedLoadCommands(format!(
                "command {index} starts past the declared region end"
            )));
        }
        let cmd = view.read_u32(offset)?;
        let cmdsize = view.read_u32(offset + 4)?;
        if cmdsize < 8 {
            return Err(Error::MalformedLoadCommands(format!(
                "command {index} ({}) declares cmdsize {cmdsize}",
                crate::commands::lc_name(cmd)
            )));
        }
        if offset + cmdsize as usize > region_end {
            return Err(Error::MalformedLoadCommands(format!(
                "command {index} ({}) of {cmdsize} bytes overruns the region",
                crate::commands::lc_name(cmd)
            )));
        }

        let payload = match parse_payload(&view, offset, cmd, cmdsize) {
            Ok(payload) => payload,
            // A command body referencing data outside its own bytes is a
            // structural failure; surface it instead of guessing
            Err(err @ Error::MalformedLoadCommands(_)) => return Err(err),
            Err(Error::Truncated(detail)) => {
                return Err(Error::MalformedLoadCommands(detail));
            }
            Err(other) => return Err(other),
        };
        commands.push(LoadCommand {
            cmd,
            cmdsize,
            offset,
            payload,
        });
        offset += cmdsize as usize;
    }

    if offset != region_end {
        return Err(Error::MalformedLoadCommands(format!(
            "commands occupy {} bytes but sizeofcmds declares {}",
            offset - header_size,
            header.sizeofcmds
        )));
    }

    Ok((header, ctx, commands))
}

/// True when the first word of `bytes` is any thin Mach-O magic.
pub fn is_macho_magic(magic_le: u32) -> bool {
    matches!(magic_le, MH_MAGIC | MH_MAGIC_64 | MH_CIGAM | MH_CIGAM_64)
}

impl MachHeader {
    /// Reassembles the fixed header bytes (including the 64-bit reserved
    /// word) for the editor.
    pub fn assemble(&self, ctx: MachCtx) -> Vec<u8> {
        use scroll::Pwrite;
        let raw = RawMachHeader {
            magic: self.magic,
            cputype: self.cputype,
            cpusubtype: self.cpusubtype,
            filetype: self.filetype,
            ncmds: self.ncmds,
            sizeofcmds: self.sizeofcmds,
            flags: self.flags.bits(),
        };
        let mut buf = vec![0u8; self.size(ctx)];
        // Writing into a buffer sized for the header cannot fail
        buf.pwrite_with(raw, 0, ctx.endian).unwrap();
        buf
    }
}

/// Finds the first file offset holding content mapped after the load
/// commands; the span between the end of the commands and this offset is
/// the padding available for header growth.
pub fn first_content_offset(bytes_len: usize, commands: &[LoadCommand]) -> u64 {
    let mut first = bytes_len as u64;
    for lc in commands {
        if let Payload::Segment(seg) = &lc.payload {
            if seg.fileoff > 0 && seg.filesize > 0 {
                first = first.min(seg.fileoff);
            }
            for sect in &seg.sections {
                if sect.offset > 0 && sect.size > 0 {
                    first = first.min(u64::from(sect.offset));
                }
            }
        }
    }
    first
}

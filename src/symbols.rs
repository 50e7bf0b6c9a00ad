//! The `LC_SYMTAB` nlist array and its string table.

use crate::commands::{NLIST_SIZE_32, NLIST_SIZE_64, RawNList32, RawNList64, RawSymtabCommand};
use crate::consts::{N_EXT, N_SECT, N_STAB, N_TYPE, N_UNDF};
use crate::errors::{Error, Result};
use crate::view::{ByteView, MachCtx};

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    /// Resolved from the string table; empty names are kept because stabs
    /// entries legitimately have them.
    pub name: String,
    pub string_index: u32,
    pub n_type: u8,
    pub sect: u8,
    pub desc: i16,
    pub addr: u64,
}

impl SymbolEntry {
    #[inline]
    pub fn is_debug(&self) -> bool {
        self.n_type & N_STAB != 0
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.n_type & N_EXT != 0
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        !self.is_debug() && self.n_type & N_TYPE == N_UNDF
    }

    #[inline]
    pub fn is_defined_in_section(&self) -> bool {
        !self.is_debug() && self.n_type & N_TYPE == N_SECT
    }
}

/// Reads `nsyms` nlist entries and resolves each name through the string
/// table. An out-of-range string index drops only that entry.
pub fn parse_symbol_table(
    view: &ByteView<'_>,
    ctx: MachCtx,
    symtab: &RawSymtabCommand,
) -> Result<Vec<SymbolEntry>> {
    let entry_size = if ctx.is_64 {
        NLIST_SIZE_64
    } else {
        NLIST_SIZE_32
    };
    let table_len = (symtab.nsyms as usize)
        .checked_mul(entry_size)
        .ok_or_else(|| Error::Truncated("nlist table length overflows".into()))?;
    // Validate both tables up front so a bad command fails fast
    view.read_bytes(symtab.symoff as usize, table_len)?;
    let strtab = view.read_bytes(symtab.stroff as usize, symtab.strsize as usize)?;

    let mut symbols = Vec::with_capacity(symtab.nsyms as usize);
    for index in 0..symtab.nsyms as usize {
        let offset = symtab.symoff as usize + index * entry_size;
        let (string_index, n_type, sect, desc, addr) = if ctx.is_64 {
            let raw: RawNList64 = view.read_struct(offset)?;
            (raw.n_strx, raw.n_type, raw.n_sect, raw.n_desc, raw.n_value)
        } else {
            let raw: RawNList32 = view.read_struct(offset)?;
            (
                raw.n_strx,
                raw.n_type,
                raw.n_sect,
                raw.n_desc,
                u64::from(raw.n_value),
            )
        };

        let name = match read_strtab_name(strtab, string_index) {
            Some(name) => name,
            None => {
                log::warn!("symbol {index} has string index {string_index} outside the string table");
                continue;
            }
        };
        symbols.push(SymbolEntry {
            name,
            string_index,
            n_type,
            sect,
            desc,
            addr,
        });
    }
    Ok(symbols)
}

fn read_strtab_name(strtab: &[u8], string_index: u32) -> Option<String> {
    // Index 0 conventionally points at an empty name
    let tail = strtab.get(string_index as usize..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&tail[..end]).into_owned())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consts::LC_SYMTAB;
    use scroll::{LE, Pwrite};

    #[test]
    fn resolves_names_and_keeps_empty_entries() {
        // layout: [2 nlist64 entries][string table]
        let strtab = b"\0_main\0_helper\0";
        let symoff = 0usize;
        let stroff = 2 * NLIST_SIZE_64;
        let mut bytes = vec![0u8; stroff + strtab.len()];
        bytes
            .pwrite_with(
                RawNList64 {
                    n_strx: 1,
                    n_type: 0x0f,
                    n_sect: 1,
                    n_desc: 0,
                    n_value: 0x1000,
                },
                symoff,
                LE,
            )
            .unwrap();
        bytes
            .pwrite_with(
                RawNList64 {
                    n_strx: 0,
                    n_type: 0x64, // stabs
                    n_sect: 0,
                    n_desc: 0,
                    n_value: 0,
                },
                symoff + NLIST_SIZE_64,
                LE,
            )
            .unwrap();
        bytes[stroff..].copy_from_slice(strtab);

        let symtab = RawSymtabCommand {
            cmd: LC_SYMTAB,
            cmdsize: 24,
            symoff: symoff as u32,
            nsyms: 2,
            stroff: stroff as u32,
            strsize: strtab.len() as u32,
        };
        let view = ByteView::new(&bytes, LE);
        let symbols = parse_symbol_table(&view, MachCtx::new(LE, true), &symtab).unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "_main");
        assert_eq!(symbols[0].addr, 0x1000);
        assert!(symbols[0].is_external());
        assert_eq!(symbols[1].name, "");
        assert!(symbols[1].is_debug());
    }

    #[test]
    fn truncated_table_fails() {
        let symtab = RawSymtabCommand {
            cmd: LC_SYMTAB,
            cmdsize: 24,
            symoff: 0,
            nsyms: 4,
            stroff: 0,
            strsize: 1,
        };
        let bytes = vec![0u8; 16];
        let view = ByteView::new(&bytes, LE);
        assert!(matches!(
            parse_symbol_table(&view, MachCtx::new(LE, true), &symtab),
            Err(Error::Truncated(_))
        ));
    }
}

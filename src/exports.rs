//! The dyld export trie.
//!
//! Exported names are stored as a prefix trie: every node is a ULEB-sized
//! terminal blob (present when the accumulated prefix is itself an export)
//! followed by a child count and `(edge string, child offset)` pairs. Child
//! offsets are relative to the start of the trie data.

use crate::consts::{EXPORT_SYMBOL_FLAGS_REEXPORT, EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER};
use crate::errors::{Error, Result};
use crate::view::ByteView;
use scroll::LE;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum ExportInfo {
    Regular {
        address: u64,
    },
    /// `EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER`: the address is the stub,
    /// the resolver computes the real target at runtime.
    Resolver {
        address: u64,
        resolver: u64,
    },
    /// Re-exported from another image, possibly under a different name.
    Reexport {
        ordinal: u64,
        imported_name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub flags: u64,
    pub info: ExportInfo,
}

impl Export {
    /// The in-image address for non-reexported symbols.
    pub fn address(&self) -> Option<u64> {
        match self.info {
            ExportInfo::Regular { address } | ExportInfo::Resolver { address, .. } => Some(address),
            ExportInfo::Reexport { .. } => None,
        }
    }
}

/// Walks the whole trie, yielding exports in depth-first edge order.
///
/// Offsets already visited on any path terminate the walk with
/// [`Error::ExportTrieCycle`]: a well-formed trie is a tree, so any
/// re-entry means a loop that would otherwise never finish.
pub fn parse_export_trie(data: &[u8]) -> Result<Vec<Export>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    // ULEB/string content is endian-free; LE satisfies the view
    let view = ByteView::new(data, LE);
    let mut exports = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(0usize, String::new())];

    while let Some((node_offset, prefix)) = stack.pop() {
        if !visited.insert(node_offset) {
            return Err(Error::ExportTrieCycle(node_offset));
        }

        let mut offset = node_offset;
        let terminal_size = view.read_uleb(&mut offset)? as usize;
        if terminal_size > 0 {
            let terminal_end = offset + terminal_size;
            let mut at = offset;
            let flags = view.read_uleb(&mut at)?;
            let info = if flags & EXPORT_SYMBOL_FLAGS_REEXPORT != 0 {
                let ordinal = view.read_uleb(&mut at)?;
                let imported = view.read_cstr(at)?;
                ExportInfo::Reexport {
                    ordinal,
                    // An empty import name means "same name as here"
                    imported_name: if imported.is_empty() {
                        prefix.clone()
                    } else {
                        imported
                    },
                }
            } else if flags & EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER != 0 {
                let address = view.read_uleb(&mut at)?;
                let resolver = view.read_uleb(&mut at)?;
                ExportInfo::Resolver { address, resolver }
            } else {
                ExportInfo::Regular {
                    address: view.read_uleb(&mut at)?,
                }
            };
            exports.push(Export {
                name: prefix.clone(),
                flags,
                info,
            });
            offset = terminal_end;
        }

        let child_count = view.read_u8(offset)?;
        offset += 1;
        for _ in 0..child_count {
            let edge = view.read_cstr(offset)?;
            offset += edge.len() + 1;
            let child_offset = view.read_uleb(&mut offset)? as usize;
            if child_offset >= data.len() {
                return Err(Error::Truncated(format!(
                    "export trie child offset {child_offset} outside {} bytes",
                    data.len()
                )));
            }
            stack.push((child_offset, format!("{prefix}{edge}")));
        }
    }

    Ok(exports)
}

#[cfg(test)]
mod test {
    use super::*;

    // Hand-assembled trie:
    //   root ("") -> "_f" -> { "oo" -> terminal@0x1000, "un" -> terminal@0x2000 }
    fn sample_trie() -> Vec<u8> {
        let mut t = Vec::new();
        // root: no terminal, one child "_f" at offset 6
        t.extend_from_slice(&[0x00, 0x01]);
        t.extend_from_slice(b"_f\0");
        t.push(6);
        assert_eq!(t.len(), 6);
        // node "_f": no terminal, two children at offsets 16 and 21
        t.extend_from_slice(&[0x00, 0x02]);
        t.extend_from_slice(b"oo\0");
        t.push(16);
        t.extend_from_slice(b"un\0");
        t.push(21);
        assert_eq!(t.len(), 16);
        // node "_foo": terminal {flags 0, address 0x1000}, no children
        t.extend_from_slice(&[0x03, 0x00, 0x80, 0x20, 0x00]);
        assert_eq!(t.len(), 21);
        // node "_fun": terminal {flags 0, address 0x2000}, no children
        t.extend_from_slice(&[0x03, 0x00, 0x80, 0x40, 0x00]);
        t
    }

    #[test]
    fn walks_all_leaves() {
        let trie = sample_trie();
        let mut exports = parse_export_trie(&trie).unwrap();
        exports.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(exports.len(), 2);
        assert_eq!(exports[0].name, "_foo");
        assert_eq!(exports[0].info, ExportInfo::Regular { address: 0x1000 });
        assert_eq!(exports[1].name, "_fun");
        assert_eq!(exports[1].info, ExportInfo::Regular { address: 0x2000 });
    }

    #[test]
    fn self_referencing_child_is_a_cycle() {
        // root: no terminal, one child "_a" whose offset points back at root
        let trie = vec![0x00, 0x01, b'_', b'a', 0x00, 0x00];
        assert!(matches!(
            parse_export_trie(&trie),
            Err(Error::ExportTrieCycle(0))
        ));
    }

    #[test]
    fn reexport_terminal() {
        // root terminal: flags REEXPORT, ordinal 2, name "_orig"
        let mut trie = vec![0x08, 0x08, 0x02];
        trie.extend_from_slice(b"_orig\0");
        trie.push(0x00); // no children
        let exports = parse_export_trie(&trie).unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(
            exports[0].info,
            ExportInfo::Reexport {
                ordinal: 2,
                imported_name: "_orig".into()
            }
        );
    }

    #[test]
    fn empty_trie() {
        assert!(parse_export_trie(&[]).unwrap().is_empty());
    }
}

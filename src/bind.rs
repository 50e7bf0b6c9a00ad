//! Decoder for the dyld bind, weak-bind and lazy-bind opcode streams.
//!
//! The stream is a tiny bytecode: each byte's high nibble selects an opcode
//! and the low nibble is an immediate. The decoder runs it against a
//! mutable state record and emits one [`BindAction`] per `DO_BIND*`.

use crate::commands::Segment;
use crate::consts::*;
use crate::errors::Result;
use crate::view::{ByteView, MachCtx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStreamKind {
    Bind,
    WeakBind,
    LazyBind,
}

impl BindStreamKind {
    fn name(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::WeakBind => "weak-bind",
            Self::LazyBind => "lazy-bind",
        }
    }
}

/// One resolved bind target.
#[derive(Debug, Clone, PartialEq)]
pub struct BindAction {
    pub segment_index: u8,
    pub segment_offset: u64,
    pub symbol: String,
    pub dylib_ordinal: i64,
    pub addend: i64,
    pub bind_type: u8,
    pub flags: u8,
    /// `segments[segment_index].vmaddr + segment_offset`.
    pub addr: u64,
}

/// A decoded stream: the emitted actions plus, when an undefined opcode was
/// hit, the raw undecoded tail. An undefined opcode is not fatal; keeping
/// the tail verbatim lets edits reproduce the stream byte-exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindTable {
    pub actions: Vec<BindAction>,
    pub unknown_tail: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct BindState {
    segment_index: u8,
    segment_offset: u64,
    symbol: String,
    dylib_ordinal: i64,
    addend: i64,
    bind_type: u8,
    flags: u8,
}

impl Default for BindState {
    fn default() -> Self {
        Self {
            segment_index: 0,
            segment_offset: 0,
            symbol: String::new(),
            dylib_ordinal: 0,
            addend: 0,
            // BIND_TYPE_POINTER; dyld assumes it unless SET_TYPE_IMM says otherwise
            bind_type: 1,
            flags: 0,
        }
    }
}

impl BindState {
    fn emit(&self, segments: &[Segment]) -> Option<BindAction> {
        let seg = match segments.get(self.segment_index as usize) {
            Some(seg) => seg,
            None => {
                log::warn!(
                    "bind entry for {:?} names segment {} but only {} exist; dropping",
                    self.symbol,
                    self.segment_index,
                    segments.len()
                );
                return None;
            }
        };
        Some(BindAction {
            segment_index: self.segment_index,
            segment_offset: self.segment_offset,
            symbol: self.symbol.clone(),
            dylib_ordinal: self.dylib_ordinal,
            addend: self.addend,
            bind_type: self.bind_type,
            flags: self.flags,
            addr: seg.vmaddr.wrapping_add(self.segment_offset),
        })
    }
}

/// Runs the opcode stream in `data` to completion.
///
/// Lazy streams keep one entry per `DONE`, so there state resets and
/// decoding continues; for the other kinds a `DONE` also just resets state
/// (trailing padding zeros decode as harmless no-ops either way).
pub fn decode_bind_stream(
    data: &[u8],
    segments: &[Segment],
    ctx: MachCtx,
    kind: BindStreamKind,
) -> Result<BindTable> {
    let view = ByteView::new(data, ctx.endian);
    let ptr_size = ctx.ptr_size();
    let mut state = BindState::default();
    let mut table = BindTable::default();
    let mut offset = 0usize;

    while offset < data.len() {
        let byte = view.read_u8(offset)?;
        let opcode_at = offset;
        offset += 1;
        let opcode = byte & BIND_OPCODE_MASK;
        let immediate = byte & BIND_IMMEDIATE_MASK;

        match opcode {
            BIND_OPCODE_DONE => {
                state = BindState::default();
            }
            BIND_OPCODE_SET_DYLIB_ORDINAL_IMM => {
                state.dylib_ordinal = i64::from(immediate);
            }
            BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB => {
                state.dylib_ordinal = view.read_uleb(&mut offset)? as i64;
            }
            BIND_OPCODE_SET_DYLIB_SPECIAL_IMM => {
                // 0 stays SELF; nonzero immediates sign-extend to the
                // special negative ordinals
                state.dylib_ordinal = if immediate == 0 {
                    BIND_SPECIAL_DYLIB_SELF
                } else {
                    i64::from((immediate | BIND_OPCODE_MASK) as i8)
                };
            }
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM => {
                state.symbol = view.read_cstr(offset)?;
                offset += state.symbol.len() + 1;
                state.flags = immediate;
            }
            BIND_OPCODE_SET_TYPE_IMM => {
                state.bind_type = immediate;
            }
            BIND_OPCODE_SET_ADDEND_SLEB => {
                state.addend = view.read_sleb(&mut offset)?;
            }
            BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB => {
                state.segment_index = immediate;
                state.segment_offset = view.read_uleb(&mut offset)?;
            }
            BIND_OPCODE_ADD_ADDR_ULEB => {
                let delta = view.read_uleb(&mut offset)?;
                state.segment_offset = state.segment_offset.wrapping_add(delta);
            }
            BIND_OPCODE_DO_BIND => {
                table.actions.extend(state.emit(segments));
                state.segment_offset = state.segment_offset.wrapping_add(ptr_size);
            }
            BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB => {
                table.actions.extend(state.emit(segments));
                let delta = view.read_uleb(&mut offset)?;
                state.segment_offset = state.segment_offset.wrapping_add(ptr_size).wrapping_add(delta);
            }
            BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED => {
                table.actions.extend(state.emit(segments));
                state.segment_offset = state
                    .segment_offset
                    .wrapping_add(ptr_size * (1 + u64::from(immediate)));
            }
            BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB => {
                let count = view.read_uleb(&mut offset)?;
                let skip = view.read_uleb(&mut offset)?;
                for _ in 0..count {
                    table.actions.extend(state.emit(segments));
                    state.segment_offset =
                        state.segment_offset.wrapping_add(ptr_size).wrapping_add(skip);
                }
            }
            _ => {
                log::warn!(
                    "undefined {} opcode {byte:#04x} at offset {opcode_at}; keeping raw tail",
                    kind.name()
                );
                table.unknown_tail = Some(data[opcode_at..].to_vec());
                return Ok(table);
            }
        }
    }

    Ok(table)
}

/// Convenience check for the invariant that every emitted ordinal is a
/// special value or a valid 1-based import index.
pub fn ordinal_in_range(ordinal: i64, dylib_count: usize) -> bool {
    matches!(
        ordinal,
        BIND_SPECIAL_DYLIB_WEAK_LOOKUP
            | BIND_SPECIAL_DYLIB_FLAT_LOOKUP
            | BIND_SPECIAL_DYLIB_MAIN_EXECUTABLE
            | BIND_SPECIAL_DYLIB_SELF
    ) || (ordinal >= 1 && ordinal <= dylib_count as i64)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::Error;
    use scroll::LE;

    fn segments() -> Vec<Segment> {
        let make = |name: &str, vmaddr: u64| Segment {
            name: name.into(),
            vmaddr,
            vmsize: 0x4000,
            fileoff: 0,
            filesize: 0x4000,
            maxprot: 3,
            initprot: 3,
            flags: 0,
            sections: Vec::new(),
        };
        vec![
            make("__TEXT", 0x0000),
            make("__DATA_CONST", 0x4000),
            make("__DATA", 0x8000),
        ]
    }

    fn ctx() -> MachCtx {
        MachCtx::new(LE, true)
    }

    #[test]
    fn single_bind() {
        // SET_DYLIB_ORDINAL_IMM 2; SET_SYMBOL "_foo"; SET_SEGMENT_AND_OFFSET seg=2 off=16;
        // DO_BIND; DONE
        let stream = [
            0x12, 0x40, b'_', b'f', b'o', b'o', 0x00, 0x72, 0x10, 0x90, 0x00,
        ];
        let table = decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::Bind).unwrap();
        assert!(table.unknown_tail.is_none());
        assert_eq!(table.actions.len(), 1);
        let action = &table.actions[0];
        assert_eq!(action.segment_index, 2);
        assert_eq!(action.segment_offset, 16);
        assert_eq!(action.symbol, "_foo");
        assert_eq!(action.dylib_ordinal, 2);
        assert_eq!(action.addr, 0x8010);
    }

    #[test]
    fn bind_uleb_times_skipping() {
        // ordinal 1, symbol "_a", seg 1 off 0, bind 3 times skipping 8
        let stream = [
            0x11, 0x40, b'_', b'a', 0x00, 0x71, 0x00, 0xc0, 0x03, 0x08, 0x00,
        ];
        let table = decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::Bind).unwrap();
        assert_eq!(table.actions.len(), 3);
        // each iteration advances pointer size (8) plus skip (8)
        assert_eq!(table.actions[0].segment_offset, 0);
        assert_eq!(table.actions[1].segment_offset, 16);
        assert_eq!(table.actions[2].segment_offset, 32);
        assert_eq!(table.actions[2].addr, 0x4020);
    }

    #[test]
    fn special_ordinals_sign_extend() {
        // SET_DYLIB_SPECIAL_IMM with immediate 0xe => -2 (flat lookup)
        let stream = [0x3e, 0x40, b'_', b'x', 0x00, 0x70, 0x00, 0x90];
        let table = decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::Bind).unwrap();
        assert_eq!(table.actions[0].dylib_ordinal, BIND_SPECIAL_DYLIB_FLAT_LOOKUP);

        let stream = [0x30, 0x40, b'_', b'x', 0x00, 0x70, 0x00, 0x90];
        let table = decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::Bind).unwrap();
        assert_eq!(table.actions[0].dylib_ordinal, BIND_SPECIAL_DYLIB_SELF);
    }

    #[test]
    fn lazy_stream_resets_between_entries() {
        // Two lazy entries separated by DONE; the second entry must not
        // inherit the first's ordinal
        let stream = [
            0x12, 0x40, b'_', b'a', 0x00, 0x71, 0x08, 0x90, 0x00, // entry 1
            0x40, b'_', b'b', 0x00, 0x72, 0x10, 0x90, 0x00, // entry 2
        ];
        let table =
            decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::LazyBind).unwrap();
        assert_eq!(table.actions.len(), 2);
        assert_eq!(table.actions[0].dylib_ordinal, 2);
        assert_eq!(table.actions[1].dylib_ordinal, 0);
        assert_eq!(table.actions[1].symbol, "_b");
    }

    #[test]
    fn addend_and_add_addr() {
        // addend -8, seg 1 off 0, ADD_ADDR 0x20, DO_BIND
        let stream = [
            0x11, 0x40, b'_', b'a', 0x00, 0x60, 0x78, 0x71, 0x00, 0x80, 0x20, 0x90,
        ];
        let table = decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::Bind).unwrap();
        assert_eq!(table.actions[0].addend, -8);
        assert_eq!(table.actions[0].segment_offset, 0x20);
    }

    #[test]
    fn undefined_opcode_preserves_tail() {
        let stream = [0x11, 0xd0, 0xaa, 0xbb];
        let table = decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::Bind).unwrap();
        assert!(table.actions.is_empty());
        assert_eq!(table.unknown_tail.as_deref(), Some(&[0xd0, 0xaa, 0xbb][..]));
    }

    #[test]
    fn invalid_segment_index_drops_entry_only() {
        let stream = [
            0x11, 0x40, b'_', b'a', 0x00, 0x7f, 0x00, 0x90, // seg 15 does not exist
            0x71, 0x00, 0x90, // seg 1 does
        ];
        let table = decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::Bind).unwrap();
        assert_eq!(table.actions.len(), 1);
        assert_eq!(table.actions[0].segment_index, 1);
    }

    #[test]
    fn truncated_symbol_fails() {
        let stream = [0x40, b'_', b'a'];
        assert!(matches!(
            decode_bind_stream(&stream, &segments(), ctx(), BindStreamKind::Bind),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn ordinal_range() {
        assert!(ordinal_in_range(-3, 0));
        assert!(ordinal_in_range(0, 0));
        assert!(ordinal_in_range(2, 2));
        assert!(!ordinal_in_range(3, 2));
        assert!(!ordinal_in_range(-4, 2));
    }
}

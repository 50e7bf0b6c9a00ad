//! Bounds-checked reads over a slice's raw bytes.

use crate::errors::{Error, Result};
use scroll::{Endian, Pread, Sleb128, Uleb128};

/// How wide pointers and `nlist` entries are for a slice, and which byte
/// order its multi-byte integers use. Decided once from the header magic
/// and threaded through every reader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachCtx {
    pub endian: Endian,
    pub is_64: bool,
}

impl MachCtx {
    pub fn new(endian: Endian, is_64: bool) -> Self {
        Self { endian, is_64 }
    }

    #[inline]
    pub fn ptr_size(&self) -> u64 {
        if self.is_64 { 8 } else { 4 }
    }
}

/// A non-owning window over a slice's bytes. All reads are relative to the
/// window and bounds-checked; multi-byte reads honor the slice's byte order.
#[derive(Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
    endian: Endian,
}

impl<'a> ByteView<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self { data, endian }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.data.pread_with(offset, self.endian)?)
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        Ok(self.data.pread_with(offset, self.endian)?)
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        Ok(self.data.pread_with(offset, self.endian)?)
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        Ok(self.data.pread_with(offset, self.endian)?)
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        Ok(self.data.pread_with(offset, self.endian)?)
    }

    /// Reads a pointer-sized unsigned integer, widened to `u64`.
    pub fn read_ptr(&self, offset: usize, ctx: MachCtx) -> Result<u64> {
        if ctx.is_64 {
            self.read_u64(offset)
        } else {
            Ok(u64::from(self.read_u32(offset)?))
        }
    }

    /// Reads any scroll-decodable structure at `offset`.
    pub fn read_struct<T>(&self, offset: usize) -> Result<T>
    where
        T: for<'b> scroll::ctx::TryFromCtx<'b, Endian, Error = scroll::Error>,
    {
        Ok(self.data.pread_with(offset, self.endian)?)
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.data
            .get(offset..offset.checked_add(len).unwrap_or(usize::MAX))
            .ok_or_else(|| Error::Truncated(format!("{} bytes at offset {offset}", len)))
    }

    /// Reads a NUL-terminated string starting at `offset`. Invalid UTF-8 is
    /// replaced rather than rejected since section and symbol names in the
    /// wild occasionally contain garbage.
    pub fn read_cstr(&self, offset: usize) -> Result<String> {
        let tail = self
            .data
            .get(offset..)
            .ok_or_else(|| Error::Truncated(format!("C string at offset {offset}")))?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Truncated(format!("unterminated C string at offset {offset}")))?;
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    /// ULEB128, advancing `offset` past the encoding.
    pub fn read_uleb(&self, offset: &mut usize) -> Result<u64> {
        Ok(Uleb128::read(self.data, offset)?)
    }

    /// SLEB128, advancing `offset` past the encoding.
    pub fn read_sleb(&self, offset: &mut usize) -> Result<i64> {
        Ok(Sleb128::read(self.data, offset)?)
    }
}

/// Trims the trailing NULs from a fixed-width name field
/// (`segname[16]`/`sectname[16]`).
pub fn fixed_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Pads `name` with NULs out to `align` bytes for embedding after a load
/// command struct. Always leaves at least one terminating NUL.
pub fn padded_cstring(name: &str, align: usize) -> Vec<u8> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % align != 0 {
        bytes.push(0);
    }
    bytes
}

#[cfg(test)]
mod test {
    use super::*;
    use scroll::{BE, LE};

    #[test]
    fn bounded_reads() {
        let view = ByteView::new(&[0x01, 0x02, 0x03, 0x04], LE);
        assert_eq!(view.read_u16(1).unwrap(), 0x0302);
        assert_eq!(view.read_u32(0).unwrap(), 0x04030201);
        assert!(matches!(view.read_u32(1), Err(Error::Truncated(_))));
        assert!(matches!(view.read_bytes(2, 3), Err(Error::Truncated(_))));
    }

    #[test]
    fn endianness() {
        let bytes = [0xca, 0xfe, 0xba, 0xbe];
        assert_eq!(ByteView::new(&bytes, BE).read_u32(0).unwrap(), 0xcafebabe);
        assert_eq!(ByteView::new(&bytes, LE).read_u32(0).unwrap(), 0xbebafeca);
    }

    #[test]
    fn cstr() {
        let view = ByteView::new(b"_foo\0bar", LE);
        assert_eq!(view.read_cstr(0).unwrap(), "_foo");
        assert_eq!(view.read_cstr(5).is_err(), true);
    }

    #[test]
    fn uleb() {
        let view = ByteView::new(&[0xe5, 0x8e, 0x26, 0x7f], LE);
        let mut offset = 0;
        assert_eq!(view.read_uleb(&mut offset).unwrap(), 624485);
        assert_eq!(offset, 3);
        assert_eq!(view.read_uleb(&mut offset).unwrap(), 0x7f);
    }

    #[test]
    fn sleb() {
        // -2 encodes as 0x7e
        let view = ByteView::new(&[0x7e], LE);
        let mut offset = 0;
        assert_eq!(view.read_sleb(&mut offset).unwrap(), -2);
    }

    #[test]
    fn name_padding() {
        assert_eq!(padded_cstring("/tmp/x.dylib", 8).len(), 16);
        assert_eq!(padded_cstring("1234567", 8).len(), 8);
        assert_eq!(padded_cstring("12345678", 8).len(), 16);
    }
}

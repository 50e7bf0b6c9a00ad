//! Fat (multi-architecture) archives: splitting them into slices and
//! packing slices back together.
//!
//! All fat bookkeeping integers are big-endian on disk regardless of the
//! byte order of the slices inside.

use crate::consts::*;
use crate::errors::{Error, Result};
use crate::header::is_macho_magic;
use scroll::{BE, LE, Pread, Pwrite, SizeWith};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawFatHeader {
    pub magic: u32,
    pub nfat_arch: u32,
}

pub const FAT_HEADER_SIZE: usize = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawFatArch32 {
    pub cputype: i32,
    pub cpusubtype: i32,
    pub offset: u32,
    pub size: u32,
    pub align: u32,
}

pub const FAT_ARCH_SIZE_32: usize = 20;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pread, Pwrite, SizeWith)]
pub struct RawFatArch64 {
    pub cputype: i32,
    pub cpusubtype: i32,
    pub offset: u64,
    pub size: u64,
    pub align: u32,
    pub reserved: u32,
}

pub const FAT_ARCH_SIZE_64: usize = 32;

/// One architecture's placement. For a thin file a synthetic entry covers
/// the whole input at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatArch {
    pub cputype: i32,
    pub cpusubtype: i32,
    /// Absolute within the fat file.
    pub offset: u64,
    pub size: u64,
    /// Power-of-two exponent.
    pub align: u32,
}

/// One architecture's bytes, cut out of the enclosing file.
#[derive(Debug, Clone)]
pub struct Slice {
    pub bytes: Vec<u8>,
    pub arch: FatArch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Thin,
    Fat32,
    Fat64,
}

/// A loaded input file, split into per-architecture slices.
#[derive(Debug, Clone)]
pub struct MachFile {
    pub kind: FileKind,
    pub slices: Vec<Slice>,
}

impl MachFile {
    pub fn is_fat(&self) -> bool {
        self.kind != FileKind::Thin
    }

    pub fn slice_for(&self, cputype: i32, cpusubtype: i32) -> Option<&Slice> {
        self.slices.iter().find(|s| {
            s.arch.cputype == cputype
                && (s.arch.cpusubtype & CPU_SUBTYPE_MASK) == (cpusubtype & CPU_SUBTYPE_MASK)
        })
    }
}

/// Splits `bytes` into slices: one synthetic slice for a thin Mach-O, or
/// one per `fat_arch` entry for a fat archive.
pub fn read_file(bytes: &[u8]) -> Result<MachFile> {
    let magic_be: u32 = bytes.pread_with(0, BE).map_err(|_| {
        Error::Truncated(format!("{} bytes is too short for any magic", bytes.len()))
    })?;

    match magic_be {
        FAT_MAGIC | FAT_MAGIC_64 => read_fat(bytes, magic_be == FAT_MAGIC_64),
        // A byte-swapped fat magic would mean a little-endian fat header;
        // those do not exist in the wild and lipo refuses them too
        FAT_CIGAM | FAT_CIGAM_64 => Err(Error::UnsupportedEndianness),
        _ => {
            let magic_le: u32 = bytes.pread_with(0, LE)?;
            if !is_macho_magic(magic_le) {
                return Err(Error::BadMagic(magic_le));
            }
            Ok(MachFile {
                kind: FileKind::Thin,
                slices: vec![thin_slice(bytes)?],
            })
        }
    }
}

fn thin_slice(bytes: &[u8]) -> Result<Slice> {
    let view_le: u32 = bytes.pread_with(0, LE)?;
    let ctx = crate::header::classify_magic(view_le)?;
    let cputype: i32 = bytes.pread_with(4, ctx.endian)?;
    let cpusubtype: i32 = bytes.pread_with(8, ctx.endian)?;
    Ok(Slice {
        bytes: bytes.to_vec(),
        arch: FatArch {
            cputype,
            cpusubtype,
            offset: 0,
            size: bytes.len() as u64,
            align: 0,
        },
    })
}

fn read_fat(bytes: &[u8], is_64: bool) -> Result<MachFile> {
    let header: RawFatHeader = bytes.pread_with(0, BE)?;
    if header.nfat_arch == 0 {
        return Err(Error::Truncated("fat header declares zero slices".into()));
    }
    let entry_size = if is_64 {
        FAT_ARCH_SIZE_64
    } else {
        FAT_ARCH_SIZE_32
    };
    let table_end = FAT_HEADER_SIZE + header.nfat_arch as usize * entry_size;
    if table_end > bytes.len() {
        return Err(Error::Truncated(format!(
            "fat arch table of {} entries needs {table_end} bytes, input has {}",
            header.nfat_arch,
            bytes.len()
        )));
    }

    let mut slices = Vec::with_capacity(header.nfat_arch as usize);
    for index in 0..header.nfat_arch as usize {
        let at = FAT_HEADER_SIZE + index * entry_size;
        let arch = if is_64 {
            let raw: RawFatArch64 = bytes.pread_with(at, BE)?;
            FatArch {
                cputype: raw.cputype,
                cpusubtype: raw.cpusubtype,
                offset: raw.offset,
                size: raw.size,
                align: raw.align,
            }
        } else {
            let raw: RawFatArch32 = bytes.pread_with(at, BE)?;
            FatArch {
                cputype: raw.cputype,
                cpusubtype: raw.cpusubtype,
                offset: u64::from(raw.offset),
                size: u64::from(raw.size),
                align: raw.align,
            }
        };

        let start = arch.offset as usize;
        let end = start
            .checked_add(arch.size as usize)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                Error::Truncated(format!(
                    "slice {index} spans {:#x}..{:#x} outside the {} byte input",
                    arch.offset,
                    arch.offset + arch.size,
                    bytes.len()
                ))
            })?;
        slices.push(Slice {
            bytes: bytes[start..end].to_vec(),
            arch,
        });
    }

    Ok(MachFile {
        kind: if is_64 { FileKind::Fat64 } else { FileKind::Fat32 },
        slices,
    })
}

/// Default slice alignment: 2^14 = 16 KiB pages.
pub const DEFAULT_SLICE_ALIGN: u32 = 14;

/// Packs slices into a 32-bit fat archive, placing each at the next offset
/// that satisfies its alignment (the arch's own `align` when set,
/// [`DEFAULT_SLICE_ALIGN`] otherwise).
pub fn write_fat(slices: &[Slice]) -> Result<Vec<u8>> {
    if slices.is_empty() {
        return Err(Error::UnsupportedEdit(
            "cannot create a fat archive from zero slices".into(),
        ));
    }

    let table_end = FAT_HEADER_SIZE + slices.len() * FAT_ARCH_SIZE_32;
    let mut placed = Vec::with_capacity(slices.len());
    let mut cursor = table_end as u64;
    for slice in slices {
        let align = if slice.arch.align != 0 {
            slice.arch.align
        } else {
            DEFAULT_SLICE_ALIGN
        };
        let alignment = 1u64 << align;
        let offset = cursor.div_ceil(alignment) * alignment;
        let size = slice.bytes.len() as u64;
        if offset + size > u64::from(u32::MAX) {
            return Err(Error::UnsupportedEdit(
                "slices do not fit in a 32-bit fat archive".into(),
            ));
        }
        placed.push((offset, size, align));
        cursor = offset + size;
    }

    let mut out = vec![0u8; cursor as usize];
    out.pwrite_with(
        RawFatHeader {
            magic: FAT_MAGIC,
            nfat_arch: slices.len() as u32,
        },
        0,
        BE,
    )?;
    for (index, (slice, &(offset, size, align))) in slices.iter().zip(&placed).enumerate() {
        out.pwrite_with(
            RawFatArch32 {
                cputype: slice.arch.cputype,
                cpusubtype: slice.arch.cpusubtype,
                offset: offset as u32,
                size: size as u32,
                align,
            },
            FAT_HEADER_SIZE + index * FAT_ARCH_SIZE_32,
            BE,
        )?;
        out[offset as usize..(offset + size) as usize].copy_from_slice(&slice.bytes);
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn fake_thin(cputype: i32, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes.pwrite_with(MH_MAGIC_64, 0, LE).unwrap();
        bytes.pwrite_with(cputype, 4, LE).unwrap();
        bytes.pwrite_with(0i32, 8, LE).unwrap();
        bytes
    }

    #[test]
    fn thin_detection() {
        let bytes = fake_thin(CPU_TYPE_ARM64, 64);
        let file = read_file(&bytes).unwrap();
        assert_eq!(file.kind, FileKind::Thin);
        assert_eq!(file.slices.len(), 1);
        assert_eq!(file.slices[0].arch.cputype, CPU_TYPE_ARM64);
        assert_eq!(file.slices[0].bytes, bytes);
    }

    #[test]
    fn bad_magic() {
        assert!(matches!(
            read_file(&[0u8; 16]),
            Err(Error::BadMagic(0))
        ));
    }

    #[test]
    fn zero_slice_fat_is_truncated() {
        let mut bytes = vec![0u8; 8];
        bytes.pwrite_with(FAT_MAGIC, 0, BE).unwrap();
        assert!(matches!(read_file(&bytes), Err(Error::Truncated(_))));
    }

    #[test]
    fn arch_table_must_fit() {
        let mut bytes = vec![0u8; 12];
        bytes
            .pwrite_with(
                RawFatHeader {
                    magic: FAT_MAGIC,
                    nfat_arch: 3,
                },
                0,
                BE,
            )
            .unwrap();
        assert!(matches!(read_file(&bytes), Err(Error::Truncated(_))));
    }

    #[test]
    fn pack_then_split_round_trips() {
        let arm = fake_thin(CPU_TYPE_ARM64, 100);
        let x86 = fake_thin(CPU_TYPE_X86_64, 200);
        let slices = vec![
            Slice {
                bytes: arm.clone(),
                arch: FatArch {
                    cputype: CPU_TYPE_ARM64,
                    cpusubtype: 0,
                    offset: 0,
                    size: arm.len() as u64,
                    align: 4,
                },
            },
            Slice {
                bytes: x86.clone(),
                arch: FatArch {
                    cputype: CPU_TYPE_X86_64,
                    cpusubtype: 3,
                    offset: 0,
                    size: x86.len() as u64,
                    align: 4,
                },
            },
        ];
        let fat = write_fat(&slices).unwrap();
        let file = read_file(&fat).unwrap();
        assert_eq!(file.kind, FileKind::Fat32);
        assert_eq!(file.slices.len(), 2);
        assert_eq!(file.slices[0].bytes, arm);
        assert_eq!(file.slices[1].bytes, x86);
        // offsets ascend and respect the 2^4 alignment
        assert_eq!(file.slices[0].arch.offset % 16, 0);
        assert!(
            file.slices[0].arch.offset + file.slices[0].arch.size <= file.slices[1].arch.offset
        );

        // and packing what we split yields the identical archive
        assert_eq!(write_fat(&file.slices).unwrap(), fat);
    }

    #[test]
    fn extract_matches_input_range() {
        let arm = fake_thin(CPU_TYPE_ARM64, 64);
        let slices = vec![Slice {
            bytes: arm,
            arch: FatArch {
                cputype: CPU_TYPE_ARM64,
                cpusubtype: 0,
                offset: 0,
                size: 64,
                align: 6,
            },
        }];
        let fat = write_fat(&slices).unwrap();
        let file = read_file(&fat).unwrap();
        let slice = file.slice_for(CPU_TYPE_ARM64, 0).unwrap();
        let start = slice.arch.offset as usize;
        let end = start + slice.arch.size as usize;
        assert_eq!(&fat[start..end], slice.bytes.as_slice());
    }
}

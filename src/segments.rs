//! Virtual-address to file-offset translation.

use crate::commands::Segment;
use crate::errors::{Error, Result};

/// An ordered view of the segments' VM ranges. Segments must not overlap in
/// VM space; if a malformed image violates that, the first match wins.
#[derive(Debug, Clone, Default)]
pub struct SegmentMap {
    ranges: Vec<VmRange>,
}

#[derive(Debug, Clone, Copy)]
struct VmRange {
    vmaddr: u64,
    vmsize: u64,
    fileoff: u64,
    filesize: u64,
}

impl SegmentMap {
    pub fn new(segments: &[Segment]) -> Self {
        Self {
            ranges: segments
                .iter()
                .map(|seg| VmRange {
                    vmaddr: seg.vmaddr,
                    vmsize: seg.vmsize,
                    fileoff: seg.fileoff,
                    filesize: seg.filesize,
                })
                .collect(),
        }
    }

    /// Translates a virtual address into the file offset backing it.
    ///
    /// Addresses inside a segment's VM range but past its file-backed span
    /// are zero-fill (`__bss` and friends) and have no bytes to read.
    pub fn vm_to_file(&self, vaddr: u64) -> Result<u64> {
        for range in &self.ranges {
            if vaddr >= range.vmaddr && vaddr < range.vmaddr.saturating_add(range.vmsize) {
                let delta = vaddr - range.vmaddr;
                if delta < range.filesize {
                    return Ok(range.fileoff + delta);
                }
                return Err(Error::ZeroFill(vaddr));
            }
        }
        Err(Error::UnmappedAddress(vaddr))
    }

    /// Whether any segment maps `vaddr`, zero-fill included.
    pub fn contains(&self, vaddr: u64) -> bool {
        self.ranges
            .iter()
            .any(|r| vaddr >= r.vmaddr && vaddr < r.vmaddr.saturating_add(r.vmsize))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn segment(name: &str, vmaddr: u64, vmsize: u64, fileoff: u64, filesize: u64) -> Segment {
        Segment {
            name: name.into(),
            vmaddr,
            vmsize,
            fileoff,
            filesize,
            maxprot: 7,
            initprot: 3,
            flags: 0,
            sections: Vec::new(),
        }
    }

    #[test]
    fn translation() {
        let map = SegmentMap::new(&[
            segment("__TEXT", 0x1_0000_0000, 0x4000, 0, 0x4000),
            segment("__DATA", 0x1_0000_4000, 0x8000, 0x4000, 0x2000),
        ]);
        assert_eq!(map.vm_to_file(0x1_0000_0010).unwrap(), 0x10);
        assert_eq!(map.vm_to_file(0x1_0000_4100).unwrap(), 0x4100);
        // inside __DATA's vmsize but past filesize: zero-fill
        assert!(matches!(
            map.vm_to_file(0x1_0000_6000),
            Err(Error::ZeroFill(_))
        ));
        assert!(matches!(
            map.vm_to_file(0x2_0000_0000),
            Err(Error::UnmappedAddress(_))
        ));
    }
}

//! # Block Headers
//!
//! Every block of a pool starts with a [`BlockHeader`]:
//!
//! ```text
//! +--------------+-----------+------------+-----------------+
//! | BlockHeader  |   used    |  reserved  |     unused      |
//! | (48 bytes)   | (payload) | (round-up) | (donatable gap) |
//! +--------------+-----------+------------+-----------------+
//! ^ header       ^ payload                                  ^ next header / arena end
//! ```
//!
//! `used` is the requested size, `reserved` pads it to the minimum pool
//! alignment so the next header stays aligned, and `unused` runs up to the
//! next header. Headers are linked in address order with no gaps between
//! blocks.

use bitfield_struct::bitfield;
use core::ptr;
use kernel_info::memory::POOL_MIN_ALIGN;

/// Small per-block flags.
#[bitfield(u16)]
pub struct BlockInfo {
    /// log2 of the alignment the payload was requested with.
    #[bits(6)]
    pub align_shift: u8,

    /// Set on the permanent first block of a pool.
    pub head: bool,

    #[bits(9)]
    __reserved: u16,
}

/// In-band header preceding every block.
#[repr(C, align(16))]
pub(crate) struct BlockHeader {
    pub(crate) tag: u32,
    pub(crate) checksum: u16,
    pub(crate) info: BlockInfo,
    pub(crate) prev: *mut BlockHeader,
    pub(crate) next: *mut BlockHeader,
    pub(crate) used: usize,
    pub(crate) reserved: usize,
    pub(crate) unused: usize,
}

/// Bytes occupied by a block header.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

const _: () = {
    assert!(HEADER_SIZE.is_multiple_of(POOL_MIN_ALIGN));
    assert!(align_of::<BlockHeader>() == POOL_MIN_ALIGN);
};

/// Build a tag from four ASCII characters, e.g. `pool_tag(*b"Proc")`.
#[must_use]
pub const fn pool_tag(name: [u8; 4]) -> u32 {
    u32::from_le_bytes(name)
}

/// Tag of the permanent first block.
pub const HEAD_TAG: u32 = pool_tag(*b"Head");

#[inline]
fn byte_sum(acc: u16, bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(acc, |acc, b| acc.wrapping_add(u16::from(*b)))
}

impl BlockHeader {
    /// Byte sum over every field except `checksum`.
    pub(crate) fn compute_checksum(&self) -> u16 {
        let mut acc = byte_sum(0, &self.tag.to_ne_bytes());
        acc = byte_sum(acc, &self.info.into_bits().to_ne_bytes());
        acc = byte_sum(acc, &self.prev.addr().to_ne_bytes());
        acc = byte_sum(acc, &self.next.addr().to_ne_bytes());
        acc = byte_sum(acc, &self.used.to_ne_bytes());
        acc = byte_sum(acc, &self.reserved.to_ne_bytes());
        byte_sum(acc, &self.unused.to_ne_bytes())
    }

    #[inline]
    pub(crate) fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    #[inline]
    pub(crate) fn is_intact(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    #[inline]
    pub(crate) fn address(&self) -> usize {
        ptr::from_ref(self).addr()
    }

    #[inline]
    pub(crate) fn payload(&self) -> usize {
        self.address() + HEADER_SIZE
    }

    /// First byte of the unused tail.
    #[inline]
    pub(crate) fn tail_start(&self) -> usize {
        self.payload() + self.used + self.reserved
    }

    /// One past the last byte of the block.
    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.tail_start() + self.unused
    }

    #[inline]
    pub(crate) const fn is_head(&self) -> bool {
        self.info.head()
    }

    #[inline]
    pub(crate) const fn is_free(&self) -> bool {
        self.used == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr::null_mut;

    fn header() -> BlockHeader {
        let mut h = BlockHeader {
            tag: pool_tag(*b"Test"),
            checksum: 0,
            info: BlockInfo::new().with_align_shift(4),
            prev: null_mut(),
            next: null_mut(),
            used: 0x40,
            reserved: 0,
            unused: 0x100,
        };
        h.seal();
        h
    }

    #[test]
    fn header_is_three_alignment_units() {
        assert_eq!(HEADER_SIZE, 48);
    }

    #[test]
    fn sealed_header_is_intact() {
        let h = header();
        assert!(h.is_intact());
    }

    #[test]
    fn any_field_change_breaks_the_checksum() {
        let mut h = header();
        h.used += 1;
        assert!(!h.is_intact());

        let mut h = header();
        h.info = h.info.with_head(true);
        assert!(!h.is_intact());

        let mut h = header();
        h.checksum ^= 1;
        assert!(!h.is_intact());
    }

    #[test]
    fn geometry() {
        let h = header();
        assert_eq!(h.payload(), h.address() + HEADER_SIZE);
        assert_eq!(h.end(), h.payload() + 0x40 + 0x100);
        assert!(!h.is_free());
        assert!(!h.is_head());
    }
}

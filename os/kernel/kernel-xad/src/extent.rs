//! # Extents
//!
//! An extent is a half-open address range `[start, end)` tagged with a usage
//! type. Inside an [`XadTree`](crate::XadTree) extents partition the tracked
//! region: they never overlap, leave no gaps, and two range-adjacent extents
//! never share a type.

use crate::XadError;
use core::cmp::Ordering;
use core::fmt;
use kernel_avl::{NodeId, TreeAdapter};

/// Usage tag of an extent.
///
/// The values are opaque to the tree except for [`ExtentType::FREE`], which
/// is what size lookups search for by default.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ExtentType(u16);

impl ExtentType {
    /// Available for allocation.
    pub const FREE: Self = Self(0);
    /// Never handed out (firmware, holes, MMIO windows).
    pub const RESERVED: Self = Self(1);
    /// Generic allocation.
    pub const IN_USE: Self = Self(2);
    /// Backing store of a pool arena.
    pub const POOL: Self = Self(3);
    /// Paging structures.
    pub const PAGE_TABLE: Self = Self(4);
    /// Kernel or interrupt stacks.
    pub const STACK: Self = Self(5);
    /// Loaded kernel or driver images.
    pub const IMAGE: Self = Self(6);

    #[inline]
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        self.0 == Self::FREE.0
    }

    const fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::FREE => "free",
            Self::RESERVED => "reserved",
            Self::IN_USE => "in-use",
            Self::POOL => "pool",
            Self::PAGE_TABLE => "page-table",
            Self::STACK => "stack",
            Self::IMAGE => "image",
            _ => return None,
        })
    }
}

impl fmt::Debug for ExtentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ExtentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "type({})", self.0),
        }
    }
}

/// A non-empty half-open address range `[start, end)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ExtentRange {
    start: u64,
    end: u64,
}

impl ExtentRange {
    /// # Errors
    /// [`XadError::InvalidRange`] if the range is empty or inverted.
    pub const fn new(start: u64, end: u64) -> Result<Self, XadError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(XadError::InvalidRange { start, end })
        }
    }

    /// # Errors
    /// [`XadError::InvalidRange`] if `len` is zero or the end overflows.
    pub const fn from_len(start: u64, len: u64) -> Result<Self, XadError> {
        match start.checked_add(len) {
            Some(end) => Self::new(start, end),
            None => Err(XadError::InvalidRange {
                start,
                end: u64::MAX,
            }),
        }
    }

    /// One-byte probe used for address lookups.
    #[inline]
    pub(crate) const fn point(address: u64) -> Self {
        Self {
            start: address,
            end: address.saturating_add(1),
        }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Always `false`; ranges are non-empty by construction.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    #[inline]
    #[must_use]
    pub const fn contains_range(&self, other: &Self) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Three-way compare where any overlap counts as equal.
    #[inline]
    pub(crate) const fn compare(&self, other: &Self) -> Ordering {
        if self.end <= other.start {
            Ordering::Less
        } else if self.start >= other.end {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    #[inline]
    pub(crate) const fn set_start(&mut self, start: u64) {
        debug_assert!(start < self.end);
        self.start = start;
    }

    #[inline]
    pub(crate) const fn set_end(&mut self, end: u64) {
        debug_assert!(self.start < end);
        self.end = end;
    }
}

impl fmt::Debug for ExtentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ExtentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}

/// A tracked range and its type, plus the size bucket links.
#[derive(Clone)]
pub struct Extent {
    pub(crate) range: ExtentRange,
    pub(crate) ty: ExtentType,
    pub(crate) previous: ExtentType,
    pub(crate) bucket: Option<u8>,
    pub(crate) bucket_prev: Option<NodeId>,
    pub(crate) bucket_next: Option<NodeId>,
}

impl Extent {
    pub(crate) const fn new(range: ExtentRange, ty: ExtentType, previous: ExtentType) -> Self {
        Self {
            range,
            ty,
            previous,
            bucket: None,
            bucket_prev: None,
            bucket_next: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn range(&self) -> ExtentRange {
        self.range
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.range.start
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.range.end
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.range.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Current usage type.
    #[inline]
    #[must_use]
    pub const fn ty(&self) -> ExtentType {
        self.ty
    }

    /// The type this range had before it was last reclaimed; freeing
    /// restores it.
    #[inline]
    #[must_use]
    pub const fn previous_type(&self) -> ExtentType {
        self.previous
    }

    /// Size bucket the extent is currently linked into; `None` unless it
    /// is free.
    #[inline]
    #[must_use]
    pub const fn bucket(&self) -> Option<usize> {
        match self.bucket {
            Some(index) => Some(index as usize),
            None => None,
        }
    }
}

impl fmt::Debug for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extent")
            .field("range", &self.range)
            .field("ty", &self.ty)
            .field("previous", &self.previous)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (was {}", self.range, self.ty, self.previous)?;
        match self.bucket {
            Some(index) => write!(f, ", bucket {index})"),
            None => f.write_str(")"),
        }
    }
}

/// Orders extents by range; overlapping ranges compare equal, so an
/// overlapping insert is rejected as a key collision.
#[derive(Debug, Default, Copy, Clone)]
pub struct ExtentAdapter;

impl TreeAdapter for ExtentAdapter {
    type Value = Extent;
    type Key = ExtentRange;

    #[inline]
    fn key<'v>(&self, value: &'v Extent) -> &'v ExtentRange {
        &value.range
    }

    #[inline]
    fn compare(&self, probe: &ExtentRange, node: &ExtentRange) -> Ordering {
        probe.compare(node)
    }

    fn describe(&self, value: &Extent, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(value, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_reject_empty_and_inverted() {
        assert!(ExtentRange::new(0x1000, 0x1000).is_err());
        assert!(ExtentRange::new(0x2000, 0x1000).is_err());
        assert!(ExtentRange::from_len(0x1000, 0).is_err());
        assert!(ExtentRange::from_len(u64::MAX, 2).is_err());
        let r = ExtentRange::from_len(0x1000, 0x1000).unwrap();
        assert_eq!(r.end(), 0x2000);
        assert_eq!(r.len(), 0x1000);
    }

    #[test]
    fn overlap_compares_equal() {
        let a = ExtentRange::new(0x1000, 0x2000).unwrap();
        let b = ExtentRange::new(0x2000, 0x3000).unwrap();
        let c = ExtentRange::new(0x1800, 0x2800).unwrap();
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&c), Ordering::Equal);
        assert_eq!(ExtentRange::point(0x1fff).compare(&a), Ordering::Equal);
        assert_eq!(ExtentRange::point(0x2000).compare(&a), Ordering::Greater);
    }

    #[test]
    fn type_names() {
        assert_eq!(ExtentType::FREE.to_string(), "free");
        assert_eq!(ExtentType::new(99).to_string(), "type(99)");
        assert!(ExtentType::FREE.is_free());
        assert!(!ExtentType::IN_USE.is_free());
    }
}

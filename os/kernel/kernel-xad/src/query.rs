use crate::ExtentType;
use bitfield_struct::bitfield;

/// Modifiers for [`XadTree::lookup`](crate::XadTree::lookup).
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct LookupFlags {
    /// Accept an extent of any type (size lookups otherwise only return
    /// extents of the hinted type, [`ExtentType::FREE`] by default).
    pub ignore_type: bool,

    /// Address lookups only match an extent that *starts* at the address.
    pub exact_start: bool,

    /// Size lookups scan from the largest bucket down instead of from the
    /// smallest fitting bucket up.
    pub largest_first: bool,

    #[bits(5)]
    __reserved: u8,
}

/// What to look for in an extent tree.
///
/// With an address, the extent containing it is returned (and checked
/// against size and type, if given). Without one, the size buckets are
/// scanned for an extent of at least `size` bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExtentQuery {
    pub address: Option<u64>,
    pub size: Option<u64>,
    pub ty: Option<ExtentType>,
    pub flags: LookupFlags,
}

impl ExtentQuery {
    /// The extent containing `address`.
    #[must_use]
    pub const fn at(address: u64) -> Self {
        Self {
            address: Some(address),
            size: None,
            ty: None,
            flags: LookupFlags::new(),
        }
    }

    /// A free extent of at least `size` bytes.
    #[must_use]
    pub const fn with_size(size: u64) -> Self {
        Self {
            address: None,
            size: Some(size),
            ty: None,
            flags: LookupFlags::new(),
        }
    }

    #[must_use]
    pub const fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub const fn of_type(mut self, ty: ExtentType) -> Self {
        self.ty = Some(ty);
        self
    }

    #[must_use]
    pub const fn flags(mut self, flags: LookupFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Type a candidate has to carry, or `None` if any type is accepted.
    pub(crate) const fn required_type(&self) -> Option<ExtentType> {
        if self.flags.ignore_type() {
            None
        } else if self.address.is_some() {
            self.ty
        } else {
            match self.ty {
                Some(ty) => Some(ty),
                None => Some(ExtentType::FREE),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_type_filter() {
        assert_eq!(ExtentQuery::at(0).required_type(), None);
        assert_eq!(
            ExtentQuery::at(0).of_type(ExtentType::IN_USE).required_type(),
            Some(ExtentType::IN_USE)
        );
        assert_eq!(
            ExtentQuery::with_size(1).required_type(),
            Some(ExtentType::FREE)
        );
        let any = ExtentQuery::with_size(1).flags(LookupFlags::new().with_ignore_type(true));
        assert_eq!(any.required_type(), None);
    }

    #[test]
    fn flag_bits() {
        let flags = LookupFlags::new()
            .with_exact_start(true)
            .with_largest_first(true);
        assert_eq!(flags.into_bits(), 0b110);
        assert!(LookupFlags::from_bits(0b001).ignore_type());
    }
}

use crate::bucket::{BucketIter, SizeBuckets, bucket_of};
use crate::extent::{Extent, ExtentAdapter, ExtentRange, ExtentType};
use crate::query::ExtentQuery;
use crate::XadError;
use kernel_avl::{AvlTree, LookupMode, NodeId};
use kernel_info::memory::SIZE_BUCKETS;
use kernel_info::region::RegionConfig;
use log::{debug, info, warn};

/// Extent tree over one address region.
///
/// An AVL tree of [`Extent`]s ordered by range, plus size buckets over the
/// free ones. Not internally locked.
pub struct XadTree {
    name: &'static str,
    region: ExtentRange,
    pub(crate) tree: AvlTree<ExtentAdapter>,
    pub(crate) buckets: SizeBuckets,
}

impl XadTree {
    /// Track `region` as a single free extent.
    #[must_use]
    pub fn new(name: &'static str, region: ExtentRange) -> Self {
        let mut this = Self {
            name,
            region,
            tree: AvlTree::new(ExtentAdapter),
            buckets: SizeBuckets::new(),
        };
        this.reset();
        info!("xad[{name}]: tracking {region}");
        this
    }

    /// # Errors
    /// [`XadError::InvalidRange`] for an empty region or one that wraps.
    pub fn from_region(name: &'static str, config: &RegionConfig) -> Result<Self, XadError> {
        let start = config.area_start as u64;
        let range = ExtentRange::from_len(start, config.area_size as u64)?;
        Ok(Self::new(name, range))
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The tracked region.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> ExtentRange {
        self.region
    }

    /// Number of extents.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Always `false` while the tree upholds its partition; kept for API symmetry.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Forget every extent and start over with one free extent.
    pub fn reset(&mut self) {
        self.tree.clear();
        self.buckets.clear();
        let extent = Extent::new(self.region, ExtentType::FREE, ExtentType::FREE);
        match self.tree.insert(extent) {
            Ok(id) => self.buckets.link(&mut self.tree, id),
            Err(e) => corrupted(self.name, "seeding an empty tree", &e),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Extent> {
        self.tree.get(id)
    }

    /// Handle of the extent containing `address`.
    #[must_use]
    pub fn find(&self, address: u64) -> Option<NodeId> {
        self.tree
            .lookup(&ExtentRange::point(address), LookupMode::Exact)
    }

    /// Resolve a target extent.
    ///
    /// With an address the containing extent is returned after checking the
    /// optional start, size and type constraints. Without one, a free extent
    /// comes from the size buckets, scanned from the smallest bucket that can
    /// hold `size` upwards (or from the top down with
    /// [`largest_first`](crate::LookupFlags::largest_first)). Any other type,
    /// or [`ignore_type`](crate::LookupFlags::ignore_type), walks the extents
    /// in address order and takes the first fit (the largest with
    /// `largest_first`).
    ///
    /// # Errors
    /// [`XadError::NotFound`] if nothing matches, [`XadError::InvalidRange`]
    /// for a zero size.
    pub fn lookup(&self, query: &ExtentQuery) -> Result<NodeId, XadError> {
        let required = query.required_type();

        if let Some(address) = query.address {
            let id = self.find(address).ok_or(XadError::NotFound)?;
            let extent = self.extent(id);
            if query.flags.exact_start() && extent.start() != address {
                return Err(XadError::NotFound);
            }
            if let Some(size) = query.size {
                let wanted = ExtentRange::from_len(address, size)?;
                if !extent.range.contains_range(&wanted) {
                    return Err(XadError::NotFound);
                }
            }
            if let Some(ty) = required
                && extent.ty != ty
            {
                return Err(XadError::NotFound);
            }
            return Ok(id);
        }

        let size = query.size.unwrap_or(1);
        if size == 0 {
            return Err(XadError::InvalidRange { start: 0, end: 0 });
        }
        let fits = |extent: &Extent| {
            extent.len() >= size && required.is_none_or(|ty| extent.ty == ty)
        };

        let found = if required.is_some_and(ExtentType::is_free) {
            let first = bucket_of(size);
            let scan = |b: usize| {
                self.bucket(b)
                    .find(|&(_, e)| fits(e))
                    .map(|(id, _)| id)
            };
            if query.flags.largest_first() {
                (first..SIZE_BUCKETS).rev().find_map(scan)
            } else {
                (first..SIZE_BUCKETS).find_map(scan)
            }
        } else {
            let mut candidates = self.extents().filter(|&(_, e)| fits(e));
            let found = if query.flags.largest_first() {
                candidates.max_by_key(|(_, e)| e.len())
            } else {
                candidates.next()
            };
            found.map(|(id, _)| id)
        };
        found.ok_or(XadError::NotFound)
    }

    /// Track a new extent. No merging happens; callers of this primitive are
    /// responsible for the partition (see [`check_invariants`](Self::check_invariants)).
    ///
    /// # Errors
    /// [`XadError::InvalidRange`] outside the region, [`XadError::Overlap`]
    /// if any tracked extent overlaps.
    pub fn insert(&mut self, range: ExtentRange, ty: ExtentType) -> Result<NodeId, XadError> {
        if !self.region.contains_range(&range) {
            return Err(XadError::InvalidRange {
                start: range.start(),
                end: range.end(),
            });
        }
        let id = self.tree.insert(Extent::new(range, ty, ty))?;
        self.buckets.link(&mut self.tree, id);
        debug!("xad[{}]: insert {range} {ty}", self.name);
        Ok(id)
    }

    /// Stop tracking the extent whose range is exactly `range`.
    ///
    /// # Errors
    /// [`XadError::NotFound`] if no extent has exactly this range.
    pub fn delete(&mut self, range: &ExtentRange) -> Result<Extent, XadError> {
        let id = self
            .tree
            .lookup(range, LookupMode::Exact)
            .filter(|id| self.extent(*id).range == *range)
            .ok_or(XadError::NotFound)?;
        let extent = self.remove_node(id);
        debug!("xad[{}]: delete {}", self.name, extent);
        Ok(extent)
    }

    /// Retype `range` inside the extent `target` to `ty`.
    ///
    /// The extent `[s1, e1)` of type `t1` is cut into `[s1, s2)` `t1`,
    /// `[s2, e2)` `ty` and `[e2, e1)` `t1`, skipping empty pieces. The piece
    /// starting at `s1` keeps the original node; the middle piece remembers
    /// `t1` as its previous type and is merged with same-typed neighbors.
    /// Returns the handle of the (possibly merged) middle piece.
    ///
    /// All checks run before the first change; a failed reclaim leaves the
    /// tree untouched.
    ///
    /// # Errors
    /// [`XadError::StaleHandle`] for a dead `target`, [`XadError::InvalidRange`]
    /// if `range` is not inside it, [`XadError::TypeMismatch`] if `expected`
    /// is given and differs from the target's type.
    pub fn reclaim(
        &mut self,
        target: NodeId,
        range: ExtentRange,
        ty: ExtentType,
        expected: Option<ExtentType>,
    ) -> Result<NodeId, XadError> {
        let original = self.tree.get(target).ok_or(XadError::StaleHandle(target))?;
        let (whole, t1, previous) = (original.range, original.ty, original.previous);

        if !whole.contains_range(&range) {
            warn!(
                "xad[{}]: reclaim of {range} outside target {whole}",
                self.name
            );
            return Err(XadError::InvalidRange {
                start: range.start(),
                end: range.end(),
            });
        }
        if let Some(expected) = expected
            && expected != t1
        {
            return Err(XadError::TypeMismatch {
                expected,
                found: t1,
            });
        }
        if t1 == ty {
            return Ok(target);
        }

        let (s1, e1) = (whole.start(), whole.end());
        let (s2, e2) = (range.start(), range.end());

        // Shrink or retype the original node first so the new pieces never
        // overlap it.
        self.buckets.unlink(&mut self.tree, target);
        let middle = {
            let extent = self.extent_mut(target);
            if s2 > s1 {
                extent.range.set_end(s2);
                None
            } else {
                extent.range.set_end(e2);
                extent.previous = t1;
                extent.ty = ty;
                Some(target)
            }
        };
        self.buckets.link(&mut self.tree, target);

        let middle = match middle {
            Some(id) => id,
            None => self.insert_piece(Extent::new(range, ty, t1)),
        };
        if e2 < e1 {
            let mut tail = whole;
            tail.set_start(e2);
            self.insert_piece(Extent::new(tail, t1, previous));
        }

        debug!("xad[{}]: reclaim {range} {t1} -> {ty}", self.name);
        let middle = self.merge_node(middle);
        self.verify();
        Ok(middle)
    }

    /// [`reclaim`](Self::reclaim) on the extent containing `range.start()`.
    ///
    /// # Errors
    /// As for [`reclaim`](Self::reclaim), plus [`XadError::NotFound`] if no
    /// extent contains the start address.
    pub fn reclaim_at(
        &mut self,
        range: ExtentRange,
        ty: ExtentType,
        expected: Option<ExtentType>,
    ) -> Result<NodeId, XadError> {
        let target = self.find(range.start()).ok_or(XadError::NotFound)?;
        self.reclaim(target, range, ty, expected)
    }

    /// Merge the extent containing `address` with every range-adjacent
    /// extent of the same type. Returns the surviving handle.
    ///
    /// # Errors
    /// [`XadError::NotFound`] if no extent contains `address`.
    pub fn merge_adjacent(&mut self, address: u64) -> Result<NodeId, XadError> {
        let id = self.find(address).ok_or(XadError::NotFound)?;
        let id = self.merge_node(id);
        self.verify();
        Ok(id)
    }

    /// All extents in address order.
    pub fn extents(&self) -> impl Iterator<Item = (NodeId, &Extent)> + '_ {
        self.tree.iter()
    }

    /// Free extents in size bucket `index`.
    ///
    /// # Panics
    /// If `index >= SIZE_BUCKETS`.
    #[must_use]
    pub fn bucket(&self, index: usize) -> BucketIter<'_> {
        BucketIter {
            tree: &self.tree,
            next: self.buckets.bucket(index).head,
        }
    }

    /// Number of free extents linked into size bucket `index`.
    #[must_use]
    pub const fn bucket_len(&self, index: usize) -> usize {
        self.buckets.bucket(index).len
    }

    /// Total bytes covered by extents of type `ty`.
    #[must_use]
    pub fn bytes_of_type(&self, ty: ExtentType) -> u64 {
        self.extents()
            .filter(|(_, e)| e.ty == ty)
            .map(|(_, e)| e.len())
            .sum()
    }

    /// The largest extent of type `ty`. Free extents are found through the
    /// buckets, other types by a walk over all extents.
    #[must_use]
    pub fn largest_extent_of_type(&self, ty: ExtentType) -> Option<NodeId> {
        if !ty.is_free() {
            return self
                .extents()
                .filter(|(_, e)| e.ty == ty)
                .max_by_key(|(_, e)| e.len())
                .map(|(id, _)| id);
        }
        (0..SIZE_BUCKETS).rev().find_map(|b| {
            self.bucket(b)
                .max_by_key(|(_, e)| e.len())
                .map(|(id, _)| id)
        })
    }

    /// Log every extent at debug level.
    pub fn dump(&self) {
        debug!(
            "xad[{}]: {} extent(s) over {}",
            self.name,
            self.len(),
            self.region
        );
        for (id, extent) in self.extents() {
            debug!("  {id}: {extent}");
        }
    }

    /// Absorb same-typed neighbors into `id` until none is left.
    fn merge_node(&mut self, id: NodeId) -> NodeId {
        loop {
            let extent = self.extent(id);
            let (range, ty) = (extent.range, extent.ty);

            let left = self
                .tree
                .predecessor(id)
                .filter(|l| self.extent(*l).end() == range.start() && self.extent(*l).ty == ty);
            if let Some(left) = left {
                let absorbed = self.remove_node(left);
                self.buckets.unlink(&mut self.tree, id);
                self.extent_mut(id).range.set_start(absorbed.start());
                self.buckets.link(&mut self.tree, id);
                debug!("xad[{}]: merged {} into {range}", self.name, absorbed.range);
                continue;
            }

            let right = self
                .tree
                .successor(id)
                .filter(|r| self.extent(*r).start() == range.end() && self.extent(*r).ty == ty);
            if let Some(right) = right {
                let absorbed = self.remove_node(right);
                self.buckets.unlink(&mut self.tree, id);
                self.extent_mut(id).range.set_end(absorbed.end());
                self.buckets.link(&mut self.tree, id);
                debug!("xad[{}]: merged {} into {range}", self.name, absorbed.range);
                continue;
            }

            return id;
        }
    }

    /// Insert a piece whose range was vacated by the caller.
    fn insert_piece(&mut self, extent: Extent) -> NodeId {
        match self.tree.insert(extent) {
            Ok(id) => {
                self.buckets.link(&mut self.tree, id);
                id
            }
            Err(e) => corrupted(self.name, "inserting a split piece", &e),
        }
    }

    fn remove_node(&mut self, id: NodeId) -> Extent {
        self.buckets.unlink(&mut self.tree, id);
        match self.tree.remove(id) {
            Ok(extent) => extent,
            Err(e) => corrupted(self.name, "removing an extent", &e),
        }
    }

    #[inline]
    fn extent(&self, id: NodeId) -> &Extent {
        self.tree
            .get(id)
            .unwrap_or_else(|| corrupted(self.name, "resolving an extent", &id))
    }

    #[inline]
    fn extent_mut(&mut self, id: NodeId) -> &mut Extent {
        let name = self.name;
        self.tree
            .get_mut(id)
            .unwrap_or_else(|| corrupted(name, "resolving an extent", &id))
    }

    /// Full consistency walk after a mutation in paranoid builds.
    #[inline]
    fn verify(&self) {
        if cfg!(feature = "paranoid")
            && let Err(violation) = self.check_invariants()
        {
            corrupted(self.name, "verifying the partition", &violation);
        }
    }
}

#[cold]
fn corrupted(name: &str, context: &str, detail: &dyn core::fmt::Display) -> ! {
    log::error!("xad[{name}]: corrupted while {context}: {detail}");
    panic!("xad[{name}]: corrupted while {context}: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::PAGE_SIZE;

    fn range(start: u64, end: u64) -> ExtentRange {
        ExtentRange::new(start, end).unwrap()
    }

    #[test]
    fn starts_as_one_free_extent() {
        let xad = XadTree::new("test", range(0, 0x10_0000));
        assert_eq!(xad.len(), 1);
        let (_, e) = xad.extents().next().unwrap();
        assert_eq!(e.range(), range(0, 0x10_0000));
        assert_eq!(e.ty(), ExtentType::FREE);
        assert_eq!(xad.bucket_len(8), 1);
        xad.check_invariants().unwrap();
    }

    #[test]
    fn reclaim_at_the_start_retypes_in_place() {
        let mut xad = XadTree::new("test", range(0, 0x10_0000));
        let original = xad.find(0).unwrap();
        let id = xad
            .reclaim(original, range(0, 0x4000), ExtentType::IN_USE, None)
            .unwrap();
        assert_eq!(id, original);
        assert_eq!(xad.get(id).unwrap().previous_type(), ExtentType::FREE);
        assert_eq!(xad.len(), 2);
        xad.check_invariants().unwrap();
    }

    #[test]
    fn reclaim_of_the_whole_extent_keeps_one_node() {
        let mut xad = XadTree::new("test", range(0, 8 * PAGE_SIZE));
        let id = xad.find(0).unwrap();
        xad.reclaim(id, range(0, 8 * PAGE_SIZE), ExtentType::STACK, None)
            .unwrap();
        assert_eq!(xad.len(), 1);
        assert_eq!(xad.bytes_of_type(ExtentType::STACK), 8 * PAGE_SIZE);
        xad.check_invariants().unwrap();
    }

    #[test]
    fn failed_reclaim_does_not_mutate() {
        let mut xad = XadTree::new("test", range(0, 0x10_0000));
        let id = xad.find(0).unwrap();
        assert_eq!(
            xad.reclaim(
                id,
                range(0x1000, 0x2000),
                ExtentType::IN_USE,
                Some(ExtentType::RESERVED)
            ),
            Err(XadError::TypeMismatch {
                expected: ExtentType::RESERVED,
                found: ExtentType::FREE
            })
        );
        assert!(matches!(
            xad.reclaim(id, range(0xf_f000, 0x11_0000), ExtentType::IN_USE, None),
            Err(XadError::InvalidRange { .. })
        ));
        assert_eq!(xad.len(), 1);
        xad.check_invariants().unwrap();
    }

    #[test]
    fn reclaim_to_the_same_type_is_a_no_op() {
        let mut xad = XadTree::new("test", range(0, 0x10_0000));
        let id = xad.find(0).unwrap();
        assert_eq!(
            xad.reclaim(id, range(0x1000, 0x2000), ExtentType::FREE, None),
            Ok(id)
        );
        assert_eq!(xad.len(), 1);
    }

    #[test]
    fn merged_neighbors_leave_stale_handles() {
        let mut xad = XadTree::new("test", range(0, 0x10_0000));
        let id = xad.find(0).unwrap();
        let mid = xad
            .reclaim(id, range(0x1000, 0x2000), ExtentType::IN_USE, None)
            .unwrap();
        let head = xad.find(0).unwrap();
        let tail = xad.find(0x2000).unwrap();
        assert_eq!(head, id);

        // Freeing retypes the middle node in place and absorbs both neighbors.
        let merged = xad
            .reclaim(mid, range(0x1000, 0x2000), ExtentType::FREE, None)
            .unwrap();
        assert_eq!(merged, mid);
        assert_eq!(xad.len(), 1);
        assert!(matches!(
            xad.reclaim(head, range(0, 0x1000), ExtentType::IN_USE, None),
            Err(XadError::StaleHandle(_))
        ));
        assert!(xad.get(tail).is_none());
    }

    #[test]
    fn handles_from_another_tree_are_stale() {
        let mut physical = XadTree::new("physical", range(0, 0x10_0000));
        let mut virt = XadTree::new("virtual", range(0, 0x10_0000));
        let foreign = physical.find(0).unwrap();
        let local = virt.find(0).unwrap();
        assert_eq!(foreign.index(), local.index());

        assert_eq!(
            virt.reclaim(foreign, range(0, 0x1000), ExtentType::IN_USE, None),
            Err(XadError::StaleHandle(foreign))
        );
        assert!(virt.get(foreign).is_none());
        assert_eq!(virt.len(), 1);
        assert_eq!(virt.bytes_of_type(ExtentType::FREE), 0x10_0000);

        // The handle still works where it came from.
        physical
            .reclaim(foreign, range(0, 0x1000), ExtentType::IN_USE, None)
            .unwrap();
        physical.check_invariants().unwrap();
        virt.check_invariants().unwrap();
    }

    #[test]
    fn only_free_extents_sit_in_buckets() {
        let mut xad = XadTree::new("test", range(0, 0x10_0000));
        let id = xad.find(0).unwrap();
        let used = xad
            .reclaim(id, range(0x1000, 0x3000), ExtentType::IN_USE, None)
            .unwrap();
        assert_eq!(xad.get(used).unwrap().bucket(), None);
        assert_eq!(xad.get(id).unwrap().bucket(), Some(0));

        // [0, 0x1000) and [0x3000, 0x10_0000) are linked, the middle is not.
        let linked: usize = (0..SIZE_BUCKETS).map(|b| xad.bucket_len(b)).sum();
        assert_eq!(linked, 2);
        assert!((0..SIZE_BUCKETS).all(|b| xad.bucket(b).all(|(_, e)| e.ty().is_free())));
        xad.check_invariants().unwrap();

        // Freeing links the merged extent again.
        let merged = xad
            .reclaim(used, range(0x1000, 0x3000), ExtentType::FREE, None)
            .unwrap();
        assert_eq!(xad.get(merged).unwrap().bucket(), Some(8));
        assert_eq!(xad.bucket_len(8), 1);
        assert_eq!(xad.bucket_len(0), 0);
        xad.check_invariants().unwrap();
    }
}

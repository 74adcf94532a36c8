//! Size buckets: one doubly linked list of free extents per power-of-two page
//! count, threaded through the extents themselves via their node handles.

use crate::extent::{Extent, ExtentAdapter};
use core::iter::FusedIterator;
use kernel_avl::{AvlTree, NodeId};
use kernel_info::memory::{PAGE_SHIFT, SIZE_BUCKETS};

/// Bucket index for an extent of `len` bytes: `floor(log2(pages))`, with
/// sub-page extents in bucket 0.
#[inline]
#[must_use]
pub const fn bucket_of(len: u64) -> usize {
    let pages = len >> PAGE_SHIFT;
    let pages = if pages == 0 { 1 } else { pages };
    (u64::BITS - 1 - pages.leading_zeros()) as usize
}

#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct Bucket {
    pub(crate) head: Option<NodeId>,
    pub(crate) len: usize,
}

pub(crate) struct SizeBuckets {
    buckets: [Bucket; SIZE_BUCKETS],
}

impl SizeBuckets {
    pub(crate) const fn new() -> Self {
        Self {
            buckets: [Bucket { head: None, len: 0 }; SIZE_BUCKETS],
        }
    }

    #[inline]
    pub(crate) const fn bucket(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    /// Push `id` onto the bucket matching its current length. Extents that
    /// are not free stay unlinked.
    pub(crate) fn link(&mut self, tree: &mut AvlTree<ExtentAdapter>, id: NodeId) {
        let Some(extent) = tree.get_mut(id) else {
            return;
        };
        extent.bucket_prev = None;
        if !extent.ty.is_free() {
            extent.bucket = None;
            extent.bucket_next = None;
            return;
        }
        let index = bucket_of(extent.len());
        let head = self.buckets[index].head;

        #[allow(clippy::cast_possible_truncation)]
        {
            extent.bucket = Some(index as u8);
        }
        extent.bucket_next = head;

        if let Some(head) = head
            && let Some(next) = tree.get_mut(head)
        {
            next.bucket_prev = Some(id);
        }
        self.buckets[index].head = Some(id);
        self.buckets[index].len += 1;
    }

    /// Take `id` out of the bucket it is linked into, if any.
    pub(crate) fn unlink(&mut self, tree: &mut AvlTree<ExtentAdapter>, id: NodeId) {
        let Some(extent) = tree.get_mut(id) else {
            return;
        };
        let Some(index) = extent.bucket.take() else {
            return;
        };
        let index = usize::from(index);
        let prev = extent.bucket_prev.take();
        let next = extent.bucket_next.take();

        match prev {
            Some(prev) => {
                if let Some(p) = tree.get_mut(prev) {
                    p.bucket_next = next;
                }
            }
            None => self.buckets[index].head = next,
        }
        if let Some(next) = next
            && let Some(n) = tree.get_mut(next)
        {
            n.bucket_prev = prev;
        }
        self.buckets[index].len -= 1;
    }

    pub(crate) fn clear(&mut self) {
        self.buckets = [Bucket::default(); SIZE_BUCKETS];
    }
}

/// Free extents of one size bucket, most recently linked first.
pub struct BucketIter<'a> {
    pub(crate) tree: &'a AvlTree<ExtentAdapter>,
    pub(crate) next: Option<NodeId>,
}

impl<'a> Iterator for BucketIter<'a> {
    type Item = (NodeId, &'a Extent);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let extent = self.tree.get(id)?;
        self.next = extent.bucket_next;
        Some((id, extent))
    }
}

impl FusedIterator for BucketIter<'_> {}

use crate::bucket::bucket_of;
use crate::error::ExtentViolation;
use crate::tree::XadTree;
use kernel_info::memory::SIZE_BUCKETS;

impl XadTree {
    /// Verify the partition and the size buckets.
    ///
    /// Checks the AVL invariants, that extents tile the region without holes
    /// or overlaps, that no two adjacent extents share a type, and that every
    /// free extent (and nothing else) is linked exactly once into the bucket
    /// matching its size.
    ///
    /// # Errors
    /// The first defect encountered.
    pub fn check_invariants(&self) -> Result<(), ExtentViolation> {
        self.tree.check_invariants()?;

        let region = self.region();
        let mut extents = self.extents();
        let Some((_, first)) = extents.next() else {
            return Err(ExtentViolation::Empty);
        };
        if first.start() != region.start() {
            return Err(ExtentViolation::BadStart {
                expected: region.start(),
                found: first.start(),
            });
        }

        let mut previous = first;
        for (_, extent) in extents {
            if previous.end() != extent.start() {
                return Err(ExtentViolation::NotContiguous {
                    left: previous.range(),
                    right: extent.range(),
                });
            }
            if previous.ty() == extent.ty() {
                return Err(ExtentViolation::Unmerged {
                    left: previous.range(),
                    right: extent.range(),
                    ty: extent.ty(),
                });
            }
            previous = extent;
        }
        if previous.end() != region.end() {
            return Err(ExtentViolation::BadEnd {
                expected: region.end(),
                found: previous.end(),
            });
        }

        let mut free = 0;
        for (_, extent) in self.extents() {
            let linked = extent.bucket().is_some();
            if linked != extent.ty().is_free() {
                return Err(ExtentViolation::BucketMembership {
                    range: extent.range(),
                    ty: extent.ty(),
                    linked,
                });
            }
            free += usize::from(linked);
        }

        let mut linked = 0;
        for bucket in 0..SIZE_BUCKETS {
            let mut expected_prev = None;
            let mut members = 0;
            for (id, extent) in self.bucket(bucket) {
                if extent.bucket_prev != expected_prev {
                    return Err(ExtentViolation::BrokenBucketLink { bucket, node: id });
                }
                let expected = bucket_of(extent.len());
                if extent.bucket() != Some(bucket) || expected != bucket {
                    return Err(ExtentViolation::WrongBucket {
                        range: extent.range(),
                        expected,
                        found: bucket,
                    });
                }
                expected_prev = Some(id);
                members += 1;
                if members > self.len() {
                    // A cycle; bail out before looping forever.
                    return Err(ExtentViolation::BrokenBucketLink { bucket, node: id });
                }
            }
            if members != self.bucket_len(bucket) {
                return Err(ExtentViolation::BucketCount {
                    linked: members,
                    tracked: self.bucket_len(bucket),
                });
            }
            linked += members;
        }
        if linked != free {
            return Err(ExtentViolation::BucketCount {
                linked,
                tracked: free,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{ExtentRange, ExtentType, ExtentViolation, XadTree};

    #[test]
    fn low_level_delete_leaves_a_hole() {
        let mut xad = XadTree::new("check", ExtentRange::new(0, 0x10000).unwrap());
        let head = xad.find(0).unwrap();
        xad.reclaim(
            head,
            ExtentRange::new(0x4000, 0x8000).unwrap(),
            ExtentType::IN_USE,
            None,
        )
        .unwrap();
        xad.delete(&ExtentRange::new(0x4000, 0x8000).unwrap())
            .unwrap();
        assert!(matches!(
            xad.check_invariants(),
            Err(ExtentViolation::NotContiguous { .. })
        ));

        // Putting a same-typed piece back is caught as an unmerged neighbor.
        xad.insert(ExtentRange::new(0x4000, 0x8000).unwrap(), ExtentType::FREE)
            .unwrap();
        assert!(matches!(
            xad.check_invariants(),
            Err(ExtentViolation::Unmerged { .. })
        ));
        xad.merge_adjacent(0x4000).unwrap();
        xad.check_invariants().unwrap();
        assert_eq!(xad.len(), 1);
    }
}

use kernel_info::memory::PAGE_SIZE;
use kernel_xad::{
    ExtentQuery, ExtentRange, ExtentType, LookupFlags, XadError, XadTree, bucket_of,
};

struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

fn range(start: u64, end: u64) -> ExtentRange {
    ExtentRange::new(start, end).unwrap()
}

fn layout(xad: &XadTree) -> Vec<(u64, u64, ExtentType)> {
    xad.extents()
        .map(|(_, e)| (e.start(), e.end(), e.ty()))
        .collect()
}

#[test]
fn split_and_collapse() {
    let mut xad = XadTree::new("scenario", range(0, 0x10_0000));
    let target = xad.find(0x1000).unwrap();
    let middle = xad
        .reclaim(target, range(0x1000, 0x2000), ExtentType::IN_USE, None)
        .unwrap();
    xad.check_invariants().unwrap();

    assert_eq!(
        layout(&xad),
        vec![
            (0, 0x1000, ExtentType::FREE),
            (0x1000, 0x2000, ExtentType::IN_USE),
            (0x2000, 0x10_0000, ExtentType::FREE),
        ]
    );
    let mid = xad.get(middle).unwrap();
    assert_eq!(mid.range(), range(0x1000, 0x2000));
    assert_eq!(mid.previous_type(), ExtentType::FREE);

    // Free: reclaim back to the remembered type.
    let previous = mid.previous_type();
    xad.reclaim(middle, range(0x1000, 0x2000), previous, Some(ExtentType::IN_USE))
        .unwrap();
    xad.check_invariants().unwrap();
    assert_eq!(layout(&xad), vec![(0, 0x10_0000, ExtentType::FREE)]);
}

#[test]
fn adjacent_allocations_of_one_type_merge() {
    let mut xad = XadTree::new("merge", range(0, 0x10_0000));
    xad.reclaim_at(range(0x1000, 0x2000), ExtentType::IN_USE, Some(ExtentType::FREE))
        .unwrap();
    xad.reclaim_at(range(0x2000, 0x3000), ExtentType::IN_USE, Some(ExtentType::FREE))
        .unwrap();
    xad.check_invariants().unwrap();
    assert_eq!(
        layout(&xad),
        vec![
            (0, 0x1000, ExtentType::FREE),
            (0x1000, 0x3000, ExtentType::IN_USE),
            (0x3000, 0x10_0000, ExtentType::FREE),
        ]
    );

    // Freeing half of the merged range splits it again.
    xad.reclaim_at(range(0x1000, 0x2000), ExtentType::FREE, Some(ExtentType::IN_USE))
        .unwrap();
    xad.check_invariants().unwrap();
    assert_eq!(
        layout(&xad),
        vec![
            (0, 0x2000, ExtentType::FREE),
            (0x2000, 0x3000, ExtentType::IN_USE),
            (0x3000, 0x10_0000, ExtentType::FREE),
        ]
    );
}

#[test]
fn lookup_by_address() {
    let mut xad = XadTree::new("lookup", range(0x10_0000, 0x20_0000));
    xad.reclaim_at(range(0x11_0000, 0x12_0000), ExtentType::RESERVED, None)
        .unwrap();

    let id = xad.lookup(&ExtentQuery::at(0x11_8000)).unwrap();
    assert_eq!(xad.get(id).unwrap().ty(), ExtentType::RESERVED);

    // Type, size and start constraints.
    assert_eq!(
        xad.lookup(&ExtentQuery::at(0x11_8000).of_type(ExtentType::FREE)),
        Err(XadError::NotFound)
    );
    assert_eq!(
        xad.lookup(&ExtentQuery::at(0x11_8000).size(0x1_0000)),
        Err(XadError::NotFound)
    );
    assert!(xad.lookup(&ExtentQuery::at(0x11_8000).size(0x8000)).is_ok());
    let exact = LookupFlags::new().with_exact_start(true);
    assert_eq!(
        xad.lookup(&ExtentQuery::at(0x11_8000).flags(exact)),
        Err(XadError::NotFound)
    );
    assert!(xad.lookup(&ExtentQuery::at(0x11_0000).flags(exact)).is_ok());

    // Outside the region.
    assert_eq!(xad.lookup(&ExtentQuery::at(0x20_0000)), Err(XadError::NotFound));
    assert_eq!(xad.lookup(&ExtentQuery::at(0)), Err(XadError::NotFound));
}

#[test]
fn lookup_by_size_prefers_small_buckets() {
    let mut xad = XadTree::new("size", range(0, 0x100 * PAGE_SIZE));
    // Carve out a 2-page free hole between two reservations.
    xad.reclaim_at(range(0, 0x10 * PAGE_SIZE), ExtentType::RESERVED, None)
        .unwrap();
    xad.reclaim_at(
        range(0x12 * PAGE_SIZE, 0x20 * PAGE_SIZE),
        ExtentType::RESERVED,
        None,
    )
    .unwrap();
    xad.check_invariants().unwrap();

    let small = xad.lookup(&ExtentQuery::with_size(PAGE_SIZE)).unwrap();
    assert_eq!(xad.get(small).unwrap().range(), range(0x10 * PAGE_SIZE, 0x12 * PAGE_SIZE));

    let large = xad.lookup(&ExtentQuery::with_size(3 * PAGE_SIZE)).unwrap();
    assert_eq!(xad.get(large).unwrap().start(), 0x20 * PAGE_SIZE);

    let biggest = xad
        .lookup(
            &ExtentQuery::with_size(PAGE_SIZE)
                .flags(LookupFlags::new().with_largest_first(true)),
        )
        .unwrap();
    assert_eq!(biggest, large);

    // Reserved extents only show up when asked for.
    let reserved = xad
        .lookup(&ExtentQuery::with_size(0x10 * PAGE_SIZE).of_type(ExtentType::RESERVED))
        .unwrap();
    assert_eq!(xad.get(reserved).unwrap().start(), 0);
    let any = xad
        .lookup(
            &ExtentQuery::with_size(0xe0 * PAGE_SIZE)
                .flags(LookupFlags::new().with_ignore_type(true)),
        )
        .unwrap();
    assert_eq!(any, large);

    assert_eq!(
        xad.lookup(&ExtentQuery::with_size(0x100 * PAGE_SIZE)),
        Err(XadError::NotFound)
    );
}

#[test]
fn size_lookup_checks_length_inside_the_first_bucket() {
    // 3 pages and 2 pages both land in bucket 1; asking for 3 must skip the 2.
    let mut xad = XadTree::new("bucket", range(0, 8 * PAGE_SIZE));
    xad.reclaim_at(range(2 * PAGE_SIZE, 3 * PAGE_SIZE), ExtentType::IN_USE, None)
        .unwrap();
    assert_eq!(bucket_of(2 * PAGE_SIZE), bucket_of(3 * PAGE_SIZE));

    let id = xad.lookup(&ExtentQuery::with_size(3 * PAGE_SIZE)).unwrap();
    assert_eq!(xad.get(id).unwrap().range(), range(3 * PAGE_SIZE, 8 * PAGE_SIZE));
}

#[test]
fn bookkeeping_queries() {
    let mut xad = XadTree::new("stats", range(0, 0x40 * PAGE_SIZE));
    xad.reclaim_at(range(0, 4 * PAGE_SIZE), ExtentType::IN_USE, None)
        .unwrap();
    xad.reclaim_at(range(8 * PAGE_SIZE, 9 * PAGE_SIZE), ExtentType::IN_USE, None)
        .unwrap();

    assert_eq!(xad.bytes_of_type(ExtentType::IN_USE), 5 * PAGE_SIZE);
    assert_eq!(xad.bytes_of_type(ExtentType::FREE), 0x3b * PAGE_SIZE);
    let largest = xad.largest_extent_of_type(ExtentType::FREE).unwrap();
    assert_eq!(xad.get(largest).unwrap().range(), range(9 * PAGE_SIZE, 0x40 * PAGE_SIZE));
    assert!(xad.largest_extent_of_type(ExtentType::STACK).is_none());

    let largest_used = xad.largest_extent_of_type(ExtentType::IN_USE).unwrap();
    assert_eq!(xad.get(largest_used).unwrap().range(), range(0, 4 * PAGE_SIZE));

    // Four extents, two of them free; only those are linked.
    let total: usize = (0..64).map(|b| xad.bucket_len(b)).sum();
    assert_eq!(xad.len(), 4);
    assert_eq!(total, 2);
}

#[test]
fn in_use_extents_are_found_without_the_buckets() {
    let mut xad = XadTree::new("in-use", range(0, 0x40 * PAGE_SIZE));
    // Allocations of 1..=4 pages, one every 5 pages so none of them touch.
    for (i, pages) in [1, 2, 1, 3, 2, 4, 1, 2].into_iter().enumerate() {
        let start = i as u64 * 5 * PAGE_SIZE;
        xad.reclaim_at(range(start, start + pages * PAGE_SIZE), ExtentType::IN_USE, None)
            .unwrap();
    }
    xad.check_invariants().unwrap();
    for (_, extent) in xad.extents() {
        assert_eq!(extent.bucket().is_some(), extent.ty().is_free());
    }

    // First fit in address order, or the largest on request.
    let first = xad
        .lookup(&ExtentQuery::with_size(2 * PAGE_SIZE).of_type(ExtentType::IN_USE))
        .unwrap();
    assert_eq!(xad.get(first).unwrap().range(), range(5 * PAGE_SIZE, 7 * PAGE_SIZE));
    let largest = xad
        .lookup(
            &ExtentQuery::with_size(PAGE_SIZE)
                .of_type(ExtentType::IN_USE)
                .flags(LookupFlags::new().with_largest_first(true)),
        )
        .unwrap();
    assert_eq!(xad.get(largest).unwrap().range(), range(25 * PAGE_SIZE, 29 * PAGE_SIZE));
    assert_eq!(
        xad.lookup(&ExtentQuery::with_size(5 * PAGE_SIZE).of_type(ExtentType::IN_USE)),
        Err(XadError::NotFound)
    );
}

#[test]
fn overlapping_insert_is_rejected() {
    let mut xad = XadTree::new("overlap", range(0, 0x10_0000));
    assert_eq!(
        xad.insert(range(0x1000, 0x2000), ExtentType::IN_USE),
        Err(XadError::Overlap)
    );
    assert!(matches!(
        xad.insert(range(0x10_0000, 0x20_0000), ExtentType::IN_USE),
        Err(XadError::InvalidRange { .. })
    ));
    assert_eq!(xad.delete(&range(0, 0x1000)).err(), Some(XadError::NotFound));
}

#[test]
fn randomized_reclaims_keep_the_partition() {
    const PAGES: u64 = 256;
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
    let mut xad = XadTree::new("random", range(0, PAGES * PAGE_SIZE));
    let types = [
        ExtentType::FREE,
        ExtentType::IN_USE,
        ExtentType::RESERVED,
        ExtentType::POOL,
    ];

    // Page-granular model of the expected types.
    let mut model = vec![ExtentType::FREE; PAGES as usize];

    for _ in 0..2000 {
        let page = rng.next() % PAGES;
        let target = xad.find(page * PAGE_SIZE).unwrap();
        let extent = xad.get(target).unwrap().range();
        let first = extent.start() / PAGE_SIZE;
        let last = extent.end() / PAGE_SIZE;

        let start = first + rng.next() % (last - first);
        let end = start + 1 + rng.next() % (last - start);
        let ty = types[(rng.next() % types.len() as u64) as usize];

        xad.reclaim(target, range(start * PAGE_SIZE, end * PAGE_SIZE), ty, None)
            .unwrap();
        for p in start..end {
            model[p as usize] = ty;
        }

        xad.check_invariants().unwrap();
        for (_, e) in xad.extents() {
            for p in e.start() / PAGE_SIZE..e.end() / PAGE_SIZE {
                assert_eq!(model[p as usize], e.ty(), "page {p}");
            }
        }
    }
}

#[test]
fn reclaim_then_restore_is_identity() {
    let mut rng = XorShift(0xdead_beef_cafe_f00d);
    for _ in 0..200 {
        let mut xad = XadTree::new("roundtrip", range(0, 0x80 * PAGE_SIZE));
        // Some existing structure to round-trip against.
        xad.reclaim_at(range(0x10 * PAGE_SIZE, 0x18 * PAGE_SIZE), ExtentType::RESERVED, None)
            .unwrap();
        let before = layout(&xad);

        let free = xad.find(0x40 * PAGE_SIZE).unwrap();
        let whole = xad.get(free).unwrap().range();
        let pages = whole.len() / PAGE_SIZE;
        let offset = rng.next() % pages;
        let len = 1 + rng.next() % (pages - offset);
        let sub = ExtentRange::from_len(whole.start() + offset * PAGE_SIZE, len * PAGE_SIZE).unwrap();

        let id = xad.reclaim(free, sub, ExtentType::IN_USE, None).unwrap();
        let previous = xad.get(id).unwrap().previous_type();
        assert_eq!(previous, ExtentType::FREE);
        xad.reclaim(id, sub, previous, Some(ExtentType::IN_USE))
            .unwrap();

        xad.check_invariants().unwrap();
        assert_eq!(layout(&xad), before);
    }
}

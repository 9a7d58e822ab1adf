use gpuzones::{
    CallSite,
    ProfilerError,
    ZoneId,
    registry::ZoneRegistry,
    ring::TimestampRing,
};

fn zones(n: u64) -> Vec<ZoneId> {
    let mut registry = ZoneRegistry::new(4, 2, 4, 16);
    (0..n)
        .map(|i| registry.resolve(CallSite::from_raw(i), "z", None, 1).unwrap().zone)
        .collect()
}

#[test]
fn pairs_are_even_aligned_and_bounded_by_capacity() {
    let mut ring = TimestampRing::new(8);
    ring.reset_frame(0);
    assert_eq!(ring.bank_range(), 0..8);

    let pairs: Vec<_> = (0..4).map(|_| ring.allocate().unwrap()).collect();
    assert_eq!(pairs, vec![(0, 1), (2, 3), (4, 5), (6, 7)]);
    assert_eq!(
        ring.allocate(),
        Err(ProfilerError::QueryCapacityExceeded { capacity: 8 })
    );
}

#[test]
fn odd_frames_use_the_second_bank() {
    let mut ring = TimestampRing::new(8);
    assert_eq!(ring.pool_size(), 16);

    ring.reset_frame(1);
    assert_eq!(ring.bank(), 1);
    assert_eq!(ring.bank_range(), 8..16);
    assert_eq!(ring.allocate().unwrap(), (8, 9));

    ring.reset_frame(2);
    assert_eq!(ring.head(), 0);
    assert_eq!(ring.allocate().unwrap(), (0, 1));
}

#[test]
fn reset_only_forgets_its_own_bank() {
    let z = zones(2);
    let mut ring = TimestampRing::new(4);

    ring.reset_frame(1);
    let (s1, e1) = ring.allocate().unwrap();
    ring.bind(s1, z[0]);
    ring.bind(e1, z[0]);

    ring.reset_frame(2);
    let (s2, _) = ring.allocate().unwrap();
    ring.bind(s2, z[1]);

    // frame 3 reuses frame 1's bank
    ring.reset_frame(3);
    assert_eq!(ring.zone_for(s1), None);
    assert_eq!(ring.zone_for(e1), None);
    assert_eq!(ring.zone_for(s2), Some(z[1]));
}

#[test]
fn take_unbinds_once() {
    let z = zones(1);
    let mut ring = TimestampRing::new(4);
    ring.reset_frame(0);
    let (start, end) = ring.allocate().unwrap();
    ring.bind(start, z[0]);
    ring.bind(end, z[0]);

    assert_eq!(ring.take(start), Some(z[0]));
    assert_eq!(ring.take(start), None);
    ring.unbind(end);
    assert_eq!(ring.zone_for(end), None);
}

#[test]
fn measures_survive_until_clear() {
    let mut ring = TimestampRing::new(4);
    ring.store(5, 1234);
    assert_eq!(ring.measure(5), 1234);
    assert_eq!(ring.measure(99), 0);

    ring.clear();
    assert_eq!(ring.measure(5), 0);
    assert_eq!(ring.bank(), 0);
}

#[test]
fn oversized_capacity_is_clamped_to_one_query_set() {
    let ring = TimestampRing::new(u32::MAX);
    assert_eq!(ring.capacity(), gpuzones::config::MAX_QUERY_COUNT);
    assert_eq!(ring.pool_size(), wgpu::QUERY_SET_MAX_QUERIES);

    let ring = TimestampRing::new(0x8000_0000);
    assert_eq!(ring.pool_size(), wgpu::QUERY_SET_MAX_QUERIES);

    assert_eq!(TimestampRing::new(7).capacity(), 6);
}

//! Datagram ring: FIFO order, accounting, and the overflow regime.

use urtp_pipeline::DatagramRing;

const LEN: usize = 16;

/// Produce one datagram whose first byte tags it.
fn produce_tagged<const N: usize>(ring: &DatagramRing<N>, tag: u8) -> bool {
    ring.produce(|buf| {
        buf.fill(tag);
    })
    .overflowed
}

fn read_tag<const N: usize>(ring: &DatagramRing<N>) -> Option<u8> {
    let mut buf = [0u8; LEN];
    ring.read_head(&mut buf).map(|n| {
        assert_eq!(n, LEN);
        buf[0]
    })
}

#[test]
fn empty_ring_has_nothing_to_read() {
    let ring: DatagramRing<4> = DatagramRing::new(LEN);
    let mut buf = [0u8; LEN];
    assert_eq!(ring.read_head(&mut buf), None);
    assert_eq!(ring.free_count(), 4);
}

#[test]
fn fifo_order_and_free_accounting() {
    let ring: DatagramRing<4> = DatagramRing::new(LEN);

    assert!(!produce_tagged(&ring, 1));
    assert!(!produce_tagged(&ring, 2));
    assert_eq!(ring.free_count(), 2);
    assert_eq!(ring.used_count(), 2);

    assert_eq!(read_tag(&ring), Some(1));
    ring.release_head();
    assert_eq!(ring.free_count(), 3);

    assert_eq!(read_tag(&ring), Some(2));
    ring.release_head();
    assert_eq!(ring.free_count(), 4);
    assert_eq!(read_tag(&ring), None);

    // Every step kept free + used equal to the capacity.
    assert_eq!(ring.free_count() + ring.used_count(), ring.capacity());
}

#[test]
fn head_is_retained_until_released() {
    let ring: DatagramRing<4> = DatagramRing::new(LEN);
    produce_tagged(&ring, 9);

    // A failed send re-reads the same slot on the next wakeup.
    assert_eq!(read_tag(&ring), Some(9));
    assert_eq!(read_tag(&ring), Some(9));
    ring.release_head();
    assert_eq!(read_tag(&ring), None);
}

#[test]
fn free_count_min_is_a_low_water_mark() {
    let ring: DatagramRing<4> = DatagramRing::new(LEN);
    produce_tagged(&ring, 1);
    produce_tagged(&ring, 2);
    produce_tagged(&ring, 3);
    assert_eq!(ring.free_count_min(), 1);

    read_tag(&ring);
    ring.release_head();
    read_tag(&ring);
    ring.release_head();
    assert_eq!(ring.free_count(), 3);
    // The low-water mark does not rise again.
    assert_eq!(ring.free_count_min(), 1);
}

#[test]
fn overflow_overwrites_the_oldest_unsent_datagram() {
    let ring: DatagramRing<4> = DatagramRing::new(LEN);

    for tag in 0..4 {
        assert!(!produce_tagged(&ring, tag));
    }
    assert_eq!(ring.free_count(), 0);

    // The producer keeps going: two overflows rewrite tags 0 and 1.
    assert!(produce_tagged(&ring, 4));
    assert!(produce_tagged(&ring, 5));
    assert_eq!(ring.free_count(), 0);
    assert_eq!(ring.free_count_min(), 0);

    // The consumer resumes at its cursor, which now holds newer data
    // than it expected; the delivered order shows the skip.
    let mut delivered = Vec::new();
    while let Some(tag) = read_tag(&ring) {
        delivered.push(tag);
        ring.release_head();
    }
    assert_eq!(delivered, vec![4, 5, 2, 3]);
    assert_eq!(ring.free_count(), 4);
}

#[test]
fn sustained_overflow_keeps_exactly_one_ring_of_recent_data() {
    let ring: DatagramRing<4> = DatagramRing::new(LEN);

    // Block the consumer for three rings' worth of production.
    for tag in 0..12 {
        produce_tagged(&ring, tag);
    }

    let mut delivered = Vec::new();
    while let Some(tag) = read_tag(&ring) {
        delivered.push(tag);
        ring.release_head();
    }
    assert_eq!(delivered, vec![8, 9, 10, 11]);
}

use kadsim::{Identifier, NodeRef, Peer, RoutingTable};

fn make_id(value: u128) -> Identifier {
    let mut bytes = [0u8; 32];
    bytes[16..].copy_from_slice(&value.to_be_bytes());
    Identifier::from_bytes(8, bytes).expect("value fits 8 bits")
}

fn make_peer(value: u128) -> Peer {
    Peer::new(NodeRef::new(value as usize), make_id(value))
}

#[test]
fn routing_table_orders_peers_by_distance() {
    let mut table = RoutingTable::new(make_id(0x00), 4);

    for value in [0x10u128, 0x20, 0x08] {
        assert!(table.insert(make_peer(value)).is_none());
    }

    let target = make_id(0x18);
    let closest: Vec<u128> = table
        .k_closest(&target)
        .iter()
        .map(|peer| peer.node.index() as u128)
        .collect();
    assert_eq!(closest, vec![0x10, 0x08, 0x20]);
}

#[test]
fn routing_table_returns_at_most_k_peers() {
    let mut table = RoutingTable::new(make_id(0x00), 2);

    for value in [0x80u128, 0xc0, 0xa0, 0x90] {
        if let Some(pending) = table.insert(make_peer(value)) {
            table.resolve_full_bucket(pending, true);
        }
    }

    let closest = table.k_closest(&make_id(0x90));
    assert_eq!(closest.len(), 2);
}

#[test]
fn routing_table_never_stores_its_owner() {
    let owner = make_id(0x42);
    let mut table = RoutingTable::new(owner, 4);
    assert!(table.insert(Peer::new(NodeRef::new(9), owner)).is_none());
    assert!(table.insert(make_peer(0x41)).is_none());
    assert!(table.peers().iter().all(|peer| peer.id != owner));
}

#[test]
fn routing_table_places_peers_by_distance_bit_length() {
    let owner = make_id(0x35);
    let mut table = RoutingTable::new(owner, 8);

    for value in 0u128..=255 {
        if value == 0x35 {
            continue;
        }
        if let Some(pending) = table.insert(make_peer(value)) {
            table.resolve_full_bucket(pending, true);
        }
    }

    for index in 0..table.bucket_count() {
        assert!(table.bucket(index).len() <= 8);
        for peer in table.bucket(index).snapshot() {
            assert_eq!(owner.distance(&peer.id).bucket_index(), Some(index));
        }
    }
}

// Full bucket with a live head: the head is promoted to the tail and the
// newcomer is dropped. With a dead head, the head is evicted and the
// newcomer takes the tail slot.
#[test]
fn full_bucket_eviction_depends_on_the_head_ping() {
    let mut table = RoutingTable::new(make_id(0x00), 2);
    let (a, b, c, d) = (make_peer(4), make_peer(5), make_peer(6), make_peer(7));

    assert!(table.insert(a).is_none());
    assert!(table.insert(b).is_none());

    let pending = table.insert(c).expect("bucket holds a and b");
    assert_eq!(pending.incumbent, a);
    table.resolve_full_bucket(pending, true);
    assert_eq!(table.bucket(2).snapshot(), &[b, a]);

    let pending = table.insert(d).expect("bucket holds b and a");
    assert_eq!(pending.incumbent, b);
    table.resolve_full_bucket(pending, false);
    assert_eq!(table.bucket(2).snapshot(), &[a, d]);
}

#[test]
fn reinserting_a_known_peer_refreshes_recency() {
    let mut table = RoutingTable::new(make_id(0x00), 3);
    let (a, b, c) = (make_peer(4), make_peer(5), make_peer(6));
    assert!(table.insert(a).is_none());
    assert!(table.insert(b).is_none());
    assert!(table.insert(c).is_none());

    assert!(table.insert(a).is_none());
    assert_eq!(table.bucket(2).snapshot(), &[b, c, a]);
}

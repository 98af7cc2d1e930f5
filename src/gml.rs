//! GML rendering of a constructed network.
//!
//! One `node` block per joined node in join order, carrying the arena index
//! as the integer id and the hex identifier as a comment; one directed
//! `edge` block per routing-table entry. A node is an edge target once for
//! every other node that keeps it in a bucket; self-edges cannot occur
//! because routing tables never store their owner.

use std::fmt::Write;

use crate::network::Network;

/// Serialize the network graph as GML text.
pub fn render(network: &Network) -> String {
    let mut out = String::new();
    out.push_str("graph\n[\n");

    for (handle, node) in network.iter() {
        let _ = write!(
            out,
            "  node\n  [\n    id {}\n    comment \"{}\"\n  ]\n",
            handle.index(),
            node.identifier()
        );
    }

    for (handle, node) in network.iter() {
        for peer in network.known_peers(handle) {
            let _ = write!(
                out,
                "  edge\n  [\n    source {}\n    target {}\n    comment \"{} -> {}\"\n  ]\n",
                handle.index(),
                peer.node.index(),
                node.identifier(),
                peer.id
            );
        }
    }

    out.push_str("]\n");
    out
}

//! Minimum-weight routing over the topology graph.

use crate::network::{NetworkConnection, NetworkNode};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Heap entry ordered so that `BinaryHeap` pops the cheapest node first,
/// breaking cost ties by the node's position in the node list.
#[derive(Debug, PartialEq)]
struct Frontier {
    cost: f64,
    index: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra over an undirected graph with one edge per connection.
///
/// Edge weight is [`NetworkConnection::weight`]. Returns node ids from
/// `start` to `end` inclusive, `[start]` when both are the same node, and an
/// empty path when either id is unknown or `end` is unreachable.
///
/// Ties are deterministic for a fixed input order: equal-cost candidates are
/// expanded in node-list order and a predecessor is only replaced by a
/// strictly cheaper one, so the first relaxation wins.
pub fn shortest_path(
    nodes: &[NetworkNode],
    connections: &[NetworkConnection],
    start: &str,
    end: &str,
) -> Vec<String> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let (Some(&from), Some(&to)) = (index.get(start), index.get(end)) else {
        return Vec::new();
    };
    if from == to {
        return vec![nodes[from].id.clone()];
    }

    // Links pointing at unknown nodes are ignored.
    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); nodes.len()];
    for conn in connections {
        if let (Some(&a), Some(&b)) = (
            index.get(conn.source.as_str()),
            index.get(conn.target.as_str()),
        ) {
            let weight = conn.weight();
            adjacency[a].push((b, weight));
            if a != b {
                adjacency[b].push((a, weight));
            }
        }
    }

    let mut dist = vec![f64::INFINITY; nodes.len()];
    let mut prev: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut settled = vec![false; nodes.len()];
    let mut frontier = BinaryHeap::new();

    dist[from] = 0.0;
    frontier.push(Frontier {
        cost: 0.0,
        index: from,
    });

    while let Some(Frontier { cost, index: current }) = frontier.pop() {
        if settled[current] {
            continue;
        }
        settled[current] = true;
        if current == to {
            break;
        }

        for &(next, weight) in &adjacency[current] {
            if settled[next] {
                continue;
            }
            let alt = cost + weight;
            if alt < dist[next] {
                dist[next] = alt;
                prev[next] = Some(current);
                frontier.push(Frontier {
                    cost: alt,
                    index: next,
                });
            }
        }
    }

    if prev[to].is_none() {
        return Vec::new();
    }

    let mut path = vec![nodes[to].id.clone()];
    let mut cursor = to;
    while let Some(p) = prev[cursor] {
        path.push(nodes[p].id.clone());
        cursor = p;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Topology;

    fn line() -> Topology {
        let mut topology = Topology::new();
        for id in ["A", "B", "C"] {
            topology.add_node(NetworkNode::new(id, id)).unwrap();
        }
        topology
            .add_connection(
                NetworkConnection::new("ab", "ab", "A", "B")
                    .with_latency(10.0)
                    .with_bandwidth(100.0),
            )
            .unwrap();
        topology
            .add_connection(
                NetworkConnection::new("bc", "bc", "B", "C")
                    .with_latency(20.0)
                    .with_bandwidth(50.0),
            )
            .unwrap();
        topology
    }

    fn path(topology: &Topology, start: &str, end: &str) -> Vec<String> {
        shortest_path(&topology.nodes, &topology.connections, start, end)
    }

    #[test]
    fn test_line_topology() {
        let topology = line();
        assert_eq!(path(&topology, "A", "C"), vec!["A", "B", "C"]);
        assert_eq!(path(&topology, "C", "A"), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_start_equals_end() {
        assert_eq!(path(&line(), "A", "A"), vec!["A"]);
    }

    #[test]
    fn test_isolated_node_unreachable() {
        let mut topology = line();
        topology.add_node(NetworkNode::new("D", "D")).unwrap();
        assert!(path(&topology, "A", "D").is_empty());
        assert!(path(&topology, "D", "A").is_empty());
    }

    #[test]
    fn test_unknown_ids() {
        let topology = line();
        assert!(path(&topology, "A", "Z").is_empty());
        assert!(path(&topology, "Z", "Z").is_empty());
    }

    #[test]
    fn test_cheaper_detour_beats_direct_link() {
        let mut topology = line();
        // A-C direct weight 100 + 10 = 110 vs A-B-C 20 + 40 = 60
        topology
            .add_connection(
                NetworkConnection::new("ac", "ac", "A", "C")
                    .with_latency(100.0)
                    .with_bandwidth(100.0),
            )
            .unwrap();
        assert_eq!(path(&topology, "A", "C"), vec!["A", "B", "C"]);

        topology
            .add_connection(
                NetworkConnection::new("ac-fast", "ac-fast", "C", "A")
                    .with_latency(1.0)
                    .with_bandwidth(1000.0),
            )
            .unwrap();
        assert_eq!(path(&topology, "A", "C"), vec!["A", "C"]);
    }

    #[test]
    fn test_tie_keeps_first_relaxation() {
        let mut topology = Topology::new();
        for id in ["S", "X", "Y", "T"] {
            topology.add_node(NetworkNode::new(id, id)).unwrap();
        }
        for (id, a, b) in [("sx", "S", "X"), ("sy", "S", "Y"), ("xt", "X", "T"), ("yt", "Y", "T")] {
            topology
                .add_connection(NetworkConnection::new(id, id, a, b))
                .unwrap();
        }

        for _ in 0..10 {
            assert_eq!(path(&topology, "S", "T"), vec!["S", "X", "T"]);
        }
    }

    #[test]
    fn test_dangling_links_ignored() {
        let nodes = vec![NetworkNode::new("A", "A"), NetworkNode::new("B", "B")];
        let connections = vec![
            NetworkConnection::new("a-ghost", "g", "A", "ghost"),
            NetworkConnection::new("ghost-b", "g", "ghost", "B"),
        ];
        assert!(shortest_path(&nodes, &connections, "A", "B").is_empty());
    }
}

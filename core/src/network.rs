use crate::estimate::check_link_params;
use crate::{Result, SimError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Online,
    Offline,
    Transferring,
}

/// Canvas position. Cosmetic only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: String,
    pub label: String,
    pub position: Position,
    pub status: NodeStatus,
}

impl NetworkNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            position: Position::default(),
            status: NodeStatus::Online,
        }
    }

    /// Create a node with a freshly generated id.
    pub fn named(label: impl Into<String>) -> Self {
        Self::new(format!("node-{}", uuid::Uuid::new_v4()), label)
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    #[default]
    Wired,
    Wireless,
}

/// An undirected link between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConnection {
    pub id: String,
    pub name: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
    /// Milliseconds.
    pub latency: f64,
    /// Mbps, always > 0.
    pub bandwidth: f64,
    /// Probability in [0, 1].
    pub packet_loss: f64,
    /// Meters. Informational only.
    pub distance: f64,
}

impl NetworkConnection {
    /// A wired 10ms / 100Mbps lossless link.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: source.into(),
            target: target.into(),
            link_type: LinkType::Wired,
            latency: 10.0,
            bandwidth: 100.0,
            packet_loss: 0.0,
            distance: 100.0,
        }
    }

    pub fn between(source: impl Into<String>, target: impl Into<String>) -> Self {
        let id = format!("conn-{}", uuid::Uuid::new_v4());
        let name = format!("Link {}", &id[5..13]);
        Self::new(id, name, source, target)
    }

    pub fn with_type(mut self, link_type: LinkType) -> Self {
        self.link_type = link_type;
        self
    }

    pub fn with_latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_bandwidth(mut self, bandwidth: f64) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    pub fn with_packet_loss(mut self, packet_loss: f64) -> Self {
        self.packet_loss = packet_loss;
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_link_params(self.bandwidth, self.latency, self.packet_loss).map_err(|reason| {
            SimError::InvalidLink {
                id: self.id.clone(),
                reason,
            }
        })
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// True if this link joins `a` and `b` in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }

    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source == node_id {
            Some(&self.target)
        } else if self.target == node_id {
            Some(&self.source)
        } else {
            None
        }
    }

    /// Routing weight: latency plus an inverse-bandwidth term.
    pub fn weight(&self) -> f64 {
        self.latency + 1000.0 / self.bandwidth
    }
}

/// Nodes and links, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<NetworkNode>,
    pub connections: Vec<NetworkConnection>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Three nodes in a line: Node A - Node B - Node C.
    pub fn demo() -> Self {
        Self {
            nodes: vec![
                NetworkNode::new("node-1", "Node A").at(100.0, 100.0),
                NetworkNode::new("node-2", "Node B").at(400.0, 100.0),
                NetworkNode::new("node-3", "Node C").at(250.0, 300.0),
            ],
            connections: vec![
                NetworkConnection::new("conn-1", "Link 1", "node-1", "node-2")
                    .with_latency(10.0)
                    .with_bandwidth(100.0)
                    .with_distance(100.0),
                NetworkConnection::new("conn-2", "Link 2", "node-2", "node-3")
                    .with_type(LinkType::Wireless)
                    .with_latency(20.0)
                    .with_bandwidth(50.0)
                    .with_packet_loss(0.05)
                    .with_distance(150.0),
            ],
        }
    }

    pub fn node(&self, id: &str) -> Option<&NetworkNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn connection(&self, id: &str) -> Option<&NetworkConnection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Display label for a node id, falling back to the id itself.
    pub fn label_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.node(id).map(|n| n.label.as_str()).unwrap_or(id)
    }

    /// First link joining `a` and `b`, in insertion order.
    pub fn connection_between(&self, a: &str, b: &str) -> Option<&NetworkConnection> {
        self.connections.iter().find(|c| c.connects(a, b))
    }

    pub fn add_node(&mut self, node: NetworkNode) -> Result<()> {
        if self.node(&node.id).is_some() {
            return Err(SimError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node and every link touching it. Returns the removed links.
    pub fn remove_node(&mut self, id: &str) -> Result<Vec<NetworkConnection>> {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return Err(SimError::UnknownNode(id.to_string()));
        }

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|c| c.touches(id));
        self.connections = kept;
        Ok(removed)
    }

    pub fn add_connection(&mut self, connection: NetworkConnection) -> Result<()> {
        connection.validate()?;
        if self.connection(&connection.id).is_some() {
            return Err(SimError::DuplicateConnection(connection.id));
        }
        for end in [&connection.source, &connection.target] {
            if self.node(end).is_none() {
                return Err(SimError::UnknownNode(end.clone()));
            }
        }
        self.connections.push(connection);
        Ok(())
    }

    /// Replace the link with the same id.
    pub fn update_connection(&mut self, connection: NetworkConnection) -> Result<()> {
        connection.validate()?;
        let slot = self
            .connections
            .iter_mut()
            .find(|c| c.id == connection.id)
            .ok_or_else(|| SimError::UnknownConnection(connection.id.clone()))?;
        *slot = connection;
        Ok(())
    }

    pub fn remove_connection(&mut self, id: &str) -> Result<NetworkConnection> {
        let index = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| SimError::UnknownConnection(id.to_string()))?;
        Ok(self.connections.remove(index))
    }

    pub fn set_position(&mut self, id: &str, position: Position) -> Result<()> {
        let node = self.node_mut(id)?;
        node.position = position;
        Ok(())
    }

    pub fn set_status(&mut self, id: &str, status: NodeStatus) -> Result<()> {
        let node = self.node_mut(id)?;
        node.status = status;
        Ok(())
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut NetworkNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| SimError::UnknownNode(id.to_string()))
    }
}

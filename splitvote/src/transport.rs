use crate::*;
use log::trace;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Where a node listens
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u16);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Point-to-point request / response delivery
pub trait Transport {
    fn send(&mut self, to: Address, request: Request) -> Result<Response, Error>;
}

/// In-memory network of nodes, delivering each request synchronously to its target.
///
/// While a node handles a request it is taken out of the network, so a node can never
/// message itself; such a send fails like any other unreachable peer.
#[derive(Default)]
pub struct Network {
    nodes: BTreeMap<Address, Node>,
    down: BTreeSet<Address>,
    next: u16,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unassigned node and return its address
    pub fn spawn(&mut self) -> Address {
        let address = Address(self.next);
        self.next += 1;
        self.nodes.insert(address, Node::new(address));
        address
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.nodes.keys().copied().collect()
    }

    /// Simulate a failed node: requests to it fail with `PeerUnavailable` until reconnected
    pub fn disconnect(&mut self, address: Address) {
        self.down.insert(address);
    }

    pub fn reconnect(&mut self, address: Address) {
        self.down.remove(&address);
    }

    pub fn node(&self, address: Address) -> Option<&Node> {
        self.nodes.get(&address)
    }

    pub fn node_mut(&mut self, address: Address) -> Option<&mut Node> {
        self.nodes.get_mut(&address)
    }
}

impl Transport for Network {
    fn send(&mut self, to: Address, request: Request) -> Result<Response, Error> {
        if self.down.contains(&to) {
            return Err(Error::PeerUnavailable(to));
        }
        let mut node = self.nodes.remove(&to).ok_or(Error::PeerUnavailable(to))?;
        trace!("{} <- {}", to, request.name());
        let result = node.handle(request, self);
        self.nodes.insert(to, node);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_peers() {
        let mut net = Network::new();
        let a = net.spawn();
        let b = net.spawn();
        assert_ne!(a, b);

        match net.send(a, Request::GetRole) {
            Ok(Response::Role(RoleKind::Unassigned)) => {}
            other => panic!("unexpected {:?}", other),
        }

        net.disconnect(b);
        match net.send(b, Request::GetRole) {
            Err(Error::PeerUnavailable(addr)) => assert_eq!(addr, b),
            other => panic!("unexpected {:?}", other),
        }
        net.reconnect(b);
        assert!(net.send(b, Request::GetRole).is_ok());

        match net.send(Address(99), Request::GetRole) {
            Err(Error::PeerUnavailable(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(net.addresses(), vec![a, b]);
    }
}

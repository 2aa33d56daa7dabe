//! Topology view over a set of router configurations.
//!
//! Two active, non-loopback interfaces on distinct modelled routers that
//! share a subnet form a link, represented as a pair of directed
//! [`GraphEdge`]s. Interfaces without a modelled peer become boundary edges.
//! The graph is immutable once built.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::{BgpNeighbor, Network, RouterConfig, StaticRoute};
use crate::error::ModelError;
use crate::prefix::Prefix;
use crate::protocol::Protocol;

/// A directed edge `(router, interface) -> (peer, peer interface)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GraphEdge {
    pub router: String,
    pub interface: String,
    pub prefix: Prefix,
    pub peer: Option<String>,
    pub peer_interface: Option<String>,
    pub peer_prefix: Option<Prefix>,
}

impl GraphEdge {
    /// An edge whose far side is not modelled.
    pub fn is_boundary(&self) -> bool {
        self.peer.is_none()
    }

    /// `"router,interface"`.
    pub fn label(&self) -> String {
        format!("{},{}", self.router, self.interface)
    }
}

impl fmt::Display for GraphEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.peer, &self.peer_interface) {
            (Some(peer), Some(iface)) => {
                write!(f, "{},{} --> {},{}", self.router, self.interface, peer, iface)
            }
            _ => write!(f, "{},{} --> _", self.router, self.interface),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    configs: IndexMap<String, RouterConfig>,
    edge_map: IndexMap<String, Vec<GraphEdge>>,
    edge_index: HashMap<(String, String), GraphEdge>,
    neighbors: IndexMap<String, BTreeSet<String>>,
    bgp_sessions: IndexMap<GraphEdge, BgpNeighbor>,
    ebgp_neighbors: IndexMap<GraphEdge, u32>,
    static_routes: IndexMap<(String, String), Vec<StaticRoute>>,
    originated: IndexMap<(String, Protocol), BTreeSet<Prefix>>,
    communities: BTreeSet<String>,
}

impl Graph {
    pub fn new(network: &Network) -> Result<Self, ModelError> {
        Self::restricted(network, None)
    }

    /// Build the graph over `routers` only. Links towards routers outside
    /// the subset become boundary edges.
    pub fn restricted(
        network: &Network,
        routers: Option<&BTreeSet<String>>,
    ) -> Result<Self, ModelError> {
        let mut configs = network.router_map()?;
        if let Some(subset) = routers {
            if let Some(missing) = subset.iter().find(|r| !configs.contains_key(*r)) {
                return Err(ModelError::UnknownRouter(missing.clone()));
            }
            configs.retain(|name, _| subset.contains(name));
        }
        let links = infer_links(&configs);
        Ok(Self::from_links(configs, links))
    }

    fn from_links(configs: IndexMap<String, RouterConfig>, links: Vec<GraphEdge>) -> Self {
        let mut edge_map: IndexMap<String, Vec<GraphEdge>> =
            configs.keys().map(|r| (r.clone(), Vec::new())).collect();
        let mut edge_index = HashMap::new();
        let mut neighbors: IndexMap<String, BTreeSet<String>> =
            configs.keys().map(|r| (r.clone(), BTreeSet::new())).collect();
        for edge in links {
            if let Some(peer) = &edge.peer {
                if let Some(set) = neighbors.get_mut(&edge.router) {
                    set.insert(peer.clone());
                }
            }
            edge_index.insert((edge.router.clone(), edge.interface.clone()), edge.clone());
            if let Some(edges) = edge_map.get_mut(&edge.router) {
                edges.push(edge);
            }
        }

        let mut graph = Self {
            configs,
            edge_map,
            edge_index,
            neighbors,
            bgp_sessions: IndexMap::new(),
            ebgp_neighbors: IndexMap::new(),
            static_routes: IndexMap::new(),
            originated: IndexMap::new(),
            communities: BTreeSet::new(),
        };
        graph.index_bgp();
        graph.index_static_routes();
        graph.index_originated();
        graph.communities = graph
            .configs
            .values()
            .flat_map(RouterConfig::referenced_communities)
            .collect();
        graph
    }

    fn index_bgp(&mut self) {
        let mut sessions = Vec::new();
        for edge in self.edge_map.values().flatten() {
            let Some(neighbor) = self.local_bgp_neighbor(edge) else {
                continue;
            };
            let remote_configured = match (&edge.peer, &edge.peer_prefix) {
                (Some(peer), Some(peer_prefix)) => self
                    .configs
                    .get(peer)
                    .and_then(|c| c.bgp.as_ref())
                    .is_some_and(|b| b.neighbor_in(peer_prefix).is_some()),
                _ => true,
            };
            if remote_configured {
                sessions.push((edge.clone(), neighbor.clone()));
            }
        }
        for (edge, neighbor) in sessions {
            let local_as = self
                .configs
                .get(&edge.router)
                .and_then(|c| c.bgp.as_ref())
                .map_or(0, |b| b.local_as);
            if neighbor.remote_as != local_as {
                self.ebgp_neighbors.insert(edge.clone(), neighbor.remote_as);
            }
            self.bgp_sessions.insert(edge, neighbor);
        }
    }

    fn local_bgp_neighbor(&self, edge: &GraphEdge) -> Option<&BgpNeighbor> {
        self.configs
            .get(&edge.router)?
            .bgp
            .as_ref()?
            .neighbor_in(&edge.prefix)
    }

    fn index_static_routes(&mut self) {
        for (name, config) in &self.configs {
            for route in &config.static_routes {
                let iface = match (&route.next_hop_interface, route.next_hop_ip) {
                    (Some(iface), _) => Some(iface.clone()),
                    (None, Some(ip)) => config.interface_for(ip).map(|i| i.name.clone()),
                    (None, None) => None,
                };
                let Some(iface) = iface else {
                    continue;
                };
                if !self.edge_index.contains_key(&(name.clone(), iface.clone())) {
                    continue;
                }
                self.static_routes
                    .entry((name.clone(), iface))
                    .or_default()
                    .push(route.clone());
            }
        }
    }

    fn index_originated(&mut self) {
        for (name, config) in &self.configs {
            let active = config.interfaces.iter().filter(|i| i.active);
            let connected: BTreeSet<Prefix> = active.clone().map(|i| i.prefix.network()).collect();
            let statics: BTreeSet<Prefix> =
                config.static_routes.iter().map(|s| s.network.network()).collect();
            let ospf: BTreeSet<Prefix> = match &config.ospf {
                Some(ospf) => active
                    .filter(|i| ospf.enabled(&i.name))
                    .map(|i| i.prefix.network())
                    .collect(),
                None => BTreeSet::new(),
            };
            let bgp: BTreeSet<Prefix> = match &config.bgp {
                Some(bgp) => bgp.networks.iter().map(Prefix::network).collect(),
                None => BTreeSet::new(),
            };
            for (proto, set) in [
                (Protocol::Connected, connected),
                (Protocol::Static, statics),
                (Protocol::Ospf, ospf),
                (Protocol::Bgp, bgp),
            ] {
                self.originated.insert((name.clone(), proto), set);
            }
        }
    }

    pub fn configs(&self) -> &IndexMap<String, RouterConfig> {
        &self.configs
    }

    pub fn config(&self, router: &str) -> Option<&RouterConfig> {
        self.configs.get(router)
    }

    /// Router names in sorted order.
    pub fn routers(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn contains(&self, router: &str) -> bool {
        self.configs.contains_key(router)
    }

    pub fn num_routers(&self) -> usize {
        self.configs.len()
    }

    pub fn edge_map(&self) -> &IndexMap<String, Vec<GraphEdge>> {
        &self.edge_map
    }

    pub fn edges(&self, router: &str) -> &[GraphEdge] {
        self.edge_map.get(router).map_or(&[], Vec::as_slice)
    }

    pub fn edge(&self, router: &str, iface: &str) -> Option<&GraphEdge> {
        self.edge_index.get(&(router.to_string(), iface.to_string()))
    }

    /// Every edge of every router, in router then interface order.
    pub fn all_real_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edge_map.values().flatten()
    }

    /// The reverse direction of `edge`, if the far side is modelled.
    pub fn other_end(&self, edge: &GraphEdge) -> Option<&GraphEdge> {
        match (&edge.peer, &edge.peer_interface) {
            (Some(peer), Some(iface)) => self.edge(peer, iface),
            _ => None,
        }
    }

    pub fn neighbors(&self, router: &str) -> Option<&BTreeSet<String>> {
        self.neighbors.get(router)
    }

    /// Edges that carry an eBGP session, with the remote AS.
    pub fn ebgp_neighbors(&self) -> &IndexMap<GraphEdge, u32> {
        &self.ebgp_neighbors
    }

    pub fn bgp_session(&self, edge: &GraphEdge) -> Option<&BgpNeighbor> {
        self.bgp_sessions.get(edge)
    }

    /// Whether `proto` exchanges routes across `edge`.
    pub fn speaks_on(&self, proto: Protocol, edge: &GraphEdge) -> bool {
        match proto {
            Protocol::Connected | Protocol::Static => false,
            Protocol::Bgp => self.bgp_sessions.contains_key(edge),
            Protocol::Ospf => {
                let local = self
                    .config(&edge.router)
                    .and_then(|c| c.ospf.as_ref())
                    .is_some_and(|o| o.speaks_on(&edge.interface));
                let remote = match (&edge.peer, &edge.peer_interface) {
                    (Some(peer), Some(iface)) => self
                        .config(peer)
                        .and_then(|c| c.ospf.as_ref())
                        .is_some_and(|o| o.speaks_on(iface)),
                    _ => true,
                };
                local && remote
            }
        }
    }

    pub fn static_routes(&self, router: &str, iface: &str) -> &[StaticRoute] {
        self.static_routes
            .get(&(router.to_string(), iface.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    /// Static routes grouped by `(router, interface)`.
    pub fn all_static_routes(&self) -> &IndexMap<(String, String), Vec<StaticRoute>> {
        &self.static_routes
    }

    pub fn originated(&self, router: &str, proto: Protocol) -> Option<&BTreeSet<Prefix>> {
        self.originated.get(&(router.to_string(), proto))
    }

    /// Every prefix originated anywhere, by any protocol.
    pub fn all_originated(&self) -> BTreeSet<Prefix> {
        self.originated.values().flatten().copied().collect()
    }

    pub fn is_host(&self, router: &str) -> bool {
        self.config(router).is_some_and(|c| c.host)
    }

    /// Community tags referenced by any policy in the graph.
    pub fn communities(&self) -> &BTreeSet<String> {
        &self.communities
    }

    /// Links whose two ends lie on different subnets. Only a quotient graph
    /// has these, when two groups are joined by links between
    /// non-representatives; BGP sessions are not matched across them.
    pub fn mismatched_links(&self) -> impl Iterator<Item = &GraphEdge> {
        self.all_real_edges()
            .filter(|e| e.peer_prefix.is_some_and(|p| p.network() != e.prefix.network()))
    }

    /// Quotient graph for an abstraction mapping (concrete router to its
    /// group representative).
    ///
    /// Each representative keeps its own configuration and at most one edge
    /// towards each neighbouring group; links inside a group disappear.
    pub fn abstracted(&self, mapping: &BTreeMap<String, String>) -> Graph {
        let reps: BTreeSet<&String> = mapping.values().collect();
        let configs: IndexMap<String, RouterConfig> = self
            .configs
            .iter()
            .filter(|(name, _)| reps.contains(name))
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect();
        let group_of = |router: &str| mapping.get(router).map(String::as_str);

        let mut links = Vec::new();
        for rep in &reps {
            // One edge per neighbouring group, a direct link to its
            // representative when there is one.
            let mut toward: IndexMap<&str, &GraphEdge> = IndexMap::new();
            for edge in self.edges(rep) {
                let Some(peer) = &edge.peer else {
                    links.push(edge.clone());
                    continue;
                };
                let Some(peer_group) = group_of(peer) else {
                    continue;
                };
                if peer_group == rep.as_str() {
                    continue;
                }
                let direct = peer.as_str() == peer_group;
                let kept = toward.entry(peer_group).or_insert(edge);
                if direct && kept.peer.as_deref() != Some(peer_group) {
                    *kept = edge;
                }
            }
            for (peer_group, edge) in toward {
                let facing = self
                    .other_end(edge)
                    .filter(|f| f.router == peer_group)
                    .or_else(|| {
                        self.edges(peer_group)
                            .iter()
                            .find(|f| f.peer.as_deref().and_then(group_of) == Some(rep.as_str()))
                    });
                links.push(GraphEdge {
                    router: edge.router.clone(),
                    interface: edge.interface.clone(),
                    prefix: edge.prefix,
                    peer: facing.map(|f| f.router.clone()),
                    peer_interface: facing.map(|f| f.interface.clone()),
                    peer_prefix: facing.map(|f| f.prefix),
                });
            }
        }
        Graph::from_links(configs, links)
    }
}

fn infer_links(configs: &IndexMap<String, RouterConfig>) -> Vec<GraphEdge> {
    let mut links = Vec::new();
    for (name, config) in configs {
        for iface in config.interfaces.iter().filter(|i| i.active && !i.loopback) {
            let subnet = iface.prefix.network();
            let peer = configs
                .iter()
                .filter(|(other, _)| *other != name)
                .find_map(|(other, other_config)| {
                    other_config
                        .interfaces
                        .iter()
                        .find(|p| p.active && !p.loopback && p.prefix.network() == subnet)
                        .map(|p| (other.clone(), p))
                });
            links.push(GraphEdge {
                router: name.clone(),
                interface: iface.name.clone(),
                prefix: iface.prefix,
                peer: peer.as_ref().map(|(r, _)| r.clone()),
                peer_interface: peer.as_ref().map(|(_, p)| p.name.clone()),
                peer_prefix: peer.as_ref().map(|(_, p)| p.prefix),
            });
        }
    }
    links
}

//! Structured router configuration, as produced by an upstream parser.
//!
//! Every type deserialises from JSON with defaults for optional settings,
//! so a minimal router is just `{"name": "r1", "interfaces": [...]}`.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::prefix::{Ip, Prefix};
use crate::protocol::Protocol;

/// The input to every check: a list of router configurations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
}

impl Network {
    pub fn new(routers: Vec<RouterConfig>) -> Self {
        Self { routers }
    }

    pub fn from_json(src: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(src)?)
    }

    /// Routers keyed by name, sorted by name. Duplicate names are rejected.
    pub fn router_map(&self) -> Result<IndexMap<String, RouterConfig>, ModelError> {
        let mut sorted: Vec<&RouterConfig> = self.routers.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let mut map = IndexMap::with_capacity(sorted.len());
        for router in sorted {
            if map.insert(router.name.clone(), router.clone()).is_some() {
                return Err(ModelError::DuplicateRouter(router.name.clone()));
            }
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub name: String,
    /// End hosts are modelled like routers but change how destination
    /// header spaces are inferred for their interfaces.
    #[serde(default)]
    pub host: bool,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub ospf: Option<OspfConfig>,
    #[serde(default)]
    pub bgp: Option<BgpConfig>,
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
    #[serde(default)]
    pub acls: BTreeMap<String, Acl>,
    #[serde(default)]
    pub policies: BTreeMap<String, RoutePolicy>,
}

impl RouterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn acl(&self, name: Option<&str>) -> Option<&Acl> {
        name.and_then(|n| self.acls.get(n))
    }

    pub fn policy(&self, name: Option<&str>) -> Option<&RoutePolicy> {
        name.and_then(|n| self.policies.get(n))
    }

    /// Interface whose subnet contains `ip`, skipping loopbacks.
    pub fn interface_for(&self, ip: Ip) -> Option<&Interface> {
        self.interfaces
            .iter()
            .find(|i| i.active && !i.loopback && i.prefix.contains(ip))
    }

    pub fn runs(&self, proto: Protocol) -> bool {
        match proto {
            Protocol::Connected => true,
            Protocol::Static => !self.static_routes.is_empty(),
            Protocol::Ospf => self.ospf.is_some(),
            Protocol::Bgp => self.bgp.is_some(),
        }
    }

    /// Protocols redistributed into `proto`.
    pub fn redistributed_into(&self, proto: Protocol) -> &[Protocol] {
        match proto {
            Protocol::Ospf => self.ospf.as_ref().map_or(&[], |o| o.redistribute.as_slice()),
            Protocol::Bgp => self.bgp.as_ref().map_or(&[], |b| b.redistribute.as_slice()),
            Protocol::Connected | Protocol::Static => &[],
        }
    }

    /// Community tags mentioned by any policy on this router.
    pub fn referenced_communities(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for policy in self.policies.values() {
            for clause in &policy.clauses {
                out.extend(clause.match_community.iter().cloned());
                out.extend(clause.add_communities.iter().cloned());
                out.extend(clause.remove_communities.iter().cloned());
            }
        }
        out
    }
}

fn default_true() -> bool {
    true
}

fn default_ospf_cost() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    /// Interface address and subnet length, e.g. `10.0.0.1/24`.
    pub prefix: Prefix,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub loopback: bool,
    #[serde(default = "default_ospf_cost")]
    pub ospf_cost: u32,
    #[serde(default)]
    pub incoming_filter: Option<String>,
    #[serde(default)]
    pub outgoing_filter: Option<String>,
}

impl Interface {
    pub fn new(name: impl Into<String>, prefix: Prefix) -> Self {
        Self {
            name: name.into(),
            prefix,
            active: true,
            loopback: false,
            ospf_cost: 1,
            incoming_filter: None,
            outgoing_filter: None,
        }
    }
}

fn default_redistribution_metric() -> u32 {
    20
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OspfConfig {
    /// Names of OSPF-enabled interfaces.
    #[serde(default)]
    pub interfaces: BTreeSet<String>,
    #[serde(default)]
    pub passive: BTreeSet<String>,
    #[serde(default)]
    pub redistribute: Vec<Protocol>,
    #[serde(default = "default_redistribution_metric")]
    pub redistribution_metric: u32,
    #[serde(default)]
    pub import_policy: Option<String>,
    #[serde(default)]
    pub export_policy: Option<String>,
}

impl Default for OspfConfig {
    fn default() -> Self {
        Self {
            interfaces: BTreeSet::new(),
            passive: BTreeSet::new(),
            redistribute: Vec::new(),
            redistribution_metric: default_redistribution_metric(),
            import_policy: None,
            export_policy: None,
        }
    }
}

impl OspfConfig {
    pub fn enabled(&self, iface: &str) -> bool {
        self.interfaces.contains(iface)
    }

    /// Enabled and allowed to form adjacencies.
    pub fn speaks_on(&self, iface: &str) -> bool {
        self.enabled(iface) && !self.passive.contains(iface)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BgpConfig {
    pub local_as: u32,
    #[serde(default)]
    pub neighbors: Vec<BgpNeighbor>,
    /// Prefixes originated by `network` statements.
    #[serde(default)]
    pub networks: Vec<Prefix>,
    #[serde(default)]
    pub redistribute: Vec<Protocol>,
}

impl BgpConfig {
    /// The configured session whose peer address lies in `subnet`.
    pub fn neighbor_in(&self, subnet: &Prefix) -> Option<&BgpNeighbor> {
        self.neighbors.iter().find(|n| subnet.contains(n.address))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpNeighbor {
    pub address: Ip,
    pub remote_as: u32,
    #[serde(default)]
    pub import_policy: Option<String>,
    #[serde(default)]
    pub export_policy: Option<String>,
}

fn default_static_distance() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub network: Prefix,
    #[serde(default)]
    pub next_hop_ip: Option<Ip>,
    #[serde(default)]
    pub next_hop_interface: Option<String>,
    #[serde(default = "default_static_distance")]
    pub admin_distance: u32,
}

impl StaticRoute {
    pub fn via_interface(network: Prefix, iface: impl Into<String>) -> Self {
        Self {
            network,
            next_hop_ip: None,
            next_hop_interface: Some(iface.into()),
            admin_distance: default_static_distance(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineAction {
    Permit,
    Deny,
}

/// First-match packet filter with an implicit trailing deny.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acl {
    #[serde(default)]
    pub lines: Vec<AclLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclLine {
    pub action: LineAction,
    /// Destination match; absent matches any destination.
    #[serde(default)]
    pub dst: Option<Prefix>,
    #[serde(default)]
    pub src: Option<Prefix>,
}

/// A compiled route policy: ordered first-match clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePolicy {
    #[serde(default)]
    pub clauses: Vec<PolicyClause>,
    /// Outcome when no clause matches.
    #[serde(default)]
    pub default_permit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyClause {
    /// Any of these ranges matches; empty matches every prefix.
    #[serde(default)]
    pub match_prefixes: Vec<PrefixRange>,
    #[serde(default)]
    pub match_community: Option<String>,
    pub action: LineAction,
    #[serde(default)]
    pub set_metric: Option<u32>,
    #[serde(default)]
    pub add_metric: Option<u32>,
    #[serde(default)]
    pub set_local_pref: Option<u32>,
    #[serde(default)]
    pub add_communities: Vec<String>,
    #[serde(default)]
    pub remove_communities: Vec<String>,
}

impl PolicyClause {
    pub fn new(action: LineAction) -> Self {
        Self {
            match_prefixes: Vec::new(),
            match_community: None,
            action,
            set_metric: None,
            add_metric: None,
            set_local_pref: None,
            add_communities: Vec::new(),
            remove_communities: Vec::new(),
        }
    }
}

/// Routes for prefixes inside `prefix` whose length is within
/// `min_length..=max_length`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixRange {
    pub prefix: Prefix,
    #[serde(default)]
    pub min_length: Option<u8>,
    #[serde(default)]
    pub max_length: Option<u8>,
}

impl PrefixRange {
    /// Matches `prefix` exactly.
    pub fn exact(prefix: Prefix) -> Self {
        Self {
            prefix,
            min_length: None,
            max_length: Some(prefix.length()),
        }
    }

    /// Inclusive length bounds, defaulting to `prefix.length()..=32`.
    pub fn length_bounds(&self) -> (u8, u8) {
        let lo = self.min_length.unwrap_or(0).max(self.prefix.length());
        let hi = self.max_length.unwrap_or(32).min(32);
        (lo, hi)
    }
}

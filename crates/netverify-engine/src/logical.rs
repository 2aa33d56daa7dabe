//! Logical edges: the per-protocol, per-direction view of physical edges.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;

use netverify_model::{Graph, GraphEdge, Protocol};
use netverify_smt::constraints::ConstraintSet;

use crate::error::CheckError;
use crate::record::SymbolicRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeDirection {
    Import,
    Export,
}

impl fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EdgeDirection::Import => "import",
            EdgeDirection::Export => "export",
        })
    }
}

/// Identifies a logical edge within one slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey {
    pub router: String,
    pub interface: String,
    pub proto: Protocol,
    pub direction: EdgeDirection,
}

impl LogicalKey {
    pub fn new(edge: &GraphEdge, proto: Protocol, direction: EdgeDirection) -> Self {
        Self {
            router: edge.router.clone(),
            interface: edge.interface.clone(),
            proto,
            direction,
        }
    }

    /// The same interface, protocol and direction on another router.
    pub fn on_router(&self, router: &str) -> Self {
        Self {
            router: router.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{} {} {}",
            self.router, self.interface, self.proto, self.direction
        )
    }
}

#[derive(Debug, Clone)]
pub struct LogicalEdge {
    pub edge: GraphEdge,
    pub proto: Protocol,
    pub direction: EdgeDirection,
    pub record: SymbolicRecord,
}

/// Every logical edge of a slice plus the environment records on boundary
/// imports.
#[derive(Debug, Clone, Default)]
pub struct LogicalGraph {
    edges: IndexMap<LogicalKey, LogicalEdge>,
    environment: IndexMap<LogicalKey, SymbolicRecord>,
}

impl LogicalGraph {
    /// Declare an import and an export record for every edge a dynamic
    /// protocol speaks on, and an environment record for every boundary
    /// import.
    pub fn declare(cs: &mut ConstraintSet, graph: &Graph, slice: &str) -> Self {
        let mut logical = Self::default();
        for (router, config) in graph.configs() {
            for proto in Protocol::ALL.into_iter().filter(|p| p.is_dynamic()) {
                if !config.runs(proto) {
                    continue;
                }
                for edge in graph.edges(router).iter().filter(|e| graph.speaks_on(proto, e)) {
                    for direction in [EdgeDirection::Import, EdgeDirection::Export] {
                        let key = LogicalKey::new(edge, proto, direction);
                        let record = SymbolicRecord::declare(
                            cs,
                            format!("{slice}_{router}_{proto}_{direction}_{}", edge.interface),
                            Some(proto),
                            graph.communities(),
                        );
                        logical.edges.insert(
                            key,
                            LogicalEdge {
                                edge: edge.clone(),
                                proto,
                                direction,
                                record,
                            },
                        );
                    }
                    if edge.is_boundary() {
                        let env = SymbolicRecord::declare(
                            cs,
                            format!("{slice}_{router}_{proto}_env_{}", edge.interface),
                            Some(proto),
                            graph.communities(),
                        );
                        logical
                            .environment
                            .insert(LogicalKey::new(edge, proto, EdgeDirection::Import), env);
                    }
                }
            }
        }
        logical
    }

    pub fn get(&self, key: &LogicalKey) -> Option<&LogicalEdge> {
        self.edges.get(key)
    }

    pub fn edges(&self) -> impl Iterator<Item = &LogicalEdge> {
        self.edges.values()
    }

    /// Logical edges of `router` for `proto` in `direction`, in edge order.
    pub fn edges_of<'a>(
        &'a self,
        router: &'a str,
        proto: Protocol,
        direction: EdgeDirection,
    ) -> impl Iterator<Item = &'a LogicalEdge> + 'a {
        self.edges.values().filter(move |l| {
            l.edge.router == router && l.proto == proto && l.direction == direction
        })
    }

    pub fn environment(&self) -> &IndexMap<LogicalKey, SymbolicRecord> {
        &self.environment
    }

    pub fn env(&self, key: &LogicalKey) -> Option<&SymbolicRecord> {
        self.environment.get(key)
    }

    /// The export record a peer sends across `edge`, i.e. the peer's export
    /// on the reverse edge.
    pub fn peer_export(
        &self,
        edge: &GraphEdge,
        proto: Protocol,
    ) -> Result<&SymbolicRecord, CheckError> {
        let (Some(peer), Some(peer_iface)) = (&edge.peer, &edge.peer_interface) else {
            return Err(CheckError::MissingCorrespondence(format!("{edge} has no peer")));
        };
        let key = LogicalKey {
            router: peer.clone(),
            interface: peer_iface.clone(),
            proto,
            direction: EdgeDirection::Export,
        };
        self.get(&key)
            .map(|l| &l.record)
            .ok_or_else(|| CheckError::MissingCorrespondence(key.to_string()))
    }

    /// Pair every environment record of `self` with the record `key_map`
    /// selects in `other`. Records that exist on only one side are an
    /// error.
    pub fn env_correspondence<'a>(
        &'a self,
        other: &'a LogicalGraph,
        key_map: impl Fn(&LogicalKey) -> LogicalKey,
        asymmetric: impl Fn(String) -> CheckError,
    ) -> Result<Vec<(&'a SymbolicRecord, &'a SymbolicRecord)>, CheckError> {
        let mut pairs = Vec::with_capacity(self.environment.len());
        let mut seen = BTreeSet::new();
        for (key, env) in &self.environment {
            let mapped = key_map(key);
            let theirs = other
                .env(&mapped)
                .ok_or_else(|| asymmetric(key.to_string()))?;
            pairs.push((env, theirs));
            seen.insert(mapped);
        }
        if let Some(extra) = other.environment.keys().find(|k| !seen.contains(*k)) {
            return Err(asymmetric(extra.to_string()));
        }
        Ok(pairs)
    }
}

//! One symbolic copy of the network.
//!
//! A slice declares every route record of the network for a single
//! symbolic packet and ties them together: originated and learned
//! candidates feed a best-route selection per protocol, protocol winners
//! feed the router-level selection, and winners flow back out through the
//! export transfers. The router-level choice decides control forwarding;
//! failures and packet filters turn that into data forwarding.
//!
//! Every variable name starts with the slice name, so two slices can live
//! in one [`ConstraintSet`].

use indexmap::IndexMap;
use tracing::debug;

use netverify_model::{EnvironmentType, Graph, GraphEdge, Prefix, Protocol, TieBreak};
use netverify_smt::constraints::ConstraintSet;
use netverify_smt::terms::SmtTerm;

use crate::error::CheckError;
use crate::failures::SymbolicFailures;
use crate::logical::{EdgeDirection, LogicalGraph, LogicalKey};
use crate::packet::SymbolicPacket;
use crate::record::{Ranking, SymbolicRecord};
use crate::transfer::{Transfer, DEFAULT_LOCAL_PREF};

/// A route competing in a selection, with the edge it forwards over.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: SymbolicRecord,
    pub edge: Option<GraphEdge>,
    /// True when this candidate is the one the selection picked.
    pub choice: SmtTerm,
}

/// A best-route selection: the declared winner and its candidates.
#[derive(Debug, Clone)]
pub struct Pool {
    pub best: SymbolicRecord,
    pub candidates: Vec<Candidate>,
}

impl Pool {
    /// Constrain `best` to be the preferred permitted candidate under
    /// `ranking`, with exactly one `choice` set when any is permitted.
    fn encode(
        cs: &mut ConstraintSet,
        best: SymbolicRecord,
        candidates: Vec<(SymbolicRecord, Option<GraphEdge>)>,
        ranking: Ranking,
        tie_break: TieBreak,
    ) -> Self {
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, (record, edge))| Candidate {
                choice: cs.declare_bool(format!("{}_choice_{i}", best.name)),
                record,
                edge,
            })
            .collect();

        cs.add(best.permitted.clone().iff(SmtTerm::or(
            candidates.iter().map(|c| c.record.permitted.clone()).collect(),
        )));
        cs.add(best.permitted.clone().implies(SmtTerm::or(
            candidates.iter().map(|c| c.choice.clone()).collect(),
        )));
        for (i, cand) in candidates.iter().enumerate() {
            cs.add(cand.choice.clone().implies(SmtTerm::and(vec![
                cand.record.permitted.clone(),
                best.same_attributes(&cand.record),
            ])));
            cs.add(
                cand.record
                    .permitted
                    .clone()
                    .implies(best.at_least_as_good(&cand.record, ranking)),
            );
            for earlier in &candidates[..i] {
                cs.add(SmtTerm::and(vec![cand.choice.clone(), earlier.choice.clone()]).not());
                if tie_break == TieBreak::EdgeOrder {
                    let tied = SmtTerm::and(vec![
                        earlier.record.permitted.clone(),
                        earlier.record.same_rank(&cand.record, ranking),
                    ]);
                    cs.add(cand.choice.clone().implies(tied.not()));
                }
            }
        }
        Self { best, candidates }
    }
}

/// Per-edge forwarding decisions of a slice, keyed by `(router, interface)`.
#[derive(Debug, Clone, Default)]
pub struct SymbolicDecisions {
    pub control_fwd: IndexMap<(String, String), SmtTerm>,
    pub data_fwd: IndexMap<(String, String), SmtTerm>,
    /// Control forwarding through anything but a connected route.
    pub routed_fwd: IndexMap<(String, String), SmtTerm>,
    pub forwards_across: IndexMap<(String, String), SmtTerm>,
    /// The router delivers the packet locally.
    pub accepts: IndexMap<String, SmtTerm>,
}

fn edge_key(router: &str, iface: &str) -> (String, String) {
    (router.to_string(), iface.to_string())
}

pub struct EncoderSlice<'g> {
    name: String,
    graph: &'g Graph,
    tie_break: TieBreak,
    packet: SymbolicPacket,
    failures: SymbolicFailures,
    logical: LogicalGraph,
    pools: IndexMap<(String, Protocol), Pool>,
    export_pools: IndexMap<(String, Protocol), Pool>,
    overall: IndexMap<String, Pool>,
    decisions: SymbolicDecisions,
}

impl<'g> EncoderSlice<'g> {
    pub fn new(
        cs: &mut ConstraintSet,
        graph: &'g Graph,
        name: impl Into<String>,
        tie_break: TieBreak,
    ) -> Result<Self, CheckError> {
        let name = name.into();
        let packet = SymbolicPacket::declare(cs, &name);
        let failures = SymbolicFailures::declare(cs, graph, &name);
        let logical = LogicalGraph::declare(cs, graph, &name);
        let mut slice = Self {
            name,
            graph,
            tie_break,
            packet,
            failures,
            logical,
            pools: IndexMap::new(),
            export_pools: IndexMap::new(),
            overall: IndexMap::new(),
            decisions: SymbolicDecisions::default(),
        };
        slice.encode_selection(cs);
        slice.encode_transfers(cs)?;
        slice.encode_forwarding(cs);
        debug!(
            slice = %slice.name,
            routers = graph.num_routers(),
            logical_edges = slice.logical.edges().count(),
            environment = slice.logical.environment().len(),
            "encoded slice"
        );
        Ok(slice)
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    fn originated(&self, label: String, proto: Protocol, prefix: &Prefix, ad: i64) -> SymbolicRecord {
        let local_pref = if proto.uses_local_pref() {
            DEFAULT_LOCAL_PREF
        } else {
            0
        };
        SymbolicRecord::originated(
            label,
            proto,
            self.packet.dst_in(&prefix.network()),
            prefix.length(),
            ad,
            local_pref,
            self.graph.communities(),
        )
    }

    /// Candidates a router's protocol chooses among, before redistribution.
    fn native_candidates(&self, router: &str, proto: Protocol) -> Vec<(SymbolicRecord, Option<GraphEdge>)> {
        let graph = self.graph;
        let Some(config) = graph.config(router) else {
            return Vec::new();
        };
        let s = &self.name;
        let mut out = Vec::new();
        match proto {
            Protocol::Connected => {
                for iface in config.interfaces.iter().filter(|i| i.active) {
                    let record = self.originated(
                        format!("{s}_{router}_connected_{}", iface.name),
                        proto,
                        &iface.prefix,
                        proto.default_admin_distance(false),
                    );
                    out.push((record, graph.edge(router, &iface.name).cloned()));
                }
            }
            Protocol::Static => {
                for edge in graph.edges(router) {
                    for (i, route) in graph.static_routes(router, &edge.interface).iter().enumerate() {
                        let record = self.originated(
                            format!("{s}_{router}_static_{}_{i}", edge.interface),
                            proto,
                            &route.network,
                            i64::from(route.admin_distance),
                        );
                        out.push((record, Some(edge.clone())));
                    }
                }
            }
            Protocol::Ospf => {
                if let Some(ospf) = &config.ospf {
                    for iface in config.interfaces.iter().filter(|i| i.active && ospf.enabled(&i.name)) {
                        let record = self.originated(
                            format!("{s}_{router}_ospf_origin_{}", iface.name),
                            proto,
                            &iface.prefix,
                            proto.default_admin_distance(false),
                        );
                        out.push((record, None));
                    }
                }
            }
            Protocol::Bgp => {
                if let Some(bgp) = &config.bgp {
                    for (i, network) in bgp.networks.iter().enumerate() {
                        let record = self.originated(
                            format!("{s}_{router}_bgp_origin_{i}"),
                            proto,
                            network,
                            proto.default_admin_distance(false),
                        );
                        out.push((record, None));
                    }
                }
            }
        }
        if proto.is_dynamic() {
            out.extend(
                self.logical
                    .edges_of(router, proto, EdgeDirection::Import)
                    .map(|l| (l.record.clone(), Some(l.edge.clone()))),
            );
        }
        out
    }

    fn encode_selection(&mut self, cs: &mut ConstraintSet) {
        let graph = self.graph;
        for (router, config) in graph.configs() {
            for proto in Protocol::ALL.into_iter().filter(|p| config.runs(*p)) {
                let candidates = self.native_candidates(router, proto);
                let best = SymbolicRecord::declare(
                    cs,
                    format!("{}_{router}_{proto}_best", self.name),
                    Some(proto),
                    graph.communities(),
                );
                let pool = Pool::encode(cs, best, candidates, Ranking::Protocol(proto), self.tie_break);
                self.pools.insert((router.clone(), proto), pool);
            }

            let winners: Vec<(SymbolicRecord, Option<GraphEdge>)> = Protocol::ALL
                .into_iter()
                .filter_map(|p| self.pools.get(&(router.clone(), p)))
                .map(|pool| (pool.best.clone(), None))
                .collect();
            let best = SymbolicRecord::declare(
                cs,
                format!("{}_{router}_overall_best", self.name),
                None,
                graph.communities(),
            );
            // Protocol order breaks ties between equally ranked winners.
            let pool = Pool::encode(cs, best, winners, Ranking::Router, TieBreak::EdgeOrder);
            self.overall.insert(router.clone(), pool);

            for proto in [Protocol::Ospf, Protocol::Bgp] {
                let sources = config.redistributed_into(proto);
                if !config.runs(proto) || sources.is_empty() {
                    continue;
                }
                let transfer = Transfer::new(graph, &self.packet);
                let mut candidates = Vec::new();
                if let Some(native) = self.pools.get(&(router.clone(), proto)) {
                    candidates.push((native.best.clone(), None));
                }
                for source in sources.iter().filter(|q| **q != proto) {
                    if let Some(pool) = self.pools.get(&(router.clone(), *source)) {
                        candidates.push((transfer.redistribute(router, &pool.best, proto), None));
                    }
                }
                let best = SymbolicRecord::declare(
                    cs,
                    format!("{}_{router}_{proto}_redist_best", self.name),
                    Some(proto),
                    graph.communities(),
                );
                let pool = Pool::encode(cs, best, candidates, Ranking::Protocol(proto), self.tie_break);
                self.export_pools.insert((router.clone(), proto), pool);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// The record `router` advertises for `proto`: its redistribution pool
    /// winner when it redistributes into `proto`, its native winner
    /// otherwise.
    pub fn export_source(&self, router: &str, proto: Protocol) -> Option<&SymbolicRecord> {
        let key = (router.to_string(), proto);
        self.export_pools
            .get(&key)
            .or_else(|| self.pools.get(&key))
            .map(|pool| &pool.best)
    }

    fn encode_transfers(&self, cs: &mut ConstraintSet) -> Result<(), CheckError> {
        let transfer = Transfer::new(self.graph, &self.packet);
        for logical in self.logical.edges() {
            let edge = &logical.edge;
            let computed = match logical.direction {
                EdgeDirection::Import => {
                    let incoming = if edge.is_boundary() {
                        let key = LogicalKey::new(edge, logical.proto, EdgeDirection::Import);
                        self.logical
                            .env(&key)
                            .ok_or_else(|| CheckError::MissingCorrespondence(key.to_string()))?
                    } else {
                        self.logical.peer_export(edge, logical.proto)?
                    };
                    transfer.import(incoming, logical.proto, edge, self.failures.up(edge))
                }
                EdgeDirection::Export => {
                    let source = self.export_source(&edge.router, logical.proto).ok_or_else(|| {
                        CheckError::MissingCorrespondence(format!(
                            "{} best route of {}",
                            logical.proto, edge.router
                        ))
                    })?;
                    transfer.export(source, logical.proto, edge)
                }
            };
            cs.add(logical.record.equal(&computed));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Forwarding
    // -----------------------------------------------------------------------

    /// The router-level winner came from a candidate on `edge`, optionally
    /// ignoring connected routes.
    fn chose_edge(&self, router: &str, edge: &GraphEdge, include_connected: bool) -> SmtTerm {
        let Some(overall) = self.overall.get(router) else {
            return SmtTerm::ff();
        };
        let mut options = Vec::new();
        for winner in &overall.candidates {
            let Some(proto) = winner.record.proto else {
                continue;
            };
            if proto == Protocol::Connected && !include_connected {
                continue;
            }
            let Some(pool) = self.pools.get(&(router.to_string(), proto)) else {
                continue;
            };
            let via_edge = SmtTerm::or(
                pool.candidates
                    .iter()
                    .filter(|c| c.edge.as_ref() == Some(edge))
                    .map(|c| c.choice.clone())
                    .collect(),
            );
            options.push(SmtTerm::and(vec![winner.choice.clone(), via_edge]));
        }
        SmtTerm::or(options)
    }

    fn encode_forwarding(&mut self, cs: &mut ConstraintSet) {
        let graph = self.graph;
        let mut decisions = SymbolicDecisions::default();
        for (router, config) in graph.configs() {
            let mut forwards = Vec::new();
            for edge in graph.edges(router) {
                let key = edge_key(router, &edge.interface);
                let control = cs.declare_bool(format!(
                    "{}_{router}_control_fwd_{}",
                    self.name, edge.interface
                ));
                cs.add(control.clone().iff(self.chose_edge(router, edge, true)));

                let outbound = config
                    .interface(&edge.interface)
                    .and_then(|i| config.acl(i.outgoing_filter.as_deref()));
                let inbound = match (&edge.peer, &edge.peer_interface) {
                    (Some(peer), Some(peer_iface)) => graph.config(peer).and_then(|c| {
                        c.interface(peer_iface)
                            .and_then(|i| c.acl(i.incoming_filter.as_deref()))
                    }),
                    _ => None,
                };
                let across = SmtTerm::and(vec![
                    self.failures.up(edge),
                    self.packet.permitted_by(outbound),
                    self.packet.permitted_by(inbound),
                ]);

                let data = cs.declare_bool(format!(
                    "{}_{router}_data_fwd_{}",
                    self.name, edge.interface
                ));
                cs.add(data.clone().iff(SmtTerm::and(vec![control.clone(), across.clone()])));

                forwards.push(control.clone());
                decisions
                    .routed_fwd
                    .insert(key.clone(), self.chose_edge(router, edge, false));
                decisions.control_fwd.insert(key.clone(), control);
                decisions.data_fwd.insert(key.clone(), data);
                decisions.forwards_across.insert(key, across);
            }
            let permitted = self
                .overall
                .get(router)
                .map_or_else(SmtTerm::ff, |pool| pool.best.permitted.clone());
            decisions.accepts.insert(
                router.clone(),
                SmtTerm::and(vec![permitted, SmtTerm::or(forwards).not()]),
            );
        }
        self.decisions = decisions;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn packet(&self) -> &SymbolicPacket {
        &self.packet
    }

    pub fn failures(&self) -> &SymbolicFailures {
        &self.failures
    }

    pub fn logical(&self) -> &LogicalGraph {
        &self.logical
    }

    pub fn decisions(&self) -> &SymbolicDecisions {
        &self.decisions
    }

    pub fn pool(&self, router: &str, proto: Protocol) -> Option<&Pool> {
        self.pools.get(&(router.to_string(), proto))
    }

    /// The router-level selection of `router`.
    pub fn overall(&self, router: &str) -> Option<&Pool> {
        self.overall.get(router)
    }

    fn decision(map: &IndexMap<(String, String), SmtTerm>, router: &str, iface: &str) -> SmtTerm {
        map.get(&edge_key(router, iface))
            .cloned()
            .unwrap_or_else(SmtTerm::ff)
    }

    pub fn control_fwd(&self, router: &str, iface: &str) -> SmtTerm {
        Self::decision(&self.decisions.control_fwd, router, iface)
    }

    pub fn data_fwd(&self, router: &str, iface: &str) -> SmtTerm {
        Self::decision(&self.decisions.data_fwd, router, iface)
    }

    pub fn routed_fwd(&self, router: &str, iface: &str) -> SmtTerm {
        Self::decision(&self.decisions.routed_fwd, router, iface)
    }

    /// The link is up and both packet filters let the packet through.
    pub fn forwards_across(&self, edge: &GraphEdge) -> SmtTerm {
        Self::decision(&self.decisions.forwards_across, &edge.router, &edge.interface)
    }

    pub fn accepts(&self, router: &str) -> SmtTerm {
        self.decisions
            .accepts
            .get(router)
            .cloned()
            .unwrap_or_else(SmtTerm::ff)
    }

    /// Constraint placing `env` on every environment record of the slice.
    pub fn environment_constraint(&self, env: EnvironmentType) -> SmtTerm {
        SmtTerm::and(
            self.logical
                .environment()
                .values()
                .map(|record| match env {
                    EnvironmentType::Any => SmtTerm::tt(),
                    EnvironmentType::None => record.permitted.clone().not(),
                    EnvironmentType::Sane => record.metric.clone().le(SmtTerm::int(50)),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_model::config::{Acl, AclLine, Interface, LineAction, Network, RouterConfig, StaticRoute};
    use netverify_smt::backends::z3_backend::Z3Solver;
    use netverify_smt::solver::SatResult;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn pfx(s: &str) -> Prefix {
        s.parse().expect("prefix")
    }

    /// a --(e0)-- b, with a static route on `a` for 10.9.0.0/24 via e0.
    fn pair(with_acl: bool) -> Graph {
        let mut a = RouterConfig::new("a");
        a.interfaces = vec![
            Interface::new("e0", pfx("10.0.0.1/24")),
            Interface::new("lan", pfx("10.1.0.1/24")),
        ];
        a.static_routes = vec![
            StaticRoute::via_interface(pfx("10.9.0.0/24"), "e0"),
            StaticRoute::via_interface(pfx("10.1.0.0/24"), "e0"),
        ];
        if with_acl {
            a.interfaces[0].outgoing_filter = Some("block".into());
            a.acls.insert(
                "block".into(),
                Acl {
                    lines: vec![AclLine {
                        action: LineAction::Deny,
                        dst: None,
                        src: None,
                    }],
                },
            );
        }
        let mut b = RouterConfig::new("b");
        b.interfaces = vec![Interface::new("e0", pfx("10.0.0.2/24"))];
        Graph::new(&Network::new(vec![a, b])).expect("graph")
    }

    fn solve(cs: &ConstraintSet) -> Result<SatResult, Box<dyn std::error::Error>> {
        let mut solver = Z3Solver::new();
        Ok(cs.solve(&mut solver)?.0)
    }

    #[test]
    fn static_route_forwards_over_its_edge() -> TestResult {
        let graph = pair(false);
        let mut cs = ConstraintSet::new();
        let slice = EncoderSlice::new(&mut cs, &graph, "0", TieBreak::EdgeOrder)?;
        cs.add(slice.packet().dst_in(&pfx("10.9.0.0/24")));
        cs.add(slice.failures().at_most(0));
        cs.add(slice.data_fwd("a", "e0").not());
        assert_eq!(solve(&cs)?, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn connected_route_beats_static_route() -> TestResult {
        let graph = pair(false);
        let mut cs = ConstraintSet::new();
        let slice = EncoderSlice::new(&mut cs, &graph, "0", TieBreak::EdgeOrder)?;
        cs.add(slice.packet().dst_in(&pfx("10.1.0.0/24")));
        cs.add(slice.control_fwd("a", "e0"));
        assert_eq!(solve(&cs)?, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn filters_block_data_but_not_control_forwarding() -> TestResult {
        let graph = pair(true);
        let mut cs = ConstraintSet::new();
        let slice = EncoderSlice::new(&mut cs, &graph, "0", TieBreak::EdgeOrder)?;
        cs.add(slice.packet().dst_in(&pfx("10.9.0.0/24")));
        cs.add(slice.control_fwd("a", "e0"));
        assert_eq!(solve(&cs)?, SatResult::Sat);
        cs.add(slice.data_fwd("a", "e0"));
        assert_eq!(solve(&cs)?, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn destination_inside_a_loopback_is_accepted() -> TestResult {
        let mut a = RouterConfig::new("a");
        let mut lo = Interface::new("lo", pfx("1.1.1.1/32"));
        lo.loopback = true;
        a.interfaces = vec![lo];
        let graph = Graph::new(&Network::new(vec![a]))?;
        let mut cs = ConstraintSet::new();
        let slice = EncoderSlice::new(&mut cs, &graph, "0", TieBreak::EdgeOrder)?;
        cs.add(slice.packet().dst_in(&pfx("1.1.1.1/32")));
        cs.add(slice.accepts("a").not());
        assert_eq!(solve(&cs)?, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn environment_constraints_are_trivial_without_sessions() {
        let graph = pair(false);
        let mut cs = ConstraintSet::new();
        let slice = EncoderSlice::new(&mut cs, &graph, "0", TieBreak::EdgeOrder).expect("slice");
        assert!(slice.environment_constraint(EnvironmentType::Any).is_true());
        assert!(slice.environment_constraint(EnvironmentType::None).is_true());
    }
}

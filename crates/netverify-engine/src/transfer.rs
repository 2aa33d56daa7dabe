//! Transfer functions: what happens to a route record when it crosses a
//! logical edge or moves between protocols.
//!
//! Every transfer returns a normalised record: when the result is denied,
//! all of its attributes are zero regardless of the input.

use netverify_model::config::{LineAction, PolicyClause, RoutePolicy};
use netverify_model::{Graph, GraphEdge, Protocol};
use netverify_smt::terms::SmtTerm;

use crate::packet::SymbolicPacket;
use crate::record::SymbolicRecord;

/// Local preference assigned to routes learned over eBGP or originated into
/// BGP.
pub const DEFAULT_LOCAL_PREF: i64 = 100;

/// Transfer table for one slice.
#[derive(Debug, Clone, Copy)]
pub struct Transfer<'a> {
    graph: &'a Graph,
    packet: &'a SymbolicPacket,
}

impl<'a> Transfer<'a> {
    pub fn new(graph: &'a Graph, packet: &'a SymbolicPacket) -> Self {
        Self { graph, packet }
    }

    fn policy(&self, router: &str, name: Option<&str>) -> Option<&'a RoutePolicy> {
        self.graph.config(router).and_then(|c| c.policy(name))
    }

    fn import_policy(&self, proto: Protocol, edge: &GraphEdge) -> Option<&'a RoutePolicy> {
        match proto {
            Protocol::Ospf => {
                let name = self
                    .graph
                    .config(&edge.router)
                    .and_then(|c| c.ospf.as_ref())
                    .and_then(|o| o.import_policy.as_deref());
                self.policy(&edge.router, name)
            }
            Protocol::Bgp => {
                let name = self
                    .graph
                    .bgp_session(edge)
                    .and_then(|n| n.import_policy.as_deref());
                self.policy(&edge.router, name)
            }
            Protocol::Connected | Protocol::Static => None,
        }
    }

    fn export_policy(&self, proto: Protocol, edge: &GraphEdge) -> Option<&'a RoutePolicy> {
        match proto {
            Protocol::Ospf => {
                let name = self
                    .graph
                    .config(&edge.router)
                    .and_then(|c| c.ospf.as_ref())
                    .and_then(|o| o.export_policy.as_deref());
                self.policy(&edge.router, name)
            }
            Protocol::Bgp => {
                let name = self
                    .graph
                    .bgp_session(edge)
                    .and_then(|n| n.export_policy.as_deref());
                self.policy(&edge.router, name)
            }
            Protocol::Connected | Protocol::Static => None,
        }
    }

    /// The record a router learns over `edge` from `incoming`. `up` gates
    /// the whole transfer on the link not being failed.
    pub fn import(
        &self,
        incoming: &SymbolicRecord,
        proto: Protocol,
        edge: &GraphEdge,
        up: SmtTerm,
    ) -> SymbolicRecord {
        let mut record = incoming.clone();
        record.proto = Some(proto);
        record.permitted = SmtTerm::and(vec![incoming.permitted.clone(), up]);
        match proto {
            Protocol::Ospf => {
                let cost = self
                    .graph
                    .config(&edge.router)
                    .and_then(|c| c.interface(&edge.interface))
                    .map_or(1, |i| i.ospf_cost);
                record.metric = record.metric.add(SmtTerm::int(i64::from(cost)));
                record.admin_dist = SmtTerm::int(Protocol::Ospf.default_admin_distance(false));
                record.local_pref = SmtTerm::int(0);
                for value in record.communities.values_mut() {
                    *value = SmtTerm::ff();
                }
            }
            Protocol::Bgp => {
                let external = self.graph.ebgp_neighbors().contains_key(edge);
                record.admin_dist = SmtTerm::int(Protocol::Bgp.default_admin_distance(external));
                if external {
                    record.local_pref = SmtTerm::int(DEFAULT_LOCAL_PREF);
                }
            }
            Protocol::Connected | Protocol::Static => {}
        }
        self.apply_policy(self.import_policy(proto, edge), record)
    }

    /// The record a router advertises over `edge` from its best route
    /// `source`.
    pub fn export(&self, source: &SymbolicRecord, proto: Protocol, edge: &GraphEdge) -> SymbolicRecord {
        let mut record = self.apply_policy(self.export_policy(proto, edge), source.clone());
        if proto == Protocol::Bgp {
            record.metric = record.metric.add(SmtTerm::int(1));
        }
        record.normalized()
    }

    /// `source`, the best route of another protocol, injected into `into`.
    pub fn redistribute(&self, router: &str, source: &SymbolicRecord, into: Protocol) -> SymbolicRecord {
        let metric = match into {
            Protocol::Ospf => self
                .graph
                .config(router)
                .and_then(|c| c.ospf.as_ref())
                .map_or(0, |o| i64::from(o.redistribution_metric)),
            _ => 0,
        };
        let local_pref = if into.uses_local_pref() {
            DEFAULT_LOCAL_PREF
        } else {
            0
        };
        SymbolicRecord {
            name: format!("{}_into_{into}", source.name),
            proto: Some(into),
            permitted: source.permitted.clone(),
            prefix_length: source.prefix_length.clone(),
            admin_dist: SmtTerm::int(into.default_admin_distance(false)),
            local_pref: SmtTerm::int(local_pref),
            metric: SmtTerm::int(metric),
            communities: source
                .communities
                .keys()
                .map(|c| (c.clone(), SmtTerm::ff()))
                .collect(),
        }
        .normalized()
    }

    fn clause_matches(&self, clause: &PolicyClause, record: &SymbolicRecord) -> SmtTerm {
        let prefixes = if clause.match_prefixes.is_empty() {
            SmtTerm::tt()
        } else {
            SmtTerm::or(
                clause
                    .match_prefixes
                    .iter()
                    .map(|range| {
                        let (lo, hi) = range.length_bounds();
                        SmtTerm::and(vec![
                            self.packet.dst_in(&range.prefix),
                            record
                                .prefix_length
                                .clone()
                                .in_range(i64::from(lo), i64::from(hi)),
                        ])
                    })
                    .collect(),
            )
        };
        let community = match &clause.match_community {
            Some(tag) => record
                .communities
                .get(tag)
                .cloned()
                .unwrap_or_else(SmtTerm::ff),
            None => SmtTerm::tt(),
        };
        SmtTerm::and(vec![prefixes, community])
    }

    fn rewrite(clause: &PolicyClause, mut record: SymbolicRecord) -> SymbolicRecord {
        if let Some(metric) = clause.set_metric {
            record.metric = SmtTerm::int(i64::from(metric));
        }
        if let Some(delta) = clause.add_metric {
            record.metric = record.metric.add(SmtTerm::int(i64::from(delta)));
        }
        if let Some(lp) = clause.set_local_pref {
            record.local_pref = SmtTerm::int(i64::from(lp));
        }
        for tag in &clause.add_communities {
            if let Some(value) = record.communities.get_mut(tag) {
                *value = SmtTerm::tt();
            }
        }
        for tag in &clause.remove_communities {
            if let Some(value) = record.communities.get_mut(tag) {
                *value = SmtTerm::ff();
            }
        }
        record
    }

    /// First-match evaluation of `policy`. The permit decision and the
    /// rewrite of the matching clause are applied together; a missing
    /// policy permits unchanged.
    pub fn apply_policy(&self, policy: Option<&RoutePolicy>, input: SymbolicRecord) -> SymbolicRecord {
        let Some(policy) = policy else {
            return input.normalized();
        };
        let fallthrough = SymbolicRecord {
            permitted: SmtTerm::and(vec![
                input.permitted.clone(),
                SmtTerm::bool(policy.default_permit),
            ]),
            ..input.clone()
        };
        policy
            .clauses
            .iter()
            .rev()
            .fold(fallthrough, |rest, clause| {
                let matched = self.clause_matches(clause, &input);
                let outcome = match clause.action {
                    LineAction::Permit => Self::rewrite(clause, input.clone()),
                    LineAction::Deny => SymbolicRecord {
                        permitted: SmtTerm::ff(),
                        ..input.clone()
                    },
                };
                select(matched, outcome, rest)
            })
            .normalized()
    }
}

/// Field-wise `ite(cond, then, els)`.
fn select(cond: SmtTerm, then: SymbolicRecord, els: SymbolicRecord) -> SymbolicRecord {
    let pick = |a: SmtTerm, b: SmtTerm| SmtTerm::ite(cond.clone(), a, b);
    let mut els_communities = els.communities;
    SymbolicRecord {
        name: then.name,
        proto: then.proto,
        permitted: pick(then.permitted, els.permitted),
        prefix_length: pick(then.prefix_length, els.prefix_length),
        admin_dist: pick(then.admin_dist, els.admin_dist),
        local_pref: pick(then.local_pref, els.local_pref),
        metric: pick(then.metric, els.metric),
        communities: then
            .communities
            .into_iter()
            .map(|(tag, value)| {
                let other = els_communities.remove(&tag).unwrap_or_else(SmtTerm::ff);
                (tag, pick(value, other))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use netverify_model::config::{
        BgpConfig, BgpNeighbor, Interface, Network, OspfConfig, PrefixRange, RouterConfig,
    };
    use netverify_smt::constraints::ConstraintSet;
    use netverify_smt::solver::{Model, ModelValue};

    fn incoming(metric: i64) -> SymbolicRecord {
        SymbolicRecord {
            name: "in".into(),
            proto: Some(Protocol::Ospf),
            permitted: SmtTerm::var("in_p"),
            prefix_length: SmtTerm::int(24),
            admin_dist: SmtTerm::int(110),
            local_pref: SmtTerm::int(0),
            metric: SmtTerm::int(metric),
            communities: BTreeMap::from([("65000:1".to_string(), SmtTerm::ff())]),
        }
    }

    fn model(dst: &str, permitted: bool) -> Model {
        let ip: netverify_model::Ip = dst.parse().expect("ip");
        let mut model = Model::default();
        model.values.insert("0_dst_ip".into(), ModelValue::Int(ip.as_i64()));
        model.values.insert("in_p".into(), ModelValue::Bool(permitted));
        model.values.insert("up".into(), ModelValue::Bool(true));
        model
    }

    fn graph() -> Graph {
        let mut ospf = OspfConfig::default();
        ospf.interfaces = ["e0".to_string()].into_iter().collect();
        ospf.import_policy = Some("only-ten".into());
        let mut a = RouterConfig::new("a");
        let mut e0 = Interface::new("e0", "10.0.0.1/24".parse().expect("prefix"));
        e0.ospf_cost = 7;
        a.interfaces = vec![
            e0,
            Interface::new("ext", "192.0.2.1/24".parse().expect("prefix")),
        ];
        a.ospf = Some(ospf.clone());
        a.bgp = Some(BgpConfig {
            local_as: 1,
            neighbors: vec![BgpNeighbor {
                address: "192.0.2.2".parse().expect("ip"),
                remote_as: 2,
                import_policy: Some("tag".into()),
                export_policy: None,
            }],
            ..BgpConfig::default()
        });
        let mut clause = PolicyClause::new(LineAction::Permit);
        clause.match_prefixes = vec![PrefixRange {
            prefix: "10.0.0.0/8".parse().expect("prefix"),
            min_length: None,
            max_length: Some(24),
        }];
        a.policies.insert(
            "only-ten".into(),
            RoutePolicy {
                clauses: vec![clause],
                default_permit: false,
            },
        );
        let mut tag = PolicyClause::new(LineAction::Permit);
        tag.set_local_pref = Some(300);
        tag.add_communities = vec!["65000:1".into()];
        a.policies.insert(
            "tag".into(),
            RoutePolicy {
                clauses: vec![tag],
                default_permit: false,
            },
        );
        let mut b = RouterConfig::new("b");
        b.interfaces = vec![Interface::new("e0", "10.0.0.2/24".parse().expect("prefix"))];
        b.ospf = Some(ospf);
        Graph::new(&Network::new(vec![a, b])).expect("graph")
    }

    #[test]
    fn ospf_import_adds_cost_and_applies_policy() {
        let graph = graph();
        let mut cs = ConstraintSet::new();
        let packet = SymbolicPacket::declare(&mut cs, "0");
        let transfer = Transfer::new(&graph, &packet);
        let edge = graph.edge("a", "e0").expect("edge");
        let out = transfer.import(&incoming(3), Protocol::Ospf, edge, SmtTerm::var("up"));

        let inside = model("10.1.2.3", true);
        assert_eq!(inside.eval_bool(&out.permitted), Some(true));
        assert_eq!(inside.eval_int(&out.metric), Some(10));
        assert_eq!(inside.eval_int(&out.admin_dist), Some(110));

        let outside = model("172.16.0.1", true);
        assert_eq!(outside.eval_bool(&out.permitted), Some(false));
        assert_eq!(outside.eval_int(&out.metric), Some(0));

        let denied = model("10.1.2.3", false);
        assert_eq!(denied.eval_bool(&out.permitted), Some(false));
    }

    #[test]
    fn ebgp_import_sets_distance_then_policy_rewrites() {
        let graph = graph();
        let mut cs = ConstraintSet::new();
        let packet = SymbolicPacket::declare(&mut cs, "0");
        let transfer = Transfer::new(&graph, &packet);
        let edge = graph.edge("a", "ext").expect("edge");
        let mut route = incoming(4);
        route.proto = Some(Protocol::Bgp);
        let out = transfer.import(&route, Protocol::Bgp, edge, SmtTerm::var("up"));
        let m = model("8.8.8.8", true);
        assert_eq!(m.eval_int(&out.admin_dist), Some(20));
        assert_eq!(m.eval_int(&out.local_pref), Some(300));
        assert_eq!(m.eval_bool(&out.communities["65000:1"]), Some(true));
        assert_eq!(m.eval_int(&out.metric), Some(4));
    }

    #[test]
    fn bgp_export_increments_metric() {
        let graph = graph();
        let mut cs = ConstraintSet::new();
        let packet = SymbolicPacket::declare(&mut cs, "0");
        let transfer = Transfer::new(&graph, &packet);
        let edge = graph.edge("a", "ext").expect("edge");
        let out = transfer.export(&incoming(4), Protocol::Bgp, edge);
        let m = model("8.8.8.8", true);
        assert_eq!(m.eval_int(&out.metric), Some(5));
        let off = model("8.8.8.8", false);
        assert_eq!(off.eval_int(&out.metric), Some(0));
    }

    #[test]
    fn redistribution_uses_target_protocol_defaults() {
        let graph = graph();
        let mut cs = ConstraintSet::new();
        let packet = SymbolicPacket::declare(&mut cs, "0");
        let transfer = Transfer::new(&graph, &packet);
        let out = transfer.redistribute("a", &incoming(9), Protocol::Ospf);
        let m = model("8.8.8.8", true);
        assert_eq!(m.eval_int(&out.metric), Some(20));
        assert_eq!(m.eval_int(&out.admin_dist), Some(110));
        assert_eq!(m.eval_int(&out.prefix_length), Some(24));
        let bgp = transfer.redistribute("a", &incoming(9), Protocol::Bgp);
        assert_eq!(m.eval_int(&bgp.local_pref), Some(100));
        assert_eq!(m.eval_int(&bgp.admin_dist), Some(200));
    }
}

//! Reading a satisfying assignment back as network state.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use netverify_model::{GraphEdge, Ip, Prefix};
use netverify_smt::solver::Model;
use netverify_smt::terms::SmtTerm;

use crate::encoder::Encoder;
use crate::packet::SymbolicPacket;
use crate::record::SymbolicRecord;
use crate::slice::EncoderSlice;

/// Outcome of one query. A counterexample is described by the packet, the
/// external routes, the failed links and the forwarding it induces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub packet_model: BTreeMap<String, String>,
    pub env_model: BTreeMap<String, String>,
    pub failures: BTreeSet<String>,
    pub fwd_model: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_model: Option<BTreeMap<String, String>>,
}

impl VerificationResult {
    pub fn verified() -> Self {
        Self {
            verified: true,
            ..Self::default()
        }
    }
}

/// Decode the counterexample behind a satisfying `model`.
pub fn decode(encoder: &Encoder<'_>, model: &Model) -> VerificationResult {
    let slices = encoder.slices();
    let tag = |slice: &EncoderSlice<'_>, text: String| {
        if slices.len() > 1 {
            format!("{}: {text}", slice.name())
        } else {
            text
        }
    };

    let mut result = VerificationResult::default();
    if let Some(first) = slices.first() {
        result.packet_model = Flow::from_model(first.packet(), model).fields();
    }
    for slice in slices {
        for (key, env) in slice.logical().environment() {
            if model.eval_bool(&env.permitted) == Some(true) {
                result
                    .env_model
                    .insert(tag(slice, key.to_string()), describe_record(env, slice.packet(), model));
            }
        }
        for (edge, var) in slice.failures().links() {
            if model.eval_int(var) == Some(1) {
                result.failures.insert(edge.to_string());
            }
        }
        for entry in forwarding_edges(slice, model) {
            result.fwd_model.insert(tag(slice, entry));
        }
    }
    if encoder.question().full_model {
        result.full_model = Some(
            model
                .values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect(),
        );
    }
    result
}

fn holds(model: &Model, term: &SmtTerm) -> bool {
    model.eval_bool(term) == Some(true)
}

/// `"<proto> <prefix> ad=.. lp=.. metric=.."` for a record.
fn describe_record(record: &SymbolicRecord, packet: &SymbolicPacket, model: &Model) -> String {
    let proto = record.proto.map_or("?", |p| p.name());
    describe(proto, record, packet, model)
}

fn describe(proto: &str, record: &SymbolicRecord, packet: &SymbolicPacket, model: &Model) -> String {
    let int = |term: &SmtTerm| model.eval_int(term).unwrap_or(0);
    let prefix = model
        .eval_int(&packet.dst_ip)
        .and_then(Ip::from_i64)
        .zip(u8::try_from(int(&record.prefix_length)).ok())
        .and_then(|(ip, len)| Prefix::new(ip, len).ok())
        .map_or_else(|| "?".to_string(), |p| p.network().to_string());
    format!(
        "{proto} {prefix} ad={} lp={} metric={}",
        int(&record.admin_dist),
        int(&record.local_pref),
        int(&record.metric)
    )
}

/// The route `router` uses, described by the protocol that won the
/// router-level selection.
pub fn route_description(slice: &EncoderSlice<'_>, router: &str, model: &Model) -> Option<String> {
    let overall = slice.overall(router)?;
    let winner = overall
        .candidates
        .iter()
        .find(|c| holds(model, &c.choice))?;
    let proto = winner.record.proto.map_or("?", |p| p.name());
    Some(describe(proto, &overall.best, slice.packet(), model))
}

/// Every edge the packet is forwarded over in `slice`, as
/// `"<edge> -- <route>"`.
pub fn forwarding_edges(slice: &EncoderSlice<'_>, model: &Model) -> BTreeSet<String> {
    let graph = slice.graph();
    let mut out = BTreeSet::new();
    for router in graph.routers() {
        for edge in graph.edges(router) {
            if holds(model, &slice.data_fwd(router, &edge.interface)) {
                let route = route_description(slice, router, model).unwrap_or_default();
                out.insert(format!("{edge} -- {route}"));
            }
        }
    }
    out
}

/// Concrete packet header of a counterexample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flow {
    pub dst_ip: String,
    pub src_ip: String,
    pub dst_port: i64,
    pub src_port: i64,
    pub ip_protocol: i64,
}

impl Flow {
    pub fn from_model(packet: &SymbolicPacket, model: &Model) -> Self {
        let ip = |term: &SmtTerm| {
            model
                .eval_int(term)
                .and_then(Ip::from_i64)
                .unwrap_or(Ip::new(0))
                .to_string()
        };
        let int = |term: &SmtTerm| model.eval_int(term).unwrap_or(0);
        Self {
            dst_ip: ip(&packet.dst_ip),
            src_ip: ip(&packet.src_ip),
            dst_port: int(&packet.dst_port),
            src_port: int(&packet.src_port),
            ip_protocol: int(&packet.ip_protocol),
        }
    }

    fn fields(&self) -> BTreeMap<String, String> {
        [
            ("dst_ip", self.dst_ip.clone()),
            ("src_ip", self.src_ip.clone()),
            ("dst_port", self.dst_port.to_string()),
            ("src_port", self.src_port.to_string()),
            ("ip_protocol", self.ip_protocol.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Delivered to the router itself.
    Accepted,
    /// Left through one of the destination edges.
    Delivered,
    /// Left through a boundary edge that is not a destination.
    ExitsNetwork,
    NoRoute,
    /// A route exists but a failed link or packet filter drops the packet.
    Denied,
    Loop,
}

/// Hops a packet takes from one source router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowTrace {
    pub hops: Vec<String>,
    pub disposition: Disposition,
}

impl FlowTrace {
    /// Follow data forwarding from `start`, taking the first forwarding
    /// edge at every router.
    pub fn walk(slice: &EncoderSlice<'_>, model: &Model, start: &str, dst_edges: &[GraphEdge]) -> Self {
        let graph = slice.graph();
        let mut hops = Vec::new();
        let mut visited = BTreeSet::new();
        let mut current = start.to_string();
        loop {
            if !visited.insert(current.clone()) {
                return Self {
                    hops,
                    disposition: Disposition::Loop,
                };
            }
            if holds(model, &slice.accepts(&current)) {
                return Self {
                    hops,
                    disposition: Disposition::Accepted,
                };
            }
            let edges = graph.edges(&current);
            let Some(next) = edges
                .iter()
                .find(|e| holds(model, &slice.data_fwd(&e.router, &e.interface)))
            else {
                let routed = edges
                    .iter()
                    .any(|e| holds(model, &slice.control_fwd(&e.router, &e.interface)));
                return Self {
                    hops,
                    disposition: if routed {
                        Disposition::Denied
                    } else {
                        Disposition::NoRoute
                    },
                };
            };
            let route = route_description(slice, &current, model).unwrap_or_default();
            hops.push(format!("{next} -- {route}"));
            if dst_edges.contains(next) {
                return Self {
                    hops,
                    disposition: Disposition::Delivered,
                };
            }
            match &next.peer {
                Some(peer) => current = peer.clone(),
                None => {
                    return Self {
                        hops,
                        disposition: Disposition::ExitsNetwork,
                    }
                }
            }
        }
    }
}

/// The counterexample packet and where it goes from every source. In
/// differential mode `delta_traces` follows the second copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowHistory {
    pub flow: Flow,
    pub traces: BTreeMap<String, FlowTrace>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub delta_traces: BTreeMap<String, FlowTrace>,
}

impl FlowHistory {
    pub fn build(encoder: &Encoder<'_>, model: &Model, sources: &[String], dst_edges: &[GraphEdge]) -> Self {
        let trace_all = |slice: &EncoderSlice<'_>| {
            sources
                .iter()
                .filter(|s| slice.graph().contains(s))
                .map(|s| (s.clone(), FlowTrace::walk(slice, model, s, dst_edges)))
                .collect::<BTreeMap<_, _>>()
        };
        let base = encoder.slice(0);
        Self {
            flow: Flow::from_model(base.packet(), model),
            traces: trace_all(base),
            delta_traces: encoder.slices().get(1).map(trace_all).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_model::config::{Interface, Network, RouterConfig, StaticRoute};
    use netverify_model::{Graph, Question};
    use netverify_smt::backends::z3_backend::Z3Solver;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn pfx(s: &str) -> Prefix {
        s.parse().expect("prefix")
    }

    /// a -- b, where `a` sends 10.9.0.0/24 to `b` and `b` sends it back.
    fn ping_pong() -> Graph {
        let mut a = RouterConfig::new("a");
        a.interfaces = vec![Interface::new("e0", pfx("10.0.0.1/24"))];
        a.static_routes = vec![StaticRoute::via_interface(pfx("10.9.0.0/24"), "e0")];
        let mut b = RouterConfig::new("b");
        b.interfaces = vec![
            Interface::new("e0", pfx("10.0.0.2/24")),
            Interface::new("ext", pfx("10.9.0.1/24")),
        ];
        b.static_routes = vec![StaticRoute::via_interface(pfx("10.9.0.0/16"), "e0")];
        Graph::new(&Network::new(vec![a, b])).expect("graph")
    }

    #[test]
    fn traces_follow_the_forwarding_edges() -> TestResult {
        let graph = ping_pong();
        let mut encoder = Encoder::new(&graph, &Question::default())?;
        let dst = encoder.slice(0).packet().dst_in(&pfx("10.9.0.7/32"));
        encoder.add(dst);
        let (result, model) = encoder.verify(&mut Z3Solver::new(), None)?;
        let model = model.ok_or("expected a model")?;
        assert!(!result.verified);
        assert_eq!(result.packet_model["dst_ip"], "10.9.0.7");

        let ext = graph.edge("b", "ext").ok_or("edge")?.clone();
        let trace = FlowTrace::walk(encoder.slice(0), &model, "a", &[ext]);
        assert_eq!(trace.disposition, Disposition::Delivered);
        assert_eq!(trace.hops.len(), 2);
        assert!(trace.hops[0].starts_with("a,e0 --> b,e0 -- static 10.9.0.0/24"));
        assert!(trace.hops[1].contains("connected 10.9.0.0/24 ad=0"));
        Ok(())
    }

    #[test]
    fn packets_without_a_route_are_dropped() -> TestResult {
        let graph = ping_pong();
        let mut encoder = Encoder::new(&graph, &Question::default())?;
        let dst = encoder.slice(0).packet().dst_in(&pfx("172.16.0.1/32"));
        encoder.add(dst);
        let (_, model) = encoder.verify(&mut Z3Solver::new(), None)?;
        let model = model.ok_or("expected a model")?;
        let trace = FlowTrace::walk(encoder.slice(0), &model, "a", &[]);
        assert_eq!(trace.disposition, Disposition::NoRoute);
        assert!(trace.hops.is_empty());
        Ok(())
    }

    #[test]
    fn full_model_is_reported_on_request() -> TestResult {
        let graph = ping_pong();
        let question = Question {
            full_model: true,
            ..Question::default()
        };
        let encoder = Encoder::new(&graph, &question)?;
        let (result, _) = encoder.verify(&mut Z3Solver::new(), None)?;
        let full = result.full_model.ok_or("full model")?;
        assert!(full.contains_key("0_dst_ip"));
        Ok(())
    }
}

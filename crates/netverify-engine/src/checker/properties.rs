//! Single-network properties.

use std::collections::BTreeMap;

use tracing::info;

use netverify_model::{GraphEdge, HeaderSpace, Question};
use netverify_smt::solver::SmtSolver;
use netverify_smt::terms::SmtTerm;

use super::{infer_header_space, PropertyChecker, SourceProperties};
use crate::counterexample::{decode, FlowHistory, VerificationResult};
use crate::encoder::Encoder;
use crate::error::CheckError;
use crate::instrument::{all_equal, within, PropertyAdder};
use crate::result::{ManyAnswer, OneAnswer, ReachabilityAnswer};
use crate::workers::run_all;

impl<F, S> PropertyChecker<F>
where
    F: Fn() -> S + Sync,
    S: SmtSolver,
{
    /// Any forwarding the network can settle on, under the base
    /// environment.
    pub fn compute_forwarding(&self, question: &Question) -> Result<OneAnswer, CheckError> {
        info!("computing a forwarding state");
        let mut encoder = Encoder::new(&self.graph, question)?;
        self.constrain_single(&mut encoder, question, &question.header_space);
        let (result, _) = self.solve(&encoder, "")?;
        Ok(OneAnswer { result })
    }

    /// Every source router delivers the packet through a destination edge.
    pub fn compute_reachability(&self, question: &Question) -> Result<ReachabilityAnswer, CheckError> {
        let found = self.check_sources(
            "reachability",
            question,
            |cs, slice, ends| PropertyAdder::new(slice).instrument_reachability(cs, &ends.dst_edges),
            |encoder, model, ends| {
                let result = decode(encoder, model);
                let history = FlowHistory::build(encoder, model, &ends.sources, &ends.dst_edges);
                ReachabilityAnswer {
                    result,
                    flow_history: Some(history),
                }
            },
        )?;
        Ok(found.unwrap_or_else(|| ReachabilityAnswer {
            result: VerificationResult::verified(),
            flow_history: None,
        }))
    }

    /// Every source reaches the destination in at most `k` hops.
    pub fn compute_bounded_length(&self, question: &Question, k: u32) -> Result<OneAnswer, CheckError> {
        let bound = SmtTerm::int(i64::from(k));
        let found = self.check_sources(
            "bounded length",
            question,
            |cs, slice, ends| {
                PropertyAdder::new(slice)
                    .instrument_path_length(cs, &ends.dst_edges)
                    .into_iter()
                    .map(|(router, len)| (router, len.le(bound.clone())))
                    .collect()
            },
            |encoder, model, _| decode(encoder, model),
        )?;
        Ok(one(found))
    }

    /// All sources reach the destination in the same number of hops.
    pub fn compute_equal_length(&self, question: &Question) -> Result<OneAnswer, CheckError> {
        let found = self.check_sources(
            "equal length",
            question,
            |cs, slice, ends| {
                let lengths = PropertyAdder::new(slice).instrument_path_length(cs, &ends.dst_edges);
                let of_sources: Vec<SmtTerm> = ends
                    .sources
                    .iter()
                    .filter_map(|s| lengths.get(s).cloned())
                    .collect();
                let equal = all_equal(&of_sources);
                lengths.keys().map(|r| (r.clone(), equal.clone())).collect::<SourceProperties>()
            },
            |encoder, model, _| decode(encoder, model),
        )?;
        Ok(one(found))
    }

    /// Per destination edge: the control-plane loads of sources that neighbour
    /// other sources stay within `k` of each other. Keys are
    /// `"router,interface"`.
    pub fn compute_load_balance(&self, question: &Question, k: u32) -> Result<ManyAnswer, CheckError> {
        let ends = Self::endpoints(&self.graph, question)?;
        let mut peers: Vec<String> = Vec::new();
        for router in &ends.sources {
            let Some(neighbors) = self.graph.neighbors(router) else {
                continue;
            };
            peers.extend(ends.sources.iter().filter(|p| neighbors.contains(*p)).cloned());
        }
        info!(
            destinations = ends.dst_edges.len(),
            peers = peers.len(),
            "checking load balance"
        );

        let outcomes = run_all(ends.dst_edges.clone(), self.options.workers, |edge: GraphEdge| {
            let mut q = question.clone();
            if q.header_space.dst_ips.is_empty() {
                q.header_space.dst_ips.push(edge.prefix.network());
            }
            let mut encoder = Encoder::new(&self.graph, &q)?;
            self.constrain_single(&mut encoder, &q, &q.header_space);
            let loads = {
                let (cs, slices) = encoder.parts();
                PropertyAdder::new(&slices[0]).instrument_load(cs)
            };
            let peer_loads: Vec<SmtTerm> = peers.iter().filter_map(|p| loads.get(p).cloned()).collect();
            encoder.add(within(&peer_loads, k).not());
            let label = edge.label();
            let (result, _) = self.solve(&encoder, &label.replace(',', "-"))?;
            Ok((label, result))
        })?;
        Ok(ManyAnswer {
            results: outcomes.into_iter().collect(),
            skipped: BTreeMap::new(),
        })
    }

    /// A router without boundary edges receives the packet from a
    /// neighbour but neither forwards nor accepts it.
    pub fn compute_black_hole(&self, question: &Question) -> Result<OneAnswer, CheckError> {
        let graph = &self.graph;
        let interior: Vec<&str> = graph
            .routers()
            .filter(|r| graph.edges(r).iter().all(|e| !e.is_boundary()))
            .collect();
        info!(routers = interior.len(), "checking black holes");
        let mut encoder = Encoder::new(graph, question)?;
        self.constrain_single(&mut encoder, question, &question.header_space);
        let slice = encoder.slice(0);
        let some_hole = SmtTerm::or(
            interior
                .iter()
                .map(|&router| {
                    let forwards_nowhere = SmtTerm::and(
                        graph
                            .edges(router)
                            .iter()
                            .map(|e| slice.data_fwd(router, &e.interface).not())
                            .collect(),
                    );
                    let sent_here = SmtTerm::or(
                        graph
                            .neighbors(router)
                            .into_iter()
                            .flatten()
                            .flat_map(|n| graph.edges(n))
                            .filter(|e| e.peer.as_deref() == Some(router))
                            .map(|e| slice.data_fwd(&e.router, &e.interface))
                            .collect(),
                    );
                    SmtTerm::and(vec![sent_here, forwards_nowhere, slice.accepts(router).not()])
                })
                .collect(),
        );
        encoder.add(some_hole);
        let (result, _) = self.solve(&encoder, "")?;
        Ok(OneAnswer { result })
    }

    /// Whenever a router reaches the destination, every edge it forwards
    /// over on the control plane also carries the packet to a router that
    /// reaches it.
    pub fn compute_multipath_consistency(&self, question: &Question) -> Result<OneAnswer, CheckError> {
        let graph = &self.graph;
        let ends = Self::endpoints(graph, question)?;
        let space = infer_header_space(graph, question, &ends.dst_edges);
        info!(destinations = ends.dst_edges.len(), "checking multipath consistency");
        let mut encoder = Encoder::new(graph, question)?;
        self.constrain_single(&mut encoder, question, &space);
        let reach = {
            let (cs, slices) = encoder.parts();
            PropertyAdder::new(&slices[0]).instrument_reachability(cs, &ends.dst_edges)
        };
        let slice = encoder.slice(0);
        let inconsistent = SmtTerm::or(
            graph
                .routers()
                .map(|router| {
                    let all = SmtTerm::and(
                        graph
                            .edges(router)
                            .iter()
                            .map(|edge| {
                                let peer_reach = match &edge.peer {
                                    Some(peer) => reach.get(peer).cloned().unwrap_or_else(SmtTerm::ff),
                                    None => SmtTerm::tt(),
                                };
                                slice
                                    .control_fwd(router, &edge.interface)
                                    .implies(SmtTerm::and(vec![slice.forwards_across(edge), peer_reach]))
                            })
                            .collect(),
                    );
                    let reaches = reach.get(router).cloned().unwrap_or_else(SmtTerm::ff);
                    reaches.implies(all).not()
                })
                .collect(),
        );
        encoder.add(inconsistent);
        let (result, _) = self.solve(&encoder, "")?;
        Ok(OneAnswer { result })
    }

    /// Packets to statically routed prefixes never loop through a router
    /// with static routes.
    pub fn compute_routing_loop(&self, question: &Question) -> Result<OneAnswer, CheckError> {
        let graph = &self.graph;
        let space = HeaderSpace::new(
            graph
                .all_static_routes()
                .values()
                .flatten()
                .map(|route| route.network.network())
                .collect(),
        );
        let routers: Vec<&str> = graph
            .routers()
            .filter(|r| graph.config(r).is_some_and(|c| !c.static_routes.is_empty()))
            .collect();
        info!(routers = routers.len(), prefixes = space.dst_ips.len(), "checking routing loops");
        let mut q = question.clone();
        q.header_space = space;
        let mut encoder = Encoder::new(graph, &q)?;
        self.constrain_single(&mut encoder, &q, &q.header_space);
        let some_loop = {
            let (cs, slices) = encoder.parts();
            let adder = PropertyAdder::new(&slices[0]);
            SmtTerm::or(routers.iter().map(|r| adder.instrument_loop(cs, r)).collect())
        };
        encoder.add(some_loop);
        let (result, _) = self.solve(&encoder, "")?;
        Ok(OneAnswer { result })
    }

    /// Base environment and destination space on slice 0 of a single-copy
    /// query.
    fn constrain_single(&self, encoder: &mut Encoder<'_>, question: &Question, space: &HeaderSpace) {
        let slice = encoder.slice(0);
        let env = slice.environment_constraint(question.base_env);
        let in_space = slice.packet().in_header_space(space);
        encoder.add(env);
        encoder.add(in_space);
    }
}

fn one(found: Option<VerificationResult>) -> OneAnswer {
    OneAnswer {
        result: found.unwrap_or_else(VerificationResult::verified),
    }
}

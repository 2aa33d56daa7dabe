//! Derived properties over an encoded slice.
//!
//! Recursive properties are unrolled to a depth of the number of routers,
//! with one declared variable per level so that formulas stay linear in
//! size.

use indexmap::IndexMap;

use netverify_model::GraphEdge;
use netverify_smt::constraints::ConstraintSet;
use netverify_smt::terms::SmtTerm;

use crate::slice::EncoderSlice;

#[derive(Debug, Clone, Copy)]
enum Forwarding {
    Data,
    Control,
}

pub struct PropertyAdder<'a, 'g> {
    slice: &'a EncoderSlice<'g>,
}

impl<'a, 'g> PropertyAdder<'a, 'g> {
    pub fn new(slice: &'a EncoderSlice<'g>) -> Self {
        Self { slice }
    }

    fn depth(&self) -> usize {
        self.slice.graph().num_routers().max(1)
    }

    /// Forwards directly out of one of `dst_edges` under `fwd`.
    fn delivers(&self, router: &str, dst_edges: &[GraphEdge], fwd: Forwarding) -> SmtTerm {
        SmtTerm::or(
            dst_edges
                .iter()
                .filter(|e| e.router == router)
                .map(|e| self.decision(fwd, &e.router, &e.interface))
                .collect(),
        )
    }

    fn decision(&self, fwd: Forwarding, router: &str, iface: &str) -> SmtTerm {
        match fwd {
            Forwarding::Data => self.slice.data_fwd(router, iface),
            Forwarding::Control => self.slice.control_fwd(router, iface),
        }
    }

    /// Per router: the packet leaves the network through one of
    /// `dst_edges` when injected at that router.
    pub fn instrument_reachability(
        &self,
        cs: &mut ConstraintSet,
        dst_edges: &[GraphEdge],
    ) -> IndexMap<String, SmtTerm> {
        self.unroll_reach(cs, dst_edges, Forwarding::Data, "reach")
    }

    fn unroll_reach(
        &self,
        cs: &mut ConstraintSet,
        dst_edges: &[GraphEdge],
        fwd: Forwarding,
        tag: &str,
    ) -> IndexMap<String, SmtTerm> {
        let graph = self.slice.graph();
        let s = self.slice.name();
        let mut level: IndexMap<String, SmtTerm> = IndexMap::new();
        for router in graph.routers() {
            let var = cs.declare_bool(format!("{s}_{router}_{tag}_0"));
            cs.add(var.clone().iff(self.delivers(router, dst_edges, fwd)));
            level.insert(router.to_string(), var);
        }
        for k in 1..self.depth() {
            let mut next = IndexMap::new();
            for router in graph.routers() {
                let mut options = vec![self.delivers(router, dst_edges, fwd)];
                for edge in graph.edges(router) {
                    let Some(peer_reach) = edge.peer.as_ref().and_then(|p| level.get(p)) else {
                        continue;
                    };
                    options.push(SmtTerm::and(vec![
                        self.decision(fwd, router, &edge.interface),
                        peer_reach.clone(),
                    ]));
                }
                let var = cs.declare_bool(format!("{s}_{router}_{tag}_{k}"));
                cs.add(var.clone().iff(SmtTerm::or(options)));
                next.insert(router.to_string(), var);
            }
            level = next;
        }
        level
    }

    /// Per router: hops to the destination along control forwarding. 0 at
    /// the destination and for routers whose control path never gets there,
    /// whatever the data plane does with the packet on the way.
    pub fn instrument_path_length(
        &self,
        cs: &mut ConstraintSet,
        dst_edges: &[GraphEdge],
    ) -> IndexMap<String, SmtTerm> {
        let reach = self.unroll_reach(cs, dst_edges, Forwarding::Control, "ctrl_reach");
        let graph = self.slice.graph();
        let s = self.slice.name();
        let bound = i64::try_from(self.depth()).unwrap_or(i64::MAX);
        let lengths: IndexMap<String, SmtTerm> = graph
            .routers()
            .map(|r| {
                (
                    r.to_string(),
                    cs.declare_int(format!("{s}_{r}_path_length"), 0, bound),
                )
            })
            .collect();
        for router in graph.routers() {
            let (Some(len), Some(reachable)) = (lengths.get(router), reach.get(router)) else {
                continue;
            };
            let direct = self.delivers(router, dst_edges, Forwarding::Control);
            cs.add(direct.clone().implies(len.clone().eq(SmtTerm::int(0))));
            for edge in graph.edges(router) {
                let (Some(peer_len), Some(peer_reach)) = (
                    edge.peer.as_ref().and_then(|p| lengths.get(p)),
                    edge.peer.as_ref().and_then(|p| reach.get(p)),
                ) else {
                    continue;
                };
                let via = SmtTerm::and(vec![
                    direct.clone().not(),
                    self.slice.control_fwd(router, &edge.interface),
                    peer_reach.clone(),
                ]);
                cs.add(via.implies(len.clone().eq(peer_len.clone().add(SmtTerm::int(1)))));
            }
            cs.add(
                reachable
                    .clone()
                    .not()
                    .implies(len.clone().eq(SmtTerm::int(0))),
            );
        }
        lengths
    }

    /// Per router: how many neighbours forward towards it on the control
    /// plane.
    pub fn instrument_load(&self, cs: &mut ConstraintSet) -> IndexMap<String, SmtTerm> {
        let graph = self.slice.graph();
        let s = self.slice.name();
        let mut loads = IndexMap::new();
        for router in graph.routers() {
            let mut incoming = Vec::new();
            for neighbor in graph.neighbors(router).into_iter().flatten() {
                for edge in graph.edges(neighbor) {
                    if edge.peer.as_deref() == Some(router) {
                        incoming.push(self.slice.control_fwd(neighbor, &edge.interface).as_count());
                    }
                }
            }
            let load = cs.declare_free_int(format!("{s}_{router}_load"));
            cs.add(load.clone().eq(SmtTerm::sum(incoming)));
            loads.insert(router.to_string(), load);
        }
        loads
    }

    /// Forwarding that starts at `start` can come back to it. Connected
    /// routes never take part in a loop.
    pub fn instrument_loop(&self, cs: &mut ConstraintSet, start: &str) -> SmtTerm {
        let graph = self.slice.graph();
        let s = self.slice.name();
        let step = |from: &str, to: &str| {
            SmtTerm::or(
                graph
                    .edges(from)
                    .iter()
                    .filter(|e| e.peer.as_deref() == Some(to))
                    .map(|e| self.slice.routed_fwd(from, &e.interface))
                    .collect(),
            )
        };
        let mut visited: IndexMap<String, SmtTerm> = IndexMap::new();
        for router in graph.routers() {
            let var = cs.declare_bool(format!("{s}_{start}_visit_0_{router}"));
            cs.add(var.clone().iff(step(start, router)));
            visited.insert(router.to_string(), var);
        }
        for k in 1..self.depth() {
            let mut next = IndexMap::new();
            for router in graph.routers() {
                let mut options = vec![visited[router].clone()];
                for neighbor in graph.neighbors(router).into_iter().flatten() {
                    if let Some(seen) = visited.get(neighbor.as_str()) {
                        options.push(SmtTerm::and(vec![seen.clone(), step(neighbor, router)]));
                    }
                }
                let var = cs.declare_bool(format!("{s}_{start}_visit_{k}_{router}"));
                cs.add(var.clone().iff(SmtTerm::or(options)));
                next.insert(router.to_string(), var);
            }
            visited = next;
        }
        visited.get(start).cloned().unwrap_or_else(SmtTerm::ff)
    }
}

/// All terms are equal.
pub fn all_equal(terms: &[SmtTerm]) -> SmtTerm {
    SmtTerm::and(
        terms
            .windows(2)
            .map(|pair| pair[0].clone().eq(pair[1].clone()))
            .collect(),
    )
}

/// Every pair of terms differs by at most `k`.
pub fn within(terms: &[SmtTerm], k: u32) -> SmtTerm {
    let k = SmtTerm::int(i64::from(k));
    let mut parts = Vec::new();
    for (i, a) in terms.iter().enumerate() {
        for b in &terms[i + 1..] {
            parts.push(a.clone().sub(b.clone()).le(k.clone()));
            parts.push(b.clone().sub(a.clone()).le(k.clone()));
        }
    }
    SmtTerm::and(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_model::config::{Interface, Network, RouterConfig, StaticRoute};
    use netverify_model::{Graph, Prefix, TieBreak};
    use netverify_smt::backends::z3_backend::Z3Solver;
    use netverify_smt::solver::{Model, ModelValue, SatResult};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn pfx(s: &str) -> Prefix {
        s.parse().expect("prefix")
    }

    /// r1 -- r2 -- r3, with static routes towards r3's `ext` subnet.
    fn chain() -> Graph {
        let mut r1 = RouterConfig::new("r1");
        r1.interfaces = vec![Interface::new("e0", pfx("10.0.12.1/24"))];
        r1.static_routes = vec![StaticRoute::via_interface(pfx("10.0.99.0/24"), "e0")];
        let mut r2 = RouterConfig::new("r2");
        r2.interfaces = vec![
            Interface::new("e0", pfx("10.0.12.2/24")),
            Interface::new("e1", pfx("10.0.23.2/24")),
        ];
        r2.static_routes = vec![StaticRoute::via_interface(pfx("10.0.99.0/24"), "e1")];
        let mut r3 = RouterConfig::new("r3");
        r3.interfaces = vec![
            Interface::new("e1", pfx("10.0.23.3/24")),
            Interface::new("ext", pfx("10.0.99.3/24")),
        ];
        Graph::new(&Network::new(vec![r1, r2, r3])).expect("graph")
    }

    #[test]
    fn path_length_counts_hops_to_the_destination() -> TestResult {
        let graph = chain();
        let mut cs = ConstraintSet::new();
        let slice = EncoderSlice::new(&mut cs, &graph, "0", TieBreak::EdgeOrder)?;
        cs.add(slice.failures().at_most(0));
        cs.add(slice.packet().dst_in(&pfx("10.0.99.0/24")));
        let dst = vec![graph.edge("r3", "ext").expect("edge").clone()];
        let lengths = PropertyAdder::new(&slice).instrument_path_length(&mut cs, &dst);
        cs.add(lengths["r1"].clone().eq(SmtTerm::int(2)).not());
        let (result, _) = cs.solve(&mut Z3Solver::new())?;
        assert_eq!(result, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn load_counts_forwarding_neighbours() -> TestResult {
        let graph = chain();
        let mut cs = ConstraintSet::new();
        let slice = EncoderSlice::new(&mut cs, &graph, "0", TieBreak::EdgeOrder)?;
        cs.add(slice.packet().dst_in(&pfx("10.0.99.0/24")));
        let loads = PropertyAdder::new(&slice).instrument_load(&mut cs);
        cs.add(loads["r2"].clone().eq(SmtTerm::int(1)).not());
        let (result, _) = cs.solve(&mut Z3Solver::new())?;
        assert_eq!(result, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn loop_free_chain_has_no_loop() -> TestResult {
        let graph = chain();
        let mut cs = ConstraintSet::new();
        let slice = EncoderSlice::new(&mut cs, &graph, "0", TieBreak::EdgeOrder)?;
        let adder = PropertyAdder::new(&slice);
        let any_loop = SmtTerm::or(
            ["r1", "r2"]
                .into_iter()
                .map(|r| adder.instrument_loop(&mut cs, r))
                .collect(),
        );
        cs.add(any_loop);
        let (result, _) = cs.solve(&mut Z3Solver::new())?;
        assert_eq!(result, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn equality_helpers() {
        let terms = vec![SmtTerm::var("a"), SmtTerm::var("b"), SmtTerm::var("c")];
        let mut model = Model::default();
        for (name, value) in [("a", 3), ("b", 4), ("c", 5)] {
            model.values.insert(name.into(), ModelValue::Int(value));
        }
        assert_eq!(model.eval_bool(&all_equal(&terms)), Some(false));
        assert_eq!(model.eval_bool(&within(&terms, 1)), Some(false));
        assert_eq!(model.eval_bool(&within(&terms, 2)), Some(true));
        assert!(all_equal(&terms[..1]).is_true());
    }
}

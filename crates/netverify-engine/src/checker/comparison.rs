//! Checks that compare two copies of the network: one network against
//! itself, or two routers against each other.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use netverify_model::pattern::{matching_routers, NamePattern};
use netverify_model::{EnvironmentType, Graph, Protocol, Question};
use netverify_smt::solver::{Model, SmtSolver};
use netverify_smt::terms::SmtTerm;

use super::PropertyChecker;
use crate::counterexample::{route_description, Flow, VerificationResult};
use crate::encoder::Encoder;
use crate::error::CheckError;
use crate::result::{DeterminismAnswer, ManyAnswer};
use crate::slice::EncoderSlice;
use crate::workers::run_all;

impl<F, S> PropertyChecker<F>
where
    F: Fn() -> S + Sync,
    S: SmtSolver,
{
    /// Two runs over the same failures, environment and packet forward the
    /// packet identically.
    pub fn compute_determinism(&self, question: &Question) -> Result<DeterminismAnswer, CheckError> {
        if let Some(diff) = question.diff_type {
            return Err(CheckError::UnsupportedOption {
                option: "diff type",
                value: diff.to_string(),
            });
        }
        let graph = self.graph.as_ref();
        info!(tie_break = ?question.tie_break, "checking determinism");
        let mut encoder = Encoder::new(graph, question)?;
        let second = encoder.add_slice(graph, question.failures)?;
        let env = encoder.slice(0).environment_constraint(question.base_env);
        encoder.add(env);
        encoder.relate_failures(0, second)?;
        encoder.relate_environments(0, second)?;
        encoder.relate_packets(0, second);
        let in_space = encoder.slice(0).packet().in_header_space(&question.header_space);
        encoder.add(in_space);

        let (first, other) = (encoder.slice(0), encoder.slice(second));
        let required = SmtTerm::and(
            graph
                .all_real_edges()
                .map(|e| {
                    first
                        .data_fwd(&e.router, &e.interface)
                        .eq(other.data_fwd(&e.router, &e.interface))
                })
                .collect(),
        );
        encoder.add(required.not());

        let (result, model) = self.solve(&encoder, "")?;
        let Some(model) = model else {
            return Ok(DeterminismAnswer {
                result,
                flow: None,
                case1: BTreeSet::new(),
                case2: BTreeSet::new(),
            });
        };
        let (case1, case2) = diverging_edges(encoder.slice(0), encoder.slice(second), &model);
        Ok(DeterminismAnswer {
            result,
            flow: Some(Flow::from_model(encoder.slice(0).packet(), &model)),
            case1,
            case2,
        })
    }

    /// Neighbouring routers among those matching `node_regex` make the same
    /// decision for every environment. Routers are compared in name order;
    /// a pair whose interface names differ is skipped. `strict` compares
    /// the chosen routes themselves rather than where the packet goes.
    pub fn compute_local_consistency(
        &self,
        question: &Question,
        node_regex: &str,
        strict: bool,
    ) -> Result<ManyAnswer, CheckError> {
        if let Some(diff) = question.diff_type {
            return Err(CheckError::UnsupportedOption {
                option: "diff type",
                value: diff.to_string(),
            });
        }
        let pattern = NamePattern::new(node_regex, "")?;
        let mut routers = matching_routers(&self.graph, &pattern);
        routers.sort();
        if routers.len() <= 1 {
            info!(routers = routers.len(), "nothing to compare");
            return Ok(ManyAnswer::default());
        }

        let mut answer = ManyAnswer::default();
        let mut pairs = Vec::new();
        for window in routers.windows(2) {
            let (r1, r2) = (&window[0], &window[1]);
            let key = format!("{r1}<-->{r2}");
            let names = |r: &str| -> BTreeSet<&str> {
                self.graph.edges(r).iter().map(|e| e.interface.as_str()).collect()
            };
            if names(r1) != names(r2) {
                let reason = format!("routers {r1} and {r2} have different interfaces");
                warn!("{reason}");
                answer.skipped.insert(key, reason);
                continue;
            }
            pairs.push((key, r1.clone(), r2.clone()));
        }
        info!(pairs = pairs.len(), strict, "checking local consistency");

        let mut q = question.clone();
        q.failures = 0;
        q.base_env = EnvironmentType::Any;
        let results = run_all(pairs, self.options.workers, |(key, r1, r2)| {
            let result = self.compare_routers(&q, &r1, &r2, strict)?;
            Ok((key, result))
        })?;
        answer.results = results.into_iter().collect::<BTreeMap<_, _>>();
        Ok(answer)
    }

    fn compare_routers(
        &self,
        question: &Question,
        r1: &str,
        r2: &str,
        strict: bool,
    ) -> Result<VerificationResult, CheckError> {
        let only = |r: &str| BTreeSet::from([r.to_string()]);
        let g1 = Graph::restricted(&self.network, Some(&only(r1)))?;
        let g2 = Graph::restricted(&self.network, Some(&only(r2)))?;
        let mut encoder = Encoder::new(&g1, question)?;
        let second = encoder.add_slice(&g2, 0)?;
        encoder.relate_environments_with(0, second, |k| k.on_router(r2), CheckError::AsymmetricEnvironment)?;
        encoder.relate_packets(0, second);
        let in_space = encoder.slice(0).packet().in_header_space(&question.header_space);
        encoder.add(in_space);

        let (s1, s2) = (encoder.slice(0), encoder.slice(second));
        let mut assumptions = vec![outside_originated(s1, r1), outside_originated(s2, r2)];
        let required = if strict {
            for slice in [s1, s2] {
                let permitted: Vec<SmtTerm> = slice
                    .logical()
                    .environment()
                    .values()
                    .map(|record| record.permitted.clone())
                    .collect();
                for (i, a) in permitted.iter().enumerate() {
                    for b in &permitted[i + 1..] {
                        assumptions.push(SmtTerm::and(vec![a.clone(), b.clone()]).not());
                    }
                }
            }
            match (s1.overall(r1), s2.overall(r2)) {
                (Some(p1), Some(p2)) => p1.best.equal(&p2.best),
                (None, None) => SmtTerm::tt(),
                _ => SmtTerm::ff(),
            }
        } else {
            SmtTerm::and(
                g1.edges(r1)
                    .iter()
                    .map(|e| s1.data_fwd(r1, &e.interface).eq(s2.data_fwd(r2, &e.interface)))
                    .collect(),
            )
        };
        for a in assumptions {
            encoder.add(a);
        }
        encoder.add(required.not());

        let (result, _) = self.solve(&encoder, &format!("{r1}-{r2}"))?;
        Ok(result)
    }
}

/// The destination lies outside every prefix `router` originates itself.
fn outside_originated(slice: &EncoderSlice<'_>, router: &str) -> SmtTerm {
    let graph = slice.graph();
    SmtTerm::and(
        Protocol::ALL
            .iter()
            .filter_map(|&proto| graph.originated(router, proto))
            .flatten()
            .map(|prefix| slice.packet().dst_in(prefix).not())
            .collect(),
    )
}

/// Edges one run forwards over and the other does not, with the route
/// each run used there.
fn diverging_edges(
    first: &EncoderSlice<'_>,
    second: &EncoderSlice<'_>,
    model: &Model,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut case1 = BTreeSet::new();
    let mut case2 = BTreeSet::new();
    for edge in first.graph().all_real_edges() {
        let b1 = model
            .eval_bool(&first.data_fwd(&edge.router, &edge.interface))
            .unwrap_or(false);
        let b2 = model
            .eval_bool(&second.data_fwd(&edge.router, &edge.interface))
            .unwrap_or(false);
        if b1 == b2 {
            continue;
        }
        let (case, slice) = if b1 { (&mut case1, first) } else { (&mut case2, second) };
        let route = route_description(slice, &edge.router, model).unwrap_or_default();
        case.insert(format!("{edge} -- {route}"));
    }
    (case1, case2)
}

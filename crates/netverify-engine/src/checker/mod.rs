//! Property checks over a network.
//!
//! Every check follows the same outline: resolve the destination edges and
//! source routers named by the question, infer the destination header space
//! when none was given, work out which links may fail, then encode and
//! solve one query per equivalence class. The first satisfiable query
//! falsifies the property; if all are unsatisfiable it is verified.

mod comparison;
mod properties;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use netverify_model::pattern::{matching_interfaces, matching_links, matching_routers, NamePattern};
use netverify_model::{DiffType, Graph, GraphEdge, HeaderSpace, Network, Prefix, Question};
use netverify_smt::backends::z3_backend::Z3Solver;
use netverify_smt::constraints::ConstraintSet;
use netverify_smt::solver::{Model, SmtSolver};
use netverify_smt::terms::SmtTerm;

use crate::abstraction::{EquivalenceClass, EquivalenceClasses};
use crate::counterexample::VerificationResult;
use crate::encoder::Encoder;
use crate::error::CheckError;
use crate::slice::EncoderSlice;
use crate::workers::first_falsification;

/// Options for running checks.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Worker threads for independent units; 1 runs them in order.
    pub workers: usize,
    pub timeout_secs: u64,
    /// Write the SMT-LIB script of every query next to this path.
    pub dump_smt: Option<PathBuf>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout_secs: 300,
            dump_smt: None,
        }
    }
}

/// Runs property checks on one network. `F` builds a fresh solver for
/// every query.
pub struct PropertyChecker<F> {
    network: Network,
    graph: Arc<Graph>,
    options: CheckOptions,
    solvers: F,
}

/// A checker backed by Z3 with the configured timeout.
pub fn z3_checker(
    network: &Network,
    options: CheckOptions,
) -> Result<PropertyChecker<impl Fn() -> Z3Solver + Sync>, CheckError> {
    let timeout = options.timeout_secs;
    PropertyChecker::new(network, options, move || Z3Solver::with_timeout_secs(timeout))
}

/// Destination edges and source routers a question is about.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub dst_edges: Vec<GraphEdge>,
    pub sources: Vec<String>,
}

/// Per-source property terms produced by an instrumentation.
pub(crate) type SourceProperties = IndexMap<String, SmtTerm>;

impl<F, S> PropertyChecker<F>
where
    F: Fn() -> S + Sync,
    S: SmtSolver,
{
    pub fn new(network: &Network, options: CheckOptions, solvers: F) -> Result<Self, CheckError> {
        let graph = Graph::new(network)?;
        debug!(
            routers = graph.num_routers(),
            edges = graph.all_real_edges().count(),
            "network graph built"
        );
        Ok(Self {
            network: network.clone(),
            graph: Arc::new(graph),
            options,
            solvers,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    fn solver(&self) -> S {
        (self.solvers)()
    }

    /// Dump path for the query labelled `label`.
    fn dump_path(&self, label: &str) -> Option<PathBuf> {
        let base = self.options.dump_smt.as_ref()?;
        let stem = base
            .file_stem()
            .map_or_else(|| "query".to_string(), |s| s.to_string_lossy().into_owned());
        let name = if label.is_empty() {
            format!("{stem}.smt2")
        } else {
            format!("{stem}-{label}.smt2")
        };
        Some(base.with_file_name(name))
    }

    /// Solve the query held by `encoder`.
    fn solve(
        &self,
        encoder: &Encoder<'_>,
        label: &str,
    ) -> Result<(VerificationResult, Option<Model>), CheckError> {
        let mut solver = self.solver();
        let dump = self.dump_path(label);
        let outcome = encoder.verify(&mut solver, dump.as_deref())?;
        if let Some(path) = dump {
            info!("SMT dump written to {}", path.display());
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Input resolution
    // -----------------------------------------------------------------------

    fn endpoints(graph: &Graph, question: &Question) -> Result<Endpoints, CheckError> {
        let node = NamePattern::new(&question.dst_node_regex, &question.not_dst_node_regex)?;
        let iface = NamePattern::new(&question.dst_iface_regex, &question.not_dst_iface_regex)?;
        let dst_edges = matching_interfaces(graph, &node, &iface);
        if dst_edges.is_empty() {
            return Err(CheckError::EmptyDestinations {
                node: question.dst_node_regex.clone(),
                iface: question.dst_iface_regex.clone(),
            });
        }
        let ingress = NamePattern::new(&question.ingress_node_regex, &question.not_ingress_node_regex)?;
        let sources = matching_routers(graph, &ingress);
        if sources.is_empty() {
            return Err(CheckError::EmptySources(question.ingress_node_regex.clone()));
        }
        Ok(Endpoints { dst_edges, sources })
    }

    /// Links the solver may fail: those between routers matching the two
    /// fail patterns, in either direction, minus those between routers
    /// matching the two protect patterns.
    fn failure_candidates(graph: &Graph, question: &Question) -> Result<BTreeSet<GraphEdge>, CheckError> {
        let either_way = |a: &str, b: &str| -> Result<BTreeSet<GraphEdge>, CheckError> {
            let (a, b) = (NamePattern::new(a, "")?, NamePattern::new(b, "")?);
            let mut out: BTreeSet<GraphEdge> = matching_links(graph, &a, &b).into_iter().collect();
            out.extend(matching_links(graph, &b, &a));
            Ok(out)
        };
        let fail = either_way(&question.fail_node1_regex, &question.fail_node2_regex)?;
        let keep = either_way(&question.not_fail_node1_regex, &question.not_fail_node2_regex)?;
        Ok(fail.difference(&keep).cloned().collect())
    }

    /// Pin links outside `candidates` up, and keep destination links up
    /// for packets addressed into their subnet.
    fn add_failure_constraints(
        encoder: &mut Encoder<'_>,
        dst_edges: &[GraphEdge],
        candidates: &BTreeSet<GraphEdge>,
    ) {
        let slice = encoder.slice(0);
        let mut constraints = Vec::new();
        for edge in slice.graph().all_real_edges() {
            let Some(failed) = slice.failures().get(&edge.router, &edge.interface) else {
                continue;
            };
            let up = failed.clone().eq(SmtTerm::int(0));
            if !candidates.contains(edge) {
                constraints.push(up);
            } else if dst_edges.contains(edge) {
                let relevant = slice.packet().dst_in(&edge.prefix.network());
                constraints.push(relevant.implies(up));
            }
        }
        for c in constraints {
            encoder.add(c);
        }
    }

    // -----------------------------------------------------------------------
    // Generic driver
    // -----------------------------------------------------------------------

    /// Check a per-source property class by class. `instrument` yields the
    /// property of every source on one slice; `decode` turns a satisfying
    /// model into the answer.
    fn check_sources<T, P, D>(
        &self,
        property: &str,
        question: &Question,
        instrument: P,
        decode: D,
    ) -> Result<Option<T>, CheckError>
    where
        T: Send,
        P: Fn(&mut ConstraintSet, &EncoderSlice<'_>, &Endpoints) -> SourceProperties + Sync,
        D: Fn(&Encoder<'_>, &Model, &Endpoints) -> T + Sync,
    {
        let endpoints = Self::endpoints(&self.graph, question)?;
        let header_space = infer_header_space(&self.graph, question, &endpoints.dst_edges);
        let mut pinned = BTreeSet::new();
        for edge in &endpoints.dst_edges {
            pinned.insert(edge.router.clone());
            pinned.extend(self.graph.neighbors(&edge.router).into_iter().flatten().cloned());
        }
        let classes = EquivalenceClasses::new(
            Arc::clone(&self.graph),
            &header_space,
            question.use_abstraction,
            pinned,
        )?;
        info!(
            property,
            classes = classes.len(),
            sources = endpoints.sources.len(),
            destinations = endpoints.dst_edges.len(),
            "checking"
        );

        let units = classes.iter().enumerate();
        let found = first_falsification(units, self.options.workers, |(index, class)| {
            self.check_class(index, &class, question, &endpoints, &instrument, &decode)
        })?;
        info!(property, verified = found.is_none(), "check finished");
        Ok(found)
    }

    fn check_class<T, P, D>(
        &self,
        index: usize,
        class: &EquivalenceClass,
        question: &Question,
        concrete: &Endpoints,
        instrument: &P,
        decode: &D,
    ) -> Result<Option<T>, CheckError>
    where
        P: Fn(&mut ConstraintSet, &EncoderSlice<'_>, &Endpoints) -> SourceProperties,
        D: Fn(&Encoder<'_>, &Model, &Endpoints) -> T,
    {
        let graph = class.graph.as_ref();
        let mut question = question.clone();
        question.header_space = class.header_space.clone();
        let endpoints = if class.abstraction.is_some() {
            let sources: BTreeSet<String> = concrete
                .sources
                .iter()
                .map(|s| class.representative(s).to_string())
                .collect();
            Endpoints {
                dst_edges: Self::endpoints(graph, &question)?.dst_edges,
                sources: sources.into_iter().collect(),
            }
        } else {
            concrete.clone()
        };
        let candidates = Self::failure_candidates(graph, &question)?;

        let mut encoder = Encoder::new(graph, &question)?;
        let base_env = match question.diff_type {
            Some(_) if question.env_diff => Some(question.delta_env),
            Some(_) => None,
            None => Some(question.base_env),
        };
        if let Some(env) = base_env {
            let c = encoder.slice(0).environment_constraint(env);
            encoder.add(c);
        }
        let in_space = encoder.slice(0).packet().in_header_space(&question.header_space);
        encoder.add(in_space);
        let prop = {
            let (cs, slices) = encoder.parts();
            instrument(cs, &slices[0], &endpoints)
        };

        let holds = |props: &SourceProperties, source: &str| {
            props.get(source).cloned().unwrap_or_else(SmtTerm::tt)
        };
        match question.diff_type {
            Some(diff) => {
                let second = encoder.add_slice(graph, 0)?;
                let env = encoder.slice(second).environment_constraint(question.base_env);
                encoder.add(env);
                if !question.env_diff {
                    encoder.relate_environments(0, second)?;
                }
                let prop2 = {
                    let (cs, slices) = encoder.parts();
                    instrument(cs, &slices[second], &endpoints)
                };
                let required = SmtTerm::and(
                    endpoints
                        .sources
                        .iter()
                        .map(|s| required_relation(diff, holds(&prop, s), holds(&prop2, s)))
                        .collect(),
                );
                encoder.relate_packets(0, second);
                encoder.add(required.not());
            }
            None => {
                let all = SmtTerm::and(endpoints.sources.iter().map(|s| holds(&prop, s)).collect());
                encoder.add(all.not());
            }
        }
        Self::add_failure_constraints(&mut encoder, &endpoints.dst_edges, &candidates);

        let (result, model) = self.solve(&encoder, &format!("class{index}"))?;
        debug!(class = index, verified = result.verified, "class solved");
        Ok(model.map(|m| decode(&encoder, &m, &endpoints)))
    }
}

/// The relation two copies must keep for a diff type.
fn required_relation(diff: DiffType, first: SmtTerm, second: SmtTerm) -> SmtTerm {
    match diff {
        DiffType::Increased => first.implies(second),
        DiffType::Reduced => second.implies(first),
        DiffType::Any => first.eq(second),
    }
}

/// Destination addresses implied by the destination edges, unless the
/// question names some. An eBGP destination leaves the space open; a
/// boundary edge contributes its subnet; an edge of a host contributes its
/// subnet minus the peer's address; any other edge contributes the exact
/// interface address.
pub(crate) fn infer_header_space(graph: &Graph, question: &Question, dst_edges: &[GraphEdge]) -> HeaderSpace {
    let given = &question.header_space;
    if !given.dst_ips.is_empty() {
        return given.clone();
    }
    let mut space = given.clone();
    for edge in dst_edges {
        if graph.ebgp_neighbors().contains_key(edge) {
            space.clear();
            break;
        }
        if edge.is_boundary() {
            space.dst_ips.push(edge.prefix.network());
        } else if graph.is_host(&edge.router) {
            space.dst_ips.push(edge.prefix.network());
            if let Some(peer) = edge.peer_prefix {
                space.not_dst_ips.push(Prefix::host(peer.address()));
            }
        } else {
            space.dst_ips.push(Prefix::host(edge.prefix.address()));
        }
    }
    space
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_model::config::{BgpConfig, BgpNeighbor, Interface, RouterConfig};

    fn pfx(s: &str) -> Prefix {
        s.parse().expect("prefix")
    }

    fn pair(host: bool) -> Graph {
        let mut a = RouterConfig::new("a");
        a.interfaces = vec![
            Interface::new("e0", pfx("10.0.0.1/24")),
            Interface::new("ext", pfx("192.0.2.1/24")),
        ];
        a.host = host;
        let mut b = RouterConfig::new("b");
        b.interfaces = vec![Interface::new("e0", pfx("10.0.0.2/24"))];
        Graph::new(&Network::new(vec![a, b])).expect("graph")
    }

    fn edge(graph: &Graph, router: &str, iface: &str) -> GraphEdge {
        graph.edge(router, iface).expect("edge").clone()
    }

    #[test]
    fn header_space_follows_the_destination_edges() {
        let graph = pair(false);
        let q = Question::default();
        let boundary = infer_header_space(&graph, &q, &[edge(&graph, "a", "ext")]);
        assert_eq!(boundary.dst_ips, vec![pfx("192.0.2.0/24")]);
        let internal = infer_header_space(&graph, &q, &[edge(&graph, "a", "e0")]);
        assert_eq!(internal.dst_ips, vec![pfx("10.0.0.1/32")]);

        let hosted = pair(true);
        let host = infer_header_space(&hosted, &q, &[edge(&hosted, "a", "e0")]);
        assert_eq!(host.dst_ips, vec![pfx("10.0.0.0/24")]);
        assert_eq!(host.not_dst_ips, vec![pfx("10.0.0.2/32")]);
    }

    #[test]
    fn given_or_ebgp_header_spaces_are_kept_open() {
        let mut a = RouterConfig::new("a");
        a.interfaces = vec![Interface::new("ext", pfx("192.0.2.1/24"))];
        a.bgp = Some(BgpConfig {
            local_as: 1,
            neighbors: vec![BgpNeighbor {
                address: "192.0.2.2".parse().expect("ip"),
                remote_as: 2,
                import_policy: None,
                export_policy: None,
            }],
            ..BgpConfig::default()
        });
        let graph = Graph::new(&Network::new(vec![a])).expect("graph");
        let q = Question::default();
        let open = infer_header_space(&graph, &q, &[edge(&graph, "a", "ext")]);
        assert!(open.is_unconstrained());

        let given = Question {
            header_space: HeaderSpace::new(vec![pfx("8.8.8.0/24")]),
            ..Question::default()
        };
        let kept = infer_header_space(&graph, &given, &[edge(&graph, "a", "ext")]);
        assert_eq!(kept.dst_ips, vec![pfx("8.8.8.0/24")]);
    }

    #[test]
    fn dump_paths_carry_the_query_label() {
        let options = CheckOptions {
            dump_smt: Some(PathBuf::from("/tmp/out/query.smt2")),
            ..CheckOptions::default()
        };
        let network = Network::new(vec![RouterConfig::new("a")]);
        let checker = z3_checker(&network, options).expect("checker");
        assert_eq!(checker.dump_path("class3"), Some(PathBuf::from("/tmp/out/query-class3.smt2")));
        assert_eq!(checker.dump_path(""), Some(PathBuf::from("/tmp/out/query.smt2")));
    }

    #[test]
    fn unmatched_endpoints_are_fatal() {
        let graph = pair(false);
        let q = Question::between("nowhere", ".*", ".*");
        let err = PropertyChecker::<fn() -> Z3Solver>::endpoints(&graph, &q).expect_err("no dst");
        assert!(matches!(err, CheckError::EmptyDestinations { .. }));
        let q = Question::between("a", "ext", "zz.*");
        let err = PropertyChecker::<fn() -> Z3Solver>::endpoints(&graph, &q).expect_err("no src");
        assert!(matches!(err, CheckError::EmptySources(s) if s == "zz.*"));
    }

    #[test]
    fn protected_links_are_not_failure_candidates() {
        let graph = pair(false);
        let all = PropertyChecker::<fn() -> Z3Solver>::failure_candidates(&graph, &Question::default())
            .expect("candidates");
        assert!(all.contains(&edge(&graph, "a", "e0")));
        assert!(all.contains(&edge(&graph, "b", "e0")));
        let protected = Question {
            not_fail_node1_regex: "a".into(),
            not_fail_node2_regex: "b".into(),
            ..Question::default()
        };
        let rest = PropertyChecker::<fn() -> Z3Solver>::failure_candidates(&graph, &protected)
            .expect("candidates");
        assert!(!rest.contains(&edge(&graph, "a", "e0")));
        assert!(!rest.contains(&edge(&graph, "b", "e0")));
    }
}

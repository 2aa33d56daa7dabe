//! Link failure variables.

use indexmap::IndexMap;

use netverify_model::{Graph, GraphEdge};
use netverify_smt::constraints::ConstraintSet;
use netverify_smt::terms::SmtTerm;

/// One 0/1 variable per undirected link; 1 means the link is down.
///
/// Both directions of an internal link share the variable of whichever
/// direction comes first in edge order.
#[derive(Debug, Clone, Default)]
pub struct SymbolicFailures {
    by_edge: IndexMap<(String, String), SmtTerm>,
    links: Vec<(GraphEdge, SmtTerm)>,
}

impl SymbolicFailures {
    pub fn declare(cs: &mut ConstraintSet, graph: &Graph, slice: &str) -> Self {
        let mut failures = Self::default();
        for edge in graph.all_real_edges() {
            let key = (edge.router.clone(), edge.interface.clone());
            if failures.by_edge.contains_key(&key) {
                continue;
            }
            let var = cs.declare_int(
                format!("{slice}_fail_{}_{}", edge.router, edge.interface),
                0,
                1,
            );
            if let Some(back) = graph.other_end(edge) {
                failures
                    .by_edge
                    .insert((back.router.clone(), back.interface.clone()), var.clone());
            }
            failures.by_edge.insert(key, var.clone());
            failures.links.push((edge.clone(), var));
        }
        failures
    }

    pub fn get(&self, router: &str, iface: &str) -> Option<&SmtTerm> {
        self.by_edge.get(&(router.to_string(), iface.to_string()))
    }

    /// The edge is not failed. Edges without a variable never fail.
    pub fn up(&self, edge: &GraphEdge) -> SmtTerm {
        self.get(&edge.router, &edge.interface)
            .map_or_else(SmtTerm::tt, |f| f.clone().eq(SmtTerm::int(0)))
    }

    /// Each undirected link once, keyed by its first direction.
    pub fn links(&self) -> &[(GraphEdge, SmtTerm)] {
        &self.links
    }

    /// At most `limit` links are down at once.
    pub fn at_most(&self, limit: u32) -> SmtTerm {
        let total = SmtTerm::sum(self.links.iter().map(|(_, f)| f.clone()).collect());
        total.le(SmtTerm::int(i64::from(limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_model::config::{Interface, Network, RouterConfig};

    fn pair() -> Graph {
        let mut a = RouterConfig::new("a");
        a.interfaces = vec![
            Interface::new("e0", "10.0.0.1/24".parse().expect("prefix")),
            Interface::new("ext", "192.0.2.1/24".parse().expect("prefix")),
        ];
        let mut b = RouterConfig::new("b");
        b.interfaces = vec![Interface::new("e0", "10.0.0.2/24".parse().expect("prefix"))];
        Graph::new(&Network::new(vec![a, b])).expect("graph")
    }

    #[test]
    fn directions_of_a_link_share_one_variable() {
        let graph = pair();
        let mut cs = ConstraintSet::new();
        let failures = SymbolicFailures::declare(&mut cs, &graph, "0");
        assert_eq!(failures.links().len(), 2);
        assert_eq!(failures.get("a", "e0"), failures.get("b", "e0"));
        assert!(cs.is_declared("0_fail_a_e0"));
        assert!(cs.is_declared("0_fail_a_ext"));
        assert!(!cs.is_declared("0_fail_b_e0"));
    }

    #[test]
    fn zero_budget_keeps_every_link_up() {
        let graph = pair();
        let mut cs = ConstraintSet::new();
        let failures = SymbolicFailures::declare(&mut cs, &graph, "0");
        let limit = failures.at_most(0);
        let mut model = netverify_smt::solver::Model::default();
        model
            .values
            .insert("0_fail_a_e0".into(), netverify_smt::solver::ModelValue::Int(1));
        model
            .values
            .insert("0_fail_a_ext".into(), netverify_smt::solver::ModelValue::Int(0));
        assert_eq!(model.eval_bool(&limit), Some(false));
    }
}

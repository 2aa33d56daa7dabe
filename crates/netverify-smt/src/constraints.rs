//! Explicit constraint builder shared by every encoding step.
//!
//! A [`ConstraintSet`] owns all declared variables and asserted formulas of
//! one query. Encoders receive it by `&mut` reference; there is no ambient
//! solver state.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::backends::smtlib_printer::{sort_to_smtlib, to_smtlib};
use crate::solver::{Model, SatResult, SmtSolver};
use crate::terms::{SmtSort, SmtTerm};

/// Variables and assertions of a single satisfiability query.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    declarations: IndexMap<String, SmtSort>,
    assertions: Vec<SmtTerm>,
    assertion_keys: HashSet<SmtTerm>,
    assertion_candidates: usize,
    assertion_dedup_hits: usize,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable and return a term referring to it.
    ///
    /// Re-declaring a name with the same sort is a no-op; the encoder relies
    /// on this when two code paths lazily create the same variable.
    pub fn declare(&mut self, name: impl Into<String>, sort: SmtSort) -> SmtTerm {
        let name = name.into();
        self.declarations.entry(name.clone()).or_insert(sort);
        SmtTerm::Var(name)
    }

    pub fn declare_bool(&mut self, name: impl Into<String>) -> SmtTerm {
        self.declare(name, SmtSort::Bool)
    }

    /// Declare an integer variable bounded to `lo..=hi`.
    pub fn declare_int(&mut self, name: impl Into<String>, lo: i64, hi: i64) -> SmtTerm {
        let var = self.declare(name, SmtSort::Int);
        self.add(var.clone().in_range(lo, hi));
        var
    }

    /// Declare an unbounded integer variable.
    pub fn declare_free_int(&mut self, name: impl Into<String>) -> SmtTerm {
        self.declare(name, SmtSort::Int)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    /// Assert a constraint. Literal `true` and duplicates are dropped.
    pub fn add(&mut self, term: SmtTerm) {
        if term.is_true() {
            return;
        }
        self.assertion_candidates = self.assertion_candidates.saturating_add(1);
        if let SmtTerm::And(parts) = term {
            for part in parts {
                self.push_unique(part);
            }
        } else {
            self.push_unique(term);
        }
    }

    fn push_unique(&mut self, term: SmtTerm) {
        if self.assertion_keys.insert(term.clone()) {
            self.assertions.push(term);
        } else {
            self.assertion_dedup_hits = self.assertion_dedup_hits.saturating_add(1);
        }
    }

    pub fn declarations(&self) -> impl Iterator<Item = (&str, SmtSort)> {
        self.declarations.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn assertions(&self) -> &[SmtTerm] {
        &self.assertions
    }

    pub fn num_declarations(&self) -> usize {
        self.declarations.len()
    }

    pub fn assertion_candidates(&self) -> usize {
        self.assertion_candidates
    }

    pub fn assertion_unique(&self) -> usize {
        self.assertions.len()
    }

    pub fn assertion_dedup_hits(&self) -> usize {
        self.assertion_dedup_hits
    }

    /// Load every declaration and assertion into `solver` and check it.
    ///
    /// The returned model assigns every declared variable.
    pub fn solve<S: SmtSolver>(
        &self,
        solver: &mut S,
    ) -> Result<(SatResult, Option<Model>), S::Error> {
        solver.reset()?;
        for (name, sort) in &self.declarations {
            solver.declare_var(name, sort)?;
        }
        for assertion in &self.assertions {
            solver.assert(assertion)?;
        }
        let var_refs: Vec<(&str, &SmtSort)> = self
            .declarations
            .iter()
            .map(|(n, s)| (n.as_str(), s))
            .collect();
        solver.check_sat_with_model(&var_refs)
    }

    /// Render the query as a standalone SMT-LIB2 script.
    pub fn to_smt2_script(&self) -> String {
        let mut out = String::from("(set-logic QF_LIA)\n");
        for (name, sort) in &self.declarations {
            out.push_str(&format!(
                "(declare-const {} {})\n",
                to_smtlib(&SmtTerm::var(name.as_str())),
                sort_to_smtlib(sort)
            ));
        }
        for assertion in &self.assertions {
            out.push_str(&format!("(assert {})\n", to_smtlib(assertion)));
        }
        out.push_str("(check-sat)\n(get-model)\n");
        out
    }
}

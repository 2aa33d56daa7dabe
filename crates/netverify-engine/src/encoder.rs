//! Owner of the constraint set and the slices encoded into it.

use std::path::Path;

use tracing::debug;

use netverify_model::{Graph, Question};
use netverify_smt::constraints::ConstraintSet;
use netverify_smt::solver::{Model, SatResult, SmtSolver};
use netverify_smt::terms::SmtTerm;

use crate::counterexample::{self, VerificationResult};
use crate::error::CheckError;
use crate::logical::LogicalKey;
use crate::slice::EncoderSlice;

/// One satisfiability query: a constraint set plus one or more network
/// copies encoded into it.
pub struct Encoder<'g> {
    cs: ConstraintSet,
    slices: Vec<EncoderSlice<'g>>,
    question: Question,
}

impl<'g> Encoder<'g> {
    /// Encode `graph` as slice 0, with the failure budget of `question`.
    pub fn new(graph: &'g Graph, question: &Question) -> Result<Self, CheckError> {
        let mut encoder = Self {
            cs: ConstraintSet::new(),
            slices: Vec::new(),
            question: question.clone(),
        };
        encoder.add_slice(graph, question.failures)?;
        Ok(encoder)
    }

    /// Encode another copy of a network, allowing at most `failures` failed
    /// links in it. Returns the slice index.
    pub fn add_slice(&mut self, graph: &'g Graph, failures: u32) -> Result<usize, CheckError> {
        let index = self.slices.len();
        let slice = EncoderSlice::new(&mut self.cs, graph, index.to_string(), self.question.tie_break)?;
        self.cs.add(slice.failures().at_most(failures));
        self.slices.push(slice);
        Ok(index)
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn slice(&self, index: usize) -> &EncoderSlice<'g> {
        &self.slices[index]
    }

    pub fn slices(&self) -> &[EncoderSlice<'g>] {
        &self.slices
    }

    /// The constraint set together with the slices, for instrumentation
    /// that reads a slice while declaring new variables.
    pub fn parts(&mut self) -> (&mut ConstraintSet, &[EncoderSlice<'g>]) {
        (&mut self.cs, &self.slices)
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.cs
    }

    pub fn add(&mut self, term: SmtTerm) {
        self.cs.add(term);
    }

    /// Force the environment records of slices `i` and `j` equal. Both
    /// slices must have the same boundary sessions.
    pub fn relate_environments(&mut self, i: usize, j: usize) -> Result<(), CheckError> {
        self.relate_environments_with(i, j, LogicalKey::clone, CheckError::MissingCorrespondence)
    }

    /// Like [`Encoder::relate_environments`], with `key_map` translating
    /// keys of slice `i` into slice `j` and `mismatch` building the error
    /// for a record without a counterpart.
    pub fn relate_environments_with(
        &mut self,
        i: usize,
        j: usize,
        key_map: impl Fn(&LogicalKey) -> LogicalKey,
        mismatch: impl Fn(String) -> CheckError,
    ) -> Result<(), CheckError> {
        let pairs = self.slices[i]
            .logical()
            .env_correspondence(self.slices[j].logical(), key_map, mismatch)?;
        for (mine, theirs) in pairs {
            self.cs.add(mine.equal(theirs));
        }
        Ok(())
    }

    /// Fail the same links in slices `i` and `j`. Links are matched by
    /// router and interface name.
    pub fn relate_failures(&mut self, i: usize, j: usize) -> Result<(), CheckError> {
        let (mine, theirs) = (self.slices[i].failures(), self.slices[j].failures());
        if mine.links().len() != theirs.links().len() {
            return Err(CheckError::MissingCorrespondence(format!(
                "failure variables of slices {i} and {j}"
            )));
        }
        for (edge, var) in mine.links() {
            let other = theirs
                .get(&edge.router, &edge.interface)
                .ok_or_else(|| CheckError::MissingCorrespondence(format!("failure of {edge}")))?;
            self.cs.add(var.clone().eq(other.clone()));
        }
        Ok(())
    }

    pub fn relate_packets(&mut self, i: usize, j: usize) {
        let equal = self.slices[i].packet().equal(self.slices[j].packet());
        self.cs.add(equal);
    }

    /// Solve the query. `Unsat` verifies the property; `Sat` yields a
    /// decoded counterexample and the model it came from.
    pub fn verify<S: SmtSolver>(
        &self,
        solver: &mut S,
        dump: Option<&Path>,
    ) -> Result<(VerificationResult, Option<Model>), CheckError> {
        if let Some(path) = dump {
            std::fs::write(path, self.cs.to_smt2_script())?;
        }
        debug!(
            declarations = self.cs.num_declarations(),
            assertions = self.cs.assertion_unique(),
            deduplicated = self.cs.assertion_dedup_hits(),
            "solving"
        );
        let (result, model) = self
            .cs
            .solve(solver)
            .map_err(|e| CheckError::Solver(e.to_string()))?;
        match result {
            SatResult::Unsat => Ok((VerificationResult::verified(), None)),
            SatResult::Unknown(reason) => Err(CheckError::Solver(reason)),
            SatResult::Sat => {
                let model = model.ok_or_else(|| {
                    CheckError::Solver("satisfiable query returned no model".to_string())
                })?;
                let result = counterexample::decode(self, &model);
                Ok((result, Some(model)))
            }
        }
    }
}

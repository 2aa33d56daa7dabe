use std::collections::HashMap;

use crate::terms::{SmtSort, SmtTerm};

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// A model (variable assignments) extracted from a SAT result.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelValue {
    Int(i64),
    Bool(bool),
}

impl std::fmt::Display for ModelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelValue::Int(n) => write!(f, "{n}"),
            ModelValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Model {
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ModelValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ModelValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Evaluate a term under this model.
    ///
    /// Returns `None` when the term mentions a variable the model does not
    /// assign, or when operand sorts do not line up.
    pub fn eval(&self, term: &SmtTerm) -> Option<ModelValue> {
        match term {
            SmtTerm::Var(name) => self.values.get(name).copied(),
            SmtTerm::IntLit(n) => Some(ModelValue::Int(*n)),
            SmtTerm::BoolLit(b) => Some(ModelValue::Bool(*b)),
            SmtTerm::Add(l, r) => Some(ModelValue::Int(
                self.eval_int(l)?.saturating_add(self.eval_int(r)?),
            )),
            SmtTerm::Sub(l, r) => Some(ModelValue::Int(
                self.eval_int(l)?.saturating_sub(self.eval_int(r)?),
            )),
            SmtTerm::Eq(l, r) => Some(ModelValue::Bool(self.eval(l)? == self.eval(r)?)),
            SmtTerm::Lt(l, r) => Some(ModelValue::Bool(self.eval_int(l)? < self.eval_int(r)?)),
            SmtTerm::Le(l, r) => Some(ModelValue::Bool(self.eval_int(l)? <= self.eval_int(r)?)),
            SmtTerm::Gt(l, r) => Some(ModelValue::Bool(self.eval_int(l)? > self.eval_int(r)?)),
            SmtTerm::Ge(l, r) => Some(ModelValue::Bool(self.eval_int(l)? >= self.eval_int(r)?)),
            SmtTerm::And(terms) => {
                let mut acc = true;
                for t in terms {
                    acc &= self.eval_bool(t)?;
                }
                Some(ModelValue::Bool(acc))
            }
            SmtTerm::Or(terms) => {
                let mut acc = false;
                for t in terms {
                    acc |= self.eval_bool(t)?;
                }
                Some(ModelValue::Bool(acc))
            }
            SmtTerm::Not(inner) => Some(ModelValue::Bool(!self.eval_bool(inner)?)),
            SmtTerm::Implies(l, r) => Some(ModelValue::Bool(
                !self.eval_bool(l)? || self.eval_bool(r)?,
            )),
            SmtTerm::Ite(c, t, e) => {
                if self.eval_bool(c)? {
                    self.eval(t)
                } else {
                    self.eval(e)
                }
            }
        }
    }

    pub fn eval_int(&self, term: &SmtTerm) -> Option<i64> {
        match self.eval(term)? {
            ModelValue::Int(n) => Some(n),
            ModelValue::Bool(_) => None,
        }
    }

    pub fn eval_bool(&self, term: &SmtTerm) -> Option<bool> {
        match self.eval(term)? {
            ModelValue::Bool(b) => Some(b),
            ModelValue::Int(_) => None,
        }
    }
}

/// Abstract SMT solver interface.
///
/// The encoder never talks to a concrete solver; it fills a
/// [`ConstraintSet`](crate::constraints::ConstraintSet) and hands it to
/// whichever backend implements this trait.
pub trait SmtSolver {
    type Error: std::error::Error;

    /// Declare a new variable.
    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    /// Assert a constraint.
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Check satisfiability.
    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Check satisfiability and extract a model if SAT.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// Reset the solver state.
    fn reset(&mut self) -> Result<(), Self::Error>;
}

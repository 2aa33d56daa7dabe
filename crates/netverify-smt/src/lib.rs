//! SMT terms and solver integration for network verification.
//!
//! Encoders build solver-agnostic [`terms::SmtTerm`]s into an explicit
//! [`constraints::ConstraintSet`], which is then discharged by any
//! [`solver::SmtSolver`] backend. Only quantifier-free linear integer
//! arithmetic is needed; the bundled backend is Z3.

pub mod backends;
pub mod constraints;
pub mod solver;
pub mod terms;

//! Network verification engine.
//!
//! A network is encoded as one or more symbolic copies ([`slice`]) in a
//! single constraint set ([`encoder`]): route records per logical edge,
//! best-route selection per router and protocol, and the resulting control
//! and data forwarding for one symbolic packet. The [`checker`] adds the
//! negation of a property on top and asks the solver for a counterexample;
//! [`counterexample`] turns a satisfying model back into packets, routes
//! and forwarding.

pub mod abstraction;
pub mod checker;
pub mod counterexample;
pub mod encoder;
pub mod error;
pub mod failures;
pub mod instrument;
pub mod logical;
pub mod packet;
pub mod record;
pub mod result;
pub mod slice;
pub mod transfer;
pub mod workers;

pub use checker::{z3_checker, CheckOptions, PropertyChecker};
pub use counterexample::VerificationResult;
pub use error::CheckError;
pub use result::{DeterminismAnswer, ManyAnswer, OneAnswer, ReachabilityAnswer};

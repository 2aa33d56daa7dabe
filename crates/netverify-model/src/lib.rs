//! Network configuration model for the verifier.
//!
//! The types here describe what the encoder consumes: already-parsed router
//! configurations ([`config`]), the topology derived from them ([`graph`]),
//! IPv4 prefix arithmetic ([`prefix`]) and the parameters of a question
//! ([`question`]).

pub mod config;
pub mod error;
pub mod graph;
pub mod pattern;
pub mod prefix;
pub mod protocol;
pub mod question;

pub use config::{Network, RouterConfig};
pub use error::ModelError;
pub use graph::{Graph, GraphEdge};
pub use prefix::{HeaderSpace, Ip, Prefix};
pub use protocol::Protocol;
pub use question::{DiffType, EnvironmentType, Question, TieBreak};

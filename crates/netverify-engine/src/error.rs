use thiserror::Error;

use netverify_model::ModelError;

/// Errors that abort a whole check.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("no destination interfaces match node `{node}` and interface `{iface}`")]
    EmptyDestinations { node: String, iface: String },
    #[error("no source routers match `{0}`")]
    EmptySources(String),
    #[error("no counterpart in the other network copy for {0}")]
    MissingCorrespondence(String),
    #[error("environment present on only one side of {0}")]
    AsymmetricEnvironment(String),
    #[error("unsupported {option} `{value}` for this check")]
    UnsupportedOption { option: &'static str, value: String },
    #[error("Solver error: {0}")]
    Solver(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("cannot write SMT dump: {0}")]
    Io(#[from] std::io::Error),
}

//! Answers returned by the property checks.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::counterexample::{Flow, FlowHistory, VerificationResult};

/// A single verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OneAnswer {
    pub result: VerificationResult,
}

/// One verdict per key, e.g. per router pair or per destination interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManyAnswer {
    pub results: BTreeMap<String, VerificationResult>,
    /// Keys that were not checked, with the reason.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub skipped: BTreeMap<String, String>,
}

impl ManyAnswer {
    /// Every checked key verified.
    pub fn verified(&self) -> bool {
        self.results.values().all(|r| r.verified)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachabilityAnswer {
    pub result: VerificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_history: Option<FlowHistory>,
}

/// Forwarding of two runs of the same network that differs: `case1` holds
/// the edges only the first run uses, `case2` those only the second uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeterminismAnswer {
    pub result: VerificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<Flow>,
    pub case1: BTreeSet<String>,
    pub case2: BTreeSet<String>,
}

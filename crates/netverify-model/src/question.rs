//! Parameters of a verification question.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::prefix::HeaderSpace;

/// Constraint placed on routes injected at boundary edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvironmentType {
    /// Unconstrained.
    #[default]
    Any,
    /// No external routes at all.
    None,
    /// External routes with a metric of at most 50.
    Sane,
}

/// Relation required between two network copies in differential mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffType {
    /// The property may only gain routers in the second copy.
    Increased,
    /// The property may only lose routers in the second copy.
    Reduced,
    /// The property must be identical in both copies.
    Any,
}

/// How best-route selection resolves candidates of equal preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The first tied candidate in edge declaration order wins.
    #[default]
    EdgeOrder,
    /// Any tied candidate may win; exposes non-deterministic selection.
    Arbitrary,
}

macro_rules! impl_option_parsing {
    ($ty:ty, $kind:literal, { $($text:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().replace('-', "_").as_str() {
                    $($text => Ok($variant),)+
                    _ => Err(ModelError::UnknownOption {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

impl_option_parsing!(EnvironmentType, "environment type", {
    "ANY" => EnvironmentType::Any,
    "NONE" => EnvironmentType::None,
    "SANE" => EnvironmentType::Sane,
});

impl_option_parsing!(DiffType, "diff type", {
    "INCREASED" => DiffType::Increased,
    "REDUCED" => DiffType::Reduced,
    "ANY" => DiffType::Any,
});

impl_option_parsing!(TieBreak, "tie break", {
    "EDGE_ORDER" => TieBreak::EdgeOrder,
    "ARBITRARY" => TieBreak::Arbitrary,
});

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiffType::Increased => "INCREASED",
            DiffType::Reduced => "REDUCED",
            DiffType::Any => "ANY",
        })
    }
}

fn match_all() -> String {
    ".*".to_string()
}

/// Everything a check needs besides the network itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Question {
    pub dst_node_regex: String,
    pub not_dst_node_regex: String,
    pub dst_iface_regex: String,
    pub not_dst_iface_regex: String,
    pub ingress_node_regex: String,
    pub not_ingress_node_regex: String,
    pub header_space: HeaderSpace,
    pub base_env: EnvironmentType,
    pub delta_env: EnvironmentType,
    /// Leave the environments of the two copies unrelated.
    pub env_diff: bool,
    pub diff_type: Option<DiffType>,
    pub fail_node1_regex: String,
    pub fail_node2_regex: String,
    pub not_fail_node1_regex: String,
    pub not_fail_node2_regex: String,
    /// Maximum number of simultaneously failed links.
    pub failures: u32,
    pub use_abstraction: bool,
    /// Report every variable of the satisfying assignment.
    pub full_model: bool,
    pub tie_break: TieBreak,
}

impl Default for Question {
    fn default() -> Self {
        Self {
            dst_node_regex: match_all(),
            not_dst_node_regex: String::new(),
            dst_iface_regex: match_all(),
            not_dst_iface_regex: String::new(),
            ingress_node_regex: match_all(),
            not_ingress_node_regex: String::new(),
            header_space: HeaderSpace::default(),
            base_env: EnvironmentType::Any,
            delta_env: EnvironmentType::Any,
            env_diff: false,
            diff_type: None,
            fail_node1_regex: match_all(),
            fail_node2_regex: match_all(),
            not_fail_node1_regex: String::new(),
            not_fail_node2_regex: String::new(),
            failures: 0,
            use_abstraction: false,
            full_model: false,
            tie_break: TieBreak::EdgeOrder,
        }
    }
}

impl Question {
    pub fn from_json(src: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(src)?)
    }

    /// Destination interfaces `node` / `iface`, sources `ingress`.
    pub fn between(node: &str, iface: &str, ingress: &str) -> Self {
        Self {
            dst_node_regex: node.to_string(),
            dst_iface_regex: iface.to_string(),
            ingress_node_regex: ingress.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let q = Question::from_json("{}").expect("parse");
        assert_eq!(q, Question::default());
        assert_eq!(q.dst_node_regex, ".*");
        assert!(q.not_dst_node_regex.is_empty());
        assert_eq!(q.tie_break, TieBreak::EdgeOrder);
    }

    #[test]
    fn enumerations_use_upper_case_names() {
        let q = Question::from_json(
            r#"{"base_env": "SANE", "diff_type": "INCREASED", "tie_break": "arbitrary", "failures": 1}"#,
        )
        .expect("parse");
        assert_eq!(q.base_env, EnvironmentType::Sane);
        assert_eq!(q.diff_type, Some(DiffType::Increased));
        assert_eq!(q.tie_break, TieBreak::Arbitrary);
        assert_eq!(q.failures, 1);
    }

    #[test]
    fn unknown_option_names_carry_the_value() {
        let err = "SIDEWAYS".parse::<DiffType>().expect_err("unknown");
        assert!(err.to_string().contains("SIDEWAYS"));
        assert_eq!("edge-order".parse::<TieBreak>().ok(), Some(TieBreak::EdgeOrder));
        assert_eq!("none".parse::<EnvironmentType>().ok(), Some(EnvironmentType::None));
        assert!(Question::from_json(r#"{"diff_type": "SIDEWAYS"}"#).is_err());
    }
}

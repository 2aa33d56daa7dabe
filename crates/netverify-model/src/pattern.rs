//! Regex selection of routers and edges.
//!
//! Patterns use full-match semantics. An empty exclusion pattern excludes
//! nothing.

use regex::Regex;

use crate::error::ModelError;
use crate::graph::{Graph, GraphEdge};

/// An include regex paired with an optional exclude regex.
#[derive(Debug, Clone)]
pub struct NamePattern {
    include: Regex,
    exclude: Option<Regex>,
}

fn compile(pattern: &str) -> Result<Regex, ModelError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ModelError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl NamePattern {
    pub fn new(include: &str, exclude: &str) -> Result<Self, ModelError> {
        Ok(Self {
            include: compile(include)?,
            exclude: if exclude.is_empty() {
                None
            } else {
                Some(compile(exclude)?)
            },
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.include.is_match(name) && !self.exclude.as_ref().is_some_and(|r| r.is_match(name))
    }
}

/// Routers whose name matches `pattern`, sorted.
pub fn matching_routers(graph: &Graph, pattern: &NamePattern) -> Vec<String> {
    graph
        .routers()
        .filter(|r| pattern.matches(r))
        .map(str::to_string)
        .collect()
}

/// Edges whose router matches `node` and whose interface matches `iface`.
pub fn matching_interfaces(graph: &Graph, node: &NamePattern, iface: &NamePattern) -> Vec<GraphEdge> {
    graph
        .all_real_edges()
        .filter(|e| node.matches(&e.router) && iface.matches(&e.interface))
        .cloned()
        .collect()
}

/// Edges from a router matching `from` to a peer matching `to`. The peer of
/// a boundary edge is matched as the empty string.
pub fn matching_links(graph: &Graph, from: &NamePattern, to: &NamePattern) -> Vec<GraphEdge> {
    graph
        .all_real_edges()
        .filter(|e| from.matches(&e.router) && to.matches(e.peer.as_deref().unwrap_or("")))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_match_semantics() {
        let p = NamePattern::new("r1", "").expect("pattern");
        assert!(p.matches("r1"));
        assert!(!p.matches("r10"));
        let alt = NamePattern::new("core.*|edge1", "core2").expect("pattern");
        assert!(alt.matches("core1"));
        assert!(alt.matches("edge1"));
        assert!(!alt.matches("core2"));
        assert!(!alt.matches("xedge1"));
    }

    #[test]
    fn invalid_regex_is_reported_with_pattern() {
        let err = NamePattern::new("r[", "").expect_err("bad regex");
        assert!(matches!(err, ModelError::InvalidPattern { pattern, .. } if pattern == "r["));
    }

    #[test]
    fn wildcard_matches_the_empty_peer_name() {
        let any = NamePattern::new(".*", "").expect("pattern");
        assert!(any.matches(""));
        assert!(any.matches("anything"));
    }
}

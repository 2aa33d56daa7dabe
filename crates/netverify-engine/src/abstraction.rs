//! Destination equivalence classes and topology compression.
//!
//! Without abstraction a check runs once over the whole network. With
//! abstraction the destination space is cut into atomic address ranges at
//! the boundaries of every originated prefix, and for each range routers
//! that play the same role are merged into one representative.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use netverify_model::prefix::range_to_prefixes;
use netverify_model::{Graph, HeaderSpace, Ip, ModelError, Prefix, Protocol, RouterConfig};

use crate::error::CheckError;

/// One unit of work: a destination range and the graph to encode for it.
#[derive(Debug, Clone)]
pub struct EquivalenceClass {
    pub header_space: HeaderSpace,
    pub graph: Arc<Graph>,
    /// Concrete router to group representative; `None` when the graph is
    /// the concrete one.
    pub abstraction: Option<BTreeMap<String, String>>,
}

impl EquivalenceClass {
    /// The router standing in for `router` in this class's graph.
    pub fn representative<'a>(&'a self, router: &'a str) -> &'a str {
        self.abstraction
            .as_ref()
            .and_then(|m| m.get(router))
            .map_or(router, String::as_str)
    }
}

/// The classes of a question, built lazily in address order.
#[derive(Debug)]
pub struct EquivalenceClasses {
    graph: Arc<Graph>,
    header_space: HeaderSpace,
    ranges: Option<Vec<(Ip, Ip)>>,
    pinned: BTreeSet<String>,
    signatures: BTreeMap<String, String>,
}

impl EquivalenceClasses {
    /// Routers in `pinned` are never merged with others.
    pub fn new(
        graph: Arc<Graph>,
        header_space: &HeaderSpace,
        use_abstraction: bool,
        pinned: BTreeSet<String>,
    ) -> Result<Self, CheckError> {
        if !use_abstraction {
            return Ok(Self {
                graph,
                header_space: header_space.clone(),
                ranges: None,
                pinned,
                signatures: BTreeMap::new(),
            });
        }
        let mut signatures = BTreeMap::new();
        for (name, config) in graph.configs() {
            signatures.insert(name.clone(), signature(config).map_err(ModelError::from)?);
        }
        let mut pinned = pinned;
        for router in graph.routers() {
            let static_owner = graph
                .config(router)
                .is_some_and(|c| !c.static_routes.is_empty());
            if static_owner || graph.edges(router).iter().any(|e| e.is_boundary()) {
                pinned.insert(router.to_string());
            }
        }
        let ranges = atomic_ranges(&graph, header_space);
        debug!(classes = ranges.len(), pinned = pinned.len(), "destination classes");
        Ok(Self {
            graph,
            header_space: header_space.clone(),
            ranges: Some(ranges),
            pinned,
            signatures,
        })
    }

    pub fn len(&self) -> usize {
        self.ranges.as_ref().map_or(1, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the classes from the first one again.
    pub fn iter(&self) -> Classes<'_> {
        Classes {
            source: self,
            next: 0,
        }
    }

    fn class(&self, index: usize) -> Option<EquivalenceClass> {
        let Some(ranges) = &self.ranges else {
            return (index == 0).then(|| EquivalenceClass {
                header_space: self.header_space.clone(),
                graph: Arc::clone(&self.graph),
                abstraction: None,
            });
        };
        let &(lo, hi) = ranges.get(index)?;
        let header_space = HeaderSpace {
            dst_ips: range_to_prefixes(lo, hi),
            not_dst_ips: self.header_space.not_dst_ips.clone(),
        };
        let mapping = self.groups(lo, hi);
        if mapping.iter().all(|(router, rep)| router == rep) {
            return Some(EquivalenceClass {
                header_space,
                graph: Arc::clone(&self.graph),
                abstraction: None,
            });
        }
        let graph = Arc::new(self.graph.abstracted(&mapping));
        for edge in graph.mismatched_links() {
            debug!(%edge, %lo, %hi, "collapsed link joins different subnets");
        }
        debug!(
            %lo,
            %hi,
            concrete = self.graph.num_routers(),
            abstract_routers = graph.num_routers(),
            "compressed topology"
        );
        Some(EquivalenceClass {
            header_space,
            graph,
            abstraction: Some(mapping),
        })
    }

    /// Partition routers for the range `lo..=hi`: start from configuration
    /// signatures, keep pinned routers and originators apart, then split
    /// groups until members agree on their neighbouring groups.
    fn groups(&self, lo: Ip, hi: Ip) -> BTreeMap<String, String> {
        let graph = &self.graph;
        let originators: BTreeSet<&str> = graph
            .routers()
            .filter(|r| {
                Protocol::ALL.into_iter().any(|p| {
                    graph
                        .originated(r, p)
                        .is_some_and(|set| set.iter().any(|pfx| pfx.first() <= hi && lo <= pfx.last()))
                })
            })
            .collect();

        let mut group: BTreeMap<String, usize> = canonical(
            graph
                .routers()
                .map(|r| {
                    let initial = if self.pinned.contains(r) || originators.contains(r) {
                        format!("router {r}")
                    } else {
                        self.signatures.get(r).cloned().unwrap_or_default()
                    };
                    (r.to_string(), initial)
                })
                .collect(),
        );
        loop {
            let refined = canonical(
                group
                    .iter()
                    .map(|(router, &own)| {
                        let around: BTreeSet<usize> = graph
                            .neighbors(router)
                            .into_iter()
                            .flatten()
                            .filter_map(|n| group.get(n).copied())
                            .collect();
                        (router.clone(), (own, around))
                    })
                    .collect(),
            );
            let settled = distinct(&refined) == distinct(&group);
            group = refined;
            if settled {
                break;
            }
        }

        let mut representative: BTreeMap<usize, &str> = BTreeMap::new();
        for (router, id) in &group {
            representative.entry(*id).or_insert(router.as_str());
        }
        group
            .iter()
            .map(|(router, id)| {
                let rep = representative.get(id).copied().unwrap_or(router.as_str());
                (router.clone(), rep.to_string())
            })
            .collect()
    }
}

/// Replace arbitrary labels with dense group numbers.
fn canonical<K: Ord>(labels: BTreeMap<String, K>) -> BTreeMap<String, usize> {
    let ids: BTreeMap<&K, usize> = labels
        .values()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, k)| (k, i))
        .collect();
    labels
        .iter()
        .map(|(router, k)| (router.clone(), ids.get(k).copied().unwrap_or_default()))
        .collect()
}

fn distinct(group: &BTreeMap<String, usize>) -> usize {
    group.values().collect::<BTreeSet<_>>().len()
}

pub struct Classes<'a> {
    source: &'a EquivalenceClasses,
    next: usize,
}

impl Iterator for Classes<'_> {
    type Item = EquivalenceClass;

    fn next(&mut self) -> Option<Self::Item> {
        let class = self.source.class(self.next)?;
        self.next += 1;
        Some(class)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.source.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Classes<'_> {}

/// Cut the destination space into ranges that no originated prefix
/// partially covers. Ranges inside an excluded prefix are dropped.
fn atomic_ranges(graph: &Graph, header_space: &HeaderSpace) -> Vec<(Ip, Ip)> {
    let mut cuts = BTreeSet::new();
    for prefix in graph.all_originated() {
        cuts.insert(u64::from(prefix.first().bits()));
        cuts.insert(u64::from(prefix.last().bits()) + 1);
    }
    let roots: Vec<Prefix> = if header_space.dst_ips.is_empty() {
        Prefix::new(Ip::new(0), 0).into_iter().collect()
    } else {
        header_space.dst_ips.clone()
    };
    let mut out = Vec::new();
    for root in roots {
        let (start, end) = (u64::from(root.first().bits()), u64::from(root.last().bits()) + 1);
        let mut points: Vec<u64> = cuts.range(start + 1..end).copied().collect();
        points.insert(0, start);
        points.push(end);
        for window in points.windows(2) {
            let (Ok(lo), Ok(hi)) = (u32::try_from(window[0]), u32::try_from(window[1] - 1)) else {
                continue;
            };
            let (lo, hi) = (Ip::new(lo), Ip::new(hi));
            let excluded = header_space
                .not_dst_ips
                .iter()
                .any(|p| p.first() <= lo && hi <= p.last());
            if !excluded {
                out.push((lo, hi));
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Everything about a router that shapes how it treats routes, minus its
/// name and addresses.
fn signature(config: &RouterConfig) -> Result<String, serde_json::Error> {
    let mut interfaces: Vec<String> = config
        .interfaces
        .iter()
        .filter(|i| i.active && !i.loopback)
        .map(|i| {
            json!({
                "in": config.acl(i.incoming_filter.as_deref()),
                "out": config.acl(i.outgoing_filter.as_deref()),
                "cost": i.ospf_cost,
                "ospf": config.ospf.as_ref().map(|o| (o.enabled(&i.name), o.passive.contains(&i.name))),
            })
            .to_string()
        })
        .collect();
    interfaces.sort();
    let ospf = config.ospf.as_ref().map(|o| {
        json!({
            "redistribute": o.redistribute,
            "metric": o.redistribution_metric,
            "import": config.policy(o.import_policy.as_deref()),
            "export": config.policy(o.export_policy.as_deref()),
        })
    });
    let bgp = config.bgp.as_ref().map(|b| {
        let mut neighbors: Vec<String> = b
            .neighbors
            .iter()
            .map(|n| {
                json!({
                    "remote_as": n.remote_as,
                    "import": config.policy(n.import_policy.as_deref()),
                    "export": config.policy(n.export_policy.as_deref()),
                })
                .to_string()
            })
            .collect();
        neighbors.sort();
        json!({
            "local_as": b.local_as,
            "redistribute": b.redistribute,
            "neighbors": neighbors,
        })
    });
    serde_json::to_string(&json!({
        "host": config.host,
        "interfaces": interfaces,
        "ospf": ospf,
        "bgp": bgp,
    }))
}

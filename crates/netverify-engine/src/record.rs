//! Symbolic route records.
//!
//! A record is the unit of route propagation: one per logical edge, one per
//! protocol winner, one per router winner, plus constant records for
//! originated routes. The destination prefix of a record is implicit: it is
//! the packet destination masked to `prefix_length`.

use std::collections::{BTreeMap, BTreeSet};

use netverify_model::Protocol;
use netverify_smt::constraints::ConstraintSet;
use netverify_smt::terms::SmtTerm;

/// Upper bound for metric and local preference values.
pub const MAX_ATTRIBUTE: i64 = u32::MAX as i64;

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicRecord {
    pub name: String,
    /// `None` for the router-level winner, which mixes protocols.
    pub proto: Option<Protocol>,
    pub permitted: SmtTerm,
    pub prefix_length: SmtTerm,
    pub admin_dist: SmtTerm,
    pub local_pref: SmtTerm,
    pub metric: SmtTerm,
    pub communities: BTreeMap<String, SmtTerm>,
}

/// Which attributes take part in a preference comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    /// Prefix length, administrative distance, local preference (BGP only),
    /// metric.
    Protocol(Protocol),
    /// Prefix length and administrative distance; used across protocols.
    Router,
}

impl SymbolicRecord {
    /// Declare a record of fresh variables named `{name}_{field}`. Denied
    /// records are normalised to zero attributes.
    pub fn declare(
        cs: &mut ConstraintSet,
        name: impl Into<String>,
        proto: Option<Protocol>,
        communities: &BTreeSet<String>,
    ) -> Self {
        let name = name.into();
        let record = Self {
            permitted: cs.declare_bool(format!("{name}_permitted")),
            prefix_length: cs.declare_int(format!("{name}_prefix_length"), 0, 32),
            admin_dist: cs.declare_int(format!("{name}_admin_dist"), 0, 255),
            local_pref: cs.declare_int(format!("{name}_local_pref"), 0, MAX_ATTRIBUTE),
            metric: cs.declare_int(format!("{name}_metric"), 0, MAX_ATTRIBUTE),
            communities: communities
                .iter()
                .map(|c| (c.clone(), cs.declare_bool(format!("{name}_community_{c}"))))
                .collect(),
            name,
            proto,
        };
        cs.add(record.permitted.clone().not().implies(record.zeroed()));
        record
    }

    /// A record with fixed attributes whose existence is `permitted`.
    pub fn originated(
        name: impl Into<String>,
        proto: Protocol,
        permitted: SmtTerm,
        prefix_length: u8,
        admin_dist: i64,
        local_pref: i64,
        communities: &BTreeSet<String>,
    ) -> Self {
        Self {
            name: name.into(),
            proto: Some(proto),
            permitted,
            prefix_length: SmtTerm::int(i64::from(prefix_length)),
            admin_dist: SmtTerm::int(admin_dist),
            local_pref: SmtTerm::int(local_pref),
            metric: SmtTerm::int(0),
            communities: communities
                .iter()
                .map(|c| (c.clone(), SmtTerm::ff()))
                .collect(),
        }
        .normalized()
    }

    fn numeric_fields(&self) -> [&SmtTerm; 4] {
        [
            &self.prefix_length,
            &self.admin_dist,
            &self.local_pref,
            &self.metric,
        ]
    }

    /// Every attribute is zero and every community is absent.
    pub fn zeroed(&self) -> SmtTerm {
        let mut parts: Vec<SmtTerm> = self
            .numeric_fields()
            .into_iter()
            .map(|f| f.clone().eq(SmtTerm::int(0)))
            .collect();
        parts.extend(self.communities.values().map(|c| c.clone().not()));
        SmtTerm::and(parts)
    }

    /// Rewrite each attribute as `ite(permitted, attribute, 0)`.
    pub fn normalized(self) -> Self {
        let gate = |field: SmtTerm, permitted: &SmtTerm| {
            SmtTerm::ite(permitted.clone(), field, SmtTerm::int(0))
        };
        let permitted = self.permitted.clone();
        Self {
            prefix_length: gate(self.prefix_length, &permitted),
            admin_dist: gate(self.admin_dist, &permitted),
            local_pref: gate(self.local_pref, &permitted),
            metric: gate(self.metric, &permitted),
            communities: self
                .communities
                .into_iter()
                .map(|(c, v)| (c, SmtTerm::and(vec![permitted.clone(), v])))
                .collect(),
            permitted,
            name: self.name,
            proto: self.proto,
        }
    }

    /// Attribute equality, excluding the permitted bit.
    ///
    /// A community tracked on only one side must be absent there.
    pub fn same_attributes(&self, other: &SymbolicRecord) -> SmtTerm {
        let mut parts: Vec<SmtTerm> = self
            .numeric_fields()
            .into_iter()
            .zip(other.numeric_fields())
            .map(|(a, b)| a.clone().eq(b.clone()))
            .collect();
        for (tag, value) in &self.communities {
            match other.communities.get(tag) {
                Some(theirs) => parts.push(value.clone().iff(theirs.clone())),
                None => parts.push(value.clone().not()),
            }
        }
        for (tag, theirs) in &other.communities {
            if !self.communities.contains_key(tag) {
                parts.push(theirs.clone().not());
            }
        }
        SmtTerm::and(parts)
    }

    /// Permitted bits and every attribute agree.
    pub fn equal(&self, other: &SymbolicRecord) -> SmtTerm {
        SmtTerm::and(vec![
            self.permitted.clone().iff(other.permitted.clone()),
            self.same_attributes(other),
        ])
    }

    fn ranking_keys<'a>(
        &'a self,
        other: &'a SymbolicRecord,
        ranking: Ranking,
    ) -> Vec<(&'a SmtTerm, &'a SmtTerm, bool)> {
        let mut keys = vec![
            (&self.prefix_length, &other.prefix_length, true),
            (&self.admin_dist, &other.admin_dist, false),
        ];
        if let Ranking::Protocol(proto) = ranking {
            if proto.uses_local_pref() {
                keys.push((&self.local_pref, &other.local_pref, true));
            }
            keys.push((&self.metric, &other.metric, false));
        }
        keys
    }

    /// `self` is at least as preferred as `other` under `ranking`.
    pub fn at_least_as_good(&self, other: &SymbolicRecord, ranking: Ranking) -> SmtTerm {
        self.ranking_keys(other, ranking)
            .into_iter()
            .rev()
            .fold(SmtTerm::tt(), |acc, (mine, theirs, higher_wins)| {
                let better = if higher_wins {
                    mine.clone().gt(theirs.clone())
                } else {
                    mine.clone().lt(theirs.clone())
                };
                SmtTerm::or(vec![
                    better,
                    SmtTerm::and(vec![mine.clone().eq(theirs.clone()), acc]),
                ])
            })
    }

    /// `self` and `other` tie under `ranking`.
    pub fn same_rank(&self, other: &SymbolicRecord, ranking: Ranking) -> SmtTerm {
        SmtTerm::and(
            self.ranking_keys(other, ranking)
                .into_iter()
                .map(|(mine, theirs, _)| mine.clone().eq(theirs.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_smt::solver::{Model, ModelValue};

    fn record(name: &str, proto: Protocol, len: i64, ad: i64, lp: i64, metric: i64) -> SymbolicRecord {
        SymbolicRecord {
            name: name.into(),
            proto: Some(proto),
            permitted: SmtTerm::tt(),
            prefix_length: SmtTerm::int(len),
            admin_dist: SmtTerm::int(ad),
            local_pref: SmtTerm::int(lp),
            metric: SmtTerm::int(metric),
            communities: BTreeMap::new(),
        }
    }

    #[test]
    fn longer_prefix_beats_lower_distance() {
        let long = record("a", Protocol::Ospf, 24, 110, 0, 5);
        let short = record("b", Protocol::Ospf, 16, 1, 0, 0);
        assert!(long.at_least_as_good(&short, Ranking::Router).is_true());
        assert!(short.at_least_as_good(&long, Ranking::Router).is_false());
    }

    #[test]
    fn local_pref_only_counts_for_bgp() {
        let high_lp = record("a", Protocol::Bgp, 24, 20, 200, 9);
        let low_lp = record("b", Protocol::Bgp, 24, 20, 100, 1);
        assert!(high_lp.at_least_as_good(&low_lp, Ranking::Protocol(Protocol::Bgp)).is_true());
        assert!(high_lp.at_least_as_good(&low_lp, Ranking::Protocol(Protocol::Ospf)).is_false());
        assert!(high_lp.same_rank(&low_lp, Ranking::Router).is_true());
    }

    #[test]
    fn denied_originated_records_are_zero() {
        let tags: BTreeSet<String> = ["c1".to_string()].into_iter().collect();
        let rec = SymbolicRecord::originated("r", Protocol::Static, SmtTerm::var("p"), 24, 1, 0, &tags);
        let mut model = Model::default();
        model.values.insert("p".into(), ModelValue::Bool(false));
        assert_eq!(model.eval_int(&rec.prefix_length), Some(0));
        assert_eq!(model.eval_int(&rec.admin_dist), Some(0));
        model.values.insert("p".into(), ModelValue::Bool(true));
        assert_eq!(model.eval_int(&rec.prefix_length), Some(24));
        assert_eq!(model.eval_bool(&rec.communities["c1"]), Some(false));
    }

    #[test]
    fn community_tracked_on_one_side_must_be_absent() {
        let mut a = record("a", Protocol::Bgp, 24, 20, 100, 1);
        let b = record("b", Protocol::Bgp, 24, 20, 100, 1);
        a.communities.insert("only-a".into(), SmtTerm::var("a_c"));
        let eq = a.same_attributes(&b);
        assert_eq!(eq, SmtTerm::var("a_c").not());
    }

    #[test]
    fn declared_records_constrain_denied_values() {
        let mut cs = ConstraintSet::new();
        let rec = SymbolicRecord::declare(&mut cs, "0_r1_ospf_best", Some(Protocol::Ospf), &BTreeSet::new());
        assert!(cs.is_declared("0_r1_ospf_best_metric"));
        assert_eq!(rec.name, "0_r1_ospf_best");
        assert!(cs
            .assertions()
            .iter()
            .any(|a| matches!(a, SmtTerm::Implies(lhs, _) if **lhs == rec.permitted.clone().not())));
    }
}

//! The symbolic packet and packet filters.

use netverify_model::config::{Acl, LineAction};
use netverify_model::{HeaderSpace, Prefix};
use netverify_smt::constraints::ConstraintSet;
use netverify_smt::terms::SmtTerm;

/// Header fields of the packet being forwarded, one set per slice.
#[derive(Debug, Clone)]
pub struct SymbolicPacket {
    pub dst_ip: SmtTerm,
    pub src_ip: SmtTerm,
    pub dst_port: SmtTerm,
    pub src_port: SmtTerm,
    pub ip_protocol: SmtTerm,
}

const MAX_IP: i64 = u32::MAX as i64;

impl SymbolicPacket {
    pub fn declare(cs: &mut ConstraintSet, slice: &str) -> Self {
        Self {
            dst_ip: cs.declare_int(format!("{slice}_dst_ip"), 0, MAX_IP),
            src_ip: cs.declare_int(format!("{slice}_src_ip"), 0, MAX_IP),
            dst_port: cs.declare_int(format!("{slice}_dst_port"), 0, 65535),
            src_port: cs.declare_int(format!("{slice}_src_port"), 0, 65535),
            ip_protocol: cs.declare_int(format!("{slice}_ip_protocol"), 0, 255),
        }
    }

    fn fields(&self) -> [&SmtTerm; 5] {
        [
            &self.dst_ip,
            &self.src_ip,
            &self.dst_port,
            &self.src_port,
            &self.ip_protocol,
        ]
    }

    /// Destination address lies inside `prefix`.
    pub fn dst_in(&self, prefix: &Prefix) -> SmtTerm {
        self.dst_ip
            .clone()
            .in_range(prefix.first().as_i64(), prefix.last().as_i64())
    }

    pub fn src_in(&self, prefix: &Prefix) -> SmtTerm {
        self.src_ip
            .clone()
            .in_range(prefix.first().as_i64(), prefix.last().as_i64())
    }

    pub fn in_header_space(&self, space: &HeaderSpace) -> SmtTerm {
        let included = if space.dst_ips.is_empty() {
            SmtTerm::tt()
        } else {
            SmtTerm::or(space.dst_ips.iter().map(|p| self.dst_in(p)).collect())
        };
        let excluded = SmtTerm::or(space.not_dst_ips.iter().map(|p| self.dst_in(p)).collect());
        SmtTerm::and(vec![included, excluded.not()])
    }

    /// First-match evaluation of `acl`; a missing ACL permits everything.
    pub fn permitted_by(&self, acl: Option<&Acl>) -> SmtTerm {
        let Some(acl) = acl else {
            return SmtTerm::tt();
        };
        acl.lines.iter().rev().fold(SmtTerm::ff(), |rest, line| {
            let mut matched = Vec::new();
            if let Some(dst) = &line.dst {
                matched.push(self.dst_in(dst));
            }
            if let Some(src) = &line.src {
                matched.push(self.src_in(src));
            }
            SmtTerm::ite(
                SmtTerm::and(matched),
                SmtTerm::bool(line.action == LineAction::Permit),
                rest,
            )
        })
    }

    /// Field-wise equality with the packet of another slice.
    pub fn equal(&self, other: &SymbolicPacket) -> SmtTerm {
        SmtTerm::and(
            self.fields()
                .into_iter()
                .zip(other.fields())
                .map(|(a, b)| a.clone().eq(b.clone()))
                .collect(),
        )
    }
}

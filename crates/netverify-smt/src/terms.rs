use std::fmt;

/// SMT sorts used by the network encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Bool,
    Int,
}

impl fmt::Display for SmtSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Int => write!(f, "Int"),
        }
    }
}

/// Abstract SMT term representation, solver-agnostic.
///
/// The boolean constructors (`and`, `or`, `not`, `implies`, `iff`, `ite`)
/// fold literal operands eagerly so that the encoder can build large
/// conjunctions from `true` seeds without bloating the asserted formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    /// Integer literal.
    IntLit(i64),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    // If-then-else
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn tt() -> Self {
        SmtTerm::BoolLit(true)
    }

    pub fn ff() -> Self {
        SmtTerm::BoolLit(false)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, SmtTerm::BoolLit(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, SmtTerm::BoolLit(false))
    }

    pub fn add(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::IntLit(a.saturating_add(*b)),
            (_, SmtTerm::IntLit(0)) => self,
            (SmtTerm::IntLit(0), _) => other,
            _ => SmtTerm::Add(Box::new(self), Box::new(other)),
        }
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::IntLit(a.saturating_sub(*b)),
            (_, SmtTerm::IntLit(0)) => self,
            _ => SmtTerm::Sub(Box::new(self), Box::new(other)),
        }
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::BoolLit(a == b),
            (SmtTerm::BoolLit(a), SmtTerm::BoolLit(b)) => SmtTerm::BoolLit(a == b),
            (SmtTerm::BoolLit(true), _) => other,
            (_, SmtTerm::BoolLit(true)) => self,
            (SmtTerm::BoolLit(false), _) => other.not(),
            (_, SmtTerm::BoolLit(false)) => self.not(),
            _ if self == other => SmtTerm::BoolLit(true),
            _ => SmtTerm::Eq(Box::new(self), Box::new(other)),
        }
    }

    /// Boolean equivalence; an alias of [`SmtTerm::eq`] for readability.
    pub fn iff(self, other: SmtTerm) -> Self {
        self.eq(other)
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::BoolLit(a < b),
            _ => SmtTerm::Lt(Box::new(self), Box::new(other)),
        }
    }

    pub fn le(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::BoolLit(a <= b),
            _ => SmtTerm::Le(Box::new(self), Box::new(other)),
        }
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::BoolLit(a > b),
            _ => SmtTerm::Gt(Box::new(self), Box::new(other)),
        }
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::BoolLit(a >= b),
            _ => SmtTerm::Ge(Box::new(self), Box::new(other)),
        }
    }

    /// `lo <= self <= hi`.
    pub fn in_range(self, lo: i64, hi: i64) -> Self {
        SmtTerm::and(vec![
            SmtTerm::int(lo).le(self.clone()),
            self.le(SmtTerm::int(hi)),
        ])
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SmtTerm::BoolLit(true) => {}
                SmtTerm::BoolLit(false) => return SmtTerm::BoolLit(false),
                SmtTerm::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => SmtTerm::BoolLit(true),
            1 => out.remove(0),
            _ => SmtTerm::And(out),
        }
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SmtTerm::BoolLit(false) => {}
                SmtTerm::BoolLit(true) => return SmtTerm::BoolLit(true),
                SmtTerm::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => SmtTerm::BoolLit(false),
            1 => out.remove(0),
            _ => SmtTerm::Or(out),
        }
    }

    pub fn not(self) -> Self {
        match self {
            SmtTerm::BoolLit(b) => SmtTerm::BoolLit(!b),
            SmtTerm::Not(inner) => *inner,
            other => SmtTerm::Not(Box::new(other)),
        }
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::BoolLit(false), _) | (_, SmtTerm::BoolLit(true)) => SmtTerm::BoolLit(true),
            (SmtTerm::BoolLit(true), _) => other,
            (_, SmtTerm::BoolLit(false)) => self.not(),
            _ => SmtTerm::Implies(Box::new(self), Box::new(other)),
        }
    }

    pub fn ite(cond: SmtTerm, then: SmtTerm, els: SmtTerm) -> Self {
        match cond {
            SmtTerm::BoolLit(true) => then,
            SmtTerm::BoolLit(false) => els,
            _ if then == els => then,
            cond => SmtTerm::Ite(Box::new(cond), Box::new(then), Box::new(els)),
        }
    }

    /// `ite(self, 1, 0)`, used when counting boolean terms.
    pub fn as_count(self) -> Self {
        SmtTerm::ite(self, SmtTerm::int(1), SmtTerm::int(0))
    }

    /// Sum of integer terms (0 for an empty list).
    pub fn sum(terms: Vec<SmtTerm>) -> Self {
        terms
            .into_iter()
            .fold(SmtTerm::int(0), |acc, term| acc.add(term))
    }
}

impl fmt::Display for SmtTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::backends::smtlib_printer::to_smtlib(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_folds_literals_and_flattens() {
        let a = SmtTerm::var("a");
        let b = SmtTerm::var("b");
        let nested = SmtTerm::and(vec![SmtTerm::tt(), a.clone(), SmtTerm::and(vec![b.clone()])]);
        assert_eq!(nested, SmtTerm::And(vec![a.clone(), b]));
        assert!(SmtTerm::and(vec![a, SmtTerm::ff()]).is_false());
        assert!(SmtTerm::and(vec![]).is_true());
    }

    #[test]
    fn or_folds_literals() {
        let a = SmtTerm::var("a");
        assert_eq!(SmtTerm::or(vec![SmtTerm::ff(), a.clone()]), a);
        assert!(SmtTerm::or(vec![a, SmtTerm::tt()]).is_true());
        assert!(SmtTerm::or(vec![]).is_false());
    }

    #[test]
    fn eq_against_bool_literals_simplifies() {
        let a = SmtTerm::var("a");
        assert_eq!(a.clone().eq(SmtTerm::tt()), a.clone());
        assert_eq!(a.clone().eq(SmtTerm::ff()), a.clone().not());
        assert!(a.clone().eq(a).is_true());
        assert!(SmtTerm::int(3).eq(SmtTerm::int(4)).is_false());
    }

    #[test]
    fn implies_and_ite_fold() {
        let a = SmtTerm::var("a");
        assert!(SmtTerm::ff().implies(a.clone()).is_true());
        assert_eq!(SmtTerm::tt().implies(a.clone()), a.clone());
        assert_eq!(
            SmtTerm::ite(SmtTerm::tt(), SmtTerm::int(1), SmtTerm::int(2)),
            SmtTerm::int(1)
        );
        assert_eq!(
            SmtTerm::ite(a, SmtTerm::int(7), SmtTerm::int(7)),
            SmtTerm::int(7)
        );
    }

    #[test]
    fn arithmetic_folds_constants() {
        assert_eq!(SmtTerm::int(2).add(SmtTerm::int(3)), SmtTerm::int(5));
        assert_eq!(SmtTerm::var("x").add(SmtTerm::int(0)), SmtTerm::var("x"));
        assert_eq!(
            SmtTerm::sum(vec![SmtTerm::int(1), SmtTerm::int(1), SmtTerm::int(1)]),
            SmtTerm::int(3)
        );
    }
}

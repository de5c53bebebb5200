//! # Version Ranges
//!
//! A [`VersionConstraint`] is a conjunction of [`Comparator`]s; the empty
//! conjunction is the universal range requested as `latest`. Resolution picks
//! the greatest stored version satisfying every comparator.
//!
//! Comparison uses semantic-version precedence: major, minor, patch, then
//! pre-release identifiers (numeric identifiers compare numerically). Build
//! metadata is ignored. Pre-release versions are ordinary candidates, so
//!
//! ```
//! # use pkgd_core::range::VersionConstraint;
//! let constraint = VersionConstraint::parse(">1.0.0 <=1.0.2-10").unwrap();
//! assert!(constraint.matches(&semver::Version::parse("1.0.2-2").unwrap()));
//! assert!(!constraint.matches(&semver::Version::parse("1.0.3").unwrap()));
//! ```

use semver::Version;
use std::cmp::Ordering;
use std::fmt;

use crate::error::{RangeError, RegistryError, RegistryResult};
use crate::index::VersionIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
}

impl Op {
    /// Operator from a URL path token (`gt`, `lt`, `gte`, `lte`).
    pub fn from_token(token: &str) -> Result<Self, RangeError> {
        match token {
            "gt" => Ok(Op::Gt),
            "lt" => Ok(Op::Lt),
            "gte" => Ok(Op::Gte),
            "lte" => Ok(Op::Lte),
            other => Err(RangeError::UnknownOperator(other.to_string())),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Gte => ">=",
            Op::Lte => "<=",
            Op::Eq => "=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Op::Gt => ordering == Ordering::Greater,
            Op::Lt => ordering == Ordering::Less,
            Op::Gte => ordering != Ordering::Less,
            Op::Lte => ordering != Ordering::Greater,
            Op::Eq => ordering == Ordering::Equal,
        }
    }

    /// Split a leading operator symbol off `term`.
    fn strip_symbol(term: &str) -> (Option<Op>, &str) {
        for (symbol, op) in [
            (">=", Op::Gte),
            ("<=", Op::Lte),
            (">", Op::Gt),
            ("<", Op::Lt),
            ("=", Op::Eq),
        ] {
            if let Some(rest) = term.strip_prefix(symbol) {
                return (Some(op), rest);
            }
        }
        (None, term)
    }
}

/// Semantic-version precedence, ignoring build metadata.
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// One `<op> <bound>` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub op: Op,
    pub bound: Version,
}

impl Comparator {
    pub fn new(op: Op, bound: &str) -> Result<Self, RangeError> {
        let bound_str = bound.trim();
        let bound_str = bound_str.strip_prefix('v').unwrap_or(bound_str);
        if bound_str.is_empty() {
            return Err(RangeError::MissingBound(op.symbol().to_string()));
        }
        let bound = Version::parse(bound_str).map_err(|source| RangeError::InvalidBound {
            bound: bound.to_string(),
            source,
        })?;
        Ok(Self { op, bound })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.op.accepts(cmp_precedence(version, &self.bound))
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.bound)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionConstraint {
    comparators: Vec<Comparator>,
}

impl VersionConstraint {
    /// The universal range.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        self.comparators.is_empty()
    }

    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }

    /// Build from URL path tokens such as `[("gt", "1.0.0"), ("lte", "2.0.0")]`.
    pub fn from_tokens(terms: &[(&str, &str)]) -> Result<Self, RangeError> {
        let comparators = terms
            .iter()
            .map(|(op, bound)| Comparator::new(Op::from_token(op)?, bound))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { comparators })
    }

    /// Parse a textual constraint.
    ///
    /// Accepts `latest`, `*`, `x`, `x.x.x` or an empty string for the
    /// universal range, and otherwise terms separated by whitespace or commas
    /// (`>1.0.0 <=2.0.0`, `>= 1.0.0, < 2.0.0`). A bare version is an exact
    /// match.
    pub fn parse(expr: &str) -> Result<Self, RangeError> {
        let normalized = expr.replace(',', " ");
        let mut tokens = normalized.split_whitespace();
        let mut comparators = Vec::new();

        while let Some(token) = tokens.next() {
            if is_universal(token) {
                continue;
            }

            let (op, rest) = Op::strip_symbol(token);
            let comparator = match op {
                Some(op) if rest.is_empty() => {
                    let bound = tokens
                        .next()
                        .ok_or_else(|| RangeError::MissingBound(op.symbol().to_string()))?;
                    Comparator::new(op, bound)?
                }
                Some(op) => Comparator::new(op, rest)?,
                None if starts_like_version(token) => Comparator::new(Op::Eq, token)?,
                None => {
                    let operator: String =
                        token.chars().take_while(|c| !c.is_ascii_digit()).collect();
                    return Err(RangeError::UnknownOperator(operator));
                }
            };
            comparators.push(comparator);
        }

        Ok(Self { comparators })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.comparators.iter().all(|c| c.matches(version))
    }

    /// The greatest candidate satisfying the constraint, by precedence.
    /// Candidates that are not valid versions are skipped.
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter_map(|raw| Version::parse(raw).ok().map(|v| (raw, v)))
            .filter(|(_, v)| self.matches(v))
            .max_by(|(_, a), (_, b)| cmp_precedence(a, b))
            .map(|(raw, _)| raw)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comparators.is_empty() {
            return f.write_str("latest");
        }
        let terms: Vec<String> = self.comparators.iter().map(ToString::to_string).collect();
        f.write_str(&terms.join(" "))
    }
}

impl std::str::FromStr for VersionConstraint {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_universal(token: &str) -> bool {
    matches!(token, "latest" | "*" | "x" | "X" | "x.x.x")
}

fn starts_like_version(token: &str) -> bool {
    let token = token.strip_prefix('v').unwrap_or(token);
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Pick the best stored version of `name` for `constraint`.
pub fn resolve(
    index: &VersionIndex,
    name: &str,
    constraint: &VersionConstraint,
) -> RegistryResult<String> {
    let versions = index.list_versions(name);
    constraint
        .best_match(versions.iter().map(String::as_str))
        .map(str::to_string)
        .ok_or_else(|| RegistryError::NotSatisfied {
            name: name.to_string(),
            constraint: constraint.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORED: [&str; 4] = ["1.0.0", "1.0.1", "1.0.2-2", "1.0.2-10"];

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn best(constraint: &VersionConstraint) -> Option<&'static str> {
        constraint.best_match(STORED)
    }

    #[test]
    fn test_latest_uses_precedence() {
        assert_eq!(best(&VersionConstraint::any()), Some("1.0.2-10"));
        assert_eq!(best(&VersionConstraint::parse("latest").unwrap()), Some("1.0.2-10"));
        assert_eq!(best(&VersionConstraint::parse("*").unwrap()), Some("1.0.2-10"));
    }

    #[test]
    fn test_paired_constraint() {
        let constraint = VersionConstraint::from_tokens(&[("gt", "1.0.0"), ("lte", "1.0.2-10")]).unwrap();
        assert_eq!(best(&constraint), Some("1.0.2-10"));

        let constraint = VersionConstraint::from_tokens(&[("gt", "1.0.0"), ("lt", "1.0.2-10")]).unwrap();
        assert_eq!(best(&constraint), Some("1.0.2-2"));

        let constraint = VersionConstraint::from_tokens(&[("gte", "1.0.0"), ("lt", "1.0.1")]).unwrap();
        assert_eq!(best(&constraint), Some("1.0.0"));
    }

    #[test]
    fn test_unsatisfiable() {
        let constraint = VersionConstraint::parse("> 2.0.0").unwrap();
        assert_eq!(best(&constraint), None);
        assert_eq!(VersionConstraint::any().best_match(Vec::<&str>::new()), None);
    }

    #[test]
    fn test_parse_forms() {
        let constraint = VersionConstraint::parse(">= 1.0.0, <2.0.0").unwrap();
        assert_eq!(constraint.comparators().len(), 2);
        assert_eq!(constraint.comparators()[0].op, Op::Gte);
        assert_eq!(constraint.comparators()[1].op, Op::Lt);
        assert_eq!(constraint.to_string(), ">=1.0.0 <2.0.0");

        let exact = VersionConstraint::parse("v1.0.1").unwrap();
        assert_eq!(exact.comparators()[0].op, Op::Eq);
        assert_eq!(best(&exact), Some("1.0.1"));

        assert!(VersionConstraint::parse("").unwrap().is_any());
        assert!(VersionConstraint::parse("x.x.x").unwrap().is_any());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            VersionConstraint::parse("~1.0.0"),
            Err(RangeError::UnknownOperator(op)) if op == "~"
        ));
        assert!(matches!(
            VersionConstraint::parse(">="),
            Err(RangeError::MissingBound(_))
        ));
        assert!(matches!(
            VersionConstraint::parse(">banana"),
            Err(RangeError::InvalidBound { .. })
        ));
        assert!(matches!(
            VersionConstraint::from_tokens(&[("ge", "1.0.0")]),
            Err(RangeError::UnknownOperator(_))
        ));
    }

    #[test]
    fn test_build_metadata_ignored() {
        let constraint = VersionConstraint::parse("=1.0.0").unwrap();
        assert!(constraint.matches(&v("1.0.0+build.5")));
        assert_eq!(cmp_precedence(&v("1.0.0+a"), &v("1.0.0+b")), Ordering::Equal);
    }

    #[test]
    fn test_prerelease_ordering() {
        assert_eq!(cmp_precedence(&v("1.0.2-10"), &v("1.0.2-2")), Ordering::Greater);
        assert_eq!(cmp_precedence(&v("1.0.2"), &v("1.0.2-10")), Ordering::Greater);
        assert_eq!(cmp_precedence(&v("1.0.2-alpha"), &v("1.0.2-2")), Ordering::Greater);
    }

    #[test]
    fn test_invalid_stored_versions_are_skipped() {
        let candidates = ["not-a-version", "0.9.0"];
        assert_eq!(VersionConstraint::any().best_match(candidates), Some("0.9.0"));
    }

    #[test]
    fn test_resolve_unknown_package() {
        let index = VersionIndex::new("http://localhost/");
        let err = resolve(&index, "nope", &VersionConstraint::any()).unwrap_err();
        assert!(matches!(err, RegistryError::NotSatisfied { .. }));
    }
}

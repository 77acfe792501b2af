//! Semantic version parsing, ordering, and range matching.
//!
//! Ranges use npm's syntax, which differs from Cargo's in a few places:
//! - A bare version is exact: `1.2.3` matches only `1.2.3`, `1.2` matches `1.2.x`
//! - Comparators are separated by whitespace, not commas
//! - `||` separates alternatives
//! - `1.0.0 - 2.0.0` is an inclusive hyphen range
//!
//! Each alternative is evaluated with [`semver::VersionReq`], so pre-release
//! handling follows the `semver` crate.

use std::fmt;

use semver::{Comparator, Op, Version, VersionReq};

/// A parsed version range: a disjunction of comparator sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Alternative {
    text: String,
    req: VersionReq,
}

impl VersionRange {
    /// Parse an npm-style range expression.
    pub fn parse(input: &str) -> Result<Self, semver::Error> {
        let alternatives = input
            .split("||")
            .map(|part| {
                let text = part.split_whitespace().collect::<Vec<_>>().join(" ");
                let req = parse_alternative(&text)?;
                Ok(Alternative { text, req })
            })
            .collect::<Result<Vec<_>, semver::Error>>()?;
        Ok(Self { alternatives })
    }

    /// The range `<version`, used to push an owner to an earlier release.
    pub fn below(version: &Version) -> Self {
        let req = VersionReq {
            comparators: vec![Comparator {
                op: Op::Less,
                major: version.major,
                minor: Some(version.minor),
                patch: Some(version.patch),
                pre: version.pre.clone(),
            }],
        };
        Self {
            alternatives: vec![Alternative {
                text: format!("<{}", strip_build(version)),
                req,
            }],
        }
    }

    /// Check if a version satisfies any alternative of this range.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|alt| alt.req.matches(version))
    }

    /// The range matching versions accepted by both `self` and `other`.
    pub fn intersect(&self, other: &VersionRange) -> VersionRange {
        let mut alternatives = Vec::new();
        for a in &self.alternatives {
            for b in &other.alternatives {
                let mut comparators = a.req.comparators.clone();
                comparators.extend(b.req.comparators.iter().cloned());
                let text = match (a.text.is_empty(), b.text.is_empty()) {
                    (true, _) => b.text.clone(),
                    (_, true) => a.text.clone(),
                    _ => format!("{} {}", a.text, b.text),
                };
                alternatives.push(Alternative {
                    text,
                    req: VersionReq { comparators },
                });
            }
        }
        VersionRange { alternatives }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, alt) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" || ")?;
            }
            f.write_str(&alt.text)?;
        }
        Ok(())
    }
}

fn strip_build(version: &Version) -> Version {
    let mut v = version.clone();
    v.build = semver::BuildMetadata::EMPTY;
    v
}

fn parse_alternative(text: &str) -> Result<VersionReq, semver::Error> {
    if text.is_empty() || matches!(text, "*" | "x" | "X") {
        return Ok(VersionReq::STAR);
    }

    if let Some((lower, upper)) = text.split_once(" - ") {
        let lower = lower.trim().trim_start_matches('v');
        let upper = upper.trim().trim_start_matches('v');
        return VersionReq::parse(&format!(">={lower}, <={upper}"));
    }

    // Operators may be separated from their version: `>= 1.2.3`.
    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in text.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op = Some(token);
            continue;
        }
        let token = match pending_op.take() {
            Some(op) => format!("{op}{token}"),
            None => token.to_string(),
        };
        comparators.push(normalize_comparator(&token));
    }
    if let Some(op) = pending_op {
        comparators.push(op.to_string());
    }
    VersionReq::parse(&comparators.join(", "))
}

/// Turn an npm comparator into one the `semver` crate reads the same way.
fn normalize_comparator(token: &str) -> String {
    let split = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let version = version.strip_prefix('v').unwrap_or(version);
    if op.is_empty() {
        normalize_bare(version)
    } else {
        format!("{op}{version}")
    }
}

/// A bare version without an operator is exact in npm but caret in Cargo.
fn normalize_bare(version: &str) -> String {
    let version = version.strip_prefix('v').unwrap_or(version);
    let wildcard = version
        .split('.')
        .any(|part| matches!(part, "*" | "x" | "X"));
    if wildcard {
        version.to_string()
    } else {
        format!("={version}")
    }
}

/// Parse a list of version strings and order them from highest to lowest.
///
/// Strings that are not valid semantic versions are skipped: no range can
/// ever select them.
pub fn sort_descending(library: &str, versions: &[String]) -> Vec<Version> {
    let mut parsed: Vec<Version> = versions
        .iter()
        .filter_map(|raw| {
            let trimmed = raw.trim();
            let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
            match Version::parse(trimmed) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Skipping invalid version {library}@{raw}: {e}");
                    None
                }
            }
        })
        .collect();
    parsed.sort_by(|a, b| b.cmp(a));
    parsed.dedup();
    parsed
}

/// The highest version matching `range` in a list sorted by [`sort_descending`].
pub fn max_satisfying<'a>(versions: &'a [Version], range: &VersionRange) -> Option<&'a Version> {
    versions.iter().find(|v| range.matches(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn bare_version_is_exact() {
        let r = range("0.1.0");
        assert!(r.matches(&v("0.1.0")));
        assert!(!r.matches(&v("0.1.1")));
    }

    #[test]
    fn bare_partial_version_matches_patch_series() {
        let r = range("1.2");
        assert!(r.matches(&v("1.2.0")));
        assert!(r.matches(&v("1.2.9")));
        assert!(!r.matches(&v("1.3.0")));
    }

    #[test]
    fn caret_and_tilde() {
        let caret = range("^1.2.3");
        assert!(caret.matches(&v("1.9.0")));
        assert!(!caret.matches(&v("2.0.0")));
        assert!(!caret.matches(&v("1.2.2")));

        let zero_caret = range("^0.1.0");
        assert!(zero_caret.matches(&v("0.1.5")));
        assert!(!zero_caret.matches(&v("0.2.0")));

        let tilde = range("~1.2.3");
        assert!(tilde.matches(&v("1.2.9")));
        assert!(!tilde.matches(&v("1.3.0")));
    }

    #[test]
    fn whitespace_separated_comparators_intersect() {
        let r = range(">=1.0.0 <2.0.0");
        assert!(r.matches(&v("1.5.0")));
        assert!(!r.matches(&v("2.0.0")));
        assert!(!r.matches(&v("0.9.0")));
    }

    #[test]
    fn detached_operator() {
        let r = range(">= 1.2.0");
        assert!(r.matches(&v("1.2.0")));
        assert!(!r.matches(&v("1.1.9")));
    }

    #[test]
    fn alternatives() {
        let r = range("^1.0.0 || ^3.0.0");
        assert!(r.matches(&v("1.4.0")));
        assert!(r.matches(&v("3.1.0")));
        assert!(!r.matches(&v("2.0.0")));
        assert_eq!(r.to_string(), "^1.0.0 || ^3.0.0");
    }

    #[test]
    fn hyphen_range_is_inclusive() {
        let r = range("1.0.0 - 2.0.0");
        assert!(r.matches(&v("1.0.0")));
        assert!(r.matches(&v("2.0.0")));
        assert!(!r.matches(&v("2.0.1")));
    }

    #[test]
    fn wildcards_and_empty() {
        assert!(range("*").matches(&v("9.9.9")));
        assert!(range("").matches(&v("0.0.1")));
        let r = range("1.x");
        assert!(r.matches(&v("1.7.0")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn leading_v_is_tolerated() {
        assert!(range("v1.2.3").matches(&v("1.2.3")));
        assert!(range("^v1.2.3").matches(&v("1.3.0")));
    }

    #[test]
    fn invalid_range_is_rejected() {
        assert!(VersionRange::parse("not a version").is_err());
        assert!(VersionRange::parse("^1.2.3 || >=banana").is_err());
    }

    #[test]
    fn below_excludes_bound() {
        let r = VersionRange::below(&v("0.1.1"));
        assert_eq!(r.to_string(), "<0.1.1");
        assert!(r.matches(&v("0.1.0")));
        assert!(!r.matches(&v("0.1.1")));
    }

    #[test]
    fn intersect_keeps_both_bounds() {
        let r = range("^0.1.0").intersect(&VersionRange::below(&v("0.1.2")));
        assert_eq!(r.to_string(), "^0.1.0 <0.1.2");
        assert!(r.matches(&v("0.1.1")));
        assert!(!r.matches(&v("0.1.2")));
        assert!(!r.matches(&v("0.0.9")));
    }

    #[test]
    fn sort_descending_orders_by_precedence() {
        let raw: Vec<String> = ["1.2.2", "1.10.0", "1.2.10", "1.2.10-beta.1", "junk", "v0.9.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sorted = sort_descending("lib", &raw);
        let rendered: Vec<String> = sorted.iter().map(|v| v.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["1.10.0", "1.2.10", "1.2.10-beta.1", "1.2.2", "0.9.0"]
        );
    }

    #[test]
    fn max_satisfying_takes_first_match() {
        let versions = sort_descending(
            "lib",
            &["1.2.2".to_string(), "1.2.3".to_string(), "1.2.4".to_string()],
        );
        assert_eq!(max_satisfying(&versions, &range("^1.2.3")), Some(&v("1.2.4")));
        assert_eq!(max_satisfying(&versions, &range("<1.2.3")), Some(&v("1.2.2")));
        assert_eq!(max_satisfying(&versions, &range("^2.0.0")), None);
    }
}

//! Maven version helpers.
//!
//! Snapshot detection, base-version resolution and the version ordering used
//! for `maven-metadata.xml` and retention decisions.

use std::cmp::Ordering;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

pub const SNAPSHOT: &str = "SNAPSHOT";

fn unique_snapshot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.*)-([0-9]{8}\.[0-9]{6})-([0-9]+)$").expect("valid snapshot regex")
    })
}

/// A timestamped snapshot build, e.g. `1.0-20070504.153317-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueSnapshot<'a> {
    pub base: &'a str,
    pub timestamp: &'a str,
    pub build_number: u32,
}

impl UniqueSnapshot<'_> {
    /// Snapshot timestamp as UTC instant.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(self.timestamp, "%Y%m%d.%H%M%S")
            .ok()
            .map(|t| t.and_utc())
    }
}

/// Split a timestamped snapshot version into its parts.
pub fn parse_unique_snapshot(version: &str) -> Option<UniqueSnapshot<'_>> {
    let caps = unique_snapshot_pattern().captures(version)?;
    Some(UniqueSnapshot {
        base: caps.get(1)?.as_str(),
        timestamp: caps.get(2)?.as_str(),
        build_number: caps.get(3)?.as_str().parse().ok()?,
    })
}

/// `1.0-SNAPSHOT` style version.
pub fn is_generic_snapshot(version: &str) -> bool {
    version.ends_with(SNAPSHOT)
}

/// `1.0-20070504.153317-1` style version.
pub fn is_unique_snapshot(version: &str) -> bool {
    parse_unique_snapshot(version).is_some()
}

pub fn is_snapshot(version: &str) -> bool {
    is_generic_snapshot(version) || is_unique_snapshot(version)
}

/// Directory version for a build: unique snapshots collapse to `<base>-SNAPSHOT`.
pub fn base_version(version: &str) -> String {
    match parse_unique_snapshot(version) {
        Some(snapshot) => format!("{}-{}", snapshot.base, SNAPSHOT),
        None => version.to_string(),
    }
}

/// Released counterpart of a snapshot version (`2.3-SNAPSHOT` -> `2.3`).
pub fn release_version(version: &str) -> Option<String> {
    let base = base_version(version);
    base.strip_suffix(SNAPSHOT)
        .map(|v| v.trim_end_matches(['-', '.']).to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(String),
    Qualifier(String),
}

impl Item {
    fn number(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        Item::Number(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
    }
}

fn qualifier_rank(qualifier: &str) -> u8 {
    match qualifier {
        "alpha" | "a" => 0,
        "beta" | "b" => 1,
        "milestone" | "m" => 2,
        "rc" | "cr" => 3,
        "snapshot" => 4,
        "" | "ga" | "final" | "release" => 5,
        "sp" => 6,
        _ => 7,
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    qualifier_rank(a)
        .cmp(&qualifier_rank(b))
        .then_with(|| a.cmp(b))
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(Item::Number(x)), Some(Item::Number(y))) => compare_numbers(x, y),
        (Some(Item::Qualifier(x)), Some(Item::Qualifier(y))) => compare_qualifiers(x, y),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Number(x)), None) => compare_numbers(x, "0"),
        (None, Some(Item::Number(y))) => compare_numbers("0", y),
        (Some(Item::Qualifier(x)), None) => compare_qualifiers(x, ""),
        (None, Some(Item::Qualifier(y))) => compare_qualifiers("", y),
    }
}

fn flush(current: &mut String, digits: bool, items: &mut Vec<Item>) {
    if current.is_empty() {
        return;
    }
    let token = std::mem::take(current);
    if digits {
        items.push(Item::number(&token));
    } else {
        items.push(Item::Qualifier(token));
    }
}

fn parse_items(version: &str) -> Vec<Item> {
    let lower = version.to_ascii_lowercase();
    let mut items = Vec::new();
    let mut current = String::new();
    let mut digits = false;

    for c in lower.chars() {
        if c == '.' || c == '-' || c == '_' {
            flush(&mut current, digits, &mut items);
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != digits {
            flush(&mut current, digits, &mut items);
        }
        digits = is_digit;
        current.push(c);
    }
    flush(&mut current, digits, &mut items);

    // Trailing release markers and zeros carry no ordering weight.
    while matches!(
        items.last(),
        Some(Item::Number(n)) if n == "0"
    ) || matches!(items.last(), Some(Item::Qualifier(q)) if qualifier_rank(q) == 5)
    {
        items.pop();
    }
    items
}

/// Total order over Maven version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = parse_items(a);
    let right = parse_items(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let ordering = compare_items(left.get(i), right.get(i));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    // Equal by value: fall back to the raw text so distinct strings stay distinct.
    a.cmp(b)
}

/// Sort versions ascending and drop duplicates.
pub fn sort_versions(versions: &mut Vec<String>) {
    versions.sort_by(|a, b| compare_versions(a, b));
    versions.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_detection() {
        assert!(is_snapshot("1.0-SNAPSHOT"));
        assert!(is_snapshot("1.0RC1-20070504.153317-1"));
        assert!(!is_snapshot("1.0"));
        assert!(is_generic_snapshot("2.3-SNAPSHOT"));
        assert!(!is_generic_snapshot("1.0-20070504.153317-1"));
        assert!(is_unique_snapshot("1.0-20070504.153317-1"));
    }

    #[test]
    fn test_base_version() {
        assert_eq!(base_version("1.0RC1-20070504.153317-1"), "1.0RC1-SNAPSHOT");
        assert_eq!(base_version("2.3-SNAPSHOT"), "2.3-SNAPSHOT");
        assert_eq!(base_version("2.3"), "2.3");
    }

    #[test]
    fn test_release_version() {
        assert_eq!(release_version("2.3-SNAPSHOT").as_deref(), Some("2.3"));
        assert_eq!(release_version("1.0-20070504.153317-1").as_deref(), Some("1.0"));
        assert_eq!(release_version("2.3"), None);
    }

    #[test]
    fn test_unique_snapshot_parts() {
        let snapshot = parse_unique_snapshot("1.0RC1-20070505.090015-3").unwrap();
        assert_eq!(snapshot.base, "1.0RC1");
        assert_eq!(snapshot.timestamp, "20070505.090015");
        assert_eq!(snapshot.build_number, 3);
        let ts = snapshot.timestamp_utc().unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2007-05-05 09:00:15");
    }

    #[test]
    fn test_ordering() {
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.3-SNAPSHOT", "2.3"), Ordering::Less);
        assert_eq!(compare_versions("2.2", "2.3-SNAPSHOT"), Ordering::Less);
        assert_eq!(compare_versions("1.0-alpha-1", "1.0-beta-1"), Ordering::Less);
        assert_eq!(compare_versions("1.0-rc1", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0-sp1"), Ordering::Less);
    }

    #[test]
    fn test_snapshot_builds_order_by_timestamp() {
        let mut builds = vec![
            "1.0RC1-20070506.090132-4".to_string(),
            "1.0RC1-20070504.160758-2".to_string(),
            "1.0RC1-20070505.090015-3".to_string(),
            "1.0RC1-20070504.153317-1".to_string(),
        ];
        sort_versions(&mut builds);
        assert_eq!(
            builds,
            vec![
                "1.0RC1-20070504.153317-1",
                "1.0RC1-20070504.160758-2",
                "1.0RC1-20070505.090015-3",
                "1.0RC1-20070506.090132-4",
            ]
        );
    }

    #[test]
    fn test_sort_dedups() {
        let mut versions = vec!["1.1".to_string(), "1.0".to_string(), "1.1".to_string()];
        sort_versions(&mut versions);
        assert_eq!(versions, vec!["1.0", "1.1"]);
    }
}

//! Download policies applied by proxy connectors.
//!
//! The set is closed: update policies for releases and snapshots, checksum
//! handling, failure caching, and error propagation. Each connector carries
//! one option per policy, parsed once when connectors are resolved.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::formats::is_checksum_path;
use crate::services::failure_cache::UrlFailureCache;
use crate::storage::checksum::{side_file, ChecksumAlgorithm, ChecksummedFile};
use crate::storage::filesystem::{modified_time, remove_file_if_exists};

pub const RELEASES: &str = "releases";
pub const SNAPSHOTS: &str = "snapshots";
pub const CHECKSUM: &str = "checksum";
pub const CACHE_FAILURES: &str = "cache-failures";
pub const PROPAGATE_ERRORS: &str = "propagate-errors";
pub const PROPAGATE_ERRORS_ON_UPDATE: &str = "propagate-errors-on-update";

/// A policy said no. Control flow only; never surfaced to callers as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{policy}: {reason}")]
pub struct PolicyViolation {
    pub policy: &'static str,
    pub reason: String,
}

impl PolicyViolation {
    fn new(policy: &'static str, reason: impl Into<String>) -> Self {
        Self {
            policy,
            reason: reason.into(),
        }
    }

    /// Skipped because the remote failed this path recently, not refused.
    pub fn is_cached_failure(&self) -> bool {
        self.policy == CACHE_FAILURES
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid option '{option}' for policy '{policy}'")]
pub struct InvalidPolicyOption {
    pub policy: String,
    pub option: String,
}

fn normalize(option: &str) -> String {
    option.trim().to_ascii_lowercase()
}

macro_rules! policy_options {
    ($name:ident, $policy:expr, { $( $variant:ident => $text:literal ),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }
        }

        impl FromStr for $name {
            type Err = InvalidPolicyOption;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match normalize(s).as_str() {
                    $( $text => Ok($name::$variant), )+
                    _ => Err(InvalidPolicyOption {
                        policy: $policy.to_string(),
                        option: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// What a request is fetching, for update policy scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Release,
    Snapshot,
    Metadata,
}

/// When an existing local copy may be refreshed from a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    Always,
    Never,
    Once,
    Daily,
    Hourly,
}

policy_options!(UpdatePolicy, "update", {
    Always => "always",
    Never => "never",
    Once => "once",
    Daily => "daily",
    Hourly => "hourly",
});

impl UpdatePolicy {
    fn check(&self, policy: &'static str, local_file: &Path) -> Result<(), PolicyViolation> {
        match self {
            UpdatePolicy::Always => return Ok(()),
            UpdatePolicy::Never => {
                return Err(PolicyViolation::new(policy, "updates are disabled"));
            }
            _ => {}
        }

        let Some(modified) = modified_time(local_file) else {
            // Nothing local yet: always fetch.
            return Ok(());
        };

        let interval = match self {
            UpdatePolicy::Daily => Duration::from_secs(24 * 60 * 60),
            UpdatePolicy::Hourly => Duration::from_secs(60 * 60),
            _ => return Err(PolicyViolation::new(policy, "local file exists and policy is once")),
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= interval {
            Ok(())
        } else {
            Err(PolicyViolation::new(
                policy,
                format!("local file is newer than the {} interval", self),
            ))
        }
    }
}

/// What to do with a downloaded file whose checksums do not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumPolicy {
    Ignore,
    Fail,
    Fix,
}

policy_options!(ChecksumPolicy, CHECKSUM, {
    Ignore => "ignore",
    Fail => "fail",
    Fix => "fix",
});

impl ChecksumPolicy {
    /// Apply to a downloaded (staged) file. Blocking I/O.
    pub fn apply(&self, file: &Path) -> Result<(), PolicyViolation> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_checksum_path(&name) {
            return Ok(());
        }

        let checksummed = ChecksummedFile::new(file);
        match self {
            ChecksumPolicy::Ignore => Ok(()),
            ChecksumPolicy::Fail => {
                if checksummed.is_valid_checksums(ChecksumAlgorithm::PROXY) {
                    return Ok(());
                }
                for path in std::iter::once(file.to_path_buf()).chain(
                    ChecksumAlgorithm::PROXY
                        .iter()
                        .map(|a| side_file(file, a.extension())),
                ) {
                    if let Err(e) = remove_file_if_exists(&path) {
                        tracing::warn!(file = %path.display(), error = %e, "Unable to discard file failing checksum");
                    }
                }
                Err(PolicyViolation::new(
                    CHECKSUM,
                    format!("checksums do not match for {}", name),
                ))
            }
            ChecksumPolicy::Fix => {
                if checksummed.fix_checksums(ChecksumAlgorithm::PROXY) {
                    Ok(())
                } else {
                    Err(PolicyViolation::new(
                        CHECKSUM,
                        format!("unable to fix checksums for {}", name),
                    ))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedFailuresPolicy {
    No,
    Yes,
}

policy_options!(CachedFailuresPolicy, CACHE_FAILURES, {
    No => "no",
    Yes => "yes",
});

impl CachedFailuresPolicy {
    pub fn check(&self, cache: &UrlFailureCache, key: &str) -> Result<(), PolicyViolation> {
        if *self == CachedFailuresPolicy::Yes && cache.has_failed_before(key) {
            return Err(PolicyViolation::new(
                CACHE_FAILURES,
                format!("{} failed recently", key),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagateErrors {
    Stop,
    Queue,
    Ignore,
}

policy_options!(PropagateErrors, PROPAGATE_ERRORS, {
    Stop => "stop",
    Queue => "queue",
    Ignore => "ignore",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagateErrorsOnUpdate {
    Always,
    NotPresent,
}

policy_options!(PropagateErrorsOnUpdate, PROPAGATE_ERRORS_ON_UPDATE, {
    Always => "always",
    NotPresent => "not-present",
});

/// How a transport error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Abort the fetch with the error.
    Propagate,
    /// Record the error in the outcome and try the next connector.
    Queue,
    /// Try the next connector without recording anything.
    Ignore,
}

/// The parsed policy options of one connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPolicies {
    pub releases: UpdatePolicy,
    pub snapshots: UpdatePolicy,
    pub checksum: ChecksumPolicy,
    pub cache_failures: CachedFailuresPolicy,
    pub propagate_errors: PropagateErrors,
    pub propagate_errors_on_update: PropagateErrorsOnUpdate,
}

impl Default for DownloadPolicies {
    fn default() -> Self {
        Self {
            releases: UpdatePolicy::Always,
            snapshots: UpdatePolicy::Always,
            checksum: ChecksumPolicy::Fix,
            cache_failures: CachedFailuresPolicy::No,
            propagate_errors: PropagateErrors::Queue,
            propagate_errors_on_update: PropagateErrorsOnUpdate::NotPresent,
        }
    }
}

impl DownloadPolicies {
    /// Parse a connector's policy map. Missing entries take defaults; unknown
    /// policy ids are ignored.
    pub fn from_options(options: &BTreeMap<String, String>) -> Result<Self, InvalidPolicyOption> {
        let mut policies = Self::default();
        for (id, option) in options {
            match id.as_str() {
                RELEASES => policies.releases = parse_update(RELEASES, option)?,
                SNAPSHOTS => policies.snapshots = parse_update(SNAPSHOTS, option)?,
                CHECKSUM => policies.checksum = option.parse()?,
                CACHE_FAILURES => policies.cache_failures = option.parse()?,
                PROPAGATE_ERRORS => policies.propagate_errors = option.parse()?,
                PROPAGATE_ERRORS_ON_UPDATE => policies.propagate_errors_on_update = option.parse()?,
                other => tracing::debug!(policy = other, "Ignoring unknown download policy"),
            }
        }
        Ok(policies)
    }

    /// Pre-download update check. Each update policy only applies to requests
    /// of its own nature; metadata is subject to both.
    pub fn check_update(&self, kind: RequestKind, local_file: &Path) -> Result<(), PolicyViolation> {
        if matches!(kind, RequestKind::Release | RequestKind::Metadata) {
            self.releases.check(RELEASES, local_file)?;
        }
        if matches!(kind, RequestKind::Snapshot | RequestKind::Metadata) {
            self.snapshots.check(SNAPSHOTS, local_file)?;
        }
        Ok(())
    }

    pub fn error_disposition(&self, local_exists: bool) -> ErrorDisposition {
        match self.propagate_errors {
            PropagateErrors::Stop => {
                if self.propagate_errors_on_update == PropagateErrorsOnUpdate::Always || !local_exists {
                    ErrorDisposition::Propagate
                } else {
                    ErrorDisposition::Queue
                }
            }
            PropagateErrors::Queue => ErrorDisposition::Queue,
            PropagateErrors::Ignore => ErrorDisposition::Ignore,
        }
    }
}

fn parse_update(policy: &str, option: &str) -> Result<UpdatePolicy, InvalidPolicyOption> {
    option.parse().map_err(|_| InvalidPolicyOption {
        policy: policy.to_string(),
        option: option.to_string(),
    })
}

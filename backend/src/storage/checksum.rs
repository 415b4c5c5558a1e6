//! Checksum side-files (`.sha1`, `.md5`, `.sha256`) for a reference file.
//!
//! Everything here is blocking `std::fs` I/O; async callers wrap it in
//! `spawn_blocking`.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use md5::Md5;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::storage::filesystem::write_atomic;

const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Algorithms the proxy validates downloads against.
    pub const PROXY: &'static [ChecksumAlgorithm] = &[ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5];

    pub const ALL: &'static [ChecksumAlgorithm] = &[
        ChecksumAlgorithm::Sha1,
        ChecksumAlgorithm::Md5,
        ChecksumAlgorithm::Sha256,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md5" => Some(ChecksumAlgorithm::Md5),
            "sha1" => Some(ChecksumAlgorithm::Sha1),
            "sha256" => Some(ChecksumAlgorithm::Sha256),
            _ => None,
        }
    }

    /// BSD/openssl style output: `SHA1 (file) = hex`.
    fn bsd_pattern(&self) -> &'static Regex {
        static MD5: OnceLock<Regex> = OnceLock::new();
        static SHA1: OnceLock<Regex> = OnceLock::new();
        static SHA256: OnceLock<Regex> = OnceLock::new();
        let (cell, names) = match self {
            ChecksumAlgorithm::Md5 => (&MD5, "MD5"),
            ChecksumAlgorithm::Sha1 => (&SHA1, "SHA-?1"),
            ChecksumAlgorithm::Sha256 => (&SHA256, "SHA-?256"),
        };
        cell.get_or_init(|| {
            Regex::new(&format!(
                r"^(?i:{})\s*\(([^)]*)\)\s*=\s*([a-fA-F0-9]+)$",
                names
            ))
            .expect("valid checksum regex")
        })
    }
}

fn gnu_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([a-fA-F0-9]+)\s+\*?(.+)$").expect("valid checksum regex"))
}

fn remote_metadata_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^maven-metadata-\S*\.xml$").expect("valid metadata regex"))
}

#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Checksum for {expected} names a different file: {found}")]
    FilenameMismatch { expected: String, found: String },

    #[error("Malformed checksum: {0}")]
    Malformed(String),
}

enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            ChecksumAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// A file together with its checksum side-files.
#[derive(Debug, Clone)]
pub struct ChecksummedFile {
    reference: PathBuf,
}

impl ChecksummedFile {
    pub fn new(reference: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.reference
    }

    /// `<reference>.<ext>`
    pub fn checksum_path(&self, algorithm: ChecksumAlgorithm) -> PathBuf {
        side_file(&self.reference, algorithm.extension())
    }

    fn filename(&self) -> String {
        self.reference
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn calculate_checksum(&self, algorithm: ChecksumAlgorithm) -> io::Result<String> {
        let mut digests = self.calculate_checksums(&[algorithm])?;
        Ok(digests.pop().unwrap_or_default())
    }

    /// Digest the reference file for every algorithm in one read.
    pub fn calculate_checksums(&self, algorithms: &[ChecksumAlgorithm]) -> io::Result<Vec<String>> {
        let mut hashers: Vec<Hasher> = algorithms.iter().map(|a| Hasher::new(*a)).collect();
        let mut reader = BufReader::new(File::open(&self.reference)?);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            for hasher in &mut hashers {
                hasher.update(&buffer[..read]);
            }
        }
        Ok(hashers.into_iter().map(Hasher::finalize_hex).collect())
    }

    /// Write `<hex>  <filename>` to the side-file for `algorithm`.
    pub fn create_checksum(&self, algorithm: ChecksumAlgorithm) -> io::Result<PathBuf> {
        let digest = self.calculate_checksum(algorithm)?;
        let path = self.checksum_path(algorithm);
        self.write_checksum(&path, &digest)?;
        Ok(path)
    }

    fn write_checksum(&self, path: &Path, digest: &str) -> io::Result<()> {
        write_atomic(path, format!("{}  {}", digest, self.filename()).as_bytes())
    }

    /// Extract the hex digest from side-file content, checking any embedded
    /// filename against the reference.
    pub fn parse_checksum(&self, raw: &str, algorithm: ChecksumAlgorithm) -> Result<String, ChecksumError> {
        let line = raw.replace(['\r', '\n'], " ");
        let line = line.trim();
        let expected = self.filename();

        let (digest, name) = if let Some(caps) = algorithm.bsd_pattern().captures(line) {
            (caps[2].to_string(), Some(caps[1].to_string()))
        } else if let Some(caps) = gnu_pattern().captures(line) {
            (caps[1].to_string(), Some(caps[2].trim().to_string()))
        } else {
            (line.to_string(), None)
        };

        if let Some(name) = name {
            if !filename_matches(&name, &expected) {
                return Err(ChecksumError::FilenameMismatch { expected, found: name });
            }
        }
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChecksumError::Malformed(digest));
        }
        Ok(digest)
    }

    pub fn is_valid_checksum(&self, algorithm: ChecksumAlgorithm) -> bool {
        self.is_valid_checksums(&[algorithm])
    }

    /// Every side-file that exists must match; at least one must exist.
    pub fn is_valid_checksums(&self, algorithms: &[ChecksumAlgorithm]) -> bool {
        let present: Vec<ChecksumAlgorithm> = algorithms
            .iter()
            .copied()
            .filter(|a| self.checksum_path(*a).exists())
            .collect();
        if present.is_empty() {
            return false;
        }

        let digests = match self.calculate_checksums(&present) {
            Ok(digests) => digests,
            Err(e) => {
                tracing::warn!(file = %self.reference.display(), error = %e, "Unable to read file for checksum validation");
                return false;
            }
        };

        let mut valid = true;
        for (algorithm, actual) in present.iter().zip(digests) {
            let side = self.checksum_path(*algorithm);
            let matched = std::fs::read_to_string(&side)
                .map_err(ChecksumError::from)
                .and_then(|raw| self.parse_checksum(&raw, *algorithm));
            match matched {
                Ok(expected) if expected.eq_ignore_ascii_case(&actual) => {}
                Ok(expected) => {
                    tracing::debug!(
                        file = %self.reference.display(),
                        algorithm = algorithm.extension(),
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch"
                    );
                    valid = false;
                }
                Err(e) => {
                    tracing::warn!(file = %side.display(), error = %e, "Unable to read checksum");
                    valid = false;
                }
            }
        }
        valid
    }

    /// Recompute and rewrite missing or wrong side-files. Returns false when
    /// the reference cannot be read or a side-file cannot be written.
    pub fn fix_checksums(&self, algorithms: &[ChecksumAlgorithm]) -> bool {
        let digests = match self.calculate_checksums(algorithms) {
            Ok(digests) => digests,
            Err(e) => {
                tracing::warn!(file = %self.reference.display(), error = %e, "Unable to read file to fix checksums");
                return false;
            }
        };

        let mut ok = true;
        for (algorithm, actual) in algorithms.iter().zip(digests) {
            let side = self.checksum_path(*algorithm);
            let current = std::fs::read_to_string(&side)
                .ok()
                .and_then(|raw| self.parse_checksum(&raw, *algorithm).ok());
            if current.is_some_and(|c| c.eq_ignore_ascii_case(&actual)) {
                continue;
            }
            if let Err(e) = self.write_checksum(&side, &actual) {
                tracing::warn!(file = %side.display(), error = %e, "Unable to write checksum");
                ok = false;
            }
        }
        ok
    }
}

/// Path of a side-file: `<file>.<ext>`.
pub fn side_file(reference: &Path, extension: &str) -> PathBuf {
    let mut name = reference.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn filename_matches(name: &str, expected: &str) -> bool {
    if name == "-" || name.ends_with(expected) {
        return true;
    }
    remote_metadata_pattern().is_match(expected) && name.ends_with("maven-metadata.xml")
}

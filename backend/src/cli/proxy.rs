//! Command-line interface.
//!
//! Fetch a single path through a managed repository's connectors, purge a
//! repository once, or run the scan scheduler until interrupted.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Managed Maven repository proxy
#[derive(Parser, Debug)]
#[command(name = "maven-proxy")]
#[command(about = "Proxy remote Maven repositories into managed ones and purge old snapshots", long_about = None)]
pub struct ProxyCli {
    #[command(subcommand)]
    pub command: ProxyCommand,

    /// Repository configuration file (JSON). Overrides REPOSITORIES_CONFIG.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (json, text)
    #[arg(long, default_value = "text", global = true)]
    pub format: String,
}

#[derive(Subcommand, Debug)]
pub enum ProxyCommand {
    /// Fetch an artifact, checksum or metadata path into a managed repository
    Fetch {
        /// Managed repository id
        repository: String,

        /// Repository-relative path, e.g. org/apache/maven/maven-core/2.0/maven-core-2.0.jar
        path: String,
    },

    /// Apply snapshot retention rules to a managed repository
    Purge {
        /// Managed repository id
        repository: String,
    },

    /// Run scheduled repository scans until interrupted
    Run {
        /// Queue a full scan of every managed repository at startup
        #[arg(long)]
        scan_now: bool,
    },
}

/// Print message based on output format
pub fn output(format: &str, message: &str, json_value: Option<serde_json::Value>) {
    match format {
        "json" => {
            let value = json_value.unwrap_or_else(|| serde_json::json!({ "message": message }));
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        }
        _ => {
            println!("{}", message);
        }
    }
}

/// Print error message
pub fn error(format: &str, message: &str) {
    match format {
        "json" => {
            eprintln!("{}", serde_json::json!({ "error": message }));
        }
        _ => {
            eprintln!("Error: {}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = ProxyCli::parse_from([
            "maven-proxy",
            "--format",
            "json",
            "fetch",
            "internal",
            "org/example/lib/1.0/lib-1.0.jar",
        ]);
        assert_eq!(cli.format, "json");
        match cli.command {
            ProxyCommand::Fetch { repository, path } => {
                assert_eq!(repository, "internal");
                assert_eq!(path, "org/example/lib/1.0/lib-1.0.jar");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_run_with_global_config() {
        let cli = ProxyCli::parse_from(["maven-proxy", "run", "--scan-now", "-c", "/etc/repos.json"]);
        assert!(matches!(cli.command, ProxyCommand::Run { scan_now: true }));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/repos.json")));
    }
}

//! Shared command line plumbing for the backend tools

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::client::{BackendClient, DigestCredentials};

/// Connection options common to every tool.
#[derive(Debug, Args)]
pub struct BackendArgs {
    /// Backend hostname
    #[arg(long, value_name = "hostname", default_value_t = default_host())]
    pub host: String,

    /// Port number of the Services API
    #[arg(long, value_name = "port", default_value_t = 6544)]
    pub port: u16,

    /// Digest username:password
    #[arg(long, value_name = "user:pass")]
    pub digest: Option<String>,

    /// Allow data to be changed
    #[arg(long)]
    pub wrmi: bool,

    /// Suppress progress messages
    #[arg(long)]
    pub quiet: bool,

    /// Turn on debug messages
    #[arg(long)]
    pub debug: bool,
}

pub fn default_host() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_owned())
}

/// Install the log subscriber; RUST_LOG overrides the flag levels.
///
/// Logs go to stderr so tools whose stdout carries data stay clean.
pub fn init_logging(quiet: bool, debug: bool) {
    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl BackendArgs {
    pub fn init_logging(&self) {
        init_logging(self.quiet, self.debug);
    }

    fn credentials(&self) -> Result<Option<DigestCredentials>> {
        match &self.digest {
            None => Ok(None),
            Some(digest) => match digest.split_once(':') {
                Some((user, password)) => Ok(Some(DigestCredentials {
                    user: user.to_owned(),
                    password: password.to_owned(),
                })),
                None => bail!("--digest expects user:pass"),
            },
        }
    }

    /// Build a client and make sure the backend is up.
    pub async fn connect(&self) -> Result<BackendClient> {
        let client = BackendClient::new(&self.host, self.port, self.credentials()?, self.wrmi);
        let hostname = client
            .check_alive()
            .await
            .context("Is mythbackend running?")?;
        debug!("Connected to backend {hostname}");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        backend: BackendArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.backend.port, 6544);
        assert!(!cli.backend.wrmi);
        assert!(!cli.backend.host.is_empty());
    }

    #[test]
    fn test_digest_split() {
        let cli = TestCli::parse_from(["test", "--digest", "admin:se:cret"]);
        let creds = cli.backend.credentials().unwrap().unwrap();
        assert_eq!(creds.user, "admin");
        assert_eq!(creds.password, "se:cret");

        let cli = TestCli::parse_from(["test", "--digest", "nopassword"]);
        assert!(cli.backend.credentials().is_err());
    }
}

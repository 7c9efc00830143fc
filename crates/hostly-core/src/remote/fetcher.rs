//! Remote Fetcher
//!
//! Downloads the raw text of a remote profile source. Results are returned
//! verbatim; recording them is the scheduler's job.

use std::io;
use std::time::Duration;

use ureq::tls::{RootCerts, TlsConfig, TlsProvider};
use ureq::Agent;

use crate::config::RemoteSettings;
use crate::error::{HostlyError, Result};

const USER_AGENT: &str = concat!("hostly/", env!("CARGO_PKG_VERSION"));

/// One network retrieval of a profile source
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Check that a source URL is something we are willing to download
///
/// Only `http` and `https` are accepted.
pub fn validate_source_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url)
        .map_err(|e| HostlyError::invalid_format(format!("Invalid URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(HostlyError::invalid_format(format!(
            "Unsupported URL scheme '{}' in {}; only http and https are allowed",
            scheme, url
        ))),
    }
}

/// HTTP fetcher with a bounded timeout and body size
pub struct HttpFetcher {
    agent: Agent,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_body_bytes: u64) -> Self {
        let tls_config = TlsConfig::builder()
            .provider(TlsProvider::NativeTls)
            .root_certs(RootCerts::PlatformVerifier)
            .build();

        let agent = Agent::config_builder()
            .tls_config(tls_config)
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            max_body_bytes,
        }
    }

    pub fn from_settings(settings: &RemoteSettings) -> Self {
        Self::new(settings.timeout(), settings.max_body_bytes)
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        validate_source_url(url)?;

        let bytes = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| map_error(url, e))?
            .into_body()
            .with_config()
            .limit(self.max_body_bytes)
            .read_to_vec()
            .map_err(|e| map_error(url, e))?;

        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

fn map_error(url: &str, err: ureq::Error) -> HostlyError {
    match err {
        ureq::Error::Timeout(_) => HostlyError::Timeout {
            url: url.to_string(),
        },
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => HostlyError::Timeout {
            url: url.to_string(),
        },
        other => HostlyError::Network {
            url: url.to_string(),
            cause: other.to_string(),
        },
    }
}

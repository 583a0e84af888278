//! Configuration loading and management

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::polling::DEFAULT_POLL_PERIOD;
use crate::portal::trust::parse_endpoint;
use crate::session::SessionConfig;
use crate::voice::{Confidence, DEFAULT_PHRASE_RANGE};

/// The device portal served on the headset itself
pub const DEFAULT_PORTAL_URL: &str = "https://127.0.0.1";

/// Credential vault resource name for the portal login
pub const DEFAULT_RESOURCE: &str = "DevicePortal";

/// Where credentials are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialBackend {
    /// OS keychain
    Keyring,
    /// Process memory only; forgotten on exit
    Memory,
}

impl FromStr for CredentialBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown credential backend: {other}")),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Device portal base URL
    pub portal_url: Url,

    /// Credential vault resource name
    pub resource: String,

    /// Whether authentication is permitted at all
    pub side_loading: bool,

    /// Interval between IPD polls
    pub poll_period: Duration,

    pub credential_backend: CredentialBackend,

    /// Spoken values that get a "Set IPD to V" phrase
    pub phrase_range: RangeInclusive<u32>,

    /// Recognised phrases below this are ignored
    pub min_confidence: Confidence,

    /// Capacity of the recogniser → router channel
    pub phrase_queue: usize,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("ipd-portal");

        let socket_path = data_dir.join("daemon.sock");

        let portal_url = parse_endpoint(
            &lookup("IPD_PORTAL_URL").unwrap_or_else(|| DEFAULT_PORTAL_URL.to_string()),
        )
        .context("invalid IPD_PORTAL_URL")?;

        let resource =
            lookup("IPD_CREDENTIAL_RESOURCE").unwrap_or_else(|| DEFAULT_RESOURCE.to_string());
        if resource.trim().is_empty() {
            bail!("IPD_CREDENTIAL_RESOURCE must not be empty");
        }

        let side_loading = parse_var(&lookup, "IPD_SIDE_LOADING", parse_bool)?.unwrap_or(true);

        let poll_secs = parse_var(&lookup, "IPD_POLL_SECS", |s| {
            s.parse::<u64>().map_err(|e| e.to_string())
        })?;
        let poll_period = match poll_secs {
            Some(0) => bail!("IPD_POLL_SECS must be at least 1"),
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_POLL_PERIOD,
        };

        let credential_backend = parse_var(&lookup, "IPD_CREDENTIAL_BACKEND", |s| {
            s.parse::<CredentialBackend>()
        })?
        .unwrap_or(CredentialBackend::Keyring);

        let min_confidence = parse_var(&lookup, "IPD_MIN_CONFIDENCE", |s| s.parse::<Confidence>())?
            .unwrap_or(Confidence::Medium);

        let phrase_queue = parse_var(&lookup, "IPD_PHRASE_QUEUE", |s| {
            s.parse::<usize>().map_err(|e| e.to_string())
        })?;
        let phrase_queue = match phrase_queue {
            Some(0) => bail!("IPD_PHRASE_QUEUE must be at least 1"),
            Some(n) => n,
            None => 32,
        };

        Ok(Self {
            socket_path,
            data_dir,
            portal_url,
            resource,
            side_loading,
            poll_period,
            credential_backend,
            phrase_range: DEFAULT_PHRASE_RANGE,
            min_confidence,
            phrase_queue,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Settings the session manager needs
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            resource: self.resource.clone(),
            side_loading: self.side_loading,
            poll_period: self.poll_period,
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> std::result::Result<T, String>,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => parse(raw.trim())
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
    }
}

fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected true or false, got {other}")),
    }
}

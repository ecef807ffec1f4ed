//! Process-wide runtime configuration.
//!
//! The configuration is installed at most once, before the first cast or
//! log-level sensitive operation. Reading it without installing one yields
//! the defaults.

use crate::error::{Error, Result};
use dynrt_log::Level;
use std::str::FromStr;
use std::sync::OnceLock;

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "DYNRT_LOG";

/// Environment variable holding the benign-cast policy.
pub const BENIGN_CASTS_ENV: &str = "DYNRT_BENIGN_CASTS";

/// How failed casts between loosely typed containers are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BenignCastPolicy {
    /// A failed cast is downgraded to a warning when both sides belong to
    /// the same container family and the actual type arguments are all
    /// `dynamic`.
    #[default]
    Narrow,
    /// Every failed cast is an error.
    Off,
}

impl FromStr for BenignCastPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "narrow" => Ok(BenignCastPolicy::Narrow),
            "off" | "strict" => Ok(BenignCastPolicy::Off),
            other => Err(Error::Config(format!(
                "unknown benign cast policy `{other}` (expected `narrow` or `off`)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    /// Level applied to the global logger on [`configure`]. `None` leaves it.
    pub log_level: Option<Level>,
    pub benign_casts: BenignCastPolicy,
}

impl RuntimeConfig {
    /// Reads `DYNRT_LOG` and `DYNRT_BENIGN_CASTS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup(LOG_ENV)
            .map(|raw| {
                raw.parse::<Level>()
                    .map_err(|e| Error::Config(e.to_string()))
            })
            .transpose()?;

        let benign_casts = lookup(BENIGN_CASTS_ENV)
            .map(|raw| raw.parse::<BenignCastPolicy>())
            .transpose()?
            .unwrap_or_default();

        Ok(RuntimeConfig {
            log_level,
            benign_casts,
        })
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Installs `config` for the rest of the process.
///
/// Fails when a configuration was already installed or already read.
pub fn configure(config: RuntimeConfig) -> Result<()> {
    let level = config.log_level;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("runtime configuration is already installed".into()))?;

    if let Some(level) = level {
        dynrt_log::set_level(level);
    }
    dynrt_log::debug!("runtime configured: {:?}", CONFIG.get());
    Ok(())
}

/// The active configuration.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::default)
}

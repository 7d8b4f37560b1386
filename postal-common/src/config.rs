//! Shared configuration sections.
//!
//! These are deserialized once at startup and then handed, immutably, to the
//! components that need them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lane::{DomainPredicate, Lane};

/// Errors raised while validating settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value is empty.
    #[error("Missing required value: {0}")]
    MissingValue(&'static str),

    /// A value is present but unusable.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

const fn default_smtp_port() -> u16 {
    25
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

/// Relay host every message is handed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Name announced in `EHLO`/`HELO`
    ///
    /// Default: `localhost`
    #[serde(default = "default_helo_name")]
    pub helo_name: String,
}

impl SmtpSettings {
    /// `host:port`, as used to dial the relay.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingValue("smtp.host"));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                field: "smtp.port".to_string(),
                reason: "port must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

const fn default_interval_secs() -> u64 {
    10
}

const fn default_batch_size() -> usize {
    10
}

/// Polling schedule of a single lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSchedule {
    /// Pause between two polling cycles (in seconds)
    ///
    /// Default: 10 seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum number of messages fetched per cycle
    ///
    /// Default: 10
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for LaneSchedule {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

impl LaneSchedule {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn validate(&self, lane: Lane) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: format!("distribution.{lane}.interval_secs"),
                reason: "interval must be at least one second".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: format!("distribution.{lane}.batch_size"),
                reason: "batch size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// How the outbox is split between the two lanes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSettings {
    pub local_domain: String,

    #[serde(default)]
    pub local: LaneSchedule,

    #[serde(default)]
    pub outer: LaneSchedule,
}

impl DistributionSettings {
    pub const fn schedule(&self, lane: Lane) -> LaneSchedule {
        match lane {
            Lane::Local => self.local,
            Lane::Outer => self.outer,
        }
    }

    pub fn predicate(&self) -> DomainPredicate {
        DomainPredicate::new(&self.local_domain)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_domain.trim().is_empty() {
            return Err(ConfigError::MissingValue("distribution.local_domain"));
        }
        Lane::ALL
            .iter()
            .try_for_each(|lane| self.schedule(*lane).validate(*lane))
    }
}

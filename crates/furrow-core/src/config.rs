//! Loading and validating `FurrowConfig` from TOML.
//!
//! ```toml
//! revision_ceiling = 2
//!
//! [guardrail]
//! jailbreak_patterns = ["ignore (all|any) previous instructions"]
//!
//! [[guardrail.allowed_topics]]
//! id = "weed-control"
//! category = "agronomy"
//! keywords = ["herbicide", "weed", "ryegrass"]
//!
//! [timeouts]
//! geospatial_ms = 2000
//! regulatory_ms = 3000
//! simulation_ms = 600000
//! plan_deadline_ms = 660000
//! request_deadline_ms = 1800000
//! poll_interval_ms = 250
//!
//! [jobs]
//! workers = 2
//! queue_depth = 8
//!
//! [sessions]
//! lease_timeout_ms = 30000
//! contention = "queue"
//! ```

use std::path::Path;

use furrow_contracts::{
    config::FurrowConfig,
    error::{FurrowError, FurrowResult},
};

/// Parse `s` as TOML and validate the result.
///
/// Returns `FurrowError::ConfigError` if the TOML is malformed, does not
/// match `FurrowConfig`, or fails validation.
pub fn from_toml_str(s: &str) -> FurrowResult<FurrowConfig> {
    let config: FurrowConfig = toml::from_str(s).map_err(|e| FurrowError::ConfigError {
        reason: format!("failed to parse configuration TOML: {}", e),
    })?;
    validate(&config)?;
    Ok(config)
}

/// Read the file at `path` and parse it with [`from_toml_str`].
pub fn from_file(path: &Path) -> FurrowResult<FurrowConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| FurrowError::ConfigError {
        reason: format!("failed to read configuration file '{}': {}", path.display(), e),
    })?;
    from_toml_str(&contents)
}

/// Reject configurations the runtime cannot honour.
pub fn validate(config: &FurrowConfig) -> FurrowResult<()> {
    let t = &config.timeouts;
    let named = [
        ("timeouts.geospatial_ms", t.geospatial_ms),
        ("timeouts.regulatory_ms", t.regulatory_ms),
        ("timeouts.simulation_ms", t.simulation_ms),
        ("timeouts.plan_deadline_ms", t.plan_deadline_ms),
        ("timeouts.request_deadline_ms", t.request_deadline_ms),
        ("timeouts.poll_interval_ms", t.poll_interval_ms),
        ("sessions.lease_timeout_ms", config.sessions.lease_timeout_ms),
    ];
    for (name, value) in named {
        if value == 0 {
            return Err(FurrowError::ConfigError {
                reason: format!("{name} must be greater than zero"),
            });
        }
    }

    if config.jobs.workers == 0 {
        return Err(FurrowError::ConfigError {
            reason: "jobs.workers must be at least 1".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.guardrail.min_confidence) {
        return Err(FurrowError::ConfigError {
            reason: "guardrail.min_confidence must be within 0.0..=1.0".to_string(),
        });
    }

    if config.guardrail.allowed_topics.is_empty() {
        return Err(FurrowError::ConfigError {
            reason: "guardrail.allowed_topics is empty; every query would be blocked".to_string(),
        });
    }

    Ok(())
}

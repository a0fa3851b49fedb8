//! Configuration loading and management.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generator::{ScenarioGenerator, WeightOverrides};

/// Main test configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    pub duration_secs: u64,
    #[serde(default)]
    pub warmup_secs: u64,
    /// RNG seed; user `i` is seeded with `seed + i`
    #[serde(default)]
    pub seed: Option<u64>,
    /// Time that TIME/RUN offsets are computed from (defaults to now)
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,
    pub users: Vec<UserGroup>,
    #[serde(default)]
    pub weight_overrides: WeightOverrides,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log_requests: bool, // Log all requests to file for debugging
}

/// A number of simulated users running one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    pub profile: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

fn default_request_timeout() -> u64 {
    30
}

impl TestConfig {
    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let config: TestConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse scenario {}", path.display()))?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.duration_secs == 0 {
            anyhow::bail!("duration_secs must be > 0");
        }
        if self.users.is_empty() {
            anyhow::bail!("at least one user group must be specified");
        }
        if let Some(group) = self.users.iter().find(|g| g.count == 0) {
            anyhow::bail!("user group for profile '{}' has count 0", group.profile);
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be > 0");
        }
        Ok(())
    }

    /// Check that every referenced profile exists in `generator`.
    pub fn validate_profiles(&self, generator: &ScenarioGenerator) -> anyhow::Result<()> {
        for group in &self.users {
            if !generator.has_profile(&group.profile) {
                anyhow::bail!(
                    "unknown profile '{}' (available: {})",
                    group.profile,
                    generator.profile_names().collect::<Vec<_>>().join(", ")
                );
            }
        }
        Ok(())
    }

    /// Scale every group's user count by `factor`, keeping at least one user per group.
    pub fn scale_users(&mut self, factor: f64) {
        for group in &mut self.users {
            group.count = ((group.count as f64 * factor).round() as u32).max(1);
        }
    }

    pub fn total_users(&self) -> u32 {
        self.users.iter().map(|g| g.count).sum()
    }

    /// Distinct profile names in configuration order.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for group in &self.users {
            if !names.contains(&group.profile) {
                names.push(group.profile.clone());
            }
        }
        names
    }
}

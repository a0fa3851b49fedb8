//! Weighted request generation over registered profiles.
//!
//! Registration happens once on a [`ScenarioGeneratorBuilder`]. The built
//! [`ScenarioGenerator`] is read-only and can be shared by every simulated
//! user; each user brings its own RNG.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, info};

use crate::catalog::{DomainCatalog, ParameterDomain};
use crate::descriptor::RequestDescriptor;
use crate::error::{ScenarioError, ScenarioResult};
use crate::profile::{Draw, Pacing, Profile, ScenarioRule};

/// Per-profile rule weight overrides: `profile -> rule -> weight`.
pub type WeightOverrides = BTreeMap<String, BTreeMap<String, u32>>;

/// Collects domains and profiles before generation starts.
#[derive(Debug, Default)]
pub struct ScenarioGeneratorBuilder {
    catalog: DomainCatalog,
    profiles: BTreeMap<String, Profile>,
    reference_time: Option<DateTime<Utc>>,
}

impl ScenarioGeneratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter domain. Names must be unique and domains non-empty.
    pub fn register_domain(
        &mut self,
        name: impl Into<String>,
        domain: ParameterDomain,
    ) -> ScenarioResult<&mut Self> {
        let name = name.into();
        debug!(domain = %name, values = domain.len(), "Registering domain");
        self.catalog.register_domain(name, domain)?;
        Ok(self)
    }

    /// Register a profile.
    ///
    /// Every rule weight must be positive, `pacing.min <= pacing.max`, and
    /// every domain a rule declares must already be registered.
    pub fn register_profile(
        &mut self,
        name: impl Into<String>,
        rules: Vec<ScenarioRule>,
        pacing: Pacing,
    ) -> ScenarioResult<&mut Self> {
        let name = name.into();
        if self.profiles.contains_key(&name) {
            return Err(ScenarioError::DuplicateProfile(name));
        }
        let profile = Profile::new(name.clone(), rules, pacing, &self.catalog)?;
        debug!(
            profile = %name,
            rules = profile.rules().len(),
            total_weight = profile.total_weight(),
            "Registering profile"
        );
        self.profiles.insert(name, profile);
        Ok(self)
    }

    /// Replace rule weights of already registered profiles.
    pub fn apply_weight_overrides(
        &mut self,
        overrides: &WeightOverrides,
    ) -> ScenarioResult<&mut Self> {
        for (profile_name, weights) in overrides {
            let profile = self
                .profiles
                .get(profile_name)
                .ok_or_else(|| ScenarioError::UnknownProfile(profile_name.clone()))?;
            let reweighted = profile.reweighted(weights, &self.catalog)?;
            info!(
                profile = %profile_name,
                total_weight = reweighted.total_weight(),
                "Applied weight overrides"
            );
            self.profiles.insert(profile_name.clone(), reweighted);
        }
        Ok(self)
    }

    /// Pin the time that relative TIME/RUN parameters are computed from.
    pub fn reference_time(&mut self, time: DateTime<Utc>) -> &mut Self {
        self.reference_time = Some(time);
        self
    }

    pub fn build(self) -> ScenarioGenerator {
        ScenarioGenerator {
            catalog: self.catalog,
            profiles: self.profiles,
            reference_time: self.reference_time.unwrap_or_else(Utc::now),
        }
    }
}

/// Read-only domain catalog and profile registry.
#[derive(Debug)]
pub struct ScenarioGenerator {
    catalog: DomainCatalog,
    profiles: BTreeMap<String, Profile>,
    reference_time: DateTime<Utc>,
}

impl ScenarioGenerator {
    pub fn builder() -> ScenarioGeneratorBuilder {
        ScenarioGeneratorBuilder::new()
    }

    /// Produce the next request for `profile_name`.
    ///
    /// One draw from `rng` selects the rule; the rule then draws its
    /// parameters from the same `rng`. A seeded `rng` reproduces the same
    /// sequence of descriptors.
    pub fn next_request<R: RngCore>(
        &self,
        profile_name: &str,
        rng: &mut R,
    ) -> ScenarioResult<RequestDescriptor> {
        let profile = self.profile(profile_name)?;
        let rule = profile.choose(rng);
        let mut draw = Draw::new(rule, &self.catalog, rng, self.reference_time);
        rule.render(&mut draw)
    }

    /// Delay before the next request of a user running `profile_name`.
    pub fn next_pacing_delay<R: RngCore>(
        &self,
        profile_name: &str,
        rng: &mut R,
    ) -> ScenarioResult<Duration> {
        Ok(self.profile(profile_name)?.pacing().sample(rng))
    }

    pub fn profile(&self, name: &str) -> ScenarioResult<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ScenarioError::UnknownProfile(name.to_string()))
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn catalog(&self) -> &DomainCatalog {
        &self.catalog
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }
}

//! Scenario rules, pacing intervals and weighted profiles.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};

use crate::catalog::DomainCatalog;
use crate::descriptor::RequestDescriptor;
use crate::error::{ScenarioError, ScenarioResult};

/// Signature of a request-construction rule.
pub type RuleFn = dyn Fn(&mut Draw<'_>) -> ScenarioResult<RequestDescriptor> + Send + Sync;

/// A weighted request-construction rule.
///
/// `domains` lists every catalog domain the rule draws from. It is checked
/// against the catalog when the owning profile is registered.
#[derive(Clone)]
pub struct ScenarioRule {
    name: String,
    weight: u32,
    domains: Vec<String>,
    build: Arc<RuleFn>,
}

impl ScenarioRule {
    pub fn new<F>(name: impl Into<String>, weight: u32, build: F) -> Self
    where
        F: Fn(&mut Draw<'_>) -> ScenarioResult<RequestDescriptor> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            weight,
            domains: Vec::new(),
            build: Arc::new(build),
        }
    }

    /// Declare the domains this rule draws from.
    pub fn uses<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains.extend(domains.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub(crate) fn with_weight(&self, weight: u32) -> Self {
        Self {
            weight,
            ..self.clone()
        }
    }

    pub(crate) fn render(&self, draw: &mut Draw<'_>) -> ScenarioResult<RequestDescriptor> {
        (self.build)(draw)
    }
}

impl fmt::Debug for ScenarioRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioRule")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("domains", &self.domains)
            .finish_non_exhaustive()
    }
}

/// What a rule sees while building one request: the catalog, the caller's
/// RNG and the run's reference time.
pub struct Draw<'a> {
    rule: &'a ScenarioRule,
    catalog: &'a DomainCatalog,
    rng: &'a mut dyn RngCore,
    reference_time: DateTime<Utc>,
}

impl<'a> Draw<'a> {
    pub(crate) fn new(
        rule: &'a ScenarioRule,
        catalog: &'a DomainCatalog,
        rng: &'a mut dyn RngCore,
        reference_time: DateTime<Utc>,
    ) -> Self {
        Self {
            rule,
            catalog,
            rng,
            reference_time,
        }
    }

    /// Draw a value uniformly from a declared domain.
    pub fn pick(&mut self, domain: &str) -> ScenarioResult<String> {
        if !self.rule.domains.iter().any(|d| d == domain) {
            return Err(ScenarioError::UndeclaredDomain {
                rule: self.rule.name.clone(),
                domain: domain.to_string(),
            });
        }
        let values = self
            .catalog
            .get(domain)
            .ok_or_else(|| ScenarioError::UnknownDomain {
                rule: self.rule.name.clone(),
                domain: domain.to_string(),
            })?;
        values
            .draw(&mut *self.rng)
            .ok_or_else(|| ScenarioError::EmptyDomain(domain.to_string()))
    }

    /// Draw a value from a declared integer domain.
    pub fn pick_int(&mut self, domain: &str) -> ScenarioResult<i64> {
        let value = self.pick(domain)?;
        value
            .parse()
            .map_err(|_| ScenarioError::NonNumericDomain(domain.to_string()))
    }

    /// Uniform integer in `[lo, hi]`, for values derived from earlier draws.
    pub fn int_in(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    pub fn rule_name(&self) -> &str {
        &self.rule.name
    }
}

/// Delay range between consecutive requests of one simulated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Pacing between `min_secs` and `max_secs` seconds. Negative and NaN
    /// inputs clamp to zero, values past `Duration::MAX` to `Duration::MAX`.
    pub fn between(min_secs: f64, max_secs: f64) -> Self {
        Self {
            min: secs_to_duration(min_secs),
            max: secs_to_duration(max_secs),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Uniform delay in `[min, max]`, at microsecond resolution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let lo = self.min.as_micros();
        let hi = self.max.as_micros();
        if hi <= lo {
            return self.min;
        }
        micros_to_duration(rng.gen_range(lo..=hi)).clamp(self.min, self.max)
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

fn micros_to_duration(micros: u128) -> Duration {
    let secs = u64::try_from(micros / 1_000_000).unwrap_or(u64::MAX);
    let nanos = (micros % 1_000_000) as u32 * 1_000;
    Duration::new(secs, nanos)
}

/// A named bundle of weighted rules plus a pacing interval.
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    rules: Vec<ScenarioRule>,
    pacing: Pacing,
    cumulative: Vec<u64>,
    total_weight: u64,
}

impl Profile {
    /// Validate and assemble a profile against `catalog`.
    pub(crate) fn new(
        name: String,
        rules: Vec<ScenarioRule>,
        pacing: Pacing,
        catalog: &DomainCatalog,
    ) -> ScenarioResult<Self> {
        if rules.is_empty() {
            return Err(ScenarioError::EmptyRuleSet(name));
        }
        if !pacing.is_valid() {
            return Err(ScenarioError::InvalidPacing {
                profile: name,
                min: pacing.min,
                max: pacing.max,
            });
        }

        let mut cumulative = Vec::with_capacity(rules.len());
        let mut total_weight = 0u64;
        for rule in &rules {
            if rule.weight == 0 {
                return Err(ScenarioError::InvalidWeight {
                    profile: name,
                    rule: rule.name.clone(),
                    weight: rule.weight,
                });
            }
            if let Some(missing) = rule.domains.iter().find(|d| !catalog.has_domain(d)) {
                return Err(ScenarioError::UnknownDomain {
                    rule: rule.name.clone(),
                    domain: missing.clone(),
                });
            }
            total_weight += u64::from(rule.weight);
            cumulative.push(total_weight);
        }

        Ok(Self {
            name,
            rules,
            pacing,
            cumulative,
            total_weight,
        })
    }

    /// Rebuild the profile with some rule weights replaced.
    pub(crate) fn reweighted<'o, I>(&self, overrides: I, catalog: &DomainCatalog) -> ScenarioResult<Self>
    where
        I: IntoIterator<Item = (&'o String, &'o u32)>,
    {
        let mut rules = self.rules.clone();
        for (rule_name, weight) in overrides {
            let rule = rules
                .iter_mut()
                .find(|r| &r.name == rule_name)
                .ok_or_else(|| ScenarioError::UnknownRule {
                    profile: self.name.clone(),
                    rule: rule_name.clone(),
                })?;
            *rule = rule.with_weight(*weight);
        }
        Self::new(self.name.clone(), rules, self.pacing, catalog)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[ScenarioRule] {
        &self.rules
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Index of the rule owning `point` in `[0, total_weight)`.
    ///
    /// Rule `i` owns the half-open interval `[cumulative[i-1], cumulative[i])`,
    /// so a point on a boundary belongs to the rule that starts there.
    pub fn rule_index_for(&self, point: u64) -> usize {
        self.cumulative.partition_point(|&c| c <= point)
    }

    /// Pick a rule by weight using one draw from `rng`.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &ScenarioRule {
        let point = rng.gen_range(0..self.total_weight);
        &self.rules[self.rule_index_for(point)]
    }

    /// Configured selection probability of the rule at `index`.
    pub fn probability(&self, index: usize) -> f64 {
        self.rules
            .get(index)
            .map(|r| f64::from(r.weight) / self.total_weight as f64)
            .unwrap_or(0.0)
    }
}

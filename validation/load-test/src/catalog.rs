//! Parameter domains and the catalog that holds them.
//!
//! A domain is a named, enumerable set of candidate values for one request
//! parameter (layer names, bounding boxes, image sizes, ...). The catalog is
//! filled once at startup and only read afterwards.

use std::collections::BTreeMap;

use rand::Rng;

use crate::error::{ScenarioError, ScenarioResult};

/// An enumerable set of candidate parameter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterDomain {
    /// An explicit, ordered list of values.
    Values(Vec<String>),
    /// Integers `min, min + step, ...` up to and including `max`.
    Range { min: i64, max: i64, step: u32 },
}

impl ParameterDomain {
    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParameterDomain::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn range(min: i64, max: i64, step: u32) -> Self {
        ParameterDomain::Range { min, max, step }
    }

    /// Number of members in the domain, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        match self {
            ParameterDomain::Values(values) => values.len(),
            ParameterDomain::Range { .. } => {
                usize::try_from(self.range_count()).unwrap_or(usize::MAX)
            }
        }
    }

    /// Exact member count. A full `i64` range does not fit in `usize`.
    fn range_count(&self) -> u128 {
        match self {
            ParameterDomain::Values(values) => values.len() as u128,
            ParameterDomain::Range { min, max, step } => {
                if *step == 0 || min > max {
                    0
                } else {
                    let span = (i128::from(*max) - i128::from(*min)) as u128;
                    span / u128::from(*step) + 1
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.range_count() == 0
    }

    /// The member at `index` in enumeration order.
    pub fn value_at(&self, index: usize) -> Option<String> {
        match self {
            ParameterDomain::Values(values) => values.get(index).cloned(),
            ParameterDomain::Range { .. } => self.range_value(index as u128),
        }
    }

    fn range_value(&self, index: u128) -> Option<String> {
        let ParameterDomain::Range { min, step, .. } = self else {
            return None;
        };
        if index >= self.range_count() {
            return None;
        }
        // index * step <= max - min, so the sum stays inside [min, max]
        let offset = (index * u128::from(*step)) as i128;
        Some((i128::from(*min) + offset).to_string())
    }

    /// Whether `value` is a member of the domain.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            ParameterDomain::Values(values) => values.iter().any(|v| v == value),
            ParameterDomain::Range { min, max, step } => {
                if *step == 0 {
                    return false;
                }
                match value.parse::<i64>() {
                    Ok(v) => {
                        v >= *min
                            && v <= *max
                            && (i128::from(v) - i128::from(*min)) % i128::from(*step) == 0
                    }
                    Err(_) => false,
                }
            }
        }
    }

    /// Draw one member uniformly at random. Returns `None` for an empty domain.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        match self {
            ParameterDomain::Values(values) if values.is_empty() => None,
            ParameterDomain::Values(values) => values.get(rng.gen_range(0..values.len())).cloned(),
            ParameterDomain::Range { .. } => {
                let count = self.range_count();
                if count == 0 {
                    return None;
                }
                self.range_value(rng.gen_range(0..count))
            }
        }
    }
}

/// Named parameter domains, keyed by domain name.
#[derive(Debug, Clone, Default)]
pub struct DomainCatalog {
    domains: BTreeMap<String, ParameterDomain>,
}

impl DomainCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new domain.
    ///
    /// Fails if the name is taken or the domain has no members.
    pub fn register_domain(
        &mut self,
        name: impl Into<String>,
        domain: ParameterDomain,
    ) -> ScenarioResult<()> {
        let name = name.into();
        if self.domains.contains_key(&name) {
            return Err(ScenarioError::DuplicateDomain(name));
        }
        if domain.is_empty() {
            return Err(ScenarioError::EmptyDomain(name));
        }
        self.domains.insert(name, domain);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDomain> {
        self.domains.get(name)
    }

    pub fn has_domain(&self, name: &str) -> bool {
        self.domains.contains_key(name)
    }

    /// Whether `value` belongs to the domain called `name`.
    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.domains
            .get(name)
            .map(|d| d.contains(value))
            .unwrap_or(false)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

//! Error types for scenario registration and request generation.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using ScenarioError.
pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// Errors raised by the domain catalog and scenario generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    // === Construction-time errors ===
    #[error("Domain already registered: {0}")]
    DuplicateDomain(String),

    #[error("Domain has no values: {0}")]
    EmptyDomain(String),

    #[error("Profile already registered: {0}")]
    DuplicateProfile(String),

    #[error("Profile has no rules: {0}")]
    EmptyRuleSet(String),

    #[error("Invalid weight {weight} for rule '{rule}' in profile '{profile}': must be positive")]
    InvalidWeight {
        profile: String,
        rule: String,
        weight: u32,
    },

    #[error("Invalid pacing for profile '{profile}': min {min:?} exceeds max {max:?}")]
    InvalidPacing {
        profile: String,
        min: Duration,
        max: Duration,
    },

    #[error("Rule '{rule}' references unregistered domain '{domain}'")]
    UnknownDomain { rule: String, domain: String },

    #[error("Profile '{profile}' has no rule named '{rule}'")]
    UnknownRule { profile: String, rule: String },

    // === Runtime errors ===
    #[error("Profile not found: {0}")]
    UnknownProfile(String),

    #[error("Rule '{rule}' drew from undeclared domain '{domain}'")]
    UndeclaredDomain { rule: String, domain: String },

    #[error("Domain '{0}' does not hold integers")]
    NonNumericDomain(String),
}

impl ScenarioError {
    /// Whether this error can only be raised while the generator is being built.
    pub fn is_construction_error(&self) -> bool {
        !matches!(
            self,
            ScenarioError::UnknownProfile(_)
                | ScenarioError::UndeclaredDomain { .. }
                | ScenarioError::NonNumericDomain(_)
        )
    }
}

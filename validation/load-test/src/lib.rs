//! Load testing framework for a WMS/tile map serving stack.
//!
//! This crate provides tools to:
//! - Describe simulated user behaviour as weighted request profiles
//! - Generate reproducible WMS GetMap/GetCapabilities and tile requests
//! - Run many simulated users against a server with per-profile pacing
//! - Collect per-request-name performance metrics
//! - Output results in multiple formats (console, JSON, CSV)

pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod profile;
pub mod report;
pub mod runner;
pub mod wms;

pub use catalog::{DomainCatalog, ParameterDomain};
pub use config::{TestConfig, UserGroup};
pub use descriptor::RequestDescriptor;
pub use dispatch::{Dispatch, FetchOutcome, HttpDispatcher};
pub use error::{ScenarioError, ScenarioResult};
pub use generator::{ScenarioGenerator, ScenarioGeneratorBuilder, WeightOverrides};
pub use metrics::{MetricsCollector, RequestSummary, TestResults};
pub use profile::{Draw, Pacing, Profile, ScenarioRule};
pub use report::ResultsReport;
pub use runner::LoadRunner;

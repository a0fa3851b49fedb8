//! Simulated-user orchestration.
//!
//! Each simulated user is a tokio task that owns its own RNG and repeatedly
//! asks the shared [`ScenarioGenerator`] for a request, dispatches it, records
//! the outcome and sleeps for the profile's pacing delay.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::TestConfig;
use crate::descriptor::RequestDescriptor;
use crate::dispatch::{Dispatch, FetchOutcome};
use crate::error::ScenarioResult;
use crate::generator::ScenarioGenerator;
use crate::metrics::{MetricsCollector, TestResults};

/// A single logged request for debugging and visualization.
#[derive(Debug, Serialize)]
pub struct RequestLog<'a> {
    pub timestamp_ms: u64,
    pub user: u64,
    pub profile: &'a str,
    pub request: &'a RequestDescriptor,
    pub latency_ms: f64,
    pub cache_status: &'static str,
    pub status: u16,
}

type SharedLog = Arc<Mutex<BufWriter<File>>>;

/// Executes load tests with one task per simulated user.
pub struct LoadRunner<D> {
    config: TestConfig,
    generator: Arc<ScenarioGenerator>,
    dispatcher: Arc<D>,
    results_dir: PathBuf,
    show_progress: bool,
    scenario_name: Option<String>,
}

/// Everything one simulated user task needs.
struct UserContext<D> {
    user: u64,
    profile: String,
    generator: Arc<ScenarioGenerator>,
    dispatcher: Arc<D>,
    metrics: Arc<Mutex<MetricsCollector>>,
    request_log: Option<SharedLog>,
    start: Instant,
    measure_from: Instant,
    deadline: Instant,
}

impl<D: Dispatch + 'static> LoadRunner<D> {
    /// Create a new load runner.
    pub fn new(config: TestConfig, generator: Arc<ScenarioGenerator>, dispatcher: D) -> Self {
        Self {
            config,
            generator,
            dispatcher: Arc::new(dispatcher),
            results_dir: PathBuf::from("results"),
            show_progress: true,
            scenario_name: None,
        }
    }

    /// Directory that request logs are written to.
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Name the scenario in results, usually the scenario file stem.
    /// Defaults to the configuration name.
    pub fn with_scenario_name(mut self, name: impl Into<String>) -> Self {
        self.scenario_name = Some(name.into());
        self
    }

    /// Run the load test.
    pub async fn run(&self) -> anyhow::Result<TestResults> {
        self.config.validate()?;
        self.config.validate_profiles(&self.generator)?;

        let warmup = Duration::from_secs(self.config.warmup_secs);
        let duration = Duration::from_secs(self.config.duration_secs);

        info!(
            scenario = %self.config.name,
            users = self.config.total_users(),
            warmup_secs = self.config.warmup_secs,
            duration_secs = self.config.duration_secs,
            seed = ?self.config.seed,
            "Starting load test"
        );

        let request_log = if self.config.log_requests {
            Some(self.open_request_log()?)
        } else {
            None
        };

        let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
        let start = Instant::now();
        let measure_from = start + warmup;
        let deadline = measure_from + duration;

        let mut handles = Vec::with_capacity(self.config.total_users() as usize);
        let mut user = 0u64;
        for group in &self.config.users {
            for _ in 0..group.count {
                let rng = match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(user)),
                    None => StdRng::from_entropy(),
                };
                let ctx = UserContext {
                    user,
                    profile: group.profile.clone(),
                    generator: self.generator.clone(),
                    dispatcher: self.dispatcher.clone(),
                    metrics: metrics.clone(),
                    request_log: request_log.clone(),
                    start,
                    measure_from,
                    deadline,
                };
                handles.push(tokio::spawn(run_user(ctx, rng)));
                user += 1;
            }
        }

        self.track_progress(start, measure_from, deadline).await;

        let mut issued = 0u64;
        for joined in futures::future::join_all(handles).await {
            issued += joined??;
        }
        debug!(issued, "All simulated users finished");

        if let Some(log) = &request_log {
            log.lock().await.flush()?;
        }

        let m = metrics.lock().await;
        Ok(m.results(
            self.config.name.clone(),
            self.scenario_name
                .clone()
                .unwrap_or_else(|| self.config.name.clone()),
            self.config.profile_names(),
            self.config.total_users(),
            self.config.seed,
            duration,
        ))
    }

    fn open_request_log(&self) -> anyhow::Result<SharedLog> {
        std::fs::create_dir_all(&self.results_dir)?;
        let stem = self.config.name.replace(' ', "_").to_lowercase();
        let log_path = self.results_dir.join(format!(
            "{}_{}.jsonl",
            stem,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));
        info!(path = %log_path.display(), "Logging requests");
        let file = File::create(&log_path)?;
        Ok(Arc::new(Mutex::new(BufWriter::new(file))))
    }

    async fn track_progress(&self, start: Instant, measure_from: Instant, deadline: Instant) {
        let pb = if self.show_progress {
            ProgressBar::new(self.config.duration_secs)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if now < measure_from {
                pb.set_message(format!(
                    "Warmup ({}/{}s)",
                    (now - start).as_secs(),
                    self.config.warmup_secs
                ));
            } else {
                pb.set_message("Test phase");
                pb.set_position((now - measure_from).as_secs().min(self.config.duration_secs));
            }
            sleep(Duration::from_secs(1).min(deadline - now)).await;
        }

        pb.finish_with_message("Waiting for in-flight requests...");
    }
}

/// Drive one simulated user until the deadline. Returns the number of
/// requests it issued.
async fn run_user<D: Dispatch>(ctx: UserContext<D>, mut rng: StdRng) -> ScenarioResult<u64> {
    let mut issued = 0u64;

    while Instant::now() < ctx.deadline {
        let request = ctx.generator.next_request(&ctx.profile, &mut rng)?;
        let sent_at = Instant::now();
        let outcome = ctx.dispatcher.fetch(&request).await;
        issued += 1;

        // Results from the warmup phase are discarded
        if sent_at >= ctx.measure_from {
            record(&ctx, &request, &outcome, sent_at).await;
        }

        let delay = ctx.generator.next_pacing_delay(&ctx.profile, &mut rng)?;
        let wake = Instant::now() + delay;
        if wake >= ctx.deadline {
            break;
        }
        sleep_until(wake).await;
    }

    Ok(issued)
}

async fn record<D>(
    ctx: &UserContext<D>,
    request: &RequestDescriptor,
    outcome: &FetchOutcome,
    sent_at: Instant,
) {
    if let Some(err) = &outcome.error {
        warn!(user = ctx.user, request = %request.name, path = %request.path, error = %err, "Request failed");
    } else if !outcome.is_success() {
        warn!(user = ctx.user, request = %request.name, status = outcome.status, "Request returned error status");
    }

    ctx.metrics.lock().await.record(&request.name, outcome);

    if let Some(log) = &ctx.request_log {
        let entry = RequestLog {
            timestamp_ms: (sent_at - ctx.start).as_millis() as u64,
            user: ctx.user,
            profile: &ctx.profile,
            request,
            latency_ms: outcome.elapsed.as_micros() as f64 / 1000.0,
            cache_status: if outcome.cache_hit { "HIT" } else { "MISS" },
            status: outcome.status,
        };
        match serde_json::to_string(&entry) {
            Ok(json) => {
                let mut writer = log.lock().await;
                if let Err(e) = writeln!(writer, "{}", json) {
                    warn!(error = %e, "Failed to write request log");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize request log entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParameterDomain;
    use crate::profile::{Pacing, ScenarioRule};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Records every dispatched request instead of sending it.
    #[derive(Default)]
    struct RecordingDispatcher {
        seen: StdMutex<Vec<RequestDescriptor>>,
        status: u16,
    }

    #[async_trait]
    impl Dispatch for RecordingDispatcher {
        async fn fetch(&self, request: &RequestDescriptor) -> FetchOutcome {
            self.seen.lock().unwrap().push(request.clone());
            FetchOutcome {
                status: self.status,
                bytes: 100,
                elapsed: Duration::from_millis(5),
                cache_hit: false,
                error: None,
            }
        }
    }

    fn generator() -> Arc<ScenarioGenerator> {
        let mut builder = ScenarioGenerator::builder();
        builder
            .register_domain("layers", ParameterDomain::values(["t2m", "mslp"]))
            .unwrap()
            .register_profile(
                "P",
                vec![ScenarioRule::new("getmap", 10, |draw| {
                    Ok(RequestDescriptor::new("getmap", "/cgi-bin/mapserv")
                        .param("LAYERS", draw.pick("layers")?))
                })
                .uses(["layers"])],
                Pacing::new(Duration::from_millis(500), Duration::from_millis(500)),
            )
            .unwrap();
        Arc::new(builder.build())
    }

    fn config(users: u32, warmup_secs: u64) -> TestConfig {
        serde_yaml::from_str(&format!(
            r#"
name: runner test
base_url: http://localhost
duration_secs: 10
warmup_secs: {warmup_secs}
seed: 7
users:
  - profile: P
    count: {users}
"#
        ))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_pace_requests() {
        let dispatcher = RecordingDispatcher {
            status: 200,
            ..Default::default()
        };
        let runner = LoadRunner::new(config(2, 0), generator(), dispatcher).with_progress(false);

        let results = runner.run().await.unwrap();

        // 10s at one request per 500ms, per user
        assert_eq!(results.total_requests, 40);
        assert_eq!(results.successful_requests, 40);
        assert_eq!(results.users, 2);
        assert_eq!(results.scenario_name, "runner test");
        assert_eq!(results.requests.len(), 1);
        assert_eq!(results.requests[0].name, "getmap");
        assert!((results.requests_per_second - 4.0).abs() < 1e-9);

        let seen = runner.dispatcher.seen.lock().unwrap();
        assert_eq!(seen.len(), 40);
        assert!(seen
            .iter()
            .all(|r| matches!(r.get("LAYERS"), Some("t2m") | Some("mslp"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_is_not_recorded() {
        let dispatcher = RecordingDispatcher {
            status: 503,
            ..Default::default()
        };
        let runner = LoadRunner::new(config(1, 2), generator(), dispatcher)
            .with_scenario_name("warmup")
            .with_progress(false);

        let results = runner.run().await.unwrap();

        assert_eq!(runner.dispatcher.seen.lock().unwrap().len(), 24);
        assert_eq!(results.total_requests, 20);
        assert_eq!(results.failed_requests, 20);
        assert_eq!(results.scenario_name, "warmup");
        assert_eq!(results.config_name, "runner test");
        assert_eq!(results.requests[0].status_counts[&503], 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_profile_is_rejected() {
        let mut config = config(1, 0);
        config.users[0].profile = "missing".to_string();
        let runner = LoadRunner::new(config, generator(), RecordingDispatcher::default())
            .with_progress(false);

        assert!(runner.run().await.is_err());
        assert!(runner.dispatcher.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_log_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(1, 0);
        config.log_requests = true;
        let runner = LoadRunner::new(
            config,
            generator(),
            RecordingDispatcher {
                status: 200,
                ..Default::default()
            },
        )
        .with_results_dir(dir.path())
        .with_progress(false);

        runner.run().await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let path = entries[0].as_ref().unwrap().path();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("runner_test_"));

        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 20);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["profile"], "P");
        assert_eq!(first["request"]["path"], "/cgi-bin/mapserv");
        assert_eq!(first["cache_status"], "MISS");
    }
}

//! Results reporting and formatting.

use crate::metrics::TestResults;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats test results for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as console tables: a summary plus one row per request name.
    pub fn format_table(results: &TestResults) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Test Results: {}", results.config_name)]);

        table.add_row(vec!["Scenario:", results.scenario_name.as_str()]);
        table.add_row(vec!["Duration:", &format!("{:.1}s", results.duration_secs)]);
        table.add_row(vec![
            "Users:",
            &format!("{} ({})", results.users, results.profiles.join(", ")),
        ]);
        table.add_row(vec![
            "Total Requests:",
            &format!("{}", results.total_requests),
        ]);
        table.add_row(vec![
            "Success Rate:",
            &format!("{:.1}%", results.success_rate()),
        ]);
        table.add_row(vec![
            "Requests/sec:",
            &format!("{:.1}", results.requests_per_second),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                results.latency_p50,
                results.latency_p90,
                results.latency_p95,
                results.latency_p99,
                results.latency_max
            ),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec![
            "Cache Hit Rate:",
            &format!("{:.1}%", results.cache_hit_rate),
        ]);
        table.add_row(vec![
            "Throughput:",
            &format!("{:.1} MB/s", results.bytes_per_second / 1_000_000.0),
        ]);

        if results.requests.is_empty() {
            return table.to_string();
        }

        let mut breakdown = Table::new();
        breakdown
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                "Request", "Count", "Failed", "Req/s", "p50", "p95", "p99", "max",
            ]);
        for req in &results.requests {
            breakdown.add_row(vec![
                req.name.clone(),
                req.total_requests.to_string(),
                req.failed_requests.to_string(),
                format!("{:.1}", req.requests_per_second),
                format!("{:.1}", req.latency_p50),
                format!("{:.1}", req.latency_p95),
                format!("{:.1}", req.latency_p99),
                format!("{:.1}", req.latency_max),
            ]);
        }

        format!("{table}\n{breakdown}")
    }

    /// Format results as JSON.
    pub fn format_json(results: &TestResults) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(results)?)
    }

    /// Format results as CSV row.
    pub fn format_csv(results: &TestResults) -> String {
        format!(
            "{},{},{},{},{},{:.1},{:.1},{:.1},{:.1},{:.1}",
            results.timestamp,
            results.config_name,
            results.users,
            results.duration_secs,
            results.total_requests,
            results.requests_per_second,
            results.latency_p50,
            results.latency_p90,
            results.latency_p99,
            results.cache_hit_rate
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,config,users,duration,requests,rps,p50,p90,p99,cache_hit_rate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::FetchOutcome;
    use crate::metrics::MetricsCollector;
    use std::time::Duration;

    fn results() -> TestResults {
        let mut metrics = MetricsCollector::new();
        for millis in [10, 20, 30] {
            metrics.record(
                "GetMap [GFS]",
                &FetchOutcome {
                    status: 200,
                    bytes: 2048,
                    elapsed: Duration::from_millis(millis),
                    cache_hit: false,
                    error: None,
                },
            );
        }
        metrics.results(
            "smoke".to_string(),
            "nightly".to_string(),
            vec!["baseline".to_string()],
            3,
            Some(1),
            Duration::from_secs(3),
        )
    }

    #[test]
    fn test_table_includes_breakdown() {
        let table = ResultsReport::format_table(&results());
        assert!(table.contains("Load Test Results: smoke"));
        assert!(table.contains("Scenario:"));
        assert!(table.contains("nightly"));
        assert!(table.contains("GetMap [GFS]"));
        assert!(table.contains("100.0%"));
    }

    #[test]
    fn test_csv_matches_header() {
        let row = ResultsReport::format_csv(&results());
        assert_eq!(
            row.split(',').count(),
            ResultsReport::csv_header().split(',').count()
        );
    }

    #[test]
    fn test_json_round_trips() {
        let json = ResultsReport::format_json(&results()).unwrap();
        let parsed: TestResults = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_requests, 3);
        assert_eq!(parsed.scenario_name, "nightly");
        assert_eq!(parsed.requests[0].name, "GetMap [GFS]");
    }
}

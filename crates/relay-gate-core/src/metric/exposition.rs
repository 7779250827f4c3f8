//! Prometheus text exposition rendering.
//!
//! Converts typed samples into the line protocol accepted by the
//! Pushgateway. One `# HELP`/`# TYPE` pair is emitted per unique metric
//! name, at its first occurrence, regardless of how many samples share the
//! name. Label values are escaped, so values containing quotes or newlines
//! cannot corrupt the output.

use crate::metric::sample::{MetricKind, MetricSample};
use std::collections::HashSet;
use std::fmt::Write;

/// Render a sample list as exposition text.
///
/// Sample order is preserved. Histogram samples expand into cumulative
/// `_bucket` lines plus `_sum` and `_count`.
pub fn render(samples: &[MetricSample]) -> String {
    let mut out = String::new();
    let mut headered: HashSet<&str> = HashSet::new();

    for sample in samples {
        if headered.insert(sample.name.as_str()) {
            let _ = writeln!(out, "# HELP {} {}", sample.name, escape_help(&sample.help));
            let _ = writeln!(out, "# TYPE {} {}", sample.name, sample.kind.as_str());
        }

        match sample.kind {
            MetricKind::Gauge | MetricKind::Counter => {
                let _ = writeln!(
                    out,
                    "{}{} {}",
                    sample.name,
                    render_labels(sample, &[]),
                    sample.value
                );
            }
            MetricKind::Histogram => render_histogram(&mut out, sample),
        }
    }

    out
}

/// Expand a single observation into a cumulative bucket series.
fn render_histogram(out: &mut String, sample: &MetricSample) {
    for bound in &sample.buckets {
        let hit = if sample.value <= *bound { 1 } else { 0 };
        let le = format!("{}", bound);
        let _ = writeln!(
            out,
            "{}_bucket{} {}",
            sample.name,
            render_labels(sample, &[("le", &le)]),
            hit
        );
    }
    let _ = writeln!(
        out,
        "{}_bucket{} 1",
        sample.name,
        render_labels(sample, &[("le", "+Inf")])
    );
    let _ = writeln!(out, "{}_sum{} {}", sample.name, render_labels(sample, &[]), sample.value);
    let _ = writeln!(out, "{}_count{} 1", sample.name, render_labels(sample, &[]));
}

/// Render `{k="v",...}` with the sample labels plus any extras, or an empty
/// string when there are none.
fn render_labels(sample: &MetricSample, extra: &[(&str, &str)]) -> String {
    if sample.labels.is_empty() && extra.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<String> = sample
        .labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();
    for (k, v) in extra {
        pairs.push(format!("{}=\"{}\"", k, escape_label_value(v)));
    }

    format!("{{{}}}", pairs.join(","))
}

/// Escape a label value per the exposition format: backslash, double quote
/// and newline.
fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// HELP text allows everything but raw newlines and backslashes.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::sample::DEPLOY_DURATION_BUCKETS;

    #[test]
    fn test_single_gauge() {
        let samples = vec![MetricSample::gauge(
            "deployment_in_progress",
            "Whether a deployment is running",
            1.0,
        )
        .label("environment", "staging")
        .label("deployment_id", "1718000000")];

        let text = render(&samples);
        assert!(text.contains("# HELP deployment_in_progress Whether a deployment is running\n"));
        assert!(text.contains("# TYPE deployment_in_progress gauge\n"));
        assert!(text.contains(
            "deployment_in_progress{deployment_id=\"1718000000\",environment=\"staging\"} 1\n"
        ));
    }

    #[test]
    fn test_help_type_deduplicated_per_name() {
        let samples = vec![
            MetricSample::counter("smoke_test_total", "Smoke test outcomes", 1.0)
                .label("test_name", "login"),
            MetricSample::counter("smoke_test_total", "Smoke test outcomes", 1.0)
                .label("test_name", "stream"),
            MetricSample::gauge("post_deployment_error_rate", "Post-deploy error rate", 0.02),
        ];

        let text = render(&samples);
        assert_eq!(text.matches("# HELP smoke_test_total").count(), 1);
        assert_eq!(text.matches("# TYPE smoke_test_total").count(), 1);
        assert_eq!(text.matches("# HELP post_deployment_error_rate").count(), 1);
        // One data line per sample survives the dedup.
        assert_eq!(text.matches("smoke_test_total{").count(), 2);
    }

    #[test]
    fn test_label_value_escaping() {
        let samples = vec![MetricSample::counter(
            "deployment_errors_total",
            "Deployment errors",
            1.0,
        )
        .label("error_type", "bad \"quote\"\nand\\slash")];

        let text = render(&samples);
        assert!(text.contains(r#"error_type="bad \"quote\"\nand\\slash""#));
        // The rendered body must stay one data line.
        let data_lines: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("deployment_errors_total{"))
            .collect();
        assert_eq!(data_lines.len(), 1);
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let samples = vec![MetricSample::histogram(
            "time_to_deploy_seconds",
            "End-to-end deploy duration",
            720.0,
            &DEPLOY_DURATION_BUCKETS,
        )];

        let text = render(&samples);
        assert!(text.contains("# TYPE time_to_deploy_seconds histogram\n"));
        assert!(text.contains("time_to_deploy_seconds_bucket{le=\"600\"} 0\n"));
        assert!(text.contains("time_to_deploy_seconds_bucket{le=\"900\"} 1\n"));
        assert!(text.contains("time_to_deploy_seconds_bucket{le=\"1800\"} 1\n"));
        assert!(text.contains("time_to_deploy_seconds_bucket{le=\"+Inf\"} 1\n"));
        assert!(text.contains("time_to_deploy_seconds_sum 720\n"));
        assert!(text.contains("time_to_deploy_seconds_count 1\n"));
    }

    #[test]
    fn test_no_labels_renders_bare_name() {
        let samples = vec![MetricSample::gauge("database_migration_lag_seconds", "Lag", 3.5)];
        let text = render(&samples);
        assert!(text.contains("database_migration_lag_seconds 3.5\n"));
    }
}

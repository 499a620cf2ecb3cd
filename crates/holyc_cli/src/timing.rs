//! Phase-timing report output.

use holyc_compiler::PhaseTiming;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct TimingPhase<'a> {
    name: &'a str,
    seconds: f64,
}

#[derive(Serialize)]
struct TimingReport<'a> {
    command: &'a str,
    phases: Vec<TimingPhase<'a>>,
}

/// Print the stderr table and, when requested, write the JSON report.
pub fn report(
    command: &str,
    enabled: bool,
    json_path: Option<&Path>,
    timings: &[PhaseTiming],
) {
    if !enabled || timings.is_empty() {
        return;
    }

    eprintln!("phase timings [{command}]");
    for phase in timings {
        eprintln!("  {:<24} {:.6} s", phase.name, phase.seconds);
    }

    let Some(json_path) = json_path else {
        return;
    };
    let report = TimingReport {
        command,
        phases: timings
            .iter()
            .map(|t| TimingPhase { name: &t.name, seconds: t.seconds })
            .collect(),
    };
    if let Some(parent) = json_path.parent() {
        if !parent.as_os_str().is_empty() {
            if std::fs::create_dir_all(parent).is_err() {
                eprintln!(
                    "warning: failed to create timing output directory: {}",
                    parent.display()
                );
                return;
            }
        }
    }
    match serde_json::to_string_pretty(&report) {
        Ok(serialized) => {
            if std::fs::write(json_path, serialized + "\n").is_err() {
                eprintln!("warning: failed writing timing output file: {}", json_path.display());
            }
        }
        Err(err) => eprintln!("warning: failed to serialize timing report: {err}"),
    }
}

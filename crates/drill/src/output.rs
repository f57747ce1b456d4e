//! Terminal output

use colored::Colorize;
use drill_lib::record::{FlaggedEntry, IntervalAnalysis};
use drill_lib::topology::CandidateEntities;
use drill_lib::window::ResolvedWindows;
use drill_lib::FaultInterval;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct FlaggedRow {
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Normal mean")]
    normal_mean: String,
    #[tabled(rename = "Fault mean")]
    fault_mean: String,
    #[tabled(rename = "Ratio")]
    ratio: String,
}

impl From<&FlaggedEntry<'_>> for FlaggedRow {
    fn from(entry: &FlaggedEntry<'_>) -> Self {
        Self {
            scope: entry.scope.to_string(),
            entity: entry.entity.clone(),
            metric: entry.metric.to_string(),
            normal_mean: format_value(entry.comparison.normal_stats.mean),
            fault_mean: format_value(entry.comparison.fault_stats.mean),
            ratio: color_ratio(entry.comparison.ratio),
        }
    }
}

#[derive(Tabled)]
struct WindowRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Start (ns)")]
    start: i64,
    #[tabled(rename = "End (ns)")]
    end: i64,
}

/// Summary of one analysed interval
pub fn print_analysis(analysis: &IntervalAnalysis) {
    let entries = analysis.metrics.entries();
    let header = format!(
        "[{}] {} ({}), {} baseline window(s)",
        analysis.index,
        analysis.uuid,
        analysis.date,
        analysis.baseline_windows.len()
    );

    if entries.is_empty() {
        print_info(&format!("{}: no changed metrics", header));
        return;
    }

    print_warning(&format!("{}: {} changed metric(s)", header, entries.len()));
    let rows: Vec<FlaggedRow> = entries.iter().map(FlaggedRow::from).collect();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);

    for (service, shortlist) in &analysis.shortlists {
        if !shortlist.is_empty() {
            println!("  {} {}: {}", "shortlist".dimmed(), service, shortlist.join(", "));
        }
    }
}

/// Resolved fault and baseline windows of one interval
pub fn print_windows(interval: &FaultInterval, index: usize, windows: &ResolvedWindows) {
    println!(
        "{} [{}] {} ({})",
        "Interval".bold(),
        index,
        interval.uuid,
        interval.date
    );

    let mut rows = vec![WindowRow {
        kind: "fault".red().to_string(),
        start: windows.fault.start_ts_ns,
        end: windows.fault.end_ts_ns,
    }];
    rows.extend(windows.baseline.iter().map(|w| WindowRow {
        kind: "baseline".green().to_string(),
        start: w.start_ts_ns,
        end: w.end_ts_ns,
    }));
    println!("{}", Table::new(rows).with(Style::rounded()));

    if !windows.has_baseline() {
        print_warning("No baseline window; nothing can be judged changed");
    }
}

pub fn print_candidates(candidates: &CandidateEntities) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(candidates)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_value(value: f64) -> String {
    if value != 0.0 && (value.abs() >= 1e6 || value.abs() < 1e-3) {
        format!("{:.3e}", value)
    } else {
        format!("{:.3}", value)
    }
}

/// Increases in red, decreases in cyan
pub fn color_ratio(ratio: f64) -> String {
    let formatted = format!("{:.2}x", ratio);
    if ratio > 1.0 {
        formatted.red().to_string()
    } else {
        formatted.cyan().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.0), "0.000");
        assert_eq!(format_value(42.5), "42.500");
        assert_eq!(format_value(2_500_000.0), "2.500e6");
        assert_eq!(format_value(0.0004), "4.000e-4");
    }

    #[test]
    fn test_color_ratio_keeps_value() {
        colored::control::set_override(false);
        assert_eq!(color_ratio(4.5), "4.50x");
        assert_eq!(color_ratio(0.25), "0.25x");
    }
}

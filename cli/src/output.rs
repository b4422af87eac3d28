//! Output formatting utilities for CLI commands

use std::sync::OnceLock;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use querybench_shared::utils::format_megabytes;
use querybench_shared::{AccumulatorState, BenchSummary};

const RULE_WIDTH: usize = 80;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

fn rule() {
    println!("{}", "-".repeat(RULE_WIDTH));
}

/// Print one finished round
pub fn round(round: u32, state: &AccumulatorState) {
    rule();
    println!("{}", format!("ROUND {}:", round).bold());
    println!(
        "Total items: {}, queries: {}, RCUs: {}, time: {:.1} ms, size: ~{} MB",
        state.items_retrieved,
        state.queries_issued,
        state.consumed_capacity,
        state.elapsed_ms,
        format_megabytes(state.bytes)
    );
}

/// Print the grand totals of a run
pub fn grand_totals(summary: &BenchSummary) {
    let totals = &summary.totals;
    rule();
    println!("{}", "GRAND TOTALS:".bold());
    println!("\tRounds: {}", totals.rounds);
    println!("\tItems queried: {}", totals.items_retrieved);
    println!("\tQueries issued: {}", totals.queries_issued);
    println!("\tConsumed capacity: {} RCU", totals.consumed_capacity);
    println!("\tData read: ~{} MB", format_megabytes(totals.bytes));
    println!("\tElapsed time: {:.1} ms", totals.elapsed_ms);
    println!(
        "\tAvg. time per item: {}",
        format!("{:.3} ms", summary.avg_ms_per_item).green()
    );
    rule();
}

/// Progress bar over a known number of items
pub fn progress_bar(len: u64, msg: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message(msg);
    bar
}

/// Spinner for work whose size is not known up front
pub fn spinner(msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner} {msg} {pos} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(msg);
    spinner
}

/// Spinner that stays hidden until [`DeferredSpinner::start`] is called
pub struct DeferredSpinner {
    msg: &'static str,
    bar: OnceLock<ProgressBar>,
}

impl DeferredSpinner {
    pub fn new(msg: &'static str) -> Self {
        Self {
            msg,
            bar: OnceLock::new(),
        }
    }

    pub fn start(&self) -> &ProgressBar {
        self.bar.get_or_init(|| spinner(self.msg))
    }

    pub fn is_started(&self) -> bool {
        self.bar.get().is_some()
    }

    /// No-op until started
    pub fn set_position(&self, pos: u64) {
        if let Some(bar) = self.bar.get() {
            bar.set_position(pos);
        }
    }

    pub fn finish_and_clear(&self) {
        if let Some(bar) = self.bar.get() {
            bar.finish_and_clear();
        }
    }
}

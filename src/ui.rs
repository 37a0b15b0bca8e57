//! Interface de terminal do lintas: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner exibido enquanto a replicação termina e
//! `console` para estilizar registros, históricos e rejeições.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use lintas::ShutdownReport;
use lintas::state_machine::{EntityKind, Record, StageGraph, StatusTransition};
use lintas::{LintasError, ResyncReport};

/// Spinner exibido enquanto o processo espera as escritas no espelho.
pub struct DrainProgress {
    pb: ProgressBar,
    green: Style,
    yellow: Style,
}

impl DrainProgress {
    pub fn start(kind: EntityKind) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("replicating {kind} to mirror"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn finish(&self, report: &ShutdownReport) {
        self.pb.finish_and_clear();
        if report.drained && report.abandoned == 0 {
            eprintln!("  {} mirror up to date", self.green.apply_to("✓"));
        } else {
            eprintln!(
                "  {} {} pending mirror retries abandoned; run `lintas resync` later",
                self.yellow.apply_to("↻"),
                report.abandoned
            );
        }
    }
}

fn heading(text: &str) {
    println!("{}", Style::new().cyan().bold().apply_to(format!("─── {text} ───")));
}

pub fn print_record<P: Serialize>(title: &str, record: &Record<P>) {
    heading(title);
    println!(
        "{}",
        serde_json::to_string_pretty(record).unwrap_or_default()
    );
}

pub fn print_history(kind: EntityKind, id: i64, entries: &[StatusTransition]) {
    heading(&format!("{kind} {id} history"));
    if entries.is_empty() {
        println!("  (no transitions yet)");
        return;
    }
    let dim = Style::new().dim();
    for entry in entries {
        println!(
            "  {}  {} → {}  by {}{}",
            dim.apply_to(entry.transitioned_at.format("%Y-%m-%d %H:%M:%S")),
            entry.from_status,
            Style::new().bold().apply_to(&entry.to_status),
            entry.transitioned_by,
            if entry.notes.is_empty() {
                String::new()
            } else {
                format!("  ({})", entry.notes)
            }
        );
    }
}

pub fn print_stages(kind: EntityKind, graph: &StageGraph) {
    heading(&format!("{kind} stages"));
    for (level, stages) in graph.levels().iter().enumerate() {
        println!("  {level:>2}. {}", stages.join(" | "));
    }
}

pub fn print_rejection(err: &LintasError, allowed: Option<&[&str]>) {
    let red = Style::new().red().bold();
    eprintln!("  {} {err}", red.apply_to("✗"));
    if let Some(allowed) = allowed {
        if allowed.is_empty() {
            eprintln!("    record is at its final stage");
        } else {
            eprintln!("    allowed next: {}", allowed.join(", "));
        }
    }
}

pub fn print_resync(kind: EntityKind, report: &ResyncReport) {
    let green = Style::new().green().bold();
    println!(
        "  {} queued {} {kind} records for replication",
        green.apply_to("✓"),
        report.queued
    );
    if report.dropped > 0 {
        println!(
            "  {} {} dropped (retry queue full); raise retry.queue_capacity or resync per day",
            Style::new().yellow().apply_to("↻"),
            report.dropped
        );
    }
}

//! Plain-text rendering of live updates and stored history

use std::fmt::Write;

use quorum::consensus::{ColorHint, ConsensusVerdict, VerdictTag};
use quorum::persistence::StoredSnapshot;
use quorum::state::{SampleResult, SampleState};
use quorum::LiveUpdate;

fn headline(tag: VerdictTag) -> &'static str {
    match tag {
        VerdictTag::Waiting => "waiting for answers",
        VerdictTag::AllFailed => "every request failed, try again",
        VerdictTag::OnlyOneSuccess => "single answer, unconfirmed",
        VerdictTag::TwoConsistent => "two answers agree",
        VerdictTag::TwoDifferent => "two answers disagree",
        VerdictTag::AllConsistent => "all answers agree",
        VerdictTag::AllDifferent => "answers disagree",
        VerdictTag::Uncertain => "not enough agreement yet",
    }
}

fn marker(hint: ColorHint) -> &'static str {
    match hint {
        ColorHint::Green => "[ok]",
        ColorHint::Amber => "[~~]",
        ColorHint::Red => "[!!]",
        ColorHint::Neutral => "[..]",
    }
}

/// One-line verdict summary
pub fn verdict_line(verdict: &ConsensusVerdict, k: usize) -> String {
    let mut line = format!(
        "{} {} ({}/{} answered, {} failed)",
        marker(verdict.color_hint),
        headline(verdict.tag),
        verdict.success_count,
        k,
        verdict.failed_count
    );
    if let Some(best) = &verdict.best_answer {
        let _ = write!(line, " -> {}", best.text);
        if best.provisional {
            line.push_str(" (provisional)");
        }
    }
    line
}

fn sample_line(sample: &SampleResult) -> String {
    let elapsed = sample
        .elapsed_ms
        .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
        .unwrap_or_else(|| "-".to_string());
    match sample.state {
        SampleState::Succeeded => format!(
            "  #{} {:>6}  {}",
            sample.index,
            elapsed,
            sample
                .answer
                .as_ref()
                .map(|a| a.display_text())
                .unwrap_or_default()
        ),
        SampleState::Failed => format!(
            "  #{} {:>6}  error: {}",
            sample.index,
            elapsed,
            sample.error.as_deref().unwrap_or("unknown")
        ),
        SampleState::Pending | SampleState::Running => {
            format!("  #{} {:>6}  ...", sample.index, elapsed)
        }
    }
}

/// Render a live update for the terminal
pub fn render_update(update: &LiveUpdate) -> String {
    match update {
        LiveUpdate::Verdict {
            verdict, results, ..
        } => verdict_line(verdict, results.len()),
        LiveUpdate::Deadline { completed, k, .. } => format!(
            "[..] still waiting: {}/{} answers in, showing what we have",
            completed, k
        ),
        LiveUpdate::Settled {
            verdict,
            results,
            after_deadline,
            ..
        } => {
            let mut out = String::from("final: ");
            out.push_str(&verdict_line(verdict, results.len()));
            if *after_deadline {
                out.push_str(" [late]");
            }
            for sample in results {
                out.push('\n');
                out.push_str(&sample_line(sample));
            }
            out
        }
    }
}

/// Render stored history, newest first
pub fn render_history(records: &[StoredSnapshot]) -> String {
    if records.is_empty() {
        return "no history yet".to_string();
    }
    records
        .iter()
        .map(|record| {
            let snapshot = &record.snapshot;
            format!(
                "{:>4}  {}  {}{}",
                record.id,
                snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
                verdict_line(&snapshot.verdict, snapshot.results.len()),
                if snapshot.complete { "" } else { " (partial)" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

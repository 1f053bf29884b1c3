//! Digest events and their human-readable rendering.

use chrono::NaiveDateTime;

use crate::core::backoff::truncate_chars;
use crate::core::types::{Autonomy, Speaker};

/// Returned by [`render_digest`] when there is nothing to report.
pub const NOTHING_NEW: &str = "Nothing new.";

/// Longest error text shown per digest line.
const ERROR_LINE_CHARS: usize = 80;

/// One digest-worthy outcome recorded by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DigestEvent {
    /// A new task was dispatched and its result written back.
    Processed { task: String, autonomy: Autonomy },
    /// The agent replied inside an existing dialog.
    DialogReply { task: String },
    /// A new-task dispatch failed.
    Error { task: String, error: String },
    /// A dialog has been idle longer than the stale threshold.
    Stale {
        task: String,
        task_id: String,
        last_speaker: Option<Speaker>,
    },
}

/// Render events into a fixed-order summary.
///
/// Sections appear as: green, yellow, red, dialog replies, errors, stale.
/// Empty sections are omitted; an empty event list yields [`NOTHING_NEW`].
pub fn render_digest(events: &[DigestEvent], now: NaiveDateTime, stale_hours: f64) -> String {
    if events.is_empty() {
        return NOTHING_NEW.to_string();
    }

    let mut lines = vec![
        format!("📊 Digest — {}", now.format("%Y-%m-%d %H:%M")),
        String::new(),
    ];

    push_section(&mut lines, "🟢 Auto-completed", processed_with(events, Autonomy::Green));
    push_section(&mut lines, "🟡 On review", processed_with(events, Autonomy::Yellow));
    push_section(&mut lines, "🔴 Awaiting decision", processed_with(events, Autonomy::Red));

    let replies = events
        .iter()
        .filter(|event| matches!(event, DigestEvent::DialogReply { .. }))
        .count();
    if replies > 0 {
        lines.push(format!("💬 Dialog replies: {replies}"));
    }

    let errors: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            DigestEvent::Error { task, error } => Some(format!(
                "{task}: {}",
                truncate_chars(error, ERROR_LINE_CHARS)
            )),
            _ => None,
        })
        .collect();
    push_section(&mut lines, "⚠️ Errors", errors);

    let stale: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            DigestEvent::Stale {
                task, last_speaker, ..
            } => Some(format!(
                "{task} (last: {})",
                last_speaker.map_or("?", Speaker::marker)
            )),
            _ => None,
        })
        .collect();
    push_section(&mut lines, &format!("⏰ Stale (>{stale_hours}h)"), stale);

    lines.join("\n")
}

fn processed_with(events: &[DigestEvent], tier: Autonomy) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            DigestEvent::Processed { task, autonomy } if *autonomy == tier => Some(task.clone()),
            _ => None,
        })
        .collect()
}

fn push_section(lines: &mut Vec<String>, title: &str, items: Vec<String>) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("{title}: {}", items.len()));
    lines.extend(items.into_iter().map(|item| format!("  • {item}")));
}

//! Terminal rendering for archive types.
//!
//! Extension traits that add colored output to icalarchive-core types using
//! owo_colors.

use icalarchive_core::{Decision, EventPage, EventRecord, MergeReport, SourceStats};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for EventRecord {
    fn render(&self) -> String {
        let marker = if self.hidden {
            "h".red().to_string()
        } else {
            " ".to_string()
        };
        let recurring = if self.recurring { " ↻" } else { "" };
        let summary = if self.cancelled {
            self.summary.strikethrough().to_string()
        } else {
            self.summary.clone()
        };
        let categories = if self.categories.is_empty() {
            String::new()
        } else {
            format!(
                " [{}]",
                self.categories.iter().cloned().collect::<Vec<_>>().join(", ")
            )
        };

        let seen = match self.first_seen {
            Some(at) => format!(" · first seen {}", at.format("%Y-%m-%d")),
            None => String::new(),
        };

        format!(
            "{} {}{} {}{}\n    {}{}",
            marker,
            summary,
            recurring,
            self.start.dimmed(),
            categories.cyan(),
            self.identity.dimmed(),
            seen.dimmed()
        )
    }
}

impl Render for EventPage {
    fn render(&self) -> String {
        if self.events.is_empty() {
            return "No events".dimmed().to_string();
        }
        let mut lines: Vec<String> = self.events.iter().map(Render::render).collect();
        lines.push(
            format!(
                "Page {} of {} ({} {})",
                self.page,
                self.pages,
                self.total,
                pluralize("event", self.total)
            )
            .dimmed()
            .to_string(),
        );
        lines.join("\n")
    }
}

impl Render for MergeReport {
    fn render(&self) -> String {
        let mut parts = Vec::new();
        if self.added > 0 {
            parts.push(format!("+{} new", self.added).green().to_string());
        }
        if self.updated > 0 {
            parts.push(format!("~{} changed", self.updated).yellow().to_string());
        }
        if self.retained > 0 {
            parts.push(format!("{} kept", self.retained).dimmed().to_string());
        }
        if parts.is_empty() {
            return "   No changes".dimmed().to_string();
        }
        format!("   {}", parts.join(", "))
    }
}

impl Render for SourceStats {
    fn render(&self) -> String {
        let last_fetch = match self.last_fetch {
            Some(at) => format!(", last fetched {}", at.format("%Y-%m-%d %H:%M UTC")),
            None => String::new(),
        };
        format!(
            "📅 {} {}",
            self.source_id,
            format!(
                "{} {}, {} recurring{}",
                self.event_count,
                pluralize("event", self.event_count),
                self.recurring_count,
                last_fetch
            )
            .dimmed()
        )
    }
}

impl Render for Decision {
    fn render(&self) -> String {
        match self {
            Decision::Visible => self.to_string().green().to_string(),
            Decision::FilteredOut => self.to_string().dimmed().to_string(),
            _ => self.to_string().red().to_string(),
        }
    }
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

//! Terminal output for conversations and history listings

use console::{style, Term};
use gpp_core::{ConversationRecord, RecordSummary, Role};
use serde::Serialize;
use std::io::Write;

const FALLBACK_WIDTH: usize = 80;

/// Width of the terminal on stdout, or 80 columns when not a terminal
pub fn terminal_width() -> usize {
    Term::stdout()
        .size_checked()
        .map(|(_, cols)| cols as usize)
        .unwrap_or(FALLBACK_WIDTH)
}

/// `" 1. 2024-03-15 09:00 preview"`; repeated dates are dimmed
pub fn summary_line(summary: &RecordSummary) -> String {
    let date = summary.date().to_string();
    let date = if summary.same_date_as_previous {
        style(date).dim().to_string()
    } else {
        date
    };
    format!(
        "{:2}. {} {} {}",
        summary.ordinal,
        date,
        summary.time_label(),
        summary.preview
    )
}

fn role_icon(role: Role) -> &'static str {
    match role {
        Role::System => "🛂",
        Role::User => "👤",
        Role::Assistant => "👽",
    }
}

/// Horizontal rule with `label` in the middle
pub fn rule(label: &str, width: usize) -> String {
    // Emoji labels take two columns, plus one space on each side
    let line = width.saturating_sub(4);
    let left = line / 2;
    format!("{} {} {}", "─".repeat(left), label, "─".repeat(line - left))
}

/// Print every message under a rule naming its role
pub fn print_record(out: &mut impl Write, record: &ConversationRecord, width: usize) -> std::io::Result<()> {
    for message in &record.messages {
        writeln!(out, "{}", style(rule(role_icon(message.role), width)).dim())?;
        if message.role == Role::User {
            writeln!(out, "{}", style(&message.content).bold())?;
        } else {
            writeln!(out, "{}", message.content)?;
        }
        if message.role == Role::Assistant {
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Pretty JSON with non-ASCII text kept as is
pub fn print_json<T: Serialize>(out: &mut impl Write, value: &T) -> std::io::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    writeln!(out, "{}", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpp_core::{Message, ParameterSet, RecordHandle};

    fn summary(ordinal: usize, same_date: bool) -> RecordSummary {
        RecordSummary {
            ordinal,
            handle: RecordHandle::from_file_name("chat-20240315T093000.json").unwrap(),
            same_date_as_previous: same_date,
            preview: "hei ⇢ hallo".to_string(),
        }
    }

    #[test]
    fn test_summary_line() {
        console::set_colors_enabled(false);
        assert_eq!(summary_line(&summary(1, false)), " 1. 2024-03-15 09:30 hei ⇢ hallo");
        assert_eq!(summary_line(&summary(12, true)), "12. 2024-03-15 09:30 hei ⇢ hallo");
    }

    #[test]
    fn test_rule_fills_width() {
        let line = rule("👤", 20);
        assert_eq!(line.chars().filter(|c| *c == '─').count(), 16);
        assert!(line.contains(" 👤 "));
    }

    #[test]
    fn test_print_record() {
        console::set_colors_enabled(false);
        let mut record = ConversationRecord::new("none", ParameterSet::new());
        record.push(Message::user("Hei"));
        record.push(Message::assistant("Hallo på deg"));

        let mut out = Vec::new();
        print_record(&mut out, &record, 10).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text, "─── 👤 ───\nHei\n─── 👽 ───\nHallo på deg\n\n");
    }

    #[test]
    fn test_print_json_keeps_non_ascii() {
        let mut out = Vec::new();
        print_json(&mut out, &serde_json::json!({"content": "blåbær"})).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("blåbær"));
    }
}

//! Browsing stored conversations

use chrono::{NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use tracing::warn;

use crate::chat::{ChatStore, ConversationRecord, RecordHandle, Role};
use crate::error::{Error, Result};

/// Columns reserved for the ordinal, date and time in front of a preview
const PREFIX_COLUMNS: usize = 22;
/// Extra columns kept free for the trailing `...`
const ELLIPSIS_COLUMNS: usize = 3;
const ARROW: &str = " ⇢ ";

/// One line of `gpp list`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    /// 1-based position, 1 being the newest conversation
    pub ordinal: usize,
    pub handle: RecordHandle,
    /// True when the previous (newer) entry was created on the same day
    pub same_date_as_previous: bool,
    pub preview: String,
}

impl RecordSummary {
    pub fn created_at(&self) -> NaiveDateTime {
        self.handle.created_at()
    }

    pub fn date(&self) -> NaiveDate {
        self.handle.created_at().date()
    }

    /// `HH:MM`
    pub fn time_label(&self) -> String {
        self.handle.created_at().format("%H:%M").to_string()
    }
}

/// Lists and replays conversations from a [`ChatStore`]
pub struct HistoryBrowser<'a> {
    store: &'a ChatStore,
}

impl<'a> HistoryBrowser<'a> {
    pub fn new(store: &'a ChatStore) -> Self {
        Self { store }
    }

    /// Summaries of the newest `limit` conversations (all when `None`),
    /// with previews fitted to a terminal `width` columns wide
    pub fn summarize(&self, limit: Option<usize>, width: usize) -> Result<Vec<RecordSummary>> {
        let handles = self.store.list_records()?;
        let take = limit.unwrap_or(handles.len());

        let mut summaries: Vec<RecordSummary> = Vec::new();
        for (index, handle) in handles.into_iter().take(take).enumerate() {
            let preview = match self.store.read(&handle) {
                Ok(record) => preview_text(&record, width),
                Err(e) => {
                    warn!("Skipping preview of {}: {}", handle, e);
                    "<unreadable>".to_string()
                }
            };
            let same_date_as_previous = summaries
                .last()
                .map(|prev| prev.date() == handle.created_at().date())
                .unwrap_or(false);
            summaries.push(RecordSummary {
                ordinal: index + 1,
                handle,
                same_date_as_previous,
                preview,
            });
        }
        Ok(summaries)
    }

    /// Load the `n`th newest conversation (1 = most recent)
    pub fn recall(&self, n: usize) -> Result<(RecordHandle, ConversationRecord)> {
        let handles = self.store.list_records()?;
        let available = handles.len();
        let handle = n
            .checked_sub(1)
            .and_then(|index| handles.into_iter().nth(index))
            .ok_or(Error::OutOfRange {
                requested: n,
                available,
            })?;
        let record = self.store.read(&handle)?;
        Ok((handle, record))
    }

    /// File paths of every stored conversation, newest first
    pub fn record_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .store
            .list_records()?
            .iter()
            .map(|handle| self.store.path_of(handle))
            .collect())
    }
}

/// One-line preview: the first question, followed by the start of the
/// first answer when the question is short enough
pub fn preview_text(record: &ConversationRecord, width: usize) -> String {
    let budget = width.saturating_sub(PREFIX_COLUMNS);
    let cut = budget.saturating_sub(ELLIPSIS_COLUMNS);

    let mut text = record
        .first_of(Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();
    if text.chars().count() < cut {
        if let Some(answer) = record.first_of(Role::Assistant) {
            text.push_str(ARROW);
            text.push_str(&answer.content);
        }
    }

    let text = text.replace('\n', " ");
    if text.chars().count() > budget {
        let mut short: String = text.chars().take(cut).collect();
        short.push_str("...");
        short
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Message, ParameterSet};
    use chrono::{Duration, NaiveDate};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(question: &str, answer: &str) -> ConversationRecord {
        let mut record = ConversationRecord::new("default", ParameterSet::new());
        record.push(Message::system("sys"));
        record.push(Message::user(question));
        record.push(Message::assistant(answer));
        record
    }

    /// Store whose records are created 5 hours apart starting 2024-03-15 00:00
    fn store(temp_dir: &TempDir) -> ChatStore {
        let ticks = Arc::new(AtomicI64::new(0));
        ChatStore::open(temp_dir.path()).unwrap().with_clock(move || {
            let n = ticks.fetch_add(1, Ordering::SeqCst);
            NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + Duration::hours(5 * n)
        })
    }

    #[test]
    fn test_summarize_limits_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let mut handles = Vec::new();
        for i in 0..5 {
            handles.push(store.write(None, &record(&format!("q{}", i), "a")).unwrap());
        }

        let summaries = HistoryBrowser::new(&store).summarize(Some(2), 80).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].handle, handles[4]);
        assert_eq!(summaries[1].handle, handles[3]);
        assert_eq!(summaries[0].ordinal, 1);
        assert_eq!(summaries[1].ordinal, 2);
        assert!(summaries[0].preview.starts_with("q4"));
    }

    #[test]
    fn test_summarize_all_marks_repeated_dates() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        for i in 0..5 {
            store.write(None, &record(&format!("q{}", i), "a")).unwrap();
        }

        // All five fall on 2024-03-15
        let summaries = HistoryBrowser::new(&store).summarize(None, 80).unwrap();
        assert_eq!(summaries.len(), 5);
        assert!(!summaries[0].same_date_as_previous);
        assert!(summaries[1..].iter().all(|s| s.same_date_as_previous));
        assert_eq!(summaries[0].time_label(), "20:00");
    }

    #[test]
    fn test_date_change_is_not_dimmed() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        for i in 0..6 {
            store.write(None, &record(&format!("q{}", i), "a")).unwrap();
        }
        // The newest record (25:00) falls on the 16th
        let summaries = HistoryBrowser::new(&store).summarize(None, 80).unwrap();
        assert_eq!(
            summaries[0].date(),
            NaiveDate::from_ymd_opt(2024, 3, 16).unwrap()
        );
        assert!(!summaries[0].same_date_as_previous);
        assert!(!summaries[1].same_date_as_previous);
        assert!(summaries[2].same_date_as_previous);
    }

    #[test]
    fn test_recall_positions() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.write(None, &record("first", "a")).unwrap();
        store.write(None, &record("second", "b")).unwrap();

        let browser = HistoryBrowser::new(&store);
        let (_, newest) = browser.recall(1).unwrap();
        assert_eq!(newest.messages[1].content, "second");
        let (_, older) = browser.recall(2).unwrap();
        assert_eq!(older.messages[1].content, "first");

        assert!(matches!(
            browser.recall(3),
            Err(Error::OutOfRange {
                requested: 3,
                available: 2
            })
        ));
        assert!(matches!(browser.recall(0), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_preview_joins_short_question_and_answer() {
        let preview = preview_text(&record("Hva er\nRust?", "Et språk."), 80);
        assert_eq!(preview, "Hva er Rust? ⇢ Et språk.");
    }

    #[test]
    fn test_preview_truncates_to_width() {
        let long = "x".repeat(100);
        let preview = preview_text(&record(&long, "answer"), 60);
        // 60 - 22 columns available, cut at 60 - 25 characters
        assert_eq!(preview.chars().count(), 35 + 3);
        assert!(preview.ends_with("..."));
        assert!(!preview.contains('⇢'));
    }

    #[test]
    fn test_preview_without_user_message() {
        let record = ConversationRecord::new("none", ParameterSet::new());
        assert_eq!(preview_text(&record, 80), "");
    }

    #[test]
    fn test_record_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let handle = store.write(None, &record("q", "a")).unwrap();
        let paths = HistoryBrowser::new(&store).record_paths().unwrap();
        assert_eq!(paths, vec![store.path_of(&handle)]);
    }
}

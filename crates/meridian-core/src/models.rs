//! Data models for Meridian
//!
//! Defines the persisted data structures: [`Task`], the per-date buckets and
//! memos that make up a [`Dataset`], and the [`SyncCredentials`] used to reach
//! the remote document store.
//!
//! The dataset serializes to the exact JSON shape stored both locally and in
//! the remote document:
//!
//! ```text
//! {
//!   "tasks": { "2024-05-01": [{ "id": 1, "text": "...", "completed": false }] },
//!   "memos": { "2024-05-01": "..." },
//!   "taskIdCounter": 2,
//!   "lastSync": "2024-05-01T09:00:00Z",
//!   "version": "1.1"
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Payload schema version written on every save
///
/// `1.0` payloads predate the memo map and load with no memos.
pub const DATASET_VERSION: &str = "1.1";

/// Calendar date used as a bucket key, serialized as `YYYY-MM-DD`
pub type DateKey = NaiveDate;

/// Parse a `YYYY-MM-DD` date key
pub fn parse_date_key(s: &str) -> Result<DateKey, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}

/// A single task owned by one date bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Unique identifier, allocated from `Dataset::task_id_counter`
    pub id: u64,
    /// Task text, never empty after trimming
    pub text: String,
    /// Whether the task is done
    #[serde(default)]
    pub completed: bool,
}

/// The full persisted state: tasks, memos and the id counter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Ordered task lists keyed by date. Empty buckets are never kept.
    #[serde(default)]
    pub tasks: BTreeMap<DateKey, Vec<Task>>,
    /// Free-text memo per date. Absent when there is no memo.
    #[serde(default)]
    pub memos: BTreeMap<DateKey, String>,
    /// Next id to hand out; strictly greater than every issued id
    #[serde(default = "default_task_id_counter")]
    pub task_id_counter: u64,
    /// When this dataset was last written
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Schema version of the payload
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_task_id_counter() -> u64 {
    1
}

fn default_version() -> String {
    DATASET_VERSION.to_string()
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
            memos: BTreeMap::new(),
            task_id_counter: default_task_id_counter(),
            last_sync: None,
            version: default_version(),
        }
    }
}

impl Dataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dataset from its JSON payload and normalize it
    ///
    /// A task id of `u64::MAX` leaves no room for a counter above it and is
    /// rejected as invalid data.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut dataset: Dataset = serde_json::from_str(json)?;
        if dataset.max_task_id() == Some(u64::MAX) {
            return Err(serde::de::Error::custom(
                "task id out of range: no id can follow it",
            ));
        }
        dataset.normalize();
        Ok(dataset)
    }

    /// Serialize the dataset to its JSON payload
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize the dataset to indented JSON (the remote file content)
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// True when there are no tasks and no memos
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.memos.is_empty()
    }

    /// Highest task id present, if any
    pub fn max_task_id(&self) -> Option<u64> {
        self.tasks.values().flatten().map(|t| t.id).max()
    }

    /// Total number of tasks across all dates
    pub fn task_count(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    /// Restore structural invariants after loading untrusted data
    ///
    /// Drops empty buckets and blank memos, and lifts `task_id_counter` above
    /// every id present.
    pub fn normalize(&mut self) {
        self.tasks.retain(|_, tasks| !tasks.is_empty());
        self.memos.retain(|_, memo| !memo.trim().is_empty());
        let floor = match self.max_task_id() {
            Some(id) => id.saturating_add(1),
            None => 1,
        };
        self.task_id_counter = self.task_id_counter.max(floor);
    }

    /// Stamp the dataset for writing: set `last_sync` and the schema version
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_sync = Some(now);
        self.version = DATASET_VERSION.to_string();
    }

    /// Allocate an id, or `None` once the counter cannot advance
    fn next_id(&mut self) -> Option<u64> {
        let id = self.task_id_counter;
        self.task_id_counter = id.checked_add(1)?;
        Some(id)
    }

    // ==================== Task Operations ====================

    /// Tasks for a date, in user order
    pub fn tasks_for(&self, date: DateKey) -> &[Task] {
        self.tasks.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up a task by id within a date
    pub fn task(&self, date: DateKey, id: u64) -> Option<&Task> {
        self.tasks_for(date).iter().find(|t| t.id == id)
    }

    fn task_mut(&mut self, date: DateKey, id: u64) -> Option<&mut Task> {
        self.tasks.get_mut(&date)?.iter_mut().find(|t| t.id == id)
    }

    /// Append a new task to a date
    ///
    /// Returns the new task id, or `None` if the text is blank or the id
    /// counter is exhausted.
    pub fn add_task(&mut self, date: DateKey, text: &str) -> Option<u64> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let id = self.next_id()?;
        self.tasks.entry(date).or_default().push(Task {
            id,
            text: text.to_string(),
            completed: false,
        });
        Some(id)
    }

    /// Flip a task's completed flag, returning the new value
    pub fn toggle_task(&mut self, date: DateKey, id: u64) -> Option<bool> {
        let task = self.task_mut(date, id)?;
        task.completed = !task.completed;
        Some(task.completed)
    }

    /// Replace a task's text. Blank text leaves the task unchanged.
    pub fn edit_task(&mut self, date: DateKey, id: u64, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        match self.task_mut(date, id) {
            Some(task) => {
                task.text = text.to_string();
                true
            }
            None => false,
        }
    }

    /// Remove a task, dropping its bucket if it becomes empty
    pub fn delete_task(&mut self, date: DateKey, id: u64) -> Option<Task> {
        let tasks = self.tasks.get_mut(&date)?;
        let pos = tasks.iter().position(|t| t.id == id)?;
        let removed = tasks.remove(pos);
        if tasks.is_empty() {
            self.tasks.remove(&date);
        }
        Some(removed)
    }

    /// Copy a task to the following day as a new, uncompleted task
    pub fn copy_task_to_next_day(&mut self, date: DateKey, id: u64) -> Option<u64> {
        let text = self.task(date, id)?.text.clone();
        let next = date.succ_opt()?;
        self.add_task(next, &text)
    }

    /// Remove every task for a date, returning how many were removed
    pub fn clear_date(&mut self, date: DateKey) -> usize {
        self.tasks.remove(&date).map_or(0, |tasks| tasks.len())
    }

    /// Texts of a date's tasks, for pasting elsewhere
    pub fn copy_tasks(&self, date: DateKey) -> Vec<String> {
        self.tasks_for(date).iter().map(|t| t.text.clone()).collect()
    }

    /// Append copied tasks to a date as new, uncompleted tasks
    pub fn paste_tasks(&mut self, date: DateKey, texts: &[String]) -> usize {
        texts
            .iter()
            .filter_map(|text| self.add_task(date, text))
            .count()
    }

    /// Move `dragged_id` to the position of `target_id` within one date
    ///
    /// When moving down the list the task lands just above the target.
    /// Unknown ids leave the bucket untouched.
    pub fn reorder_task(&mut self, date: DateKey, dragged_id: u64, target_id: u64) -> bool {
        let Some(tasks) = self.tasks.get_mut(&date) else {
            return false;
        };
        let dragged = tasks.iter().position(|t| t.id == dragged_id);
        let target = tasks.iter().position(|t| t.id == target_id);
        let (Some(from), Some(to)) = (dragged, target) else {
            return false;
        };
        if from == to {
            return false;
        }

        let task = tasks.remove(from);
        let insert_at = if from < to { to - 1 } else { to };
        tasks.insert(insert_at, task);
        true
    }

    /// True when the date has tasks and all of them are completed
    pub fn is_date_completed(&self, date: DateKey) -> bool {
        let tasks = self.tasks_for(date);
        !tasks.is_empty() && tasks.iter().all(|t| t.completed)
    }

    // ==================== Memo Operations ====================

    /// Memo for a date
    pub fn memo(&self, date: DateKey) -> Option<&str> {
        self.memos.get(&date).map(String::as_str)
    }

    /// Set or clear the memo for a date. Blank text removes it.
    pub fn set_memo(&mut self, date: DateKey, text: &str) {
        if text.trim().is_empty() {
            self.memos.remove(&date);
        } else {
            self.memos.insert(date, text.to_string());
        }
    }
}

/// Credentials for the remote document store
///
/// Stored in their own durable slot, independent of the dataset. The document
/// id is discovered lazily and written back once known.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncCredentials {
    /// Pre-issued bearer token
    #[serde(default)]
    pub token: String,
    /// Remote document id, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl SyncCredentials {
    pub fn new(token: impl Into<String>, document_id: Option<String>) -> Self {
        let mut credentials = Self {
            token: token.into().trim().to_string(),
            document_id,
        };
        credentials.normalize();
        credentials
    }

    /// Treat an empty document id as unknown
    pub fn normalize(&mut self) {
        if let Some(id) = &self.document_id {
            let trimmed = id.trim();
            self.document_id = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
    }

    /// True when a non-empty token is held
    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

impl fmt::Debug for SyncCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCredentials")
            .field("token", &if self.has_token() { "<redacted>" } else { "" })
            .field("document_id", &self.document_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> DateKey {
        parse_date_key(s).unwrap()
    }

    #[test]
    fn test_empty_dataset_defaults() {
        let dataset = Dataset::new();
        assert!(dataset.tasks.is_empty());
        assert!(dataset.memos.is_empty());
        assert_eq!(dataset.task_id_counter, 1);
        assert_eq!(dataset.version, DATASET_VERSION);
    }

    #[test]
    fn test_add_task_allocates_ids() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");

        assert_eq!(dataset.add_task(d, "  first  "), Some(1));
        assert_eq!(dataset.add_task(d, "second"), Some(2));
        assert_eq!(dataset.task_id_counter, 3);
        assert_eq!(dataset.tasks_for(d)[0].text, "first");
    }

    #[test]
    fn test_add_task_rejects_blank_text() {
        let mut dataset = Dataset::new();
        assert_eq!(dataset.add_task(day("2024-05-01"), "   "), None);
        assert!(dataset.tasks.is_empty());
        assert_eq!(dataset.task_id_counter, 1);
    }

    #[test]
    fn test_delete_last_task_removes_bucket() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");
        let id = dataset.add_task(d, "only").unwrap();

        assert!(dataset.delete_task(d, id).is_some());
        assert!(!dataset.tasks.contains_key(&d));
        // Counter never goes back
        assert_eq!(dataset.task_id_counter, 2);
    }

    #[test]
    fn test_edit_task_ignores_blank() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");
        let id = dataset.add_task(d, "write report").unwrap();

        assert!(!dataset.edit_task(d, id, "  "));
        assert_eq!(dataset.task(d, id).unwrap().text, "write report");
        assert!(dataset.edit_task(d, id, " send report "));
        assert_eq!(dataset.task(d, id).unwrap().text, "send report");
    }

    #[test]
    fn test_toggle_and_completion() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");
        let a = dataset.add_task(d, "a").unwrap();
        let b = dataset.add_task(d, "b").unwrap();

        assert!(!dataset.is_date_completed(d));
        assert_eq!(dataset.toggle_task(d, a), Some(true));
        assert!(!dataset.is_date_completed(d));
        dataset.toggle_task(d, b);
        assert!(dataset.is_date_completed(d));
        assert!(!dataset.is_date_completed(day("2024-05-02")));
    }

    #[test]
    fn test_copy_task_to_next_day() {
        let mut dataset = Dataset::new();
        let d = day("2024-02-29");
        let id = dataset.add_task(d, "carry over").unwrap();
        dataset.toggle_task(d, id);

        let copied = dataset.copy_task_to_next_day(d, id).unwrap();
        let next = dataset.tasks_for(day("2024-03-01"));
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, copied);
        assert_eq!(next[0].text, "carry over");
        assert!(!next[0].completed);
    }

    #[test]
    fn test_copy_and_paste_tasks() {
        let mut dataset = Dataset::new();
        let from = day("2024-05-01");
        let to = day("2024-05-08");
        dataset.add_task(from, "standup");
        dataset.add_task(from, "review");

        let clipboard = dataset.copy_tasks(from);
        assert_eq!(dataset.paste_tasks(to, &clipboard), 2);
        let pasted: Vec<_> = dataset.tasks_for(to).iter().map(|t| t.id).collect();
        assert_eq!(pasted, vec![3, 4]);
    }

    #[test]
    fn test_clear_date() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");
        dataset.add_task(d, "a");
        dataset.add_task(d, "b");

        assert_eq!(dataset.clear_date(d), 2);
        assert_eq!(dataset.clear_date(d), 0);
        assert!(dataset.tasks.is_empty());
    }

    #[test]
    fn test_reorder_moving_down_lands_above_target() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");
        for text in ["a", "b", "c", "d"] {
            dataset.add_task(d, text);
        }

        // Drag "a" (id 1) onto "c" (id 3)
        assert!(dataset.reorder_task(d, 1, 3));
        let order: Vec<_> = dataset.tasks_for(d).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_reorder_moving_up_takes_target_slot() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");
        for text in ["a", "b", "c", "d"] {
            dataset.add_task(d, text);
        }

        assert!(dataset.reorder_task(d, 4, 2));
        let order: Vec<_> = dataset.tasks_for(d).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(order, vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn test_reorder_unknown_id_is_noop() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");
        dataset.add_task(d, "a");
        let before = dataset.clone();

        assert!(!dataset.reorder_task(d, 1, 99));
        assert!(!dataset.reorder_task(day("2024-06-01"), 1, 2));
        assert_eq!(dataset, before);
    }

    #[test]
    fn test_memo_absent_when_blank() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");

        dataset.set_memo(d, "dentist at 3");
        assert_eq!(dataset.memo(d), Some("dentist at 3"));
        dataset.set_memo(d, "   ");
        assert_eq!(dataset.memo(d), None);
        assert!(dataset.memos.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let mut dataset = Dataset::new();
        let d = day("2024-05-01");
        dataset.add_task(d, "a");
        dataset.set_memo(d, "note");

        let value: serde_json::Value = serde_json::from_str(&dataset.to_json().unwrap()).unwrap();
        assert_eq!(value["tasks"]["2024-05-01"][0]["text"], "a");
        assert_eq!(value["memos"]["2024-05-01"], "note");
        assert_eq!(value["taskIdCounter"], 2);
        assert_eq!(value["version"], DATASET_VERSION);
    }

    #[test]
    fn test_legacy_payload_without_memos() {
        let json = r#"{
            "tasks": { "2024-05-01": [{ "id": 7, "text": "old", "completed": true }] },
            "taskIdCounter": 8,
            "lastSync": "2024-05-01T10:00:00Z",
            "version": "1.0"
        }"#;

        let dataset = Dataset::from_json(json).unwrap();
        assert!(dataset.memos.is_empty());
        assert_eq!(dataset.version, "1.0");
        assert_eq!(dataset.task_id_counter, 8);
    }

    #[test]
    fn test_normalize_lifts_stale_counter() {
        let json = r#"{
            "tasks": {
                "2024-05-01": [{ "id": 12, "text": "a", "completed": false }],
                "2024-05-02": []
            },
            "taskIdCounter": 3
        }"#;

        let dataset = Dataset::from_json(json).unwrap();
        assert_eq!(dataset.task_id_counter, 13);
        assert_eq!(dataset.tasks.len(), 1);
    }

    #[test]
    fn test_max_task_id_is_rejected() {
        let json = r#"{
            "tasks": { "2024-05-01": [{ "id": 18446744073709551615, "text": "a", "completed": false }] },
            "taskIdCounter": 1
        }"#;

        let err = Dataset::from_json(json).unwrap_err();
        assert!(err.to_string().contains("task id out of range"));
    }

    #[test]
    fn test_exhausted_counter_refuses_new_tasks() {
        let json = format!(r#"{{ "taskIdCounter": {} }}"#, u64::MAX - 1);
        let mut dataset = Dataset::from_json(&json).unwrap();
        let d = day("2024-05-01");

        assert_eq!(dataset.add_task(d, "last"), Some(u64::MAX - 1));
        assert_eq!(dataset.add_task(d, "one too many"), None);
        assert_eq!(dataset.task_count(), 1);
        assert!(dataset.task_id_counter > dataset.max_task_id().unwrap());
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let credentials = SyncCredentials::new("ghp_secret", Some(" ".to_string()));
        assert!(credentials.document_id.is_none());
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("redacted"));
    }
}

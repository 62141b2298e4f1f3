use serde::{Deserialize, Serialize};

/// One follow-up button exposed by a remote job.
///
/// `custom` is the opaque action token the remote side expects back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOption {
    pub label: String,
    pub custom: String,
}

impl TaskOption {
    pub fn new(label: impl Into<String>, custom: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            custom: custom.into(),
        }
    }
}

/// A row that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskRecord {
    pub owner_id: String,
    pub remote_job_id: String,
    pub content_hash: String,
    pub flags: i64,
    pub prompt: String,
    pub options: Vec<TaskOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: i64,
    pub owner_id: String,
    pub remote_job_id: String,
    pub content_hash: String,
    pub flags: i64,
    pub prompt: String,
    pub options: Vec<TaskOption>,
    pub created_at: String,
}

impl TaskRecord {
    pub fn option_labels(&self) -> Vec<&str> {
        self.options
            .iter()
            .map(|option| option.label.as_str())
            .collect()
    }
}

/// Returns the action token paired with `label`, if the job still exposes it.
pub fn select_option<'a>(record: &'a TaskRecord, label: &str) -> Option<&'a str> {
    record
        .options
        .iter()
        .find(|option| option.label == label)
        .map(|option| option.custom.as_str())
}

/// Outcome of looking a task up by its remote job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskLookup {
    NotFound,
    Found(TaskRecord),
    /// Several rows share the remote id; ordered oldest first.
    Ambiguous(Vec<TaskRecord>),
}

impl TaskLookup {
    pub fn from_rows(mut rows: Vec<TaskRecord>) -> Self {
        match rows.len() {
            0 => Self::NotFound,
            1 => Self::Found(rows.remove(0)),
            _ => {
                rows.sort_by_key(|row| row.id);
                Self::Ambiguous(rows)
            }
        }
    }

    /// Most recently inserted match (highest id).
    pub fn latest(self) -> Option<TaskRecord> {
        match self {
            Self::NotFound => None,
            Self::Found(record) => Some(record),
            Self::Ambiguous(rows) => rows.into_iter().max_by_key(|row| row.id),
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{select_option, TaskLookup, TaskOption, TaskRecord};

    fn record(id: i64, options: Vec<TaskOption>) -> TaskRecord {
        TaskRecord {
            id,
            owner_id: "user-1".to_string(),
            remote_job_id: "abc".to_string(),
            content_hash: "h1".to_string(),
            flags: 0,
            prompt: "a red fox".to_string(),
            options,
            created_at: "2026-10-18T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn select_option_returns_paired_token() {
        let rec = record(
            1,
            vec![TaskOption::new("U1", "t1"), TaskOption::new("U2", "t2")],
        );
        assert_eq!(select_option(&rec, "U2"), Some("t2"));
        assert_eq!(select_option(&rec, "U3"), None);
    }

    #[test]
    fn select_option_on_empty_options_is_absent() {
        let rec = record(1, Vec::new());
        assert_eq!(select_option(&rec, "U2"), None);
    }

    #[test]
    fn select_option_takes_first_duplicate_label() {
        let rec = record(
            1,
            vec![TaskOption::new("🔄", "first"), TaskOption::new("🔄", "second")],
        );
        assert_eq!(select_option(&rec, "🔄"), Some("first"));
    }

    #[test]
    fn lookup_prefers_highest_id_when_ambiguous() {
        let lookup = TaskLookup::from_rows(vec![
            record(7, Vec::new()),
            record(3, Vec::new()),
            record(5, Vec::new()),
        ]);
        assert!(lookup.is_ambiguous());
        assert_eq!(lookup.latest().map(|row| row.id), Some(7));
    }

    #[test]
    fn lookup_of_no_rows_is_not_found() {
        let lookup = TaskLookup::from_rows(Vec::new());
        assert_eq!(lookup, TaskLookup::NotFound);
        assert_eq!(lookup.latest(), None);
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority levels, highest first so the derived ordering ranks
/// `High < Medium < Low < None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    High = 0,
    Medium = 1,
    Low = 2,
    #[default]
    None = 3,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Some(Self::High),
            "medium" | "med" | "m" => Some(Self::Medium),
            "low" | "l" => Some(Self::Low),
            "none" | "" => Some(Self::None),
            _ => Option::None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single todo record.
///
/// `created_at` is serialized as an RFC 3339 timestamp and `due_date` as a
/// plain `YYYY-MM-DD` calendar date; the `NaiveDate` type keeps due dates
/// free of any time-of-day component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: Uuid,

    pub text: String,

    pub completed: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub categories: Vec<String>,

    /// Set once a due-date reminder for this todo has been dismissed.
    /// Only the snapshot medium stores it; the row-per-todo service
    /// contract has no such column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_sent: Option<bool>,
}

impl Todo {
    pub fn new(draft: TodoDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: draft.text.trim().to_string(),
            completed: false,
            created_at: now,
            due_date: draft.due_date,
            priority: draft.priority,
            categories: normalize_categories(&draft.categories),
            notification_sent: Option::None,
        }
    }

    /// Merge a patch, overwriting only the fields the patch carries.
    pub fn apply_patch(&mut self, patch: &TodoPatch) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(categories) = &patch.categories {
            self.categories = categories.clone();
        }
        if let Some(notification_sent) = patch.notification_sent {
            self.notification_sent = Some(notification_sent);
        }
    }
}

/// Creation payload: everything a caller may supply up front.
#[derive(Debug, Clone, Default)]
pub struct TodoDraft {
    pub text: String,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub categories: Vec<String>,
}

impl TodoDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Explicit partial update. Absent fields are left untouched by the merge;
/// `due_date` is doubly optional so clearing a due date and leaving it
/// alone stay distinguishable.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<Priority>,
    pub categories: Option<Vec<String>>,
    pub notification_sent: Option<bool>,
}

impl TodoPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.completed.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.categories.is_none()
            && self.notification_sent.is_none()
    }
}

/// Normalize category labels: split on commas, trim, drop empties, and
/// de-duplicate keeping the first occurrence.
pub fn normalize_categories<I, S>(input: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for entry in input {
        for raw in entry.as_ref().split(',') {
            let label = raw.trim();
            if label.is_empty() {
                continue;
            }
            if out.iter().any(|existing| existing == label) {
                continue;
            }
            out.push(label.to_string());
        }
    }
    out
}

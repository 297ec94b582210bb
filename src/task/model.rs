#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use time::PrimitiveDateTime;
use time::macros::format_description;

use crate::error::TasklistError;
use crate::task::user::User;

/// Server-assigned identifier. The backend may hand out numbers or strings;
/// whichever it sends is sent back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

pub type TaskId = RecordId;

impl RecordId {
    /// Parses user input: all-digit input becomes a numeric id.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input.parse::<i64>() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Text(input.to_owned()),
        }
    }

    /// Numeric text collapses to `Int`, so `"1"` and `1` share one key.
    #[must_use]
    pub fn normalized(&self) -> Self {
        match self {
            Self::Text(s) => match s.parse::<i64>() {
                Ok(n) => Self::Int(n),
                Err(_) => self.clone(),
            },
            Self::Int(_) => self.clone(),
        }
    }

    /// Identity as the backend sees it: `1` and `"1"` name the same record.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Int(n), Self::Text(s)) | (Self::Text(s), Self::Int(n)) => {
                s.parse::<i64>() == Ok(*n)
            }
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Waiting,
    InProgress,
    Completed,
    Canceled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Waiting,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Canceled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Waiting => "En attente",
            Self::InProgress => "En cours",
            Self::Completed => "Terminée",
            Self::Canceled => "Annulée",
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TasklistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_uppercase().replace(['-', ' '], "_");
        match norm.as_str() {
            "WAITING" => Ok(Self::Waiting),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELED" | "CANCELLED" => Ok(Self::Canceled),
            _ => Err(TasklistError::InvalidStatus(s.to_owned())),
        }
    }
}

/// PHP `DateTime` as serialized by the backend:
/// `{"date": "2021-03-04 10:00:00.000000", "timezone_type": 3, "timezone": "UTC"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Timestamp {
    #[must_use]
    pub fn parse(&self) -> Option<PrimitiveDateTime> {
        let fmt = format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
        );
        PrimitiveDateTime::parse(self.date.trim(), &fmt).ok()
    }

    /// `YYYY-MM-DD HH:MM`, or the raw string when the server sent something else.
    #[must_use]
    pub fn display(&self) -> String {
        let out = format_description!("[year]-[month]-[day] [hour]:[minute]");
        self.parse()
            .and_then(|dt| dt.format(&out).ok())
            .unwrap_or_else(|| self.date.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigned: Option<User>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,

    /// Checkbox state. Client-only: never serialized.
    #[serde(default, skip_serializing)]
    pub selected: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Task {
    /// A record for the "create new" editor: no identifier, status WAITING.
    #[must_use]
    pub fn draft() -> Self {
        Self {
            status: TaskStatus::Waiting,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    #[must_use]
    pub fn assignee_name(&self) -> Option<&str> {
        self.assigned.as_ref().map(|u| u.username.as_str())
    }

    /// Shallow merge of a server record into this one.
    ///
    /// Fields present in `patch` win, including explicit `null` on nullable
    /// fields. Fields the server omitted keep their local value. The local
    /// `selected` flag is never touched.
    pub fn merge(&mut self, patch: TaskPatch) {
        let TaskPatch {
            id,
            description,
            assigned,
            status,
            created_at,
            started_at,
            completed_at,
            mut extra,
        } = patch;

        if let Some(id) = id {
            self.id = Some(id);
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(assigned) = assigned {
            self.assigned = assigned;
        }
        if let Some(status) = status {
            self.status = status;
        }
        if let Some(created_at) = created_at {
            self.created_at = created_at;
        }
        if let Some(started_at) = started_at {
            self.started_at = started_at;
        }
        if let Some(completed_at) = completed_at {
            self.completed_at = completed_at;
        }
        extra.remove("selected");
        self.extra.append(&mut extra);
    }
}

impl From<TaskPatch> for Task {
    fn from(patch: TaskPatch) -> Self {
        let mut task = Task::default();
        task.merge(patch);
        task
    }
}

/// A task record as returned by a save. Outer `None` means "field absent";
/// `Some(None)` means the server sent an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default)]
    pub id: Option<TaskId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub assigned: Option<Option<User>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "present")]
    pub created_at: Option<Option<Timestamp>>,
    #[serde(default, deserialize_with = "present")]
    pub started_at: Option<Option<Timestamp>>,
    #[serde(default, deserialize_with = "present")]
    pub completed_at: Option<Option<Timestamp>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn present<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::task::model::{RecordId, Task, Timestamp};
use crate::task::user::User;

/// A dotted field path such as `assigned.username` or `createdAt.date`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for FieldPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Ordering key extracted from a task. Missing values sort after everything else.
#[derive(Debug, Clone)]
pub enum SortValue<'a> {
    Bool(bool),
    Number(f64),
    Text(Cow<'a, str>),
    Missing,
}

impl SortValue<'_> {
    fn kind(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Number(_) => 1,
            Self::Text(_) => 2,
            Self::Missing => 3,
        }
    }
}

impl PartialEq for SortValue<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortValue<'_> {}

impl PartialOrd for SortValue<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortValue<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

#[must_use]
pub fn resolve<'a>(task: &'a Task, path: &FieldPath) -> SortValue<'a> {
    let Some((head, rest)) = path.segments.split_first() else {
        return SortValue::Missing;
    };
    match head.as_str() {
        "id" if rest.is_empty() => id_value(task.id.as_ref()),
        "description" if rest.is_empty() => SortValue::Text(Cow::Borrowed(&task.description)),
        "status" if rest.is_empty() => SortValue::Text(Cow::Borrowed(task.status.as_str())),
        "assigned" => match &task.assigned {
            Some(user) => resolve_user(user, rest),
            None => SortValue::Missing,
        },
        "createdAt" => resolve_timestamp(task.created_at.as_ref(), rest),
        "startedAt" => resolve_timestamp(task.started_at.as_ref(), rest),
        "completedAt" => resolve_timestamp(task.completed_at.as_ref(), rest),
        "selected" if rest.is_empty() => SortValue::Bool(task.selected),
        other => resolve_json(task.extra.get(other), rest),
    }
}

#[allow(clippy::cast_precision_loss)]
fn id_value(id: Option<&RecordId>) -> SortValue<'_> {
    match id {
        Some(RecordId::Int(n)) => SortValue::Number(*n as f64),
        Some(RecordId::Text(s)) => SortValue::Text(Cow::Borrowed(s)),
        None => SortValue::Missing,
    }
}

fn resolve_user<'a>(user: &'a User, rest: &[String]) -> SortValue<'a> {
    let Some((head, rest)) = rest.split_first() else {
        // The whole object: order by the name people see.
        return SortValue::Text(Cow::Borrowed(&user.username));
    };
    match head.as_str() {
        "username" if rest.is_empty() => SortValue::Text(Cow::Borrowed(&user.username)),
        "id" if rest.is_empty() => id_value(user.id.as_ref()),
        "rank" if rest.is_empty() => SortValue::Text(Cow::Borrowed(user.rank.as_str())),
        other => resolve_json(user.extra.get(other), rest),
    }
}

#[allow(clippy::cast_precision_loss)]
fn resolve_timestamp<'a>(ts: Option<&'a Timestamp>, rest: &[String]) -> SortValue<'a> {
    let Some(ts) = ts else {
        return SortValue::Missing;
    };
    match rest {
        [] => SortValue::Text(Cow::Borrowed(&ts.date)),
        [field] if field == "date" => SortValue::Text(Cow::Borrowed(&ts.date)),
        [field] if field == "timezone" => ts
            .timezone
            .as_deref()
            .map_or(SortValue::Missing, |tz| SortValue::Text(Cow::Borrowed(tz))),
        [field] if field == "timezone_type" => ts
            .timezone_type
            .map_or(SortValue::Missing, |n| SortValue::Number(n as f64)),
        _ => SortValue::Missing,
    }
}

fn resolve_json<'a>(value: Option<&'a serde_json::Value>, rest: &[String]) -> SortValue<'a> {
    let mut cur = value;
    for seg in rest {
        cur = match cur {
            Some(serde_json::Value::Object(map)) => map.get(seg),
            Some(serde_json::Value::Array(items)) => {
                seg.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        };
    }
    match cur {
        Some(serde_json::Value::Bool(b)) => SortValue::Bool(*b),
        Some(serde_json::Value::Number(n)) => n.as_f64().map_or(SortValue::Missing, SortValue::Number),
        Some(serde_json::Value::String(s)) => SortValue::Text(Cow::Borrowed(s)),
        _ => SortValue::Missing,
    }
}

/// Stable ascending sort of `order` (indices into `tasks`), then reversed
/// as a whole when `descending` is set.
pub fn sort_indices(tasks: &[Task], order: &mut [usize], path: &FieldPath, descending: bool) {
    order.sort_by(|&a, &b| resolve(&tasks[a], path).cmp(&resolve(&tasks[b], path)));
    if descending {
        order.reverse();
    }
}

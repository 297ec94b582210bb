#![forbid(unsafe_code)]

use crate::task::model::{Task, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub path: &'static str,
    pub title: &'static str,
}

pub const COLUMNS: [Column; 7] = [
    Column { path: "id", title: "ID" },
    Column { path: "description", title: "Tâche" },
    Column { path: "assigned.username", title: "Assignée à" },
    Column { path: "status", title: "Statut" },
    Column { path: "createdAt.date", title: "Créée le" },
    Column { path: "startedAt.date", title: "Démarrée le" },
    Column { path: "completedAt.date", title: "Terminée le" },
];

#[must_use]
pub fn column_for_path(path: &str) -> Option<&'static Column> {
    COLUMNS.iter().find(|c| c.path == path)
}

/// Text shown in a table cell for `column`. Empty for missing values.
#[must_use]
pub fn cell_text(task: &Task, column: &Column) -> String {
    match column.path {
        "id" => task.id.as_ref().map(ToString::to_string).unwrap_or_default(),
        "description" => task.description.clone(),
        "assigned.username" => task.assignee_name().unwrap_or_default().to_owned(),
        "status" => task.status.label().to_owned(),
        "createdAt.date" => timestamp_text(task.created_at.as_ref()),
        "startedAt.date" => timestamp_text(task.started_at.as_ref()),
        "completedAt.date" => timestamp_text(task.completed_at.as_ref()),
        _ => String::new(),
    }
}

fn timestamp_text(ts: Option<&Timestamp>) -> String {
    ts.map(Timestamp::display).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_cells_with_labels_and_short_dates() {
        let task: Task = serde_json::from_value(json!({
            "id": 4,
            "description": "Ship it",
            "assigned": {"username": "alice"},
            "status": "COMPLETED",
            "createdAt": {"date": "2022-05-06 07:08:09.123456"},
            "startedAt": null
        }))
        .unwrap();
        let cells: Vec<String> = COLUMNS.iter().map(|c| cell_text(&task, c)).collect();
        assert_eq!(
            cells,
            ["4", "Ship it", "alice", "Terminée", "2022-05-06 07:08", "", ""]
        );
        assert_eq!(column_for_path("status").map(|c| c.title), Some("Statut"));
        assert!(column_for_path("nope").is_none());
    }
}

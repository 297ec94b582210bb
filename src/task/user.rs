#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::model::RecordId;

pub type UserId = RecordId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Rank {
    Admin,
    #[default]
    User,
    Other(String),
}

impl Rank {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Rank {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ADMIN" => Self::Admin,
            "USER" => Self::User,
            _ => Self::Other(s),
        }
    }
}

impl From<Rank> for String {
    fn from(r: Rank) -> Self {
        match r {
            Rank::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub rank: Rank,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.rank == Rank::Admin
    }
}

/// Interprets the session endpoint's body. The backend answers `null` or `{}`
/// when nobody is signed in.
pub fn session_from_value(value: serde_json::Value) -> Result<Option<User>, serde_json::Error> {
    match &value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) if map.is_empty() => Ok(None),
        _ => serde_json::from_value(value).map(Some),
    }
}

#[must_use]
pub fn find_by_username<'a>(users: &'a [User], username: &str) -> Option<&'a User> {
    users
        .iter()
        .find(|u| u.username == username)
        .or_else(|| users.iter().find(|u| u.username.eq_ignore_ascii_case(username)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_ranks_round_trip() {
        let user: User =
            serde_json::from_value(json!({"id": 1, "username": "eve", "rank": "MODERATOR"}))
                .unwrap();
        assert_eq!(user.rank, Rank::Other("MODERATOR".to_owned()));
        assert!(!user.is_admin());
        assert_eq!(serde_json::to_value(&user).unwrap()["rank"], json!("MODERATOR"));
    }

    #[test]
    fn empty_session_means_signed_out() {
        assert_eq!(session_from_value(json!(null)).unwrap(), None);
        assert_eq!(session_from_value(json!({})).unwrap(), None);

        let me = session_from_value(json!({"id": 1, "username": "root", "rank": "ADMIN"}))
            .unwrap()
            .unwrap();
        assert!(me.is_admin());
        assert!(session_from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn username_lookup_prefers_exact_match() {
        let users: Vec<User> = serde_json::from_value(json!([
            {"id": 1, "username": "Alice", "rank": "USER"},
            {"id": 2, "username": "alice", "rank": "USER"}
        ]))
        .unwrap();
        assert_eq!(
            find_by_username(&users, "alice").and_then(|u| u.id.clone()),
            Some(RecordId::Int(2))
        );
        assert_eq!(
            find_by_username(&users, "ALICE").and_then(|u| u.id.clone()),
            Some(RecordId::Int(1))
        );
        assert!(find_by_username(&users, "bob").is_none());
    }
}

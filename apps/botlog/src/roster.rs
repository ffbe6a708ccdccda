//! Editable list of bot administrators.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterUser {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(default)]
    pub email: String,
}

fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    users: Vec<RosterUser>,
}

impl Roster {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let users = if raw.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(raw)?
        };
        Ok(Self { users })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.users)
    }

    pub fn users(&self) -> &[RosterUser] {
        &self.users
    }

    /// Adds `user` unless one with the same id is already listed.
    pub fn add(&mut self, user: RosterUser) -> bool {
        if self.users.iter().any(|existing| existing.id == user.id) {
            debug!(target = "botlog.roster", id = %user.id, "user already listed");
            return false;
        }
        self.users.push(user);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<RosterUser> {
        let idx = self.users.iter().position(|user| user.id == id)?;
        Some(self.users.remove(idx))
    }

    /// Value of the hidden form input: ids joined by commas.
    pub fn render_input(&self) -> String {
        self.users
            .iter()
            .map(|user| user.id.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> RosterUser {
        RosterUser {
            id: id.into(),
            email: email.into(),
        }
    }

    #[test]
    fn loads_numeric_and_text_ids() {
        let roster =
            Roster::from_json(r#"[{"id": 3, "email": "a@example.com"}, {"id": "7", "email": "b@example.com"}]"#)
                .expect("roster");
        assert_eq!(roster.render_input(), "3,7");
    }

    #[test]
    fn add_ignores_duplicates_and_remove_drops() {
        let mut roster = Roster::default();
        assert!(roster.add(user("1", "a@example.com")));
        assert!(!roster.add(user("1", "other@example.com")));
        assert!(roster.add(user("2", "b@example.com")));
        assert_eq!(roster.render_input(), "1,2");

        assert_eq!(roster.remove("1").map(|u| u.email), Some("a@example.com".into()));
        assert!(roster.remove("1").is_none());
        assert_eq!(roster.render_input(), "2");
    }

    #[test]
    fn empty_input_is_an_empty_roster() {
        assert!(Roster::from_json("  ").expect("roster").users().is_empty());
        assert!(Roster::from_json("{").is_err());
    }
}

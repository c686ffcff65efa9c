//! Session and user types.

use crate::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider-issued proof of authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub issued_credential: Vec<u8>,
    pub expiry: Option<DateTime<Utc>>,
}

impl Session {
    /// The session's user id as a UUID.
    pub fn user_uuid(&self) -> Result<Uuid, AuthError> {
        parse_user_id(&self.user_id)
    }

    pub fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= Utc::now())
    }
}

// Keeps the credential out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("issued_credential", &format_args!("<{} bytes>", self.issued_credential.len()))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Signed-in user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_affiliation: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Locally cached profile record, keyed by a string id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_affiliation: Option<String>,
}

impl TryFrom<DisplayRecord> for User {
    type Error = AuthError;

    fn try_from(record: DisplayRecord) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_user_id(&record.id)?,
            first_name: record.first_name,
            last_name: record.last_name,
            email: record.email,
            role: record.role,
            lab_affiliation: record.lab_affiliation,
        })
    }
}

impl From<&User> for DisplayRecord {
    fn from(user: &User) -> Self {
        DisplayRecord {
            id: user.id.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            lab_affiliation: user.lab_affiliation.clone(),
        }
    }
}

fn parse_user_id(raw: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(raw).map_err(|_| AuthError::InvalidUserId(raw.to_string()))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

/// Roles recognised by the console. `Admin` bypasses the permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    Leader,
    CoLeader,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Leader => "leader",
            Role::CoLeader => "co-leader",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "leader" => Ok(Role::Leader),
            "co-leader" => Ok(Role::CoLeader),
            "member" => Ok(Role::Member),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UserStatus::Pending),
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            other => Err(ParseEnumError::new("user status", other)),
        }
    }
}

/// Identity record. Credential material never leaves the process: the
/// sensitive fields are skipped when serializing, including in error payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub unit: Option<String>,
    pub status: UserStatus,
    pub is_approved: bool,
    pub is_active: bool,
    pub last_active_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub sessions_revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub mfa_secret: Option<String>,
    #[serde(skip_serializing)]
    pub mfa_backup_codes: Option<Vec<String>>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Counts towards a unit's `memberCount`.
    pub fn counts_as_member_of(&self, unit_name: &str) -> bool {
        self.is_active && !self.is_deleted() && self.unit.as_deref() == Some(unit_name)
    }

    /// Reference point for inactivity: last activity, else approval, else signup.
    pub fn activity_anchor(&self) -> DateTime<Utc> {
        self.last_active_at
            .or(self.approved_at)
            .unwrap_or(self.created_at)
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

/// Signup payload: new users start pending and unapproved.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub unit: Option<String>,
    #[serde(skip)]
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub status: Option<UserStatus>,
    pub unit: Option<String>,
    pub role: Option<Role>,
    pub include_deleted: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if !self.include_deleted.unwrap_or(false) && user.is_deleted() {
            return false;
        }
        if let Some(status) = self.status {
            if user.status != status {
                return false;
            }
        }
        if let Some(unit) = &self.unit {
            if user.unit.as_deref() != Some(unit.as_str()) {
                return false;
            }
        }
        if let Some(role) = self.role {
            if user.role != Some(role) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_strings() {
        for role in [Role::Admin, Role::Leader, Role::CoLeader, Role::Member] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(serde_json::to_value(Role::CoLeader).unwrap(), "co-leader");
    }

    #[test]
    fn activity_anchor_falls_back_to_approval_then_signup() {
        let mut user = crate::testing::user_fixture("anchor@example.com");
        user.last_active_at = None;
        user.approved_at = None;
        assert_eq!(user.activity_anchor(), user.created_at);

        let approved = user.created_at + chrono::Duration::days(1);
        user.approved_at = Some(approved);
        assert_eq!(user.activity_anchor(), approved);

        let seen = approved + chrono::Duration::days(1);
        user.last_active_at = Some(seen);
        assert_eq!(user.activity_anchor(), seen);
    }

    #[test]
    fn sensitive_fields_are_never_serialized() {
        let mut user = crate::testing::user_fixture("secret@example.com");
        user.password_hash = Some("$argon2id$...".to_string());
        user.mfa_secret = Some("JBSWY3DPEHPK3PXP".to_string());
        user.mfa_backup_codes = Some(vec!["1234-5678".to_string()]);

        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("passwordHash").is_none());
        assert!(value.get("mfaSecret").is_none());
        assert!(value.get("mfaBackupCodes").is_none());
        assert_eq!(value["email"], "secret@example.com");
        assert_eq!(value["isApproved"], true);
    }
}

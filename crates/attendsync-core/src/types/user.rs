//! Authenticated user profile and dashboard roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Dashboard role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Institution administrator.
    Admin,
    /// Lecturer running attendance sessions.
    Lecturer,
    /// Student marking attendance.
    Student,
}

impl Role {
    /// Returns the role name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Lecturer => "lecturer",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "lecturer" => Ok(Role::Lecturer),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Profile of the authenticated user.
///
/// Immutable for the lifetime of a session; a re-login replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Backend user ID (numeric IDs are normalized to strings).
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Dashboard role.
    pub role: Role,
}

/// Deserialize an ID sent either as a JSON string or a JSON number.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_id_normalized() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"id": 42, "name": "Ada", "email": "ada@uni.edu", "role": "lecturer"}"#,
        )
        .expect("decode");
        assert_eq!(profile.id, "42");
        assert_eq!(profile.role, Role::Lecturer);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result: Result<UserProfile, _> = serde_json::from_str(
            r#"{"id": "u1", "name": "Ada", "email": "ada@uni.edu", "role": "janitor"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("guest".parse::<Role>().is_err());
    }
}

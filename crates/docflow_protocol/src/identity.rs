//! Identity types shared between the core and the external identity provider.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A role as resolved by the identity boundary.
///
/// Role-string normalization happens once, at the identity boundary (see
/// [`Role::parse`]); the core never sees the space-containing legacy form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    TeamLeader,
    Admin,
}

impl Role {
    /// Parse a role string, accepting the legacy space-containing variant
    /// (`"TEAM LEADER"`) and canonicalizing it to the underscore form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "USER" => Some(Self::User),
            "TEAM_LEADER" | "TEAM LEADER" => Some(Self::TeamLeader),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::TeamLeader => "TEAM_LEADER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The result of resolving a username through the identity boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub role: Role,
    pub teams: Vec<String>,
}

impl Identity {
    pub fn new(role: Role, teams: Vec<String>) -> Self {
        Self { role, teams }
    }

    /// Whether this identity is a team leader for the given team.
    pub fn leads_team(&self, team: &str) -> bool {
        self.role == Role::TeamLeader && self.teams.iter().any(|t| t == team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_and_legacy_space_form() {
        assert_eq!(Role::parse("TEAM_LEADER"), Some(Role::TeamLeader));
        assert_eq!(Role::parse("TEAM LEADER"), Some(Role::TeamLeader));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse("bogus"), None);
    }

    #[test]
    fn leads_team_requires_role_and_membership() {
        let identity = Identity::new(Role::TeamLeader, vec!["AGCC".to_string()]);
        assert!(identity.leads_team("AGCC"));
        assert!(!identity.leads_team("KUSAKABE"));

        let user = Identity::new(Role::User, vec!["AGCC".to_string()]);
        assert!(!user.leads_team("AGCC"));
    }
}

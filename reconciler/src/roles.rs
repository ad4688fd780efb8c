//! Role ordering and effective-role resolution.
//!
//! The API is the source of role *values*; the ordering between them lives here and is
//! never derived from server data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every role known to either vocabulary, declared in ascending privilege so the derived
/// `Ord` is the total order used for resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Billing,
    Member,
    Contributor,
    Admin,
    Manager,
    Owner,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleScope {
    Organization,
    Team,
}

impl fmt::Display for RoleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleScope::Organization => f.write_str("organization"),
            RoleScope::Team => f.write_str("team"),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RoleError {
    #[error("unknown role {0:?}")]
    Unknown(String),

    #[error("role {role} is not valid for a {scope} membership")]
    OutOfScope { role: Role, scope: RoleScope },
}

impl Role {
    pub const ORGANIZATION: &'static [Role] = &[
        Role::Billing,
        Role::Member,
        Role::Admin,
        Role::Manager,
        Role::Owner,
    ];

    pub const TEAM: &'static [Role] = &[
        Role::Member,
        Role::Contributor,
        Role::Admin,
        Role::Manager,
        Role::Owner,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Billing => "billing",
            Role::Member => "member",
            Role::Contributor => "contributor",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Owner => "owner",
        }
    }

    pub fn in_scope(&self, scope: RoleScope) -> bool {
        match scope {
            RoleScope::Organization => Self::ORGANIZATION.contains(self),
            RoleScope::Team => Self::TEAM.contains(self),
        }
    }

    /// Parses `value` and checks that it belongs to the vocabulary of `scope`.
    pub fn parse_scoped(value: &str, scope: RoleScope) -> Result<Role, RoleError> {
        let role: Role = value.parse()?;
        if !role.in_scope(scope) {
            return Err(RoleError::OutOfScope { role, scope });
        }
        Ok(role)
    }

    /// The access an organization-wide role grants on every team of the organization.
    /// Team access tops out at `admin`, so stronger organization roles are capped there.
    pub fn team_grant(self) -> Role {
        self.min(Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "billing" => Ok(Role::Billing),
            "member" => Ok(Role::Member),
            "contributor" => Ok(Role::Contributor),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "owner" => Ok(Role::Owner),
            other => Err(RoleError::Unknown(other.to_string())),
        }
    }
}

/// Returns the higher-ranked of the two roles. A member's access is never lower than the
/// minimum a team requires.
pub fn resolve(member_role: Role, team_minimum_role: Role) -> Role {
    member_role.max(team_minimum_role)
}

/// [`resolve`] over raw API values. Unrecognized values are rejected rather than ranked.
pub fn resolve_str(member_role: &str, team_minimum_role: &str) -> Result<Role, RoleError> {
    Ok(resolve(member_role.parse()?, team_minimum_role.parse()?))
}

/// Effective access of an organization member on one team: the team role, raised to whatever
/// the member's organization role already grants on every team.
pub fn effective_team_role(organization_role: Role, team_role: Role) -> Role {
    resolve(organization_role.team_grant(), team_role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        let ascending = [
            Role::Billing,
            Role::Member,
            Role::Contributor,
            Role::Admin,
            Role::Manager,
            Role::Owner,
        ];
        for pair in ascending.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve(Role::Member, Role::Contributor), Role::Contributor);
        assert_eq!(resolve(Role::Owner, Role::Contributor), Role::Owner);
        assert_eq!(resolve(Role::Admin, Role::Admin), Role::Admin);
        assert_eq!(resolve(Role::Billing, Role::Member), Role::Member);
    }

    #[test]
    fn test_resolve_str() {
        assert_eq!(resolve_str("member", "contributor"), Ok(Role::Contributor));
        assert_eq!(
            resolve_str("superadmin", "member"),
            Err(RoleError::Unknown("superadmin".into()))
        );
        assert_eq!(
            resolve_str("member", "Admin"),
            Err(RoleError::Unknown("Admin".into()))
        );
    }

    #[test]
    fn test_effective_team_role() {
        // (organization role, team role, effective role)
        let table = [
            (Role::Member, Role::Contributor, Role::Contributor),
            (Role::Member, Role::Admin, Role::Admin),
            (Role::Owner, Role::Contributor, Role::Admin),
            (Role::Owner, Role::Admin, Role::Admin),
            (Role::Manager, Role::Contributor, Role::Admin),
            (Role::Billing, Role::Contributor, Role::Contributor),
        ];
        for (org_role, team_role, expected) in table {
            assert_eq!(
                effective_team_role(org_role, team_role),
                expected,
                "org role {org_role}, team role {team_role}"
            );
        }
    }

    #[test]
    fn test_scopes() {
        assert_eq!(
            Role::parse_scoped("billing", RoleScope::Organization),
            Ok(Role::Billing)
        );
        assert_eq!(
            Role::parse_scoped("contributor", RoleScope::Organization),
            Err(RoleError::OutOfScope {
                role: Role::Contributor,
                scope: RoleScope::Organization
            })
        );
        assert_eq!(
            Role::parse_scoped("contributor", RoleScope::Team),
            Ok(Role::Contributor)
        );
        assert!(Role::parse_scoped("billing", RoleScope::Team).is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Role::Owner).unwrap(), r#""owner""#);
        let role: Role = serde_json::from_str(r#""contributor""#).unwrap();
        assert_eq!(role, Role::Contributor);
    }
}

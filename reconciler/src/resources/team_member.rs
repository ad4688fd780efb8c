//! Team membership of an organization member.
//!
//! The membership has no endpoint of its own. It is read from the member record, which
//! lists a role for every team the member belongs to; a team missing from that list means
//! the membership is absent.
//!
//! `effective_role` is derived here from the member's organization role and the team role
//! and is never sent.

use super::{ResourceKind, roll_back};
use super::organization_member::{ApiMember, member_path};
use crate::client::{ApiClient, ApiError};
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{Field, Patch, field};
use crate::roles::{Role, RoleScope, effective_team_role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Role reported for a membership that has no explicit team role.
const DEFAULT_TEAM_ROLE: Role = Role::Contributor;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamMemberModel {
    pub organization: String,
    pub team: String,
    pub member_id: String,
    pub role: String,
    pub effective_role: Option<String>,
}

pub struct TeamMember;

fn membership_path(id: &Identity) -> String {
    format!(
        "organizations/{}/members/{}/teams/{}/",
        id.part(0),
        id.part(2),
        id.part(1)
    )
}

/// Picks the team role to record. The server may answer with a role raised by the member's
/// organization role; as long as that grants the same access as the prior role, the prior
/// one is kept so the membership does not show drift.
fn reported_role(organization_role: Role, server_role: Role, prior: Option<&str>) -> Role {
    let effective = effective_team_role(organization_role, server_role);
    match prior.and_then(|role| role.parse::<Role>().ok()) {
        Some(prior) if effective_team_role(organization_role, prior) == effective => prior,
        _ => server_role,
    }
}

#[async_trait]
impl ResourceKind for TeamMember {
    type Model = TeamMemberModel;

    const TYPE_NAME: &'static str = "team_member";
    const ID_LABELS: &'static [&'static str] = &["organization-slug", "team-slug", "member-id"];

    fn fields(&self) -> Vec<Field<TeamMemberModel>> {
        vec![
            field!(TeamMemberModel, Required, Scalar, role => "teamRole"),
            field!(TeamMemberModel, Computed, Scalar, effective_role => "effectiveRole"),
        ]
    }

    fn validate(&self, intent: &TeamMemberModel) -> Result<(), ReconcileError> {
        Role::parse_scoped(&intent.role, RoleScope::Team)?;
        Ok(())
    }

    async fn create(
        &self,
        client: &ApiClient,
        intent: &TeamMemberModel,
    ) -> Result<Identity, ReconcileError> {
        let id = Identity::from_parts([
            intent.organization.as_str(),
            &intent.team,
            &intent.member_id,
        ])?;
        let path = membership_path(&id);

        tracing::debug!(
            organization = %intent.organization,
            team = %intent.team,
            member_id = %intent.member_id,
            "Adding member to team"
        );
        let _: serde_json::Value = client.post(&path, &json!({})).await?;

        tracing::debug!(member_id = %intent.member_id, role = %intent.role, "Setting team role");
        let set_role: Result<serde_json::Value, ApiError> =
            client.put(&path, &json!({"teamRole": intent.role})).await;
        if let Err(e) = set_role {
            return Err(roll_back(client, &path, e).await);
        }

        Ok(id)
    }

    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        prior: Option<&TeamMemberModel>,
    ) -> Result<TeamMemberModel, ReconcileError> {
        let path = member_path(id.part(0), id.part(2));
        let member: ApiMember = client.get(&path).await?;

        let Some(membership) = member
            .team_roles
            .iter()
            .find(|team_role| team_role.team_slug == id.part(1))
        else {
            tracing::debug!(team = id.part(1), member_id = id.part(2), "Member is not on team");
            return Err(ApiError::NotFound { path }.into());
        };

        let organization_role: Role = member.org_role.parse()?;
        let server_role = match &membership.role {
            Some(role) => role.parse::<Role>()?,
            None => DEFAULT_TEAM_ROLE,
        };
        let role = reported_role(
            organization_role,
            server_role,
            prior.map(|p| p.role.as_str()),
        );

        Ok(TeamMemberModel {
            organization: id.part(0).to_string(),
            team: id.part(1).to_string(),
            member_id: id.part(2).to_string(),
            role: role.to_string(),
            effective_role: Some(effective_team_role(organization_role, role).to_string()),
        })
    }

    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        _intent: &TeamMemberModel,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError> {
        let _: serde_json::Value = client.put(&membership_path(id), patch).await?;
        Ok(id.clone())
    }

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError> {
        client.delete(&membership_path(id)).await?;
        Ok(())
    }
}

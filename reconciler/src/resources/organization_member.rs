use super::ResourceKind;
use crate::client::ApiClient;
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{Field, Patch, field};
use crate::roles::{Role, RoleScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationMemberModel {
    pub organization: String,
    pub email: String,
    pub role: String,
    pub internal_id: Option<String>,
    pub user_id: Option<String>,
    pub pending: Option<bool>,
    pub expired: Option<bool>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ApiUser {
    pub id: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiTeamRole {
    pub team_slug: String,
    pub role: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiMember {
    pub id: String,
    #[serde(default)]
    pub email: String,
    pub org_role: String,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub expired: bool,
    pub user: Option<ApiUser>,
    #[serde(default)]
    pub team_roles: Vec<ApiTeamRole>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteMember<'a> {
    email: &'a str,
    org_role: &'a str,
}

pub struct OrganizationMember;

pub(crate) fn member_path(organization: &str, member_id: &str) -> String {
    format!("organizations/{organization}/members/{member_id}/")
}

#[async_trait]
impl ResourceKind for OrganizationMember {
    type Model = OrganizationMemberModel;

    const TYPE_NAME: &'static str = "organization_member";
    const ID_LABELS: &'static [&'static str] = &["organization-slug", "membership-id"];

    /// Only the organization role can change; a new email is a new invitation.
    fn fields(&self) -> Vec<Field<OrganizationMemberModel>> {
        vec![
            field!(OrganizationMemberModel, Required, Scalar, role => "orgRole"),
            field!(OrganizationMemberModel, Computed, Scalar, internal_id => "id"),
            field!(OrganizationMemberModel, Computed, Scalar, user_id => "userId"),
            field!(OrganizationMemberModel, Computed, Scalar, pending => "pending"),
            field!(OrganizationMemberModel, Computed, Scalar, expired => "expired"),
        ]
    }

    fn validate(&self, intent: &OrganizationMemberModel) -> Result<(), ReconcileError> {
        Role::parse_scoped(&intent.role, RoleScope::Organization)?;
        Ok(())
    }

    async fn create(
        &self,
        client: &ApiClient,
        intent: &OrganizationMemberModel,
    ) -> Result<Identity, ReconcileError> {
        tracing::debug!(
            organization = %intent.organization,
            email = %intent.email,
            "Inviting organization member"
        );
        let body = InviteMember {
            email: &intent.email,
            org_role: &intent.role,
        };
        let member: ApiMember = client
            .post(&format!("organizations/{}/members/", intent.organization), &body)
            .await?;
        Ok(Identity::from_parts([intent.organization.as_str(), &member.id])?)
    }

    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        _prior: Option<&OrganizationMemberModel>,
    ) -> Result<OrganizationMemberModel, ReconcileError> {
        let member: ApiMember = client.get(&member_path(id.part(0), id.part(1))).await?;
        Ok(OrganizationMemberModel {
            organization: id.part(0).to_string(),
            email: member.email,
            role: member.org_role,
            internal_id: Some(member.id),
            user_id: member.user.map(|user| user.id),
            pending: Some(member.pending),
            expired: Some(member.expired),
        })
    }

    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        _intent: &OrganizationMemberModel,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError> {
        let _: ApiMember = client
            .put(&member_path(id.part(0), id.part(1)), patch)
            .await?;
        Ok(id.clone())
    }

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError> {
        client.delete(&member_path(id.part(0), id.part(1))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::roles::RoleError;
    use crate::state::{InstanceState, StateStore};
    use crate::testutils::{FakeTransport, created, ok};
    use http::Method;
    use serde_json::json;

    fn member_json(role: &str) -> serde_json::Value {
        json!({
            "id": "42",
            "email": "jane@example.com",
            "orgRole": role,
            "pending": true,
            "expired": false,
            "user": null,
            "teamRoles": [],
        })
    }

    fn intent(role: &str) -> OrganizationMemberModel {
        OrganizationMemberModel {
            organization: "acme".into(),
            email: "jane@example.com".into(),
            role: role.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invite_and_change_role() {
        let transport = FakeTransport::new(|request| match request.method {
            Method::POST => created(member_json("member")),
            Method::PUT => ok(member_json("admin")),
            _ => ok(member_json("member")),
        });
        let client = transport.client();
        let mut state = InstanceState::new();

        lifecycle::create(&OrganizationMember, &client, &mut state, &intent("member"))
            .await
            .unwrap();
        assert_eq!(state.id(), Some("acme/42"));
        assert_eq!(state.get("pending"), Some(&json!(true)));
        assert_eq!(
            transport.writes()[0].body,
            Some(json!({"email": "jane@example.com", "orgRole": "member"}))
        );

        lifecycle::update(&OrganizationMember, &client, &mut state, &intent("admin"))
            .await
            .unwrap();
        let put = transport.writes().pop().unwrap();
        assert_eq!(put.path, "organizations/acme/members/42/");
        assert_eq!(put.body, Some(json!({"orgRole": "admin"})));
    }

    #[tokio::test]
    async fn test_rejects_team_only_role() {
        let transport = FakeTransport::new(|_| ok(member_json("member")));
        let client = transport.client();
        let mut state = InstanceState::new();

        let err = lifecycle::create(&OrganizationMember, &client, &mut state, &intent("contributor"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Role(RoleError::OutOfScope { role: Role::Contributor, .. })
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_import_malformed_id() {
        let transport = FakeTransport::new(|_| ok(member_json("member")));
        let client = transport.client();
        let mut state = InstanceState::new();

        let err = lifecycle::import(&OrganizationMember, &client, &mut state, "acme")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not recover membership-id"));
        assert!(transport.calls().is_empty());
        assert_eq!(state.id(), None);
    }
}

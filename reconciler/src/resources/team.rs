use super::ResourceKind;
use crate::client::ApiClient;
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{Field, Patch, field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamModel {
    pub organization: String,
    pub name: String,
    pub slug: Option<String>,
    pub internal_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ApiTeam {
    pub id: String,
    pub slug: String,
    pub name: String,
}

#[derive(Serialize)]
struct CreateTeam<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    slug: Option<&'a str>,
}

pub struct Team;

fn team_path(id: &Identity) -> String {
    format!("teams/{}/{}/", id.part(0), id.part(1))
}

#[async_trait]
impl ResourceKind for Team {
    type Model = TeamModel;

    const TYPE_NAME: &'static str = "team";
    const ID_LABELS: &'static [&'static str] = &["organization-slug", "team-slug"];

    fn fields(&self) -> Vec<Field<TeamModel>> {
        vec![
            field!(TeamModel, Required, Scalar, name => "name"),
            field!(TeamModel, OptionalComputed, Scalar, slug => "slug"),
            field!(TeamModel, Computed, Scalar, internal_id => "id"),
        ]
    }

    async fn create(
        &self,
        client: &ApiClient,
        intent: &TeamModel,
    ) -> Result<Identity, ReconcileError> {
        let body = CreateTeam {
            name: &intent.name,
            slug: intent.slug.as_deref(),
        };
        tracing::debug!(organization = %intent.organization, name = %intent.name, "Creating team");
        let team: ApiTeam = client
            .post(&format!("organizations/{}/teams/", intent.organization), &body)
            .await?;
        Ok(Identity::from_parts([intent.organization.as_str(), &team.slug])?)
    }

    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        _prior: Option<&TeamModel>,
    ) -> Result<TeamModel, ReconcileError> {
        let team: ApiTeam = client.get(&team_path(id)).await?;
        Ok(TeamModel {
            organization: id.part(0).to_string(),
            name: team.name,
            slug: Some(team.slug),
            internal_id: Some(team.id),
        })
    }

    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        _intent: &TeamModel,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError> {
        let team: ApiTeam = client.put(&team_path(id), patch).await?;
        Ok(Identity::from_parts([id.part(0), &team.slug])?)
    }

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError> {
        client.delete(&team_path(id)).await?;
        Ok(())
    }
}

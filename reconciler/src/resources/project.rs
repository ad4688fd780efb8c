use super::{ResourceKind, roll_back};
use crate::client::{ApiClient, ApiError};
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{Field, Patch, field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectModel {
    pub organization: String,
    /// Team the project is created under.
    pub team: String,
    pub name: String,
    pub slug: Option<String>,
    pub platform: Option<String>,
    /// Hours after which an issue is resolved automatically.
    pub resolve_age: Option<i64>,
    pub internal_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ApiTeamRef {
    pub slug: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiProject {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub platform: Option<String>,
    pub resolve_age: Option<i64>,
    #[serde(default)]
    pub teams: Vec<ApiTeamRef>,
}

#[derive(Serialize)]
struct CreateProject<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    slug: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<&'a str>,
}

pub struct Project;

fn project_path(id: &Identity) -> String {
    format!("projects/{}/{}/", id.part(0), id.part(1))
}

#[async_trait]
impl ResourceKind for Project {
    type Model = ProjectModel;

    const TYPE_NAME: &'static str = "project";
    const ID_LABELS: &'static [&'static str] = &["organization-slug", "project-slug"];

    fn fields(&self) -> Vec<Field<ProjectModel>> {
        vec![
            field!(ProjectModel, Required, Scalar, name => "name"),
            field!(ProjectModel, OptionalComputed, Scalar, slug => "slug"),
            field!(ProjectModel, Optional, Scalar, platform => "platform"),
            field!(ProjectModel, OptionalComputed, Scalar, resolve_age => "resolveAge"),
            field!(ProjectModel, Computed, Scalar, internal_id => "id"),
        ]
    }

    async fn create(
        &self,
        client: &ApiClient,
        intent: &ProjectModel,
    ) -> Result<Identity, ReconcileError> {
        let body = CreateProject {
            name: &intent.name,
            slug: intent.slug.as_deref(),
            platform: intent.platform.as_deref(),
        };
        tracing::debug!(
            organization = %intent.organization,
            team = %intent.team,
            name = %intent.name,
            "Creating project"
        );
        let project: ApiProject = client
            .post(
                &format!("teams/{}/{}/projects/", intent.organization, intent.team),
                &body,
            )
            .await?;
        let id = Identity::from_parts([intent.organization.as_str(), &project.slug])?;

        // Not accepted on create
        if let Some(resolve_age) = intent.resolve_age {
            if project.resolve_age != Some(resolve_age) {
                let path = project_path(&id);
                let update: Result<ApiProject, ApiError> =
                    client.put(&path, &json!({"resolveAge": resolve_age})).await;
                if let Err(e) = update {
                    return Err(roll_back(client, &path, e).await);
                }
            }
        }
        Ok(id)
    }

    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        prior: Option<&ProjectModel>,
    ) -> Result<ProjectModel, ReconcileError> {
        let project: ApiProject = client.get(&project_path(id)).await?;

        // Keep the declared team while the project still belongs to it
        let team = match prior {
            Some(prior) if project.teams.iter().any(|t| t.slug == prior.team) => {
                prior.team.clone()
            }
            _ => project
                .teams
                .first()
                .map(|t| t.slug.clone())
                .unwrap_or_default(),
        };

        Ok(ProjectModel {
            organization: id.part(0).to_string(),
            team,
            name: project.name,
            slug: Some(project.slug),
            platform: project.platform,
            resolve_age: project.resolve_age,
            internal_id: Some(project.id),
        })
    }

    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        _intent: &ProjectModel,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError> {
        let project: ApiProject = client.put(&project_path(id), patch).await?;
        Ok(Identity::from_parts([id.part(0), &project.slug])?)
    }

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError> {
        client.delete(&project_path(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::state::{InstanceState, StateStore};
    use crate::testutils::{FakeTransport, created, no_content, ok, server_error};
    use http::Method;

    fn project_json(platform: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "1001",
            "slug": "web",
            "name": "Web",
            "platform": platform,
            "resolveAge": 720,
            "teams": [{"slug": "frontend"}, {"slug": "backend"}],
        })
    }

    fn intent(platform: Option<&str>) -> ProjectModel {
        ProjectModel {
            organization: "acme".into(),
            team: "backend".into(),
            name: "Web".into(),
            slug: Some("web".into()),
            platform: platform.map(String::from),
            resolve_age: None,
            internal_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_under_team() {
        let transport = FakeTransport::new(|request| match request.method {
            Method::POST => created(project_json(json!("javascript"))),
            _ => ok(project_json(json!("javascript"))),
        });
        let client = transport.client();
        let mut state = InstanceState::new();

        lifecycle::create(&Project, &client, &mut state, &intent(Some("javascript")))
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].path, "teams/acme/backend/projects/");
        assert_eq!(state.id(), Some("acme/web"));
        // Second team in the list, kept because it was declared
        assert_eq!(state.get("team"), Some(&json!("backend")));
        // Server default stands when unset
        assert_eq!(state.get("resolve_age"), Some(&json!(720)));
        assert_eq!(transport.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_clearing_platform_sends_null() {
        let transport = FakeTransport::new(|request| match request.method {
            Method::PUT => ok(project_json(serde_json::Value::Null)),
            _ => ok(project_json(json!("javascript"))),
        });
        let client = transport.client();
        let mut state = InstanceState::new();

        lifecycle::import(&Project, &client, &mut state, "acme/web")
            .await
            .unwrap();
        assert_eq!(state.get("team"), Some(&json!("frontend")));

        let mut desired = intent(None);
        desired.team = "frontend".into();
        lifecycle::update(&Project, &client, &mut state, &desired)
            .await
            .unwrap();

        let put = transport.writes().pop().unwrap();
        assert_eq!(put.body, Some(json!({"platform": null})));
    }

    #[tokio::test]
    async fn test_failed_resolve_age_deletes_project() {
        let transport = FakeTransport::new(|request| match request.method {
            Method::POST => created(project_json(json!("python"))),
            Method::PUT => server_error(),
            Method::DELETE => no_content(),
            _ => ok(project_json(json!("python"))),
        });
        let client = transport.client();
        let mut state = InstanceState::new();

        let mut desired = intent(Some("python"));
        desired.resolve_age = Some(24);
        let err = lifecycle::create(&Project, &client, &mut state, &desired)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Api(ApiError::Status { status, .. })
                if status == http::StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert_eq!(state.id(), None);
        let writes: Vec<_> = transport
            .writes()
            .into_iter()
            .map(|call| (call.method, call.path))
            .collect();
        assert_eq!(
            writes,
            [
                (Method::POST, "teams/acme/backend/projects/".to_string()),
                (Method::PUT, "projects/acme/web/".to_string()),
                (Method::DELETE, "projects/acme/web/".to_string()),
            ]
        );
    }
}

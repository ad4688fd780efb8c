//! Read-only lookups. These never touch state, so a missing object is always an error.

use crate::client::{ApiClient, ApiError};
use crate::errors::ReconcileError;
use crate::resources::client_key::{ApiClientKey, ClientKeyModel, keys_path};
use crate::resources::organization::ApiOrganization;
use crate::resources::organization_member::ApiMember;
use crate::resources::project::ApiProject;
use crate::resources::team::ApiTeam;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationSummary {
    pub slug: String,
    pub name: String,
    pub internal_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub id: String,
    pub email: String,
    pub role: String,
    pub user_id: Option<String>,
    pub pending: bool,
    pub expired: bool,
}

impl From<ApiMember> for MemberSummary {
    fn from(member: ApiMember) -> Self {
        MemberSummary {
            id: member.id,
            email: member.email,
            role: member.org_role,
            user_id: member.user.map(|user| user.id),
            pending: member.pending,
            expired: member.expired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamSummary {
    pub id: String,
    pub slug: String,
    pub name: String,
}

/// An installed third-party integration, such as a GitHub organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationSummary {
    pub id: String,
    pub internal_id: String,
    pub organization: String,
    pub provider_key: String,
    pub name: String,
}

#[derive(Deserialize, Debug)]
struct ApiIntegrationProvider {
    key: String,
}

#[derive(Deserialize, Debug)]
struct ApiIntegration {
    id: String,
    name: String,
    provider: ApiIntegrationProvider,
}

/// How [`client_key`] picks one key of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelector {
    Id(String),
    /// First key with this name, in server order.
    Name(String),
    /// First key in server order.
    First,
}

fn not_found(kind: &'static str, query: impl Into<String>) -> ReconcileError {
    ReconcileError::NotFound {
        kind,
        query: query.into(),
    }
}

fn or_not_found(err: ApiError, kind: &'static str, query: &str) -> ReconcileError {
    if err.is_not_found() {
        not_found(kind, query)
    } else {
        err.into()
    }
}

pub async fn organization(
    client: &ApiClient,
    slug: &str,
) -> Result<OrganizationSummary, ReconcileError> {
    let organization: ApiOrganization = client
        .get(&format!("organizations/{slug}/"))
        .await
        .map_err(|e| or_not_found(e, "organization", slug))?;
    Ok(OrganizationSummary {
        slug: organization.slug,
        name: organization.name,
        internal_id: organization.id,
    })
}

pub async fn all_organization_members(
    client: &ApiClient,
    organization: &str,
) -> Result<Vec<MemberSummary>, ReconcileError> {
    let members: Vec<ApiMember> = client
        .list_all(&format!("organizations/{organization}/members/"))
        .await
        .map_err(|e| or_not_found(e, "organization", organization))?;
    tracing::debug!(organization, count = members.len(), "Listed organization members");
    Ok(members.into_iter().map(MemberSummary::from).collect())
}

/// Stops paging at the first member with this email.
pub async fn organization_member(
    client: &ApiClient,
    organization: &str,
    email: &str,
) -> Result<MemberSummary, ReconcileError> {
    let member = client
        .find_first(
            &format!("organizations/{organization}/members/"),
            |member: &ApiMember| member.email == email,
        )
        .await
        .map_err(|e| or_not_found(e, "organization", organization))?;
    member
        .map(MemberSummary::from)
        .ok_or_else(|| not_found("organization_member", format!("{organization}/{email}")))
}

pub async fn all_teams(
    client: &ApiClient,
    organization: &str,
) -> Result<Vec<TeamSummary>, ReconcileError> {
    let teams: Vec<ApiTeam> = client
        .list_all(&format!("organizations/{organization}/teams/"))
        .await
        .map_err(|e| or_not_found(e, "organization", organization))?;
    Ok(teams
        .into_iter()
        .map(|team| TeamSummary {
            id: team.id,
            slug: team.slug,
            name: team.name,
        })
        .collect())
}

/// Stops paging at the first integration of `provider_key` named `name`.
pub async fn organization_integration(
    client: &ApiClient,
    organization: &str,
    provider_key: &str,
    name: &str,
) -> Result<IntegrationSummary, ReconcileError> {
    let integration = client
        .find_first(
            &format!("organizations/{organization}/integrations/"),
            |integration: &ApiIntegration| {
                integration.provider.key == provider_key && integration.name == name
            },
        )
        .await
        .map_err(|e| or_not_found(e, "organization", organization))?;
    let integration = integration.ok_or_else(|| {
        not_found(
            "organization_integration",
            format!("{organization}/{provider_key}/{name}"),
        )
    })?;

    Ok(IntegrationSummary {
        id: integration.id.clone(),
        internal_id: integration.id,
        organization: organization.to_string(),
        provider_key: integration.provider.key,
        name: integration.name,
    })
}

/// Every project the token can see, keyed by project ID.
pub async fn project_id_to_slug(
    client: &ApiClient,
) -> Result<IndexMap<String, String>, ReconcileError> {
    let projects: Vec<ApiProject> = client.list_all("projects/").await?;
    Ok(projects
        .into_iter()
        .map(|project| (project.id, project.slug))
        .collect())
}

pub async fn all_client_keys(
    client: &ApiClient,
    organization: &str,
    project: &str,
) -> Result<Vec<ClientKeyModel>, ReconcileError> {
    let keys: Vec<ApiClientKey> = client
        .list_all(&keys_path(organization, project))
        .await
        .map_err(|e| or_not_found(e, "project", &format!("{organization}/{project}")))?;
    Ok(keys
        .into_iter()
        .map(|key| key.into_model(organization, project))
        .collect())
}

pub async fn client_key(
    client: &ApiClient,
    organization: &str,
    project: &str,
    selector: &KeySelector,
) -> Result<ClientKeyModel, ReconcileError> {
    let path = keys_path(organization, project);
    let query = format!("{organization}/{project}");

    let key = match selector {
        KeySelector::Id(id) => {
            let key: ApiClientKey = client
                .get(&format!("{path}{id}/"))
                .await
                .map_err(|e| or_not_found(e, "client_key", &format!("{query}/{id}")))?;
            Some(key)
        }
        KeySelector::Name(name) => client
            .find_first(&path, |key: &ApiClientKey| &key.name == name)
            .await
            .map_err(|e| or_not_found(e, "project", &query))?,
        KeySelector::First => {
            let page = client
                .list_page::<ApiClientKey>(&path, None)
                .await
                .map_err(|e| or_not_found(e, "project", &query))?;
            page.items.into_iter().next()
        }
    };

    key.map(|key| key.into_model(organization, project))
        .ok_or_else(|| not_found("client_key", format!("{query} ({selector:?})")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{FakeTransport, cursor_of, not_found as missing, ok, page};
    use serde_json::json;

    fn member(id: &str, email: &str) -> serde_json::Value {
        json!({
            "id": id,
            "email": email,
            "orgRole": "member",
            "pending": false,
            "expired": false,
            "user": {"id": format!("u{id}")},
            "teamRoles": [],
        })
    }

    /// Members over three pages: [1, 2], [3, 4], [5].
    fn members_server() -> std::sync::Arc<FakeTransport> {
        FakeTransport::new(|request| match cursor_of(request) {
            None => page(json!([member("1", "a@x"), member("2", "b@x")]), Some("c1")),
            Some("c1") => page(json!([member("3", "c@x"), member("4", "d@x")]), Some("c2")),
            Some("c2") => page(json!([member("5", "e@x")]), None),
            Some(_) => missing(),
        })
    }

    #[tokio::test]
    async fn test_all_members_in_server_order() {
        let transport = members_server();
        let client = transport.client();

        let members = all_organization_members(&client, "acme").await.unwrap();
        let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4", "5"]);
        assert_eq!(members[0].user_id.as_deref(), Some("u1"));
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_member_by_email_stops_early() {
        let transport = members_server();
        let client = transport.client();

        let found = organization_member(&client, "acme", "c@x").await.unwrap();
        assert_eq!(found.id, "3");
        assert_eq!(transport.calls().len(), 2);

        let err = organization_member(&client, "acme", "nobody@x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::NotFound { kind: "organization_member", .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_organization() {
        let transport = FakeTransport::new(|_| missing());
        let client = transport.client();

        let err = organization(&client, "gone").await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::NotFound { kind: "organization", ref query } if query == "gone"
        ));
    }

    #[tokio::test]
    async fn test_organization_integration() {
        let integration = |id: &str, provider: &str, name: &str| {
            json!({
                "id": id,
                "name": name,
                "provider": {"key": provider, "name": provider},
                "status": "active",
            })
        };
        let transport = FakeTransport::new(move |request| {
            match (request.path.as_str(), cursor_of(request)) {
                ("organizations/acme/integrations/", None) => page(
                    json!([
                        integration("11", "slack", "acme"),
                        integration("12", "github", "other-org"),
                    ]),
                    Some("c1"),
                ),
                ("organizations/acme/integrations/", Some("c1")) => {
                    page(json!([integration("13", "github", "acme")]), None)
                }
                _ => missing(),
            }
        });
        let client = transport.client();

        let found = organization_integration(&client, "acme", "github", "acme")
            .await
            .unwrap();
        assert_eq!(found.id, "13");
        assert_eq!(found.internal_id, found.id);
        assert_eq!(found.organization, "acme");
        assert_eq!(found.provider_key, "github");
        assert_eq!(transport.calls().len(), 2);

        // Same name under another provider does not match
        let err = organization_integration(&client, "acme", "gitlab", "acme")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::NotFound { kind: "organization_integration", ref query }
                if query == "acme/gitlab/acme"
        ));

        let err = organization_integration(&client, "gone", "github", "acme")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound { kind: "organization", .. }));
    }

    #[tokio::test]
    async fn test_project_id_to_slug() {
        let transport = FakeTransport::new(|request| match cursor_of(request) {
            None => page(
                json!([{"id": "1", "slug": "web", "name": "Web"}]),
                Some("c1"),
            ),
            _ => page(json!([{"id": "2", "slug": "api", "name": "API"}]), None),
        });
        let client = transport.client();

        let projects = project_id_to_slug(&client).await.unwrap();
        assert_eq!(projects.get("1").map(String::as_str), Some("web"));
        assert_eq!(projects.get("2").map(String::as_str), Some("api"));
        assert_eq!(transport.calls()[0].path, "projects/");
    }

    #[tokio::test]
    async fn test_client_key_selectors() {
        let key = |id: &str, name: &str| {
            json!({
                "id": id,
                "name": name,
                "projectId": 1001,
                "public": id,
                "dsn": {"public": format!("https://{id}@o1.ingest.sentry.io/1001")},
            })
        };
        let transport = FakeTransport::new(move |request| {
            match (request.path.as_str(), cursor_of(request)) {
                ("projects/acme/web/keys/k2/", _) => ok(key("k2", "Backend")),
                ("projects/acme/web/keys/", None) => {
                    page(json!([key("k1", "Default"), key("k2", "Backend")]), Some("c1"))
                }
                ("projects/acme/web/keys/", Some("c1")) => page(json!([key("k3", "CI")]), None),
                _ => missing(),
            }
        });
        let client = transport.client();

        let first = client_key(&client, "acme", "web", &KeySelector::First)
            .await
            .unwrap();
        assert_eq!(first.public.as_deref(), Some("k1"));

        let by_id = client_key(&client, "acme", "web", &KeySelector::Id("k2".into()))
            .await
            .unwrap();
        assert_eq!(by_id.name, "Backend");

        let by_name = client_key(&client, "acme", "web", &KeySelector::Name("CI".into()))
            .await
            .unwrap();
        assert_eq!(by_name.public.as_deref(), Some("k3"));
        assert_eq!(by_name.project_id.as_deref(), Some("1001"));

        let err = client_key(&client, "acme", "web", &KeySelector::Id("k9".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound { kind: "client_key", .. }));

        let all = all_client_keys(&client, "acme", "web").await.unwrap();
        assert_eq!(all.len(), 3);
    }
}

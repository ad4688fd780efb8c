use super::{ResourceKind, id_string};
use crate::client::ApiClient;
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{Field, Patch, field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Seconds.
    pub window: i64,
    pub count: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientKeyModel {
    pub organization: String,
    pub project: String,
    pub name: String,
    /// `None` means no limit.
    pub rate_limit: Option<RateLimit>,
    pub project_id: Option<String>,
    pub public: Option<String>,
    pub secret: Option<String>,
    pub dsn_public: Option<String>,
    pub dsn_secret: Option<String>,
    pub dsn_csp: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct ApiDsn {
    pub public: Option<String>,
    pub secret: Option<String>,
    pub csp: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiClientKey {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub project_id: Value,
    pub public: Option<String>,
    pub secret: Option<String>,
    #[serde(default)]
    pub dsn: ApiDsn,
    pub rate_limit: Option<RateLimit>,
}

impl ApiClientKey {
    pub(crate) fn into_model(self, organization: &str, project: &str) -> ClientKeyModel {
        ClientKeyModel {
            organization: organization.to_string(),
            project: project.to_string(),
            name: self.name,
            rate_limit: self.rate_limit,
            project_id: Some(id_string(&self.project_id)).filter(|id| !id.is_empty()),
            public: self.public,
            secret: self.secret,
            dsn_public: self.dsn.public,
            dsn_secret: self.dsn.secret,
            dsn_csp: self.dsn.csp,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateKey<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limit: Option<RateLimit>,
}

pub struct ClientKey;

pub(crate) fn keys_path(organization: &str, project: &str) -> String {
    format!("projects/{organization}/{project}/keys/")
}

fn key_path(id: &Identity) -> String {
    format!("{}{}/", keys_path(id.part(0), id.part(1)), id.part(2))
}

#[async_trait]
impl ResourceKind for ClientKey {
    type Model = ClientKeyModel;

    const TYPE_NAME: &'static str = "client_key";
    const ID_LABELS: &'static [&'static str] = &["organization-slug", "project-slug", "key-id"];

    fn fields(&self) -> Vec<Field<ClientKeyModel>> {
        vec![
            field!(ClientKeyModel, Required, Scalar, name => "name"),
            field!(ClientKeyModel, Optional, Scalar, rate_limit => "rateLimit"),
            field!(ClientKeyModel, Computed, Scalar, project_id => "projectId"),
            field!(ClientKeyModel, Computed, Scalar, public => "public"),
            field!(ClientKeyModel, Computed, Scalar, secret => "secret"),
            field!(ClientKeyModel, Computed, Scalar, dsn_public => "dsnPublic"),
            field!(ClientKeyModel, Computed, Scalar, dsn_secret => "dsnSecret"),
            field!(ClientKeyModel, Computed, Scalar, dsn_csp => "dsnCsp"),
        ]
    }

    async fn create(
        &self,
        client: &ApiClient,
        intent: &ClientKeyModel,
    ) -> Result<Identity, ReconcileError> {
        let body = CreateKey {
            name: &intent.name,
            rate_limit: intent.rate_limit,
        };
        tracing::debug!(project = %intent.project, name = %intent.name, "Creating client key");
        let key: ApiClientKey = client
            .post(&keys_path(&intent.organization, &intent.project), &body)
            .await?;
        Ok(Identity::from_parts([
            intent.organization.as_str(),
            &intent.project,
            &key.id,
        ])?)
    }

    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        _prior: Option<&ClientKeyModel>,
    ) -> Result<ClientKeyModel, ReconcileError> {
        let key: ApiClientKey = client.get(&key_path(id)).await?;
        Ok(key.into_model(id.part(0), id.part(1)))
    }

    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        _intent: &ClientKeyModel,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError> {
        let _: ApiClientKey = client.put(&key_path(id), patch).await?;
        Ok(id.clone())
    }

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError> {
        client.delete(&key_path(id)).await?;
        Ok(())
    }
}

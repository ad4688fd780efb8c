use super::{ResourceKind, id_string};
use crate::client::ApiClient;
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{AttributeError, Field, Patch, field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UptimeMonitorModel {
    pub organization: String,
    pub project: String,
    pub name: String,
    pub url: String,
    pub interval_seconds: i64,
    pub timeout_ms: i64,
    pub status: Option<String>,
    pub method: Option<String>,
    /// `type:id`, e.g. `team:12`.
    pub owner: Option<String>,
    pub environment: Option<String>,
    pub body: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub trace_sampling: Option<bool>,
    pub internal_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
struct ApiOwner {
    #[serde(rename = "type")]
    kind: String,
    id: Value,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct ApiUptimeMonitor {
    id: Value,
    name: String,
    url: String,
    interval_seconds: i64,
    timeout_ms: i64,
    status: Option<String>,
    method: Option<String>,
    owner: Option<ApiOwner>,
    environment: Option<String>,
    body: Option<String>,
    /// `[[name, value], ...]`
    headers: Option<Vec<Vec<String>>>,
    trace_sampling: Option<bool>,
}

/// Headers travel as `[name, value]` pairs.
fn render_headers(model: &UptimeMonitorModel) -> Value {
    match &model.headers {
        Some(headers) => Value::Array(
            headers
                .iter()
                .map(|header| json!([header.name, header.value]))
                .collect(),
        ),
        None => Value::Null,
    }
}

fn parse_headers(pairs: Option<Vec<Vec<String>>>) -> Vec<Header> {
    pairs
        .unwrap_or_default()
        .into_iter()
        .filter_map(|pair| match <[String; 2]>::try_from(pair) {
            Ok([name, value]) => Some(Header { name, value }),
            Err(pair) => {
                tracing::warn!(?pair, "Ignoring malformed uptime monitor header");
                None
            }
        })
        .collect()
}

fn check_owner(owner: &str) -> Result<(), AttributeError> {
    match owner.split_once(':') {
        Some((kind, id)) if !kind.is_empty() && !id.is_empty() => Ok(()),
        _ => Err(AttributeError::Invalid {
            attribute: "owner",
            reason: format!("expected type:id, got {owner:?}"),
        }),
    }
}

fn create_body(model: &UptimeMonitorModel) -> Value {
    let mut body = json!({
        "name": model.name,
        "url": model.url,
        "intervalSeconds": model.interval_seconds,
        "timeoutMs": model.timeout_ms,
        "owner": model.owner,
        "environment": model.environment,
    });
    let optional = [
        ("status", json!(model.status)),
        ("method", json!(model.method)),
        ("body", json!(model.body)),
        ("headers", render_headers(model)),
        ("traceSampling", json!(model.trace_sampling)),
    ];
    for (key, value) in optional {
        if !value.is_null() {
            body[key] = value;
        }
    }
    body
}

pub struct UptimeMonitor;

fn monitor_path(id: &Identity) -> String {
    format!("projects/{}/{}/uptime/{}/", id.part(0), id.part(1), id.part(2))
}

#[async_trait]
impl ResourceKind for UptimeMonitor {
    type Model = UptimeMonitorModel;

    const TYPE_NAME: &'static str = "uptime_monitor";
    const ID_LABELS: &'static [&'static str] =
        &["organization-slug", "project-slug", "monitor-id"];

    fn fields(&self) -> Vec<Field<UptimeMonitorModel>> {
        vec![
            field!(UptimeMonitorModel, Required, Scalar, name => "name"),
            field!(UptimeMonitorModel, Required, Scalar, url => "url"),
            field!(UptimeMonitorModel, Required, Scalar, interval_seconds => "intervalSeconds"),
            field!(UptimeMonitorModel, Required, Scalar, timeout_ms => "timeoutMs"),
            field!(UptimeMonitorModel, OptionalComputed, Scalar, status => "status"),
            field!(UptimeMonitorModel, OptionalComputed, Scalar, method => "method"),
            field!(UptimeMonitorModel, Optional, Scalar, owner => "owner"),
            field!(UptimeMonitorModel, Optional, Scalar, environment => "environment"),
            field!(UptimeMonitorModel, Optional, Scalar, body => "body"),
            field!(UptimeMonitorModel, OptionalComputed, Sequence, headers => "headers", render_headers),
            field!(UptimeMonitorModel, OptionalComputed, Scalar, trace_sampling => "traceSampling"),
            field!(UptimeMonitorModel, Computed, Scalar, internal_id => "id"),
        ]
    }

    fn validate(&self, intent: &UptimeMonitorModel) -> Result<(), ReconcileError> {
        if let Some(owner) = &intent.owner {
            check_owner(owner)?;
        }
        Ok(())
    }

    async fn create(
        &self,
        client: &ApiClient,
        intent: &UptimeMonitorModel,
    ) -> Result<Identity, ReconcileError> {
        tracing::debug!(project = %intent.project, name = %intent.name, "Creating uptime monitor");
        let monitor: ApiUptimeMonitor = client
            .post(
                &format!("projects/{}/{}/uptime/", intent.organization, intent.project),
                &create_body(intent),
            )
            .await?;
        Ok(Identity::from_parts([
            intent.organization.clone(),
            intent.project.clone(),
            id_string(&monitor.id),
        ])?)
    }

    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        _prior: Option<&UptimeMonitorModel>,
    ) -> Result<UptimeMonitorModel, ReconcileError> {
        let monitor: ApiUptimeMonitor = client.get(&monitor_path(id)).await?;
        Ok(UptimeMonitorModel {
            organization: id.part(0).to_string(),
            project: id.part(1).to_string(),
            name: monitor.name,
            url: monitor.url,
            interval_seconds: monitor.interval_seconds,
            timeout_ms: monitor.timeout_ms,
            status: monitor.status,
            method: monitor.method,
            owner: monitor
                .owner
                .map(|owner| format!("{}:{}", owner.kind, id_string(&owner.id))),
            environment: monitor.environment,
            body: monitor.body,
            headers: Some(parse_headers(monitor.headers)),
            trace_sampling: monitor.trace_sampling,
            internal_id: Some(id_string(&monitor.id)),
        })
    }

    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        _intent: &UptimeMonitorModel,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError> {
        let _: ApiUptimeMonitor = client.put(&monitor_path(id), patch).await?;
        Ok(id.clone())
    }

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError> {
        client.delete(&monitor_path(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::state::{InstanceState, StateStore};
    use crate::testutils::{FakeTransport, created, ok};
    use http::Method;

    fn monitor_json(headers: Value) -> Value {
        json!({
            "id": 314,
            "name": "Homepage",
            "url": "https://acme.test/",
            "intervalSeconds": 60,
            "timeoutMs": 5000,
            "status": "active",
            "method": "GET",
            "owner": {"type": "team", "id": "12"},
            "environment": "production",
            "body": null,
            "headers": headers,
            "traceSampling": false,
        })
    }

    fn intent(headers: Option<Vec<Header>>) -> UptimeMonitorModel {
        UptimeMonitorModel {
            organization: "acme".into(),
            project: "web".into(),
            name: "Homepage".into(),
            url: "https://acme.test/".into(),
            interval_seconds: 60,
            timeout_ms: 5000,
            owner: Some("team:12".into()),
            environment: Some("production".into()),
            headers,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_update_headers() {
        let transport = FakeTransport::new(|request| match request.method {
            Method::POST => created(monitor_json(json!([]))),
            _ => ok(monitor_json(json!([["Accept", "text/html"]]))),
        });
        let client = transport.client();
        let mut state = InstanceState::new();

        lifecycle::create(&UptimeMonitor, &client, &mut state, &intent(None))
            .await
            .unwrap();
        assert_eq!(state.id(), Some("acme/web/314"));
        assert_eq!(state.get("owner"), Some(&json!("team:12")));

        let post = &transport.writes()[0];
        let body = post.body.as_ref().unwrap();
        assert_eq!(body["owner"], "team:12");
        assert!(body.get("headers").is_none());

        let headers = vec![
            Header {
                name: "Accept".into(),
                value: "text/html".into(),
            },
            Header {
                name: "X-Check".into(),
                value: "1".into(),
            },
        ];
        lifecycle::update(&UptimeMonitor, &client, &mut state, &intent(Some(headers)))
            .await
            .unwrap();

        let put = transport.writes().pop().unwrap();
        assert_eq!(
            put.body,
            Some(json!({"headers": [["Accept", "text/html"], ["X-Check", "1"]]}))
        );
    }

    #[tokio::test]
    async fn test_invalid_owner() {
        let transport = FakeTransport::new(|_| ok(monitor_json(json!([]))));
        let client = transport.client();
        let mut state = InstanceState::new();

        let mut desired = intent(None);
        desired.owner = Some("team".into());
        let err = lifecycle::create(&UptimeMonitor, &client, &mut state, &desired)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidAttribute(AttributeError::Invalid { attribute: "owner", .. })
        ));
        assert!(transport.calls().is_empty());
    }
}

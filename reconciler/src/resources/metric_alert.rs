//! Metric alert rules.
//!
//! Triggers are passed through as JSON. The server decorates them with its own fields (ids,
//! timestamps, resolved action targets), so on read they are projected onto the shape of the
//! declared triggers before being compared.

use super::{ResourceKind, id_string};
use crate::client::ApiClient;
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{Field, Patch, field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAlertModel {
    pub organization: String,
    pub project: String,
    pub name: String,
    pub query: String,
    pub aggregate: String,
    /// Minutes.
    pub time_window: f64,
    pub threshold_type: i64,
    pub triggers: Vec<Value>,
    pub dataset: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub environment: Option<String>,
    pub resolve_threshold: Option<f64>,
    pub comparison_delta: Option<f64>,
    pub owner: Option<String>,
    pub internal_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct ApiAlertRule {
    id: Value,
    name: String,
    query: String,
    aggregate: String,
    time_window: f64,
    threshold_type: i64,
    #[serde(default)]
    triggers: Vec<Value>,
    dataset: Option<String>,
    event_types: Option<Vec<String>>,
    environment: Option<String>,
    resolve_threshold: Option<f64>,
    comparison_delta: Option<f64>,
    owner: Option<String>,
    #[serde(default)]
    projects: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertRuleBody<'a> {
    name: &'a str,
    query: &'a str,
    aggregate: &'a str,
    time_window: f64,
    threshold_type: i64,
    triggers: &'a [Value],
    projects: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_types: Option<&'a [String]>,
    environment: Option<&'a str>,
    resolve_threshold: Option<f64>,
    comparison_delta: Option<f64>,
    owner: Option<&'a str>,
}

impl<'a> From<&'a MetricAlertModel> for AlertRuleBody<'a> {
    fn from(model: &'a MetricAlertModel) -> Self {
        AlertRuleBody {
            name: &model.name,
            query: &model.query,
            aggregate: &model.aggregate,
            time_window: model.time_window,
            threshold_type: model.threshold_type,
            triggers: &model.triggers,
            projects: [&model.project],
            dataset: model.dataset.as_deref(),
            event_types: model.event_types.as_deref(),
            environment: model.environment.as_deref(),
            resolve_threshold: model.resolve_threshold,
            comparison_delta: model.comparison_delta,
            owner: model.owner.as_deref(),
        }
    }
}

/// Keeps only the parts of `value` that `shape` has. Arrays of a different length than
/// the shape are returned whole.
pub(crate) fn follow_shape(shape: &Value, value: &Value) -> Value {
    match (shape, value) {
        (Value::Object(shape), Value::Object(value)) => Value::Object(
            shape
                .iter()
                .map(|(key, inner)| {
                    let projected = follow_shape(inner, value.get(key).unwrap_or(&Value::Null));
                    (key.clone(), projected)
                })
                .collect(),
        ),
        (Value::Array(shape), Value::Array(value)) if shape.len() == value.len() => Value::Array(
            shape
                .iter()
                .zip(value)
                .map(|(inner, value)| follow_shape(inner, value))
                .collect(),
        ),
        _ => value.clone(),
    }
}

pub struct MetricAlert;

fn rule_path(id: &Identity) -> String {
    format!("organizations/{}/alert-rules/{}/", id.part(0), id.part(2))
}

#[async_trait]
impl ResourceKind for MetricAlert {
    type Model = MetricAlertModel;

    const TYPE_NAME: &'static str = "metric_alert";
    const ID_LABELS: &'static [&'static str] = &["organization-slug", "project-slug", "alert-id"];

    fn fields(&self) -> Vec<Field<MetricAlertModel>> {
        vec![
            field!(MetricAlertModel, Required, Scalar, name => "name"),
            field!(MetricAlertModel, Required, Scalar, query => "query"),
            field!(MetricAlertModel, Required, Scalar, aggregate => "aggregate"),
            field!(MetricAlertModel, Required, Scalar, time_window => "timeWindow"),
            field!(MetricAlertModel, Required, Scalar, threshold_type => "thresholdType"),
            field!(MetricAlertModel, Required, Sequence, triggers => "triggers"),
            field!(MetricAlertModel, OptionalComputed, Scalar, dataset => "dataset"),
            field!(MetricAlertModel, OptionalComputed, Set, event_types => "eventTypes"),
            field!(MetricAlertModel, Optional, Scalar, environment => "environment"),
            field!(MetricAlertModel, Optional, Scalar, resolve_threshold => "resolveThreshold"),
            field!(MetricAlertModel, Optional, Scalar, comparison_delta => "comparisonDelta"),
            field!(MetricAlertModel, Optional, Scalar, owner => "owner"),
            field!(MetricAlertModel, Computed, Scalar, internal_id => "id"),
        ]
    }

    async fn create(
        &self,
        client: &ApiClient,
        intent: &MetricAlertModel,
    ) -> Result<Identity, ReconcileError> {
        tracing::debug!(
            organization = %intent.organization,
            project = %intent.project,
            name = %intent.name,
            "Creating metric alert"
        );
        let rule: ApiAlertRule = client
            .post(
                &format!("organizations/{}/alert-rules/", intent.organization),
                &AlertRuleBody::from(intent),
            )
            .await?;
        Ok(Identity::from_parts([
            intent.organization.clone(),
            intent.project.clone(),
            id_string(&rule.id),
        ])?)
    }

    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        prior: Option<&MetricAlertModel>,
    ) -> Result<MetricAlertModel, ReconcileError> {
        let rule: ApiAlertRule = client.get(&rule_path(id)).await?;

        let triggers = match prior {
            Some(prior) => {
                let shape = Value::Array(prior.triggers.clone());
                match follow_shape(&shape, &Value::Array(rule.triggers)) {
                    Value::Array(triggers) => triggers,
                    other => vec![other],
                }
            }
            None => rule.triggers,
        };
        let project = rule
            .projects
            .into_iter()
            .next()
            .unwrap_or_else(|| id.part(1).to_string());

        Ok(MetricAlertModel {
            organization: id.part(0).to_string(),
            project,
            name: rule.name,
            query: rule.query,
            aggregate: rule.aggregate,
            time_window: rule.time_window,
            threshold_type: rule.threshold_type,
            triggers,
            dataset: rule.dataset,
            event_types: rule.event_types,
            environment: rule.environment,
            resolve_threshold: rule.resolve_threshold,
            comparison_delta: rule.comparison_delta,
            owner: rule.owner,
            internal_id: Some(id_string(&rule.id)),
        })
    }

    /// The alert rule endpoint replaces the whole rule, so once anything changed the full
    /// declared rule is sent.
    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        intent: &MetricAlertModel,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError> {
        tracing::debug!(alert_id = id.part(2), changed = ?patch.attributes(), "Replacing metric alert");
        let _: ApiAlertRule = client
            .put(&rule_path(id), &AlertRuleBody::from(intent))
            .await?;
        Ok(id.clone())
    }

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError> {
        client.delete(&rule_path(id)).await?;
        Ok(())
    }
}

//! Organizations and their settings.
//!
//! Every setting is optional and server-defaulted; only the ones declared and changed are
//! sent. The update endpoint wants `name` on every call, whatever else changed.

use super::ResourceKind;
use crate::client::ApiClient;
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{AttributeError, Field, Patch, field};
use crate::roles::{Role, RoleScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedRelay {
    pub name: String,
    pub public_key: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationModel {
    pub name: String,
    pub slug: Option<String>,
    /// Create-only. Reads always report `true`.
    pub agree_terms: bool,
    pub internal_id: Option<String>,
    pub is_early_adopter: Option<bool>,
    pub hide_ai_features: Option<bool>,
    pub codecov_access: Option<bool>,
    pub default_role: Option<String>,
    pub open_membership: Option<bool>,
    pub events_member_admin: Option<bool>,
    pub alerts_member_write: Option<bool>,
    pub attachments_role: Option<String>,
    pub debug_files_role: Option<String>,
    pub avatar_type: Option<String>,
    /// Base64 image for the `upload` avatar type. Never returned by the server.
    pub avatar: Option<String>,
    pub require_2fa: Option<bool>,
    pub allow_shared_issues: Option<bool>,
    pub enhanced_privacy: Option<bool>,
    pub scrape_javascript: Option<bool>,
    pub store_crash_reports: Option<i64>,
    pub allow_join_requests: Option<bool>,
    pub data_scrubber: Option<bool>,
    pub data_scrubber_defaults: Option<bool>,
    pub sensitive_fields: Option<Vec<String>>,
    pub safe_fields: Option<Vec<String>>,
    pub scrub_ip_addresses: Option<bool>,
    pub relay_pii_config: Option<String>,
    pub trusted_relays: Option<Vec<TrustedRelay>>,
    pub github_pr_bot: Option<bool>,
    pub github_open_pr_bot: Option<bool>,
    pub github_nudge_invite: Option<bool>,
    pub gitlab_pr_bot: Option<bool>,
    pub allow_member_project_creation: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct ApiAvatar {
    avatar_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct ApiTrustedRelay {
    name: String,
    public_key: String,
    description: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiOrganization {
    pub id: String,
    pub slug: String,
    pub name: String,
    is_early_adopter: Option<bool>,
    hide_ai_features: Option<bool>,
    codecov_access: Option<bool>,
    default_role: Option<String>,
    open_membership: Option<bool>,
    events_member_admin: Option<bool>,
    alerts_member_write: Option<bool>,
    attachments_role: Option<String>,
    debug_files_role: Option<String>,
    #[serde(default)]
    avatar: ApiAvatar,
    #[serde(rename = "require2FA")]
    require_2fa: Option<bool>,
    allow_shared_issues: Option<bool>,
    enhanced_privacy: Option<bool>,
    #[serde(rename = "scrapeJavaScript")]
    scrape_javascript: Option<bool>,
    store_crash_reports: Option<i64>,
    allow_join_requests: Option<bool>,
    data_scrubber: Option<bool>,
    data_scrubber_defaults: Option<bool>,
    sensitive_fields: Option<Vec<String>>,
    safe_fields: Option<Vec<String>>,
    #[serde(rename = "scrubIPAddresses")]
    scrub_ip_addresses: Option<bool>,
    relay_pii_config: Option<String>,
    trusted_relays: Option<Vec<ApiTrustedRelay>>,
    #[serde(rename = "githubPRBot")]
    github_pr_bot: Option<bool>,
    #[serde(rename = "githubOpenPRBot")]
    github_open_pr_bot: Option<bool>,
    github_nudge_invite: Option<bool>,
    #[serde(rename = "gitlabPRBot")]
    gitlab_pr_bot: Option<bool>,
    allow_member_project_creation: Option<bool>,
}

impl ApiOrganization {
    fn into_model(self, avatar: Option<String>) -> OrganizationModel {
        OrganizationModel {
            name: self.name,
            slug: Some(self.slug),
            agree_terms: true,
            internal_id: Some(self.id),
            is_early_adopter: self.is_early_adopter,
            hide_ai_features: self.hide_ai_features,
            codecov_access: self.codecov_access,
            default_role: self.default_role,
            open_membership: self.open_membership,
            events_member_admin: self.events_member_admin,
            alerts_member_write: self.alerts_member_write,
            attachments_role: self.attachments_role,
            debug_files_role: self.debug_files_role,
            avatar_type: self.avatar.avatar_type,
            avatar,
            require_2fa: self.require_2fa,
            allow_shared_issues: self.allow_shared_issues,
            enhanced_privacy: self.enhanced_privacy,
            scrape_javascript: self.scrape_javascript,
            store_crash_reports: self.store_crash_reports,
            allow_join_requests: self.allow_join_requests,
            data_scrubber: self.data_scrubber,
            data_scrubber_defaults: self.data_scrubber_defaults,
            sensitive_fields: self.sensitive_fields,
            safe_fields: self.safe_fields,
            scrub_ip_addresses: self.scrub_ip_addresses,
            relay_pii_config: self.relay_pii_config,
            trusted_relays: self.trusted_relays.map(|relays| {
                relays
                    .into_iter()
                    .map(|relay| TrustedRelay {
                        name: relay.name,
                        public_key: relay.public_key,
                        description: relay.description,
                    })
                    .collect()
            }),
            github_pr_bot: self.github_pr_bot,
            github_open_pr_bot: self.github_open_pr_bot,
            github_nudge_invite: self.github_nudge_invite,
            gitlab_pr_bot: self.gitlab_pr_bot,
            allow_member_project_creation: self.allow_member_project_creation,
        }
    }
}

fn render_trusted_relays(model: &OrganizationModel) -> Value {
    json!(model.trusted_relays.as_ref().map(|relays| {
        relays
            .iter()
            .map(|relay| {
                json!({
                    "name": relay.name,
                    "publicKey": relay.public_key,
                    "description": relay.description,
                })
            })
            .collect::<Vec<_>>()
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrganization<'a> {
    name: &'a str,
    agree_terms: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    slug: Option<&'a str>,
}

pub struct Organization;

fn organization_path(id: &Identity) -> String {
    format!("organizations/{}/", id.part(0))
}

#[async_trait]
impl ResourceKind for Organization {
    type Model = OrganizationModel;

    const TYPE_NAME: &'static str = "organization";
    const ID_LABELS: &'static [&'static str] = &["organization-slug"];

    fn fields(&self) -> Vec<Field<OrganizationModel>> {
        use OrganizationModel as M;
        vec![
            field!(M, Required, Scalar, name => "name"),
            field!(M, OptionalComputed, Scalar, slug => "slug"),
            field!(M, Computed, Scalar, internal_id => "id"),
            field!(M, OptionalComputed, Scalar, is_early_adopter => "isEarlyAdopter"),
            field!(M, OptionalComputed, Scalar, hide_ai_features => "hideAiFeatures"),
            field!(M, OptionalComputed, Scalar, codecov_access => "codecovAccess"),
            field!(M, OptionalComputed, Scalar, default_role => "defaultRole"),
            field!(M, OptionalComputed, Scalar, open_membership => "openMembership"),
            field!(M, OptionalComputed, Scalar, events_member_admin => "eventsMemberAdmin"),
            field!(M, OptionalComputed, Scalar, alerts_member_write => "alertsMemberWrite"),
            field!(M, OptionalComputed, Scalar, attachments_role => "attachmentsRole"),
            field!(M, OptionalComputed, Scalar, debug_files_role => "debugFilesRole"),
            field!(M, OptionalComputed, Scalar, avatar_type => "avatarType"),
            field!(M, Optional, Scalar, avatar => "avatar"),
            field!(M, OptionalComputed, Scalar, require_2fa => "require2FA"),
            field!(M, OptionalComputed, Scalar, allow_shared_issues => "allowSharedIssues"),
            field!(M, OptionalComputed, Scalar, enhanced_privacy => "enhancedPrivacy"),
            field!(M, OptionalComputed, Scalar, scrape_javascript => "scrapeJavaScript"),
            field!(M, OptionalComputed, Scalar, store_crash_reports => "storeCrashReports"),
            field!(M, OptionalComputed, Scalar, allow_join_requests => "allowJoinRequests"),
            field!(M, OptionalComputed, Scalar, data_scrubber => "dataScrubber"),
            field!(M, OptionalComputed, Scalar, data_scrubber_defaults => "dataScrubberDefaults"),
            field!(M, OptionalComputed, Set, sensitive_fields => "sensitiveFields"),
            field!(M, OptionalComputed, Set, safe_fields => "safeFields"),
            field!(M, OptionalComputed, Scalar, scrub_ip_addresses => "scrubIPAddresses"),
            field!(M, OptionalComputed, Scalar, relay_pii_config => "relayPiiConfig"),
            field!(M, OptionalComputed, Sequence, trusted_relays => "trustedRelays", render_trusted_relays),
            field!(M, OptionalComputed, Scalar, github_pr_bot => "githubPRBot"),
            field!(M, OptionalComputed, Scalar, github_open_pr_bot => "githubOpenPRBot"),
            field!(M, OptionalComputed, Scalar, github_nudge_invite => "githubNudgeInvite"),
            field!(M, OptionalComputed, Scalar, gitlab_pr_bot => "gitlabPRBot"),
            field!(M, OptionalComputed, Scalar, allow_member_project_creation => "allowMemberProjectCreation"),
        ]
    }

    fn validate(&self, intent: &OrganizationModel) -> Result<(), ReconcileError> {
        if !intent.agree_terms {
            return Err(AttributeError::Invalid {
                attribute: "agree_terms",
                reason: "the terms of service must be agreed to".to_string(),
            }
            .into());
        }
        if let Some(role) = &intent.default_role {
            Role::parse_scoped(role, RoleScope::Organization)?;
        }
        if intent.avatar_type.as_deref() == Some("upload") && intent.avatar.is_none() {
            return Err(AttributeError::Invalid {
                attribute: "avatar",
                reason: "required when avatar_type is upload".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn create(
        &self,
        client: &ApiClient,
        intent: &OrganizationModel,
    ) -> Result<Identity, ReconcileError> {
        let body = CreateOrganization {
            name: &intent.name,
            agree_terms: intent.agree_terms,
            slug: intent.slug.as_deref(),
        };
        tracing::debug!(name = %intent.name, "Creating organization");
        let organization: ApiOrganization = client.post("organizations/", &body).await?;
        Ok(Identity::from_parts([organization.slug])?)
    }

    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        prior: Option<&OrganizationModel>,
    ) -> Result<OrganizationModel, ReconcileError> {
        let organization: ApiOrganization = client.get(&organization_path(id)).await?;
        Ok(organization.into_model(prior.and_then(|p| p.avatar.clone())))
    }

    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        intent: &OrganizationModel,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError> {
        let mut patch = patch.clone();
        patch.insert("name", json!(intent.name));
        let organization: ApiOrganization = client.put(&organization_path(id), &patch).await?;
        Ok(Identity::from_parts([organization.slug])?)
    }

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError> {
        client.delete(&organization_path(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::roles::RoleError;
    use crate::state::{InstanceState, StateStore};
    use crate::testutils::{FakeTransport, created, no_content, not_found, ok};
    use http::Method;
    use std::sync::{Arc, Mutex};

    fn organization_json(slug: &str) -> Value {
        json!({
            "id": "1",
            "slug": slug,
            "name": "Acme",
            "isEarlyAdopter": false,
            "hideAiFeatures": false,
            "codecovAccess": false,
            "defaultRole": "member",
            "openMembership": true,
            "eventsMemberAdmin": true,
            "alertsMemberWrite": true,
            "attachmentsRole": "member",
            "debugFilesRole": "admin",
            "avatar": {"avatarType": "letter_avatar", "avatarUuid": null},
            "require2FA": false,
            "allowSharedIssues": true,
            "enhancedPrivacy": false,
            "scrapeJavaScript": true,
            "storeCrashReports": 0,
            "allowJoinRequests": true,
            "dataScrubber": false,
            "dataScrubberDefaults": false,
            "sensitiveFields": ["password", "token"],
            "safeFields": [],
            "scrubIPAddresses": false,
            "relayPiiConfig": null,
            "trustedRelays": [],
            "githubPRBot": true,
            "githubOpenPRBot": true,
            "githubNudgeInvite": true,
            "gitlabPRBot": true,
            "allowMemberProjectCreation": true,
        })
    }

    /// One organization in memory. PUT copies the body over it; the avatar is nested on read
    /// and its image is never returned.
    fn server() -> Arc<FakeTransport> {
        let organization = Arc::new(Mutex::new(None::<Value>));
        FakeTransport::new(move |request| {
            let mut organization = organization.lock().unwrap();
            match (&request.method, request.path.as_str()) {
                (&Method::POST, "organizations/") => {
                    let body = request.body.as_ref().unwrap();
                    let mut created_org = organization_json(body["slug"].as_str().unwrap());
                    created_org["name"] = body["name"].clone();
                    *organization = Some(created_org.clone());
                    created(created_org)
                }
                (method, path) => {
                    let Some(current) = organization.as_mut() else {
                        return not_found();
                    };
                    if path != format!("organizations/{}/", current["slug"].as_str().unwrap()) {
                        return not_found();
                    }
                    match *method {
                        Method::GET => ok(current.clone()),
                        Method::PUT => {
                            for (key, value) in request.body.as_ref().unwrap().as_object().unwrap() {
                                match key.as_str() {
                                    "avatarType" => current["avatar"]["avatarType"] = value.clone(),
                                    "avatar" => {}
                                    _ => current[key] = value.clone(),
                                }
                            }
                            ok(current.clone())
                        }
                        Method::DELETE => {
                            *organization = None;
                            no_content()
                        }
                        _ => not_found(),
                    }
                }
            }
        })
    }

    fn intent() -> OrganizationModel {
        OrganizationModel {
            name: "Acme".into(),
            slug: Some("acme".into()),
            agree_terms: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_organization_lifecycle() {
        let transport = server();
        let client = transport.client();
        let mut state = InstanceState::new();

        lifecycle::create(&Organization, &client, &mut state, &intent())
            .await
            .unwrap();
        assert_eq!(state.id(), Some("acme"));
        assert_eq!(state.get("agree_terms"), Some(&json!(true)));
        assert_eq!(state.get("avatar_type"), Some(&json!("letter_avatar")));
        assert_eq!(
            transport.calls()[0].body,
            Some(json!({"name": "Acme", "agreeTerms": true, "slug": "acme"}))
        );

        // Same set in a different order plus one real change
        let desired = OrganizationModel {
            require_2fa: Some(true),
            sensitive_fields: Some(vec!["token".into(), "password".into()]),
            ..intent()
        };
        lifecycle::update(&Organization, &client, &mut state, &desired)
            .await
            .unwrap();
        let put = transport.writes().pop().unwrap();
        assert_eq!(put.body, Some(json!({"require2FA": true, "name": "Acme"})));
        assert_eq!(state.get("require_2fa"), Some(&json!(true)));

        let renamed = OrganizationModel {
            slug: Some("acme-corp".into()),
            ..desired
        };
        lifecycle::update(&Organization, &client, &mut state, &renamed)
            .await
            .unwrap();
        assert_eq!(state.id(), Some("acme-corp"));

        lifecycle::delete(&Organization, &client, &mut state)
            .await
            .unwrap();
        assert_eq!(state.id(), None);
    }

    #[tokio::test]
    async fn test_trusted_relays_and_avatar() {
        let transport = server();
        let client = transport.client();
        let mut state = InstanceState::new();

        lifecycle::create(&Organization, &client, &mut state, &intent())
            .await
            .unwrap();

        let desired = OrganizationModel {
            avatar_type: Some("upload".into()),
            avatar: Some("aGVsbG8=".into()),
            trusted_relays: Some(vec![TrustedRelay {
                name: "edge".into(),
                public_key: "pk-1".into(),
                description: None,
            }]),
            ..intent()
        };
        lifecycle::update(&Organization, &client, &mut state, &desired)
            .await
            .unwrap();

        let body = transport.writes().pop().unwrap().body.unwrap();
        assert_eq!(body["avatarType"], "upload");
        assert_eq!(body["avatar"], "aGVsbG8=");
        assert_eq!(
            body["trustedRelays"],
            json!([{"name": "edge", "publicKey": "pk-1", "description": null}])
        );
        // Write-only, carried over from what was sent
        assert_eq!(state.get("avatar"), Some(&json!("aGVsbG8=")));
    }

    #[tokio::test]
    async fn test_validation() {
        let transport = server();
        let client = transport.client();
        let mut state = InstanceState::new();

        let declined = OrganizationModel {
            agree_terms: false,
            ..intent()
        };
        let err = lifecycle::create(&Organization, &client, &mut state, &declined)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidAttribute(AttributeError::Invalid { attribute: "agree_terms", .. })
        ));

        let team_role = OrganizationModel {
            default_role: Some("contributor".into()),
            ..intent()
        };
        let err = lifecycle::create(&Organization, &client, &mut state, &team_role)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Role(RoleError::OutOfScope { .. })));
        assert!(transport.calls().is_empty());
    }
}

//! Keystone v3 password authentication

use reqwest::Client;
use serde_json::{Value, json};

use osc_core::{Error, Result, SwiftAuth};

use crate::error::{status_error, transport_error};

/// Response header carrying the issued token
const SUBJECT_TOKEN: &str = "X-Subject-Token";

/// Domain assumed when none is configured
const DEFAULT_DOMAIN: &str = "Default";

/// Body of a project-scoped password token request
fn password_request(
    auth: &SwiftAuth,
    username: &str,
    password: &str,
    project: &str,
) -> Value {
    let user_domain = auth.user_domain.as_deref().unwrap_or(DEFAULT_DOMAIN);
    let project_domain = auth.project_domain.as_deref().unwrap_or(DEFAULT_DOMAIN);
    json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "domain": { "name": user_domain },
                        "name": username,
                        "password": password,
                    }
                }
            },
            "scope": {
                "project": {
                    "domain": { "name": project_domain },
                    "name": project,
                }
            }
        }
    })
}

/// Obtain the token sent as `X-Auth-Token`
///
/// A configured token is used as is; otherwise one is requested from
/// Keystone.
pub(crate) async fn authenticate(http: &Client, auth: &SwiftAuth) -> Result<String> {
    if let Some(token) = &auth.token {
        return Ok(token.clone());
    }

    let (Some(auth_url), Some(username), Some(password), Some(project)) = (
        &auth.auth_url,
        &auth.username,
        &auth.password,
        &auth.project_name,
    ) else {
        return Err(Error::Config(format!(
            "Swift authentication needs a token or {}",
            auth.missing_password_fields().join(", ")
        )));
    };

    let url = format!("{}/auth/tokens", auth_url.trim_end_matches('/'));
    tracing::debug!(auth_url = %url, username = %username, project = %project, "Requesting Keystone token");

    let response = http
        .post(&url)
        .json(&password_request(auth, username, password, project))
        .send()
        .await
        .map_err(|e| transport_error(e, "keystone"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, "keystone"));
    }

    response
        .headers()
        .get(SUBJECT_TOKEN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| Error::General(format!("keystone: response has no {SUBJECT_TOKEN} header")))
}

//! Authenticated HTTP requester construction and the bounded per-request
//! retry contract shared by both upstream clients.
//!
//! Three concrete requesters exist — JWT (signed bearer token), mutual TLS
//! client certificate, and a fixed session cookie — selected by
//! [`build_requester`] from an [`AuthMethod`]. All three share the same
//! [`Requester`] trait surface so [`crate::em_infra::EmInfraClient`] and
//! [`crate::emson::EmsonClient`] never need to know which one they're
//! talking to.

use std::collections::HashMap;
use std::time::Duration;

use amsync_core::{AuthMethod, Environment, PipelineError};
use async_trait::async_trait;
use reqwest::{Client, Identity, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Number of attempts a single request gets before giving up and
/// surfacing a [`PipelineError::Protocol`]/[`PipelineError::Connectivity`].
/// No backoff at this layer — that lives one level up, in the fill
/// engines' indefinite retry loop.
pub const MAX_REQUEST_ATTEMPTS: u32 = 3;

/// Per-environment, per-auth-method settings loaded from the settings
/// file. The base-URL mapping is data, not code, so new environments or
/// URL changes never require a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub base_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_password: Option<String>,
}

/// `authentication[method][environment] -> AuthSettings`, as loaded from
/// the settings file.
pub type AuthSettingsTable = HashMap<AuthMethod, HashMap<Environment, AuthSettings>>;

/// A thin, authenticated HTTP facade. Implementors own how the
/// `Authorization`/`Cookie`/client-identity is attached; callers only see
/// `get`/`post_json` returning an already status-checked, bounded-retried
/// [`Response`].
#[async_trait]
pub trait Requester: Send + Sync {
    /// The API root this requester is scoped to, e.g.
    /// `https://api.prd.example/core/api/` — callers append relative
    /// resource paths to this.
    fn base_url(&self) -> &str;

    /// Perform a GET against `path` (relative to [`Requester::base_url`]),
    /// retrying up to [`MAX_REQUEST_ATTEMPTS`] times on non-2xx or
    /// transport failure.
    async fn get(&self, path: &str) -> Result<Response, PipelineError>;

    /// Perform a POST with a JSON body against `path`, with the same
    /// bounded-retry contract as [`Requester::get`].
    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Response, PipelineError>;
}

async fn request_with_retries<F>(url: &str, mut build: F) -> Result<Response, PipelineError>
where
    F: FnMut() -> RequestBuilder,
{
    let mut last_status = None;
    let mut last_body = String::new();
    for attempt in 1..=MAX_REQUEST_ATTEMPTS {
        let response = build().send().await;
        match response {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                last_status = Some(resp.status().as_u16());
                last_body = resp.text().await.unwrap_or_default();
                warn!(url, attempt, status = last_status, "non-success response, retrying");
            }
            Err(err) => {
                if attempt == MAX_REQUEST_ATTEMPTS {
                    return Err(PipelineError::Connectivity {
                        url: url.to_string(),
                        source: err,
                    });
                }
                warn!(url, attempt, %err, "transport error, retrying");
            }
        }
    }
    Err(PipelineError::Protocol {
        url: url.to_string(),
        status: last_status.unwrap_or(0),
        body: last_body,
    })
}

struct JwtRequester {
    client: Client,
    base_url: String,
    bearer: String,
}

#[async_trait]
impl Requester for JwtRequester {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<Response, PipelineError> {
        let url = format!("{}{}", self.base_url, path);
        request_with_retries(&url, || {
            self.client.get(&url).bearer_auth(&self.bearer).header("Accept", "application/json")
        })
        .await
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Response, PipelineError> {
        let url = format!("{}{}", self.base_url, path);
        request_with_retries(&url, || {
            self.client
                .post(&url)
                .bearer_auth(&self.bearer)
                .header("Accept", "application/json")
                .json(body)
        })
        .await
    }
}

struct CertRequester {
    client: Client,
    base_url: String,
}

#[async_trait]
impl Requester for CertRequester {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<Response, PipelineError> {
        let url = format!("{}{}", self.base_url, path);
        request_with_retries(&url, || self.client.get(&url).header("Accept", "application/json")).await
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Response, PipelineError> {
        let url = format!("{}{}", self.base_url, path);
        request_with_retries(&url, || {
            self.client.post(&url).header("Accept", "application/json").json(body)
        })
        .await
    }
}

struct CookieRequester {
    client: Client,
    base_url: String,
    cookie: String,
}

#[async_trait]
impl Requester for CookieRequester {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<Response, PipelineError> {
        let url = format!("{}{}", self.base_url, path);
        request_with_retries(&url, || {
            self.client
                .get(&url)
                .header("Cookie", &self.cookie)
                .header("Accept", "application/json")
        })
        .await
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Response, PipelineError> {
        let url = format!("{}{}", self.base_url, path);
        request_with_retries(&url, || {
            self.client
                .post(&url)
                .header("Cookie", &self.cookie)
                .header("Accept", "application/json")
                .json(body)
        })
        .await
    }
}

/// Build a [`Requester`] for the given auth method and environment,
/// looking up its base URL and credentials in `settings`. `cookie` is only
/// consulted (and required) for [`AuthMethod::Cookie`] — it is supplied at
/// runtime rather than read from the settings file, since session cookies
/// are short-lived and operator-specific.
pub fn build_requester(
    method: AuthMethod,
    env: Environment,
    settings: &AuthSettingsTable,
    cookie: Option<&str>,
) -> Result<Box<dyn Requester>, PipelineError> {
    let per_env = settings
        .get(&method)
        .ok_or_else(|| PipelineError::Config(format!("no settings for auth method {method:?}")))?;
    let cfg = per_env
        .get(&env)
        .ok_or_else(|| PipelineError::Config(format!("no settings for environment {env} under {method:?}")))?;

    match method {
        AuthMethod::Jwt => {
            let client_id = cfg
                .client_id
                .as_deref()
                .ok_or_else(|| PipelineError::Config("JWT auth requires client_id".into()))?;
            let key_path = cfg
                .key_path
                .as_deref()
                .ok_or_else(|| PipelineError::Config("JWT auth requires key_path".into()))?;
            let bearer = sign_bearer_token(client_id, key_path)?;
            Ok(Box::new(JwtRequester {
                client: Client::builder().timeout(Duration::from_secs(30)).build().map_err(|e| {
                    PipelineError::Config(format!("failed to build HTTP client: {e}"))
                })?,
                base_url: cfg.base_url.clone(),
                bearer,
            }))
        }
        AuthMethod::Cert => {
            let cert_path = cfg
                .cert_path
                .as_deref()
                .ok_or_else(|| PipelineError::Config("cert auth requires cert_path".into()))?;
            let pem = std::fs::read(cert_path)
                .map_err(|e| PipelineError::Config(format!("failed to read cert {cert_path}: {e}")))?;
            let identity = Identity::from_pem(&pem)
                .map_err(|e| PipelineError::Config(format!("invalid client certificate: {e}")))?;
            let client = Client::builder()
                .identity(identity)
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
            Ok(Box::new(CertRequester {
                client,
                base_url: cfg.base_url.clone(),
            }))
        }
        AuthMethod::Cookie => {
            let cookie = cookie
                .ok_or_else(|| PipelineError::Config("cookie auth requires a cookie value at runtime".into()))?;
            Ok(Box::new(CookieRequester {
                client: Client::builder().timeout(Duration::from_secs(30)).build().map_err(|e| {
                    PipelineError::Config(format!("failed to build HTTP client: {e}"))
                })?,
                base_url: cfg.base_url.clone(),
                cookie: cookie.to_string(),
            }))
        }
    }
}

/// Sign a short-lived JWT bearer token from a private key file. The
/// signing mechanics themselves are out of scope (spec explicitly defers
/// raw auth-token acquisition); this is the seam a real implementation
/// plugs into.
fn sign_bearer_token(_client_id: &str, key_path: &str) -> Result<String, PipelineError> {
    std::fs::metadata(key_path)
        .map_err(|e| PipelineError::Config(format!("key file {key_path} not readable: {e}")))?;
    Err(PipelineError::Config(
        "JWT signing is an external concern; provide a pre-signed token via settings".into(),
    ))
}

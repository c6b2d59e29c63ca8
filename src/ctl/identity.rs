//! Credential validation against the control-plane identity service.
//!
//! The service speaks Keystone v3:
//!
//! - `POST {fqdn}/keystone/v3/auth/tokens` exchanges username, password and
//!   tenant (project name, `default` domain) for a token returned in the
//!   `X-Subject-Token` header.
//! - The region endpoint is the public endpoint of the `regionInfo` service
//!   whose region matches the configured one.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::ctl::error::IdentityError;
use crate::ctl::types::{AuthToken, Config, ValidationOutcome};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const REGION_INFO_SERVICE: &str = "regionInfo";

/// The two identity-service calls the bootstrap needs.
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    /// Exchange `config.username`, `config.password` and `config.tenant` for a token.
    async fn get_auth(&self, config: &Config, cancel: &CancellationToken) -> Result<AuthToken, IdentityError>;

    /// Resolve the endpoint URL of `config.region`.
    async fn resolve_region_endpoint(
        &self,
        config: &Config,
        token: &AuthToken,
        cancel: &CancellationToken,
    ) -> Result<String, IdentityError>;
}

/// Run one validation attempt and classify it.
///
/// Auth is tried first; the region is only resolved once auth succeeded, and
/// an empty or failed resolution is a region failure. Only cancellation is
/// returned as an error.
pub async fn validate_credentials(
    validator: &dyn IdentityValidator,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<ValidationOutcome, IdentityError> {
    let token = match validator.get_auth(config, cancel).await {
        Ok(token) => token,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            debug!("Credential validation failed: {}", e);
            return Ok(ValidationOutcome::AuthFailure);
        }
    };

    match validator.resolve_region_endpoint(config, &token, cancel).await {
        Ok(endpoint) if !endpoint.is_empty() => Ok(ValidationOutcome::Success { token, endpoint }),
        Ok(_) => {
            debug!("Invalid Region");
            Ok(ValidationOutcome::RegionFailure {
                reason: format!("no endpoint for region {}", config.region),
            })
        }
        Err(e) if e.is_cancelled() => Err(e),
        Err(e) => {
            debug!("Invalid Region: {}", e);
            Ok(ValidationOutcome::RegionFailure { reason: e.to_string() })
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    user: Option<IdRef>,
    #[serde(default)]
    project: Option<IdRef>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ServiceList {
    services: Vec<IdRef>,
}

#[derive(Debug, Deserialize)]
struct EndpointList {
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

impl Endpoint {
    fn in_region(&self, region: &str) -> bool {
        self.region.as_deref() == Some(region) || self.region_id.as_deref() == Some(region)
    }
}

/// Keystone v3 client over `reqwest`.
pub struct KeystoneValidator {
    timeout: Duration,
}

impl KeystoneValidator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn http_client(&self, config: &Config) -> Result<reqwest::Client, IdentityError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(config.allow_insecure);

        builder = if config.proxy_url.is_empty() {
            builder.no_proxy()
        } else {
            builder.proxy(reqwest::Proxy::all(&config.proxy_url)?)
        };

        Ok(builder.build()?)
    }

    fn keystone_url(config: &Config, path: &str) -> Result<Url, IdentityError> {
        let raw = format!("{}/keystone/v3/{}", config.base_url(), path);
        Url::parse(&raw).map_err(|e| IdentityError::InvalidUrl(format!("{}: {}", raw, e)))
    }

    fn map_send_error(&self, e: reqwest::Error) -> IdentityError {
        if e.is_timeout() {
            IdentityError::TimedOut(self.timeout)
        } else {
            IdentityError::Http(e)
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IdentityError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        config: &Config,
        token: &AuthToken,
        url: Url,
    ) -> Result<T, IdentityError> {
        let response = self
            .http_client(config)?
            .get(url)
            .header(AUTH_TOKEN_HEADER, token.token.expose_secret())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::check_status(response).await?;
        response.json::<T>().await.map_err(|e| self.map_send_error(e))
    }

    async fn request_token(&self, config: &Config) -> Result<AuthToken, IdentityError> {
        let url = Self::keystone_url(config, "auth/tokens")?;
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": config.username,
                            "domain": { "id": "default" },
                            "password": config.password.expose_secret(),
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": config.tenant,
                        "domain": { "id": "default" }
                    }
                }
            }
        });

        let response = self
            .http_client(config)?
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(IdentityError::MissingToken)?;

        let parsed: TokenResponse = response.json().await.map_err(|e| self.map_send_error(e))?;

        Ok(AuthToken {
            token: SecretString::new(token.into()),
            user_id: parsed.token.user.map(|u| u.id).unwrap_or_default(),
            project_id: parsed.token.project.map(|p| p.id).unwrap_or_default(),
        })
    }

    async fn region_endpoint(&self, config: &Config, token: &AuthToken) -> Result<String, IdentityError> {
        let mut services_url = Self::keystone_url(config, "services")?;
        services_url
            .query_pairs_mut()
            .append_pair("type", REGION_INFO_SERVICE);
        let services: ServiceList = self.get_json(config, token, services_url).await?;

        let service_id = services
            .services
            .into_iter()
            .next()
            .map(|s| s.id)
            .ok_or_else(|| IdentityError::RegionNotFound(config.region.clone()))?;

        let mut endpoints_url = Self::keystone_url(config, "endpoints")?;
        endpoints_url
            .query_pairs_mut()
            .append_pair("service_id", &service_id)
            .append_pair("interface", "public");
        let endpoints: EndpointList = self.get_json(config, token, endpoints_url).await?;

        let endpoint = endpoints
            .endpoints
            .into_iter()
            .find(|e| e.in_region(&config.region))
            .ok_or_else(|| IdentityError::RegionNotFound(config.region.clone()))?;

        // Only the scheme and host identify the region
        let url = Url::parse(&endpoint.url)
            .map_err(|e| IdentityError::InvalidUrl(format!("{}: {}", endpoint.url, e)))?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(IdentityError::InvalidUrl(format!("{}: no host origin", endpoint.url)));
        }
        Ok(origin.ascii_serialization())
    }
}

#[async_trait]
impl IdentityValidator for KeystoneValidator {
    async fn get_auth(&self, config: &Config, cancel: &CancellationToken) -> Result<AuthToken, IdentityError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IdentityError::Cancelled),
            result = self.request_token(config) => result,
        }
    }

    async fn resolve_region_endpoint(
        &self,
        config: &Config,
        token: &AuthToken,
        cancel: &CancellationToken,
    ) -> Result<String, IdentityError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IdentityError::Cancelled),
            result = self.region_endpoint(config, token) => result,
        }
    }
}

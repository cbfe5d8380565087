//! Common utilities for the Proxmox API client
//!
//! Provides the authenticated HTTP wrapper shared by every endpoint
//! operation: URL building, authentication headers, the `data` envelope and
//! mapping of HTTP failures to [`ProxmoxError`].

use crate::config::Credentials;
use crate::error::ProxmoxError;
use crate::models::{DataEnvelope, TicketResponse};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Path prefix of the JSON API
pub const API_PREFIX: &str = "/api2/json";

/// Per-request HTTP timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tickets are valid for two hours; renew well before that.
const TICKET_MAX_AGE: Duration = Duration::from_secs(105 * 60);

/// Authentication state for one endpoint
enum Auth {
    /// Pre-rendered `Authorization` header value
    Token(String),
    /// Username/password exchanged for a cached ticket
    Ticket {
        username: String,
        password: String,
        session: Mutex<Option<Session>>,
    },
}

#[derive(Clone)]
struct Session {
    ticket: String,
    csrf_token: String,
    issued_at: Instant,
}

/// HTTP client wrapper with authentication
pub struct HttpClient {
    client: Client,
    base_url: String,
    auth: Auth,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    ///
    /// # Arguments
    /// * `base_url` - Endpoint URL, e.g. `https://pve1:8006` (the `/api2/json`
    ///   suffix is added when missing)
    /// * `credentials` - API token or username/password
    /// * `insecure` - Skip TLS certificate verification
    pub fn new(base_url: &str, credentials: Credentials, insecure: bool) -> Result<Self, ProxmoxError> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| {
            ProxmoxError::InvalidConfig(format!("invalid Proxmox URL {}: {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProxmoxError::InvalidConfig(format!(
                "invalid Proxmox URL {}: unsupported scheme {}",
                base_url,
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| ProxmoxError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        let auth = match credentials {
            Credentials::Token { token_id, secret } => {
                Auth::Token(format!("PVEAPIToken={}={}", token_id, secret))
            }
            Credentials::Password { username, password } => Auth::Ticket {
                username,
                password,
                session: Mutex::new(None),
            },
        };

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            auth,
        })
    }

    /// Get the base URL (including the API prefix)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from an API path
    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request and unwrap the `data` envelope
    pub async fn get<T: DeserializeOwned>(&self, path: &str, operation: &str) -> Result<T, ProxmoxError> {
        self.execute(Method::GET, path, None, operation).await
    }

    /// Make a form-encoded POST request and unwrap the `data` envelope
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
        operation: &str,
    ) -> Result<T, ProxmoxError> {
        self.execute(Method::POST, path, Some(form), operation).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(&str, &str)]>,
        operation: &str,
    ) -> Result<T, ProxmoxError> {
        let url = self.build_url(path);
        let mut retried = false;

        loop {
            debug!("{} {}", method, url);

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("Accept", "application/json");
            request = self.authorize(request, method != Method::GET).await?;
            if let Some(form) = form {
                request = request.form(form);
            }

            let response = request.send().await.map_err(|e| self.http_error(operation, e))?;

            // An expired ticket is renewed once; tokens are not retried.
            if response.status() == StatusCode::UNAUTHORIZED && !retried && self.invalidate_session().await {
                retried = true;
                continue;
            }

            return self.decode(response, operation).await;
        }
    }

    async fn authorize(&self, request: RequestBuilder, write: bool) -> Result<RequestBuilder, ProxmoxError> {
        match &self.auth {
            Auth::Token(header) => Ok(request.header("Authorization", header.as_str())),
            Auth::Ticket { .. } => {
                let session = self.session().await?;
                let request = request.header("Cookie", format!("PVEAuthCookie={}", session.ticket));
                if write {
                    Ok(request.header("CSRFPreventionToken", session.csrf_token))
                } else {
                    Ok(request)
                }
            }
        }
    }

    /// Returns a valid ticket, logging in when none is cached or it is stale.
    async fn session(&self) -> Result<Session, ProxmoxError> {
        let Auth::Ticket { username, password, session } = &self.auth else {
            return Err(ProxmoxError::Authentication {
                endpoint: self.base_url.clone(),
                message: "ticket requested for token authentication".to_string(),
            });
        };

        let mut cached = session.lock().await;
        if let Some(current) = cached.as_ref() {
            if current.issued_at.elapsed() < TICKET_MAX_AGE {
                return Ok(current.clone());
            }
        }

        info!("Requesting Proxmox ticket for {} from {}", username, self.base_url);
        let response = self
            .client
            .post(self.build_url("/access/ticket"))
            .header("Accept", "application/json")
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .send()
            .await
            .map_err(|e| self.http_error("login", e))?;
        let ticket: TicketResponse = self.decode(response, "login").await?;

        let fresh = Session {
            ticket: ticket.ticket,
            csrf_token: ticket.csrf_prevention_token,
            issued_at: Instant::now(),
        };
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drops a cached ticket. Returns false for token authentication.
    async fn invalidate_session(&self) -> bool {
        match &self.auth {
            Auth::Token(_) => false,
            Auth::Ticket { session, .. } => {
                debug!("Discarding Proxmox ticket for {}", self.base_url);
                *session.lock().await = None;
                true
            }
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response, operation: &str) -> Result<T, ProxmoxError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| self.http_error(operation, e))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProxmoxError::Authentication {
                endpoint: self.base_url.clone(),
                message: format!("{} during {} - {}", status, operation, body),
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ProxmoxError::NotFound {
                endpoint: self.base_url.clone(),
                operation: operation.to_string(),
            });
        }

        if !status.is_success() {
            return Err(ProxmoxError::Api {
                endpoint: self.base_url.clone(),
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let envelope: DataEnvelope<T> = serde_json::from_str(&body).map_err(|e| ProxmoxError::Serialization {
            endpoint: self.base_url.clone(),
            operation: operation.to_string(),
            source: e,
        })?;
        Ok(envelope.data)
    }

    fn http_error(&self, operation: &str, source: reqwest::Error) -> ProxmoxError {
        ProxmoxError::Http {
            endpoint: self.base_url.clone(),
            operation: operation.to_string(),
            source,
        }
    }
}

/// Strips trailing slashes and appends the API prefix when missing.
fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with(API_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, API_PREFIX)
    }
}

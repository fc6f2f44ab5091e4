//! Blocking HTTP client for the Tado API (the endpoints the sync engine and pairing need).
//!
//! - Blocking client using `ureq` (no async).
//! - Uses the models in `crate::models::tado`.
//! - [`TadoApi`] is the seam the engine is written against; [`TadoClient`] is the real thing.
//!
//! Authentication
//! - Bearer tokens come from a [`TokenSource`]. The host normally owns the token exchange;
//!   [`RefreshTokenSource`] covers the standalone daemon with a refresh-token grant.
//! - A 401 invalidates the token and the request is retried once.

use http::StatusCode;
use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::models::tado::*;

const BASE_URL: &str = "https://my.tado.com/api/v2";
const OAUTH_TOKEN_URL: &str = "https://login.tado.com/oauth2/token";
const OAUTH_CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum TadoClientError {
    MissingAuth,
    Transport(String),
    Http { status: u16, message: String },
    Json { path: String, source: serde_json::Error },
    Auth(String),
}

impl core::fmt::Display for TadoClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TadoClientError::MissingAuth => write!(f, "missing bearer token for authenticated endpoint"),
            TadoClientError::Transport(s) => write!(f, "transport error: {}", s),
            TadoClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            TadoClientError::Json { path, source } => write!(f, "json error at {}: {}", path, source),
            TadoClientError::Auth(e) => write!(f, "auth error: {}", e),
        }
    }
}

impl std::error::Error for TadoClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TadoClientError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ureq::Error> for TadoClientError {
    fn from(value: ureq::Error) -> Self {
        TadoClientError::Transport(value.to_string())
    }
}

/// Decode a JSON body, reporting the failing path on error.
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, TadoClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| TadoClientError::Json {
        path: e.path().to_string(),
        source: e.into_inner(),
    })
}

/// Remote operations the engine, the devices and pairing rely on.
pub trait TadoApi {
    fn get_me(&self) -> Result<User, TadoClientError>;
    fn get_zones(&self, home_id: HomeId) -> Result<Vec<Zone>, TadoClientError>;
    fn get_zone_capabilities(&self, home_id: HomeId, zone_id: ZoneId) -> Result<ZoneCapabilities, TadoClientError>;
    fn get_zone_state(&self, home_id: HomeId, zone_id: ZoneId) -> Result<ZoneState, TadoClientError>;
    fn set_zone_overlay(
        &self,
        home_id: HomeId,
        zone_id: ZoneId,
        overlay: &ZoneOverlay,
    ) -> Result<ZoneOverlay, TadoClientError>;
    fn delete_zone_overlay(&self, home_id: HomeId, zone_id: ZoneId) -> Result<(), TadoClientError>;
    fn get_webhooks(&self, home_id: HomeId) -> Result<Vec<Webhook>, TadoClientError>;
    fn create_webhook(&self, home_id: HomeId, input: &WebhookInput) -> Result<Webhook, TadoClientError>;
    fn delete_webhook(&self, home_id: HomeId, webhook_id: &WebhookId) -> Result<(), TadoClientError>;
}

/// Supplies bearer tokens for API calls.
pub trait TokenSource {
    fn bearer(&self) -> Result<String, TadoClientError>;
    /// Forget the cached token; the next `bearer()` must fetch a fresh one.
    fn invalidate(&self);
}

/// A token handed over by the host, used as-is.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn bearer(&self) -> Result<String, TadoClientError> {
        if self.0.trim().is_empty() {
            return Err(TadoClientError::MissingAuth);
        }
        Ok(self.0.clone())
    }

    fn invalidate(&self) {}
}

#[derive(Debug, Clone)]
struct OAuthToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct OAuthState {
    token: Option<OAuthToken>,
    refresh_token: String,
}

/// Refresh-token grant against the Tado login service. Tado rotates refresh tokens on
/// every use, so the latest one is written back to `token_file` when configured.
pub struct RefreshTokenSource {
    agent: ureq::Agent,
    state: RefCell<OAuthState>,
    token_file: Option<PathBuf>,
}

impl RefreshTokenSource {
    pub fn new(refresh_token: impl Into<String>, token_file: Option<PathBuf>) -> Self {
        RefreshTokenSource {
            agent: build_agent(),
            state: RefCell::new(OAuthState {
                token: None,
                refresh_token: refresh_token.into(),
            }),
            token_file,
        }
    }

    fn refresh(&self, state: &mut OAuthState) -> Result<(), TadoClientError> {
        #[derive(serde::Deserialize)]
        struct R {
            access_token: String,
            expires_in: u64,
            #[serde(default)]
            refresh_token: Option<String>,
        }

        let mut resp = self
            .agent
            .post(OAUTH_TOKEN_URL)
            .header("Accept", "application/json")
            .send_form([
                ("client_id", OAUTH_CLIENT_ID),
                ("grant_type", "refresh_token"),
                ("refresh_token", state.refresh_token.as_str()),
            ])?;
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(TadoClientError::Auth(format!("http {}: {}", status.as_u16(), body)));
        }

        let R {
            access_token,
            expires_in,
            refresh_token,
        } = decode_json(&body)?;
        state.token = Some(OAuthToken {
            access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });

        if let Some(rotated) = refresh_token
            && rotated != state.refresh_token
        {
            state.refresh_token = rotated;
            if let Some(path) = self.token_file.as_ref() {
                match std::fs::write(path, &state.refresh_token) {
                    Ok(()) => debug!("Persisted rotated refresh token to {}", path.display()),
                    Err(e) => warn!("Unable to persist refresh token to {}: {}", path.display(), e),
                }
            }
        }
        info!("Obtained Tado access token (expires in {}s)", expires_in);
        Ok(())
    }
}

impl TokenSource for RefreshTokenSource {
    fn bearer(&self) -> Result<String, TadoClientError> {
        let mut s = self.state.borrow_mut();
        let needs_refresh = match &s.token {
            None => true,
            Some(t) => Instant::now() + TOKEN_EXPIRY_MARGIN >= t.expires_at,
        };
        if needs_refresh {
            self.refresh(&mut s)?;
        }
        s.token
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(TadoClientError::MissingAuth)
    }

    fn invalidate(&self) {
        self.state.borrow_mut().token = None;
    }
}

fn build_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build();
    ureq::Agent::new_with_config(config)
}

pub struct TadoClient {
    agent: ureq::Agent,
    tokens: Box<dyn TokenSource>,
}

impl TadoClient {
    pub fn new(tokens: impl TokenSource + 'static) -> Self {
        TadoClient {
            agent: build_agent(),
            tokens: Box::new(tokens),
        }
    }

    fn url(path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", BASE_URL, path)
        } else {
            format!("{}/{}", BASE_URL, path)
        }
    }

    /// Run `send` with a bearer token, retrying once with a fresh token on 401.
    /// Returns the response body of a 2xx answer.
    fn execute<F>(&self, send: F) -> Result<String, TadoClientError>
    where
        F: Fn(&str) -> Result<http::Response<ureq::Body>, ureq::Error>,
    {
        let token = self.tokens.bearer()?;
        let mut resp = send(&token)?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            debug!("Tado API answered 401, refreshing token and retrying");
            self.tokens.invalidate();
            let token = self.tokens.bearer()?;
            resp = send(&token)?;
        }

        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if status.is_success() {
            Ok(body)
        } else {
            let message = if body.is_empty() { String::from("<no body>") } else { body };
            Err(TadoClientError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TadoClientError> {
        let url = Self::url(path);
        let body = self.execute(|token| {
            self.agent
                .get(url.as_str())
                .header("Accept", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .call()
        })?;
        decode_json(&body)
    }

    fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, payload: &B) -> Result<T, TadoClientError> {
        let url = Self::url(path);
        let body = self.execute(|token| {
            self.agent
                .put(url.as_str())
                .header("Accept", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .send_json(payload)
        })?;
        decode_json(&body)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, payload: &B) -> Result<T, TadoClientError> {
        let url = Self::url(path);
        let body = self.execute(|token| {
            self.agent
                .post(url.as_str())
                .header("Accept", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .send_json(payload)
        })?;
        decode_json(&body)
    }

    fn delete(&self, path: &str) -> Result<(), TadoClientError> {
        let url = Self::url(path);
        self.execute(|token| {
            self.agent
                .delete(url.as_str())
                .header("Authorization", format!("Bearer {}", token))
                .call()
        })
        .map(|_| ())
    }
}

impl TadoApi for TadoClient {
    fn get_me(&self) -> Result<User, TadoClientError> {
        self.get_json("/me")
    }

    fn get_zones(&self, home_id: HomeId) -> Result<Vec<Zone>, TadoClientError> {
        self.get_json(&format!("/homes/{}/zones", home_id.0))
    }

    fn get_zone_capabilities(&self, home_id: HomeId, zone_id: ZoneId) -> Result<ZoneCapabilities, TadoClientError> {
        self.get_json(&format!("/homes/{}/zones/{}/capabilities", home_id.0, zone_id.0))
    }

    fn get_zone_state(&self, home_id: HomeId, zone_id: ZoneId) -> Result<ZoneState, TadoClientError> {
        self.get_json(&format!("/homes/{}/zones/{}/state", home_id.0, zone_id.0))
    }

    fn set_zone_overlay(
        &self,
        home_id: HomeId,
        zone_id: ZoneId,
        overlay: &ZoneOverlay,
    ) -> Result<ZoneOverlay, TadoClientError> {
        self.put_json(&format!("/homes/{}/zones/{}/overlay", home_id.0, zone_id.0), overlay)
    }

    fn delete_zone_overlay(&self, home_id: HomeId, zone_id: ZoneId) -> Result<(), TadoClientError> {
        self.delete(&format!("/homes/{}/zones/{}/overlay", home_id.0, zone_id.0))
    }

    fn get_webhooks(&self, home_id: HomeId) -> Result<Vec<Webhook>, TadoClientError> {
        self.get_json(&format!("/homes/{}/hooks", home_id.0))
    }

    fn create_webhook(&self, home_id: HomeId, input: &WebhookInput) -> Result<Webhook, TadoClientError> {
        self.post_json(&format!("/homes/{}/hooks", home_id.0), input)
    }

    fn delete_webhook(&self, home_id: HomeId, webhook_id: &WebhookId) -> Result<(), TadoClientError> {
        self.delete(&format!("/homes/{}/hooks/{}", home_id.0, webhook_id))
    }
}

// Device configuration API HTTP client
//
// Base path: /api/v1/
// Auth: session key from `v1/auth/keygen`, sent as `X-API-Key`.
//
// Every response carries the `{ status, result, code, message }` envelope;
// the helpers here strip it and surface device errors as `Error::Device`.

use std::sync::{PoisonError, RwLock};

use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Credentials;
use crate::error::{CODE_LOCK_ALREADY_OWNED, CODE_LOCK_NOT_HELD, Error};
use crate::transport::TransportConfig;
use crate::types::{
    Envelope, KeygenResult, Location, LockKind, LockOutcome, MultiConfigRequest,
    MultiConfigResponse, ObjectList, OperationStatus, SystemInfo,
};

const API_KEY_HEADER: &str = "X-API-Key";

/// Async client for a device's JSON configuration API.
///
/// Holds the session key behind a lock so a single client can be shared
/// across concurrent discovery tasks.
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: RwLock<Option<SecretString>>,
    timeout_secs: u64,
}

impl DeviceClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for the device at `base_url` (e.g. `https://fw.example.net`).
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            api_key: RwLock::new(None),
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        let base_url = Self::normalize_base_url(base_url.as_str()).unwrap_or(base_url);
        Self {
            http,
            base_url,
            api_key: RwLock::new(None),
            timeout_secs: TransportConfig::default().timeout_secs(),
        }
    }

    /// Append `/api/` to the device root unless it is already there.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();

        if path.ends_with("/api") {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/api/"));
        }

        Ok(url)
    }

    /// The normalized API base URL (always ends with `/api/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Session key ──────────────────────────────────────────────────

    /// Install a session key obtained elsewhere.
    pub fn set_api_key(&self, key: SecretString) {
        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) = Some(key);
    }

    pub fn is_authenticated(&self) -> bool {
        self.api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn apply_key(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, Error> {
        let guard = self.api_key.read().unwrap_or_else(PoisonError::into_inner);
        let key = guard.as_ref().ok_or(Error::NotAuthenticated)?;
        let mut value =
            HeaderValue::from_str(key.expose_secret()).map_err(|e| Error::Authentication {
                message: format!("invalid API key header value: {e}"),
            })?;
        value.set_sensitive(true);
        Ok(builder.header(API_KEY_HEADER, value))
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let builder = self.apply_key(self.http.get(url).query(params))?;
        let resp = builder.send().await.map_err(|e| self.transport_error(e))?;
        self.parse_envelope(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let builder = self.apply_key(self.http.post(url).json(body))?;
        let resp = builder.send().await.map_err(|e| self.transport_error(e))?;
        self.parse_envelope(resp).await
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }

    // ── Response handling ────────────────────────────────────────────

    /// Strip the envelope, returning `result` on success.
    ///
    /// A success envelope without `result` yields `Ok(None)`; callers that
    /// need a payload decide whether that is an error.
    async fn parse_envelope<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<Option<T>, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let raw = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Envelope<Value>>(&raw)
                .ok()
                .and_then(|env| env.message)
                .unwrap_or_else(|| "session key rejected".into());
            return Err(Error::Authentication { message });
        }

        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        trace!(status = status.as_u16(), bytes = body.len(), "response received");

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(e) if status.is_success() => {
                let preview = preview(&body);
                return Err(Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                });
            }
            Err(_) => return Err(Self::http_error(status, body)),
        };

        match envelope.status {
            OperationStatus::Success if status.is_success() => Ok(envelope.result),
            OperationStatus::Success => Err(Self::http_error(status, body)),
            OperationStatus::Error => Err(Error::Device {
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("request failed with HTTP {}", status.as_u16())),
                code: envelope.code,
                holder: envelope.holder,
            }),
        }
    }

    fn http_error(status: reqwest::StatusCode, raw: String) -> Error {
        Error::Http {
            status: status.as_u16(),
            message: if raw.is_empty() {
                status.to_string()
            } else {
                raw
            },
        }
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    // ── Authentication ───────────────────────────────────────────────

    /// Exchange username/password for a session key.
    ///
    /// Keygen is the only unauthenticated endpoint, so it bypasses `post`.
    pub async fn keygen(&self, username: &str, password: &SecretString) -> Result<SecretString, Error> {
        #[derive(Serialize)]
        struct Body<'a> {
            username: &'a str,
            password: &'a str,
        }

        let url = self.url("v1/auth/keygen")?;
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .json(&Body {
                username,
                password: password.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let result: Option<KeygenResult> = match self.parse_envelope(resp).await {
            Ok(result) => result,
            Err(Error::Device { message, .. }) => return Err(Error::Authentication { message }),
            Err(e) => return Err(e),
        };

        result
            .map(|r| SecretString::from(r.key))
            .ok_or_else(|| Error::Authentication {
                message: "keygen response carried no key".into(),
            })
    }

    /// Authenticate with the given credentials and store the session key.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<(), Error> {
        let key = match credentials {
            Credentials::Password { username, password } => {
                debug!(username = %username, "requesting session key");
                self.keygen(username, password).await?
            }
            Credentials::ApiKey { key } => key.clone(),
        };
        self.set_api_key(key);
        Ok(())
    }

    // ── System ───────────────────────────────────────────────────────

    pub async fn system_info(&self) -> Result<SystemInfo, Error> {
        self.get::<SystemInfo>("v1/system/info", &[])
            .await?
            .ok_or_else(|| missing_result("v1/system/info"))
    }

    // ── Objects ──────────────────────────────────────────────────────

    /// Every object of `kind` defined directly at `location`.
    ///
    /// A success envelope without a `result` is an error, never an empty
    /// listing: the caller must be able to tell "none" from "unknown".
    pub async fn list_objects(&self, location: &Location, kind: &str) -> Result<Vec<Value>, Error> {
        let path = format!("v1/config/objects/{kind}");
        let list: ObjectList = self
            .get(&path, &location.query())
            .await?
            .ok_or_else(|| missing_result(&path))?;
        debug!(kind, count = list.entries.len(), "listed objects");
        Ok(list.entries)
    }

    // ── Locks ────────────────────────────────────────────────────────

    /// Take a config or commit lock on `location`.
    pub async fn acquire_lock(
        &self,
        location: &Location,
        kind: LockKind,
        comment: &str,
    ) -> Result<LockOutcome, Error> {
        #[derive(Serialize)]
        struct Body<'a> {
            location: &'a Location,
            comment: &'a str,
        }

        let path = format!("v1/locks/{}/acquire", kind.as_str());
        match self
            .post::<Value, _>(&path, &Body { location, comment })
            .await
        {
            Ok(_) => Ok(LockOutcome::Acquired),
            Err(e) if e.device_code() == Some(CODE_LOCK_ALREADY_OWNED) => {
                Ok(LockOutcome::AlreadyOwned)
            }
            Err(e) => Err(e),
        }
    }

    /// Release a lock. Returns `false` when the device says it was not held.
    pub async fn release_lock(&self, location: &Location, kind: LockKind) -> Result<bool, Error> {
        #[derive(Serialize)]
        struct Body<'a> {
            location: &'a Location,
        }

        let path = format!("v1/locks/{}/release", kind.as_str());
        match self.post::<Value, _>(&path, &Body { location }).await {
            Ok(_) => Ok(true),
            Err(e) if e.device_code() == Some(CODE_LOCK_NOT_HELD) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ── Multi-config ─────────────────────────────────────────────────

    /// Submit a batch of create/update/delete operations.
    ///
    /// A rejected batch is still `Ok`: the per-operation detail lives in the
    /// response body. Only transport, auth and envelope-level failures that
    /// carry no per-operation detail are returned as `Err`.
    pub async fn multi_config(
        &self,
        request: &MultiConfigRequest,
    ) -> Result<MultiConfigResponse, Error> {
        let url = self.url("v1/config/multi")?;
        debug!(
            "POST {url} operations={} strict={}",
            request.operations.len(),
            request.strict
        );

        let builder = self.apply_key(self.http.post(url).json(request))?;
        let resp = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                message: "session key rejected".into(),
            });
        }

        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        match serde_json::from_str::<MultiConfigResponse>(&body) {
            Ok(parsed) if parsed.is_success() || !parsed.responses.is_empty() => Ok(parsed),
            Ok(parsed) => {
                let envelope: Option<Envelope<Value>> = serde_json::from_str(&body).ok();
                Err(Error::Device {
                    message: parsed
                        .message
                        .unwrap_or_else(|| format!("batch rejected with HTTP {}", status.as_u16())),
                    code: envelope.as_ref().and_then(|e| e.code.clone()),
                    holder: envelope.and_then(|e| e.holder),
                })
            }
            Err(_) if !status.is_success() => Err(Self::http_error(status, body)),
            Err(e) => {
                let preview = preview(&body);
                Err(Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                })
            }
        }
    }
}

/// At most the first 200 characters of `body`, cut on a char boundary.
fn preview(body: &str) -> &str {
    body.char_indices().nth(200).map_or(body, |(end, _)| &body[..end])
}

fn missing_result(path: &str) -> Error {
    Error::Deserialization {
        message: format!("{path}: success envelope without result"),
        body: String::new(),
    }
}

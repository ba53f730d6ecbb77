use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::types::{
    ConsumerRecord, Envelope, JobRecord, ListResult, LoginRequest, OkResult, SessionRequest,
    SourceOperation, SourceRecord,
};
use crate::{DxError, Result};

/// Path prefix of the JSON management API on every engine.
pub const API_PREFIX: &str = "/resources/json/delphix";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─── Endpoint ─────────────────────────────────────────────────────────────

/// Network location of one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub port: Option<u16>,
    pub use_https: bool,
}

impl Endpoint {
    /// Base URL of the management API, e.g. `http://10.0.0.1/resources/json/delphix`.
    pub fn api_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{scheme}://{}:{port}{API_PREFIX}", self.address),
            None => format!("{scheme}://{}{API_PREFIX}", self.address),
        }
    }
}

// ─── DxClient ─────────────────────────────────────────────────────────────

/// An authenticated session against one engine.
///
/// The engine tracks the session with a cookie, so the underlying
/// `reqwest::Client` keeps a cookie store. One `DxClient` must not be shared
/// between engines.
#[derive(Debug, Clone)]
pub struct DxClient {
    http: Client,
    base: String,
}

impl DxClient {
    /// Build an unauthenticated client for the API rooted at `api_url`.
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Open an API session and log in. This is the only way to obtain a
    /// client that can issue the calls below.
    pub async fn login(endpoint: &Endpoint, username: &str, password: &str) -> Result<Self> {
        Self::login_at(endpoint.api_url(), username, password).await
    }

    pub async fn login_at(api_url: String, username: &str, password: &str) -> Result<Self> {
        let client = Self::new(api_url)?;
        client.post("session", &SessionRequest::default()).await?;
        client
            .post(
                "login",
                &LoginRequest {
                    kind: "LoginRequest",
                    username,
                    password,
                },
            )
            .await?;
        debug!(base = %client.base, user = username, "logged in");
        Ok(client)
    }

    pub fn api_url(&self) -> &str {
        &self.base
    }

    /// All sources (dSources and VDBs) known to the engine.
    pub async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        let list = expect_list(self.get("source").await?, "source")?;
        decode_records(list.result, "source")
    }

    /// Look a source up by its display name. Names are matched exactly.
    pub async fn find_source_by_name(&self, name: &str) -> Result<Option<SourceRecord>> {
        let sources = self.list_sources().await?;
        Ok(sources.into_iter().find(|s| s.name == name))
    }

    /// Run `op` on the source identified by `reference`.
    ///
    /// Returns the reference of the job the engine started for it, or `None`
    /// when the operation completed synchronously.
    pub async fn source_operation(
        &self,
        reference: &str,
        op: SourceOperation,
    ) -> Result<Option<String>> {
        let path = format!("source/{reference}/{op}");
        let ok = expect_ok(self.post(&path, &serde_json::json!({})).await?, &path)?;
        debug!(reference, %op, job = ?ok.job, action = ?ok.action, "source operation accepted");
        Ok(ok.job)
    }

    pub async fn job(&self, reference: &str) -> Result<JobRecord> {
        let path = format!("job/{reference}");
        let ok = expect_ok(self.get(&path).await?, &path)?;
        serde_json::from_value(ok.result).map_err(|source| DxError::Decode {
            endpoint: path,
            source,
        })
    }

    /// Per-database space usage.
    pub async fn capacity_consumers(&self) -> Result<Vec<ConsumerRecord>> {
        let list = expect_list(self.get("capacity/consumer").await?, "capacity/consumer")?;
        decode_records(list.result, "capacity/consumer")
    }

    // ─── Transport ────────────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str) -> Result<Envelope> {
        self.send(self.http.get(self.url(path)), path).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Envelope> {
        self.send(self.http.post(self.url(path)).json(body), path)
            .await
    }

    async fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<Envelope> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<Envelope>(&body) {
            Ok(Envelope::Error(err)) => Err(DxError::Api {
                id: err.error.id,
                details: err.error.details,
            }),
            Ok(_) if !status.is_success() => Err(DxError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }),
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(DxError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }),
            Err(source) => Err(DxError::Decode {
                endpoint: endpoint.to_string(),
                source,
            }),
        }
    }
}

// ─── Envelope helpers ─────────────────────────────────────────────────────

fn expect_ok(envelope: Envelope, endpoint: &str) -> Result<OkResult> {
    match envelope {
        Envelope::Ok(ok) => Ok(ok),
        other => Err(DxError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            message: format!("expected OKResult, got {}", envelope_kind(&other)),
        }),
    }
}

fn expect_list(envelope: Envelope, endpoint: &str) -> Result<ListResult> {
    match envelope {
        Envelope::List(list) => Ok(list),
        other => Err(DxError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            message: format!("expected ListResult, got {}", envelope_kind(&other)),
        }),
    }
}

fn envelope_kind(envelope: &Envelope) -> &'static str {
    match envelope {
        Envelope::Ok(_) => "OKResult",
        Envelope::List(_) => "ListResult",
        Envelope::Error(_) => "ErrorResult",
    }
}

fn decode_records<T: DeserializeOwned>(
    values: Vec<serde_json::Value>,
    endpoint: &str,
) -> Result<Vec<T>> {
    values
        .into_iter()
        .map(|v| {
            serde_json::from_value(v).map_err(|source| DxError::Decode {
                endpoint: endpoint.to_string(),
                source,
            })
        })
        .collect()
}

// ─── Tests ────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

// ─── Response envelope ────────────────────────────────────────────────────

/// Every management API response is wrapped in one of three envelopes,
/// discriminated by the `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "OKResult")]
    Ok(OkResult),
    #[serde(rename = "ListResult")]
    List(ListResult),
    #[serde(rename = "ErrorResult")]
    Error(ErrorResult),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkResult {
    #[serde(default)]
    pub result: serde_json::Value,
    /// Reference of the job spawned by the request, if the operation is
    /// asynchronous on the engine side.
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResult {
    #[serde(default)]
    pub result: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResult {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub id: String,
}

// ─── Requests ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ApiVersion {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: ApiVersion,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self {
            kind: "APISession",
            version: ApiVersion {
                kind: "APIVersion",
                major: 1,
                minor: 7,
                micro: 0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub username: &'a str,
    pub password: &'a str,
}

// ─── Records ──────────────────────────────────────────────────────────────

/// A source (dSource or VDB) as returned by `GET /source`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceRecord {
    pub reference: String,
    pub name: String,
}

/// The subset of a job object needed to track it to completion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub reference: String,
    pub job_state: String,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub percent_complete: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityBreakdown {
    #[serde(default)]
    pub active_space: f64,
    #[serde(default)]
    pub sync_space: f64,
}

/// Space usage of one database, from `GET /capacity/consumer`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsumerRecord {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub breakdown: CapacityBreakdown,
}

// ─── Source operations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOperation {
    Start,
    Stop,
    Enable,
    Disable,
}

impl SourceOperation {
    /// Path segment appended to `/source/{reference}/`.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceOperation::Start => "start",
            SourceOperation::Stop => "stop",
            SourceOperation::Enable => "enable",
            SourceOperation::Disable => "disable",
        }
    }
}

impl std::fmt::Display for SourceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const UNKNOWN_URI_ERROR: &str = "uri was not recorded in the transaction";

/// Collapses any number of leading separators down to exactly one.
pub fn normalize_uri(uri: &str) -> String {
    format!("/{}", uri.trim_start_matches('/'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriStatus {
    Started,
    Uploaded,
    UploadFailed,
    CommitFailed,
    Committed,
    RolledBack,
    Unknown,
}

impl UriStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Uploaded => "uploaded",
            Self::UploadFailed => "upload-failed",
            Self::CommitFailed => "commit-failed",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient: an unrecognized token becomes `Unknown` so old records still
    /// load.
    pub fn parse(value: &str) -> Self {
        match value {
            "started" => Self::Started,
            "uploaded" => Self::Uploaded,
            "upload-failed" => Self::UploadFailed,
            "commit-failed" => Self::CommitFailed,
            "committed" => Self::Committed,
            "rolled-back" => Self::RolledBack,
            _ => Self::Unknown,
        }
    }
}

impl Serialize for UriStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UriStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

impl fmt::Display for UriStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The journey of a single uri through one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriInfo {
    pub uri: String,
    pub status: UriStatus,
    #[serde(
        rename = "start",
        with = "crate::timefmt::timestamp_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "end",
        with = "crate::timefmt::timestamp_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none", default)]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl UriInfo {
    pub fn new(uri: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            uri: normalize_uri(uri),
            status: UriStatus::Started,
            started_at: Some(crate::timefmt::truncate_to_seconds(started_at)),
            ended_at: None,
            duration_ms: None,
            sha256: None,
            error: None,
        }
    }

    /// Fallback record for a uri that was queried but never staged.
    pub fn unknown(uri: &str) -> Self {
        Self {
            uri: normalize_uri(uri),
            status: UriStatus::Unknown,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            sha256: None,
            error: Some(UNKNOWN_URI_ERROR.to_string()),
        }
    }

    /// Ends the upload timing. A present fingerprint means the stage
    /// succeeded; a missing one marks the record upload-failed.
    pub fn stop(&mut self, sha256: Option<String>) {
        let ended_at = crate::timefmt::now();
        self.ended_at = Some(ended_at);
        if let Some(started_at) = self.started_at {
            self.duration_ms = Some((ended_at - started_at).num_milliseconds());
        }
        self.status = match &sha256 {
            Some(value) if !value.trim().is_empty() => UriStatus::Uploaded,
            _ => UriStatus::UploadFailed,
        };
        self.sha256 = sha256;
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = UriStatus::CommitFailed;
        self.error = Some(error.into());
    }

    pub fn mark_committed(&mut self) {
        self.status = UriStatus::Committed;
    }

    pub fn mark_rolled_back(&mut self) {
        self.status = UriStatus::RolledBack;
    }

    pub fn has_error(&self) -> bool {
        self.error
            .as_deref()
            .map(|error| !error.trim().is_empty())
            .unwrap_or(false)
    }
}

impl fmt::Display for UriInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uri, self.status)
    }
}

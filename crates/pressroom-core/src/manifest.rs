use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Publish instructions that do not carry file bytes: copies of
/// already-published files and deletions of published uris.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files_to_copy: Vec<FileCopy>,
    #[serde(default)]
    pub uris_to_delete: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCopy {
    pub source: String,
    pub target: String,
}

impl Manifest {
    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        serde_json::from_str(input).context("failed to parse publish manifest")
    }
}

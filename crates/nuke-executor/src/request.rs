//! Input and output envelopes exchanged with the invoking workflow.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TOOL_VERSION;

/// Maximum length of the envelope's `Error` field.
pub const MAX_ERROR_LEN: usize = 2000;

/// Maximum length of the envelope's `Output` preview.
pub const MAX_OUTPUT_PREVIEW_LEN: usize = 2000;

fn default_true() -> bool {
    true
}

fn default_tool_version() -> String {
    DEFAULT_TOOL_VERSION.to_string()
}

/// One invocation's input. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionRequest {
    /// Storage URI of the policy document.
    #[serde(rename = "ConfigS3Uri")]
    pub policy_uri: String,

    #[serde(default = "default_true")]
    pub dry_run: bool,

    pub account_id: String,

    #[serde(default = "default_true")]
    pub send_notification: bool,

    /// Pinned fallback version.
    #[serde(rename = "NukeVersion", default = "default_tool_version")]
    pub tool_version: String,

    /// Disables the registry lookup when true.
    #[serde(default)]
    pub enforce_version: bool,
}

impl ExecutionRequest {
    pub fn new(policy_uri: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            policy_uri: policy_uri.into(),
            dry_run: true,
            account_id: account_id.into(),
            send_notification: true,
            tool_version: default_tool_version(),
            enforce_version: false,
        }
    }

    /// Parse an input envelope, filling a missing `NukeVersion` with
    /// `default_version` instead of the built-in pin.
    pub fn from_json(raw: &str, default_version: &str) -> serde_json::Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        if let Some(fields) = value.as_object_mut() {
            fields
                .entry("NukeVersion")
                .or_insert_with(|| serde_json::Value::String(default_version.to_string()));
        }
        serde_json::from_value(value)
    }

    pub fn mode(&self) -> &'static str {
        if self.dry_run {
            "dryrun"
        } else {
            "execution"
        }
    }
}

/// One invocation's structured outcome, consumed verbatim by the
/// notification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultEnvelope {
    pub success: bool,

    /// Empty on success; bounded to `MAX_ERROR_LEN` characters.
    pub error: String,

    /// Bounded preview of the persisted error document (failure paths).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Filtered output on dry-run, full output on real-run, error document
    /// on failure.
    #[serde(rename = "OutputS3Uri")]
    pub output_uri: String,

    #[serde(rename = "FullOutputS3Uri")]
    pub full_output_uri: String,

    #[serde(
        rename = "FilteredOutputS3Uri",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub filtered_output_uri: Option<String>,

    /// Shareable URL for `output_uri`, when presigning succeeded.
    #[serde(rename = "OutputUrl", default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,

    pub resources_to_delete: usize,

    pub dry_run: bool,

    pub send_notification: bool,
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn bounded(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: ExecutionRequest = serde_json::from_value(json!({
            "ConfigS3Uri": "s3://nuke-bucket/configs/123.yaml",
            "AccountId": "123456789012"
        }))
        .unwrap();

        assert!(request.dry_run);
        assert!(request.send_notification);
        assert!(!request.enforce_version);
        assert_eq!(request.tool_version, DEFAULT_TOOL_VERSION);
        assert_eq!(request.mode(), "dryrun");
    }

    #[test]
    fn test_request_full_payload() {
        let request: ExecutionRequest = serde_json::from_value(json!({
            "ConfigS3Uri": "s3://b/k.yaml",
            "DryRun": false,
            "AccountId": "123456789012",
            "SendNotification": false,
            "NukeVersion": "v3.0.0",
            "EnforceVersion": true
        }))
        .unwrap();

        assert!(!request.dry_run);
        assert!(!request.send_notification);
        assert!(request.enforce_version);
        assert_eq!(request.tool_version, "v3.0.0");
        assert_eq!(request.mode(), "execution");
    }

    #[test]
    fn test_from_json_uses_configured_default_version() {
        let raw = r#"{"ConfigS3Uri": "s3://b/k.yaml", "AccountId": "1"}"#;
        let request = ExecutionRequest::from_json(raw, "v3.40.0").unwrap();
        assert_eq!(request.tool_version, "v3.40.0");

        let raw = r#"{"ConfigS3Uri": "s3://b/k.yaml", "AccountId": "1", "NukeVersion": "v3.1.0"}"#;
        let request = ExecutionRequest::from_json(raw, "v3.40.0").unwrap();
        assert_eq!(request.tool_version, "v3.1.0");
    }

    #[test]
    fn test_request_requires_policy_and_account() {
        let result: std::result::Result<ExecutionRequest, _> =
            serde_json::from_value(json!({ "AccountId": "1" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_wire_keys() {
        let envelope = ResultEnvelope {
            success: true,
            error: String::new(),
            output: None,
            output_uri: "s3://b/filtered.txt".into(),
            full_output_uri: "s3://b/full.txt".into(),
            filtered_output_uri: Some("s3://b/filtered.txt".into()),
            output_url: None,
            resources_to_delete: 2,
            dry_run: true,
            send_notification: true,
        };

        let v = serde_json::to_value(&envelope).unwrap();
        assert_eq!(v["Success"], json!(true));
        assert_eq!(v["Error"], json!(""));
        assert_eq!(v["OutputS3Uri"], json!("s3://b/filtered.txt"));
        assert_eq!(v["FullOutputS3Uri"], json!("s3://b/full.txt"));
        assert_eq!(v["ResourcesToDelete"], json!(2));
        assert_eq!(v["DryRun"], json!(true));
        assert_eq!(v["SendNotification"], json!(true));
        assert!(v.get("Output").is_none());
        assert!(v.get("OutputUrl").is_none());
    }

    #[test]
    fn test_bounded_respects_char_boundaries() {
        assert_eq!(bounded("abcdef", 3), "abc");
        assert_eq!(bounded("abc", 10), "abc");
        assert_eq!(bounded("ééé", 2), "éé");
        assert_eq!(bounded("", 5), "");
    }
}

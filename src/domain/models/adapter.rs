//! CLI adapter descriptors.
//!
//! An adapter is one provider of role execution capability: a CLI tool
//! invoked as a child process (or an in-process internal adapter). The
//! descriptor table is static configuration consulted in order.

use serde::{Deserialize, Serialize};

/// Authorization-failure fragments shared by all adapters. Stdout containing
/// any of these marks the invocation failed regardless of exit status.
pub const AUTH_FAILURE_SUBSTRINGS: &[&str] = &[
    "authorization failed",
    "please log in",
    "please run /login",
    "token expired",
    "invalid api key",
    "not logged in",
];

/// Placeholder for the rendered prompt in execute args.
pub const PROMPT_PLACEHOLDER: &str = "{{prompt}}";

/// Describes how to probe and execute one CLI adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliAdapterDescriptor {
    pub id: String,
    pub probe_command: String,
    #[serde(default)]
    pub probe_args: Vec<String>,
    pub execute_command: String,
    /// Args templated with `{{prompt}}`.
    #[serde(default)]
    pub execute_args: Vec<String>,
    /// Adapter-specific stdout fragments that mark the invocation rejected.
    #[serde(default)]
    pub reject_output_substrings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_flag: Option<String>,
    /// Internal adapters execute in-process and never spawn a child.
    #[serde(default)]
    pub is_internal: bool,
}

impl CliAdapterDescriptor {
    /// Render the execute args with the prompt substituted.
    pub fn render_execute_args(&self, prompt: &str) -> Vec<String> {
        self.execute_args
            .iter()
            .map(|arg| arg.replace(PROMPT_PLACEHOLDER, prompt))
            .collect()
    }

    /// True when stdout marks the invocation as rejected: either an
    /// adapter-specific fragment or a common authorization failure.
    pub fn output_rejected(&self, stdout: &str) -> bool {
        let lowered = stdout.to_lowercase();
        self.reject_output_substrings
            .iter()
            .any(|s| lowered.contains(&s.to_lowercase()))
            || AUTH_FAILURE_SUBSTRINGS.iter().any(|s| lowered.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> CliAdapterDescriptor {
        CliAdapterDescriptor {
            id: "test-cli".to_string(),
            probe_command: "test-cli".to_string(),
            probe_args: vec!["--version".to_string()],
            execute_command: "test-cli".to_string(),
            execute_args: vec!["-p".to_string(), "{{prompt}}".to_string()],
            reject_output_substrings: vec!["usage limit reached".to_string()],
            provider_flag: None,
            model_flag: None,
            reasoning_flag: None,
            is_internal: false,
        }
    }

    #[test]
    fn test_render_execute_args() {
        let args = descriptor().render_execute_args("hello world");
        assert_eq!(args, vec!["-p", "hello world"]);
    }

    #[test]
    fn test_adapter_specific_rejection() {
        let d = descriptor();
        assert!(d.output_rejected("Usage limit reached, try later"));
        assert!(!d.output_rejected("all good"));
    }

    #[test]
    fn test_common_auth_rejection() {
        let d = descriptor();
        assert!(d.output_rejected("error: Authorization failed for account"));
        assert!(d.output_rejected("Token expired at 2026-01-01"));
    }
}

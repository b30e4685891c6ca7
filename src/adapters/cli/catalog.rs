//! Built-in CLI adapter catalog.
//!
//! A static table consulted in the order given by `cli_adapter_order`.
//! The `local-echo` adapter is internal: it executes in-process and is used
//! for smoke tests and offline development.

use crate::domain::models::CliAdapterDescriptor;

/// Identifier of the in-process echo adapter.
pub const LOCAL_ECHO_ID: &str = "local-echo";

/// The built-in adapter table.
pub fn builtin_adapters() -> Vec<CliAdapterDescriptor> {
    vec![
        CliAdapterDescriptor {
            id: "claude-cli".to_string(),
            probe_command: "claude".to_string(),
            probe_args: vec!["--version".to_string()],
            execute_command: "claude".to_string(),
            execute_args: vec!["--print".to_string(), "-p".to_string(), "{{prompt}}".to_string()],
            reject_output_substrings: vec![
                "usage limit reached".to_string(),
                "please run /login".to_string(),
            ],
            provider_flag: None,
            model_flag: Some("--model".to_string()),
            reasoning_flag: None,
            is_internal: false,
        },
        CliAdapterDescriptor {
            id: "codex-cli".to_string(),
            probe_command: "codex".to_string(),
            probe_args: vec!["--version".to_string()],
            execute_command: "codex".to_string(),
            execute_args: vec!["exec".to_string(), "{{prompt}}".to_string()],
            reject_output_substrings: vec!["rate limit".to_string()],
            provider_flag: Some("--provider".to_string()),
            model_flag: Some("--model".to_string()),
            reasoning_flag: Some("--reasoning".to_string()),
            is_internal: false,
        },
        CliAdapterDescriptor {
            id: "gemini-cli".to_string(),
            probe_command: "gemini".to_string(),
            probe_args: vec!["--version".to_string()],
            execute_command: "gemini".to_string(),
            execute_args: vec!["-p".to_string(), "{{prompt}}".to_string()],
            reject_output_substrings: vec!["quota exceeded".to_string()],
            provider_flag: None,
            model_flag: Some("-m".to_string()),
            reasoning_flag: None,
            is_internal: false,
        },
        CliAdapterDescriptor {
            id: LOCAL_ECHO_ID.to_string(),
            probe_command: String::new(),
            probe_args: Vec::new(),
            execute_command: String::new(),
            execute_args: Vec::new(),
            reject_output_substrings: Vec::new(),
            provider_flag: None,
            model_flag: None,
            reasoning_flag: None,
            is_internal: true,
        },
    ]
}

/// Look up an adapter descriptor by id.
pub fn find_adapter(id: &str) -> Option<CliAdapterDescriptor> {
    builtin_adapters().into_iter().find(|a| a.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_contains_local_echo() {
        let echo = find_adapter(LOCAL_ECHO_ID).unwrap();
        assert!(echo.is_internal);
    }

    #[test]
    fn test_unknown_adapter() {
        assert!(find_adapter("vim").is_none());
    }

    #[test]
    fn test_claude_cli_prompt_rendering() {
        let claude = find_adapter("claude-cli").unwrap();
        let args = claude.render_execute_args("fix the bug");
        assert_eq!(args, vec!["--print", "-p", "fix the bug"]);
    }
}

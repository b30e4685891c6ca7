//! Sandbox command wrapping.
//!
//! Before a CLI adapter is spawned, its raw command line is rewritten
//! according to the agent's sandbox level: pass-through for bare CLI, the OS
//! native sandbox tool for os-sandboxed, or the configured container wrapper.

use crate::config::{SandboxSettings, SandboxWrapperSpec};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SandboxLevel;

/// Placeholder for the inner command in wrapper args.
pub const COMMAND_PLACEHOLDER: &str = "{{command}}";
/// Placeholder for the generated container args in wrapper args.
pub const ARGS_JOINED_PLACEHOLDER: &str = "{{args_joined}}";

/// Single-quote shell-safe quoting: wraps in single quotes, escaping any
/// embedded single quote as `'\''`.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '='))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Join argv into a single shell-safe string.
fn quote_join(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the container runtime args: workspace mount, resource limits,
/// network policy, and host-gateway mapping for agent-to-agent networking.
fn container_args(settings: &SandboxSettings) -> Vec<String> {
    let mut args = vec![
        "-v".to_string(),
        format!("{}:/workspace:rw", settings.workspace_dir),
        "-w".to_string(),
        "/workspace".to_string(),
    ];
    if let Some(cpus) = settings.cpu_limit {
        args.push("--cpus".to_string());
        args.push(cpus.to_string());
    }
    if let Some(ref memory) = settings.memory_limit {
        args.push("--memory".to_string());
        args.push(memory.clone());
    }
    args.push("--stop-timeout".to_string());
    args.push(settings.stop_timeout_seconds.to_string());
    if settings.allowed_hosts.is_empty() {
        args.push("--network".to_string());
        args.push("none".to_string());
    }
    if settings.agent_networking {
        args.push("--add-host".to_string());
        args.push("host.docker.internal:host-gateway".to_string());
    }
    args
}

/// Wrap a raw adapter command per sandbox level.
///
/// Container wrapping requires a wrapper spec; its absence here is a
/// configuration fault that validation should have caught at startup.
pub fn wrap_command(
    argv: &[String],
    level: SandboxLevel,
    settings: &SandboxSettings,
) -> DomainResult<Vec<String>> {
    if argv.is_empty() {
        return Err(DomainError::ValidationFailed(
            "Cannot wrap an empty command".to_string(),
        ));
    }

    match level {
        SandboxLevel::BareCli => Ok(argv.to_vec()),
        SandboxLevel::OsSandboxed => {
            let mut profile = String::from("(version 1) (deny network*)");
            for host in &settings.allowed_hosts {
                profile.push_str(&format!(" (allow network* (remote ip \"{host}\"))"));
            }
            let mut wrapped = vec!["sandbox-exec".to_string(), "-p".to_string(), profile];
            wrapped.extend_from_slice(argv);
            Ok(wrapped)
        }
        SandboxLevel::Container => {
            let wrapper = settings.wrapper.as_ref().ok_or_else(|| {
                DomainError::ValidationFailed(
                    "Container sandbox level requires a wrapper specification".to_string(),
                )
            })?;
            Ok(render_wrapper(wrapper, argv, settings))
        }
    }
}

fn render_wrapper(
    wrapper: &SandboxWrapperSpec,
    argv: &[String],
    settings: &SandboxSettings,
) -> Vec<String> {
    let command_str = quote_join(argv);
    let container_args = container_args(settings);
    let args_joined = container_args.join(" ");

    let mut wrapped = vec![wrapper.command.clone()];
    for arg in &wrapper.args {
        if arg == ARGS_JOINED_PLACEHOLDER {
            // A bare placeholder expands into individual args
            wrapped.extend(container_args.iter().cloned());
        } else if arg == COMMAND_PLACEHOLDER {
            wrapped.extend(argv.iter().cloned());
        } else {
            wrapped.push(
                arg.replace(ARGS_JOINED_PLACEHOLDER, &args_joined)
                    .replace(COMMAND_PLACEHOLDER, &command_str),
            );
        }
    }
    wrapped
}

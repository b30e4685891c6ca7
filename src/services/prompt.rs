//! Prompt assembly and response parsing.
//!
//! Prompts are assembled from a role-specific system prompt, the task, the
//! carried plan, optional strategy advice, code and project context, and
//! matched skills (truncated to a byte budget). The orchestrator gets a
//! distinct prompt carrying GOAP analysis and a blackboard digest.

use crate::domain::models::{ActionName, ExecuteRoleTask, SwarmRole};

/// A named skill with a markdown body, matched against the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub body: String,
}

/// Roles that receive skill context.
fn role_uses_skills(role: SwarmRole) -> bool {
    matches!(
        role,
        SwarmRole::Builder | SwarmRole::Reviewer | SwarmRole::Planner
    )
}

fn system_prompt(role: SwarmRole) -> &'static str {
    match role {
        SwarmRole::Orchestrator => {
            "You are the orchestrator of a software-engineering agent swarm. \
             Decide the single next pipeline action for the task below."
        }
        SwarmRole::Planner => {
            "You are the planner. Produce a concrete implementation plan as a \
             numbered list. Emit `SUBTASK: <title>|<description>` lines for \
             work that should be decomposed into sub-tasks."
        }
        SwarmRole::Builder => {
            "You are the builder. Implement the plan exactly. Output the \
             complete implementation."
        }
        SwarmRole::Reviewer => {
            "You are the reviewer. Judge whether the build satisfies the plan. \
             Start your verdict line with APPROVE or REJECT, then justify."
        }
        SwarmRole::Researcher => {
            "You are the researcher. Gather the facts the task needs and \
             report findings."
        }
        SwarmRole::Debugger => {
            "You are the debugger. Isolate the defect and propose the minimal \
             fix."
        }
        SwarmRole::Tester => {
            "You are the tester. Exercise the implementation and report what \
             passes and what fails."
        }
    }
}

/// Append skills, truncating bodies so the total stays within `byte_budget`.
/// Headers are exempt from the budget.
fn push_skills(prompt: &mut String, skills: &[Skill], byte_budget: usize) {
    if skills.is_empty() {
        return;
    }
    prompt.push_str("\n## Relevant skills\n");
    let mut remaining = byte_budget;
    for skill in skills {
        prompt.push_str(&format!("\n### {}\n", skill.name));
        if remaining == 0 {
            continue;
        }
        let body = if skill.body.len() <= remaining {
            skill.body.as_str()
        } else {
            // Cut on a char boundary at or below the remaining budget
            let mut cut = remaining;
            while cut > 0 && !skill.body.is_char_boundary(cut) {
                cut -= 1;
            }
            &skill.body[..cut]
        };
        remaining -= body.len();
        prompt.push_str(body);
        prompt.push('\n');
    }
}

/// Assemble the prompt for a non-orchestrator role.
pub fn build_role_prompt(task: &ExecuteRoleTask, skills: &[Skill], skill_byte_budget: usize) -> String {
    let mut prompt = String::new();
    prompt.push_str(system_prompt(task.role));
    prompt.push_str("\n\n## Task\n");
    prompt.push_str(&format!("Title: {}\n", task.title));
    prompt.push_str(&format!("Description: {}\n", task.description));

    if matches!(task.role, SwarmRole::Builder | SwarmRole::Reviewer) {
        if let Some(ref plan) = task.plan {
            prompt.push_str("\n## Implementation plan\n");
            prompt.push_str(plan);
            prompt.push('\n');
        }
    }

    if let Some(ref advice) = task.strategy_advice {
        prompt.push_str("\n## Strategy advice\n");
        prompt.push_str(advice);
        prompt.push('\n');
    }

    if !task.code_context.is_empty() {
        prompt.push_str("\n## Code context\n");
        for chunk in &task.code_context {
            prompt.push_str(chunk);
            prompt.push('\n');
        }
    }

    if let Some(ref project) = task.project_context {
        prompt.push_str("\n## Project context\n");
        prompt.push_str(project);
        prompt.push('\n');
    }

    if role_uses_skills(task.role) {
        push_skills(&mut prompt, skills, skill_byte_budget);
    }

    prompt
}

/// Assemble the orchestrator prompt with GOAP analysis and blackboard digest.
pub fn build_orchestrator_prompt(task: &ExecuteRoleTask) -> String {
    let mut prompt = String::new();
    prompt.push_str(system_prompt(SwarmRole::Orchestrator));
    prompt.push_str("\n\n## Task\n");
    prompt.push_str(&format!("Title: {}\n", task.title));
    prompt.push_str(&format!("Description: {}\n", task.description));

    if let Some(ref analysis) = task.goap_analysis {
        prompt.push_str("\n## Planner analysis\n");
        prompt.push_str(analysis);
        prompt.push('\n');
    }
    if let Some(ref digest) = task.blackboard_digest {
        prompt.push_str("\n## Blackboard\n");
        prompt.push_str(digest);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nRespond in the format:\nACTION: <Name>\nREASON: <one sentence>\n\
         Valid names: Plan, Build, Review, Rework, Escalate, Finalize, WaitForSubTasks\n",
    );
    prompt
}

/// Extract the orchestrator's chosen action from its response.
/// Matches `ACTION:\s*(\w+)` case-insensitively, first hit wins.
pub fn parse_action(output: &str) -> Option<ActionName> {
    for line in output.lines() {
        let trimmed = line.trim();
        let lowered = trimmed.to_lowercase();
        if let Some(rest) = lowered.strip_prefix("action:") {
            let word: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if word.is_empty() {
                continue;
            }
            if let Some(action) = ActionName::from_str(&word) {
                return Some(action);
            }
        }
    }
    None
}

/// Extract `SUBTASK: <title>|<description>` lines from planner output.
pub fn parse_subtasks(output: &str) -> Vec<(String, String)> {
    let mut subtasks = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed
            .strip_prefix("SUBTASK:")
            .or_else(|| trimmed.strip_prefix("subtask:"))
        else {
            continue;
        };
        let Some((title, description)) = rest.split_once('|') else {
            continue;
        };
        let title = title.trim();
        let description = description.trim();
        if !title.is_empty() {
            subtasks.push((title.to_string(), description.to_string()));
        }
    }
    subtasks
}

/// Interpret a reviewer's output as approved/rejected. A line starting with
/// REJECT (or a VERDICT line carrying it) rejects; anything else approves.
pub fn review_approved(output: &str) -> bool {
    for line in output.lines() {
        let lowered = line.trim().to_lowercase();
        if lowered.starts_with("reject") {
            return false;
        }
        if lowered.starts_with("verdict:") && lowered.contains("reject") {
            return false;
        }
    }
    true
}

/// Normalise adapter output: strip ANSI escape sequences, collapse CRLF,
/// trim surrounding whitespace.
pub fn normalize_output(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // CSI sequence: ESC [ ... final byte in @..~
            if chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&next) {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out.replace("\r\n", "\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(role: SwarmRole) -> ExecuteRoleTask {
        ExecuteRoleTask::new("t1", role, "Smoke", "Verify the pipeline")
    }

    #[test]
    fn test_parse_action_case_insensitive() {
        assert_eq!(parse_action("ACTION: Build\nREASON: ready"), Some(ActionName::Build));
        assert_eq!(parse_action("action:   finalize"), Some(ActionName::Finalize));
        assert_eq!(
            parse_action("REASON: first\nACTION: Rework"),
            Some(ActionName::Rework)
        );
    }

    #[test]
    fn test_parse_action_missing_or_garbage() {
        assert_eq!(parse_action("no action line here"), None);
        assert_eq!(parse_action("ACTION: Teleport"), None);
        assert_eq!(parse_action("ACTION:"), None);
    }

    #[test]
    fn test_parse_subtasks() {
        let output = "1. do things\nSUBTASK: Parser|Write the parser module\n\
                      SUBTASK: Tests | Cover the parser \nnot a subtask";
        let subtasks = parse_subtasks(output);
        assert_eq!(
            subtasks,
            vec![
                ("Parser".to_string(), "Write the parser module".to_string()),
                ("Tests".to_string(), "Cover the parser".to_string()),
            ]
        );
    }

    #[test]
    fn test_review_verdict() {
        assert!(review_approved("APPROVE: looks correct"));
        assert!(!review_approved("REJECT: missing error handling"));
        assert!(!review_approved("Verdict: rejected due to failing tests"));
        assert!(review_approved("The build is fine.\nNothing to add."));
    }

    #[test]
    fn test_normalize_output() {
        let raw = "\u{1b}[32mgreen\u{1b}[0m text\r\nline two\r\n  ";
        assert_eq!(normalize_output(raw), "green text\nline two");
    }

    #[test]
    fn test_plan_included_for_builder_only() {
        let mut builder = task(SwarmRole::Builder).with_plan("1. write code");
        let prompt = build_role_prompt(&builder, &[], 4000);
        assert!(prompt.contains("Implementation plan"));

        builder.role = SwarmRole::Researcher;
        let prompt = build_role_prompt(&builder, &[], 4000);
        assert!(!prompt.contains("Implementation plan"));
    }

    #[test]
    fn test_skills_only_for_selected_roles() {
        let skills = vec![Skill {
            name: "error-handling".to_string(),
            body: "Use thiserror for domain errors".to_string(),
        }];
        let prompt = build_role_prompt(&task(SwarmRole::Builder), &skills, 4000);
        assert!(prompt.contains("error-handling"));

        let prompt = build_role_prompt(&task(SwarmRole::Debugger), &skills, 4000);
        assert!(!prompt.contains("error-handling"));
    }

    #[test]
    fn test_skill_bodies_truncated_to_budget() {
        let skills = vec![
            Skill {
                name: "a".to_string(),
                body: "x".repeat(30),
            },
            Skill {
                name: "b".to_string(),
                body: "y".repeat(30),
            },
        ];
        let prompt = build_role_prompt(&task(SwarmRole::Planner), &skills, 40);
        // First body fits whole, second gets the remaining 10 bytes;
        // both headers survive.
        assert!(prompt.contains("### a"));
        assert!(prompt.contains("### b"));
        assert!(prompt.contains(&"x".repeat(30)));
        assert!(prompt.contains(&"y".repeat(10)));
        assert!(!prompt.contains(&"y".repeat(11)));
    }

    #[test]
    fn test_orchestrator_prompt_carries_analysis() {
        let mut t = task(SwarmRole::Orchestrator);
        t.goap_analysis = Some("recommended=[Plan, Build]".to_string());
        t.blackboard_digest = Some("plan_exists=false".to_string());
        let prompt = build_orchestrator_prompt(&t);
        assert!(prompt.contains("Planner analysis"));
        assert!(prompt.contains("recommended=[Plan, Build]"));
        assert!(prompt.contains("Blackboard"));
        assert!(prompt.contains("ACTION: <Name>"));
    }
}

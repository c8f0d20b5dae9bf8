use colored::Colorize;

use crate::message::{Message, Part, Role, ToolInvocation};

/// Format a message for terminal display with role label and colors.
pub fn format_message(msg: &Message) -> String {
    let label = format_role_label(msg.role);
    let body: Vec<String> = msg
        .parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => format_text(text, msg.role),
            Part::ToolInvocation(inv) => format_invocation(inv),
        })
        .collect();
    format!("{}\n{}", label, body.join("\n"))
}

fn format_role_label(role: Role) -> String {
    let label = format!("{}:", role);
    match role {
        Role::User => label.green().bold().to_string(),
        Role::Assistant => label.cyan().bold().to_string(),
        Role::System => label.dimmed().to_string(),
    }
}

fn format_text(text: &str, role: Role) -> String {
    match role {
        Role::System => text.dimmed().to_string(),
        _ => text.to_string(),
    }
}

/// One line per invocation: name, arguments, then the result or a marker
/// that it still waits on approval.
pub fn format_invocation(inv: &ToolInvocation) -> String {
    let outcome = match inv.result_text() {
        Some(result) => format!("-> {}", result).dimmed().to_string(),
        None => "(awaiting approval)".yellow().to_string(),
    };
    format!(
        "  {} {} {} {}",
        "tool".yellow(),
        inv.tool_name.bold(),
        inv.args.to_string().dimmed(),
        outcome
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolState;
    use serde_json::json;

    #[test]
    fn invocation_shows_result_or_pending_marker() {
        colored::control::set_override(false);
        let mut inv = ToolInvocation::call("t1", "getWeatherInformation", json!({"city": "Paris"}));
        let pending = format_invocation(&inv);
        assert!(pending.contains("getWeatherInformation"));
        assert!(pending.contains("awaiting approval"));

        inv.state = ToolState::Result(json!("Rejected"));
        let done = format_invocation(&inv);
        assert!(done.ends_with("-> Rejected"));
    }

    #[test]
    fn message_lists_parts_in_order() {
        colored::control::set_override(false);
        let msg = Message::assistant(vec![
            Part::Text {
                text: "Let me check.".into(),
            },
            Part::ToolInvocation(ToolInvocation::call("t1", "getLocalTime", json!({}))),
        ]);
        let out = format_message(&msg);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "agent:");
        assert_eq!(lines[1], "Let me check.");
        assert!(lines[2].contains("getLocalTime"));
    }
}

//! History sanitizer.
//!
//! When a turn runs without tools, earlier tool traffic must not reach the
//! provider as structured parts: most APIs reject tool calls and results
//! that reference tools the request does not declare. They are flattened
//! into plain text the model can still read.

use cg_domain::tool::{ContentPart, Message, MessageContent, Role};

/// Rewrite `messages` for a turn. Pure and idempotent.
pub fn sanitize_history(messages: &[Message], has_tools: bool) -> Vec<Message> {
    if has_tools {
        return messages.to_vec();
    }
    messages.iter().filter_map(flatten_message).collect()
}

fn flatten_message(msg: &Message) -> Option<Message> {
    let role = match msg.role {
        Role::Tool => Role::Assistant,
        other => other,
    };

    let content = match &msg.content {
        MessageContent::Text(text) => MessageContent::Text(text.clone()),
        MessageContent::Parts(parts) => {
            let parts: Vec<ContentPart> = parts.iter().filter_map(flatten_part).collect();
            if parts.is_empty() {
                return None;
            }
            MessageContent::Parts(parts)
        }
    };

    Some(Message {
        id: msg.id.clone(),
        role,
        content,
        attachments: msg.attachments.clone(),
    })
}

fn flatten_part(part: &ContentPart) -> Option<ContentPart> {
    match part {
        ContentPart::ToolUse { name, input, .. } => Some(ContentPart::Text {
            text: format!("[Called tool `{name}` with {input}]"),
        }),
        ContentPart::ToolResult {
            content, is_error, ..
        } => Some(ContentPart::Text {
            text: if *is_error {
                format!("[Tool error: {content}]")
            } else {
                format!("[Tool result: {content}]")
            },
        }),
        ContentPart::Reasoning { .. } => None,
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_history() -> Vec<Message> {
        vec![
            Message::user("what time is it?"),
            Message::assistant_parts(vec![
                ContentPart::Reasoning {
                    text: "need the clock".into(),
                },
                ContentPart::Text {
                    text: "Checking.".into(),
                },
                ContentPart::ToolUse {
                    id: "call_1".into(),
                    name: "clock".into(),
                    input: json!({}),
                },
            ]),
            Message::tool_result("call_1", "2026-01-01T12:00:00Z"),
            Message::tool_output("call_2", "boom", true),
            Message::assistant("It is noon."),
        ]
    }

    #[test]
    fn passes_through_when_tools_present() {
        let history = tool_history();
        let out = sanitize_history(&history, true);
        assert_eq!(out.len(), history.len());
        assert!(out[1].has_tool_parts());
        assert_eq!(out[2].role, Role::Tool);
    }

    #[test]
    fn flattens_tool_parts_without_tools() {
        let out = sanitize_history(&tool_history(), false);
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|m| !m.has_tool_parts()));
        assert!(out.iter().all(|m| m.role != Role::Tool));

        assert_eq!(
            out[1].content.extract_all_text(),
            "Checking.\n[Called tool `clock` with {}]"
        );
        assert_eq!(
            out[2].content.extract_all_text(),
            "[Tool result: 2026-01-01T12:00:00Z]"
        );
        assert_eq!(out[3].content.extract_all_text(), "[Tool error: boom]");
        assert_eq!(out[2].role, Role::Assistant);
    }

    #[test]
    fn sanitizing_is_idempotent() {
        let once = sanitize_history(&tool_history(), false);
        let twice = sanitize_history(&once, false);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn reasoning_only_messages_are_dropped() {
        let history = vec![
            Message::user("hi"),
            Message::assistant_parts(vec![ContentPart::Reasoning {
                text: "hmm".into(),
            }]),
        ];
        let out = sanitize_history(&history, false);
        assert_eq!(out.len(), 1);
    }
}

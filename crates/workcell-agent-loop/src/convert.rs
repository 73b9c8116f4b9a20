//! Pure functions for converting between workcell and genai types.

use genai::chat::{ChatMessage, ChatRequest, MessageContent, ToolResponse};
use workcell_contract::thread::{Message, Role, ToolCall};
use workcell_contract::tool::ToolDescriptor;

/// Convert a ToolDescriptor to a genai Tool.
pub fn to_genai_tool(desc: &ToolDescriptor) -> genai::chat::Tool {
    genai::chat::Tool::new(&desc.id)
        .with_description(&desc.description)
        .with_schema(desc.parameters.clone())
}

pub fn to_chat_message(msg: &Message) -> ChatMessage {
    match msg.role {
        Role::System => ChatMessage::system(&msg.content),
        Role::User => ChatMessage::user(&msg.content),
        Role::Assistant => match &msg.tool_calls {
            Some(calls) if !calls.is_empty() => {
                let mut content = MessageContent::from(msg.content.as_str());
                for call in calls {
                    content.push(genai::chat::ContentPart::ToolCall(genai::chat::ToolCall {
                        call_id: call.id.clone(),
                        fn_name: call.name.clone(),
                        fn_arguments: call.arguments.clone(),
                        thought_signatures: None,
                    }));
                }
                ChatMessage::assistant(content)
            }
            _ => ChatMessage::assistant(&msg.content),
        },
        Role::Tool => ChatMessage::from(ToolResponse {
            call_id: msg.tool_call_id.clone().unwrap_or_default(),
            content: msg.content.clone(),
        }),
    }
}

/// Build a genai ChatRequest from messages and tools.
pub fn build_request(messages: &[Message], tools: &[ToolDescriptor]) -> ChatRequest {
    let chat_messages: Vec<ChatMessage> = messages.iter().map(to_chat_message).collect();
    let request = ChatRequest::new(chat_messages);
    if tools.is_empty() {
        return request;
    }
    request.with_tools(tools.iter().map(to_genai_tool).collect::<Vec<_>>())
}

pub fn from_genai_tool_call(call: &genai::chat::ToolCall) -> ToolCall {
    ToolCall::new(&call.call_id, &call.fn_name, call.fn_arguments.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_becomes_genai_tool() {
        let desc = ToolDescriptor::new("calc", "Calculator", "Calculate expressions")
            .with_parameters(json!({"type": "object"}));
        let tool = to_genai_tool(&desc);
        assert_eq!(tool.name, "calc");
        assert_eq!(tool.description.as_deref(), Some("Calculate expressions"));
    }

    #[test]
    fn request_without_tools_has_none() {
        let request = build_request(&[Message::user("Hello"), Message::assistant("Hi!")], &[]);
        assert_eq!(request.messages.len(), 2);
        assert!(request.tools.is_none());
    }

    #[test]
    fn request_with_tools() {
        let desc = ToolDescriptor::new("echo", "Echo", "Echo input");
        let request = build_request(&[Message::user("Hello")], &[desc]);
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn tool_call_round_trips_through_genai() {
        let genai_call = genai::chat::ToolCall {
            call_id: "call_1".into(),
            fn_name: "search".into(),
            fn_arguments: json!({"q": "rust"}),
            thought_signatures: None,
        };
        let call = from_genai_tool_call(&genai_call);
        assert_eq!(call, ToolCall::new("call_1", "search", json!({"q": "rust"})));
    }

    #[test]
    fn tool_messages_convert_without_panicking() {
        let calls = vec![ToolCall::new("call_1", "search", json!({"q": "rust"}))];
        let _ = to_chat_message(&Message::assistant_with_tool_calls("Searching...", calls));
        let _ = to_chat_message(&Message::tool("call_1", "Result: 42"));
    }
}

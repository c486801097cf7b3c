//! System prompt assembly.

use std::sync::Arc;

use serde_json::json;

use cogwheel_core::{Message, Result};
use cogwheel_tools::Tool;

use crate::agent::Agent;
use crate::template::render_cached;

/// Embedded system prompt for the JSON wire format.
pub const JSON_SYSTEM_TEMPLATE: &str = include_str!("../prompts/json_system.md");

/// Embedded system prompt for the XML wire format.
pub const XML_SYSTEM_TEMPLATE: &str = include_str!("../prompts/xml_system.md");

/// Render the system prompt from a template, the agent, the user query and
/// the current tool list.
pub fn system_prompt(
    template: &str,
    agent: &Agent,
    user_message: &Message,
    tools: &[Arc<dyn Tool>],
) -> Result<String> {
    let params = json!({
        "agent": {
            "name": agent.name,
            "description": agent.description,
            "instructions": agent.instructions,
        },
        "tools": tool_catalog(tools),
        "userQuery": user_message.content,
    });
    render_cached(template, &params)
}

/// Render the tool catalog: one `<tool>` element per tool, with description,
/// input schema as JSON and an optional usage example.
pub fn tool_catalog(tools: &[Arc<dyn Tool>]) -> String {
    if tools.is_empty() {
        return "No tools available".to_string();
    }

    let mut out = String::with_capacity(tools.len() * 256);
    for (i, tool) in tools.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let schema = serde_json::to_string(&tool.input_schema()).unwrap_or_default();
        out.push_str("<tool name=\"");
        out.push_str(tool.name());
        out.push_str("\">\n<description>");
        out.push_str(tool.description());
        out.push_str("</description>\n<input_schema>\n");
        out.push_str(&schema);
        out.push_str("\n</input_schema>");

        let usage = tool.usage();
        if !usage.is_empty() {
            out.push_str("\n<usage>\n");
            out.push_str(usage);
            out.push_str("\n</usage>");
        }
        out.push_str("\n</tool>");
    }
    out
}

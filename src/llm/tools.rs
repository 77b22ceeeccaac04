//! Deck tool definitions for the AI assistant.
//!
//! This is the fixed vocabulary the model is constrained to: two read tools
//! that resolve against the persisted deck, and three write tools that emit
//! declarative commands for the editor to apply. Any other tool name is out
//! of scope by construction.

use super::types::Tool;

/// Minimum accepted slide content length after trimming. Shorter content is
/// rejected so the assistant synthesizes a real placeholder instead of
/// writing a near-empty slide.
pub const MIN_SLIDE_CONTENT_LEN: usize = 10;

/// Build the set of tools available to the deck assistant.
#[must_use]
pub fn deck_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "readDeck".into(),
            description: "Read every slide of the current deck: index, name, HTML, and CSS. \
                          Use this before editing so slide indices are current."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "includeNames": { "type": "boolean", "description": "Include slide names in the response" }
                }
            }),
        },
        Tool {
            name: "readSlide".into(),
            description: "Read a single slide by its 0-based index.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "slideIndex": { "type": "integer", "description": "0-based slide position" }
                },
                "required": ["slideIndex"]
            }),
        },
        Tool {
            name: "createSlide".into(),
            description: "Create a new slide from HTML content. Returns an addSlide command \
                          that the editor applies; it does not edit the deck directly."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Optional slide name" },
                    "content": { "type": "string", "description": "Slide HTML (full slide markup)" },
                    "insertAtIndex": { "type": "integer", "description": "Insert position; appends when omitted" }
                },
                "required": ["content"]
            }),
        },
        Tool {
            name: "replaceSlide".into(),
            description: "Replace an existing slide's content (and optionally its name) by index. \
                          Returns a replaceSlide command for the editor."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "slideIndex": { "type": "integer", "description": "0-based slide position" },
                    "content": { "type": "string", "description": "New slide HTML" },
                    "name": { "type": "string", "description": "Optional new slide name" }
                },
                "required": ["slideIndex", "content"]
            }),
        },
        Tool {
            name: "deleteSlide".into(),
            description: "Delete the slide at the given 0-based index. Returns a deleteSlide \
                          command for the editor."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "slideIndex": { "type": "integer", "description": "0-based slide position" }
                },
                "required": ["slideIndex"]
            }),
        },
    ]
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;

// Shared prompt fragments used by every structured completion.
// Service-specific prompts live in a prompts.rs next to the service.

/// Appended to every system prompt that expects a structured reply.
/// Replace `{response_shape}` before sending.
pub const FENCED_JSON_INSTRUCTION: &str = "\
Always and only return JSON in the following format ```{response_shape}```. \
Wrap the JSON in a single ```json fenced code block. \
Ensure the JSON is properly formatted, does not contain any extra characters \
or malformed structures, and is properly encapsulated.";

/// Repair round-trip prompt. Replace `{response_shape}` and `{malformed}`.
pub const REPAIR_PROMPT_TEMPLATE: &str = r#"The JSON you returned could not be parsed. Please take the following data and fix it so that it is valid JSON matching this format:
{response_shape}

Return only the corrected JSON inside a single ```json fenced code block.

DATA TO FIX:
{malformed}"#;

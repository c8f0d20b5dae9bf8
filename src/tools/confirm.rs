//! A confirmation-only tool: the model asks, the human answers, and the
//! answer is the result. Nothing runs on the server.

use serde_json::json;

use super::ToolContract;

pub const NAME: &str = "askForConfirmation";

pub fn contract() -> ToolContract {
    ToolContract::new(
        NAME,
        "Ask the user to confirm an action before going ahead. \
The result is \"Approved\" or \"Rejected\".",
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "What the user is asked to confirm"
                }
            },
            "required": ["message"]
        }),
    )
    .requiring_confirmation()
}

use serde::{Deserialize, Serialize};

/// Prefix of every tool result that reports a failure.
pub const ERROR_MARKER: &str = "ERROR:";

/// The text returned to the model after a tool call.
///
/// Always text, even on failure: errors are rendered with [`ERROR_MARKER`]
/// so the model can relay or retry them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub text: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            text: format!("{ERROR_MARKER} {message}"),
            is_error: true,
        }
    }
}

impl std::fmt::Display for ToolResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_results_carry_marker() {
        let result = ToolResult::error("missing required argument 'ciudad'");
        assert!(result.is_error);
        assert!(result.text.starts_with(ERROR_MARKER));
    }

    #[test]
    fn ok_results_are_verbatim() {
        let result = ToolResult::ok("Pronóstico para Madrid:");
        assert!(!result.is_error);
        assert_eq!(result.to_string(), "Pronóstico para Madrid:");
    }
}

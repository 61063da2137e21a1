use std::fmt;

/// The single active annotation tool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Pen,
    CheckMark,
    TextStamp(String),
}

impl Tool {
    pub fn text_stamp(text: impl AsRef<str>) -> Self {
        Tool::TextStamp(text.as_ref().trim().to_owned())
    }

    pub fn is_pen(&self) -> bool {
        matches!(self, Tool::Pen)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Pen => "pen",
            Tool::CheckMark => "check",
            Tool::TextStamp(_) => "text",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::TextStamp(text) => write!(f, "text \"{text}\""),
            other => f.write_str(other.label()),
        }
    }
}

/// Explicit session-wide state handed to the annotation engine.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub tool: Tool,
    pub current_page: usize,
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pen_is_the_initial_tool() {
        let state = SessionState::default();
        assert_eq!(state.tool, Tool::Pen);
        assert!(!state.ready);
    }

    #[test]
    fn custom_text_is_trimmed() {
        assert_eq!(Tool::text_stamp("  Kim  "), Tool::TextStamp("Kim".into()));
        assert_eq!(Tool::text_stamp("   "), Tool::TextStamp(String::new()));
        assert_eq!(Tool::text_stamp("Lee").to_string(), "text \"Lee\"");
    }
}

//! Prompt values and prompt formatting.
//!
//! A [`Prompt`] is one turn of caller input. The text actually sent to the
//! token source is an [`EffectivePrompt`] (prior turns plus the new prompt)
//! rendered through a [`PromptFormat`]. The generation loop is the same for
//! every format; only the rendering differs.

use serde::{Deserialize, Serialize};

/// One turn's input text. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prompt {
    text: String,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// The role of a turn in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Get the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A completed turn of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Prior conversation plus the caller's latest prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePrompt {
    pub history: Vec<Turn>,
    pub prompt: Prompt,
}

impl EffectivePrompt {
    /// A prompt with no prior conversation.
    pub fn standalone(prompt: Prompt) -> Self {
        Self {
            history: Vec::new(),
            prompt,
        }
    }

    pub fn render(&self, format: &dyn PromptFormat) -> String {
        format.render(&self.history, &self.prompt)
    }
}

/// Turns a conversation into the text handed to the token source.
pub trait PromptFormat: Send + Sync {
    fn render(&self, history: &[Turn], prompt: &Prompt) -> String;
}

/// Concatenates prior turns and the prompt, one per line.
///
/// With no history the prompt text is returned unchanged, which suits callers
/// that pre-format their prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormat;

impl PromptFormat for PlainFormat {
    fn render(&self, history: &[Turn], prompt: &Prompt) -> String {
        let mut rendered = String::new();
        for turn in history {
            rendered.push_str(&turn.text);
            rendered.push('\n');
        }
        rendered.push_str(prompt.as_str());
        rendered
    }
}

/// ChatML framing (`<|im_start|>role ... <|im_end|>`), ending with an open
/// assistant header so the model continues as the assistant.
#[derive(Debug, Clone, Default)]
pub struct ChatMlFormat {
    pub system_prompt: Option<String>,
}

impl ChatMlFormat {
    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
        }
    }

    fn push_turn(rendered: &mut String, role: Role, text: &str) {
        rendered.push_str("<|im_start|>");
        rendered.push_str(role.as_str());
        rendered.push('\n');
        rendered.push_str(text);
        rendered.push_str("<|im_end|>\n");
    }
}

impl PromptFormat for ChatMlFormat {
    fn render(&self, history: &[Turn], prompt: &Prompt) -> String {
        let mut rendered = String::new();
        if let Some(system) = &self.system_prompt {
            Self::push_turn(&mut rendered, Role::System, system);
        }
        for turn in history {
            Self::push_turn(&mut rendered, turn.role, &turn.text);
        }
        Self::push_turn(&mut rendered, Role::User, prompt.as_str());
        rendered.push_str("<|im_start|>assistant\n");
        rendered
    }
}

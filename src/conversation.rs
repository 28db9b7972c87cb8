// src/conversation.rs
//! Bounded conversation window fed into grounding prompts.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Turns kept when rendering (one turn = user + assistant message).
pub const MAX_TURNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Ordered messages, oldest first. Holds at most `2 * MAX_TURNS` messages;
/// older ones are dropped, never summarized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationWindow {
    messages: VecDeque<Message>,
}

impl ConversationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity() -> usize {
        MAX_TURNS * 2
    }

    /// Build from a full history, keeping only the most recent messages.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut w = Self::new();
        for m in messages {
            w.push(m.role, m.content);
        }
        w
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push_back(Message {
            role,
            content: content.into(),
        });
        while self.messages.len() > Self::capacity() {
            self.messages.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// `User: ...` / `Assistant: ...` lines.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{who}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

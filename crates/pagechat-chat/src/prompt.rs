//! Prompt assembly.
//!
//! A prompt is rendered in a fixed order: system framing, retrieved context,
//! conversation history, then the new question. Static text comes first so
//! consecutive turns of a session share the longest possible prefix.

use std::fmt::Write;

use pagechat_core::types::{ContextSnippet, Role, Turn};

const NO_CONTEXT: &str = "(no relevant passages were found in the document)";

/// The four parts of a generation prompt.
#[derive(Debug, Clone)]
pub struct Prompt<'a> {
    pub system: &'a str,
    pub context: &'a [ContextSnippet],
    pub history: &'a [Turn],
    pub question: &'a str,
}

impl<'a> Prompt<'a> {
    pub fn new(
        system: &'a str,
        context: &'a [ContextSnippet],
        history: &'a [Turn],
        question: &'a str,
    ) -> Self {
        Self {
            system,
            context,
            history,
            question,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(self.system.trim());
        out.push_str("\n\n## Context\n");
        if self.context.is_empty() {
            out.push_str(NO_CONTEXT);
            out.push('\n');
        }
        for (i, snippet) in self.context.iter().enumerate() {
            let _ = write!(out, "[{}]", i + 1);
            if let Some(title) = &snippet.title {
                let _ = write!(out, " {}", title);
            }
            if let Some(page) = snippet.page {
                let _ = write!(out, " (page {})", page);
            }
            let _ = writeln!(out, "\n{}", snippet.text.trim());
        }

        if !self.history.is_empty() {
            out.push_str("\n## Conversation so far\n");
            for turn in self.history {
                let speaker = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                let _ = writeln!(out, "{}: {}", speaker, turn.text.trim());
            }
        }

        let _ = write!(out, "\n## Question\n{}\n", self.question.trim());
        out
    }
}

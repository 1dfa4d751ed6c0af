pub mod controller;
pub mod heuristics;
pub mod prompt;
pub mod sentinel;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use controller::{
    CompletedConversation, ConversationController, ConversationError, FeedbackTarget,
    TurnOutcome, finalize_feedback,
};
pub use heuristics::{is_completion_phrase, is_short_answer};
pub use prompt::{FOLLOW_UP_SYSTEM_PROMPT, build_follow_up_prompt};
pub use sentinel::{COMPLETION_SENTINEL, FollowUpTurnResult, MalformedReply, decode_reply};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    fn now(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    Comprehensive,
    MaxReached,
    UserDone,
    Error,
}

impl TerminalReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::MaxReached => "max_reached",
            Self::UserDone => "user_done",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "comprehensive" => Some(Self::Comprehensive),
            "max_reached" => Some(Self::MaxReached),
            "user_done" => Some(Self::UserDone),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Acknowledgment shown to the reviewer once a thread ends. Never exposes
/// the underlying failure.
pub const fn completion_message(reason: TerminalReason) -> &'static str {
    match reason {
        TerminalReason::Comprehensive => {
            "Thank you! Your feedback was thorough and has been recorded."
        }
        TerminalReason::MaxReached => {
            "Thank you for taking the time to elaborate. Your feedback has been recorded."
        }
        TerminalReason::UserDone => "Thanks, we have recorded your feedback.",
        TerminalReason::Error => "Thank you! Your feedback has been saved.",
    }
}

/// One follow-up conversation about a single question.
///
/// Fields are private so the history can only grow and the budget can only
/// shrink; the controller produces updated copies rather than editing a
/// thread the caller still holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    primary_question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_summary: Option<String>,
    #[serde(default)]
    history: Vec<ConversationMessage>,
    remaining_follow_ups: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    terminal_reason: Option<TerminalReason>,
}

impl ConversationThread {
    pub fn new(
        primary_question: impl Into<String>,
        context_summary: Option<String>,
        max_follow_ups: u32,
    ) -> Self {
        Self {
            primary_question: primary_question.into(),
            context_summary: context_summary.filter(|summary| !summary.trim().is_empty()),
            history: Vec::new(),
            remaining_follow_ups: max_follow_ups,
            terminal_reason: None,
        }
    }

    pub fn primary_question(&self) -> &str {
        &self.primary_question
    }

    pub fn context_summary(&self) -> Option<&str> {
        self.context_summary.as_deref()
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    pub fn remaining_follow_ups(&self) -> u32 {
        self.remaining_follow_ups
    }

    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        self.terminal_reason
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_reason.is_some()
    }

    pub fn user_turns(&self) -> usize {
        self.count_role(MessageRole::User)
    }

    pub fn assistant_turns(&self) -> usize {
        self.count_role(MessageRole::Assistant)
    }

    /// Re-derives the budget for a thread that came back from an untrusted
    /// client: follow-ups already in the history count against
    /// `max_follow_ups`, so resending a fresh budget buys nothing.
    pub fn cap_follow_ups(&mut self, max_follow_ups: u32) {
        let spent = u32::try_from(self.assistant_turns()).unwrap_or(u32::MAX);
        self.remaining_follow_ups = self
            .remaining_follow_ups
            .min(max_follow_ups.saturating_sub(spent));
    }

    /// Length in characters `transcript()` would have once `answer` is
    /// recorded as the next user turn.
    pub fn transcript_chars_with(&self, answer: &str) -> usize {
        let answer_chars = answer.trim().chars().count();
        if self.history.is_empty() {
            return answer_chars;
        }
        // "\nA: " precedes every answer after the first.
        self.transcript().chars().count() + 4 + answer_chars
    }

    /// Answers joined in turn order, with follow-up questions interleaved.
    pub fn transcript(&self) -> String {
        let mut lines = Vec::with_capacity(self.history.len());
        for (index, message) in self.history.iter().enumerate() {
            let line = match (index, message.role) {
                (0, MessageRole::User) => message.content.clone(),
                (_, MessageRole::Assistant) => format!("Q: {}", message.content),
                (_, MessageRole::User) => format!("A: {}", message.content),
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    fn push_user(&mut self, content: &str) {
        self.history
            .push(ConversationMessage::now(MessageRole::User, content.trim()));
    }

    fn push_follow_up(&mut self, question: String) {
        self.history
            .push(ConversationMessage::now(MessageRole::Assistant, question));
        self.remaining_follow_ups = self.remaining_follow_ups.saturating_sub(1);
    }

    fn terminate(&mut self, reason: TerminalReason) {
        self.terminal_reason = Some(reason);
    }

    fn count_role(&self, role: MessageRole) -> usize {
        self.history
            .iter()
            .filter(|message| message.role == role)
            .count()
    }
}

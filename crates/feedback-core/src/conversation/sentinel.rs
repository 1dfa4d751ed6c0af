use thiserror::Error;

/// Wire-level token the model emits when no further follow-up is needed.
pub const COMPLETION_SENTINEL: &str = "CONVERSATION_COMPLETE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUpTurnResult {
    FollowUpQuestion(String),
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReply {
    #[error("model reply was empty")]
    Empty,
    #[error("model reply contains a mangled completion sentinel")]
    MangledSentinel,
}

/// Decodes one model reply.
///
/// The sentinel is matched case-insensitively anywhere in the reply, so a
/// model that wraps it in prose still ends the thread. A reply that is only
/// the sentinel spelled with other separators ("Conversation complete."),
/// or that ends on such a token ("Thanks! CONVERSATION-COMPLETE"), is
/// ambiguous and reported as malformed. Anything else, including questions
/// that merely use the words, is taken verbatim as the follow-up question.
pub fn decode_reply(reply: &str) -> Result<FollowUpTurnResult, MalformedReply> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(MalformedReply::Empty);
    }

    if contains_sentinel(trimmed) {
        return Ok(FollowUpTurnResult::Complete);
    }

    if is_mangled_sentinel(trimmed) {
        return Err(MalformedReply::MangledSentinel);
    }

    Ok(FollowUpTurnResult::FollowUpQuestion(trimmed.to_string()))
}

pub fn contains_sentinel(reply: &str) -> bool {
    reply.to_ascii_uppercase().contains(COMPLETION_SENTINEL)
}

fn is_mangled_sentinel(reply: &str) -> bool {
    let squeezed_sentinel = squeeze_alphanumeric(COMPLETION_SENTINEL);
    if squeeze_alphanumeric(reply) == squeezed_sentinel {
        return true;
    }

    reply
        .split_whitespace()
        .next_back()
        .is_some_and(|last_token| squeeze_alphanumeric(last_token) == squeezed_sentinel)
}

fn squeeze_alphanumeric(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

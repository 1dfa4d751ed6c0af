use std::fmt::Write as _;

use super::ConversationMessage;
use super::sentinel::COMPLETION_SENTINEL;

pub const FOLLOW_UP_SYSTEM_PROMPT: &str = "You help collect presentation feedback. You ask at most one short, specific follow-up question at a time, and you stop as soon as the reviewer's feedback is clear and complete.";

const NO_HISTORY_MARKER: &str = "No previous exchanges.";

/// Assembles the prompt for one follow-up turn.
///
/// `history` holds the exchanges before `user_response`; the latest
/// response is rendered in its own section.
pub fn build_follow_up_prompt(
    primary_question: &str,
    context_summary: Option<&str>,
    user_response: &str,
    history: &[ConversationMessage],
    remaining_follow_ups: u32,
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Original question: {primary_question}");
    if let Some(context_summary) = context_summary {
        let _ = writeln!(prompt, "\nBackground context: {context_summary}");
    }

    prompt.push_str("\nConversation so far:\n");
    if history.is_empty() {
        let _ = writeln!(prompt, "{NO_HISTORY_MARKER}");
    } else {
        for message in history {
            let _ = writeln!(prompt, "{}: {}", message.role.label(), message.content);
        }
    }

    let _ = writeln!(prompt, "\nReviewer's latest response: {user_response}");
    prompt.push('\n');
    prompt.push_str(&instruction_block(remaining_follow_ups));
    prompt
}

fn instruction_block(remaining_follow_ups: u32) -> String {
    if remaining_follow_ups == 0 {
        return format!(
            "Instructions:\nThe follow-up limit has been reached. Do not ask another question. Reply with only {COMPLETION_SENTINEL}."
        );
    }

    let plural = if remaining_follow_ups == 1 { "" } else { "s" };
    format!(
        "Instructions:\nYou may ask {remaining_follow_ups} more follow-up question{plural} in this conversation.\n\
         If the response is vague, very short, or leaves out why the reviewer feels that way, ask exactly one focused follow-up question that helps them elaborate. Reply with the question text only.\n\
         If the response is already thorough, reply with only {COMPLETION_SENTINEL}.\n\
         Use the remaining budget wisely: with fewer questions left, only ask when the answer would clearly add value."
    )
}

//! Caller-side signals applied before the state machine runs.

pub const DEFAULT_COMPLETION_PHRASES: &[&str] = &[
    "that's all",
    "thats all",
    "that is all",
    "nothing else",
    "nothing more",
    "i'm done",
    "im done",
    "i am done",
];

/// True when the reviewer signalled they have nothing more to add. The
/// match is on the whole answer (ignoring case, punctuation and repeated
/// whitespace) or on the answer ending with a phrase, so "No, that's all."
/// matches but "that's all I wanted to mention about slide two, the
/// colours were off" does not.
pub fn is_completion_phrase(answer: &str, phrases: &[String]) -> bool {
    let normalized = normalize(answer);
    if normalized.is_empty() {
        return false;
    }

    phrases
        .iter()
        .map(|phrase| normalize(phrase))
        .filter(|phrase| !phrase.is_empty())
        .any(|phrase| normalized == phrase || normalized.ends_with(&format!(" {phrase}")))
}

/// Short answers are more likely to merit a follow-up. Advisory only.
pub fn is_short_answer(answer: &str, threshold_chars: usize) -> bool {
    answer.trim().chars().count() < threshold_chars
}

fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .replace('\u{2019}', "'")
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '\'' {
                ch
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

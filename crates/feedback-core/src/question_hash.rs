use sha2::{Digest, Sha256};

pub const QUESTION_HASH_PREFIX: &str = "q_";
const QUESTION_HASH_DIGEST_BYTES: usize = 8;

/// Groups answers to the same question across sessions. Collisions are
/// tolerated; this is a grouping key, not a uniqueness guarantee.
pub fn hash_question(question: &str) -> String {
    let normalized = normalize_question(question);
    let digest = Sha256::digest(normalized.as_bytes());
    let hex = digest
        .iter()
        .take(QUESTION_HASH_DIGEST_BYTES)
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    format!("{QUESTION_HASH_PREFIX}{hex}")
}

pub fn is_question_hash(value: &str) -> bool {
    value
        .strip_prefix(QUESTION_HASH_PREFIX)
        .is_some_and(|hex| {
            hex.len() == QUESTION_HASH_DIGEST_BYTES * 2
                && hex.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
        })
}

fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

//! Key layout for the sled trees.
//!
//! Numeric ids are zero-padded to 20 digits so that lexicographic key order
//! matches numeric order, which lets prefix scans return rows by creation.

pub fn id_key(id: u64) -> String {
    format!("{:020}", id)
}

pub fn parse_id_key(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

pub fn quiz_key(quiz_id: u64) -> String {
    id_key(quiz_id)
}

pub fn slot_key(slot_id: u64) -> String {
    id_key(slot_id)
}

pub fn slots_by_quiz_key(quiz_id: u64, slot_id: u64) -> String {
    format!("{:020}:{:020}", quiz_id, slot_id)
}

pub fn slots_by_quiz_prefix(quiz_id: u64) -> String {
    format!("{:020}:", quiz_id)
}

pub fn slot_binding_key(quiz_id: u64, question_id: &str) -> String {
    format!("{:020}:{}", quiz_id, question_id)
}

pub fn question_rating_key(slot_id: u64, rating_id: u64) -> String {
    format!("{:020}:{:020}", slot_id, rating_id)
}

pub fn question_rating_prefix(slot_id: u64) -> String {
    format!("{:020}:", slot_id)
}

pub fn quiz_user_key(user_id: u64) -> String {
    id_key(user_id)
}

pub fn quiz_user_account_key(quiz_id: u64, account_id: &str) -> String {
    format!("{:020}:{}", quiz_id, account_id)
}

pub fn quiz_user_account_prefix(quiz_id: u64) -> String {
    format!("{:020}:", quiz_id)
}

pub fn user_rating_key(user_id: u64, rating_id: u64) -> String {
    format!("{:020}:{:020}", user_id, rating_id)
}

pub fn user_rating_prefix(user_id: u64) -> String {
    format!("{:020}:", user_id)
}

pub fn attempt_key(attempt_id: u64) -> String {
    id_key(attempt_id)
}

pub fn attempts_by_user_key(user_id: u64, attempt_id: u64) -> String {
    format!("{:020}:{:020}", user_id, attempt_id)
}

pub fn attempts_by_user_prefix(user_id: u64) -> String {
    format!("{:020}:", user_id)
}

pub fn attempts_by_slot_key(slot_id: u64, attempt_id: u64) -> String {
    format!("{:020}:{:020}", slot_id, attempt_id)
}

pub fn attempts_by_slot_prefix(slot_id: u64) -> String {
    format!("{:020}:", slot_id)
}

pub fn active_attempt_key(user_id: u64) -> String {
    id_key(user_id)
}

pub fn grading_session_key(session_id: &str) -> String {
    session_id.to_string()
}

pub fn answer_key_key(question_id: &str) -> String {
    question_id.to_string()
}

pub fn grade_key(quiz_id: u64, account_id: &str) -> String {
    format!("{:020}:{}", quiz_id, account_id)
}

/// Returns the trailing id of a `{prefix}:{id}` index key.
pub fn trailing_id(raw: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(raw).ok()?;
    text.rsplit(':').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_keys_sort_numerically() {
        assert!(id_key(9) < id_key(10));
        assert!(attempts_by_user_key(1, 99) < attempts_by_user_key(1, 100));
    }

    #[test]
    fn trailing_id_reads_last_segment() {
        let key = slots_by_quiz_key(3, 42);
        assert_eq!(trailing_id(key.as_bytes()), Some(42));
        assert_eq!(parse_id_key(id_key(7).as_bytes()), Some(7));
    }

    #[test]
    fn prefixes_do_not_overlap_between_owners() {
        let k = user_rating_key(12, 1);
        assert!(k.starts_with(&user_rating_prefix(12)));
        assert!(!k.starts_with(&user_rating_prefix(1)));
    }
}

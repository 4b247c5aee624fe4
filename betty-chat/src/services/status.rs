//! Typing indicator phrases shown while a reply is pending.

const DOCUMENT_PHRASES: &[&str] = &[
    "Drafting your document...",
    "Structuring the sections...",
    "Polishing the wording...",
];

const PLANNING_PHRASES: &[&str] = &[
    "Looking at your schedule...",
    "Organizing your priorities...",
    "Building your plan...",
];

const HELP_PHRASES: &[&str] = &[
    "Thinking this through...",
    "Finding the best way to help...",
];

const DEFAULT_PHRASES: &[&str] = &[
    "Betty is thinking...",
    "Working on it...",
    "Almost there...",
];

/// Pick a phrase set from keywords in the outgoing text.
pub fn phrases_for(text: &str) -> &'static [&'static str] {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["create", "draft", "write", "document", "nda", "contract"]) {
        DOCUMENT_PHRASES
    } else if has(&["plan", "schedule", "calendar", "task", "meeting"]) {
        PLANNING_PHRASES
    } else if has(&["help", "how do", "explain"]) {
        HELP_PHRASES
    } else {
        DEFAULT_PHRASES
    }
}

/// Round-robin selection; `tick` is advanced by the caller's timer.
pub fn phrase_at(phrases: &'static [&'static str], tick: usize) -> &'static str {
    if phrases.is_empty() {
        return DEFAULT_PHRASES[0];
    }
    phrases[tick % phrases.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_selection() {
        assert_eq!(phrases_for("Please CREATE an NDA"), DOCUMENT_PHRASES);
        assert_eq!(phrases_for("Help me plan my day"), PLANNING_PHRASES);
        assert_eq!(phrases_for("can you help?"), HELP_PHRASES);
        assert_eq!(phrases_for("hello"), DEFAULT_PHRASES);
    }

    #[test]
    fn test_round_robin_wraps() {
        let phrases = phrases_for("hello");
        assert_eq!(phrase_at(phrases, 0), phrases[0]);
        assert_eq!(phrase_at(phrases, phrases.len()), phrases[0]);
        assert_eq!(phrase_at(phrases, 4), phrases[1]);
        assert_eq!(phrase_at(&[], 3), DEFAULT_PHRASES[0]);
    }
}

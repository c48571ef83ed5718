//! Echo/noise filters shared conceptually with C2's acoustic filter (spec
//! §4.4f), plus final-transcript corruption recovery (§4.4e).

const MAX_SAME_TOKEN_OCCURRENCES: usize = 3;
const MIN_VALID_LENGTH: usize = 2;

/// Pure onomatopoeia regex family from spec §4.4f, hand-matched instead of
/// pulled in via a regex crate since the set is small and fixed.
fn is_onomatopoeia(text: &str) -> bool {
    let normalized: String = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    const FAMILIES: &[(&str, char)] = &[
        ("h", 'm'),
        ("hum", 'm'),
        ("uhum", 'm'),
        ("ah", 'h'),
        ("eh", 'h'),
        ("oh", 'h'),
        ("uh", 'h'),
    ];
    FAMILIES.iter().any(|(prefix, repeat_char)| {
        normalized.starts_with(prefix)
            && normalized[prefix.len()..].chars().all(|c| c == *repeat_char)
    }) || normalized.chars().all(|c| c == 'h' || c == 'm' || c == 'u')
}

fn is_exact_substring_of_recent_reply<'a>(text: &str, recent_replies: impl Iterator<Item = &'a str>) -> bool {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    recent_replies.map(|r| r.to_lowercase()).any(|reply| reply.contains(&needle))
}

fn has_three_or_more_consecutive_identical_tokens(text: &str) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.windows(3).any(|w| w[0].eq_ignore_ascii_case(w[1]) && w[1].eq_ignore_ascii_case(w[2]))
}

fn exceeds_same_token_occurrences(text: &str) -> bool {
    use std::collections::HashMap;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in text.split_whitespace() {
        let lower = token.to_lowercase();
        *counts.entry(lower).or_insert(0) += 1;
    }
    counts.values().any(|&n| n > MAX_SAME_TOKEN_OCCURRENCES)
}

/// `true` when `text` should be dropped outright rather than treated as a
/// user turn (spec §4.4f).
pub fn is_noise<'a>(text: &str, recent_agent_replies: impl Iterator<Item = &'a str>) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_VALID_LENGTH {
        return true;
    }
    is_onomatopoeia(trimmed)
        || is_exact_substring_of_recent_reply(trimmed, recent_agent_replies)
        || has_three_or_more_consecutive_identical_tokens(trimmed)
        || exceeds_same_token_occurrences(trimmed)
}

/// `true` when a final transcript that passed length checks still looks
/// corrupted (repeated onomatopoeia, or an exact echo of the last agent
/// reply) and should be replaced with a partial captured during playback.
pub fn looks_corrupted<'a>(text: &str, recent_agent_replies: impl Iterator<Item = &'a str>) -> bool {
    let trimmed = text.trim();
    is_onomatopoeia(trimmed) || is_exact_substring_of_recent_reply(trimmed, recent_agent_replies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_noise() {
        assert!(is_noise("a", std::iter::empty()));
    }

    #[test]
    fn onomatopoeia_variants_are_noise() {
        for text in ["hmm", "uhum", "ahhh", "ehh", "ohhhh"] {
            assert!(is_noise(text, std::iter::empty()), "{text} should be noise");
        }
    }

    #[test]
    fn exact_substring_of_recent_reply_is_noise() {
        let replies = vec!["Claro, posso te ajudar com isso.".to_string()];
        assert!(is_noise("posso te ajudar", replies.iter().map(String::as_str)));
    }

    #[test]
    fn repeated_tokens_are_noise() {
        assert!(is_noise("não não não", std::iter::empty()));
    }

    #[test]
    fn excessive_single_token_repetition_is_noise() {
        assert!(is_noise("oi oi oi oi tudo bem", std::iter::empty()));
    }

    #[test]
    fn genuine_sentence_is_not_noise() {
        assert!(!is_noise("Tenho uma loja de cosméticos.", std::iter::empty()));
    }

    #[test]
    fn corruption_check_flags_echoed_agent_reply() {
        let replies = vec!["Legal, esse mercado tem muito potencial.".to_string()];
        assert!(looks_corrupted("esse mercado tem muito potencial", replies.iter().map(String::as_str)));
    }
}

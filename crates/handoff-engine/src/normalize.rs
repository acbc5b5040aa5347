//! Value truncation and normalization used for consensus comparison

/// Appended to values cut at the token cap.
pub const ELLIPSIS: &str = " ...";

/// Whole-token synonyms applied during normalization.
const SYNONYMS: &[(&str, &str)] = &[
    ("spo2", "sats"),
    ("o2", "sats"),
    ("oxygen", "sats"),
    ("bp", "blood pressure"),
];

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max_tokens` whitespace tokens, marking the cut with ` ...`.
pub fn truncate_tokens(value: &str, max_tokens: usize) -> String {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.len() <= max_tokens {
        return tokens.join(" ");
    }
    let mut kept = tokens[..max_tokens].join(" ");
    kept.push_str(ELLIPSIS);
    kept
}

/// Comparison form of a value.
///
/// Lowercase, `%` removed, `/` and `,` split tokens, synonyms mapped per
/// token, then adjacent duplicate tokens collapsed so "O2 sats 72%" and
/// "SpO2 72%" compare equal.
pub fn normalize_value(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '%')
        .map(|c| if c == '/' || c == ',' { ' ' } else { c })
        .collect();

    let mut out: Vec<&str> = Vec::new();
    for token in cleaned.split_whitespace() {
        let mapped = SYNONYMS
            .iter()
            .find(|(from, _)| *from == token)
            .map(|(_, to)| *to)
            .unwrap_or(token);
        for part in mapped.split(' ') {
            if out.last() != Some(&part) {
                out.push(part);
            }
        }
    }
    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_marks_cut() {
        assert_eq!(truncate_tokens("a b c", 3), "a b c");
        assert_eq!(truncate_tokens("a b c d", 3), "a b c ...");
        assert_eq!(truncate_tokens("  a   b ", 12), "a b");
    }

    #[test]
    fn synonyms_converge() {
        assert_eq!(normalize_value("O2 sats 72%"), "sats 72");
        assert_eq!(normalize_value("SpO2 72%"), "sats 72");
        assert_eq!(normalize_value("oxygen 95%"), "sats 95");
    }

    #[test]
    fn separators_split_tokens() {
        assert_eq!(normalize_value("BP 80/40"), "blood pressure 80 40");
        assert_eq!(normalize_value("pale,  clammy"), "pale clammy");
    }

    #[test]
    fn synonyms_only_match_whole_tokens() {
        assert_eq!(normalize_value("bpm 120"), "bpm 120");
        assert_eq!(normalize_value("co2 40"), "co2 40");
    }

    #[test]
    fn ellipsis_survives_normalization() {
        assert_eq!(normalize_value(&truncate_tokens("a b c d", 2)), "a b ...");
    }
}

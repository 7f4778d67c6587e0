//! Token estimation for usage accounting

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

/// Estimate token count for a text
///
/// Uses the cl100k_base encoding when available and a chars/4 heuristic
/// otherwise. Counts feed usage accounting, not billing-grade metering,
/// so the heuristic is an acceptable floor.
pub fn estimate_tokens(text: &str) -> usize {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

    if text.is_empty() {
        return 0;
    }

    let bpe = BPE.get_or_init(|| tiktoken_rs::cl100k_base().ok());
    bpe.as_ref().map_or_else(
        || (text.chars().count() / 4).max(1),
        |bpe| bpe.encode_with_special_tokens(text).len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn nonempty_text_is_at_least_one_token() {
        assert!(estimate_tokens("a") >= 1);
    }

    #[test]
    fn longer_text_estimates_more_tokens() {
        let short = estimate_tokens("hello world");
        let long = estimate_tokens(&"hello world ".repeat(50));
        assert!(long > short);
    }
}

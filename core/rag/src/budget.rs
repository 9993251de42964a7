//! Context budgeting for LLM calls.
//!
//! Counts tokens with the tokenizer matching the configured model and
//! drops the lowest-ranked context documents until the whole prompt fits
//! within the model's context window, leaving room for the output.

use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};

/// Characters per token approximation used when no tokenizer is available.
const CHARS_PER_TOKEN: usize = 4;

/// Tokens reserved for prompt formatting around the raw pieces.
const FORMATTING_OVERHEAD: usize = 50;

/// Token counter and context selector.
pub struct TokenBudgeter {
    encoding: Option<CoreBPE>,
    max_context_tokens: usize,
    reserve_output_tokens: usize,
}

impl TokenBudgeter {
    /// Create a budgeter for the given model.
    ///
    /// Unknown models fall back to the cl100k_base encoding, and to a
    /// chars/4 approximation if no encoding can be constructed at all.
    pub fn new(model_name: &str, max_context_tokens: usize, reserve_output_tokens: usize) -> Self {
        let encoding = get_bpe_from_model(model_name)
            .or_else(|_| cl100k_base())
            .ok();

        if encoding.is_none() {
            tracing::warn!(
                model = model_name,
                "no tokenizer available, using character approximation"
            );
        }

        Self {
            encoding,
            max_context_tokens,
            reserve_output_tokens,
        }
    }

    /// Count tokens in a text.
    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        match &self.encoding {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.len() / CHARS_PER_TOKEN,
        }
    }

    /// Select the context documents that fit the budget.
    ///
    /// Documents are expected in descending relevance order; selection is
    /// greedy and preserves that order, skipping documents that do not
    /// fit and still trying smaller ones after. Returns the selected
    /// indices and whether anything was dropped.
    pub fn select_context(
        &self,
        system_prompt: &str,
        query: &str,
        docs: &[&str],
        history: &[String],
    ) -> (Vec<usize>, bool) {
        if docs.is_empty() {
            return (vec![], false);
        }

        let fixed = self.count_tokens(system_prompt)
            + self.count_tokens(query)
            + history.iter().map(|h| self.count_tokens(h)).sum::<usize>()
            + self.reserve_output_tokens
            + FORMATTING_OVERHEAD;

        let available = self.max_context_tokens.saturating_sub(fixed);
        if available == 0 {
            tracing::warn!(
                fixed_tokens = fixed,
                "no tokens available for context after prompt, query and history"
            );
            return (vec![], true);
        }

        let mut selected = Vec::new();
        let mut used = 0;
        let mut truncated = false;

        for (index, doc) in docs.iter().enumerate() {
            let tokens = self.count_tokens(doc);
            if used + tokens <= available {
                selected.push(index);
                used += tokens;
            } else {
                truncated = true;
            }
        }

        if truncated {
            tracing::warn!(
                original = docs.len(),
                selected = selected.len(),
                used_tokens = used,
                available_tokens = available,
                "context truncated to fit the token budget"
            );
        }

        (selected, truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approximate_budgeter(max: usize, reserve: usize) -> TokenBudgeter {
        TokenBudgeter {
            encoding: None,
            max_context_tokens: max,
            reserve_output_tokens: reserve,
        }
    }

    #[test]
    fn test_count_tokens_empty() {
        let budgeter = approximate_budgeter(1000, 100);
        assert_eq!(budgeter.count_tokens(""), 0);
    }

    #[test]
    fn test_count_tokens_approximation() {
        let budgeter = approximate_budgeter(1000, 100);
        // 12 chars / 4 per token
        assert_eq!(budgeter.count_tokens("abcdabcdabcd"), 3);
    }

    #[test]
    fn test_all_docs_fit() {
        let budgeter = approximate_budgeter(1000, 100);
        let docs = ["short one", "short two"];
        let (selected, truncated) = budgeter.select_context("sys", "query", &docs, &[]);

        assert_eq!(selected, vec![0, 1]);
        assert!(!truncated);
    }

    #[test]
    fn test_tail_dropped_when_over_budget() {
        // fixed = 0 + 0 + reserve(10) + overhead(50) = 60; available = 15.
        let budgeter = approximate_budgeter(75, 10);
        let big = "x".repeat(40); // 10 tokens
        let bigger = "y".repeat(48); // 12 tokens
        let docs = [big.as_str(), bigger.as_str()];

        let (selected, truncated) = budgeter.select_context("", "", &docs, &[]);
        assert_eq!(selected, vec![0]);
        assert!(truncated);
    }

    #[test]
    fn test_smaller_doc_still_tried_after_skip() {
        let budgeter = approximate_budgeter(75, 10); // available = 15
        let huge = "x".repeat(100); // 25 tokens, skipped
        let small = "y".repeat(40); // 10 tokens, fits
        let docs = [huge.as_str(), small.as_str()];

        let (selected, truncated) = budgeter.select_context("", "", &docs, &[]);
        assert_eq!(selected, vec![1]);
        assert!(truncated);
    }

    #[test]
    fn test_no_budget_at_all() {
        let budgeter = approximate_budgeter(40, 10); // fixed alone exceeds max
        let docs = ["anything"];
        let (selected, truncated) = budgeter.select_context("", "", &docs, &[]);

        assert!(selected.is_empty());
        assert!(truncated);
    }

    #[test]
    fn test_history_counts_against_budget() {
        let budgeter = approximate_budgeter(100, 10); // available without history = 40
        let doc = "z".repeat(120); // 30 tokens
        let docs = [doc.as_str()];

        let (selected, _) = budgeter.select_context("", "", &docs, &[]);
        assert_eq!(selected, vec![0]);

        let history = vec!["h".repeat(80)]; // 20 tokens, available drops to 20
        let (selected, truncated) = budgeter.select_context("", "", &docs, &history);
        assert!(selected.is_empty());
        assert!(truncated);
    }

    #[test]
    fn test_real_tokenizer_when_available() {
        let budgeter = TokenBudgeter::new("gpt-4", 8192, 1024);
        let count = budgeter.count_tokens("Hello world");
        assert!(count >= 1);
    }
}

use std::cmp::Ordering;

use ensemble_llm::ProviderResponse;

/// Ranks responses produced for the same prompt. Implementations must be
/// deterministic: the same input always yields the same order.
pub trait ResponseScorer: Send + Sync {
    /// Indices into `responses`, best first.
    fn rank(&self, responses: &[ProviderResponse]) -> Vec<usize>;

    fn select_best(&self, responses: &[ProviderResponse]) -> Option<ProviderResponse> {
        self.rank(responses)
            .first()
            .and_then(|&i| responses.get(i))
            .cloned()
    }
}

/// Prefers non-empty answers, then longer answers, then cheaper ones (fewer
/// total tokens). Remaining ties go to the earlier-registered provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScorer;

impl DefaultScorer {
    fn compare(a: &ProviderResponse, b: &ProviderResponse) -> Ordering {
        let a_text = a.text().trim();
        let b_text = b.text().trim();
        a_text
            .is_empty()
            .cmp(&b_text.is_empty())
            .then_with(|| b_text.chars().count().cmp(&a_text.chars().count()))
            .then_with(|| {
                a.response
                    .usage
                    .total_tokens
                    .cmp(&b.response.usage.total_tokens)
            })
            .then_with(|| a.registration_index.cmp(&b.registration_index))
    }
}

impl ResponseScorer for DefaultScorer {
    fn rank(&self, responses: &[ProviderResponse]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..responses.len()).collect();
        // Stable sort keeps input order as the final tie-breaker.
        order.sort_by(|&a, &b| Self::compare(&responses[a], &responses[b]));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_llm::{LlmResponse, Usage};

    fn response(provider: &str, index: usize, text: &str, tokens: u64) -> ProviderResponse {
        ProviderResponse {
            provider: provider.into(),
            registration_index: index,
            response: LlmResponse::new(text, "m").with_usage(Usage::new(0, tokens)),
        }
    }

    #[test]
    fn longer_answer_wins() {
        let responses = vec![
            response("a", 0, "short", 5),
            response("b", 1, "a much longer answer", 5),
        ];
        let best = DefaultScorer.select_best(&responses).unwrap();
        assert_eq!(best.provider, "b");
    }

    #[test]
    fn empty_answer_ranks_last() {
        let responses = vec![
            response("a", 0, "   ", 1),
            response("b", 1, "x", 100),
        ];
        assert_eq!(DefaultScorer.rank(&responses), vec![1, 0]);
    }

    #[test]
    fn fewer_tokens_break_length_ties() {
        let responses = vec![
            response("a", 0, "same", 50),
            response("b", 1, "same", 10),
        ];
        assert_eq!(DefaultScorer.select_best(&responses).unwrap().provider, "b");
    }

    #[test]
    fn registration_order_breaks_full_ties() {
        let responses = vec![
            response("late", 3, "same", 10),
            response("early", 1, "same", 10),
        ];
        assert_eq!(
            DefaultScorer.select_best(&responses).unwrap().provider,
            "early"
        );
    }

    #[test]
    fn ranking_is_deterministic() {
        let responses = vec![
            response("a", 0, "one", 3),
            response("b", 1, "three", 3),
            response("c", 2, "two", 3),
            response("d", 3, "", 0),
        ];
        let first = DefaultScorer.rank(&responses);
        for _ in 0..10 {
            assert_eq!(DefaultScorer.rank(&responses), first);
        }
        assert_eq!(first, vec![1, 0, 2, 3]);
    }

    #[test]
    fn empty_input_has_no_best() {
        assert!(DefaultScorer.select_best(&[]).is_none());
        assert!(DefaultScorer.rank(&[]).is_empty());
    }
}

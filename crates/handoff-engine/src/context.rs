//! Bounded context of recent utterances for constrained downstream consumers

use std::collections::VecDeque;

use crate::consensus::ConsensusStore;

/// Inputs rendered ahead of the compact summary.
const RENDERED_INPUTS: usize = 3;

pub struct ContextWindow {
    max_tokens: usize,
    inputs: VecDeque<String>,
}

impl ContextWindow {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            inputs: VecDeque::new(),
        }
    }

    pub fn estimate_tokens(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Append an input, then drop the oldest until the budget holds.
    pub fn add_input(&mut self, text: impl Into<String>, store: &ConsensusStore) {
        self.inputs.push_back(text.into());
        let record_tokens = Self::record_tokens(store);
        let before = self.inputs.len();
        while !self.inputs.is_empty() && self.input_tokens() + record_tokens > self.max_tokens {
            self.inputs.pop_front();
        }
        if self.inputs.len() < before {
            tracing::debug!(
                "Pruned context: {} inputs, ~{} tokens",
                self.inputs.len(),
                self.input_tokens() + record_tokens
            );
        }
    }

    /// Tokens held by kept inputs plus the current record values.
    pub fn token_count(&self, store: &ConsensusStore) -> usize {
        self.input_tokens() + Self::record_tokens(store)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Last few inputs, one per line, followed by the compact record summary.
    pub fn render(&self, store: &ConsensusStore) -> String {
        let skip = self.inputs.len().saturating_sub(RENDERED_INPUTS);
        let mut lines: Vec<&str> = self.inputs.iter().skip(skip).map(|s| s.as_str()).collect();
        let summary = store.serialize_for_downstream();
        lines.push(&summary);
        lines.join("\n")
    }

    fn input_tokens(&self) -> usize {
        self.inputs.iter().map(|s| Self::estimate_tokens(s)).sum()
    }

    fn record_tokens(store: &ConsensusStore) -> usize {
        store
            .record()
            .entries()
            .map(|(_, v)| v.map(Self::estimate_tokens).unwrap_or(0))
            .sum()
    }
}

//! Rolling conversation window and end-of-turn truncation.

use crate::tokenizer::Tokenizer;

/// Alternating user/system utterances, windowed to the most recent
/// `2 * max_history + 1` entries. Entries falling out of the window are
/// discarded, not archived.
pub struct History {
    turns: Vec<String>,
    max_history: usize,
}

impl History {
    pub fn new(max_history: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_history,
        }
    }

    pub fn push(&mut self, utterance: impl Into<String>) {
        self.turns.push(utterance.into());
    }

    /// Drop everything but the window; called after each completed exchange.
    pub fn truncate(&mut self) {
        let window = 2 * self.max_history + 1;
        if self.turns.len() > window {
            self.turns.drain(..self.turns.len() - window);
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[String] {
        &self.turns
    }

    /// Encode every windowed utterance, terminating each with the tokenizer's
    /// end-of-turn sentinel, concatenated into one context sequence.
    pub fn context_tokens(&self, tokenizer: &dyn Tokenizer) -> Vec<usize> {
        let mut tokens = Vec::new();
        for turn in &self.turns {
            tokens.extend(tokenizer.encode(turn));
            tokens.push(tokenizer.eos_id());
        }
        tokens
    }
}

/// Truncate a generated sequence at the first end-of-turn sentinel, dropping
/// any occurrences of the configured remove ids along the way.
pub fn cut_to_eos(tokens: &[usize], eos: usize, remove: &[usize]) -> Vec<usize> {
    let mut out = Vec::new();
    for &t in tokens {
        if remove.contains(&t) {
            continue;
        }
        if t == eos {
            break;
        }
        out.push(t);
    }
    out
}

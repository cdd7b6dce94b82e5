//! Text/token boundary. The decoding core only ever sees token ids; encoding,
//! decoding and character cleanup live out here.

use std::collections::HashMap;

/// External collaborator turning text into token ids and back.
pub trait Tokenizer {
    fn encode(&self, text: &str) -> Vec<usize>;
    fn decode(&self, tokens: &[usize]) -> String;
    /// The end-of-turn sentinel appended after every encoded utterance.
    fn eos_id(&self) -> usize;
    fn vocab_size(&self) -> usize;
}

/// A simple tokenizer that maps words to indices for demo purposes.
/// In production, this would use a proper BPE tokenizer.
pub struct WordTokenizer {
    vocab: Vec<String>,
    word_to_id: HashMap<String, usize>,
}

pub const PAD_ID: usize = 0;
pub const UNK_ID: usize = 1;
pub const EOS_ID: usize = 2;

impl WordTokenizer {
    pub fn new() -> Self {
        // Small demo vocabulary with common words.
        let vocab = vec![
            "<pad>", "<unk>", "<eos>", "hello", "world", "how", "are", "you", "i", "am", "fine",
            "what", "is", "your", "name", "my", "assistant", "help", "can", "please", "thank",
            "yes", "no", "the", "and", "a", "to", "of", "in", "that", "have", "it", "for", "not",
            "on", "with", "he", "as", "his", "they", "be", "at", "this", "from", "or", "had",
            "good", "great", "nice", "bad", "ok", "sure", "maybe", "think", "know", "see",
        ];

        let word_to_id = vocab
            .iter()
            .enumerate()
            .map(|(i, word)| (word.to_string(), i))
            .collect();

        Self {
            vocab: vocab.into_iter().map(String::from).collect(),
            word_to_id,
        }
    }
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Vec<usize> {
        text.to_lowercase()
            .split_whitespace()
            .map(|word| self.word_to_id.get(word).copied().unwrap_or(UNK_ID))
            .collect()
    }

    fn decode(&self, tokens: &[usize]) -> String {
        tokens
            .iter()
            .filter_map(|&id| self.vocab.get(id))
            .filter(|word| !word.starts_with('<'))
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn eos_id(&self) -> usize {
        EOS_ID
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_maps_known_words() {
        let tok = WordTokenizer::new();
        assert_eq!(tok.encode("hello world"), vec![3, 4]);
    }

    #[test]
    fn encode_falls_back_to_unk() {
        let tok = WordTokenizer::new();
        assert_eq!(tok.encode("hello xyzzy"), vec![3, UNK_ID]);
    }

    #[test]
    fn decode_skips_structural_tokens() {
        let tok = WordTokenizer::new();
        assert_eq!(tok.decode(&[3, EOS_ID, 4, PAD_ID]), "hello world");
    }

    #[test]
    fn decode_ignores_out_of_range_ids() {
        let tok = WordTokenizer::new();
        assert_eq!(tok.decode(&[3, 9999]), "hello");
    }
}

use std::collections::HashSet;
use crate::analysis::tokenizer::Token;

pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;
}

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .map(|mut token| {
                token.text = token.text.to_lowercase();
                token
            })
            .collect()
    }
}

/// Drops words shorter than `min_chars`.
pub struct MinLengthFilter {
    pub min_chars: usize,
}

impl TokenFilter for MinLengthFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .filter(|token| token.text.chars().count() >= self.min_chars)
            .collect()
    }
}

pub struct StopWordFilter {
    pub stop_words: HashSet<String>,
}

impl StopWordFilter {
    pub fn new(stop_words: Vec<String>) -> Self {
        StopWordFilter {
            stop_words: stop_words.into_iter().collect(),
        }
    }

    pub fn english() -> Self {
        let words = vec![
            "an", "and", "are", "as", "at", "be", "by", "for",
            "from", "has", "in", "is", "it", "its", "of", "on",
            "that", "the", "to", "was", "will", "with"
        ].into_iter().map(String::from).collect();

        StopWordFilter::new(words)
    }
}

impl TokenFilter for StopWordFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .filter(|token| !self.stop_words.contains(&token.text))
            .collect()
    }
}

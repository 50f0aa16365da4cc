use unicode_segmentation::UnicodeSegmentation;

/// A word produced by a tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
}

impl Token {
    pub fn new(text: String) -> Self {
        Token { text }
    }
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;
}

/// Splits on Unicode word boundaries.
#[derive(Clone)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            max_token_length: 255,
        }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        text.unicode_words()
            .filter(|word| word.len() <= self.max_token_length)
            .map(|word| Token::new(word.to_string()))
            .collect()
    }
}

use std::collections::BTreeSet;
use std::sync::OnceLock;
use crate::analysis::filters::{LowercaseFilter, MinLengthFilter, StopWordFilter, TokenFilter};
use crate::analysis::tokenizer::{StandardTokenizer, Token, Tokenizer};

/// Tokenizer followed by a chain of filters.
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
}

impl Analyzer {
    pub fn new(tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            tokenizer,
            filters: Vec::new(),
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);

        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }

        tokens
    }

    /// Distinct words of `text`, in index order.
    pub fn words(&self, text: &str) -> BTreeSet<String> {
        self.analyze(text).into_iter().map(|token| token.text).collect()
    }

    /// Pipeline used by text indexes, both when indexing and when searching.
    pub fn text_index() -> &'static Analyzer {
        static TEXT_INDEX: OnceLock<Analyzer> = OnceLock::new();
        TEXT_INDEX.get_or_init(|| {
            Analyzer::new(Box::new(StandardTokenizer::default()))
                .add_filter(Box::new(LowercaseFilter))
                .add_filter(Box::new(MinLengthFilter { min_chars: 2 }))
                .add_filter(Box::new(StopWordFilter::english()))
        })
    }
}

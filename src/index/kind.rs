use std::borrow::Cow;
use serde::{Serialize, Deserialize};
use crate::analysis::analyzer::Analyzer;
use crate::core::types::FieldValue;
use crate::index::value::{IndexKey, IndexValue};
use crate::query::criteria::Criterion;
use crate::query::operator::Operator;

/// Upper sentinel for prefix ranges over text keys.
const PREFIX_END: char = '\u{10FFFF}';

/// Closed set of index kinds. Chosen from the schema when an index is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Exact match on a single scalar.
    Field,
    /// Trimmed, lowercased string.
    Keyword,
    /// Analyzed into words; multi-valued.
    Text,
    /// Multi-valued list of scalars.
    List,
    /// Single date, meant for range searches.
    Date,
}

impl IndexKind {
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, IndexKind::Text | IndexKind::List)
    }

    /// Turn an extracted attribute value into the value to store. `None` means
    /// the object has nothing to index.
    pub fn to_index_value(&self, raw: Option<&FieldValue>) -> Option<IndexValue> {
        let raw = raw?;
        match self {
            IndexKind::Field | IndexKind::Date => match raw {
                FieldValue::List(items) => Self::multiple(items.iter().filter_map(IndexKey::from_field).collect()),
                FieldValue::Text(s) if s.is_empty() => None,
                scalar => IndexKey::from_field(scalar).map(IndexValue::Single),
            },
            IndexKind::Keyword => match raw {
                FieldValue::List(items) => Self::multiple(
                    items.iter().filter_map(IndexKey::from_field).filter_map(Self::keyword).collect(),
                ),
                scalar => IndexKey::from_field(scalar).and_then(Self::keyword).map(IndexValue::Single),
            },
            IndexKind::Text => {
                let mut words = Vec::new();
                Self::collect_words(raw, &mut words);
                Self::multiple(words)
            }
            IndexKind::List => match raw {
                FieldValue::List(items) => Self::multiple(items.iter().filter_map(IndexKey::from_field).collect()),
                scalar => Self::multiple(IndexKey::from_field(scalar).into_iter().collect()),
            },
        }
    }

    /// Bring a search criterion into the key space of this kind of index.
    pub fn prepare_search<'a>(&self, criterion: &'a Criterion) -> Cow<'a, Criterion> {
        match self {
            IndexKind::Keyword => Cow::Owned(criterion.map_keys(|key| {
                Self::keyword(key.clone()).unwrap_or_else(|| key.clone())
            })),
            IndexKind::Text => Cow::Owned(Self::prepare_text_search(criterion)),
            _ => Cow::Borrowed(criterion),
        }
    }

    fn prepare_text_search(criterion: &Criterion) -> Criterion {
        match criterion {
            Criterion::Value(IndexKey::Text(query)) => {
                let trimmed = query.trim();
                if let Some(prefix) = trimmed.strip_suffix('*') {
                    let words: Vec<String> = Analyzer::text_index().words(prefix).into_iter().collect();
                    if words.len() == 1 {
                        let lower = words[0].clone();
                        let mut upper = lower.clone();
                        upper.push(PREFIX_END);
                        return Criterion::Op(Operator::In {
                            lower: Some(IndexKey::Text(lower)),
                            upper: Some(IndexKey::Text(upper)),
                        });
                    }
                }
                let words: Vec<IndexKey> = Analyzer::text_index()
                    .words(trimmed)
                    .into_iter()
                    .map(IndexKey::Text)
                    .collect();
                match words.len() {
                    // Nothing searchable left: keep the raw value so the lookup simply misses.
                    0 => criterion.clone(),
                    1 => Criterion::Value(words.into_iter().next().unwrap_or_else(|| IndexKey::Text(String::new()))),
                    _ => Criterion::Op(Operator::And(words)),
                }
            }
            Criterion::Value(_) => criterion.clone(),
            Criterion::Op(Operator::In { lower, upper }) => Criterion::Op(Operator::In {
                lower: lower.as_ref().map(Self::text_bound),
                upper: upper.as_ref().map(Self::text_bound),
            }),
            Criterion::Op(op) => Criterion::Op(op.flat_map_keys(|key| match key {
                IndexKey::Text(s) => Analyzer::text_index().words(s).into_iter().map(IndexKey::Text).collect(),
                other => vec![other.clone()],
            })),
        }
    }

    /// A bound with no indexable word (a stop word, a single letter) stays a
    /// bound on the lowercased text.
    fn text_bound(key: &IndexKey) -> IndexKey {
        match key {
            IndexKey::Text(s) => Analyzer::text_index()
                .words(s)
                .into_iter()
                .next()
                .map_or_else(|| IndexKey::Text(s.trim().to_lowercase()), IndexKey::Text),
            other => other.clone(),
        }
    }

    fn collect_words(raw: &FieldValue, words: &mut Vec<IndexKey>) {
        match raw {
            FieldValue::Text(s) => {
                words.extend(Analyzer::text_index().words(s).into_iter().map(IndexKey::Text));
            }
            FieldValue::List(items) => {
                for item in items {
                    Self::collect_words(item, words);
                }
            }
            scalar => words.extend(IndexKey::from_field(scalar)),
        }
    }

    fn keyword(key: IndexKey) -> Option<IndexKey> {
        match key {
            IndexKey::Text(s) => {
                let normalized = s.trim().to_lowercase();
                if normalized.is_empty() { None } else { Some(IndexKey::Text(normalized)) }
            }
            other => Some(other),
        }
    }

    fn multiple(keys: Vec<IndexKey>) -> Option<IndexValue> {
        if keys.is_empty() { None } else { Some(IndexValue::Multiple(keys)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::inverted::{Index, SearchContext};
    use crate::index::value::KeyType;

    #[test]
    fn test_text_kind_splits_words() {
        let value = IndexKind::Text.to_index_value(Some(&FieldValue::from("Red Fox and red HEN")));
        let Some(IndexValue::Multiple(words)) = value else {
            panic!("text index values are multi-valued");
        };
        let stored = IndexValue::Multiple(words).into_stored();
        let keys: Vec<String> = stored.keys().iter().filter_map(|k| k.as_text().map(String::from)).collect();
        assert_eq!(keys, vec!["fox", "hen", "red"]);
    }

    #[test]
    fn test_empty_values_are_not_indexed() {
        assert_eq!(IndexKind::Field.to_index_value(None), None);
        assert_eq!(IndexKind::Field.to_index_value(Some(&FieldValue::from(""))), None);
        assert_eq!(IndexKind::Keyword.to_index_value(Some(&FieldValue::from("   "))), None);
        assert_eq!(IndexKind::List.to_index_value(Some(&FieldValue::List(vec![]))), None);
    }

    #[test]
    fn test_list_kind_wraps_scalars() {
        let value = IndexKind::List.to_index_value(Some(&FieldValue::from("red")));
        assert_eq!(value, Some(IndexValue::Multiple(vec![IndexKey::from("red")])));
    }

    #[test]
    fn test_text_search_becomes_and_or_prefix() {
        let query = Criterion::from("Quick Fox");
        let multi = IndexKind::Text.prepare_search(&query);
        assert_eq!(
            multi.into_owned(),
            Criterion::Op(Operator::And(vec![IndexKey::from("fox"), IndexKey::from("quick")]))
        );

        let prefix = IndexKind::Text.prepare_search(&Criterion::from("qui*")).into_owned();
        let Criterion::Op(Operator::In { lower, .. }) = prefix else {
            panic!("prefix search is a range");
        };
        assert_eq!(lower, Some(IndexKey::from("qui")));
    }

    #[test]
    fn test_text_range_keeps_stop_word_bounds() {
        let range = Criterion::from(Operator::range(Some("The"), Some("Fox")));
        let prepared = IndexKind::Text.prepare_search(&range).into_owned();
        assert_eq!(
            prepared,
            Criterion::Op(Operator::In {
                lower: Some(IndexKey::from("the")),
                upper: Some(IndexKey::from("fox")),
            })
        );

        let mut index = Index::new("body", IndexKind::Text, KeyType::Text);
        let words = IndexKind::Text.to_index_value(Some(&FieldValue::from("a quick fox")));
        index.index_object(1, words, "Note").unwrap();
        let ctx = SearchContext { catalog: "Note", or_intersect_threshold: 200 };
        assert_eq!(index.search(&range, None, &ctx).unwrap(), None);
    }
}

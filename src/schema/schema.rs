use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::types::{FieldValue, ObjectRecord};
use crate::index::kind::IndexKind;
use crate::index::value::{IndexValue, KeyType};

/// Produces the raw value an index stores for an object. Supplied by the
/// model layer; the default reads the attribute of the same name.
pub trait ValueExtractor: Send + Sync {
    fn index_value(&self, field: &FieldDefinition, object: &ObjectRecord) -> Option<FieldValue>;
}

/// Reads `object.fields[field.name]`.
pub struct AttributeExtractor;

impl ValueExtractor for AttributeExtractor {
    fn index_value(&self, field: &FieldDefinition, object: &ObjectRecord) -> Option<FieldValue> {
        object.get_field(&field.name).cloned()
    }
}

impl<F> ValueExtractor for F
where
    F: Fn(&ObjectRecord) -> Option<FieldValue> + Send + Sync,
{
    fn index_value(&self, _field: &FieldDefinition, object: &ObjectRecord) -> Option<FieldValue> {
        self(object)
    }
}

/// Computes the secondary id of an object when it is confirmed.
pub type IdHook = Arc<dyn Fn(&ObjectRecord) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: IndexKind,
    pub key_type: KeyType,
    pub indexed: bool,
    pub extractor: Option<Arc<dyn ValueExtractor>>,
}

impl FieldDefinition {
    pub fn new(name: &str, kind: IndexKind, key_type: KeyType) -> Self {
        FieldDefinition {
            name: name.to_string(),
            kind,
            key_type,
            indexed: true,
            extractor: None,
        }
    }

    /// Value to push into this field's index, `None` when there is nothing to index.
    pub fn index_value(&self, object: &ObjectRecord) -> Option<IndexValue> {
        let raw = match &self.extractor {
            Some(extractor) => extractor.index_value(self, object),
            None => AttributeExtractor.index_value(self, object),
        };
        self.kind.to_index_value(raw.as_ref())
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("key_type", &self.key_type)
            .field("indexed", &self.indexed)
            .field("custom_extractor", &self.extractor.is_some())
            .finish()
    }
}

/// A domain class as declared by the model layer.
#[derive(Clone)]
pub struct ClassDefinition {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    pub id_hook: Option<IdHook>,
}

impl ClassDefinition {
    pub fn new(name: &str) -> Self {
        ClassDefinition {
            name: name.to_string(),
            fields: Vec::new(),
            id_hook: None,
        }
    }

    pub fn add_field(mut self, name: &str, kind: IndexKind, key_type: KeyType) -> Self {
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldDefinition::new(name, kind, key_type));
        self
    }

    pub fn add_text_field(self, name: &str) -> Self {
        self.add_field(name, IndexKind::Text, KeyType::Text)
    }

    pub fn add_keyword_field(self, name: &str) -> Self {
        self.add_field(name, IndexKind::Keyword, KeyType::Text)
    }

    pub fn add_list_field(self, name: &str, key_type: KeyType) -> Self {
        self.add_field(name, IndexKind::List, key_type)
    }

    pub fn add_date_field(self, name: &str) -> Self {
        self.add_field(name, IndexKind::Date, KeyType::Date)
    }

    /// Stored on objects but never indexed.
    pub fn add_stored_field(mut self, name: &str) -> Self {
        let mut field = FieldDefinition::new(name, IndexKind::Field, KeyType::Text);
        field.indexed = false;
        self.fields.retain(|f| f.name != name);
        self.fields.push(field);
        self
    }

    pub fn with_extractor(mut self, field: &str, extractor: impl ValueExtractor + 'static) -> Self {
        if let Some(def) = self.fields.iter_mut().find(|f| f.name == field) {
            def.extractor = Some(Arc::new(extractor));
        }
        self
    }

    pub fn with_id_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ObjectRecord) -> Option<String> + Send + Sync + 'static,
    {
        self.id_hook = Some(Arc::new(hook));
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.indexed)
    }

    /// A class gets a catalog as long as it declares at least one indexed field.
    pub fn is_indexable(&self) -> bool {
        self.indexed_fields().next().is_some()
    }
}

impl fmt::Debug for ClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClassDefinition")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("id_hook", &self.id_hook.is_some())
            .finish()
    }
}

/// The set of known classes.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub classes: BTreeMap<String, ClassDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn add_class(mut self, class: ClassDefinition) -> Self {
        self.classes.insert(class.name.clone(), class);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.get(name)
    }

    pub fn require_class(&self, name: &str) -> Result<&ClassDefinition> {
        self.class(name)
            .ok_or_else(|| Error::not_found(format!("unknown class '{}'", name)))
    }

    pub fn indexable_classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.classes.values().filter(|c| c.is_indexable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::value::IndexKey;

    #[test]
    fn test_custom_extractor_overrides_attribute() {
        let class = ClassDefinition::new("Person")
            .add_keyword_field("name")
            .with_extractor("name", |o: &ObjectRecord| {
                o.get_field("first").cloned()
            });
        let mut person = ObjectRecord::new(1, "Person", None);
        person.set_field("name", "ignored");
        person.set_field("first", "  Ada ");

        let value = class.field("name").unwrap().index_value(&person);
        assert_eq!(value, Some(IndexValue::Single(IndexKey::from("ada"))));
    }

    #[test]
    fn test_indexable_requires_indexed_field() {
        let plain = ClassDefinition::new("Note").add_stored_field("body");
        assert!(!plain.is_indexable());
        assert!(plain.clone().add_text_field("title").is_indexable());

        let schema = Schema::new().add_class(plain);
        assert_eq!(schema.indexable_classes().count(), 0);
        assert!(schema.require_class("Missing").unwrap_err().is_not_found());
    }
}

use std::collections::BTreeMap;

use crate::codec;
use crate::schema::Schema;
use crate::value::{FieldValue, PropertyBag};

/// Fully-decoded, ephemeral copy of one entity's fields, produced for a
/// single predicate evaluation and discarded. Decoding is lenient: a stored
/// value that fails to parse at its declared type is omitted rather than
/// failing the whole snapshot, so one corrupt field cannot hide a record from
/// queries. Bag entries the schema does not declare are skipped.
pub struct TypedSnapshot<'a> {
    schema: &'a Schema,
    values: BTreeMap<String, FieldValue>,
}

impl<'a> TypedSnapshot<'a> {
    pub fn decode(bag: &PropertyBag, schema: &'a Schema) -> Self {
        let mut values = BTreeMap::new();
        for (name, declared) in schema.iter() {
            let Some(raw) = bag.get(name) else {
                continue;
            };
            if let Ok(value) = codec::decode(raw, declared) {
                values.insert(name.to_owned(), value);
            }
        }
        Self { schema, values }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

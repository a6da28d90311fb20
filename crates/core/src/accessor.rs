use crate::codec;
use crate::error::CoreError;
use crate::schema::{FieldType, Schema};
use crate::value::{FieldValue, PropertyBag};

/// Transient typed view over one entity's property bag. Holds exclusive write
/// access to the bag and shared access to the schema for the duration of one
/// logical operation; never stored, never cloned.
///
/// Every operation resolves the field against the schema first, so an
/// undeclared name fails before any value is touched. Bag entries the schema
/// does not declare are invisible here, not errors.
pub struct FieldAccessor<'a> {
    fields: &'a mut PropertyBag,
    schema: &'a Schema,
}

impl<'a> FieldAccessor<'a> {
    pub fn new(fields: &'a mut PropertyBag, schema: &'a Schema) -> Self {
        Self { fields, schema }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    fn declared(&self, field: &str) -> Result<FieldType, CoreError> {
        self.schema
            .field_type(field)
            .ok_or_else(|| CoreError::FieldNotDeclared(field.to_owned()))
    }

    fn declared_as(&self, field: &str, requested: FieldType) -> Result<FieldType, CoreError> {
        let declared = self.declared(field)?;
        if declared != requested {
            return Err(CoreError::TypeMismatch {
                field: field.to_owned(),
                declared,
                requested,
            });
        }
        Ok(declared)
    }

    /// Reads a field at its declared type. An absent numeric field is
    /// `EmptyValue`; an absent text field reads as the empty string.
    pub fn get(&self, field: &str) -> Result<FieldValue, CoreError> {
        let declared = self.declared(field)?;
        match self.fields.get(field) {
            Some(raw) => codec::decode(raw, declared),
            None if declared == FieldType::Text => Ok(FieldValue::Text(String::new())),
            None => Err(CoreError::EmptyValue),
        }
    }

    pub fn get_int(&self, field: &str) -> Result<i64, CoreError> {
        self.declared_as(field, FieldType::Int)?;
        match self.fields.get(field) {
            Some(raw) => Ok(codec::decode(raw, FieldType::Int)?
                .as_int()
                .unwrap_or_default()),
            None => Err(CoreError::EmptyValue),
        }
    }

    pub fn get_float(&self, field: &str) -> Result<f64, CoreError> {
        self.declared_as(field, FieldType::Float)?;
        match self.fields.get(field) {
            Some(raw) => Ok(codec::decode(raw, FieldType::Float)?
                .as_float()
                .unwrap_or_default()),
            None => Err(CoreError::EmptyValue),
        }
    }

    pub fn get_text(&self, field: &str) -> Result<String, CoreError> {
        self.declared_as(field, FieldType::Text)?;
        Ok(self.fields.get(field).cloned().unwrap_or_default())
    }

    /// Encodes the value and overwrites any previous bag entry. The value's
    /// own type must equal the declared type; there is no widening.
    pub fn set(&mut self, field: &str, value: FieldValue) -> Result<(), CoreError> {
        self.declared_as(field, value.field_type())?;
        self.fields.insert(field.to_owned(), codec::encode(&value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_schema() -> Schema {
        let mut schema = Schema::new();
        schema.declare("name", FieldType::Text);
        schema.declare("age", FieldType::Int);
        schema.declare("score", FieldType::Float);
        schema
    }

    #[test]
    fn set_then_get_returns_exact_values() {
        let schema = roster_schema();
        let mut bag = PropertyBag::new();
        let mut acc = FieldAccessor::new(&mut bag, &schema);

        acc.set("name", FieldValue::Text("Alice".into())).unwrap();
        acc.set("age", FieldValue::Int(20)).unwrap();
        acc.set("score", FieldValue::Float(85.5)).unwrap();

        assert_eq!(acc.get_text("name").unwrap(), "Alice");
        assert_eq!(acc.get_int("age").unwrap(), 20);
        assert_eq!(acc.get_float("score").unwrap(), 85.5);
    }

    #[test]
    fn undeclared_field_fails_before_the_codec() {
        let schema = roster_schema();
        let mut bag = PropertyBag::new();
        let mut acc = FieldAccessor::new(&mut bag, &schema);

        assert!(matches!(
            acc.get("missing"),
            Err(CoreError::FieldNotDeclared(_))
        ));
        assert!(matches!(
            acc.set("missing", FieldValue::Int(1)),
            Err(CoreError::FieldNotDeclared(_))
        ));
    }

    #[test]
    fn set_rejects_a_value_of_the_wrong_type() {
        let schema = roster_schema();
        let mut bag = PropertyBag::new();
        let mut acc = FieldAccessor::new(&mut bag, &schema);

        let err = acc
            .set("age", FieldValue::Text("twenty".into()))
            .unwrap_err();
        match err {
            CoreError::TypeMismatch {
                field,
                declared,
                requested,
            } => {
                assert_eq!(field, "age");
                assert_eq!(declared, FieldType::Int);
                assert_eq!(requested, FieldType::Text);
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
        assert!(bag.is_empty(), "failed set must not write");
    }

    #[test]
    fn no_widening_between_int_and_float() {
        let schema = roster_schema();
        let mut bag = PropertyBag::new();
        let mut acc = FieldAccessor::new(&mut bag, &schema);

        acc.set("age", FieldValue::Int(20)).unwrap();
        assert!(matches!(
            acc.get_float("age"),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            acc.set("score", FieldValue::Int(85)),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn absent_numeric_is_empty_value_absent_text_is_empty_string() {
        let schema = roster_schema();
        let mut bag = PropertyBag::new();
        let acc = FieldAccessor::new(&mut bag, &schema);

        assert!(matches!(acc.get_int("age"), Err(CoreError::EmptyValue)));
        assert!(matches!(acc.get_float("score"), Err(CoreError::EmptyValue)));
        assert!(matches!(acc.get("age"), Err(CoreError::EmptyValue)));
        assert_eq!(acc.get_text("name").unwrap(), "");
        assert_eq!(acc.get("name").unwrap(), FieldValue::Text(String::new()));
    }

    #[test]
    fn set_overwrites_and_is_idempotent() {
        let schema = roster_schema();
        let mut bag = PropertyBag::new();
        let mut acc = FieldAccessor::new(&mut bag, &schema);

        acc.set("age", FieldValue::Int(20)).unwrap();
        acc.set("age", FieldValue::Int(21)).unwrap();
        assert_eq!(acc.get_int("age").unwrap(), 21);

        acc.set("age", FieldValue::Int(21)).unwrap();
        assert_eq!(acc.get_int("age").unwrap(), 21);
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn drifted_bag_entries_stay_invisible_and_intact() {
        let schema = roster_schema();
        let mut bag = PropertyBag::new();
        bag.insert("legacy".into(), "old data".into());

        let mut acc = FieldAccessor::new(&mut bag, &schema);
        assert!(matches!(
            acc.get("legacy"),
            Err(CoreError::FieldNotDeclared(_))
        ));
        acc.set("name", FieldValue::Text("Alice".into())).unwrap();

        assert_eq!(bag.get("legacy").map(String::as_str), Some("old data"));
    }

    #[test]
    fn get_decodes_at_the_declared_type() {
        let schema = roster_schema();
        let mut bag = PropertyBag::new();
        let mut acc = FieldAccessor::new(&mut bag, &schema);

        acc.set("score", FieldValue::Float(85.5)).unwrap();
        assert_eq!(acc.get("score").unwrap(), FieldValue::Float(85.5));

        // a corrupt stored value surfaces the codec's error untouched
        bag.insert("age".into(), "123abc".into());
        let acc = FieldAccessor::new(&mut bag, &schema);
        assert!(matches!(
            acc.get("age"),
            Err(CoreError::PartialConversion(_))
        ));
    }
}

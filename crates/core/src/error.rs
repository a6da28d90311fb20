use thiserror::Error;

use crate::schema::FieldType;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("field '{0}' is not declared in the schema")]
    FieldNotDeclared(String),

    #[error("type mismatch for field '{field}': declared {declared}, requested {requested}")]
    TypeMismatch {
        field: String,
        declared: FieldType,
        requested: FieldType,
    },

    #[error("empty value cannot be converted to a number")]
    EmptyValue,

    #[error("'{0}' is not a valid number")]
    InvalidFormat(String),

    #[error("'{0}' is out of range for the target type")]
    OutOfRange(String),

    #[error("'{0}' has trailing characters after the numeric part")]
    PartialConversion(String),

    #[error("unsupported operator: '{0}'")]
    UnsupportedOperator(String),

    #[error("logic group has no rules")]
    EmptyRuleSet,
}

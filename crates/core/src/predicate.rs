use crate::codec;
use crate::error::CoreError;
use crate::schema::FieldType;
use crate::snapshot::TypedSnapshot;
use crate::value::FieldValue;

/// One node of a boolean filter tree: either a single field comparison or an
/// AND/OR group over child nodes. Trees arrive from the request layer already
/// shape-checked; semantic validation (field existence, operator tokens, type
/// compatibility) happens during evaluation.
#[derive(Debug, Clone)]
pub enum LogicNode {
    Leaf {
        field: String,
        op: String,
        value: FieldValue,
    },
    Branch {
        op: String,
        rules: Vec<LogicNode>,
    },
}

impl LogicNode {
    pub fn leaf(field: impl Into<String>, op: impl Into<String>, value: FieldValue) -> Self {
        LogicNode::Leaf {
            field: field.into(),
            op: op.into(),
            value,
        }
    }

    pub fn branch(op: impl Into<String>, rules: Vec<LogicNode>) -> Self {
        LogicNode::Branch {
            op: op.into(),
            rules,
        }
    }

    pub fn and(rules: Vec<LogicNode>) -> Self {
        Self::branch("AND", rules)
    }

    pub fn or(rules: Vec<LogicNode>) -> Self {
        Self::branch("OR", rules)
    }
}

/// Recursive tree walk. Pure and deterministic: same snapshot and tree, same
/// answer. A leaf whose field is declared but unset evaluates to false; a
/// leaf whose field is not declared at all is an error in the request, not in
/// the data.
pub fn evaluate(snapshot: &TypedSnapshot<'_>, node: &LogicNode) -> Result<bool, CoreError> {
    match node {
        LogicNode::Leaf { field, op, value } => evaluate_leaf(snapshot, field, op, value),
        LogicNode::Branch { op, rules } => {
            if rules.is_empty() {
                return Err(CoreError::EmptyRuleSet);
            }
            match op.to_ascii_uppercase().as_str() {
                "AND" => {
                    for rule in rules {
                        if !evaluate(snapshot, rule)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                "OR" => {
                    for rule in rules {
                        if evaluate(snapshot, rule)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                _ => Err(CoreError::UnsupportedOperator(op.clone())),
            }
        }
    }
}

fn evaluate_leaf(
    snapshot: &TypedSnapshot<'_>,
    field: &str,
    op: &str,
    literal: &FieldValue,
) -> Result<bool, CoreError> {
    let declared = snapshot
        .schema()
        .field_type(field)
        .ok_or_else(|| CoreError::FieldNotDeclared(field.to_owned()))?;
    let Some(stored) = snapshot.get(field) else {
        return Ok(false);
    };
    // snapshot values always carry the declared type, so the lhs coercions
    // below cannot miss
    match declared {
        FieldType::Text => {
            let rhs = literal.as_text().ok_or_else(|| CoreError::TypeMismatch {
                field: field.to_owned(),
                declared,
                requested: literal.field_type(),
            })?;
            codec::compare_text(stored.as_text().unwrap_or_default(), rhs, op)
        }
        FieldType::Int | FieldType::Float => {
            let rhs = literal.as_f64().ok_or_else(|| CoreError::TypeMismatch {
                field: field.to_owned(),
                declared,
                requested: literal.field_type(),
            })?;
            codec::compare_numeric(stored.as_f64().unwrap_or_default(), rhs, op)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::value::PropertyBag;

    fn roster_schema() -> Schema {
        let mut schema = Schema::new();
        schema.declare("name", FieldType::Text);
        schema.declare("age", FieldType::Int);
        schema.declare("score", FieldType::Float);
        schema
    }

    fn alice_bag() -> PropertyBag {
        let mut bag = PropertyBag::new();
        bag.insert("name".into(), "Alice".into());
        bag.insert("age".into(), "20".into());
        bag.insert("score".into(), "85.5".into());
        bag
    }

    #[test]
    fn leaf_comparisons_dispatch_on_declared_type() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        assert!(evaluate(&snap, &LogicNode::leaf("age", ">=", FieldValue::Int(18))).unwrap());
        assert!(evaluate(&snap, &LogicNode::leaf("score", ">", FieldValue::Float(80.0))).unwrap());
        assert!(
            evaluate(
                &snap,
                &LogicNode::leaf("name", "==", FieldValue::Text("Alice".into()))
            )
            .unwrap()
        );
        assert!(!evaluate(&snap, &LogicNode::leaf("age", "<", FieldValue::Int(18))).unwrap());
    }

    #[test]
    fn int_and_float_literals_are_interchangeable_for_numeric_fields() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        assert!(evaluate(&snap, &LogicNode::leaf("age", "==", FieldValue::Float(20.0))).unwrap());
        assert!(evaluate(&snap, &LogicNode::leaf("score", ">", FieldValue::Int(80))).unwrap());
    }

    #[test]
    fn declared_but_unset_field_is_false_not_an_error() {
        let mut schema = Schema::new();
        schema.declare("score", FieldType::Float);
        let bag = PropertyBag::new();
        let snap = TypedSnapshot::decode(&bag, &schema);

        let node = LogicNode::leaf("score", ">", FieldValue::Int(0));
        assert!(!evaluate(&snap, &node).unwrap());
    }

    #[test]
    fn undeclared_field_is_a_request_error() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        let node = LogicNode::leaf("height", ">", FieldValue::Int(0));
        assert!(matches!(
            evaluate(&snap, &node),
            Err(CoreError::FieldNotDeclared(_))
        ));
    }

    #[test]
    fn literal_type_must_match_the_field_class() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        assert!(matches!(
            evaluate(&snap, &LogicNode::leaf("name", "==", FieldValue::Int(1))),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            evaluate(
                &snap,
                &LogicNode::leaf("age", ">", FieldValue::Text("18".into()))
            ),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn and_is_the_conjunction_with_a_false_in_every_position() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        let t = || LogicNode::leaf("age", ">=", FieldValue::Int(18));
        let f = || LogicNode::leaf("age", "<", FieldValue::Int(18));

        assert!(evaluate(&snap, &LogicNode::and(vec![t(), t(), t()])).unwrap());
        assert!(!evaluate(&snap, &LogicNode::and(vec![f(), t(), t()])).unwrap());
        assert!(!evaluate(&snap, &LogicNode::and(vec![t(), f(), t()])).unwrap());
        assert!(!evaluate(&snap, &LogicNode::and(vec![t(), t(), f()])).unwrap());
    }

    #[test]
    fn or_is_the_disjunction_with_a_true_in_every_position() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        let t = || LogicNode::leaf("age", ">=", FieldValue::Int(18));
        let f = || LogicNode::leaf("age", "<", FieldValue::Int(18));

        assert!(!evaluate(&snap, &LogicNode::or(vec![f(), f(), f()])).unwrap());
        assert!(evaluate(&snap, &LogicNode::or(vec![t(), f(), f()])).unwrap());
        assert!(evaluate(&snap, &LogicNode::or(vec![f(), t(), f()])).unwrap());
        assert!(evaluate(&snap, &LogicNode::or(vec![f(), f(), t()])).unwrap());
    }

    #[test]
    fn short_circuit_never_reaches_later_children() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        // the second child would error with FieldNotDeclared if evaluated
        let poison = || LogicNode::leaf("undeclared", "==", FieldValue::Int(1));
        let f = LogicNode::leaf("age", "<", FieldValue::Int(18));
        let t = LogicNode::leaf("age", ">=", FieldValue::Int(18));

        assert!(!evaluate(&snap, &LogicNode::and(vec![f, poison()])).unwrap());
        assert!(evaluate(&snap, &LogicNode::or(vec![t, poison()])).unwrap());
    }

    #[test]
    fn branches_nest_arbitrarily() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        let node = LogicNode::and(vec![
            LogicNode::or(vec![
                LogicNode::leaf("name", "contains", FieldValue::Text("lic".into())),
                LogicNode::leaf("name", "==", FieldValue::Text("Bob".into())),
            ]),
            LogicNode::and(vec![
                LogicNode::leaf("age", ">=", FieldValue::Int(18)),
                LogicNode::leaf("score", ">", FieldValue::Float(80.0)),
            ]),
        ]);
        assert!(evaluate(&snap, &node).unwrap());
    }

    #[test]
    fn combinator_tokens_are_case_insensitive() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        let node = LogicNode::branch(
            "and",
            vec![LogicNode::leaf("age", ">=", FieldValue::Int(18))],
        );
        assert!(evaluate(&snap, &node).unwrap());
    }

    #[test]
    fn empty_rule_set_is_a_construction_error() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        assert!(matches!(
            evaluate(&snap, &LogicNode::and(vec![])),
            Err(CoreError::EmptyRuleSet)
        ));
        assert!(matches!(
            evaluate(&snap, &LogicNode::or(vec![])),
            Err(CoreError::EmptyRuleSet)
        ));
    }

    #[test]
    fn unknown_tokens_are_unsupported_operators() {
        let schema = roster_schema();
        let bag = alice_bag();
        let snap = TypedSnapshot::decode(&bag, &schema);

        let xor = LogicNode::branch(
            "XOR",
            vec![LogicNode::leaf("age", ">=", FieldValue::Int(18))],
        );
        assert!(matches!(
            evaluate(&snap, &xor),
            Err(CoreError::UnsupportedOperator(_))
        ));

        let weird_leaf = LogicNode::leaf("age", "~=", FieldValue::Int(18));
        assert!(matches!(
            evaluate(&snap, &weird_leaf),
            Err(CoreError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn adult_high_scorer_filter_tracks_score_changes() {
        let schema = roster_schema();
        let mut bag = alice_bag();

        let node = LogicNode::and(vec![
            LogicNode::leaf("age", ">=", FieldValue::Int(18)),
            LogicNode::leaf("score", ">", FieldValue::Int(80)),
        ]);

        let snap = TypedSnapshot::decode(&bag, &schema);
        assert!(evaluate(&snap, &node).unwrap());

        bag.insert("score".into(), "75".into());
        let snap = TypedSnapshot::decode(&bag, &schema);
        assert!(!evaluate(&snap, &node).unwrap());
    }

    #[test]
    fn substring_match_distinguishes_names() {
        let schema = roster_schema();
        let node = LogicNode::leaf("name", "contains", FieldValue::Text("lic".into()));

        let mut bag = PropertyBag::new();
        bag.insert("name".into(), "Alice".into());
        let snap = TypedSnapshot::decode(&bag, &schema);
        assert!(evaluate(&snap, &node).unwrap());

        bag.insert("name".into(), "Bob".into());
        let snap = TypedSnapshot::decode(&bag, &schema);
        assert!(!evaluate(&snap, &node).unwrap());
    }
}

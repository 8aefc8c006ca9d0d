// ============================================================================
// Predicates - declarative boolean filters over record fields
// ============================================================================
//
// A predicate is validated against an entity schema before it reaches a
// storage engine, then evaluated per record. Comparisons involving NULL are
// false (SQL three-valued logic collapsed to bool), except IS NULL.
//
// ============================================================================

use super::pattern::eval_like;
use crate::core::{DataType, EntitySchema, Record, Result, StoreError, Value};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        write!(f, "{}", op)
    }
}

/// Boolean filter expression over the fields of one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every record.
    True,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    Like {
        field: String,
        pattern: String,
        case_insensitive: bool,
        negated: bool,
    },
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn not_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::NotEq, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn lt_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::LtEq, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn gt_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::GtEq, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: false,
            negated: false,
        }
    }

    pub fn ilike(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: true,
            negated: false,
        }
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Predicate::IsNull {
            field: field.into(),
            negated: false,
        }
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Predicate::IsNull {
            field: field.into(),
            negated: true,
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Check field names and literal types against `schema`.
    pub fn validate(&self, schema: &EntitySchema) -> Result<()> {
        match self {
            Predicate::True => Ok(()),
            Predicate::Compare { field, value, .. } => {
                check_literal(schema, field, value)
            }
            Predicate::Like { field, .. } => {
                let def = schema.require_field(field)?;
                if def.data_type != DataType::Text {
                    return Err(StoreError::TypeMismatch(format!(
                        "LIKE requires a TEXT field, '{}' is {}",
                        field, def.data_type
                    )));
                }
                Ok(())
            }
            Predicate::In { field, values, .. } => {
                for value in values {
                    check_literal(schema, field, value)?;
                }
                schema.require_field(field).map(|_| ())
            }
            Predicate::IsNull { field, .. } => schema.require_field(field).map(|_| ()),
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                left.validate(schema)?;
                right.validate(schema)
            }
            Predicate::Not(inner) => inner.validate(schema),
        }
    }

    /// Evaluate against one record.
    pub fn matches(&self, record: &Record) -> Result<bool> {
        match self {
            Predicate::True => Ok(true),
            Predicate::Compare { field, op, value } => {
                let actual = record.get(field);
                if actual.is_null() || value.is_null() {
                    return Ok(false);
                }
                Ok(op.accepts(actual.compare(value)?))
            }
            Predicate::Like {
                field,
                pattern,
                case_insensitive,
                negated,
            } => match record.get(field) {
                Value::Text(text) => Ok(eval_like(text, pattern, !case_insensitive)? != *negated),
                _ => Ok(false),
            },
            Predicate::In {
                field,
                values,
                negated,
            } => {
                let actual = record.get(field);
                if actual.is_null() {
                    return Ok(false);
                }
                Ok(values.iter().any(|v| v == actual) != *negated)
            }
            Predicate::IsNull { field, negated } => Ok(record.get(field).is_null() != *negated),
            Predicate::And(left, right) => Ok(left.matches(record)? && right.matches(record)?),
            Predicate::Or(left, right) => Ok(left.matches(record)? || right.matches(record)?),
            Predicate::Not(inner) => Ok(!inner.matches(record)?),
        }
    }
}

fn check_literal(schema: &EntitySchema, field: &str, value: &Value) -> Result<()> {
    let def = schema.require_field(field)?;
    if !def.data_type.is_compatible(value) {
        return Err(StoreError::TypeMismatch(format!(
            "Field '{}' is {}, cannot compare with {}",
            field,
            def.data_type,
            value.type_name()
        )));
    }
    Ok(())
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "TRUE"),
            Predicate::Compare { field, op, value } => write!(f, "{} {} {}", field, op, value),
            Predicate::Like {
                field,
                pattern,
                case_insensitive,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                write!(f, "{} {}{} '{}'", field, not, op, pattern)
            }
            Predicate::In {
                field,
                values,
                negated,
            } => {
                let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}IN ({})", field, not, list.join(", "))
            }
            Predicate::IsNull { field, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", field)
                } else {
                    write!(f, "{} IS NULL", field)
                }
            }
            Predicate::And(left, right) => write!(f, "({} AND {})", left, right),
            Predicate::Or(left, right) => write!(f, "({} OR {})", left, right),
            Predicate::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDef, FieldValues, ObjectId};

    fn schema() -> EntitySchema {
        EntitySchema::new(
            "User",
            vec![
                FieldDef::new("user_id", DataType::Integer),
                FieldDef::new("name", DataType::Text),
            ],
        )
    }

    fn record(id: i64, name: Option<&str>) -> Record {
        let mut values = FieldValues::new();
        values.insert("user_id".into(), Value::Integer(id));
        values.insert("name".into(), Value::from(name));
        Record::new(ObjectId(0), values)
    }

    #[test]
    fn test_compare_and_logic() {
        let p = Predicate::gt("user_id", 10).and(Predicate::lt_eq("user_id", 20));
        assert!(p.matches(&record(15, None)).unwrap());
        assert!(p.matches(&record(20, None)).unwrap());
        assert!(!p.matches(&record(21, None)).unwrap());

        let p = Predicate::eq("user_id", 1).or(Predicate::eq("user_id", 2));
        assert!(p.matches(&record(2, None)).unwrap());
        assert!(!p.clone().negate().matches(&record(2, None)).unwrap());
    }

    #[test]
    fn test_null_comparisons_are_false() {
        let rec = record(1, None);
        assert!(!Predicate::eq("name", "x").matches(&rec).unwrap());
        assert!(!Predicate::not_eq("name", "x").matches(&rec).unwrap());
        assert!(Predicate::is_null("name").matches(&rec).unwrap());
        assert!(!Predicate::is_not_null("name").matches(&rec).unwrap());
    }

    #[test]
    fn test_like_and_in() {
        let rec = record(3, Some("Alice"));
        assert!(Predicate::like("name", "Al%").matches(&rec).unwrap());
        assert!(Predicate::ilike("name", "al%").matches(&rec).unwrap());
        assert!(Predicate::is_in("user_id", [1, 2, 3]).matches(&rec).unwrap());
        assert!(!Predicate::is_in("user_id", [4]).matches(&rec).unwrap());
    }

    #[test]
    fn test_validate_unknown_field() {
        let err = Predicate::eq("age", 1).validate(&schema()).unwrap_err();
        assert_eq!(err, StoreError::FieldNotFound("age".into(), "User".into()));
    }

    #[test]
    fn test_validate_literal_type() {
        let err = Predicate::eq("user_id", "one").validate(&schema()).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch(_)));
        let err = Predicate::like("user_id", "1%").validate(&schema()).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch(_)));
        assert!(Predicate::eq("user_id", 1).and(Predicate::is_null("name")).validate(&schema()).is_ok());
    }

    #[test]
    fn test_display() {
        let p = Predicate::eq("user_id", 42).and(Predicate::like("name", "a%"));
        assert_eq!(p.to_string(), "(user_id = 42 AND name LIKE 'a%')");
    }
}

//! Textual predicates, e.g. `user_id = 42 AND name LIKE 'a%'`.
//!
//! The text is parsed as a SQL boolean expression with `sqlparser` and
//! converted into a [`Predicate`]. Each comparison must have a field on one
//! side and a literal on the other.

use super::predicate::{CompareOp, Predicate};
use crate::core::{Result, StoreError, Value};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

impl Predicate {
    /// Parse a predicate from its textual form.
    ///
    /// # Examples
    ///
    /// ```
    /// use entitystore::query::Predicate;
    ///
    /// let predicate = Predicate::parse("user_id = 42 AND name LIKE 'a%'").unwrap();
    /// assert_eq!(predicate, Predicate::eq("user_id", 42).and(Predicate::like("name", "a%")));
    /// ```
    pub fn parse(text: &str) -> Result<Predicate> {
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(text)
            .map_err(|e| StoreError::InvalidQuery(e.to_string()))?;
        let expr = parser
            .parse_expr()
            .map_err(|e| StoreError::InvalidQuery(e.to_string()))?;

        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(StoreError::InvalidQuery(format!(
                "Unexpected trailing input: {}",
                trailing.token
            )));
        }

        convert(expr)
    }
}

fn convert(expr: sql_ast::Expr) -> Result<Predicate> {
    match expr {
        sql_ast::Expr::Nested(inner) => convert(*inner),
        sql_ast::Expr::BinaryOp { left, op, right } => match op {
            sql_ast::BinaryOperator::And => Ok(convert(*left)?.and(convert(*right)?)),
            sql_ast::BinaryOperator::Or => Ok(convert(*left)?.or(convert(*right)?)),
            other => convert_comparison(*left, &other, *right),
        },
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Not,
            expr,
        } => Ok(convert(*expr)?.negate()),
        sql_ast::Expr::IsNull(inner) => Ok(Predicate::IsNull {
            field: field_name(*inner)?,
            negated: false,
        }),
        sql_ast::Expr::IsNotNull(inner) => Ok(Predicate::IsNull {
            field: field_name(*inner)?,
            negated: true,
        }),
        sql_ast::Expr::InList {
            expr,
            list,
            negated,
        } => Ok(Predicate::In {
            field: field_name(*expr)?,
            values: list.into_iter().map(literal).collect::<Result<Vec<_>>>()?,
            negated,
        }),
        sql_ast::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let field = field_name(*expr)?;
            let range = Predicate::gt_eq(field.clone(), literal(*low)?)
                .and(Predicate::lt_eq(field, literal(*high)?));
            Ok(if negated { range.negate() } else { range })
        }
        sql_ast::Expr::Like {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => like(*expr, *pattern, escape_char.is_some(), false, negated),
        sql_ast::Expr::ILike {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => like(*expr, *pattern, escape_char.is_some(), true, negated),
        sql_ast::Expr::Value(val) => match val.value {
            sql_ast::Value::Boolean(true) => Ok(Predicate::True),
            sql_ast::Value::Boolean(false) => Ok(Predicate::True.negate()),
            other => Err(StoreError::InvalidQuery(format!(
                "Literal {} is not a predicate",
                other
            ))),
        },
        other => Err(StoreError::InvalidQuery(format!(
            "Unsupported predicate expression: {}",
            other
        ))),
    }
}

fn like(
    expr: sql_ast::Expr,
    pattern: sql_ast::Expr,
    has_escape: bool,
    case_insensitive: bool,
    negated: bool,
) -> Result<Predicate> {
    if has_escape {
        return Err(StoreError::InvalidQuery("LIKE ESCAPE not supported".into()));
    }
    let pattern = match literal(pattern)? {
        Value::Text(pattern) => pattern,
        other => {
            return Err(StoreError::InvalidQuery(format!(
                "LIKE pattern must be text, got {}",
                other.type_name()
            )));
        }
    };
    Ok(Predicate::Like {
        field: field_name(expr)?,
        pattern,
        case_insensitive,
        negated,
    })
}

fn convert_comparison(
    left: sql_ast::Expr,
    op: &sql_ast::BinaryOperator,
    right: sql_ast::Expr,
) -> Result<Predicate> {
    let op = match op {
        sql_ast::BinaryOperator::Eq => CompareOp::Eq,
        sql_ast::BinaryOperator::NotEq => CompareOp::NotEq,
        sql_ast::BinaryOperator::Lt => CompareOp::Lt,
        sql_ast::BinaryOperator::LtEq => CompareOp::LtEq,
        sql_ast::BinaryOperator::Gt => CompareOp::Gt,
        sql_ast::BinaryOperator::GtEq => CompareOp::GtEq,
        other => {
            return Err(StoreError::InvalidQuery(format!(
                "Unsupported operator: {}",
                other
            )));
        }
    };

    // `42 < user_id` is rewritten as `user_id > 42`
    if let sql_ast::Expr::Identifier(_) = left {
        Ok(Predicate::compare(field_name(left)?, op, literal(right)?))
    } else {
        Ok(Predicate::compare(field_name(right)?, mirror(op), literal(left)?))
    }
}

fn mirror(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::LtEq => CompareOp::GtEq,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::GtEq => CompareOp::LtEq,
        same => same,
    }
}

fn field_name(expr: sql_ast::Expr) -> Result<String> {
    match expr {
        sql_ast::Expr::Identifier(ident) => Ok(ident.value),
        other => Err(StoreError::InvalidQuery(format!(
            "Expected a field name, got {}",
            other
        ))),
    }
}

fn literal(expr: sql_ast::Expr) -> Result<Value> {
    match expr {
        sql_ast::Expr::Value(val) => convert_value(val.value),
        sql_ast::Expr::Nested(inner) => literal(*inner),
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Minus,
            expr,
        } => match literal(*expr)? {
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(StoreError::InvalidQuery(format!(
                "Cannot negate {}",
                other.type_name()
            ))),
        },
        other => Err(StoreError::InvalidQuery(format!(
            "Expected a literal, got {}",
            other
        ))),
    }
}

fn convert_value(val: sql_ast::Value) -> Result<Value> {
    match val {
        sql_ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Integer(i))
            } else if let Ok(f) = n.parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Err(StoreError::InvalidQuery(format!("Invalid number: {}", n)))
            }
        }
        sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
            Ok(Value::Text(s))
        }
        sql_ast::Value::Boolean(b) => Ok(Value::Boolean(b)),
        sql_ast::Value::Null => Ok(Value::Null),
        other => Err(StoreError::InvalidQuery(format!(
            "Unsupported literal: {}",
            other
        ))),
    }
}

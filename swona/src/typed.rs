//! Type-checked expression tree
//!
//! Mostly mirrors [`Expression`](crate::ast::Expression), except that every
//! reference has been resolved to a [`BindingReference`], string `+` has
//! become [`TypedBinaryOp::ConcatString`] and `&&`/`||` have been desugared
//! into `if` nodes.

use std::fmt;

use crate::ast::{write_list, RelationalOp};
use crate::env::BindingReference;
use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedBinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    /// Left side is a string, right side is displayed and appended
    ConcatString,
    Relational(RelationalOp),
}

impl fmt::Display for TypedBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedBinaryOp::Plus => write!(f, "Plus"),
            TypedBinaryOp::Minus => write!(f, "Minus"),
            TypedBinaryOp::Multiply => write!(f, "Multiply"),
            TypedBinaryOp::Divide => write!(f, "Divide"),
            TypedBinaryOp::ConcatString => write!(f, "ConcatString"),
            TypedBinaryOp::Relational(op) => write!(f, "{}", op),
        }
    }
}

/// An expression annotated with its type
#[derive(Debug, Clone)]
pub enum TypedExpression {
    Ref(BindingReference),
    Lit {
        value: Value,
        ty: Type,
    },
    Not(Box<TypedExpression>),
    Call {
        func: Box<TypedExpression>,
        args: Vec<TypedExpression>,
        ty: Type,
    },
    Binary {
        op: TypedBinaryOp,
        lhs: Box<TypedExpression>,
        rhs: Box<TypedExpression>,
    },
    Assign {
        variable: BindingReference,
        expression: Box<TypedExpression>,
    },
    Var {
        variable: BindingReference,
        expression: Box<TypedExpression>,
    },
    If {
        condition: Box<TypedExpression>,
        consequent: Box<TypedExpression>,
        alternative: Option<Box<TypedExpression>>,
        ty: Type,
    },
    While {
        condition: Box<TypedExpression>,
        body: Box<TypedExpression>,
    },
    ExpressionList {
        expressions: Vec<TypedExpression>,
        ty: Type,
    },
}

impl TypedExpression {
    /// The empty expression list, of type `Unit`.
    pub fn empty() -> Self {
        TypedExpression::ExpressionList {
            expressions: Vec::new(),
            ty: Type::Unit,
        }
    }

    pub fn boolean(value: bool) -> Self {
        TypedExpression::Lit {
            value: Value::Bool(value),
            ty: Type::Boolean,
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            TypedExpression::Ref(binding) => binding.ty().clone(),
            TypedExpression::Lit { ty, .. } => ty.clone(),
            TypedExpression::Not(_) => Type::Boolean,
            TypedExpression::Call { ty, .. } => ty.clone(),
            TypedExpression::Binary { op, .. } => match op {
                TypedBinaryOp::Plus
                | TypedBinaryOp::Minus
                | TypedBinaryOp::Multiply
                | TypedBinaryOp::Divide => Type::Int,
                TypedBinaryOp::ConcatString => Type::String,
                TypedBinaryOp::Relational(_) => Type::Boolean,
            },
            TypedExpression::Assign { .. }
            | TypedExpression::Var { .. }
            | TypedExpression::While { .. } => Type::Unit,
            TypedExpression::If { ty, .. } => ty.clone(),
            TypedExpression::ExpressionList { ty, .. } => ty.clone(),
        }
    }

    /// The literal value, if this is a literal.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            TypedExpression::Lit { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for TypedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedExpression::Ref(binding) => write!(f, "[Ref {}]", binding.name()),
            TypedExpression::Lit { value, .. } => write!(f, "[Lit {}]", value.repr()),
            TypedExpression::Not(exp) => write!(f, "[Not {}]", exp),
            TypedExpression::Call { func, args, .. } => {
                write!(f, "[Call {} ", func)?;
                write_list(f, args)?;
                write!(f, "]")
            }
            TypedExpression::Binary { op, lhs, rhs } => write!(f, "[{} {} {}]", op, lhs, rhs),
            TypedExpression::Assign {
                variable,
                expression,
            } => write!(f, "[Assign {} {}]", variable, expression),
            TypedExpression::Var {
                variable,
                expression,
            } => write!(f, "[Var {} {}]", variable, expression),
            TypedExpression::If {
                condition,
                consequent,
                alternative,
                ..
            } => {
                write!(f, "[If {} {} ", condition, consequent)?;
                match alternative {
                    Some(alternative) => write!(f, "{}]", alternative),
                    None => write!(f, "[]]"),
                }
            }
            TypedExpression::While { condition, body } => {
                write!(f, "[While {} {}]", condition, body)
            }
            TypedExpression::ExpressionList { expressions, .. } => {
                write!(f, "[ExpressionList ")?;
                write_list(f, expressions)?;
                write!(f, "]")
            }
        }
    }
}

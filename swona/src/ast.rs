//! Swona Abstract Syntax Tree
//!
//! The display form of expressions is a compact bracketed tree rather than
//! source code, e.g. `[Plus [Ref x] [Lit 1]]`.

use std::fmt;

use crate::location::SourceLocation;
use crate::types::Type;
use crate::value::Value;

/// Untyped expression as produced by the parser
#[derive(Debug, Clone)]
pub enum Expression {
    /// Reference to a variable
    Ref { name: String, location: SourceLocation },
    /// Literal value
    Lit { value: Value, location: SourceLocation },
    /// Logical not
    Not {
        expression: Box<Expression>,
        location: SourceLocation,
    },
    /// Function call. Located at the called expression.
    Call {
        func: Box<Expression>,
        args: Vec<Expression>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        location: SourceLocation,
    },
    /// Assignment to an existing mutable variable
    Assign {
        variable: String,
        expression: Box<Expression>,
        location: SourceLocation,
    },
    /// Definition of a variable: `var` when mutable, `val` otherwise
    Var {
        variable: String,
        expression: Box<Expression>,
        mutable: bool,
        location: SourceLocation,
    },
    If {
        condition: Box<Expression>,
        consequent: Box<Expression>,
        alternative: Option<Box<Expression>>,
        location: SourceLocation,
    },
    While {
        condition: Box<Expression>,
        body: Box<Expression>,
        location: SourceLocation,
    },
    /// `{ e1; e2; ... }`
    ExpressionList {
        expressions: Vec<Expression>,
        location: SourceLocation,
    },
}

impl Expression {
    pub fn location(&self) -> &SourceLocation {
        match self {
            Expression::Call { func, .. } => func.location(),
            Expression::Ref { location, .. }
            | Expression::Lit { location, .. }
            | Expression::Not { location, .. }
            | Expression::Binary { location, .. }
            | Expression::Assign { location, .. }
            | Expression::Var { location, .. }
            | Expression::If { location, .. }
            | Expression::While { location, .. }
            | Expression::ExpressionList { location, .. } => location,
        }
    }

    /// Literal with a synthetic location, for expressions built by the host.
    pub fn lit(value: Value) -> Self {
        Expression::Lit {
            value,
            location: SourceLocation::synthetic(),
        }
    }

    /// Variable reference with a synthetic location.
    pub fn reference(name: impl Into<String>) -> Self {
        Expression::Ref {
            name: name.into(),
            location: SourceLocation::synthetic(),
        }
    }

    pub fn call(func: Expression, args: Vec<Expression>) -> Self {
        Expression::Call {
            func: Box::new(func),
            args,
        }
    }
}

/// Binary operators of the surface syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    And,
    Or,
    Relational(RelationalOp),
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Plus => write!(f, "Plus"),
            BinaryOp::Minus => write!(f, "Minus"),
            BinaryOp::Multiply => write!(f, "Multiply"),
            BinaryOp::Divide => write!(f, "Divide"),
            BinaryOp::And => write!(f, "And"),
            BinaryOp::Or => write!(f, "Or"),
            BinaryOp::Relational(op) => write!(f, "{}", op),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationalOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl RelationalOp {
    pub fn symbol(self) -> &'static str {
        match self {
            RelationalOp::Equals => "==",
            RelationalOp::NotEquals => "!=",
            RelationalOp::LessThan => "<",
            RelationalOp::LessThanOrEqual => "<=",
            RelationalOp::GreaterThan => ">",
            RelationalOp::GreaterThanOrEqual => ">=",
        }
    }
}

impl fmt::Display for RelationalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Writes `[a, b, c]` using the display form of each item.
pub(crate) fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "]")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Ref { name, .. } => write!(f, "[Ref {}]", name),
            Expression::Lit { value, .. } => write!(f, "[Lit {}]", value.repr()),
            Expression::Not { expression, .. } => write!(f, "[Not {}]", expression),
            Expression::Call { func, args } => {
                write!(f, "[Call {} ", func)?;
                write_list(f, args)?;
                write!(f, "]")
            }
            Expression::Binary { op, lhs, rhs, .. } => write!(f, "[{} {} {}]", op, lhs, rhs),
            Expression::Assign {
                variable,
                expression,
                ..
            } => write!(f, "[Assign {} {}]", variable, expression),
            Expression::Var {
                variable,
                expression,
                mutable,
                ..
            } => {
                let keyword = if *mutable { "Var" } else { "Val" };
                write!(f, "[{} {} {}]", keyword, variable, expression)
            }
            Expression::If {
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
            Expression::While {
                condition, body, ..
            } => write!(f, "[While {} {}]", condition, body),
            Expression::ExpressionList { expressions, .. } => {
                write!(f, "[ExpressionList ")?;
                write_list(f, expressions)?;
                write!(f, "]")
            }
        }
    }
}

/// `fun name(args): returnType = body`
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub args: Vec<(String, Type)>,
    /// Inferred from the body when omitted
    pub return_type: Option<Type>,
    pub body: Expression,
}

impl fmt::Display for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|(name, ty)| format!("({}, {})", name, ty))
            .collect();
        let return_type = self
            .return_type
            .as_ref()
            .map_or_else(|| "null".to_string(), Type::to_string);
        write!(
            f,
            "FunctionDefinition(name={}, args=[{}], returnType={}, body={})",
            self.name,
            args.join(", "),
            return_type,
            self.body
        )
    }
}

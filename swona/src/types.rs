//! Type representation

use std::fmt;

use crate::ast::RelationalOp;

/// Static types of the language
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    String,
    Int,
    Boolean,
    Unit,
    Function(FunctionType),
    Array(Box<Type>),
}

/// Signature of a function: argument types and return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub argument_types: Vec<Type>,
    pub return_type: Box<Type>,
}

impl FunctionType {
    pub fn new(argument_types: Vec<Type>, return_type: Type) -> Self {
        Self {
            argument_types,
            return_type: Box::new(return_type),
        }
    }
}

impl Type {
    pub fn function(argument_types: Vec<Type>, return_type: Type) -> Self {
        Type::Function(FunctionType::new(argument_types, return_type))
    }

    pub fn array(element_type: Type) -> Self {
        Type::Array(Box::new(element_type))
    }

    /// Can values of this type be compared with `op`?
    pub fn supports(&self, op: RelationalOp) -> bool {
        match self {
            Type::Unit | Type::Function(_) => false,
            Type::Array(_) => matches!(op, RelationalOp::Equals | RelationalOp::NotEquals),
            Type::String | Type::Int | Type::Boolean => true,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::String => write!(f, "String"),
            Type::Int => write!(f, "Int"),
            Type::Boolean => write!(f, "Boolean"),
            Type::Unit => write!(f, "Unit"),
            Type::Array(element) => write!(f, "Array<{}>", element),
            Type::Function(function) => write!(f, "{}", function),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.argument_types.iter().map(|t| t.to_string()).collect();
        write!(f, "({}) -> {}", args.join(", "), self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_type_to_string() {
        assert_eq!(Type::String.to_string(), "String");
        assert_eq!(Type::Int.to_string(), "Int");
        assert_eq!(Type::Boolean.to_string(), "Boolean");
        assert_eq!(Type::Unit.to_string(), "Unit");
    }

    #[test]
    fn test_function_type_to_string() {
        assert_eq!(Type::function(vec![], Type::String).to_string(), "() -> String");
        assert_eq!(
            Type::function(vec![Type::Int], Type::Boolean).to_string(),
            "(Int) -> Boolean"
        );
        assert_eq!(
            Type::function(vec![Type::String, Type::Boolean], Type::Int).to_string(),
            "(String, Boolean) -> Int"
        );
    }

    #[test]
    fn test_array_type_to_string() {
        assert_eq!(Type::array(Type::String).to_string(), "Array<String>");
        assert_eq!(
            Type::array(Type::array(Type::String)).to_string(),
            "Array<Array<String>>"
        );
    }

    #[test]
    fn test_supported_operators() {
        assert!(Type::Int.supports(RelationalOp::LessThan));
        assert!(Type::String.supports(RelationalOp::GreaterThanOrEqual));
        assert!(!Type::Unit.supports(RelationalOp::Equals));
        assert!(!Type::function(vec![], Type::Unit).supports(RelationalOp::Equals));
        assert!(Type::array(Type::Int).supports(RelationalOp::NotEquals));
        assert!(!Type::array(Type::Int).supports(RelationalOp::LessThan));
    }
}

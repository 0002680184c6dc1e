//! Runtime values

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::RelationalOp;
use crate::error::{Error, InternalError, RuntimeError};
use crate::types::{FunctionType, Type};

/// A value manipulated by running programs.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    String(String),
    Bool(bool),
    Integer(i64),
    Function(Function),
    Array { elements: ArrayRef, element_type: Type },
    /// Return address stored in a call frame. Never visible to programs.
    Pointer(CodePointer),
}

/// Callable values
#[derive(Debug, Clone)]
pub enum Function {
    /// Function implemented in bytecode stored in the global code segment
    Compound {
        address: usize,
        code_size: usize,
        name: String,
        signature: FunctionType,
    },
    /// Function implemented by the host
    Native(Rc<NativeFunction>),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Compound { name, .. } => name,
            Function::Native(native) => &native.name,
        }
    }

    pub fn signature(&self) -> &FunctionType {
        match self {
            Function::Compound { signature, .. } => signature,
            Function::Native(native) => &native.signature,
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Function::Compound {
                    address: a1,
                    code_size: s1,
                    name: n1,
                    signature: t1,
                },
                Function::Compound {
                    address: a2,
                    code_size: s2,
                    name: n2,
                    signature: t2,
                },
            ) => a1 == a2 && s1 == s2 && n1 == n2 && t1 == t2,
            (Function::Native(f1), Function::Native(f2)) => Rc::ptr_eq(f1, f2),
            _ => false,
        }
    }
}

type NativeCallable = dyn Fn(&[Value]) -> Result<Value, RuntimeError>;

/// A host function exposed to programs with a fixed signature.
pub struct NativeFunction {
    pub name: String,
    pub signature: FunctionType,
    func: Box<NativeCallable>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        signature: FunctionType,
        func: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            func: Box::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Shared, mutable array storage. Two arrays are equal only if they are the
/// same array.
#[derive(Debug, Clone)]
pub struct ArrayRef(Rc<RefCell<Vec<Value>>>);

impl ArrayRef {
    pub fn new(elements: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(elements)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Replaces the element at `index`, returning false if it is out of range.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }
}

impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Target of a stored return address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePointer {
    Address(usize),
    /// Returning here ends the evaluation
    Quit,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (
                Value::Array {
                    elements: a,
                    element_type: t1,
                },
                Value::Array {
                    elements: b,
                    element_type: t2,
                },
            ) => a == b && t1 == t2,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// The static type of this value, or `None` for code pointers, which
    /// live only inside call frames.
    pub fn ty(&self) -> Option<Type> {
        Some(match self {
            Value::Unit => Type::Unit,
            Value::String(_) => Type::String,
            Value::Bool(_) => Type::Boolean,
            Value::Integer(_) => Type::Int,
            Value::Function(function) => Type::Function(function.signature().clone()),
            Value::Array { element_type, .. } => Type::array(element_type.clone()),
            Value::Pointer(_) => return None,
        })
    }

    /// Can this value be propagated as a compile-time constant?
    pub fn may_inline(&self) -> bool {
        !matches!(self, Value::Function(_) | Value::Array { .. } | Value::Pointer(_))
    }

    /// Source-like representation: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            _ => self.to_string(),
        }
    }

    /// `+` for integers, concatenation when the left side is a string.
    pub fn plus(&self, rhs: &Value) -> Result<Value, Error> {
        match (self, rhs) {
            (Value::String(lhs), rhs) => Ok(Value::String(format!("{}{}", lhs, rhs))),
            (Value::Integer(l), Value::Integer(r)) => l
                .checked_add(*r)
                .map(Value::Integer)
                .ok_or(RuntimeError::Overflow("+").into()),
            _ => Err(invalid_operands("plus", self, rhs)),
        }
    }

    pub fn minus(&self, rhs: &Value) -> Result<Value, Error> {
        self.integer_op("minus", rhs, |l, r| {
            l.checked_sub(r).ok_or(RuntimeError::Overflow("-"))
        })
    }

    pub fn times(&self, rhs: &Value) -> Result<Value, Error> {
        self.integer_op("times", rhs, |l, r| {
            l.checked_mul(r).ok_or(RuntimeError::Overflow("*"))
        })
    }

    /// Integer division, truncating toward zero.
    pub fn div(&self, rhs: &Value) -> Result<Value, Error> {
        self.integer_op("div", rhs, |l, r| {
            if r == 0 {
                Err(RuntimeError::DivisionByZero)
            } else {
                l.checked_div(r).ok_or(RuntimeError::Overflow("/"))
            }
        })
    }

    fn integer_op(
        &self,
        name: &str,
        rhs: &Value,
        op: impl Fn(i64, i64) -> Result<i64, RuntimeError>,
    ) -> Result<Value, Error> {
        match (self, rhs) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(op(*l, *r)?)),
            _ => Err(invalid_operands(name, self, rhs)),
        }
    }

    /// Ordering used by `<` and friends: strings lexicographically, integers
    /// numerically, booleans with false before true.
    pub fn less_than(&self, rhs: &Value) -> Result<bool, Error> {
        match (self, rhs) {
            (Value::String(l), Value::String(r)) => Ok(l < r),
            (Value::Integer(l), Value::Integer(r)) => Ok(l < r),
            (Value::Bool(l), Value::Bool(r)) => Ok(!l & r),
            _ => Err(invalid_operands("<", self, rhs)),
        }
    }

    /// `lhs <op> rhs` with the same semantics as the VM's comparison opcodes.
    pub fn compare(&self, op: RelationalOp, rhs: &Value) -> Result<bool, Error> {
        Ok(match op {
            RelationalOp::Equals => self == rhs,
            RelationalOp::NotEquals => self != rhs,
            RelationalOp::LessThan => self.less_than(rhs)?,
            RelationalOp::LessThanOrEqual => self.less_than(rhs)? || self == rhs,
            RelationalOp::GreaterThan => rhs.less_than(self)?,
            RelationalOp::GreaterThanOrEqual => rhs.less_than(self)? || self == rhs,
        })
    }
}

fn invalid_operands(op: &str, lhs: &Value, rhs: &Value) -> Error {
    InternalError::Vm(format!("operation '{}' invalid for {} and {}", op, lhs, rhs)).into()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::String(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Function(function) => {
                let signature = function.signature();
                let args: Vec<String> = signature
                    .argument_types
                    .iter()
                    .map(|t| t.to_string())
                    .collect();
                write!(
                    f,
                    "fun {}({}): {}",
                    function.name(),
                    args.join(", "),
                    signature.return_type
                )
            }
            Value::Array { elements, .. } => {
                let items: Vec<String> = elements.to_vec().iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Pointer(CodePointer::Address(address)) => write!(f, "Pointer.Code({})", address),
            Value::Pointer(CodePointer::Quit) => write!(f, "Pointer.Code(-1)"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

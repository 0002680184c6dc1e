//! Built-in native functions

use crate::error::{Result, RuntimeError};
use crate::evaluator::Evaluator;
use crate::types::{FunctionType, Type};
use crate::value::{ArrayRef, NativeFunction, Value};

/// Native function of one argument.
pub fn fun1(
    name: &str,
    arg: Type,
    return_type: Type,
    f: impl Fn(&Value) -> Result<Value, RuntimeError> + 'static,
) -> NativeFunction {
    let fname = name.to_string();
    NativeFunction::new(
        name,
        FunctionType::new(vec![arg], return_type),
        move |args| match args {
            [a] => f(a),
            _ => Err(arity_mismatch(&fname, 1, args.len())),
        },
    )
}

/// Native function of two arguments.
pub fn fun2(
    name: &str,
    args: (Type, Type),
    return_type: Type,
    f: impl Fn(&Value, &Value) -> Result<Value, RuntimeError> + 'static,
) -> NativeFunction {
    let fname = name.to_string();
    NativeFunction::new(
        name,
        FunctionType::new(vec![args.0, args.1], return_type),
        move |args| match args {
            [a, b] => f(a, b),
            _ => Err(arity_mismatch(&fname, 2, args.len())),
        },
    )
}

/// Native function of three arguments.
pub fn fun3(
    name: &str,
    args: (Type, Type, Type),
    return_type: Type,
    f: impl Fn(&Value, &Value, &Value) -> Result<Value, RuntimeError> + 'static,
) -> NativeFunction {
    let fname = name.to_string();
    NativeFunction::new(
        name,
        FunctionType::new(vec![args.0, args.1, args.2], return_type),
        move |args| match args {
            [a, b, c] => f(a, b, c),
            _ => Err(arity_mismatch(&fname, 3, args.len())),
        },
    )
}

/// Bind the standard native functions. Global indices follow the order below.
pub fn register_runtime_functions(evaluator: &mut Evaluator) -> Result<()> {
    let string_array = || Type::array(Type::String);

    evaluator.bind_native(fun1("println", Type::String, Type::Unit, |s| {
        println!("{}", s);
        Ok(Value::Unit)
    }))?;

    evaluator.bind_native(fun1("error", Type::String, Type::Unit, |message| {
        Err(RuntimeError::Failure(as_string(message)?.to_string()))
    }))?;

    evaluator.bind_native(fun2(
        "stringArrayOfSize",
        (Type::Int, Type::String),
        string_array(),
        |size, initial| {
            let size = as_int(size)?;
            let invalid_size = || RuntimeError::Failure(format!("invalid array size {}", size));
            let length = usize::try_from(size).map_err(|_| invalid_size())?;
            let mut elements = Vec::new();
            elements
                .try_reserve_exact(length)
                .map_err(|_| invalid_size())?;
            elements.resize(length, initial.clone());
            Ok(Value::Array {
                elements: ArrayRef::new(elements),
                element_type: Type::String,
            })
        },
    ))?;

    evaluator.bind_native(fun1(
        "stringArrayLength",
        string_array(),
        Type::Int,
        |array| Ok(Value::Integer(as_array(array)?.len() as i64)),
    ))?;

    evaluator.bind_native(fun2(
        "stringArrayGet",
        (string_array(), Type::Int),
        Type::String,
        |array, index| {
            let elements = as_array(array)?;
            let index = as_int(index)?;
            checked_index(elements, index)
                .and_then(|i| elements.get(i))
                .ok_or(RuntimeError::IndexOutOfBounds {
                    index,
                    length: elements.len(),
                })
        },
    ))?;

    evaluator.bind_native(fun3(
        "stringArraySet",
        (string_array(), Type::Int, Type::String),
        Type::Unit,
        |array, index, value| {
            let elements = as_array(array)?;
            let index = as_int(index)?;
            match checked_index(elements, index) {
                Some(i) if elements.set(i, value.clone()) => Ok(Value::Unit),
                _ => Err(RuntimeError::IndexOutOfBounds {
                    index,
                    length: elements.len(),
                }),
            }
        },
    ))?;

    Ok(())
}

fn checked_index(elements: &ArrayRef, index: i64) -> Option<usize> {
    usize::try_from(index).ok().filter(|i| *i < elements.len())
}

fn as_string(value: &Value) -> Result<&str, RuntimeError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(unexpected("String", other)),
    }
}

fn as_int(value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Integer(i) => Ok(*i),
        other => Err(unexpected("Int", other)),
    }
}

fn as_array(value: &Value) -> Result<&ArrayRef, RuntimeError> {
    match value {
        Value::Array { elements, .. } => Ok(elements),
        other => Err(unexpected("Array", other)),
    }
}

fn unexpected(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::Failure(format!("expected {}, but got {}", expected, got.repr()))
}

fn arity_mismatch(name: &str, expected: usize, got: usize) -> RuntimeError {
    RuntimeError::Failure(format!(
        "{} expects {} arguments, but got {}",
        name, expected, got
    ))
}

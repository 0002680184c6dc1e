//! The bytecode interpreter

use std::io::Write;

use crate::bytecode::{BinaryOperator, CodeSegment, OpCode};
use crate::error::{Error, InternalError, Result};
use crate::value::{CodePointer, Function, Value};

const INITIAL_SIZE: usize = 1024;

/// Growable storage for values. Used both for globals and as the call stack.
#[derive(Debug, Clone)]
pub struct DataSegment {
    slots: Vec<Option<Value>>,
}

impl Default for DataSegment {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSegment {
    pub fn new() -> Self {
        Self::with_size(INITIAL_SIZE)
    }

    pub fn with_size(size: usize) -> Self {
        Self {
            slots: vec![None; size.max(1)],
        }
    }

    /// Current capacity in slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// The value at `index`. Reading a slot nothing was written to is an
    /// internal error.
    pub fn get(&self, index: usize) -> Result<&Value, InternalError> {
        self.try_get(index)
            .ok_or(InternalError::UninitializedRead(index))
    }

    pub fn try_get(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if index >= self.slots.len() {
            let mut size = self.slots.len();
            while size <= index {
                size *= 2;
            }
            self.slots.resize(size, None);
        }
        self.slots[index] = Some(value);
    }
}

/// Execution state of one evaluation
pub struct ThreadState<'a> {
    code: &'a CodeSegment,
    globals: &'a mut DataSegment,
    stack: DataSegment,
    pc: usize,
    fp: usize,
    trace: Option<&'a mut dyn Write>,
}

impl<'a> ThreadState<'a> {
    pub fn new(code: &'a CodeSegment, globals: &'a mut DataSegment) -> Self {
        Self {
            code,
            globals,
            stack: DataSegment::new(),
            pc: 0,
            fp: 0,
            trace: None,
        }
    }

    /// Write every executed instruction to `out`.
    pub fn with_trace(mut self, out: &'a mut dyn Write) -> Self {
        self.trace = Some(out);
        self
    }

    /// Run from `address` in a fresh frame until the top-level return.
    pub fn run(mut self, address: usize) -> Result<Value> {
        self.pc = address;
        self.fp = 0;
        self.stack.set(0, Value::Pointer(CodePointer::Quit));

        let code = self.code;
        loop {
            let op = code
                .get(self.pc)
                .ok_or_else(|| vm_error(format!("program counter out of range: {}", self.pc)))?;

            if let Some(out) = self.trace.as_mut() {
                writeln!(out, "{:>4}: {:<40} [fp={}]", self.pc, op.to_string(), self.fp)
                    .map_err(|e| vm_error(format!("failed to write trace: {}", e)))?;
            }

            self.pc += 1;
            if let Some(result) = self.step(op)? {
                return Ok(result);
            }
        }
    }

    /// Execute one opcode. Returns the result when the program halts.
    fn step(&mut self, op: &OpCode) -> Result<Option<Value>> {
        match op {
            OpCode::Not { target, source } => match self.load(*source)? {
                Value::Bool(b) => {
                    let negated = Value::Bool(!b);
                    self.store(*target, negated);
                }
                value => return Err(vm_error(format!("can't negate {}", value))),
            },

            OpCode::Binary {
                op,
                target,
                lhs,
                rhs,
            } => {
                let result = evaluate_binary(*op, self.load(*lhs)?, self.load(*rhs)?)?;
                self.store(*target, result);
            }

            OpCode::Nop => {}

            OpCode::Call {
                offset,
                argument_count,
            } => self.call(*offset, *argument_count)?,

            OpCode::RestoreFrame(delta) => {
                self.fp = self
                    .fp
                    .checked_sub(*delta)
                    .ok_or_else(|| vm_error("frame pointer below zero".into()))?;
            }

            OpCode::Ret {
                value,
                return_address,
            } => {
                let address = self.load(*return_address)?.clone();
                let result = self.load(*value)?.clone();
                self.store(0, result.clone());
                match address {
                    Value::Pointer(CodePointer::Quit) => return Ok(Some(result)),
                    Value::Pointer(CodePointer::Address(address)) => self.pc = address,
                    other => return Err(vm_error(format!("invalid return address {}", other))),
                }
            }

            OpCode::Copy { target, source, .. } => {
                let value = self.load(*source)?.clone();
                self.store(*target, value);
            }

            OpCode::LoadConstant { target, value } => self.store(*target, value.clone()),

            OpCode::LoadGlobal { target, global, .. } => {
                let value = self.globals.get(*global)?.clone();
                self.store(*target, value);
            }

            OpCode::StoreGlobal { global, source, .. } => {
                let value = self.load(*source)?.clone();
                self.globals.set(*global, value);
            }

            OpCode::Jump(address) => self.pc = *address,

            OpCode::JumpIfFalse { condition, address } => match self.load(*condition)? {
                Value::Bool(false) => self.pc = *address,
                Value::Bool(true) => {}
                value => return Err(vm_error(format!("expected boolean condition, got {}", value))),
            },
        }
        Ok(None)
    }

    fn call(&mut self, offset: usize, argument_count: usize) -> Result<()> {
        let frame_start = offset
            .checked_sub(argument_count)
            .ok_or_else(|| vm_error(format!("{} arguments below offset {}", argument_count, offset)))?;

        match self.load(offset)?.clone() {
            Value::Function(Function::Compound { address, .. }) => {
                self.store(offset, Value::Pointer(CodePointer::Address(self.pc)));
                self.fp += frame_start;
                self.pc = address;
            }
            Value::Function(Function::Native(native)) => {
                self.fp += frame_start;
                let args = (0..argument_count)
                    .map(|i| self.load(i).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                let result = native.call(&args)?;
                self.store(0, result);
            }
            value => return Err(vm_error(format!("can't call {}", value))),
        }
        Ok(())
    }

    fn load(&self, offset: usize) -> Result<&Value, InternalError> {
        self.stack.get(self.fp + offset)
    }

    fn store(&mut self, offset: usize, value: Value) {
        self.stack.set(self.fp + offset, value);
    }
}

fn evaluate_binary(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value> {
    Ok(match op {
        BinaryOperator::Add | BinaryOperator::ConcatString => lhs.plus(rhs)?,
        BinaryOperator::Subtract => lhs.minus(rhs)?,
        BinaryOperator::Multiply => lhs.times(rhs)?,
        BinaryOperator::Divide => lhs.div(rhs)?,
        BinaryOperator::Equal => Value::Bool(lhs == rhs),
        BinaryOperator::LessThan => Value::Bool(lhs.less_than(rhs)?),
        BinaryOperator::LessThanOrEqual => Value::Bool(lhs.less_than(rhs)? || lhs == rhs),
    })
}

fn vm_error(message: String) -> Error {
    InternalError::Vm(message).into()
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::error::RuntimeError;
    use crate::types::FunctionType;
    use crate::types::Type;
    use crate::value::NativeFunction;

    fn constant(target: usize, value: impl Into<Value>) -> OpCode {
        OpCode::LoadConstant {
            target,
            value: value.into(),
        }
    }

    fn ret(value: usize) -> OpCode {
        OpCode::Ret {
            value,
            return_address: 0,
        }
    }

    fn run(ops: Vec<OpCode>) -> Result<Value> {
        let code = CodeSegment::new(ops);
        let mut globals = DataSegment::new();
        ThreadState::new(&code, &mut globals).run(0)
    }

    #[test]
    fn test_data_segment_grows() {
        let mut data = DataSegment::with_size(2);
        data.set(5, Value::Integer(1));
        assert_eq!(data.size(), 8);
        assert_eq!(data.get(5).unwrap(), &Value::Integer(1));
        assert_eq!(data.get(4), Err(InternalError::UninitializedRead(4)));
        assert_eq!(data.get(100), Err(InternalError::UninitializedRead(100)));
    }

    #[test]
    fn test_arithmetic() {
        let result = run(vec![
            constant(1, 7),
            constant(2, 2),
            OpCode::Binary {
                op: BinaryOperator::Divide,
                target: 1,
                lhs: 1,
                rhs: 2,
            },
            ret(1),
        ]);
        assert_eq!(result.unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_division_by_zero_is_runtime_error() {
        let result = run(vec![
            constant(1, 1),
            constant(2, 0),
            OpCode::Binary {
                op: BinaryOperator::Divide,
                target: 1,
                lhs: 1,
                rhs: 2,
            },
            ret(1),
        ]);
        assert!(matches!(
            result,
            Err(Error::Runtime(RuntimeError::DivisionByZero))
        ));
    }

    #[test]
    fn test_conditional_jump() {
        let result = run(vec![
            constant(1, false),
            OpCode::JumpIfFalse {
                condition: 1,
                address: 4,
            },
            constant(1, "then"),
            ret(1),
            constant(1, "else"),
            ret(1),
        ]);
        assert_eq!(result.unwrap(), Value::from("else"));
    }

    #[test]
    fn test_uninitialized_read_is_internal_error() {
        let result = run(vec![
            OpCode::Copy {
                target: 1,
                source: 7,
                description: "load local x".into(),
            },
            ret(1),
        ]);
        assert!(matches!(
            result,
            Err(Error::Internal(InternalError::UninitializedRead(7)))
        ));
    }

    #[test]
    fn test_type_mismatch_is_internal_error() {
        let result = run(vec![
            constant(1, 1),
            OpCode::Not {
                target: 1,
                source: 1,
            },
            ret(1),
        ]);
        assert!(matches!(result, Err(Error::Internal(InternalError::Vm(_)))));
    }

    #[test]
    fn test_native_call() {
        let add = NativeFunction::new(
            "add",
            FunctionType::new(vec![Type::Int, Type::Int], Type::Int),
            |args| match args {
                [Value::Integer(a), Value::Integer(b)] => Ok(Value::Integer(a + b)),
                _ => Err(RuntimeError::Failure("bad arguments".into())),
            },
        );
        let result = run(vec![
            constant(1, 40),
            constant(2, 2),
            constant(3, Value::Function(Function::Native(Rc::new(add)))),
            OpCode::Call {
                offset: 3,
                argument_count: 2,
            },
            OpCode::RestoreFrame(1),
            ret(1),
        ]);
        assert_eq!(result.unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_native_failure_is_runtime_error() {
        let fail = NativeFunction::new("fail", FunctionType::new(vec![], Type::Unit), |_| {
            Err(RuntimeError::Failure("boom".into()))
        });
        let result = run(vec![
            constant(1, Value::Function(Function::Native(Rc::new(fail)))),
            OpCode::Call {
                offset: 1,
                argument_count: 0,
            },
            OpCode::RestoreFrame(1),
            ret(1),
        ]);
        assert!(matches!(
            result,
            Err(Error::Runtime(RuntimeError::Failure(msg))) if msg == "boom"
        ));
    }

    #[test]
    fn test_compound_call() {
        // fun double(x: Int): Int = x + x, at address 0
        let double = Value::Function(Function::Compound {
            address: 0,
            code_size: 4,
            name: "double".into(),
            signature: FunctionType::new(vec![Type::Int], Type::Int),
        });
        let code = CodeSegment::new(vec![
            OpCode::Copy {
                target: 2,
                source: 0,
                description: "load arg x".into(),
            },
            OpCode::Copy {
                target: 3,
                source: 0,
                description: "load arg x".into(),
            },
            OpCode::Binary {
                op: BinaryOperator::Add,
                target: 2,
                lhs: 2,
                rhs: 3,
            },
            OpCode::Ret {
                value: 2,
                return_address: 1,
            },
            // top level: double(21)
            constant(1, 21),
            constant(2, double),
            OpCode::Call {
                offset: 2,
                argument_count: 1,
            },
            OpCode::RestoreFrame(1),
            ret(1),
        ]);
        let mut globals = DataSegment::new();
        let mut trace = Vec::new();
        let result = ThreadState::new(&code, &mut globals)
            .with_trace(&mut trace)
            .run(4)
            .unwrap();
        assert_eq!(result, Value::Integer(42));

        let trace = String::from_utf8(trace).unwrap();
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines.len(), 9);
        assert_eq!(
            lines[0],
            format!("   4: {:<40} [fp=0]", "stack[fp+1] = 21")
        );
        assert_eq!(
            lines[3],
            format!("   0: {:<40} [fp=1]", "stack[fp+2] = stack[fp+0] ; load arg x")
        );
    }

    #[test]
    fn test_globals() {
        let code = CodeSegment::new(vec![
            constant(1, "hello"),
            OpCode::StoreGlobal {
                global: 3,
                source: 1,
                name: "s".into(),
            },
            OpCode::LoadGlobal {
                target: 1,
                global: 3,
                name: "s".into(),
            },
            ret(1),
        ]);
        let mut globals = DataSegment::new();
        let result = ThreadState::new(&code, &mut globals).run(0).unwrap();
        assert_eq!(result, Value::from("hello"));
        assert_eq!(globals.try_get(3), Some(&Value::from("hello")));
    }
}

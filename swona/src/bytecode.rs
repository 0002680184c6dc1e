//! Bytecode and its translation from IR
//!
//! Opcodes address values relative to the frame pointer. A frame of a
//! function taking `n` arguments is laid out as
//!
//! ```text
//! fp+0 .. fp+n-1    arguments
//! fp+n              return address
//! fp+n+1 ..         locals, then the operand stack
//! ```
//!
//! The caller pushes the arguments and the function, so the callee's frame
//! starts where the caller's first argument is. The return value is written
//! to `fp+0`.

use std::collections::HashMap;
use std::fmt;

use crate::error::InternalError;
use crate::ir::{BasicBlockGraph, BlockEnd, BlockId, Ir, LocalFrameIr};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    LessThan,
    LessThanOrEqual,
    ConcatString,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Equal => "==",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::ConcatString => "++",
        }
    }
}

/// A single VM instruction. Offsets are relative to the frame pointer.
#[derive(Debug, Clone, PartialEq)]
pub enum OpCode {
    Not {
        target: usize,
        source: usize,
    },
    Binary {
        op: BinaryOperator,
        target: usize,
        lhs: usize,
        rhs: usize,
    },
    Nop,
    Call {
        offset: usize,
        argument_count: usize,
    },
    /// Move the frame pointer back down after a call
    RestoreFrame(usize),
    Ret {
        value: usize,
        return_address: usize,
    },
    Copy {
        target: usize,
        source: usize,
        description: String,
    },
    LoadConstant {
        target: usize,
        value: Value,
    },
    LoadGlobal {
        target: usize,
        global: usize,
        name: String,
    },
    StoreGlobal {
        global: usize,
        source: usize,
        name: String,
    },
    Jump(usize),
    JumpIfFalse {
        condition: usize,
        address: usize,
    },
}

impl OpCode {
    /// The same instruction with absolute code addresses moved by `base`.
    pub fn relocate(&self, base: usize) -> OpCode {
        match self {
            OpCode::Jump(address) => OpCode::Jump(address + base),
            OpCode::JumpIfFalse { condition, address } => OpCode::JumpIfFalse {
                condition: *condition,
                address: address + base,
            },
            op => op.clone(),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Not { target, source } => {
                write!(f, "stack[fp+{}] = !stack[fp+{}]", target, source)
            }
            OpCode::Binary {
                op,
                target,
                lhs,
                rhs,
            } => write!(
                f,
                "stack[fp+{}] = stack[fp+{}] {} stack[fp+{}]",
                target,
                lhs,
                op.symbol(),
                rhs
            ),
            OpCode::Nop => write!(f, "Nop"),
            OpCode::Call {
                offset,
                argument_count,
            } => write!(f, "call stack[fp+{}], {}", offset, argument_count),
            OpCode::RestoreFrame(delta) => write!(f, "fp = fp - {}", delta),
            OpCode::Ret {
                value,
                return_address,
            } => write!(
                f,
                "ret value=stack[fp+{}], address=stack[fp+{}]",
                value, return_address
            ),
            OpCode::Copy {
                target,
                source,
                description,
            } => write!(
                f,
                "stack[fp+{}] = stack[fp+{}] ; {}",
                target, source, description
            ),
            OpCode::LoadConstant { target, value } => {
                write!(f, "stack[fp+{}] = {}", target, value.repr())
            }
            OpCode::LoadGlobal {
                target,
                global,
                name,
            } => write!(f, "stack[fp+{}] = heap[{}] ; {}", target, global, name),
            OpCode::StoreGlobal {
                global,
                source,
                name,
            } => write!(f, "heap[{}] = stack[fp+{}] ; {}", global, source, name),
            OpCode::Jump(address) => write!(f, "jump {}", address),
            OpCode::JumpIfFalse { condition, address } => {
                write!(f, "jump-if-false stack[fp+{}] {}", condition, address)
            }
        }
    }
}

/// A flat sequence of opcodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeSegment {
    ops: Vec<OpCode>,
}

impl CodeSegment {
    pub fn new(ops: Vec<OpCode>) -> Self {
        Self { ops }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn get(&self, address: usize) -> Option<&OpCode> {
        self.ops.get(address)
    }

    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }

    /// Append `other`, relocated to follow the current code. Returns the
    /// address where it starts.
    pub fn add_relocated(&mut self, other: &CodeSegment) -> usize {
        let base = self.ops.len();
        self.ops.extend(other.ops.iter().map(|op| op.relocate(base)));
        base
    }

    /// Drop everything from `len` on.
    pub fn truncate(&mut self, len: usize) {
        self.ops.truncate(len);
    }

    /// Listing of `size` opcodes starting at `address`, with absolute addresses.
    pub fn listing(&self, address: usize, size: usize) -> String {
        self.ops
            .iter()
            .enumerate()
            .skip(address)
            .take(size)
            .map(|(i, op)| format!("{} {}", i, op))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for CodeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.listing(0, self.ops.len()))
    }
}

/// Lower `graph` into bytecode for a frame with `argument_count` arguments.
pub fn translate_to_code(
    graph: &BasicBlockGraph,
    argument_count: usize,
) -> Result<CodeSegment, InternalError> {
    OpCodeTranslator::new(graph, argument_count).translate()
}

struct OpCodeTranslator<'a> {
    graph: &'a BasicBlockGraph,
    argument_count: usize,
    local_count: usize,
}

impl<'a> OpCodeTranslator<'a> {
    fn new(graph: &'a BasicBlockGraph, argument_count: usize) -> Self {
        Self {
            graph,
            argument_count,
            local_count: graph.local_count(),
        }
    }

    fn translate(&self) -> Result<CodeSegment, InternalError> {
        let blocks = self.graph.all_blocks()?;
        let addresses = self.block_addresses(&blocks);
        let depths = self.graph.build_stack_depth_map()?;

        let mut ops = Vec::new();
        for id in blocks {
            self.translate_block(id, &addresses, &depths, &mut ops)?;
        }
        Ok(CodeSegment::new(ops))
    }

    fn block_addresses(&self, blocks: &[BlockId]) -> HashMap<BlockId, usize> {
        let mut next_free = 0;
        blocks
            .iter()
            .map(|id| {
                let address = next_free;
                next_free += self.graph.block(*id).lowered_size();
                (*id, address)
            })
            .collect()
    }

    fn translate_block(
        &self,
        id: BlockId,
        addresses: &HashMap<BlockId, usize>,
        depths: &HashMap<BlockId, usize>,
        out: &mut Vec<OpCode>,
    ) -> Result<(), InternalError> {
        let block = self.graph.block(id);
        // The return address slot adds one and addressing the top element
        // rather than the next free slot subtracts one.
        let base = self.argument_count + self.local_count;
        let depth = depths
            .get(&id)
            .ok_or_else(|| InternalError::InvalidStackUse(format!("no depth for {}", block)))?;
        let mut sp = (base + depth) as isize;

        for op in &block.ops {
            if sp < base as isize {
                return Err(InternalError::InvalidStackUse("stack underflow".into()));
            }
            out.push(self.translate_op(op, sp as usize));
            sp += op.stack_delta();
        }

        let address_of = |target: &BlockId| {
            addresses
                .get(target)
                .copied()
                .ok_or_else(|| InternalError::Translation("jump to unknown block".into()))
        };
        match &block.next {
            BlockEnd::None => {}
            BlockEnd::Jump(target) => out.push(OpCode::Jump(address_of(target)?)),
            BlockEnd::Branch {
                true_block,
                false_block,
            } => {
                out.push(OpCode::JumpIfFalse {
                    condition: sp as usize,
                    address: address_of(false_block)?,
                });
                out.push(OpCode::Jump(address_of(true_block)?));
            }
        }
        Ok(())
    }

    fn translate_op(&self, op: &Ir, sp: usize) -> OpCode {
        let binary = |op| OpCode::Binary {
            op,
            target: sp - 1,
            lhs: sp - 1,
            rhs: sp,
        };
        match op {
            Ir::Not => OpCode::Not {
                target: sp,
                source: sp,
            },
            Ir::Add => binary(BinaryOperator::Add),
            Ir::Subtract => binary(BinaryOperator::Subtract),
            Ir::Multiply => binary(BinaryOperator::Multiply),
            Ir::Divide => binary(BinaryOperator::Divide),
            Ir::Equal => binary(BinaryOperator::Equal),
            Ir::LessThan => binary(BinaryOperator::LessThan),
            Ir::LessThanOrEqual => binary(BinaryOperator::LessThanOrEqual),
            Ir::ConcatString => binary(BinaryOperator::ConcatString),
            Ir::Pop => OpCode::Nop,
            Ir::Dup => OpCode::Copy {
                target: sp + 1,
                source: sp,
                description: "dup".into(),
            },
            Ir::Call { argument_count } => OpCode::Call {
                offset: sp,
                argument_count: *argument_count,
            },
            Ir::RestoreFrame => OpCode::RestoreFrame(sp),
            Ir::Ret => OpCode::Ret {
                value: sp,
                return_address: self.return_address_offset(),
            },
            Ir::PushUnit => OpCode::LoadConstant {
                target: sp + 1,
                value: Value::Unit,
            },
            Ir::Push(value) => OpCode::LoadConstant {
                target: sp + 1,
                value: value.clone(),
            },
            Ir::LoadGlobal { index, name } => OpCode::LoadGlobal {
                target: sp + 1,
                global: *index,
                name: name.clone(),
            },
            Ir::LoadArgument { index, name } => OpCode::Copy {
                target: sp + 1,
                source: *index,
                description: format!("load arg {}", name),
            },
            Ir::StoreGlobal { index, name } => OpCode::StoreGlobal {
                global: *index,
                source: sp,
                name: name.clone(),
            },
            Ir::LocalFrame(LocalFrameIr::LoadLocal { index, name }) => OpCode::Copy {
                target: sp + 1,
                source: self.local_offset(*index),
                description: format!("load local {}", name),
            },
            Ir::LocalFrame(LocalFrameIr::StoreLocal { index, name }) => OpCode::Copy {
                target: self.local_offset(*index),
                source: sp,
                description: format!("store local {}", name),
            },
        }
    }

    fn return_address_offset(&self) -> usize {
        self.argument_count
    }

    fn local_offset(&self, index: usize) -> usize {
        self.argument_count + 1 + index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Ir {
        Ir::Push(Value::Integer(n))
    }

    #[test]
    fn test_straight_line_lowering() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        graph.push(start, int(1));
        graph.push(start, int(2));
        graph.push(start, Ir::Add);
        graph.push(start, Ir::Ret);

        let code = translate_to_code(&graph, 0).unwrap();
        assert_eq!(
            code.to_string(),
            "0 stack[fp+1] = 1\n\
             1 stack[fp+2] = 2\n\
             2 stack[fp+1] = stack[fp+1] + stack[fp+2]\n\
             3 ret value=stack[fp+1], address=stack[fp+0]"
        );
    }

    #[test]
    fn test_arguments_come_before_return_address() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        graph.push(
            start,
            Ir::LoadArgument {
                index: 1,
                name: "y".into(),
            },
        );
        graph.push(
            start,
            Ir::LocalFrame(LocalFrameIr::StoreLocal {
                index: 0,
                name: "t".into(),
            }),
        );
        graph.push(
            start,
            Ir::LocalFrame(LocalFrameIr::LoadLocal {
                index: 0,
                name: "t".into(),
            }),
        );
        graph.push(start, Ir::Ret);

        let code = translate_to_code(&graph, 2).unwrap();
        assert_eq!(
            code.to_string(),
            "0 stack[fp+4] = stack[fp+1] ; load arg y\n\
             1 stack[fp+3] = stack[fp+4] ; store local t\n\
             2 stack[fp+4] = stack[fp+3] ; load local t\n\
             3 ret value=stack[fp+4], address=stack[fp+2]"
        );
    }

    #[test]
    fn test_branch_lowering() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        let t = graph.new_block();
        let f = graph.new_block();
        let after = graph.new_block();
        graph.push(start, Ir::Push(Value::Bool(true)));
        graph.end_with_branch(start, t, f).unwrap();
        graph.push(t, int(1));
        graph.end_with_jump(t, after).unwrap();
        graph.push(f, int(2));
        graph.end_with_jump(f, after).unwrap();
        graph.push(after, Ir::Ret);

        let code = translate_to_code(&graph, 0).unwrap();
        assert_eq!(
            code.to_string(),
            "0 stack[fp+1] = true\n\
             1 jump-if-false stack[fp+1] 5\n\
             2 jump 3\n\
             3 stack[fp+1] = 1\n\
             4 jump 7\n\
             5 stack[fp+1] = 2\n\
             6 jump 7\n\
             7 ret value=stack[fp+1], address=stack[fp+0]"
        );
    }

    #[test]
    fn test_invalid_graph_is_rejected() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        graph.push(start, Ir::Pop);
        assert!(matches!(
            translate_to_code(&graph, 0),
            Err(InternalError::InvalidStackUse(_))
        ));
    }

    #[test]
    fn test_relocation() {
        let mut global = CodeSegment::new(vec![OpCode::Nop, OpCode::Nop]);
        let segment = CodeSegment::new(vec![
            OpCode::JumpIfFalse {
                condition: 1,
                address: 2,
            },
            OpCode::Jump(0),
            OpCode::LoadConstant {
                target: 1,
                value: Value::Integer(3),
            },
        ]);

        let base = global.add_relocated(&segment);
        assert_eq!(base, 2);
        assert_eq!(
            global.listing(base, segment.len()),
            "2 jump-if-false stack[fp+1] 4\n\
             3 jump 2\n\
             4 stack[fp+1] = 3"
        );

        global.truncate(base);
        assert_eq!(global.len(), 2);
    }

    #[test]
    fn test_opcode_display() {
        let cases = [
            (
                OpCode::Not {
                    target: 2,
                    source: 2,
                },
                "stack[fp+2] = !stack[fp+2]",
            ),
            (
                OpCode::Call {
                    offset: 6,
                    argument_count: 2,
                },
                "call stack[fp+6], 2",
            ),
            (OpCode::RestoreFrame(4), "fp = fp - 4"),
            (
                OpCode::LoadGlobal {
                    target: 6,
                    global: 2,
                    name: "f".into(),
                },
                "stack[fp+6] = heap[2] ; f",
            ),
            (
                OpCode::StoreGlobal {
                    global: 0,
                    source: 1,
                    name: "x".into(),
                },
                "heap[0] = stack[fp+1] ; x",
            ),
            (
                OpCode::LoadConstant {
                    target: 1,
                    value: Value::from("hi"),
                },
                "stack[fp+1] = \"hi\"",
            ),
            (
                OpCode::Binary {
                    op: BinaryOperator::ConcatString,
                    target: 1,
                    lhs: 1,
                    rhs: 2,
                },
                "stack[fp+1] = stack[fp+1] ++ stack[fp+2]",
            ),
        ];
        for (op, expected) in cases {
            assert_eq!(op.to_string(), expected);
        }
    }
}

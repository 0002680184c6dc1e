//! Stack-machine IR grouped into basic blocks
//!
//! IR instructions work on an abstract operand stack. Addresses and frame
//! offsets are still symbolic; [`crate::bytecode`] resolves them once the
//! stack depth at the start of every block is known.

use std::collections::HashMap;
use std::fmt;

use crate::error::InternalError;
use crate::value::Value;

/// A single stack-machine instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Ir {
    Not,
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    LessThan,
    LessThanOrEqual,
    ConcatString,
    Pop,
    Dup,
    /// Call the function on top of the stack with the `argument_count`
    /// values below it. The result replaces the first argument.
    Call { argument_count: usize },
    /// Return to the caller's frame after a call
    RestoreFrame,
    Ret,
    PushUnit,
    Push(Value),
    LoadGlobal { index: usize, name: String },
    LoadArgument { index: usize, name: String },
    StoreGlobal { index: usize, name: String },
    LocalFrame(LocalFrameIr),
}

/// Instructions addressing local slots of the current frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalFrameIr {
    LoadLocal { index: usize, name: String },
    StoreLocal { index: usize, name: String },
}

impl LocalFrameIr {
    pub fn stack_delta(&self) -> isize {
        match self {
            LocalFrameIr::LoadLocal { .. } => 1,
            LocalFrameIr::StoreLocal { .. } => -1,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            LocalFrameIr::LoadLocal { index, .. } | LocalFrameIr::StoreLocal { index, .. } => {
                *index
            }
        }
    }
}

impl fmt::Display for LocalFrameIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalFrameIr::LoadLocal { index, name } => write!(f, "LoadLocal {} ; {}", index, name),
            LocalFrameIr::StoreLocal { index, name } => {
                write!(f, "StoreLocal {} ; {}", index, name)
            }
        }
    }
}

impl Ir {
    /// How executing this instruction changes the depth of the stack.
    pub fn stack_delta(&self) -> isize {
        match self {
            Ir::Not => 0,
            Ir::Add
            | Ir::Subtract
            | Ir::Multiply
            | Ir::Divide
            | Ir::Equal
            | Ir::LessThan
            | Ir::LessThanOrEqual
            | Ir::ConcatString => -1,
            Ir::Pop => -1,
            Ir::Dup => 1,
            Ir::Call { argument_count } => -(*argument_count as isize),
            Ir::RestoreFrame => 0,
            Ir::Ret => -1,
            Ir::PushUnit | Ir::Push(_) => 1,
            Ir::LoadGlobal { .. } | Ir::LoadArgument { .. } => 1,
            Ir::StoreGlobal { .. } => -1,
            Ir::LocalFrame(local) => local.stack_delta(),
        }
    }
}

impl fmt::Display for Ir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ir::Not => write!(f, "Not"),
            Ir::Add => write!(f, "Add"),
            Ir::Subtract => write!(f, "Subtract"),
            Ir::Multiply => write!(f, "Multiply"),
            Ir::Divide => write!(f, "Divide"),
            Ir::Equal => write!(f, "Equal"),
            Ir::LessThan => write!(f, "LessThan"),
            Ir::LessThanOrEqual => write!(f, "LessThanOrEqual"),
            Ir::ConcatString => write!(f, "ConcatString"),
            Ir::Pop => write!(f, "Pop"),
            Ir::Dup => write!(f, "Dup"),
            Ir::Call { .. } => write!(f, "Call"),
            Ir::RestoreFrame => write!(f, "RestoreFrame"),
            Ir::Ret => write!(f, "Ret"),
            Ir::PushUnit => write!(f, "PushUnit"),
            Ir::Push(value) => write!(f, "Push {}", value.repr()),
            Ir::LoadGlobal { index, name } => write!(f, "LoadGlobal {} ; {}", index, name),
            Ir::LoadArgument { index, name } => write!(f, "LoadArgument {} ; {}", index, name),
            Ir::StoreGlobal { index, name } => write!(f, "StoreGlobal {} ; {}", index, name),
            Ir::LocalFrame(local) => write!(f, "{}", local),
        }
    }
}

/// Index of a block inside its [`BasicBlockGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

/// How control leaves a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockEnd {
    /// Falls off the end of the graph
    #[default]
    None,
    Jump(BlockId),
    /// Pops a boolean and continues in one of the two blocks
    Branch {
        true_block: BlockId,
        false_block: BlockId,
    },
}

impl BlockEnd {
    pub fn stack_delta(&self) -> isize {
        match self {
            BlockEnd::None | BlockEnd::Jump(_) => 0,
            BlockEnd::Branch { .. } => -1,
        }
    }

    /// Successors, true branch first.
    pub fn successors(&self) -> Vec<BlockId> {
        match *self {
            BlockEnd::None => Vec::new(),
            BlockEnd::Jump(target) => vec![target],
            BlockEnd::Branch {
                true_block,
                false_block,
            } => vec![true_block, false_block],
        }
    }

    /// Number of opcodes the terminator lowers to.
    pub fn lowered_size(&self) -> usize {
        match self {
            BlockEnd::None => 0,
            BlockEnd::Jump(_) => 1,
            BlockEnd::Branch { .. } => 2,
        }
    }
}

impl fmt::Display for BlockEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockEnd::None => write!(f, "None"),
            BlockEnd::Jump(_) => write!(f, "Jump"),
            BlockEnd::Branch { .. } => write!(f, "Branch"),
        }
    }
}

/// Straight-line sequence of instructions with a single exit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicBlock {
    pub ops: Vec<Ir>,
    pub next: BlockEnd,
}

impl BasicBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Ir) {
        self.ops.push(op);
    }

    /// How executing this block, terminator included, changes the stack depth.
    pub fn stack_delta(&self) -> isize {
        self.ops.iter().map(Ir::stack_delta).sum::<isize>() + self.next.stack_delta()
    }

    /// Highest local slot touched by this block.
    pub fn max_local_index(&self) -> Option<usize> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Ir::LocalFrame(local) => Some(local.index()),
                _ => None,
            })
            .max()
    }

    /// Number of opcodes this block lowers to.
    pub fn lowered_size(&self) -> usize {
        self.ops.len() + self.next.lowered_size()
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.ops {
            write!(f, "{}; ", op)?;
        }
        write!(f, "{}", self.next)
    }
}

/// Control-flow graph of one function or top-level expression.
///
/// Blocks live in an arena and refer to each other by [`BlockId`]. Block 0
/// is the entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlockGraph {
    blocks: Vec<BasicBlock>,
}

impl Default for BasicBlockGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicBlockGraph {
    pub fn new() -> Self {
        Self {
            blocks: vec![BasicBlock::new()],
        }
    }

    pub fn start(&self) -> BlockId {
        BlockId(0)
    }

    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::new());
        BlockId(self.blocks.len() - 1)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    pub fn push(&mut self, id: BlockId, op: Ir) {
        self.block_mut(id).push(op);
    }

    pub fn end_with_jump(&mut self, id: BlockId, target: BlockId) -> Result<(), InternalError> {
        self.terminate(id, BlockEnd::Jump(target))
    }

    pub fn end_with_branch(
        &mut self,
        id: BlockId,
        true_block: BlockId,
        false_block: BlockId,
    ) -> Result<(), InternalError> {
        self.terminate(
            id,
            BlockEnd::Branch {
                true_block,
                false_block,
            },
        )
    }

    fn terminate(&mut self, id: BlockId, next: BlockEnd) -> Result<(), InternalError> {
        let block = self.block_mut(id);
        if block.next != BlockEnd::None {
            return Err(InternalError::Translation(format!(
                "block {} already ends with {}",
                id.0, block.next
            )));
        }
        block.next = next;
        Ok(())
    }

    /// Blocks reachable from the start, in depth-first preorder with the
    /// true branch explored first.
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut pending = vec![self.start()];

        while let Some(id) = pending.pop() {
            if visited[id.0] {
                continue;
            }
            visited[id.0] = true;
            order.push(id);
            pending.extend(self.block(id).next.successors().into_iter().rev());
        }
        order
    }

    /// The single reachable block that falls off the end of the graph.
    pub fn end(&self) -> Result<BlockId, InternalError> {
        let mut ends = self
            .reachable_blocks()
            .into_iter()
            .filter(|id| self.block(*id).next == BlockEnd::None);
        match (ends.next(), ends.next()) {
            (Some(end), None) => Ok(end),
            _ => Err(InternalError::Translation("no unique end block".into())),
        }
    }

    /// Reachable blocks in layout order: depth-first, with the end block last.
    pub fn all_blocks(&self) -> Result<Vec<BlockId>, InternalError> {
        let end = self.end()?;
        let mut blocks: Vec<BlockId> = self
            .reachable_blocks()
            .into_iter()
            .filter(|id| *id != end)
            .collect();
        blocks.push(end);
        Ok(blocks)
    }

    /// Number of local slots used by the frame.
    pub fn local_count(&self) -> usize {
        self.reachable_blocks()
            .into_iter()
            .filter_map(|id| self.block(id).max_local_index())
            .map(|index| index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Stack depth at the start of every block.
    ///
    /// Every path into a block must arrive with the same depth, the depth
    /// may never go below zero, and the end block must leave it at zero.
    /// Anything else is a bug in the translator or an optimization.
    pub fn build_stack_depth_map(&self) -> Result<HashMap<BlockId, usize>, InternalError> {
        let mut depths: HashMap<BlockId, isize> = HashMap::new();
        depths.insert(self.start(), 0);

        let blocks = self.all_blocks()?;
        for id in &blocks {
            let block = self.block(*id);
            let start_depth = *depths.get(id).ok_or_else(|| {
                InternalError::InvalidStackUse(format!("no depth assigned for {}", block))
            })?;

            let mut depth = start_depth;
            for op in &block.ops {
                depth += op.stack_delta();
                if depth < 0 {
                    return Err(InternalError::InvalidStackUse(format!(
                        "stack underflow at {} in {}",
                        op, block
                    )));
                }
            }
            let end_depth = depth + block.next.stack_delta();

            for next in block.next.successors() {
                match depths.get(&next) {
                    None => {
                        depths.insert(next, end_depth);
                    }
                    Some(&expected) if expected != end_depth => {
                        return Err(InternalError::InvalidStackUse(format!(
                            "expected {}, but got {} for {} -> {}",
                            expected,
                            end_depth,
                            block,
                            self.block(next)
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        let end = self.end()?;
        let end_depth = depths.get(&end).copied().unwrap_or(0) + self.block(end).stack_delta();
        if end_depth != 0 {
            return Err(InternalError::InvalidStackUse(format!(
                "invalid end depth for stack: {}",
                end_depth
            )));
        }

        Ok(depths
            .into_iter()
            .map(|(id, depth)| (id, depth as usize))
            .collect())
    }

    /// Apply `f` to every reachable block.
    pub fn for_each_block_mut(&mut self, mut f: impl FnMut(&mut BasicBlock)) {
        for id in self.reachable_blocks() {
            f(self.block_mut(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(n: i64) -> Ir {
        Ir::Push(Value::Integer(n))
    }

    #[test]
    fn test_stack_delta() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        assert_eq!(graph.block(start).stack_delta(), 0);

        graph.push(start, push(42));
        assert_eq!(graph.block(start).stack_delta(), 1);
        graph.push(start, push(1));
        assert_eq!(graph.block(start).stack_delta(), 2);
        graph.push(start, push(42));
        assert_eq!(graph.block(start).stack_delta(), 3);
        graph.push(start, Ir::Add);
        assert_eq!(graph.block(start).stack_delta(), 2);

        let t = graph.new_block();
        let f = graph.new_block();
        graph.end_with_branch(start, t, f).unwrap();
        assert_eq!(graph.block(start).stack_delta(), 1);
    }

    #[test]
    fn test_local_variable_offsets() {
        let mut block = BasicBlock::new();
        assert_eq!(block.max_local_index(), None);

        block.push(Ir::LocalFrame(LocalFrameIr::LoadLocal {
            index: 0,
            name: "square".into(),
        }));
        block.push(Ir::LocalFrame(LocalFrameIr::StoreLocal {
            index: 1,
            name: "sq".into(),
        }));
        assert_eq!(block.max_local_index(), Some(1));
    }

    #[test]
    fn test_local_count_spans_blocks() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        let next = graph.new_block();
        graph.push(
            next,
            Ir::LocalFrame(LocalFrameIr::LoadLocal {
                index: 2,
                name: "x".into(),
            }),
        );
        graph.end_with_jump(start, next).unwrap();
        assert_eq!(graph.local_count(), 3);
        assert_eq!(BasicBlockGraph::new().local_count(), 0);
    }

    #[test]
    fn test_jump_backwards_does_not_maintain_balance() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        let end = graph.new_block();
        graph.push(start, push(42));
        graph.push(start, push(42));
        graph.end_with_branch(start, start, end).unwrap();
        graph.push(end, push(42));

        assert!(matches!(
            graph.build_stack_depth_map(),
            Err(InternalError::InvalidStackUse(_))
        ));
    }

    #[test]
    fn test_stack_underflow() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        graph.push(start, Ir::Pop);

        assert!(matches!(
            graph.build_stack_depth_map(),
            Err(InternalError::InvalidStackUse(_))
        ));
    }

    #[test]
    fn test_underflow_hidden_by_later_push() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        graph.push(start, Ir::Pop);
        graph.push(start, push(1));
        graph.push(start, Ir::Ret);

        let err = graph.build_stack_depth_map().unwrap_err();
        assert!(err.to_string().contains("stack underflow"), "{}", err);
    }

    #[test]
    fn test_imbalanced_branches() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        let t = graph.new_block();
        let f = graph.new_block();
        let after = graph.new_block();
        graph.push(start, Ir::Push(Value::Bool(true)));
        graph.end_with_branch(start, t, f).unwrap();
        graph.push(t, push(1));
        graph.end_with_jump(t, after).unwrap();
        graph.push(f, push(1));
        graph.push(f, push(2));
        graph.end_with_jump(f, after).unwrap();
        graph.push(after, Ir::Ret);

        let err = graph.build_stack_depth_map().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid stack use: expected 1, but got 2 for Push 1; Push 2; Jump -> Ret; None"
        );
    }

    #[test]
    fn test_balanced_branches() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        let t = graph.new_block();
        let f = graph.new_block();
        let after = graph.new_block();
        graph.push(start, Ir::Push(Value::Bool(true)));
        graph.end_with_branch(start, t, f).unwrap();
        graph.push(t, push(1));
        graph.end_with_jump(t, after).unwrap();
        graph.push(f, push(2));
        graph.end_with_jump(f, after).unwrap();
        graph.push(after, Ir::Ret);

        let depths = graph.build_stack_depth_map().unwrap();
        assert_eq!(depths[&start], 0);
        assert_eq!(depths[&t], 0);
        assert_eq!(depths[&f], 0);
        assert_eq!(depths[&after], 1);
        assert_eq!(graph.all_blocks().unwrap(), vec![start, t, f, after]);
    }

    #[test]
    fn test_invalid_end_depth() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        graph.push(start, push(1));
        graph.push(start, push(2));
        graph.push(start, Ir::Ret);

        let err = graph.build_stack_depth_map().unwrap_err();
        assert_eq!(err.to_string(), "invalid stack use: invalid end depth for stack: 1");
    }

    #[test]
    fn test_end_block_is_laid_out_last() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        let head = graph.new_block();
        let body = graph.new_block();
        let after = graph.new_block();
        graph.end_with_jump(start, head).unwrap();
        graph.push(head, Ir::Push(Value::Bool(false)));
        graph.end_with_branch(head, after, body).unwrap();
        graph.end_with_jump(body, head).unwrap();

        assert_eq!(graph.all_blocks().unwrap(), vec![start, head, body, after]);
    }

    #[test]
    fn test_block_can_only_be_terminated_once() {
        let mut graph = BasicBlockGraph::new();
        let start = graph.start();
        let next = graph.new_block();
        graph.end_with_jump(start, next).unwrap();
        assert!(graph.end_with_jump(start, next).is_err());
    }

    #[test]
    fn test_display() {
        let mut block = BasicBlock::new();
        block.push(Ir::Push(Value::from("s")));
        block.push(Ir::LoadGlobal {
            index: 3,
            name: "f".into(),
        });
        block.push(Ir::Call { argument_count: 1 });
        assert_eq!(block.to_string(), "Push \"s\"; LoadGlobal 3 ; f; Call; None");
    }
}

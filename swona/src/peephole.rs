//! Peephole optimization of IR blocks
//!
//! Each rewrite looks at a fixed-size window of adjacent instructions. A
//! pass slides every window over the block once; passes repeat until one
//! changes nothing.

use tracing::trace;

use crate::ir::{BasicBlock, BasicBlockGraph, Ir, LocalFrameIr};

/// A rewrite of a short instruction sequence
pub trait PeepholeRewrite {
    fn name(&self) -> &'static str;

    fn window_size(&self) -> usize {
        2
    }

    /// Replacement for `window`, or `None` to leave it alone.
    fn rewrite(&self, window: &[Ir]) -> Option<Vec<Ir>>;
}

/// `store x; load x` keeps the value on the stack instead of reloading it.
pub struct StoreLoadToDupStore;

impl PeepholeRewrite for StoreLoadToDupStore {
    fn name(&self) -> &'static str {
        "store-load"
    }

    fn rewrite(&self, window: &[Ir]) -> Option<Vec<Ir>> {
        match window {
            [store @ Ir::LocalFrame(LocalFrameIr::StoreLocal { index: stored, .. }), Ir::LocalFrame(LocalFrameIr::LoadLocal { index: loaded, .. })]
                if stored == loaded =>
            {
                Some(vec![Ir::Dup, store.clone()])
            }
            _ => None,
        }
    }
}

/// `load x; store x` is a no-op.
pub struct RemoveSelfAssignment;

impl PeepholeRewrite for RemoveSelfAssignment {
    fn name(&self) -> &'static str {
        "self-assignment"
    }

    fn rewrite(&self, window: &[Ir]) -> Option<Vec<Ir>> {
        match window {
            [Ir::LocalFrame(LocalFrameIr::LoadLocal { index: loaded, .. }), Ir::LocalFrame(LocalFrameIr::StoreLocal { index: stored, .. })]
                if stored == loaded =>
            {
                Some(Vec::new())
            }
            _ => None,
        }
    }
}

/// A pushed unit that is immediately discarded.
pub struct RemoveUnitPop;

impl PeepholeRewrite for RemoveUnitPop {
    fn name(&self) -> &'static str {
        "unit-pop"
    }

    fn rewrite(&self, window: &[Ir]) -> Option<Vec<Ir>> {
        match window {
            [Ir::PushUnit, Ir::Pop] => Some(Vec::new()),
            _ => None,
        }
    }
}

/// Runs a set of rewrites over blocks until nothing changes.
pub struct PeepholeOptimizer {
    rewrites: Vec<Box<dyn PeepholeRewrite>>,
}

impl Default for PeepholeOptimizer {
    fn default() -> Self {
        Self::new(vec![
            Box::new(StoreLoadToDupStore),
            Box::new(RemoveSelfAssignment),
            Box::new(RemoveUnitPop),
        ])
    }
}

impl PeepholeOptimizer {
    pub fn new(rewrites: Vec<Box<dyn PeepholeRewrite>>) -> Self {
        Self { rewrites }
    }

    pub fn optimize_graph(&self, graph: &mut BasicBlockGraph) {
        graph.for_each_block_mut(|block| self.optimize_block(block));
    }

    pub fn optimize_block(&self, block: &mut BasicBlock) {
        while self.pass(&mut block.ops) {}
    }

    /// One sweep of every rewrite over `ops`. Returns whether anything changed.
    fn pass(&self, ops: &mut Vec<Ir>) -> bool {
        let mut changed = false;
        for rewrite in &self.rewrites {
            let size = rewrite.window_size();
            let mut i = 0;
            while i + size <= ops.len() {
                if let Some(replacement) = rewrite.rewrite(&ops[i..i + size]) {
                    trace!(
                        rewrite = rewrite.name(),
                        position = i,
                        "peephole rewrite"
                    );
                    ops.splice(i..i + size, replacement);
                    changed = true;
                }
                i += 1;
            }
        }
        changed
    }
}

/// Optimize every block of `graph` with the standard rewrites.
pub fn optimize_graph(graph: &mut BasicBlockGraph) {
    PeepholeOptimizer::default().optimize_graph(graph);
}

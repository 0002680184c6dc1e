//! Lowering of typed expressions to IR

use crate::ast::RelationalOp;
use crate::env::{Binding, BindingKind};
use crate::error::InternalError;
use crate::ir::{BasicBlockGraph, BlockId, Ir, LocalFrameIr};
use crate::typed::{TypedBinaryOp, TypedExpression};

/// Translate `expression` into a graph whose end block returns its value.
pub fn translate_to_ir(expression: &TypedExpression) -> Result<BasicBlockGraph, InternalError> {
    let mut translator = Translator::new();
    translator.emit(expression)?;
    let mut graph = translator.graph;
    let end = graph.end()?;
    graph.push(end, Ir::Ret);
    Ok(graph)
}

struct Translator {
    graph: BasicBlockGraph,
    current: BlockId,
}

impl Translator {
    fn new() -> Self {
        let graph = BasicBlockGraph::new();
        let current = graph.start();
        Self { graph, current }
    }

    fn push(&mut self, op: Ir) {
        self.graph.push(self.current, op);
    }

    fn emit(&mut self, expression: &TypedExpression) -> Result<(), InternalError> {
        match expression {
            TypedExpression::Ref(binding) => self.emit_load(binding.binding()),
            TypedExpression::Lit { value, .. } => self.push(Ir::Push(value.clone())),
            TypedExpression::Not(exp) => {
                self.emit(exp)?;
                self.push(Ir::Not);
            }
            TypedExpression::Binary { op, lhs, rhs } => {
                self.emit(lhs)?;
                self.emit(rhs)?;
                self.emit_binary(*op);
            }
            TypedExpression::Call { func, args, .. } => {
                for arg in args {
                    self.emit(arg)?;
                }
                self.emit(func)?;
                self.push(Ir::Call {
                    argument_count: args.len(),
                });
                self.push(Ir::RestoreFrame);
            }
            TypedExpression::ExpressionList { expressions, .. } => {
                self.push(Ir::PushUnit);
                for exp in expressions {
                    self.push(Ir::Pop);
                    self.emit(exp)?;
                }
            }
            TypedExpression::Assign {
                variable,
                expression,
            }
            | TypedExpression::Var {
                variable,
                expression,
            } => {
                self.emit(expression)?;
                self.emit_store(variable.binding())?;
                self.push(Ir::PushUnit);
            }
            TypedExpression::If {
                condition,
                consequent,
                alternative,
                ..
            } => self.emit_if(condition, consequent, alternative.as_deref())?,
            TypedExpression::While { condition, body } => self.emit_while(condition, body)?,
        }
        Ok(())
    }

    fn emit_if(
        &mut self,
        condition: &TypedExpression,
        consequent: &TypedExpression,
        alternative: Option<&TypedExpression>,
    ) -> Result<(), InternalError> {
        self.emit(condition)?;
        let after = self.graph.new_block();

        match alternative {
            Some(alternative) => {
                let true_block = self.graph.new_block();
                let false_block = self.graph.new_block();
                self.graph
                    .end_with_branch(self.current, true_block, false_block)?;

                self.current = true_block;
                self.emit(consequent)?;
                self.graph.end_with_jump(self.current, after)?;

                self.current = false_block;
                self.emit(alternative)?;
                self.graph.end_with_jump(self.current, after)?;
            }
            None => {
                let true_block = self.graph.new_block();
                self.graph.end_with_branch(self.current, true_block, after)?;

                self.current = true_block;
                self.emit(consequent)?;
                self.push(Ir::Pop);
                self.graph.end_with_jump(self.current, after)?;

                self.graph.push(after, Ir::PushUnit);
            }
        }

        self.current = after;
        Ok(())
    }

    fn emit_while(
        &mut self,
        condition: &TypedExpression,
        body: &TypedExpression,
    ) -> Result<(), InternalError> {
        let head = self.graph.new_block();
        let loop_body = self.graph.new_block();
        let after = self.graph.new_block();

        self.graph.end_with_jump(self.current, head)?;

        self.current = head;
        self.emit(condition)?;
        self.graph.end_with_branch(self.current, loop_body, after)?;

        self.current = loop_body;
        self.emit(body)?;
        self.push(Ir::Pop);
        self.graph.end_with_jump(self.current, head)?;

        self.current = after;
        self.push(Ir::PushUnit);
        Ok(())
    }

    fn emit_binary(&mut self, op: TypedBinaryOp) {
        match op {
            TypedBinaryOp::Plus => self.push(Ir::Add),
            TypedBinaryOp::Minus => self.push(Ir::Subtract),
            TypedBinaryOp::Multiply => self.push(Ir::Multiply),
            TypedBinaryOp::Divide => self.push(Ir::Divide),
            TypedBinaryOp::ConcatString => self.push(Ir::ConcatString),
            TypedBinaryOp::Relational(op) => self.emit_relational(op),
        }
    }

    /// `!=`, `>` and `>=` are negations of `==`, `<=` and `<`.
    fn emit_relational(&mut self, op: RelationalOp) {
        match op {
            RelationalOp::Equals => self.push(Ir::Equal),
            RelationalOp::NotEquals => {
                self.push(Ir::Equal);
                self.push(Ir::Not);
            }
            RelationalOp::LessThan => self.push(Ir::LessThan),
            RelationalOp::LessThanOrEqual => self.push(Ir::LessThanOrEqual),
            RelationalOp::GreaterThan => {
                self.push(Ir::LessThanOrEqual);
                self.push(Ir::Not);
            }
            RelationalOp::GreaterThanOrEqual => {
                self.push(Ir::LessThan);
                self.push(Ir::Not);
            }
        }
    }

    fn emit_load(&mut self, binding: &Binding) {
        let index = binding.index;
        let name = binding.name.clone();
        self.push(match binding.kind {
            BindingKind::Global => Ir::LoadGlobal { index, name },
            BindingKind::Local => Ir::LocalFrame(LocalFrameIr::LoadLocal { index, name }),
            BindingKind::Argument => Ir::LoadArgument { index, name },
        });
    }

    fn emit_store(&mut self, binding: &Binding) -> Result<(), InternalError> {
        let index = binding.index;
        let name = binding.name.clone();
        let op = match binding.kind {
            BindingKind::Global => Ir::StoreGlobal { index, name },
            BindingKind::Local => Ir::LocalFrame(LocalFrameIr::StoreLocal { index, name }),
            BindingKind::Argument => {
                return Err(InternalError::Translation(format!(
                    "can't store into argument {}",
                    name
                )))
            }
        };
        self.push(op);
        Ok(())
    }
}

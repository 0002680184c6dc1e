//! Constant folding over the typed tree
//!
//! Folding never fails. Anything that would fault at run time, such as a
//! division by a literal zero or an overflowing sum, is left in place so the
//! VM reports it when (and if) the code runs.

use std::collections::HashMap;

use crate::env::BindingReference;
use crate::typed::{TypedBinaryOp, TypedExpression};
use crate::types::Type;
use crate::value::Value;

/// Fold constant sub-expressions and propagate immutable constants.
pub fn optimize(expression: &TypedExpression) -> TypedExpression {
    fold(expression, &mut ConstantBindings::default())
}

/// Known constant values of immutable bindings, scoped like the source.
#[derive(Default)]
struct ConstantBindings<'a> {
    parent: Option<&'a ConstantBindings<'a>>,
    constants: HashMap<BindingReference, Value>,
}

impl ConstantBindings<'_> {
    fn child(&self) -> ConstantBindings<'_> {
        ConstantBindings {
            parent: Some(self),
            constants: HashMap::new(),
        }
    }

    fn get(&self, binding: &BindingReference) -> Option<&Value> {
        self.constants
            .get(binding)
            .or_else(|| self.parent.and_then(|parent| parent.get(binding)))
    }
}

fn fold(expression: &TypedExpression, env: &mut ConstantBindings<'_>) -> TypedExpression {
    match expression {
        TypedExpression::Ref(binding) => match env.get(binding) {
            Some(value) => TypedExpression::Lit {
                value: value.clone(),
                ty: binding.ty().clone(),
            },
            None => expression.clone(),
        },

        TypedExpression::Lit { .. } => expression.clone(),

        TypedExpression::Call { func, args, ty } => TypedExpression::Call {
            func: Box::new(fold(func, env)),
            args: args.iter().map(|arg| fold(arg, env)).collect(),
            ty: ty.clone(),
        },

        TypedExpression::Not(exp) => match fold(exp, env) {
            TypedExpression::Lit {
                value: Value::Bool(b),
                ..
            } => TypedExpression::boolean(!b),
            TypedExpression::Not(inner) => *inner,
            folded => TypedExpression::Not(Box::new(folded)),
        },

        TypedExpression::Binary { op, lhs, rhs } => {
            let lhs = fold(lhs, env);
            let rhs = fold(rhs, env);
            if let (Some(l), Some(r)) = (lhs.as_literal(), rhs.as_literal()) {
                if let Some(value) = evaluate_binary(*op, l, r) {
                    return TypedExpression::Lit {
                        value,
                        ty: expression.ty(),
                    };
                }
            }
            TypedExpression::Binary {
                op: *op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }
        }

        TypedExpression::Assign {
            variable,
            expression,
        } => TypedExpression::Assign {
            variable: variable.clone(),
            expression: Box::new(fold(expression, env)),
        },

        TypedExpression::Var {
            variable,
            expression,
        } => {
            let folded = fold(expression, env);
            if let Some(value) = folded.as_literal() {
                if value.may_inline() && !variable.mutable() {
                    env.constants.insert(variable.clone(), value.clone());
                }
            }
            TypedExpression::Var {
                variable: variable.clone(),
                expression: Box::new(folded),
            }
        }

        TypedExpression::If {
            condition,
            consequent,
            alternative,
            ty,
        } => {
            let condition = fold(condition, env);
            if let Some(Value::Bool(live)) = condition.as_literal() {
                let branch = if *live {
                    Some(consequent)
                } else {
                    alternative.as_ref()
                };
                return match branch {
                    Some(branch) => keep_type(fold(branch, &mut env.child()), ty),
                    None => TypedExpression::empty(),
                };
            }
            TypedExpression::If {
                condition: Box::new(condition),
                consequent: Box::new(fold(consequent, &mut env.child())),
                alternative: alternative
                    .as_ref()
                    .map(|alternative| Box::new(fold(alternative, &mut env.child()))),
                ty: ty.clone(),
            }
        }

        TypedExpression::While { condition, body } => {
            let condition = fold(condition, env);
            if let Some(Value::Bool(false)) = condition.as_literal() {
                return TypedExpression::empty();
            }
            TypedExpression::While {
                condition: Box::new(condition),
                body: Box::new(fold(body, &mut env.child())),
            }
        }

        TypedExpression::ExpressionList { expressions, ty } => {
            let mut scope = env.child();
            if let [single] = expressions.as_slice() {
                return fold(single, &mut scope);
            }
            TypedExpression::ExpressionList {
                expressions: expressions.iter().map(|e| fold(e, &mut scope)).collect(),
                ty: ty.clone(),
            }
        }
    }
}

/// A live branch replacing an `if` keeps the type of the `if`. A branch of
/// another type is followed by unit.
fn keep_type(branch: TypedExpression, ty: &Type) -> TypedExpression {
    if branch.ty() == *ty {
        branch
    } else {
        TypedExpression::ExpressionList {
            expressions: vec![branch, TypedExpression::empty()],
            ty: Type::Unit,
        }
    }
}

/// Evaluate a binary operator on two literals, or `None` if the result must
/// wait until run time.
fn evaluate_binary(op: TypedBinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    match op {
        TypedBinaryOp::Relational(relational) => lhs.compare(relational, rhs).ok().map(Value::Bool),
        TypedBinaryOp::ConcatString => lhs.plus(rhs).ok(),
        TypedBinaryOp::Plus => lhs.plus(rhs).ok(),
        TypedBinaryOp::Minus => lhs.minus(rhs).ok(),
        TypedBinaryOp::Multiply => lhs.times(rhs).ok(),
        TypedBinaryOp::Divide => lhs.div(rhs).ok(),
    }
}

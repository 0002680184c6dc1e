//! Type checking
//!
//! Walks the syntax tree with a [`StaticEnvironment`], resolving names and
//! checking that all types agree. The result is a [`TypedExpression`] where
//! every node has a known type.

use crate::ast::{BinaryOp, Expression};
use crate::env::{BindingReference, StaticEnvironment};
use crate::error::CompileError;
use crate::location::SourceLocation;
use crate::typed::{TypedBinaryOp, TypedExpression};
use crate::types::Type;

type Result<T> = std::result::Result<T, CompileError>;

/// Type-check `expression`, creating bindings for definitions in `env`.
pub fn type_check(
    expression: &Expression,
    env: &mut dyn StaticEnvironment,
) -> Result<TypedExpression> {
    match expression {
        Expression::Lit { value, location } => match value.ty() {
            Some(ty) => Ok(TypedExpression::Lit {
                value: value.clone(),
                ty,
            }),
            None => Err(CompileError::type_error(
                location.clone(),
                format!("{} is not a value", value),
            )),
        },

        Expression::Ref { name, location } => {
            Ok(TypedExpression::Ref(lookup_binding(env, name, location)?))
        }

        Expression::Not { expression, .. } => Ok(TypedExpression::Not(Box::new(
            type_check_expected(expression, &Type::Boolean, env)?,
        ))),

        Expression::Binary {
            op,
            lhs,
            rhs,
            location,
        } => type_check_binary(*op, lhs, rhs, location, env),

        Expression::Call { func, args } => {
            let location = expression.location();
            let typed_func = type_check(func, env)?;
            let Type::Function(signature) = typed_func.ty() else {
                return Err(CompileError::type_error(
                    location.clone(),
                    format!(
                        "expected function type for call, but got {}",
                        typed_func.ty()
                    ),
                ));
            };

            if args.len() != signature.argument_types.len() {
                return Err(CompileError::type_error(
                    location.clone(),
                    format!(
                        "expected {} arguments, but got {}",
                        signature.argument_types.len(),
                        args.len()
                    ),
                ));
            }

            let typed_args = args
                .iter()
                .zip(&signature.argument_types)
                .map(|(arg, expected)| type_check_expected(arg, expected, env))
                .collect::<Result<Vec<_>>>()?;

            Ok(TypedExpression::Call {
                func: Box::new(typed_func),
                args: typed_args,
                ty: *signature.return_type,
            })
        }

        Expression::Assign {
            variable,
            expression,
            location,
        } => {
            let binding = lookup_binding(env, variable, location)?;
            if !binding.mutable() {
                return Err(CompileError::type_error(
                    location.clone(),
                    format!("can't assign to immutable variable {}", binding.name()),
                ));
            }
            let typed = type_check_expected(expression, binding.ty(), env)?;
            Ok(TypedExpression::Assign {
                variable: binding,
                expression: Box::new(typed),
            })
        }

        Expression::Var {
            variable,
            expression,
            mutable,
            location,
        } => {
            let typed = type_check(expression, env)?;
            let binding = env.bind(variable, typed.ty(), *mutable).map_err(|_| {
                CompileError::type_error(
                    location.clone(),
                    format!("variable already bound '{}'", variable),
                )
            })?;
            Ok(TypedExpression::Var {
                variable: binding,
                expression: Box::new(typed),
            })
        }

        Expression::If {
            condition,
            consequent,
            alternative,
            ..
        } => {
            let typed_condition = type_check_expected(condition, &Type::Boolean, env)?;
            let typed_consequent = type_check(consequent, env)?;
            let typed_alternative = alternative
                .as_deref()
                .map(|alternative| type_check(alternative, env))
                .transpose()?;

            // Without a matching alternative the value is not usable.
            let ty = match &typed_alternative {
                Some(alternative) if alternative.ty() == typed_consequent.ty() => {
                    typed_consequent.ty()
                }
                _ => Type::Unit,
            };

            Ok(TypedExpression::If {
                condition: Box::new(typed_condition),
                consequent: Box::new(typed_consequent),
                alternative: typed_alternative.map(Box::new),
                ty,
            })
        }

        Expression::While {
            condition, body, ..
        } => {
            let typed_condition = type_check_expected(condition, &Type::Boolean, env)?;
            let typed_body = type_check(body, env)?;
            Ok(TypedExpression::While {
                condition: Box::new(typed_condition),
                body: Box::new(typed_body),
            })
        }

        Expression::ExpressionList { expressions, .. } => {
            let mut scope = env.new_scope();
            let typed = expressions
                .iter()
                .map(|exp| type_check(exp, scope.as_mut()))
                .collect::<Result<Vec<_>>>()?;
            let ty = typed.last().map_or(Type::Unit, TypedExpression::ty);
            Ok(TypedExpression::ExpressionList {
                expressions: typed,
                ty,
            })
        }
    }
}

/// Type-check `expression` and require the result to have type `expected`.
pub fn type_check_expected(
    expression: &Expression,
    expected: &Type,
    env: &mut dyn StaticEnvironment,
) -> Result<TypedExpression> {
    let typed = type_check(expression, env)?;
    expect_assignable(typed, expected, expression.location())
}

/// Require `typed` to have type `expected`, reporting a mismatch at `location`.
pub fn expect_assignable(
    typed: TypedExpression,
    expected: &Type,
    location: &SourceLocation,
) -> Result<TypedExpression> {
    let ty = typed.ty();
    if ty == *expected {
        Ok(typed)
    } else {
        Err(CompileError::type_error(
            location.clone(),
            format!("expected type {}, but was {}", expected, ty),
        ))
    }
}

fn type_check_binary(
    op: BinaryOp,
    lhs: &Expression,
    rhs: &Expression,
    location: &SourceLocation,
    env: &mut dyn StaticEnvironment,
) -> Result<TypedExpression> {
    match op {
        BinaryOp::Plus => {
            let typed_lhs = type_check(lhs, env)?;
            if typed_lhs.ty() == Type::String {
                let typed_rhs = type_check(rhs, env)?;
                Ok(binary(TypedBinaryOp::ConcatString, typed_lhs, typed_rhs))
            } else {
                let typed_lhs = expect_assignable(typed_lhs, &Type::Int, lhs.location())?;
                let typed_rhs = type_check_expected(rhs, &Type::Int, env)?;
                Ok(binary(TypedBinaryOp::Plus, typed_lhs, typed_rhs))
            }
        }
        BinaryOp::Minus => arithmetic(TypedBinaryOp::Minus, lhs, rhs, env),
        BinaryOp::Multiply => arithmetic(TypedBinaryOp::Multiply, lhs, rhs, env),
        BinaryOp::Divide => arithmetic(TypedBinaryOp::Divide, lhs, rhs, env),

        // lhs && rhs == if (lhs) rhs else false
        BinaryOp::And => {
            let typed_lhs = type_check_expected(lhs, &Type::Boolean, env)?;
            let typed_rhs = type_check_expected(rhs, &Type::Boolean, env)?;
            Ok(TypedExpression::If {
                condition: Box::new(typed_lhs),
                consequent: Box::new(typed_rhs),
                alternative: Some(Box::new(TypedExpression::boolean(false))),
                ty: Type::Boolean,
            })
        }

        // lhs || rhs == if (lhs) true else rhs
        BinaryOp::Or => {
            let typed_lhs = type_check_expected(lhs, &Type::Boolean, env)?;
            let typed_rhs = type_check_expected(rhs, &Type::Boolean, env)?;
            Ok(TypedExpression::If {
                condition: Box::new(typed_lhs),
                consequent: Box::new(TypedExpression::boolean(true)),
                alternative: Some(Box::new(typed_rhs)),
                ty: Type::Boolean,
            })
        }

        BinaryOp::Relational(relational) => {
            let typed_lhs = type_check(lhs, env)?;
            let typed_rhs = type_check(rhs, env)?;
            let (lhs_type, rhs_type) = (typed_lhs.ty(), typed_rhs.ty());

            if lhs_type != rhs_type {
                return Err(CompileError::type_error(
                    location.clone(),
                    format!(
                        "lhs type {} did not match rhs type {}",
                        lhs_type, rhs_type
                    ),
                ));
            }

            if !lhs_type.supports(relational) {
                return Err(CompileError::type_error(
                    location.clone(),
                    format!(
                        "operator {} is not supported for type {}",
                        relational, lhs_type
                    ),
                ));
            }

            Ok(binary(
                TypedBinaryOp::Relational(relational),
                typed_lhs,
                typed_rhs,
            ))
        }
    }
}

fn arithmetic(
    op: TypedBinaryOp,
    lhs: &Expression,
    rhs: &Expression,
    env: &mut dyn StaticEnvironment,
) -> Result<TypedExpression> {
    let typed_lhs = type_check_expected(lhs, &Type::Int, env)?;
    let typed_rhs = type_check_expected(rhs, &Type::Int, env)?;
    Ok(binary(op, typed_lhs, typed_rhs))
}

fn binary(op: TypedBinaryOp, lhs: TypedExpression, rhs: TypedExpression) -> TypedExpression {
    TypedExpression::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn lookup_binding(
    env: &dyn StaticEnvironment,
    name: &str,
    location: &SourceLocation,
) -> Result<BindingReference> {
    env.lookup(name).ok_or_else(|| {
        CompileError::type_error(location.clone(), format!("unbound variable '{}'", name))
    })
}

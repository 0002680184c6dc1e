//! swona-spec: behavior scenarios for Swona
//!
//! Helpers used by the cucumber steps. Each helper runs against a fresh
//! evaluator so scenarios stay independent.

use swona::env::GlobalStaticEnvironment;
use swona::optimizer::optimize;
use swona::parser::parse_expression;
use swona::typecheck::type_check;
use swona::{register_runtime_functions, EvaluationResult, Evaluator, EvaluatorOptions};

/// Evaluate `inputs` in order in one session and describe the last result as
/// `Type = repr`.
pub fn evaluate_all(inputs: &[String], optimize: bool) -> Result<String, String> {
    let mut evaluator = Evaluator::with_options(EvaluatorOptions {
        optimize,
        trace: false,
    });
    register_runtime_functions(&mut evaluator).map_err(|e| e.to_string())?;

    let mut last = EvaluationResult::unit();
    for input in inputs {
        last = evaluator.evaluate(input).map_err(|e| e.to_string())?;
    }
    Ok(last.to_string())
}

/// Type-check `code` in an empty environment and show the constant-folded tree.
pub fn constant_fold(code: &str) -> Result<String, String> {
    let expression = parse_expression(code).map_err(|e| e.to_string())?;
    let mut env = GlobalStaticEnvironment::new();
    let typed = type_check(&expression, &mut env).map_err(|e| e.to_string())?;
    Ok(optimize(&typed).to_string())
}

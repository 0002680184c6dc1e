//! Evaluation sessions
//!
//! An [`Evaluator`] owns everything that persists between evaluations: the
//! global static environment, the global data segment holding the values of
//! global bindings, and the global code segment holding compiled functions.
//! Top-level expressions are compiled into a temporary segment that is
//! appended to the global code while it runs and dropped afterwards.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::{debug, info_span, warn};

use crate::ast::{Expression, FunctionDefinition};
use crate::bytecode::{translate_to_code, CodeSegment};
use crate::env::{GlobalStaticEnvironment, StaticEnvironment};
use crate::error::{InternalError, Result};
use crate::lexer::{Keyword, Lexer, Token};
use crate::optimizer::optimize;
use crate::parser::{parse_expression, parse_function_definition, parse_function_definitions};
use crate::peephole;
use crate::translator::translate_to_ir;
use crate::typecheck::{expect_assignable, type_check};
use crate::typed::TypedExpression;
use crate::types::{FunctionType, Type};
use crate::value::{Function, NativeFunction, Value};
use crate::vm::{DataSegment, ThreadState};

/// Settings of an [`Evaluator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorOptions {
    /// Run the constant folder and the peephole optimizer
    pub optimize: bool,
    /// Print every executed instruction to the trace output
    pub trace: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            trace: false,
        }
    }
}

/// Value of an evaluated expression together with its static type
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub value: Value,
    pub ty: Type,
}

impl EvaluationResult {
    pub fn unit() -> Self {
        Self {
            value: Value::Unit,
            ty: Type::Unit,
        }
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.ty, self.value.repr())
    }
}

/// A session compiling and running Swona code.
pub struct Evaluator {
    global_env: GlobalStaticEnvironment,
    global_data: DataSegment,
    global_code: CodeSegment,
    options: EvaluatorOptions,
    trace_output: Box<dyn Write>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_options(EvaluatorOptions::default())
    }

    pub fn with_options(options: EvaluatorOptions) -> Self {
        Self {
            global_env: GlobalStaticEnvironment::new(),
            global_data: DataSegment::new(),
            global_code: CodeSegment::default(),
            options,
            trace_output: Box::new(io::stdout()),
        }
    }

    pub fn options(&self) -> EvaluatorOptions {
        self.options
    }

    pub fn set_options(&mut self, options: EvaluatorOptions) {
        self.options = options;
    }

    /// Where trace mode writes executed instructions. Defaults to stdout.
    pub fn set_trace_output(&mut self, output: impl Write + 'static) {
        self.trace_output = Box::new(output);
    }

    /// Evaluate a function definition or an expression.
    ///
    /// Definitions bind a global function and evaluate to unit. Top-level
    /// `var` and `val` bind globals. If evaluation fails, globals bound by it
    /// are forgotten again.
    pub fn evaluate(&mut self, code: &str) -> Result<EvaluationResult> {
        let _span = info_span!("swona.evaluate").entered();

        if is_function_definition(code) {
            let definition = parse_function_definition(code)?;
            self.bind_function(&definition)?;
            return Ok(EvaluationResult::unit());
        }

        let expression = parse_expression(code)?;
        self.with_rollback(|evaluator| {
            let typed = type_check(&expression, &mut evaluator.global_env)?;
            debug!(typed = %typed, "type checked");
            let segment = evaluator.translate(&typed)?;
            let value = evaluator.evaluate_segment(&segment)?;
            Ok(EvaluationResult {
                value,
                ty: typed.ty(),
            })
        })
    }

    /// Bind every function definition of `source` in order.
    pub fn load_source(&mut self, source: &str, file: &str) -> Result<()> {
        let _span = info_span!("swona.load", file).entered();
        for definition in parse_function_definitions(source, file)? {
            self.bind_function(&definition)?;
        }
        Ok(())
    }

    /// Bytecode listing of a bound function, or of the code an expression
    /// compiles to. Nothing is executed and no bindings are kept.
    pub fn dump(&mut self, code: &str) -> Result<String> {
        let expression = parse_expression(code)?;

        if let Expression::Ref { name, .. } = &expression {
            match self.get(name) {
                Some(Value::Function(Function::Compound {
                    address, code_size, ..
                })) => return Ok(self.global_code.listing(address, code_size)),
                Some(value @ Value::Function(Function::Native(_))) => {
                    return Ok(format!("native function {}", value))
                }
                _ => {}
            }
        }

        let before = self.global_env.binding_names();
        let listing = type_check(&expression, &mut self.global_env)
            .map_err(Into::into)
            .and_then(|typed| self.translate(&typed))
            .map(|segment| segment.to_string());
        self.forget_bindings_since(&before);
        listing
    }

    /// Names of all global bindings.
    pub fn binding_names(&self) -> BTreeSet<String> {
        self.global_env.binding_names()
    }

    /// Bind `value` to a new global `name`.
    pub fn bind(&mut self, name: &str, value: Value, mutable: bool) -> Result<()> {
        let ty = visible_type(&value)?;
        let binding = self.global_env.bind(name, ty, mutable)?;
        self.global_data.set(binding.index(), value);
        Ok(())
    }

    /// Bind a host function under its own name.
    pub fn bind_native(&mut self, function: NativeFunction) -> Result<()> {
        let name = function.name.clone();
        self.bind(&name, Value::Function(Function::Native(Rc::new(function))), false)
    }

    /// Compile `definition` into the global code segment and bind it.
    ///
    /// A function with a declared return type is bound before its body is
    /// compiled so that it can call itself. If compilation fails, that
    /// binding is removed again.
    pub fn bind_function(&mut self, definition: &FunctionDefinition) -> Result<()> {
        let _span = info_span!("swona.bind_function", name = %definition.name).entered();
        let argument_types: Vec<Type> = definition.args.iter().map(|(_, ty)| ty.clone()).collect();

        let speculative = match &definition.return_type {
            Some(return_type) => Some(self.global_env.bind(
                &definition.name,
                Type::function(argument_types.clone(), return_type.clone()),
                false,
            )?),
            None => None,
        };

        let (signature, segment) = match self.compile_function(definition, argument_types) {
            Ok(compiled) => compiled,
            Err(e) => {
                if speculative.is_some() {
                    warn!(name = %definition.name, error = %e, "rolling back failed definition");
                    self.global_env.unbind(&definition.name);
                }
                return Err(e);
            }
        };

        let binding = match speculative {
            Some(binding) => binding,
            None => self.global_env.bind(
                &definition.name,
                Type::Function(signature.clone()),
                false,
            )?,
        };

        let address = self.global_code.add_relocated(&segment);
        debug!(address, size = segment.len(), "function compiled");
        self.global_data.set(
            binding.index(),
            Value::Function(Function::Compound {
                address,
                code_size: segment.len(),
                name: definition.name.clone(),
                signature,
            }),
        );
        Ok(())
    }

    fn compile_function(
        &self,
        definition: &FunctionDefinition,
        argument_types: Vec<Type>,
    ) -> Result<(FunctionType, CodeSegment)> {
        let mut scope = self.global_env.new_function_scope(&definition.args);
        let mut typed = type_check(&definition.body, &mut scope)?;
        if self.options.optimize {
            typed = optimize(&typed);
        }
        if let Some(return_type) = &definition.return_type {
            typed = expect_assignable(typed, return_type, definition.body.location())?;
        }

        let segment = self.lower(&typed, definition.args.len())?;
        Ok((FunctionType::new(argument_types, typed.ty()), segment))
    }

    /// Value of a global binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        let binding = self.global_env.lookup(name)?;
        self.global_data.try_get(binding.index()).cloned()
    }

    /// Replace a global binding with a new mutable one, or remove it.
    pub fn set(&mut self, name: &str, value: Option<Value>) -> Result<()> {
        if let Some(value) = &value {
            visible_type(value)?;
        }
        self.global_env.unbind(name);
        match value {
            Some(value) => self.bind(name, value, true),
            None => Ok(()),
        }
    }

    /// Call the global function `name` with `args`.
    pub fn call(&mut self, name: &str, args: Vec<Expression>) -> Result<Value> {
        let expression = Expression::call(Expression::reference(name), args);
        let typed = type_check(&expression, &mut self.global_env)?;
        let segment = self.translate(&typed)?;
        self.evaluate_segment(&segment)
    }

    /// Compile a top-level expression into a standalone code segment.
    pub fn translate(&self, typed: &TypedExpression) -> Result<CodeSegment> {
        let typed = if self.options.optimize {
            let optimized = optimize(typed);
            debug!(optimized = %optimized, "optimized");
            optimized
        } else {
            typed.clone()
        };
        self.lower(&typed, 0)
    }

    fn lower(&self, typed: &TypedExpression, argument_count: usize) -> Result<CodeSegment> {
        let mut graph = translate_to_ir(typed)?;
        if self.options.optimize {
            peephole::optimize_graph(&mut graph);
        }
        debug!(blocks = graph.reachable_blocks().len(), "translated to IR");

        let segment = translate_to_code(&graph, argument_count)?;
        debug!(size = segment.len(), "generated code");
        Ok(segment)
    }

    /// Run a segment produced by [`Evaluator::translate`].
    pub fn evaluate_segment(&mut self, segment: &CodeSegment) -> Result<Value> {
        let address = self.global_code.add_relocated(segment);
        let mut state = ThreadState::new(&self.global_code, &mut self.global_data);
        if self.options.trace {
            state = state.with_trace(&mut *self.trace_output);
        }
        let result = state.run(address);
        self.global_code.truncate(address);
        result
    }

    fn with_rollback<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let before = self.global_env.binding_names();
        let result = f(self);
        if let Err(e) = &result {
            warn!(error = %e, "evaluation failed, rolling back globals");
            self.forget_bindings_since(&before);
        }
        result
    }

    fn forget_bindings_since(&mut self, before: &BTreeSet<String>) {
        for name in self.global_env.binding_names().difference(before) {
            debug!(name = %name, "forgetting binding");
            self.global_env.unbind(name);
        }
    }
}

fn visible_type(value: &Value) -> Result<Type> {
    value
        .ty()
        .ok_or_else(|| InternalError::Vm(format!("can't bind internal value {}", value)).into())
}

/// Does `code` start with the `fun` keyword?
fn is_function_definition(code: &str) -> bool {
    let mut lexer = Lexer::new(code);
    lexer.has_more()
        && matches!(
            lexer.read_token().map(|info| info.token),
            Ok(Token::Keyword(Keyword::Fun))
        )
}

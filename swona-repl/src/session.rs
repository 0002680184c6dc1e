//! Session state for the REPL
//!
//! A session owns the evaluator and turns each input line into an
//! [`Outcome`] the front end prints.

use std::time::Instant;

use swona::{Error, Evaluator, EvaluatorOptions, Type};

pub const HELP: &str = r#"
Commands:
  :help, :h        Show this help
  :quit, :q, exit  Exit the REPL
  :trace           Toggle VM instruction tracing
  :optimize        Toggle the optimizer
  :time            Toggle elapsed time display
  :dump EXPR       Show compiled code without evaluating
  :load FILE       Load function definitions from a file

Examples:
  1 + 2 * 3
  fun square(x: Int) = x * x
  square(5)
  { var x = 5; while (x != 0) x = x - 1; x }
"#;

/// What the front end should do with a handled line
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// Nothing to show
    Silent,
    /// Text for stdout
    Print(String),
    /// Text for stderr
    Error(String),
    /// The input ended early; ask for another line and retry
    Incomplete,
    Quit,
}

pub struct Session {
    evaluator: Evaluator,
    show_elapsed_time: bool,
}

impl Session {
    pub fn new(evaluator: Evaluator) -> Self {
        Self {
            evaluator,
            show_elapsed_time: false,
        }
    }

    /// Global names, for completion.
    pub fn binding_names(&self) -> Vec<String> {
        self.evaluator.binding_names().into_iter().collect()
    }

    pub fn handle(&mut self, input: &str) -> Outcome {
        let line = input.trim();
        if line.is_empty() {
            return Outcome::Silent;
        }
        if line == "exit" {
            return Outcome::Quit;
        }
        if line.starts_with(':') {
            return self.command(line);
        }
        self.evaluate(input)
    }

    fn command(&mut self, line: &str) -> Outcome {
        let (command, argument) = match line.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };
        match command {
            ":help" | ":h" => Outcome::Print(HELP.trim_matches('\n').to_string()),
            ":quit" | ":q" => Outcome::Quit,
            ":trace" => {
                let options = self.toggle(|o| &mut o.trace);
                Outcome::Print(format!("trace {}", status(options.trace)))
            }
            ":optimize" => {
                let options = self.toggle(|o| &mut o.optimize);
                Outcome::Print(format!("optimize {}", status(options.optimize)))
            }
            ":time" => {
                self.show_elapsed_time = !self.show_elapsed_time;
                Outcome::Print(format!("time {}", status(self.show_elapsed_time)))
            }
            ":dump" if !argument.is_empty() => match self.evaluator.dump(argument) {
                Ok(listing) => Outcome::Print(listing),
                Err(e) => Outcome::Error(describe(&e)),
            },
            ":dump" => Outcome::Error("Usage: :dump <expression>".to_string()),
            ":load" if !argument.is_empty() => self.load_file(argument),
            ":load" => Outcome::Error("Usage: :load <file>".to_string()),
            _ => Outcome::Error(format!("Unknown command: {}. Type :help for help.", line)),
        }
    }

    fn toggle(&mut self, field: impl Fn(&mut EvaluatorOptions) -> &mut bool) -> EvaluatorOptions {
        let mut options = self.evaluator.options();
        let flag = field(&mut options);
        *flag = !*flag;
        self.evaluator.set_options(options);
        options
    }

    /// Load function definitions from `path`.
    pub fn load_file(&mut self, path: &str) -> Outcome {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => return Outcome::Error(format!("Error loading file: {}: {}", path, e)),
        };
        match self.evaluator.load_source(&source, path) {
            Ok(()) => Outcome::Silent,
            Err(e) => Outcome::Error(describe(&e)),
        }
    }

    fn evaluate(&mut self, code: &str) -> Outcome {
        let start = Instant::now();
        let result = match self.evaluator.evaluate(code) {
            Ok(result) => result,
            Err(e) if e.is_unexpected_end() => return Outcome::Incomplete,
            Err(e) => return Outcome::Error(describe(&e)),
        };
        let elapsed = start.elapsed();

        let mut lines = Vec::new();
        if result.ty != Type::Unit {
            lines.push(result.to_string());
        }
        if self.show_elapsed_time {
            lines.push(format!("time: {}ms", elapsed.as_millis()));
        }
        if lines.is_empty() {
            Outcome::Silent
        } else {
            Outcome::Print(lines.join("\n"))
        }
    }
}

fn status(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// User facing description of an error, with source context for compile errors.
pub fn describe(error: &Error) -> String {
    match error.as_compile_error() {
        Some(e) if e.is_syntax() => format!(
            "Syntax error: {}\n{}",
            e.message,
            e.location.to_long_string().trim_end()
        ),
        Some(e) => format!(
            "Type checking failed: {}\n{}",
            e.message,
            e.location.to_long_string().trim_end()
        ),
        None => error.to_string(),
    }
}

//! Swona interactive REPL

mod session;

use std::path::PathBuf;

use anyhow::{anyhow, Context as _, Result};
use clap::Parser;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};
use swona::{register_runtime_functions, Evaluator, EvaluatorOptions};
use tracing_subscriber::EnvFilter;

use session::{describe, Outcome, Session};

const BANNER: &str = r#"
Welcome to Swona! Type expressions to evaluate, :help for commands, exit to leave.
"#;

const PRELUDE: &str = include_str!("../prelude.swona");

#[derive(Parser, Debug)]
#[command(name = "swona")]
#[command(about = "Interactive evaluator for the Swona language")]
#[command(version)]
struct Args {
    /// Scripts to evaluate before the prompt
    scripts: Vec<PathBuf>,

    /// Disable the optimizer
    #[arg(long)]
    no_optimize: bool,

    /// Trace every executed VM instruction
    #[arg(long)]
    trace: bool,

    /// Load function definitions from FILE instead of the bundled prelude
    #[arg(long, value_name = "FILE")]
    prelude: Option<PathBuf>,

    /// Do not register the native runtime functions
    #[arg(long)]
    no_runtime: bool,
}

/// Completes global names, ignoring case.
struct NameCompleter {
    names: Vec<String>,
}

impl Completer for NameCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let start = line[..pos]
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
            .map_or(0, |i| i + 1);
        let prefix = line[start..pos].to_lowercase();
        let candidates = self
            .names
            .iter()
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for NameCompleter {
    type Hint = String;
}

impl Highlighter for NameCompleter {}

impl Validator for NameCompleter {}

impl Helper for NameCompleter {}

fn setup(args: &Args) -> Result<Session> {
    let mut evaluator = Evaluator::with_options(EvaluatorOptions {
        optimize: !args.no_optimize,
        trace: args.trace,
    });

    if !args.no_runtime {
        register_runtime_functions(&mut evaluator)
            .map_err(|e| anyhow!("registering runtime functions: {}", e))?;
    }

    match &args.prelude {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading prelude {}", path.display()))?;
            evaluator
                .load_source(&source, &path.display().to_string())
                .map_err(|e| anyhow!("{}", describe(&e)))?;
        }
        None => evaluator
            .load_source(PRELUDE, "prelude.swona")
            .map_err(|e| anyhow!("{}", describe(&e)))?,
    }

    Ok(Session::new(evaluator))
}

fn print(outcome: Outcome) {
    match outcome {
        Outcome::Print(text) => println!("{}", text),
        Outcome::Error(text) => eprintln!("{}", text),
        Outcome::Incomplete => eprintln!("unexpected end of input"),
        Outcome::Silent | Outcome::Quit => {}
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut session = setup(&args)?;

    for script in &args.scripts {
        let source = std::fs::read_to_string(script)
            .with_context(|| format!("reading script {}", script.display()))?;
        print(session.handle(&source));
    }

    let mut editor: Editor<NameCompleter, DefaultHistory> =
        Editor::new().context("initializing line editor")?;
    editor.set_helper(Some(NameCompleter {
        names: session.binding_names(),
    }));

    println!("{}", BANNER);

    'repl: loop {
        let mut input = match editor.readline(">>> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("reading input"),
        };

        let outcome = loop {
            match session.handle(&input) {
                Outcome::Incomplete => match editor.readline("... ") {
                    Ok(more) => {
                        input.push('\n');
                        input.push_str(&more);
                    }
                    Err(ReadlineError::Interrupted) => break Outcome::Silent,
                    Err(_) => break 'repl,
                },
                outcome => break outcome,
            }
        };

        let _ = editor.add_history_entry(input.as_str());
        if outcome == Outcome::Quit {
            break;
        }
        print(outcome);

        if let Some(helper) = editor.helper_mut() {
            helper.names = session.binding_names();
        }
    }

    println!("Thank you for visiting Swona, have a nice day!");
    Ok(())
}

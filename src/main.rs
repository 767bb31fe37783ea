use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use slotlisp::ast::Value;
use slotlisp::environment::Env;
use slotlisp::repl::{ExpressionReader, load_file};
use slotlisp::{EvalConfig, Interpreter};

/// Evaluation recurses on the host stack; give it room to reach the depth limit first
const EVAL_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Default depth limit for the binary, which runs on the enlarged stack above
const CLI_EVAL_DEPTH: usize = 10_000;

#[derive(Debug, Parser)]
#[command(
    name = "slotlisp",
    about = "A small Lisp with macros, quasiquote and permissioned classes.",
    version
)]
struct Cli {
    /// Source files to evaluate, in order, before anything else
    #[arg(long, value_name = "FILE", num_args = 1..)]
    load: Vec<PathBuf>,

    /// Evaluate this expression, print the result and exit
    #[arg(long, value_name = "EXPR")]
    eval: Option<String>,

    /// Maximum evaluation depth before RecursionTooDeep
    #[arg(long, value_name = "N", default_value_t = CLI_EVAL_DEPTH)]
    max_depth: usize,

    /// Do not start the interactive prompt after loading files
    #[arg(long)]
    no_repl: bool,

    /// Log filter such as `debug` or `slotlisp=trace` (overrides RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

fn install_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing(cli.log.as_deref());

    let worker = thread::Builder::new()
        .name("slotlisp".to_owned())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || run(cli));

    match worker.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(panic_info)) => {
            eprintln!("The interpreter encountered an unexpected error and must exit.");
            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: cannot start interpreter thread: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ExitCode {
    let mut interp = Interpreter::with_config(EvalConfig {
        max_depth: cli.max_depth,
    });
    let mut failed = false;

    for path in &cli.load {
        match load_file(&mut interp, path) {
            Ok(report) => {
                for (form, err) in &report.failures {
                    eprintln!("{}: error in {form}: {err}", path.display());
                }
                failed |= !report.failures.is_empty();
            }
            Err(err) => {
                eprintln!("Error: {err}");
                failed = true;
            }
        }
    }

    if let Some(source) = &cli.eval {
        match interp.eval_str(source) {
            Ok(value) => println!("{value}"),
            Err(err) => {
                eprintln!("Error: {err}");
                failed = true;
            }
        }
    } else if !cli.no_repl {
        run_repl(&mut interp);
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_repl(interp: &mut Interpreter) {
    println!("slotlisp {}", env!("CARGO_PKG_VERSION"));
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Error: could not initialize line editor: {err}");
            return;
        }
    };
    let mut reader = ExpressionReader::new();

    loop {
        let prompt = if reader.is_pending() { "   ...> " } else { "slotlisp> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if !reader.is_pending() {
                    match line.trim() {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(interp.global());
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                let Some(source) = reader.push_line(&line) else {
                    continue;
                };
                let _ = rl.add_history_entry(source.as_str());

                match interp.parse(&source) {
                    Ok(forms) => {
                        for form in &forms {
                            match interp.eval(form) {
                                Ok(value) => println!("{value}"),
                                Err(err) => println!("Error: {err}"),
                            }
                        }
                    }
                    Err(err) => println!("Error: {err}"),
                }
            }
            Err(ReadlineError::Interrupted) if reader.is_pending() => {
                reader.reset();
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Discard a partial expression");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Expressions spanning several lines are read until their brackets balance.");
    println!();
    println!("Examples:");
    println!("  (define (square x) (* x x))");
    println!("  ((mac (x) `(* ,x ,x)) (+ 1 2))");
    println!("  (define Point (class BaseClass))");
    println!("  (class-define! Point x integer)");
    println!("  (class-set! Point x 10)");
    println!("  (Point x)");
    println!();
}

fn print_environment(env: &Env) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in operations from everything else
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Builtin(_) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in operations ({}):", builtins.len());
        let mut col = 0;
        for name in builtins {
            print!("  {:<16}", name.name());
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("Values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}

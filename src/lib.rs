//! tsar: a dual-mode execution engine for a statically-typed superset of a
//! dynamic scripting language. Source text is parsed once, type-checked
//! once, and then either interpreted directly or compiled to an in-memory
//! instruction stream and run; both modes share one runtime value model
//! and produce identical observable output.

pub mod compiler;
pub mod interpreter;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod runtime;
pub mod typechecker;

use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use compiler::CompileError;
use loader::{check_units, LoadError, Loader};
use parser::ast::Program;
use parser::ParseError;
use runtime::operations::uncaught_to_message;
use runtime::{BufferSink, Context, Environment, ExecMode, OutputSink, Thrown};
use typechecker::TypeError;

/// A host-level failure: parse, type, compile, loader or uncaught runtime
/// error, flattened to its surfaced message.
#[derive(Debug)]
pub struct EngineError {
    pub message: String,
}

impl Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for EngineError {}

impl From<ParseError> for EngineError {
    fn from(error: ParseError) -> Self {
        EngineError {
            message: error.to_string(),
        }
    }
}

impl From<TypeError> for EngineError {
    fn from(error: TypeError) -> Self {
        EngineError {
            message: error.to_string(),
        }
    }
}

impl From<CompileError> for EngineError {
    fn from(error: CompileError) -> Self {
        EngineError {
            message: error.to_string(),
        }
    }
}

impl From<LoadError> for EngineError {
    fn from(error: LoadError) -> Self {
        EngineError {
            message: error.to_string(),
        }
    }
}

impl From<Thrown> for EngineError {
    fn from(thrown: Thrown) -> Self {
        EngineError {
            message: uncaught_to_message(&thrown.0),
        }
    }
}

/// Parse and type check only; no user code runs.
pub fn check_source(source: &str) -> Result<(), EngineError> {
    let program = parser::parse(source)?;
    typechecker::check_program(&program, &HashMap::new(), &HashMap::new())?;
    Ok(())
}

/// Run a single standalone source text in the chosen mode, writing
/// `console.log` output to `output`.
pub fn run_source(
    source: &str,
    mode: ExecMode,
    output: Rc<RefCell<dyn OutputSink>>,
) -> Result<(), EngineError> {
    let program = parser::parse(source)?;
    typechecker::check_program(&program, &HashMap::new(), &HashMap::new())?;

    let mut ctx = Context::new(mode, output);
    let global = ctx.global.clone();
    execute_program(&mut ctx, &program, &global)?;
    compiler::vm::drain_jobs(&mut ctx)?;
    Ok(())
}

/// Run a source text and capture its stdout; the harness the conformance
/// tests use to assert both modes byte-for-byte equal.
pub fn run_source_to_string(source: &str, mode: ExecMode) -> Result<String, EngineError> {
    let sink = Rc::new(RefCell::new(BufferSink::default()));
    run_source(source, mode, sink.clone())?;
    let output = sink.borrow().buffer.clone();
    Ok(output)
}

/// Load, check and run a file graph from its entry path.
pub fn run_file(
    entry: &Path,
    mode: ExecMode,
    output: Rc<RefCell<dyn OutputSink>>,
) -> Result<(), EngineError> {
    let units = Loader::new().load(entry)?;
    check_units(&units)?;

    let mut ctx = Context::new(mode, output);
    let mut module_envs: HashMap<PathBuf, Environment> = HashMap::new();

    for unit in &units {
        if unit.is_module {
            let env = ctx.global.child(unit.program.strict);
            for (names, target) in &unit.imports {
                if let Some(dep_env) = module_envs.get(target) {
                    for name in names {
                        let bound = name.alias.as_ref().unwrap_or(&name.name);
                        let value = dep_env
                            .get(&name.name)
                            .unwrap_or(runtime::Value::Undefined);
                        env.define(bound, value, false);
                    }
                }
            }
            execute_program(&mut ctx, &unit.program, &env)?;
            module_envs.insert(unit.path.clone(), env);
        } else {
            // scripts share the global scope
            let global = ctx.global.clone();
            execute_program(&mut ctx, &unit.program, &global)?;
        }
    }

    compiler::vm::drain_jobs(&mut ctx)?;
    Ok(())
}

/// Execute one checked program body against `env` in the context's mode.
fn execute_program(
    ctx: &mut Context,
    program: &Program,
    env: &Environment,
) -> Result<(), EngineError> {
    let outer_strict = env.strict();
    env.set_strict(outer_strict || program.strict);
    let result = match ctx.mode {
        ExecMode::Interpret => interpreter::run_program(ctx, program, env).map_err(Into::into),
        ExecMode::Compile => match compiler::compile_program(program) {
            Ok(code) => compiler::vm::run_code(ctx, code, env)
                .map(|_| ())
                .map_err(Into::into),
            Err(error) => Err(EngineError::from(error)),
        },
    };
    env.set_strict(outer_strict);
    result
}

//! The just-ahead-of-time compiler: lowers checked ASTs to the linear
//! executable representation in [`instruction::Code`]. Function bodies are
//! compiled lazily on first call and cached on the function value; both
//! execution modes use the resulting frames for generator and async
//! suspension.

pub mod instruction;
pub mod vm;

pub use instruction::{Code, Instruction};

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;
use std::rc::Rc;

use crate::lexer::Span;
use crate::parser::ast::*;
use crate::runtime::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Span>,
}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.span {
            Some(span) => write!(
                f,
                "CompileError: {} ({}:{})",
                self.message, span.start.0, span.start.1
            ),
            None => write!(f, "CompileError: {}", self.message),
        }
    }
}

impl Error for CompileError {}

/// Compile a program's top-level statements.
pub fn compile_program(program: &Program) -> Result<Rc<Code>, CompileError> {
    let mut compiler = Compiler::new("<main>", false, false);
    compiler.compile_statements_hoisted(&program.body)?;
    compiler.emit_const(Value::Undefined);
    compiler.emit(Instruction::Return);
    Ok(Rc::new(compiler.code))
}

/// Compile one function body.
pub fn compile_function(func: &FunctionLit) -> Result<Code, CompileError> {
    let name = func.name.clone().unwrap_or_default();
    let mut compiler = Compiler::new(&name, func.is_generator, func.is_async);
    match &func.body {
        FunctionBody::Block(stmts) => {
            compiler.compile_statements_hoisted(stmts)?;
            compiler.emit_const(Value::Undefined);
            compiler.emit(Instruction::Return);
        }
        FunctionBody::Expr(expr) => {
            compiler.compile_expression(expr)?;
            compiler.emit(Instruction::Return);
        }
    }
    Ok(compiler.code)
}

struct LoopCtx {
    breaks: Vec<usize>,
    continues: Vec<usize>,
    /// Scope depth at the break target.
    break_depth: usize,
    /// Scope depth at the continue target.
    continue_depth: usize,
    /// Stack values (iterator handles, discriminants) to pop when breaking.
    break_pops: usize,
    /// Enclosing try count at loop entry.
    try_depth: usize,
    /// Switches accept `break` but pass `continue` through to the loop.
    is_switch: bool,
}

struct TryCtx {
    finally: Option<Vec<Statement>>,
}

struct Compiler {
    code: Code,
    names: HashMap<String, u16>,
    loops: Vec<LoopCtx>,
    trys: Vec<TryCtx>,
    scope_depth: usize,
    last_span: Option<Span>,
}

impl Compiler {
    fn new(name: &str, is_generator: bool, is_async: bool) -> Self {
        Compiler {
            code: Code {
                name: name.to_string(),
                is_generator,
                is_async,
                ..Code::default()
            },
            names: HashMap::new(),
            loops: vec![],
            trys: vec![],
            scope_depth: 0,
            last_span: None,
        }
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.instructions.push(instruction);
        self.code.instructions.len() - 1
    }

    fn here(&self) -> usize {
        self.code.instructions.len()
    }

    fn mark(&mut self, span: Span) {
        if self.last_span != Some(span) {
            self.code.spans.push((self.here(), span));
            self.last_span = Some(span);
        }
    }

    fn patch(&mut self, at: usize, target: usize) {
        use Instruction::*;
        match &mut self.code.instructions[at] {
            Jump(t) | JumpIfFalse(t) | JumpIfTrue(t) | JumpKeepIfFalsy(t)
            | JumpKeepIfTruthy(t) | JumpKeepIfNotNullish(t) => *t = target,
            IterNext { done } => *done = target,
            other => unreachable!("patching a non-jump instruction {other:?}"),
        }
    }

    fn name_index(&mut self, name: &str) -> u16 {
        if let Some(index) = self.names.get(name) {
            return *index;
        }
        self.code.names.push(name.to_string());
        let index = (self.code.names.len() - 1) as u16;
        self.names.insert(name.to_string(), index);
        index
    }

    fn const_index(&mut self, value: Value) -> u16 {
        self.code.constants.push(value);
        (self.code.constants.len() - 1) as u16
    }

    fn emit_const(&mut self, value: Value) {
        let index = self.const_index(value);
        self.emit(Instruction::Const(index));
    }

    fn pattern_index(&mut self, pattern: &Pattern) -> u16 {
        self.code.patterns.push(Rc::new(pattern.clone()));
        (self.code.patterns.len() - 1) as u16
    }

    fn function_index(&mut self, func: &FunctionLit) -> u16 {
        self.code.functions.push(Rc::new(func.clone()));
        (self.code.functions.len() - 1) as u16
    }

    fn class_index(&mut self, decl: &ClassDecl) -> u16 {
        self.code.classes.push(Rc::new(decl.clone()));
        (self.code.classes.len() - 1) as u16
    }

    fn error(&self, message: impl Into<String>, span: Span) -> CompileError {
        CompileError {
            message: message.into(),
            span: Some(span),
        }
    }

    // -- statements --------------------------------------------------------

    fn compile_statements_hoisted(&mut self, stmts: &[Statement]) -> Result<(), CompileError> {
        for stmt in stmts {
            let func = match &stmt.kind {
                StmtKind::FunctionDecl(func) => Some(func),
                StmtKind::Export(inner) => match &inner.kind {
                    StmtKind::FunctionDecl(func) => Some(func),
                    _ => None,
                },
                _ => None,
            };
            if let Some(func) = func {
                if func.is_signature {
                    continue;
                }
                let index = self.function_index(func);
                self.emit(Instruction::MakeFunction(index));
                let name = self.name_index(func.name.as_deref().unwrap_or_default());
                self.emit(Instruction::DeclareVar {
                    name,
                    mutable: true,
                });
            }
        }
        for stmt in stmts {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statements(&mut self, stmts: &[Statement]) -> Result<(), CompileError> {
        self.compile_statements_hoisted(stmts)
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        self.mark(stmt.span);
        match &stmt.kind {
            StmtKind::VarDecl { kind, declarations } => {
                for declarator in declarations {
                    match &declarator.init {
                        Some(init) => self.compile_expression(init)?,
                        None => self.emit_const(Value::Undefined),
                    }
                    let pattern = self.pattern_index(&declarator.pattern);
                    self.emit(Instruction::Destructure {
                        pattern,
                        mutable: *kind != DeclKind::Const,
                    });
                }
                Ok(())
            }
            StmtKind::FunctionDecl(_) => Ok(()), // hoisted
            StmtKind::ClassDecl(decl) => {
                self.check_class_lowerable(decl, false)?;
                let index = self.class_index(decl);
                self.emit(Instruction::MakeClass(index));
                let name = self.name_index(decl.name.as_deref().unwrap_or_default());
                self.emit(Instruction::DeclareVar {
                    name,
                    mutable: false,
                });
                Ok(())
            }
            StmtKind::InterfaceDecl(_) | StmtKind::TypeAlias { .. } | StmtKind::Empty => Ok(()),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.compile_expression(cond)?;
                let to_else = self.emit(Instruction::JumpIfFalse(0));
                self.compile_statement(then)?;
                match otherwise {
                    Some(otherwise) => {
                        let to_end = self.emit(Instruction::Jump(0));
                        let else_target = self.here();
                        self.patch(to_else, else_target);
                        self.compile_statement(otherwise)?;
                        let end = self.here();
                        self.patch(to_end, end);
                    }
                    None => {
                        let end = self.here();
                        self.patch(to_else, end);
                    }
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let start = self.here();
                self.compile_expression(cond)?;
                let exit = self.emit(Instruction::JumpIfFalse(0));
                self.loops.push(LoopCtx {
                    breaks: vec![],
                    continues: vec![],
                    break_depth: self.scope_depth,
                    continue_depth: self.scope_depth,
                    break_pops: 0,
                    try_depth: self.trys.len(),
                    is_switch: false,
                });
                self.compile_statement(body)?;
                self.emit(Instruction::Jump(start));
                let end = self.here();
                self.patch(exit, end);
                let ctx = self.loops.pop().unwrap();
                for jump in ctx.breaks {
                    self.patch(jump, end);
                }
                for jump in ctx.continues {
                    self.patch(jump, start);
                }
                Ok(())
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.emit(Instruction::PushScope);
                self.scope_depth += 1;
                if let Some(init) = init {
                    self.compile_statement(init)?;
                }
                let start = self.here();
                let exit = match test {
                    Some(test) => {
                        self.compile_expression(test)?;
                        Some(self.emit(Instruction::JumpIfFalse(0)))
                    }
                    None => None,
                };
                self.loops.push(LoopCtx {
                    breaks: vec![],
                    continues: vec![],
                    break_depth: self.scope_depth,
                    continue_depth: self.scope_depth,
                    break_pops: 0,
                    try_depth: self.trys.len(),
                    is_switch: false,
                });
                self.compile_statement(body)?;
                let continue_target = self.here();
                if let Some(update) = update {
                    self.compile_expression(update)?;
                    self.emit(Instruction::Pop);
                }
                self.emit(Instruction::Jump(start));
                let end = self.here();
                if let Some(exit) = exit {
                    self.patch(exit, end);
                }
                let ctx = self.loops.pop().unwrap();
                for jump in ctx.breaks {
                    self.patch(jump, end);
                }
                for jump in ctx.continues {
                    self.patch(jump, continue_target);
                }
                self.emit(Instruction::PopScope);
                self.scope_depth -= 1;
                Ok(())
            }
            StmtKind::ForOf {
                pattern, iterable, body, ..
            } => {
                self.compile_expression(iterable)?;
                self.emit(Instruction::GetIter);
                let start = self.here();
                let step = self.emit(Instruction::IterNext { done: 0 });
                self.emit(Instruction::PushScope);
                self.scope_depth += 1;
                let pattern_index = self.pattern_index(pattern);
                self.emit(Instruction::Destructure {
                    pattern: pattern_index,
                    mutable: true,
                });
                self.loops.push(LoopCtx {
                    breaks: vec![],
                    continues: vec![],
                    break_depth: self.scope_depth - 1,
                    continue_depth: self.scope_depth,
                    break_pops: 1, // the iterator handle
                    try_depth: self.trys.len(),
                    is_switch: false,
                });
                self.compile_statement(body)?;
                let continue_target = self.here();
                self.emit(Instruction::PopScope);
                self.scope_depth -= 1;
                self.emit(Instruction::Jump(start));
                let done = self.here();
                self.patch(step, done);
                self.emit(Instruction::Pop); // the iterator's return value
                let end = self.here();
                let ctx = self.loops.pop().unwrap();
                for jump in ctx.breaks {
                    self.patch(jump, end);
                }
                for jump in ctx.continues {
                    self.patch(jump, continue_target);
                }
                Ok(())
            }
            StmtKind::ForIn {
                name, object, body, ..
            } => {
                self.compile_expression(object)?;
                self.emit(Instruction::EnumKeys);
                self.emit(Instruction::GetIter);
                let start = self.here();
                let step = self.emit(Instruction::IterNext { done: 0 });
                self.emit(Instruction::PushScope);
                self.scope_depth += 1;
                let name_index = self.name_index(name);
                self.emit(Instruction::DeclareVar {
                    name: name_index,
                    mutable: true,
                });
                self.loops.push(LoopCtx {
                    breaks: vec![],
                    continues: vec![],
                    break_depth: self.scope_depth - 1,
                    continue_depth: self.scope_depth,
                    break_pops: 1,
                    try_depth: self.trys.len(),
                    is_switch: false,
                });
                self.compile_statement(body)?;
                let continue_target = self.here();
                self.emit(Instruction::PopScope);
                self.scope_depth -= 1;
                self.emit(Instruction::Jump(start));
                let done = self.here();
                self.patch(step, done);
                self.emit(Instruction::Pop);
                let end = self.here();
                let ctx = self.loops.pop().unwrap();
                for jump in ctx.breaks {
                    self.patch(jump, end);
                }
                for jump in ctx.continues {
                    self.patch(jump, continue_target);
                }
                Ok(())
            }
            StmtKind::Return(argument) => {
                match argument {
                    Some(argument) => self.compile_expression(argument)?,
                    None => self.emit_const(Value::Undefined),
                }
                self.emit(Instruction::Return);
                Ok(())
            }
            StmtKind::Throw(argument) => {
                self.compile_expression(argument)?;
                self.emit(Instruction::Throw);
                Ok(())
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => self.compile_try(block, catch.as_ref(), finally.as_deref()),
            StmtKind::Break => {
                let Some(position) = self.loops.len().checked_sub(1) else {
                    return Err(self.error("'break' outside of a loop", stmt.span));
                };
                self.emit_unwind_to_loop(position, true)?;
                let jump = self.emit(Instruction::Jump(0));
                self.loops[position].breaks.push(jump);
                Ok(())
            }
            StmtKind::Continue => {
                let Some(position) = self
                    .loops
                    .iter()
                    .rposition(|ctx| !ctx.is_switch)
                else {
                    return Err(self.error("'continue' outside of a loop", stmt.span));
                };
                self.emit_unwind_to_loop(position, false)?;
                let jump = self.emit(Instruction::Jump(0));
                self.loops[position].continues.push(jump);
                Ok(())
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.compile_switch(discriminant, cases),
            StmtKind::Block(stmts) => {
                self.emit(Instruction::PushScope);
                self.scope_depth += 1;
                self.compile_statements_hoisted(stmts)?;
                self.emit(Instruction::PopScope);
                self.scope_depth -= 1;
                Ok(())
            }
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Instruction::Pop);
                Ok(())
            }
            StmtKind::Import { .. } => Ok(()), // bindings are installed by the loader
            StmtKind::Export(inner) => match &inner.kind {
                StmtKind::FunctionDecl(_) => Ok(()), // hoisted
                _ => self.compile_statement(inner),
            },
        }
    }

    /// Pop scopes, close trys (running their finally blocks inline) and
    /// drop loop-owned stack values before a break or continue jump.
    fn emit_unwind_to_loop(&mut self, position: usize, is_break: bool) -> Result<(), CompileError> {
        let target_try_depth = self.loops[position].try_depth;
        let finally_bodies: Vec<Option<Vec<Statement>>> = self.trys[target_try_depth..]
            .iter()
            .rev()
            .map(|ctx| ctx.finally.clone())
            .collect();
        for finally in finally_bodies {
            self.emit(Instruction::TryPop);
            if let Some(body) = finally {
                // an inline copy of the finally block runs on early exit
                let saved = std::mem::take(&mut self.trys);
                let result = self.compile_statements(&body);
                self.trys = saved;
                result?;
            }
        }

        let target_depth = if is_break {
            self.loops[position].break_depth
        } else {
            self.loops[position].continue_depth
        };
        for _ in target_depth..self.scope_depth {
            self.emit(Instruction::PopScope);
        }
        // stack values owned by the loops being jumped out of (iterator
        // handles, switch discriminants)
        let mut pops: usize = self.loops[position + 1..]
            .iter()
            .map(|ctx| ctx.break_pops)
            .sum();
        if is_break {
            pops += self.loops[position].break_pops;
        }
        for _ in 0..pops {
            self.emit(Instruction::Pop);
        }
        Ok(())
    }

    fn compile_try(
        &mut self,
        block: &[Statement],
        catch: Option<&CatchClause>,
        finally: Option<&[Statement]>,
    ) -> Result<(), CompileError> {
        let finally_handler = finally.map(|_| self.emit(Instruction::TryPush { catch: None, finally: Some(0) }));
        if finally_handler.is_some() {
            self.trys.push(TryCtx {
                finally: finally.map(|f| f.to_vec()),
            });
        }
        let catch_handler = catch.map(|_| self.emit(Instruction::TryPush { catch: Some(0), finally: None }));
        if catch_handler.is_some() {
            self.trys.push(TryCtx { finally: None });
        }

        self.emit(Instruction::PushScope);
        self.scope_depth += 1;
        self.compile_statements_hoisted(block)?;
        self.emit(Instruction::PopScope);
        self.scope_depth -= 1;

        let mut after_catch_jumps = vec![];
        if let Some(catch_push) = catch_handler {
            self.trys.pop();
            self.emit(Instruction::TryPop);
            after_catch_jumps.push(self.emit(Instruction::Jump(0)));

            let catch_addr = self.here();
            if let Instruction::TryPush { catch, .. } = &mut self.code.instructions[catch_push] {
                *catch = Some(catch_addr);
            }
            // the thrown value is on the stack here
            let clause = catch.unwrap();
            self.emit(Instruction::PushScope);
            self.scope_depth += 1;
            match &clause.param {
                Some(param) => {
                    let pattern = self.pattern_index(param);
                    self.emit(Instruction::Destructure {
                        pattern,
                        mutable: true,
                    });
                }
                None => {
                    self.emit(Instruction::Pop);
                }
            }
            self.compile_statements_hoisted(&clause.body)?;
            self.emit(Instruction::PopScope);
            self.scope_depth -= 1;
        }
        let after_catch = self.here();
        for jump in after_catch_jumps {
            self.patch(jump, after_catch);
        }

        if let Some(finally_push) = finally_handler {
            self.trys.pop();
            self.emit(Instruction::TryPop);
            // normal-path copy
            self.emit(Instruction::PushScope);
            self.scope_depth += 1;
            self.compile_statements_hoisted(finally.unwrap())?;
            self.emit(Instruction::PopScope);
            self.scope_depth -= 1;
            let to_end = self.emit(Instruction::Jump(0));

            // unwinding-path copy
            let finally_addr = self.here();
            if let Instruction::TryPush { finally, .. } = &mut self.code.instructions[finally_push]
            {
                *finally = Some(finally_addr);
            }
            self.emit(Instruction::PushScope);
            self.scope_depth += 1;
            self.compile_statements_hoisted(finally.unwrap())?;
            self.emit(Instruction::PopScope);
            self.scope_depth -= 1;
            self.emit(Instruction::EndFinally);

            let end = self.here();
            self.patch(to_end, end);
        }

        Ok(())
    }

    fn compile_switch(
        &mut self,
        discriminant: &Expression,
        cases: &[SwitchCase],
    ) -> Result<(), CompileError> {
        self.compile_expression(discriminant)?;
        self.emit(Instruction::PushScope);
        self.scope_depth += 1;

        let mut case_jumps = vec![];
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                self.emit(Instruction::Dup);
                self.compile_expression(test)?;
                self.emit(Instruction::Binary(BinaryOp::EqStrict));
                case_jumps.push((index, self.emit(Instruction::JumpIfTrue(0))));
            }
        }
        let default_jump = self.emit(Instruction::Jump(0));
        let default_index = cases.iter().position(|case| case.test.is_none());

        self.loops.push(LoopCtx {
            breaks: vec![],
            continues: vec![],
            break_depth: self.scope_depth - 1,
            continue_depth: 0,
            break_pops: 1, // the discriminant
            try_depth: self.trys.len(),
            is_switch: true,
        });

        let mut case_addrs = vec![];
        for case in cases {
            case_addrs.push(self.here());
            self.compile_statements_hoisted(&case.body)?;
        }
        for (index, jump) in case_jumps {
            self.patch(jump, case_addrs[index]);
        }
        match default_index {
            Some(index) => self.patch(default_jump, case_addrs[index]),
            None => {
                let fallthrough_end = self.here();
                self.patch(default_jump, fallthrough_end);
            }
        }

        self.emit(Instruction::PopScope);
        self.scope_depth -= 1;
        self.emit(Instruction::Pop); // the discriminant
        let end = self.here();
        let ctx = self.loops.pop().unwrap();
        for jump in ctx.breaks {
            self.patch(jump, end);
        }
        Ok(())
    }

    // -- expressions -------------------------------------------------------

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        self.mark(expr.span);
        match &expr.kind {
            ExprKind::Number(n) => {
                self.emit_const(Value::Number(*n));
                Ok(())
            }
            ExprKind::Str(s) => {
                self.emit_const(Value::str(s.clone()));
                Ok(())
            }
            ExprKind::Bool(b) => {
                self.emit_const(Value::Bool(*b));
                Ok(())
            }
            ExprKind::Null => {
                self.emit_const(Value::Null);
                Ok(())
            }
            ExprKind::Undefined => {
                self.emit_const(Value::Undefined);
                Ok(())
            }
            ExprKind::Regex { pattern, flags } => {
                self.emit_const(Value::Regex(Rc::new(crate::runtime::value::RegexValue {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                })));
                Ok(())
            }
            ExprKind::Template { quasis, exprs } => {
                self.emit_const(Value::str(quasis.first().cloned().unwrap_or_default()));
                for (index, part) in exprs.iter().enumerate() {
                    self.compile_expression(part)?;
                    self.emit(Instruction::Binary(BinaryOp::Add));
                    if let Some(quasi) = quasis.get(index + 1) {
                        if !quasi.is_empty() {
                            self.emit_const(Value::str(quasi.clone()));
                            self.emit(Instruction::Binary(BinaryOp::Add));
                        }
                    }
                }
                Ok(())
            }
            ExprKind::Ident(name) => {
                let index = self.name_index(name);
                self.emit(Instruction::LoadVar(index));
                Ok(())
            }
            ExprKind::This => {
                self.emit(Instruction::LoadThis);
                Ok(())
            }
            ExprKind::Super => Err(self.error("'super' must be called or accessed", expr.span)),
            ExprKind::Grouping(inner) => self.compile_expression(inner),
            ExprKind::Unary { op, operand } => self.compile_unary(*op, operand, expr.span),
            ExprKind::Update {
                prefix,
                increment,
                target,
            } => self.compile_update(*prefix, *increment, target, expr.span),
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expression(lhs)?;
                self.compile_expression(rhs)?;
                self.emit(Instruction::Binary(*op));
                Ok(())
            }
            ExprKind::Logical { op, lhs, rhs } => {
                self.compile_expression(lhs)?;
                let jump = match op {
                    LogicalOp::And => self.emit(Instruction::JumpKeepIfFalsy(0)),
                    LogicalOp::Or => self.emit(Instruction::JumpKeepIfTruthy(0)),
                    LogicalOp::Nullish => self.emit(Instruction::JumpKeepIfNotNullish(0)),
                };
                self.compile_expression(rhs)?;
                let end = self.here();
                self.patch(jump, end);
                Ok(())
            }
            ExprKind::Assign { op, target, value } => {
                self.compile_assign(*op, target, value, expr.span)
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.compile_expression(cond)?;
                let to_else = self.emit(Instruction::JumpIfFalse(0));
                self.compile_expression(then)?;
                let to_end = self.emit(Instruction::Jump(0));
                let else_target = self.here();
                self.patch(to_else, else_target);
                self.compile_expression(otherwise)?;
                let end = self.here();
                self.patch(to_end, end);
                Ok(())
            }
            ExprKind::Call { callee, args } => self.compile_call(callee, args),
            ExprKind::New { callee, args, .. } => {
                self.compile_expression(callee)?;
                self.compile_arguments(args)?;
                self.emit(Instruction::New);
                Ok(())
            }
            ExprKind::Member { object, property } => {
                if matches!(object.kind, ExprKind::Super) {
                    let MemberKey::Dot(name) = property else {
                        return Err(
                            self.error("'super' members must be accessed by name", expr.span)
                        );
                    };
                    let index = self.name_index(name);
                    self.emit(Instruction::SuperGet(index));
                    return Ok(());
                }
                self.compile_expression(object)?;
                match property {
                    MemberKey::Dot(name) => {
                        let index = self.name_index(name);
                        self.emit(Instruction::GetProp(index));
                    }
                    MemberKey::Bracket(key) => {
                        self.compile_expression(key)?;
                        self.emit(Instruction::GetIndex);
                    }
                }
                Ok(())
            }
            ExprKind::ArrayLit(items) => {
                self.emit(Instruction::NewArray);
                for item in items {
                    match item {
                        ArrayItem::Hole => {
                            self.emit_const(Value::Undefined);
                            self.emit(Instruction::ArrayPush);
                        }
                        ArrayItem::Item { spread, expr } => {
                            self.compile_expression(expr)?;
                            if *spread {
                                self.emit(Instruction::ArrayExtend);
                            } else {
                                self.emit(Instruction::ArrayPush);
                            }
                        }
                    }
                }
                Ok(())
            }
            ExprKind::ObjectLit(props) => self.compile_object_literal(props),
            ExprKind::Function(func) | ExprKind::Arrow(func) => {
                let index = self.function_index(func);
                self.emit(Instruction::MakeFunction(index));
                Ok(())
            }
            ExprKind::ClassExpr(decl) => {
                self.check_class_lowerable(decl, true)?;
                let index = self.class_index(decl);
                self.emit(Instruction::MakeClass(index));
                Ok(())
            }
            ExprKind::TypeAssertion { expr, .. } => self.compile_expression(expr),
            ExprKind::NonNull(inner) => self.compile_expression(inner),
            ExprKind::Yield { argument, delegate } => {
                if *delegate {
                    self.compile_expression(argument.as_ref().unwrap())?;
                    self.emit(Instruction::GetIter);
                    let start = self.here();
                    let step = self.emit(Instruction::IterNext { done: 0 });
                    self.emit(Instruction::Yield);
                    self.emit(Instruction::Pop); // the value sent into resume
                    self.emit(Instruction::Jump(start));
                    let done = self.here();
                    self.patch(step, done);
                    // the delegate's return value stays as the expression value
                    return Ok(());
                }
                match argument {
                    Some(argument) => self.compile_expression(argument)?,
                    None => self.emit_const(Value::Undefined),
                }
                self.emit(Instruction::Yield);
                Ok(())
            }
            ExprKind::Await(argument) => {
                self.compile_expression(argument)?;
                self.emit(Instruction::Await);
                Ok(())
            }
        }
    }

    fn compile_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expression,
        span: Span,
    ) -> Result<(), CompileError> {
        if op == UnaryOp::Typeof {
            if let ExprKind::Ident(name) = &operand.kind {
                let index = self.name_index(name);
                self.emit(Instruction::TypeofVar(index));
                return Ok(());
            }
        }
        if op == UnaryOp::Delete {
            return match &operand.kind {
                ExprKind::Member { object, property } => {
                    self.compile_expression(object)?;
                    match property {
                        MemberKey::Dot(name) => {
                            let index = self.name_index(name);
                            self.emit(Instruction::DeleteProp(index));
                        }
                        MemberKey::Bracket(key) => {
                            self.compile_expression(key)?;
                            self.emit(Instruction::DeleteIndex);
                        }
                    }
                    Ok(())
                }
                ExprKind::Ident(_) => {
                    self.emit_const(Value::Bool(false));
                    Ok(())
                }
                _ => {
                    self.compile_expression(operand)?;
                    self.emit(Instruction::Pop);
                    self.emit_const(Value::Bool(true));
                    Ok(())
                }
            };
        }
        let _ = span;
        self.compile_expression(operand)?;
        self.emit(Instruction::Unary(op));
        Ok(())
    }

    fn compile_update(
        &mut self,
        prefix: bool,
        increment: bool,
        target: &Expression,
        span: Span,
    ) -> Result<(), CompileError> {
        let op = if increment { BinaryOp::Add } else { BinaryOp::Sub };
        match &target.kind {
            ExprKind::Ident(name) => {
                let index = self.name_index(name);
                self.emit(Instruction::LoadVar(index));
                self.emit(Instruction::ToNumber);
                if !prefix {
                    self.emit(Instruction::Dup);
                    self.emit(Instruction::Stash);
                }
                self.emit_const(Value::Number(1.0));
                self.emit(Instruction::Binary(op));
                self.emit(Instruction::StoreVar(index));
                if !prefix {
                    self.emit(Instruction::Pop);
                    self.emit(Instruction::Unstash);
                }
                Ok(())
            }
            ExprKind::Member { object, property } => {
                self.compile_expression(object)?;
                match property {
                    MemberKey::Dot(name) => {
                        let index = self.name_index(name);
                        self.emit(Instruction::Dup);
                        self.emit(Instruction::GetProp(index));
                        self.emit(Instruction::ToNumber);
                        if !prefix {
                            self.emit(Instruction::Dup);
                            self.emit(Instruction::Stash);
                        }
                        self.emit_const(Value::Number(1.0));
                        self.emit(Instruction::Binary(op));
                        self.emit(Instruction::SetProp(index));
                        if !prefix {
                            self.emit(Instruction::Pop);
                            self.emit(Instruction::Unstash);
                        }
                        Ok(())
                    }
                    MemberKey::Bracket(key) => {
                        self.compile_expression(key)?;
                        self.emit(Instruction::Dup2);
                        self.emit(Instruction::GetIndex);
                        self.emit(Instruction::ToNumber);
                        if !prefix {
                            self.emit(Instruction::Dup);
                            self.emit(Instruction::Stash);
                        }
                        self.emit_const(Value::Number(1.0));
                        self.emit(Instruction::Binary(op));
                        self.emit(Instruction::SetIndex);
                        if !prefix {
                            self.emit(Instruction::Pop);
                            self.emit(Instruction::Unstash);
                        }
                        Ok(())
                    }
                }
            }
            _ => Err(self.error("invalid increment/decrement target", span)),
        }
    }

    fn compile_assign(
        &mut self,
        op: AssignOp,
        target: &Expression,
        value: &Expression,
        span: Span,
    ) -> Result<(), CompileError> {
        let binary_op = match op {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Rem => Some(BinaryOp::Rem),
        };

        match &target.kind {
            ExprKind::Ident(name) => {
                let index = self.name_index(name);
                match binary_op {
                    None => self.compile_expression(value)?,
                    Some(op) => {
                        self.emit(Instruction::LoadVar(index));
                        self.compile_expression(value)?;
                        self.emit(Instruction::Binary(op));
                    }
                }
                self.emit(Instruction::StoreVar(index));
                Ok(())
            }
            ExprKind::Member { object, property } => {
                if matches!(object.kind, ExprKind::Super) {
                    return Err(self.error("cannot assign through 'super'", span));
                }
                self.compile_expression(object)?;
                match property {
                    MemberKey::Dot(name) => {
                        let index = self.name_index(name);
                        match binary_op {
                            None => self.compile_expression(value)?,
                            Some(op) => {
                                self.emit(Instruction::Dup);
                                self.emit(Instruction::GetProp(index));
                                self.compile_expression(value)?;
                                self.emit(Instruction::Binary(op));
                            }
                        }
                        self.emit(Instruction::SetProp(index));
                    }
                    MemberKey::Bracket(key) => {
                        self.compile_expression(key)?;
                        match binary_op {
                            None => self.compile_expression(value)?,
                            Some(op) => {
                                self.emit(Instruction::Dup2);
                                self.emit(Instruction::GetIndex);
                                self.compile_expression(value)?;
                                self.emit(Instruction::Binary(op));
                            }
                        }
                        self.emit(Instruction::SetIndex);
                    }
                }
                Ok(())
            }
            ExprKind::Grouping(inner) => self.compile_assign(op, inner, value, span),
            _ => Err(self.error("invalid assignment target", span)),
        }
    }

    fn compile_arguments(&mut self, args: &[Argument]) -> Result<(), CompileError> {
        self.emit(Instruction::NewArray);
        for arg in args {
            self.compile_expression(&arg.expr)?;
            if arg.spread {
                self.emit(Instruction::ArrayExtend);
            } else {
                self.emit(Instruction::ArrayPush);
            }
        }
        Ok(())
    }

    fn compile_call(
        &mut self,
        callee: &Expression,
        args: &[Argument],
    ) -> Result<(), CompileError> {
        let callee = match &callee.kind {
            ExprKind::Grouping(inner) => inner.as_ref(),
            _ => callee,
        };

        match &callee.kind {
            ExprKind::Super => {
                self.compile_arguments(args)?;
                self.emit(Instruction::SuperCall);
                Ok(())
            }
            ExprKind::Member { object, property } if matches!(object.kind, ExprKind::Super) => {
                let MemberKey::Dot(name) = property else {
                    return Err(
                        self.error("'super' members must be accessed by name", callee.span)
                    );
                };
                let index = self.name_index(name);
                self.compile_arguments(args)?;
                self.emit(Instruction::SuperCallMethod(index));
                Ok(())
            }
            ExprKind::Member { object, property } => {
                self.compile_expression(object)?;
                self.emit(Instruction::Dup);
                match property {
                    MemberKey::Dot(name) => {
                        let index = self.name_index(name);
                        self.emit(Instruction::GetProp(index));
                    }
                    MemberKey::Bracket(key) => {
                        self.compile_expression(key)?;
                        self.emit(Instruction::GetIndex);
                    }
                }
                self.compile_arguments(args)?;
                self.emit(Instruction::CallMethod);
                Ok(())
            }
            _ => {
                self.compile_expression(callee)?;
                self.compile_arguments(args)?;
                self.emit(Instruction::Call);
                Ok(())
            }
        }
    }

    fn compile_object_literal(&mut self, props: &[ObjectProp]) -> Result<(), CompileError> {
        self.emit(Instruction::NewObject);
        for prop in props {
            match prop {
                ObjectProp::KeyValue { key, value } => match key {
                    PropKey::Ident(name) | PropKey::Str(name) => {
                        let index = self.name_index(name);
                        self.emit(Instruction::Dup);
                        self.compile_expression(value)?;
                        self.emit(Instruction::SetProp(index));
                        self.emit(Instruction::Pop);
                    }
                    PropKey::Number(n) => {
                        let name = crate::runtime::format_number(*n);
                        let index = self.name_index(&name);
                        self.emit(Instruction::Dup);
                        self.compile_expression(value)?;
                        self.emit(Instruction::SetProp(index));
                        self.emit(Instruction::Pop);
                    }
                    PropKey::Computed(key_expr) => {
                        self.emit(Instruction::Dup);
                        self.compile_expression(key_expr)?;
                        self.compile_expression(value)?;
                        self.emit(Instruction::SetIndex);
                        self.emit(Instruction::Pop);
                    }
                },
                ObjectProp::Shorthand(name) => {
                    let index = self.name_index(name);
                    self.emit(Instruction::Dup);
                    self.emit(Instruction::LoadVar(index));
                    self.emit(Instruction::SetProp(index));
                    self.emit(Instruction::Pop);
                }
                ObjectProp::Spread(expr) => {
                    self.compile_expression(expr)?;
                    self.emit(Instruction::ObjectSpread);
                }
                ObjectProp::Getter { key, func } | ObjectProp::Setter { key, func } => {
                    let getter = matches!(prop, ObjectProp::Getter { .. });
                    let name = match key {
                        PropKey::Ident(name) | PropKey::Str(name) => name.clone(),
                        PropKey::Number(n) => crate::runtime::format_number(*n),
                        PropKey::Computed(_) => {
                            return Err(CompileError {
                                message: "computed accessor names are not supported".into(),
                                span: None,
                            })
                        }
                    };
                    let name = self.name_index(&name);
                    let func = self.function_index(func);
                    self.emit(Instruction::DefineAccessor { name, getter, func });
                }
            }
        }
        Ok(())
    }

    /// The compiler refuses constructs that stay interpreter-only: static
    /// blocks in class expressions, and dynamic `this.method()` dispatch
    /// inside any static block.
    fn check_class_lowerable(
        &self,
        decl: &ClassDecl,
        is_expression: bool,
    ) -> Result<(), CompileError> {
        for member in &decl.members {
            let ClassMemberKind::StaticBlock(body) = &member.kind else {
                continue;
            };
            if is_expression {
                return Err(self.error(
                    "the compiler cannot lower static initialization blocks in class expressions",
                    member.span,
                ));
            }
            if stmts_use_dynamic_this_dispatch(body) {
                return Err(self.error(
                    "the compiler cannot lower dynamic 'this' method dispatch inside static blocks",
                    member.span,
                ));
            }
        }
        Ok(())
    }
}

/// Does any statement perform a `this.method(…)` call?
fn stmts_use_dynamic_this_dispatch(stmts: &[Statement]) -> bool {
    stmts.iter().any(stmt_uses_dynamic_this_dispatch)
}

fn stmt_uses_dynamic_this_dispatch(stmt: &Statement) -> bool {
    match &stmt.kind {
        StmtKind::VarDecl { declarations, .. } => declarations
            .iter()
            .filter_map(|d| d.init.as_ref())
            .any(expr_uses_dynamic_this_dispatch),
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => {
            expr_uses_dynamic_this_dispatch(cond)
                || stmt_uses_dynamic_this_dispatch(then)
                || otherwise
                    .as_ref()
                    .is_some_and(|s| stmt_uses_dynamic_this_dispatch(s))
        }
        StmtKind::While { cond, body } => {
            expr_uses_dynamic_this_dispatch(cond) || stmt_uses_dynamic_this_dispatch(body)
        }
        StmtKind::For {
            init,
            test,
            update,
            body,
        } => {
            init.as_ref().is_some_and(|s| stmt_uses_dynamic_this_dispatch(s))
                || test.as_ref().is_some_and(expr_uses_dynamic_this_dispatch)
                || update.as_ref().is_some_and(expr_uses_dynamic_this_dispatch)
                || stmt_uses_dynamic_this_dispatch(body)
        }
        StmtKind::ForOf { iterable, body, .. } => {
            expr_uses_dynamic_this_dispatch(iterable) || stmt_uses_dynamic_this_dispatch(body)
        }
        StmtKind::ForIn { object, body, .. } => {
            expr_uses_dynamic_this_dispatch(object) || stmt_uses_dynamic_this_dispatch(body)
        }
        StmtKind::Return(argument) => argument
            .as_ref()
            .is_some_and(expr_uses_dynamic_this_dispatch),
        StmtKind::Throw(argument) => expr_uses_dynamic_this_dispatch(argument),
        StmtKind::Try {
            block,
            catch,
            finally,
        } => {
            stmts_use_dynamic_this_dispatch(block)
                || catch
                    .as_ref()
                    .is_some_and(|c| stmts_use_dynamic_this_dispatch(&c.body))
                || finally
                    .as_ref()
                    .is_some_and(|f| stmts_use_dynamic_this_dispatch(f))
        }
        StmtKind::Switch {
            discriminant,
            cases,
        } => {
            expr_uses_dynamic_this_dispatch(discriminant)
                || cases.iter().any(|case| {
                    case.test.as_ref().is_some_and(expr_uses_dynamic_this_dispatch)
                        || stmts_use_dynamic_this_dispatch(&case.body)
                })
        }
        StmtKind::Block(stmts) => stmts_use_dynamic_this_dispatch(stmts),
        StmtKind::Expression(expr) => expr_uses_dynamic_this_dispatch(expr),
        StmtKind::Export(inner) => stmt_uses_dynamic_this_dispatch(inner),
        _ => false,
    }
}

fn expr_uses_dynamic_this_dispatch(expr: &Expression) -> bool {
    match &expr.kind {
        ExprKind::Call { callee, args } => {
            let is_this_method = matches!(
                &callee.kind,
                ExprKind::Member { object, .. } if matches!(object.kind, ExprKind::This)
            );
            is_this_method
                || expr_uses_dynamic_this_dispatch(callee)
                || args.iter().any(|a| expr_uses_dynamic_this_dispatch(&a.expr))
        }
        ExprKind::Grouping(inner)
        | ExprKind::Unary { operand: inner, .. }
        | ExprKind::NonNull(inner)
        | ExprKind::TypeAssertion { expr: inner, .. }
        | ExprKind::Await(inner) => expr_uses_dynamic_this_dispatch(inner),
        ExprKind::Update { target, .. } => expr_uses_dynamic_this_dispatch(target),
        ExprKind::Binary { lhs, rhs, .. } | ExprKind::Logical { lhs, rhs, .. } => {
            expr_uses_dynamic_this_dispatch(lhs) || expr_uses_dynamic_this_dispatch(rhs)
        }
        ExprKind::Assign { target, value, .. } => {
            expr_uses_dynamic_this_dispatch(target) || expr_uses_dynamic_this_dispatch(value)
        }
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => {
            expr_uses_dynamic_this_dispatch(cond)
                || expr_uses_dynamic_this_dispatch(then)
                || expr_uses_dynamic_this_dispatch(otherwise)
        }
        ExprKind::New { callee, args, .. } => {
            expr_uses_dynamic_this_dispatch(callee)
                || args.iter().any(|a| expr_uses_dynamic_this_dispatch(&a.expr))
        }
        ExprKind::Member { object, property } => {
            expr_uses_dynamic_this_dispatch(object)
                || matches!(property, MemberKey::Bracket(key) if expr_uses_dynamic_this_dispatch(key))
        }
        ExprKind::ArrayLit(items) => items.iter().any(|item| match item {
            ArrayItem::Item { expr, .. } => expr_uses_dynamic_this_dispatch(expr),
            ArrayItem::Hole => false,
        }),
        ExprKind::ObjectLit(props) => props.iter().any(|prop| match prop {
            ObjectProp::KeyValue { value, .. } => expr_uses_dynamic_this_dispatch(value),
            ObjectProp::Spread(expr) => expr_uses_dynamic_this_dispatch(expr),
            _ => false,
        }),
        ExprKind::Template { exprs, .. } => exprs.iter().any(expr_uses_dynamic_this_dispatch),
        ExprKind::Yield { argument, .. } => argument
            .as_deref()
            .is_some_and(expr_uses_dynamic_this_dispatch),
        _ => false,
    }
}

//! The processor: call stack, global context, type table, and the
//! `compile`/`run`/`call` entry points every task, function and lambda
//! call goes through. Grounded in `examples/original_source/src/processor.cc`.

use crate::ast::{Expr, FunctionDecl, Identifier, Program, TopLevel};
use crate::context::GlobalContext;
use crate::control::{ControlResult, Unwind};
use crate::errors::{CompileError, FrameInfo, RuntimeError};
use crate::eval::{self, EvalCtx};
use crate::ir::type_table::{Type, TypeTable};
use crate::semantic;
use crate::tasks;
use crate::value::Variant;

/// A callback the embedder registers to receive `LOG` statement output.
/// Kept separate from the `tracing`-based internal diagnostics per
/// `SPEC_FULL.md` §4.11.
pub type Logger = Box<dyn FnMut(&str)>;

pub struct Processor {
    pub global: GlobalContext,
    pub type_table: TypeTable,
    pub call_stack: Vec<FrameInfo>,
    /// `EngineOptions.locale`, mirrored here so `numeric.format`/
    /// `date.format` (dispatched through [`crate::functions::call_pure`])
    /// can see it without threading `Engine` itself down into the
    /// evaluator.
    pub locale: String,
    environment: Option<Box<dyn crate::db::Environment>>,
    logger: Option<Logger>,
}

impl Processor {
    pub fn new() -> Self {
        Self {
            global: GlobalContext::new(),
            type_table: TypeTable::new(),
            call_stack: Vec::new(),
            locale: "en-US".to_string(),
            environment: None,
            logger: None,
        }
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = Some(logger);
    }

    pub fn log(&mut self, message: &str) {
        match &mut self.logger {
            Some(logger) => logger(message),
            None => tracing::info!(target: "argon::script", "{message}"),
        }
    }

    /// Two-pass compilation: Pass 1 registers every declared connection,
    /// table/sql template, task and function; Pass 2 instantiates global
    /// connections and variable initializers, then runs the per-task
    /// invariant checks.
    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        let mut diagnostics = semantic::pass1_register_types(program, &mut self.type_table);

        for decl in &program.decls {
            if let TopLevel::Task(task) = decl {
                diagnostics.extend(semantic::check_task_invariants(task));
            }
        }

        if diagnostics
            .iter()
            .any(|d| d.severity == crate::errors::Severity::Error)
        {
            return Err(CompileError { diagnostics });
        }

        for decl in &program.decls {
            match decl {
                TopLevel::Connection(conn) => {
                    if let Err(e) = self.instantiate_connection(conn) {
                        diagnostics.push(crate::errors::DiagEntry {
                            severity: crate::errors::Severity::Error,
                            message: e.to_string(),
                            info: conn.info.clone(),
                        });
                    }
                }
                TopLevel::Var(var) => {
                    if let Some(init) = &var.init {
                        match self.eval_global_expr(init) {
                            Ok(v) => {
                                self.global
                                    .symbols
                                    .borrow_mut()
                                    .add(var.name.clone(), crate::elements::Element::Value(v));
                            }
                            Err(e) => diagnostics.push(crate::errors::DiagEntry {
                                severity: crate::errors::Severity::Error,
                                message: e.to_string(),
                                info: var.info.clone(),
                            }),
                        }
                    }
                }
                _ => {}
            }
        }

        if diagnostics
            .iter()
            .any(|d| d.severity == crate::errors::Severity::Error)
        {
            return Err(CompileError { diagnostics });
        }
        tracing::debug!(target: "argon::proc", declarations = program.decls.len(), "compiled");
        Ok(())
    }

    fn instantiate_connection(&mut self, conn: &crate::ast::ConnDecl) -> Result<(), RuntimeError> {
        let dsn = match &conn.dsn {
            Expr::Literal(crate::ast::Literal::Str(s), _) => s.clone(),
            _ => return Err(RuntimeError::internal("connection DSN must be a string literal")),
        };
        let options: Vec<(String, String)> = conn
            .options
            .iter()
            .filter_map(|kv| match &kv.value {
                Expr::Literal(crate::ast::Literal::Str(s), _) => Some((kv.key.to_string(), s.clone())),
                _ => None,
            })
            .collect();
        let environment = self
            .environment
            .as_ref()
            .ok_or_else(|| RuntimeError::internal("no database environment registered"))?;
        let raw = environment.connect(&dsn, &options)?;
        let handle = crate::elements::ConnectionHandle {
            name: conn.name.clone(),
            dsn,
            conn: raw,
        };
        self.global
            .connections
            .insert(conn.name.clone(), std::rc::Rc::new(std::cell::RefCell::new(handle)));
        Ok(())
    }

    fn eval_global_expr(&mut self, expr: &Expr) -> Result<Variant, RuntimeError> {
        let mut ctx = self.global.child_context();
        let mut eval_ctx = EvalCtx { processor: self, locals: &mut ctx, main_object: None, dest_object: None, result_object: None };
        eval::eval_expr(expr, &mut eval_ctx).map_err(|e| match e {
            Unwind::Error(err) => err,
            _ => RuntimeError::internal("unexpected control flow in a global initializer"),
        })
    }

    /// Looks up `main` and runs it with no arguments, asserting the call
    /// stack is empty on return (there should be no dangling scopes).
    pub fn run(&mut self) -> ControlResult<()> {
        let name = Identifier::new("main");
        self.call_task_by_name(&name, Vec::new())?;
        debug_assert!(self.call_stack.is_empty(), "call stack not empty after run()");
        Ok(())
    }

    pub fn call_task_by_name(&mut self, name: &Identifier, args: Vec<Variant>) -> ControlResult<Variant> {
        let ty = self
            .type_table
            .find(name)
            .ok_or_else(|| Unwind::Error(RuntimeError::not_declared(name.to_string())))?;
        let Type::Task { decl } = ty else {
            return Err(Unwind::Error(RuntimeError::internal(format!("`{name}` is not a task"))));
        };
        let decl = decl.clone();
        self.with_stack_frame("task", name.clone(), decl.info.clone(), |processor| {
            tasks::execute_task(processor, &decl, args)
        })
    }

    /// Pushes a call-stack frame, runs `f`, then pops the frame — the same
    /// push-before/pop-after contract as [`crate::control::ScopedStackPush`],
    /// but without holding a borrow of `self.call_stack` across the call to
    /// `f` (which itself needs `&mut self`).
    fn with_stack_frame<T>(
        &mut self,
        kind: &'static str,
        name: Identifier,
        info: crate::ast::SourceInfo,
        f: impl FnOnce(&mut Self) -> ControlResult<T>,
    ) -> ControlResult<T> {
        self.call_stack.push(FrameInfo { kind, name, info });
        let result = f(self);
        self.call_stack.pop();
        result
    }

    pub fn call_function_by_name(&mut self, name: &Identifier, args: Vec<Variant>) -> ControlResult<Variant> {
        let ty = self
            .type_table
            .find(name)
            .ok_or_else(|| Unwind::Error(RuntimeError::not_declared(name.to_string())))?;
        let Type::Function { decl } = ty else {
            return Err(Unwind::Error(RuntimeError::internal(format!("`{name}` is not a function"))));
        };
        let decl = decl.clone();
        self.call_function(&decl, args)
    }

    pub fn call_function(&mut self, decl: &std::rc::Rc<FunctionDecl>, args: Vec<Variant>) -> ControlResult<Variant> {
        let name = decl.name.clone();
        let info = decl.info.clone();
        self.with_stack_frame("function", name, info, |processor| {
            let global_symbols = processor.global.symbols.clone();
            let mut context = crate::context::Context::new(Some(global_symbols));
            let names: Vec<_> = decl.args.iter().map(|a| a.name.clone()).collect();
            context.bind_args(&names, args).map_err(Unwind::Error)?;
            let mut eval_ctx = EvalCtx { processor, locals: &mut context, main_object: None, dest_object: None, result_object: None };
            match eval::exec_block(&decl.body, &mut eval_ctx) {
                Ok(()) => Ok(Variant::Null),
                Err(Unwind::Return(v)) => Ok(v),
                Err(other) => Err(other),
            }
        })
    }

    pub fn set_environment(&mut self, environment: Box<dyn crate::db::Environment>) {
        self.environment = Some(environment);
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatches the `trx.*`/`sql.*`/`seq.next`/`debug.symbol_exists`
/// builtins, which — unlike the pure functions in [`crate::functions`] —
/// need a live connection. `name` must be one produced by
/// `connection_family` in [`crate::eval`].
pub fn dispatch_connection_builtin(name: &str, args: &[Variant], ctx: &mut EvalCtx<'_>) -> Result<Variant, RuntimeError> {
    crate::functions::check_arity(name, args.len())?;
    match name {
        "trx.start" | "trx.commit" | "trx.rollback" | "trx.savepoint" => {
            let handle = resolve_connection_arg(&args[0], ctx)?;
            let mut conn = handle.borrow_mut();
            match name {
                "trx.start" => conn.conn.start_transaction()?,
                "trx.commit" => conn.conn.commit()?,
                "trx.rollback" => {
                    let savepoint = args.get(1).map(|v| v.to_string());
                    conn.conn.rollback(savepoint.as_deref())?
                }
                "trx.savepoint" => conn.conn.savepoint(&args[1].to_string())?,
                _ => unreachable!(),
            }
            Ok(Variant::Null)
        }
        "seq.next" => {
            let handle = resolve_connection_arg(&args[0], ctx)?;
            let mut conn = handle.borrow_mut();
            conn.conn.next_sequence_value(&args[0].to_string())
        }
        "sql.scalar" | "sql.exec" | "sql.list" => {
            let handle = resolve_connection_arg(&args[0], ctx)?;
            let sql = args[1].to_string();
            // sql.list(conn, sql, sep, binds...) carries a mandatory
            // separator operand between the SQL text and the bind values;
            // sql.scalar/sql.exec have no such operand.
            let (sep, binds) = if name == "sql.list" {
                (args[2].to_string(), &args[3..])
            } else {
                (String::new(), &args[2..])
            };
            let mut conn = handle.borrow_mut();
            let mut stmt = conn.conn.prepare(&sql)?;
            for (i, b) in binds.iter().enumerate() {
                stmt.bind(i, b)?;
            }
            let mut rs = stmt.execute()?;
            if name == "sql.exec" {
                return Ok(Variant::Null);
            }
            if !rs.first()? {
                return Ok(Variant::Null);
            }
            if name == "sql.scalar" {
                return rs.get(0);
            }
            // sql.list: separator-joined text of column 0 across all rows.
            let mut parts = vec![rs.get(0)?.to_string()];
            while rs.next()? {
                parts.push(rs.get(0)?.to_string());
            }
            Ok(Variant::Str(parts.join(&sep)))
        }
        "debug.symbol_exists" => {
            let name = Identifier::new(args[0].to_string());
            Ok(Variant::Bool(ctx.locals.find(&name).is_some()))
        }
        other => Err(RuntimeError::not_declared(other.to_string())),
    }
}

fn resolve_connection_arg(
    value: &Variant,
    ctx: &mut EvalCtx<'_>,
) -> Result<std::rc::Rc<std::cell::RefCell<crate::elements::ConnectionHandle>>, RuntimeError> {
    let name = Identifier::new(value.to_string());
    ctx.processor
        .global
        .connections
        .get(&name)
        .cloned()
        .ok_or_else(|| RuntimeError::not_declared(name.to_string()))
}

/// Executes a raw `SQL EXEC` statement (the `SqlExec` AST node), discarding
/// any resultset it may produce.
pub fn dispatch_sql_exec(
    connection: &Identifier,
    sql: &str,
    binds: &[Variant],
    ctx: &mut EvalCtx<'_>,
) -> Result<(), RuntimeError> {
    let handle = ctx
        .processor
        .global
        .connections
        .get(connection)
        .cloned()
        .ok_or_else(|| RuntimeError::not_declared(connection.to_string()))?;
    let mut conn = handle.borrow_mut();
    let mut stmt = conn.conn.prepare(sql)?;
    for (i, b) in binds.iter().enumerate() {
        stmt.bind(i, b)?;
    }
    stmt.execute()?;
    Ok(())
}

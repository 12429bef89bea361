//! The expression evaluator and statement executor shared by functions,
//! lambdas, and every task phase — the `EvalExprVisitor`/`BlockVisitor`
//! pair in the original source, collapsed into direct recursive functions
//! since Rust's closed `Expr`/`Stmt` enums make double dispatch
//! unnecessary.

use crate::ast::{BinaryOp, ColumnKind, Expr, Literal, Stmt, UnaryOp};
use crate::context::Context;
use crate::control::{ControlResult, ExceptionPayload, Unwind};
use crate::elements::Element;
use crate::errors::RuntimeError;
use crate::functions;
use crate::objects::Object;
use crate::processor::Processor;
use crate::value::Variant;
use std::cell::RefCell;
use std::rc::Rc;

/// Everything a running statement or expression needs: the processor (for
/// builtins that touch connections, nested task calls, and logging), the
/// innermost local scope, and — inside a task phase — the main/result
/// object pair that `$col`/`%col` address.
pub struct EvalCtx<'a> {
    pub processor: &'a mut Processor,
    pub locals: &'a mut Context,
    /// The object `$col` reads — a FETCH/TRANSFER task's source.
    pub main_object: Option<Rc<RefCell<Object>>>,
    /// The object a column-assignment (`$col := expr`) writes — a
    /// STORE/TRANSFER task's destination.
    pub dest_object: Option<Rc<RefCell<Object>>>,
    /// The object `%col` reads — a STORE/TRANSFER task's destination,
    /// addressed by its last `execute()`'s result row.
    pub result_object: Option<Rc<RefCell<Object>>>,
}

/// Builds the callable `Element::Lambda` for a lambda literal, capturing
/// the defining scope by reference (`clone_symbols`) rather than walking a
/// live parent pointer at call time.
pub fn eval_lambda_literal(args: &[crate::ast::Identifier], body: &Expr, ctx: &mut EvalCtx<'_>) -> Element {
    let closure = ctx.locals.symbols.clone_symbols();
    Element::Lambda(Rc::new(crate::functions::LambdaValue {
        args: args.to_vec(),
        body: body.clone(),
        closure,
    }))
}

pub fn eval_expr(expr: &Expr, ctx: &mut EvalCtx<'_>) -> ControlResult<Variant> {
    match expr {
        Expr::Literal(lit, _) => Ok(literal_value(lit)),
        Expr::Id(name, info) => ctx
            .locals
            .find(name)
            .and_then(|r| r.with(|e| e.as_value().cloned()))
            .flatten()
            .ok_or_else(|| Unwind::Error(RuntimeError::not_declared(name.to_string()).attach(info))),
        Expr::Column(col) => {
            let object = match col.kind {
                ColumnKind::Value => ctx.main_object.clone(),
                ColumnKind::Result => ctx.result_object.clone(),
            };
            let Some(object) = object else {
                return Err(Unwind::Error(RuntimeError::internal(
                    "column reference outside an object context",
                )));
            };
            let result = match col.kind {
                ColumnKind::Value => object.borrow().get_column(&col.selector),
                ColumnKind::Result => object.borrow().get_result_column(&col.selector),
            };
            result.map_err(Unwind::Error)
        }
        Expr::Unary { op, operand, .. } => {
            let v = eval_expr(operand, ctx)?;
            match op {
                UnaryOp::Neg => numeric_unary_neg(&v).map_err(Unwind::Error),
                UnaryOp::Not => match v.as_bool() {
                    Some(b) => Ok(Variant::Bool(!b)),
                    None => Ok(Variant::Null),
                },
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => eval_binary(*op, lhs, rhs, ctx),
        Expr::Assign { target, value, info } => {
            let v = eval_expr(value, ctx)?;
            assign_to(target, v.clone(), ctx, info)?;
            Ok(v)
        }
        Expr::ColumnAssign { target, value, info } => {
            let v = eval_expr(value, ctx)?;
            let Some(object) = ctx.dest_object.clone() else {
                return Err(Unwind::Error(
                    RuntimeError::internal("column assignment outside a destination object context").attach(info),
                ));
            };
            object.borrow_mut().set_column(target.selector.clone(), v.clone());
            Ok(v)
        }
        Expr::FuncCall { name, args, info } => eval_call(name.as_str(), args, ctx, info),
        Expr::Lambda { .. } => {
            // A lambda literal produces an `Element::Lambda`, not a plain
            // `Variant`; `eval_lambda_literal` is the entry point callers
            // that accept a callable (e.g. a `VAR` initializer) use
            // instead of `eval_expr`. Reaching here means a lambda was
            // used where a scalar value was expected.
            Err(Unwind::Error(RuntimeError::internal(
                "lambda expression used where a value was expected",
            )))
        }
    }
}

fn literal_value(lit: &Literal) -> Variant {
    match lit {
        Literal::Int(i) => Variant::Int(*i),
        Literal::Numeric { digits, scale } => {
            let parsed: rust_decimal::Decimal = format!("{digits}e-{scale}")
                .parse()
                .unwrap_or_default();
            Variant::Numeric(parsed)
        }
        Literal::Str(s) => Variant::Str(s.clone()),
        Literal::Bool(b) => Variant::Bool(*b),
        Literal::Null => Variant::Null,
    }
}

fn numeric_unary_neg(v: &Variant) -> Result<Variant, RuntimeError> {
    match v {
        Variant::Null => Ok(Variant::Null),
        Variant::Int(i) => Ok(Variant::Int(-i)),
        Variant::Numeric(d) => Ok(Variant::Numeric(-d)),
        _ => Err(RuntimeError::internal("unary '-' on non-numeric value")),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &mut EvalCtx<'_>) -> ControlResult<Variant> {
    // Short-circuit AND/OR before evaluating the right operand.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let l = eval_expr(lhs, ctx)?;
        return match (op, l.as_bool()) {
            (BinaryOp::And, Some(false)) => Ok(Variant::Bool(false)),
            (BinaryOp::Or, Some(true)) => Ok(Variant::Bool(true)),
            (_, None) => Ok(Variant::Null),
            _ => {
                let r = eval_expr(rhs, ctx)?;
                match r.as_bool() {
                    Some(b) => Ok(Variant::Bool(b)),
                    None => Ok(Variant::Null),
                }
            }
        };
    }

    let l = eval_expr(lhs, ctx)?;
    let r = eval_expr(rhs, ctx)?;
    match op {
        BinaryOp::Concat => Ok(Variant::Str(format!(
            "{}{}",
            l.display_or_null_marker(),
            r.display_or_null_marker()
        ))),
        BinaryOp::Add => Variant::checked_arith(&l, &r, |a, b| Some(a + b))
            .ok_or_else(|| Unwind::Error(RuntimeError::internal("'+' on non-numeric operands"))),
        BinaryOp::Sub => Variant::checked_arith(&l, &r, |a, b| Some(a - b))
            .ok_or_else(|| Unwind::Error(RuntimeError::internal("'-' on non-numeric operands"))),
        BinaryOp::Mul => Variant::checked_arith(&l, &r, |a, b| Some(a * b))
            .ok_or_else(|| Unwind::Error(RuntimeError::internal("'*' on non-numeric operands"))),
        BinaryOp::Div => Variant::checked_arith(&l, &r, |a, b| if b.is_zero() { None } else { Some(a / b) })
            .ok_or_else(|| Unwind::Error(RuntimeError::internal("division by zero or non-numeric operands"))),
        BinaryOp::Mod => Variant::checked_arith(&l, &r, |a, b| if b.is_zero() { None } else { Some(a % b) })
            .ok_or_else(|| Unwind::Error(RuntimeError::internal("modulo by zero or non-numeric operands"))),
        BinaryOp::Eq => Ok(compare(&l, &r, |o| o == std::cmp::Ordering::Equal)),
        BinaryOp::Ne => Ok(compare(&l, &r, |o| o != std::cmp::Ordering::Equal)),
        BinaryOp::Lt => Ok(compare(&l, &r, |o| o == std::cmp::Ordering::Less)),
        BinaryOp::Le => Ok(compare(&l, &r, |o| o != std::cmp::Ordering::Greater)),
        BinaryOp::Gt => Ok(compare(&l, &r, |o| o == std::cmp::Ordering::Greater)),
        BinaryOp::Ge => Ok(compare(&l, &r, |o| o != std::cmp::Ordering::Less)),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn compare(l: &Variant, r: &Variant, pred: impl Fn(std::cmp::Ordering) -> bool) -> Variant {
    match l.partial_compare(r) {
        Some(ord) => Variant::Bool(pred(ord)),
        None => Variant::Null,
    }
}

fn assign_to(
    target: &Expr,
    value: Variant,
    ctx: &mut EvalCtx<'_>,
    info: &crate::ast::SourceInfo,
) -> ControlResult<()> {
    match target {
        Expr::Id(name, _) => {
            match ctx.locals.find(name) {
                Some(r) => {
                    r.with_mut(|e| *e = Element::Value(value));
                    Ok(())
                }
                None => {
                    ctx.locals.symbols.add(name.clone(), Element::Value(value));
                    Ok(())
                }
            }
        }
        _ => Err(Unwind::Error(
            RuntimeError::internal("invalid assignment target").attach(info),
        )),
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &mut EvalCtx<'_>, info: &crate::ast::SourceInfo) -> ControlResult<Variant> {
    let values: Result<Vec<Variant>, Unwind> = args.iter().map(|a| eval_expr(a, ctx)).collect();
    let values = values?;

    if name == "sys.terminate" {
        functions::check_arity(name, values.len()).map_err(|e| Unwind::Error(e.attach(info)))?;
        let code = values.first().and_then(Variant::as_i64).unwrap_or(0) as i32;
        return Err(Unwind::Terminate(code));
    }

    if let Some(connection_builtin) = connection_family(name) {
        return crate::processor::dispatch_connection_builtin(connection_builtin, &values, ctx)
            .map_err(|e| Unwind::Error(e.attach(info)));
    }

    if functions::is_builtin(name) {
        return functions::call_pure(name, &values, &ctx.processor.locale).map_err(|e| Unwind::Error(e.attach(info)));
    }

    // Not a builtin: a user-declared eager function.
    ctx.processor
        .call_function_by_name(&name.into(), values)
        .map_err(|e| match e {
            Unwind::Error(err) => Unwind::Error(err.attach(info)),
            other => other,
        })
}

/// Names of the builtin families that need a live connection/sequence and
/// are therefore dispatched through the processor rather than
/// [`functions::call_pure`].
fn connection_family(name: &str) -> Option<&'static str> {
    match name {
        "sql.scalar" => Some("sql.scalar"),
        "sql.exec" => Some("sql.exec"),
        "sql.list" => Some("sql.list"),
        "trx.start" => Some("trx.start"),
        "trx.commit" => Some("trx.commit"),
        "trx.rollback" => Some("trx.rollback"),
        "trx.savepoint" => Some("trx.savepoint"),
        "seq.next" => Some("seq.next"),
        "debug.symbol_exists" => Some("debug.symbol_exists"),
        _ => None,
    }
}

/// Executes a statement list in order, threading control-flow unwinds
/// (`Return`/`Break`/`Continue`/errors) up to the caller.
pub fn exec_block(stmts: &[Stmt], ctx: &mut EvalCtx<'_>) -> ControlResult<()> {
    for stmt in stmts {
        exec_stmt(stmt, ctx)?;
    }
    Ok(())
}

pub fn exec_stmt(stmt: &Stmt, ctx: &mut EvalCtx<'_>) -> ControlResult<()> {
    match stmt {
        Stmt::Expr(e, _) => {
            eval_expr(e, ctx)?;
            Ok(())
        }
        Stmt::Var(decl) => {
            let value = match &decl.init {
                Some(e) => eval_expr(e, ctx)?,
                None => Variant::Null,
            };
            ctx.locals.symbols.add(decl.name.clone(), Element::Value(value));
            Ok(())
        }
        Stmt::Compound(body, _) => exec_block(body, ctx),
        Stmt::IfElse { cond, then_branch, else_branch, .. } => {
            let c = eval_expr(cond, ctx)?;
            if c.as_bool().unwrap_or(false) {
                exec_block(then_branch, ctx)
            } else {
                exec_block(else_branch, ctx)
            }
        }
        Stmt::While { cond, body, .. } => {
            while eval_expr(cond, ctx)?.as_bool().unwrap_or(false) {
                match exec_block(body, ctx) {
                    Err(Unwind::Break) => break,
                    Err(Unwind::Continue) => continue,
                    other => other?,
                }
            }
            Ok(())
        }
        Stmt::Repeat { body, cond, .. } => {
            loop {
                match exec_block(body, ctx) {
                    Err(Unwind::Break) => break,
                    Err(Unwind::Continue) => {}
                    other => other?,
                }
                if eval_expr(cond, ctx)?.as_bool().unwrap_or(false) {
                    break;
                }
            }
            Ok(())
        }
        Stmt::For { var, iterable, body, .. } => {
            let iter_value = eval_expr(iterable, ctx)?;
            // A `FOR` loop iterates the rows of an object expression;
            // since object-valued expressions are not ordinary `Variant`s,
            // this form is only meaningful bound to a `$col`-producing
            // main object and degrades to a single iteration over a
            // scalar otherwise.
            ctx.locals.symbols.add(var.clone(), Element::Value(iter_value));
            match exec_block(body, ctx) {
                Err(Unwind::Break) => Ok(()),
                other => other,
            }
        }
        Stmt::Continue(_) => Err(Unwind::Continue),
        Stmt::Break(_) => Err(Unwind::Break),
        Stmt::Return(expr, _) => {
            let v = match expr {
                Some(e) => eval_expr(e, ctx)?,
                None => Variant::Null,
            };
            Err(Unwind::Return(v))
        }
        Stmt::Assert(cond, message, info) => {
            let c = eval_expr(cond, ctx)?;
            if c.as_bool().unwrap_or(false) {
                Ok(())
            } else {
                Err(Unwind::Assert(
                    message.clone().unwrap_or_else(|| "assertion failed".to_string()),
                    info.clone(),
                ))
            }
        }
        Stmt::Log(expr, _) => {
            let v = eval_expr(expr, ctx)?;
            ctx.processor.log(&v.to_string());
            Ok(())
        }
        Stmt::TaskExec { name, args, info } => {
            let values: Result<Vec<Variant>, Unwind> = args.iter().map(|a| eval_expr(a, ctx)).collect();
            let values = values?;
            ctx.processor
                .call_task_by_name(name, values)
                .map(|_| ())
                .map_err(|e| match e {
                    Unwind::Error(err) => Unwind::Error(err.attach(info)),
                    other => other,
                })
        }
        Stmt::SqlExec { connection, sql, binds, info } => {
            let sql_text = eval_expr(sql, ctx)?;
            let bind_values: Result<Vec<Variant>, Unwind> = binds.iter().map(|a| eval_expr(a, ctx)).collect();
            let bind_values = bind_values?;
            crate::processor::dispatch_sql_exec(connection, &sql_text.to_string(), &bind_values, ctx)
                .map_err(|e| Unwind::Error(e.attach(info)))
        }
        Stmt::TryCatch { body, handlers, .. } => exec_try_catch(body, handlers, ctx),
        Stmt::Rethrow(info) => match ctx.locals.current_exception.take() {
            Some(r) => {
                let payload = r
                    .with(|e| match e {
                        Element::Exception(p) => Some((**p).clone()),
                        _ => None,
                    })
                    .flatten();
                ctx.locals.current_exception = Some(r);
                match payload {
                    Some(p) => Err(Unwind::Rethrow(p)),
                    None => Err(Unwind::Error(RuntimeError::internal("rethrow outside handler").attach(info))),
                }
            }
            None => Err(Unwind::Error(RuntimeError::internal("rethrow outside handler").attach(info))),
        },
        Stmt::Throw { name, arg, info } => {
            if ctx.processor.type_table.find(name).is_none() {
                return Err(Unwind::Error(RuntimeError::not_declared(name.to_string()).attach(info)));
            }
            let message = match arg {
                Some(e) => {
                    let v = eval_expr(e, ctx)?;
                    if v.is_null() {
                        format!("Custom exception '{name}' encountered: NULL <no message>")
                    } else {
                        format!("Custom exception '{name}' encountered: {}", v.display_or_null_marker())
                    }
                }
                None => format!("Custom exception '{name}' encountered"),
            };
            Err(Unwind::Custom(ExceptionPayload {
                sqlstate: None,
                exception_id: Some(name.to_string()),
                message,
                info: info.clone(),
            }))
        }
    }
}

fn exec_try_catch(
    body: &[Stmt],
    handlers: &[crate::ast::CatchClause],
    ctx: &mut EvalCtx<'_>,
) -> ControlResult<()> {
    match exec_block(body, ctx) {
        Ok(()) => Ok(()),
        Err(Unwind::Custom(payload)) | Err(Unwind::Rethrow(payload)) => {
            dispatch_handler(&payload, handlers, ctx)
        }
        Err(Unwind::Error(err)) => dispatch_handler(&ExceptionPayload::from_runtime_error(&err), handlers, ctx),
        other => other,
    }
}

/// Finds the handler clause `payload` matches, per `spec.md` §4.5's fixed
/// priority: a SQLSTATE match first, then an exception-id match, then the
/// catch-all — regardless of the clauses' declaration order, mirroring
/// the original's separate `m_exh_sqlstates`/`m_exh_ids`/`m_exh_catchall`
/// lookup tables.
pub(crate) fn find_handler<'a>(
    payload: &ExceptionPayload,
    handlers: &'a [crate::ast::CatchClause],
) -> Option<&'a crate::ast::CatchClause> {
    use crate::ast::CatchMatcher;
    handlers
        .iter()
        .find(|h| matches!(&h.matcher, CatchMatcher::SqlState(s) if payload.sqlstate.as_deref() == Some(s.as_str())))
        .or_else(|| {
            handlers.iter().find(|h| {
                matches!(&h.matcher, CatchMatcher::ExceptionName(n) if payload.exception_id.as_deref() == Some(n.as_str()))
            })
        })
        .or_else(|| handlers.iter().find(|h| matches!(h.matcher, CatchMatcher::Any)))
}

/// Runs the matched handler body with `payload` bound to the current-
/// exception slot, releasing it when the handler block exits (including
/// through a `rethrow`/unwind).
pub(crate) fn run_handler_body(
    handler: &crate::ast::CatchClause,
    payload: &ExceptionPayload,
    ctx: &mut EvalCtx<'_>,
) -> ControlResult<()> {
    let element_ref = ctx
        .locals
        .symbols
        .add("__exception".into(), Element::Exception(Rc::new(payload.clone())));
    ctx.locals.current_exception = Some(element_ref.clone());
    let guard = crate::control::ScopedReleaseException::new(element_ref);
    let result = exec_block(&handler.body, ctx);
    drop(guard);
    ctx.locals.current_exception = None;
    result
}

fn dispatch_handler(
    payload: &ExceptionPayload,
    handlers: &[crate::ast::CatchClause],
    ctx: &mut EvalCtx<'_>,
) -> ControlResult<()> {
    match find_handler(payload, handlers) {
        Some(handler) => run_handler_body(handler, payload, ctx),
        None => Err(Unwind::Rethrow(payload.clone())),
    }
}

trait AttachTrace {
    fn attach(self, info: &crate::ast::SourceInfo) -> Self;
}

impl AttachTrace for RuntimeError {
    fn attach(self, info: &crate::ast::SourceInfo) -> Self {
        let mut err = self;
        err.trace_mut().push(crate::errors::FrameInfo {
            kind: "expr",
            name: crate::ast::Identifier::new(""),
            info: info.clone(),
        });
        err
    }
}

//! Task execution: the four shapes (`VOID`/`FETCH`/`STORE`/`TRANSFER`) and
//! their five-phase execution algorithms, grounded in
//! `examples/original_source/src/{voidtask,fetchtask,storetask,transfertask}.cc`.

use crate::ast::{TaskDecl, TaskShape, TemplateRef};
use crate::context::Context;
use crate::control::{ControlResult, Unwind};
use crate::errors::RuntimeError;
use crate::eval::{self, EvalCtx};
use crate::ir::type_table::{InstanceMode, Type};
use crate::objects::{Object, ObjectKind};
use crate::processor::Processor;
use crate::value::Variant;
use std::cell::RefCell;
use std::rc::Rc;

/// A live task instance: bound arguments plus the source/destination
/// object pair a FETCH/STORE/TRANSFER task drives.
pub struct Task {
    pub decl: Rc<TaskDecl>,
    pub context: Context,
}

/// Entry point used by [`Processor::call`]: binds `args` to the task's
/// formal parameters and runs the shape-appropriate algorithm.
pub fn execute_task(processor: &mut Processor, decl: &Rc<TaskDecl>, args: Vec<Variant>) -> ControlResult<Variant> {
    let global_symbols = processor.global.symbols.clone();
    let mut context = Context::new(Some(global_symbols));
    let names: Vec<_> = decl.args.iter().map(|a| a.name.clone()).collect();
    context.bind_args(&names, args).map_err(Unwind::Error)?;

    let result = match decl.shape {
        TaskShape::Void => execute_void(processor, decl, &mut context),
        TaskShape::Fetch => execute_fetch(processor, decl, &mut context),
        TaskShape::Store => execute_store(processor, decl, &mut context),
        TaskShape::Transfer => execute_transfer(processor, decl, &mut context),
    };

    match result {
        Ok(v) => Ok(v),
        Err(Unwind::Return(v)) => Ok(v),
        other => other,
    }
}

/// The three synthetic constructors never registered in the `TypeTable` —
/// the original recognizes these by template name directly rather than
/// through a `TYPE ... AS ...` declaration (the `m_node == NULL_NODE`
/// branches in `examples/original_source/src/{genrange,expand,compact}.cc`).
fn builtin_object_kind(name: &str, args: &[Variant]) -> Option<Result<ObjectKind, RuntimeError>> {
    match name {
        "gen_range" => Some((|| {
            let start = args.first().and_then(Variant::as_i64).ok_or_else(|| {
                RuntimeError::internal("gen_range(start, stop[, step]) requires an integer start")
            })?;
            let stop = args.get(1).and_then(Variant::as_i64).ok_or_else(|| {
                RuntimeError::internal("gen_range(start, stop[, step]) requires an integer stop")
            })?;
            let step = args.get(2).and_then(Variant::as_i64).unwrap_or(1);
            Ok(ObjectKind::GenRange { start, stop, step })
        })()),
        "expand" => Some((|| {
            let value = args
                .first()
                .map(Variant::display_or_null_marker)
                .ok_or_else(|| RuntimeError::internal("expand(value, sep) requires a value argument"))?;
            let sep = args
                .get(1)
                .map(Variant::display_or_null_marker)
                .ok_or_else(|| RuntimeError::internal("expand(value, sep) requires a separator argument"))?;
            Ok(ObjectKind::Expand { value, sep })
        })()),
        "compact" => Some((|| {
            let sep = args
                .get(1)
                .map(Variant::display_or_null_marker)
                .ok_or_else(|| RuntimeError::internal("compact(ref, sep) requires a separator argument"))?;
            Ok(ObjectKind::Compact { sep, parts: Vec::new() })
        })()),
        _ => None,
    }
}

fn instantiate_object(
    processor: &mut Processor,
    template: &TemplateRef,
    mode: InstanceMode,
    context: &mut Context,
) -> Result<Rc<RefCell<Object>>, RuntimeError> {
    let mut eval_ctx = EvalCtx { processor, locals: context, main_object: None, dest_object: None, result_object: None };
    let arg_values: Result<Vec<Variant>, Unwind> = template
        .args
        .iter()
        .map(|a| eval::eval_expr(a, &mut eval_ctx))
        .collect();
    let arg_values = arg_values.map_err(|e| match e {
        Unwind::Error(err) => err,
        _ => RuntimeError::internal("unexpected control flow while evaluating template arguments"),
    })?;

    let lower_name = template.name.to_string().to_ascii_lowercase();
    let kind = if let Some(builtin) = builtin_object_kind(&lower_name, &arg_values) {
        builtin?
    } else {
        let ty = processor
            .type_table
            .find(&template.name)
            .ok_or_else(|| RuntimeError::not_declared(template.name.to_string()))?
            .clone();

        match &ty {
            Type::Table { connection, table, columns, .. } => {
                let handle = processor
                    .global
                    .connections
                    .get(connection)
                    .cloned()
                    .ok_or_else(|| RuntimeError::not_declared(connection.to_string()))?;
                ObjectKind::Table {
                    connection: handle,
                    table: table.clone(),
                    columns: columns.clone(),
                }
            }
            Type::Sql { connection, sql, .. } => {
                let handle = processor
                    .global
                    .connections
                    .get(connection)
                    .cloned()
                    .ok_or_else(|| RuntimeError::not_declared(connection.to_string()))?;
                ObjectKind::Sql { connection: handle, sql: sql.clone() }
            }
            _ => return Err(RuntimeError::internal(format!("`{}` is not an object template", template.name))),
        }
    };

    let mut object = Object::new(template.name.clone(), kind, mode, arg_values.clone());
    object.run(&[], arg_values)?;
    Ok(Rc::new(RefCell::new(object)))
}

/// The object role bindings a task phase runs with: `$col` reads the
/// main object, `%col` reads the result object, and a column-assignment
/// (`$col := expr`) writes the destination object — three distinct roles
/// per `spec.md` §4.4's `getMainObject`/`getResultObject`/`getDestObject`
/// contract.
#[derive(Clone, Default)]
struct ObjectRoles {
    main: Option<Rc<RefCell<Object>>>,
    dest: Option<Rc<RefCell<Object>>>,
    result: Option<Rc<RefCell<Object>>>,
}

/// Runs a task's phase sequence under its `AFTER ON SQLSTATE`/`ON EXCEPTION`/
/// catch-all handlers: an escaping `Unwind::Error`/`Custom`/`Rethrow` is
/// turned into an `ExceptionPayload` and looked up against `handlers` with
/// the same SQLSTATE → exception-id → catch-all priority a block-scoped
/// `TRY`/`CATCH` uses (`eval::find_handler`), binding the error to the
/// task's current-exception slot while the matched handler runs. No match
/// re-raises, which bubbles out of `execute_task` unchanged.
fn run_task_body(
    processor: &mut Processor,
    context: &mut Context,
    roles: &ObjectRoles,
    handlers: &[crate::ast::CatchClause],
    body: impl FnOnce(&mut Processor, &mut Context) -> ControlResult<Variant>,
) -> ControlResult<Variant> {
    let payload = match body(processor, context) {
        Ok(v) => return Ok(v),
        Err(Unwind::Error(err)) => crate::control::ExceptionPayload::from_runtime_error(&err),
        Err(Unwind::Custom(payload)) | Err(Unwind::Rethrow(payload)) => payload,
        Err(other) => return Err(other),
    };
    match eval::find_handler(&payload, handlers) {
        Some(handler) => {
            let mut eval_ctx = EvalCtx {
                processor,
                locals: context,
                main_object: roles.main.clone(),
                dest_object: roles.dest.clone(),
                result_object: roles.result.clone(),
            };
            eval::run_handler_body(handler, &payload, &mut eval_ctx).map(|_| Variant::Null)
        }
        None => Err(Unwind::Rethrow(payload)),
    }
}

fn execute_void(processor: &mut Processor, decl: &Rc<TaskDecl>, context: &mut Context) -> ControlResult<Variant> {
    let roles = ObjectRoles::default();
    run_task_body(processor, context, &roles, &decl.phases.after_handlers, |processor, context| {
        run_phase_once(processor, context, &roles, &decl.phases.init)?;
        run_phase_once(processor, context, &roles, &decl.phases.before)?;
        run_phase_once(processor, context, &roles, &decl.phases.rules)?;
        run_phase_once(processor, context, &roles, &decl.phases.after)?;
        run_phase_once(processor, context, &roles, &decl.phases.r#final)?;
        Ok(Variant::Null)
    })
}

fn execute_fetch(processor: &mut Processor, decl: &Rc<TaskDecl>, context: &mut Context) -> ControlResult<Variant> {
    let source_template = decl.source.clone().ok_or_else(|| {
        Unwind::Error(RuntimeError::internal("FETCH task is missing its source template"))
    })?;
    let source = instantiate_object(processor, &source_template, InstanceMode::Read, context).map_err(Unwind::Error)?;
    source.borrow_mut().execute().map_err(Unwind::Error)?;

    // FETCH has no destination or result object: `$col` reads the source,
    // `%col` and column-assignment are compile-time errors (`semantic.rs`).
    let roles = ObjectRoles { main: Some(source.clone()), dest: None, result: None };

    run_task_body(processor, context, &roles, &decl.phases.after_handlers, |processor, context| {
        run_phase_once(processor, context, &roles, &decl.phases.init)?;

        source.borrow_mut().first();
        while !source.borrow().eof() {
            run_phase_once(processor, context, &roles, &decl.phases.before)?;
            run_phase_once(processor, context, &roles, &decl.phases.rules)?;
            source.borrow_mut().next();
        }
        // FETCH has no `after` phase by contract: it is never run, not even
        // once (`examples/original_source/src/fetchtask.cc` asserts its
        // after-node list is always empty).
        run_phase_once(processor, context, &roles, &decl.phases.r#final)?;
        Ok(Variant::Null)
    })
}

fn execute_store(processor: &mut Processor, decl: &Rc<TaskDecl>, context: &mut Context) -> ControlResult<Variant> {
    let dest_template = decl.dest.clone().ok_or_else(|| {
        Unwind::Error(RuntimeError::internal("STORE task is missing its destination template"))
    })?;
    let dest = instantiate_object(processor, &dest_template, InstanceMode::Insert, context).map_err(Unwind::Error)?;

    // STORE has no source: `$col :=` writes the destination, `%col`
    // reads the same object's last `execute()` result row (NULL until
    // the INSERT has run, per the Open Question decision in `DESIGN.md`).
    let roles = ObjectRoles { main: None, dest: Some(dest.clone()), result: Some(dest.clone()) };

    run_task_body(processor, context, &roles, &decl.phases.after_handlers, |processor, context| {
        run_phase_once(processor, context, &roles, &decl.phases.init)?;
        run_phase_once(processor, context, &roles, &decl.phases.before)?;
        run_phase_once(processor, context, &roles, &decl.phases.rules)?;
        dest.borrow_mut().execute().map_err(Unwind::Error)?;
        run_phase_once(processor, context, &roles, &decl.phases.after)?;
        run_phase_once(processor, context, &roles, &decl.phases.r#final)?;
        Ok(Variant::Null)
    })
}

fn execute_transfer(processor: &mut Processor, decl: &Rc<TaskDecl>, context: &mut Context) -> ControlResult<Variant> {
    let source_template = decl.source.clone().ok_or_else(|| {
        Unwind::Error(RuntimeError::internal("TRANSFER task is missing its source template"))
    })?;
    let dest_template = decl.dest.clone().ok_or_else(|| {
        Unwind::Error(RuntimeError::internal("TRANSFER task is missing its destination template"))
    })?;
    let source = instantiate_object(processor, &source_template, InstanceMode::Read, context).map_err(Unwind::Error)?;
    let dest = instantiate_object(processor, &dest_template, InstanceMode::Insert, context).map_err(Unwind::Error)?;

    source.borrow_mut().execute().map_err(Unwind::Error)?;

    // TRANSFER is the one shape with all three roles live at once:
    // `$col` reads the source (main), `$col :=` writes the dest, `%col`
    // reads the dest's last INSERT result row.
    let roles = ObjectRoles { main: Some(source.clone()), dest: Some(dest.clone()), result: Some(dest.clone()) };

    run_task_body(processor, context, &roles, &decl.phases.after_handlers, |processor, context| {
        run_phase_once(processor, context, &roles, &decl.phases.init)?;

        source.borrow_mut().first();
        while !source.borrow().eof() {
            run_phase_once(processor, context, &roles, &decl.phases.before)?;
            run_phase_once(processor, context, &roles, &decl.phases.rules)?;
            dest.borrow_mut().execute().map_err(Unwind::Error)?;
            run_phase_once(processor, context, &roles, &decl.phases.after)?;
            source.borrow_mut().next();
        }
        run_phase_once(processor, context, &roles, &decl.phases.r#final)?;
        Ok(Variant::Null)
    })
}

fn run_phase_once(
    processor: &mut Processor,
    context: &mut Context,
    roles: &ObjectRoles,
    body: &[crate::ast::Stmt],
) -> ControlResult<()> {
    context.symbols.create_sub();
    let mut eval_ctx = EvalCtx {
        processor,
        locals: context,
        main_object: roles.main.clone(),
        dest_object: roles.dest.clone(),
        result_object: roles.result.clone(),
    };
    let result = eval::exec_block(body, &mut eval_ctx);
    eval_ctx.locals.symbols.delete_sub();
    result
}

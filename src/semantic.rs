//! Compile-time checks: the two-pass symbol/type registration the
//! original calls `Pass1Visitor`/`Pass2Visitor`, plus the per-shape task
//! invariant checks from `SPEC_FULL.md` §4 (adapted from the constructor
//! assertions in `examples/original_source/src/task.cc`).

use crate::ast::{ColumnKind, Expr, Program, SourceInfo, Stmt, TaskDecl, TaskShape, TopLevel, TypeKind};
use crate::errors::{DiagEntry, Severity};
use crate::ir::type_table::{Type, TypeTable};

/// Pass 1: register every declared connection/table/sql/task/function
/// name in the type table before anything is evaluated, so forward
/// references (a task calling a task declared later in the file) resolve.
pub fn pass1_register_types(program: &Program, types: &mut TypeTable) -> Vec<DiagEntry> {
    let mut diags = Vec::new();
    for decl in &program.decls {
        let result = match decl {
            TopLevel::Connection(c) => types.add(Type::Connection { name: c.name.clone() }),
            TopLevel::CustomType(t) => match &t.kind {
                TypeKind::Connection => types.add(Type::Connection { name: t.name.clone() }),
                TypeKind::Table { connection, table, columns } => types.add(Type::Table {
                    name: t.name.clone(),
                    connection: connection.clone(),
                    table: table.clone(),
                    columns: columns.clone(),
                }),
                TypeKind::Sql { connection, sql } => types.add(Type::Sql {
                    name: t.name.clone(),
                    connection: connection.clone(),
                    sql: sql.clone(),
                }),
                TypeKind::Task | TypeKind::Function => Ok(()),
            },
            TopLevel::Task(t) => types.add(Type::Task { decl: std::rc::Rc::new(t.clone()) }),
            TopLevel::Function(f) => types.add(Type::Function { decl: std::rc::Rc::new(f.clone()) }),
            TopLevel::ExceptionDecl(e) => types.add(Type::Exception { name: e.name.clone(), matcher: e.matcher.clone() }),
            TopLevel::Var(_) => Ok(()),
        };
        if let Err(e) = result {
            diags.push(DiagEntry {
                severity: Severity::Error,
                message: e.to_string(),
                info: decl.source_info().clone(),
            });
        }
    }
    diags
}

/// Checks the column-reference invariants for every declared task,
/// matching the original's per-shape constructor assertions.
pub fn check_task_invariants(task: &TaskDecl) -> Vec<DiagEntry> {
    let mut diags = Vec::new();
    let phases = &task.phases;

    forbid_any_column(&phases.init, "init", &mut diags);

    match task.shape {
        TaskShape::Void => {
            forbid_any_column(&phases.before, "before", &mut diags);
            forbid_any_column(&phases.rules, "rules", &mut diags);
            forbid_any_column(&phases.after, "after", &mut diags);
            forbid_any_column(&phases.r#final, "final", &mut diags);
            if task.dest.is_some() || task.source.is_some() {
                diags.push(err("a VOID task cannot declare a source or destination template", &task.info));
            }
        }
        TaskShape::Fetch => {
            if task.source.is_none() {
                diags.push(err("a FETCH task requires a source template", &task.info));
            }
            if task.dest.is_some() {
                diags.push(err("a FETCH task cannot declare a destination template", &task.info));
            }
            forbid_result_column(&phases.before, "before", &mut diags);
            forbid_result_column(&phases.rules, "rules", &mut diags);
            // FETCH has no destination object: column-assignment is
            // illegal in every phase, matching the literal testable
            // scenario in `SPEC_FULL.md` §8.
            forbid_column_assign(&phases.before, "before", &mut diags);
            forbid_column_assign(&phases.rules, "rules", &mut diags);
            forbid_column_assign(&phases.after, "after", &mut diags);
            forbid_column_assign(&phases.r#final, "final", &mut diags);
        }
        TaskShape::Store => {
            if task.dest.is_none() {
                diags.push(err("a STORE task requires a destination template", &task.info));
            }
            if task.source.is_some() {
                diags.push(err("a STORE task cannot declare a source template", &task.info));
            }
            forbid_result_column(&phases.before, "before", &mut diags);
            // STORE has no main/source object in any phase: `$col` reads
            // would hit "column reference outside an object context" at
            // runtime, so reject them here instead.
            forbid_main_column(&phases.before, "before", &mut diags);
            forbid_main_column(&phases.rules, "rules", &mut diags);
            forbid_main_column(&phases.after, "after", &mut diags);
            forbid_main_column(&phases.r#final, "final", &mut diags);
        }
        TaskShape::Transfer => {
            if task.dest.is_none() || task.source.is_none() {
                diags.push(err(
                    "a TRANSFER task requires both a source and a destination template",
                    &task.info,
                ));
            }
            forbid_result_column(&phases.before, "before", &mut diags);
        }
    }

    diags
}

fn err(message: &str, info: &SourceInfo) -> DiagEntry {
    DiagEntry {
        severity: Severity::Error,
        message: message.to_string(),
        info: info.clone(),
    }
}

fn forbid_any_column(body: &[Stmt], phase: &str, diags: &mut Vec<DiagEntry>) {
    walk_stmts(body, &mut |e| {
        if let Expr::Column(c) = e {
            diags.push(err(
                &format!("`{phase}` may not reference columns"),
                &c.info,
            ));
        }
        if let Expr::ColumnAssign { info, .. } = e {
            diags.push(err(&format!("`{phase}` may not assign columns"), info));
        }
    });
}

fn forbid_result_column(body: &[Stmt], phase: &str, diags: &mut Vec<DiagEntry>) {
    walk_stmts(body, &mut |e| {
        if let Expr::Column(c) = e {
            if c.kind == ColumnKind::Result {
                diags.push(err(
                    &format!("`{phase}` may not reference the result row (`%col`) before `execute()` has run"),
                    &c.info,
                ));
            }
        }
    });
}

fn forbid_main_column(body: &[Stmt], phase: &str, diags: &mut Vec<DiagEntry>) {
    walk_stmts(body, &mut |e| {
        if let Expr::Column(c) = e {
            if c.kind == ColumnKind::Value {
                diags.push(err(
                    &format!("`{phase}` may not reference `$col`: this task has no main object"),
                    &c.info,
                ));
            }
        }
    });
}

fn forbid_column_assign(body: &[Stmt], phase: &str, diags: &mut Vec<DiagEntry>) {
    walk_stmts(body, &mut |e| {
        if let Expr::ColumnAssign { info, .. } = e {
            diags.push(err(
                &format!("`{phase}` may not assign columns: this task has no destination object"),
                info,
            ));
        }
    });
}

fn walk_stmts(body: &[Stmt], visit: &mut impl FnMut(&Expr)) {
    for stmt in body {
        walk_stmt(stmt, visit);
    }
}

fn walk_stmt(stmt: &Stmt, visit: &mut impl FnMut(&Expr)) {
    match stmt {
        Stmt::Expr(e, _) => walk_expr(e, visit),
        Stmt::Var(d) => {
            if let Some(e) = &d.init {
                walk_expr(e, visit);
            }
        }
        Stmt::Compound(body, _) => walk_stmts(body, visit),
        Stmt::IfElse { cond, then_branch, else_branch, .. } => {
            walk_expr(cond, visit);
            walk_stmts(then_branch, visit);
            walk_stmts(else_branch, visit);
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(cond, visit);
            walk_stmts(body, visit);
        }
        Stmt::Repeat { body, cond, .. } => {
            walk_stmts(body, visit);
            walk_expr(cond, visit);
        }
        Stmt::For { iterable, body, .. } => {
            walk_expr(iterable, visit);
            walk_stmts(body, visit);
        }
        Stmt::Assert(cond, _, _) => walk_expr(cond, visit),
        Stmt::Log(e, _) => walk_expr(e, visit),
        Stmt::TaskExec { args, .. } => args.iter().for_each(|a| walk_expr(a, visit)),
        Stmt::SqlExec { sql, binds, .. } => {
            walk_expr(sql, visit);
            binds.iter().for_each(|a| walk_expr(a, visit));
        }
        Stmt::TryCatch { body, handlers, .. } => {
            walk_stmts(body, visit);
            handlers.iter().for_each(|h| walk_stmts(&h.body, visit));
        }
        Stmt::Throw { arg, .. } => {
            if let Some(e) = arg {
                walk_expr(e, visit);
            }
        }
        Stmt::Continue(_) | Stmt::Break(_) | Stmt::Rethrow(_) => {}
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                walk_expr(e, visit);
            }
        }
    }
}

fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
    visit(expr);
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, visit);
            walk_expr(rhs, visit);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, visit),
        Expr::Assign { target, value, .. } => {
            walk_expr(target, visit);
            walk_expr(value, visit);
        }
        Expr::ColumnAssign { value, .. } => walk_expr(value, visit),
        Expr::FuncCall { args, .. } => args.iter().for_each(|a| walk_expr(a, visit)),
        Expr::Lambda { body, .. } => walk_expr(body, visit),
        Expr::Literal(..) | Expr::Id(..) | Expr::Column(..) => {}
    }
}

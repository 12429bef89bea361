//! End-to-end tests driving [`argon_dts::Engine`] with hand-built
//! `ast::Program` values — there is no parser in this crate, so every
//! scenario below plays the role a lexer/parser's output would.

use argon_dts::ast::*;
use argon_dts::db::sqlite::SqliteEnvironment;
use argon_dts::{Engine, EngineOptions};
use std::cell::RefCell;
use std::rc::Rc;

fn info() -> SourceInfo {
    SourceInfo::synthetic()
}

fn lit_int(v: i64) -> Expr {
    Expr::Literal(Literal::Int(v), info())
}

fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::Str(s.to_string()), info())
}

fn lit_null() -> Expr {
    Expr::Literal(Literal::Null, info())
}

fn id(name: &str) -> Expr {
    Expr::Id(Identifier::new(name), info())
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), info: info() }
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::FuncCall { name: Identifier::new(name), args, info: info() }
}

fn assign(name: &str, value: Expr) -> Expr {
    Expr::Assign { target: Box::new(id(name)), value: Box::new(value), info: info() }
}

fn column(kind: ColumnKind, selector: ColumnSelector) -> Expr {
    Expr::Column(ColumnRef { kind, selector, info: info() })
}

fn column_assign(selector: ColumnSelector, value: Expr) -> Expr {
    Expr::ColumnAssign {
        target: ColumnRef { kind: ColumnKind::Value, selector, info: info() },
        value: Box::new(value),
        info: info(),
    }
}

fn stmt_expr(e: Expr) -> Stmt {
    Stmt::Expr(e, info())
}

fn stmt_log(e: Expr) -> Stmt {
    Stmt::Log(e, info())
}

fn stmt_assert(cond: Expr) -> Stmt {
    Stmt::Assert(cond, None, info())
}

fn var_decl(name: &str, init: Option<Expr>) -> TopLevel {
    TopLevel::Var(VarDecl { name: Identifier::new(name), init, info: info() })
}

fn conn_decl(name: &str, dsn: &str) -> TopLevel {
    TopLevel::Connection(ConnDecl { name: Identifier::new(name), dsn: lit_str(dsn), options: vec![], info: info() })
}

fn table_type(name: &str, connection: &str, table: &str, columns: &[&str]) -> TopLevel {
    TopLevel::CustomType(TypeDecl {
        name: Identifier::new(name),
        kind: TypeKind::Table {
            connection: Identifier::new(connection),
            table: table.to_string(),
            columns: columns.iter().map(|c| Identifier::new(*c)).collect(),
        },
        info: info(),
    })
}

fn template_ref(name: &str, args: Vec<Expr>) -> TemplateRef {
    TemplateRef { name: Identifier::new(name), args, info: info() }
}

fn void_task(name: &str, before: Vec<Stmt>) -> TopLevel {
    TopLevel::Task(TaskDecl {
        name: Identifier::new(name),
        shape: TaskShape::Void,
        args: vec![],
        dest: None,
        source: None,
        phases: TaskPhases { before, ..Default::default() },
        info: info(),
    })
}

fn fetch_task(name: &str, source: TemplateRef, rules: Vec<Stmt>, final_phase: Vec<Stmt>) -> TopLevel {
    TopLevel::Task(TaskDecl {
        name: Identifier::new(name),
        shape: TaskShape::Fetch,
        args: vec![],
        dest: None,
        source: Some(source),
        phases: TaskPhases { rules, r#final: final_phase, ..Default::default() },
        info: info(),
    })
}

fn store_task(name: &str, dest: TemplateRef, rules: Vec<Stmt>) -> TopLevel {
    TopLevel::Task(TaskDecl {
        name: Identifier::new(name),
        shape: TaskShape::Store,
        args: vec![],
        dest: Some(dest),
        source: None,
        phases: TaskPhases { rules, ..Default::default() },
        info: info(),
    })
}

fn lit_numeric(digits: &str, scale: u32) -> Expr {
    Expr::Literal(Literal::Numeric { digits: digits.to_string(), scale }, info())
}

fn exception_decl(name: &str) -> TopLevel {
    TopLevel::ExceptionDecl(ExceptionDecl {
        name: Identifier::new(name),
        matcher: ExceptionMatcher::ExceptionId(name.to_string()),
        info: info(),
    })
}

fn transfer_task(name: &str, source: TemplateRef, dest: TemplateRef, rules: Vec<Stmt>) -> TopLevel {
    TopLevel::Task(TaskDecl {
        name: Identifier::new(name),
        shape: TaskShape::Transfer,
        args: vec![],
        dest: Some(dest),
        source: Some(source),
        phases: TaskPhases { rules, ..Default::default() },
        info: info(),
    })
}

fn engine_with_logger() -> (Engine, Rc<RefCell<Vec<String>>>) {
    let mut engine = Engine::new(EngineOptions::default());
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    engine.register_logger(Box::new(move |message: &str| sink.borrow_mut().push(message.to_string())));
    (engine, log)
}

#[test]
fn hello_world_logs_and_exits_zero() {
    let mut program = Program::new();
    program.push(void_task("main", vec![stmt_log(lit_str("hello, argon"))]));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), argon_dts::engine::EXIT_SUCCESS);
    assert_eq!(log.borrow().as_slice(), &["hello, argon".to_string()]);
}

#[test]
fn assert_failure_exits_with_code_two() {
    let mut program = Program::new();
    program.push(void_task(
        "main",
        vec![stmt_assert(binary(BinaryOp::Eq, lit_int(1), lit_int(2)))],
    ));

    let (mut engine, _log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), argon_dts::engine::EXIT_ASSERT);
}

#[test]
fn sys_terminate_returns_its_explicit_code() {
    let mut program = Program::new();
    program.push(void_task("main", vec![stmt_expr(call("sys.terminate", vec![lit_int(42)]))]));

    let (mut engine, _log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), 42);
}

#[test]
fn fetch_task_sums_an_inclusive_gen_range() {
    let mut program = Program::new();
    program.push(var_decl("total", Some(lit_int(0))));
    program.push(fetch_task(
        "sum_task",
        template_ref("gen_range", vec![lit_int(1), lit_int(5)]),
        vec![stmt_expr(assign(
            "total",
            binary(BinaryOp::Add, id("total"), column(ColumnKind::Value, ColumnSelector::Number(1))),
        ))],
        vec![stmt_log(id("total"))],
    ));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    engine.call_task("sum_task", Vec::new()).expect("sum_task runs");
    // 1 + 2 + 3 + 4 + 5, inclusive of both bounds.
    assert_eq!(log.borrow().as_slice(), &["15".to_string()]);
}

#[test]
fn store_task_writes_a_single_row() {
    let mut program = Program::new();
    program.push(conn_decl("db", ":memory:"));
    program.push(table_type("dest_tbl", "db", "dest_table", &["value"]));
    program.push(void_task(
        "setup",
        vec![Stmt::SqlExec {
            connection: Identifier::new("db"),
            sql: lit_str("CREATE TABLE dest_table(value INTEGER)"),
            binds: vec![],
            info: info(),
        }],
    ));
    program.push(store_task(
        "insert_one",
        template_ref("dest_tbl", vec![]),
        vec![stmt_expr(column_assign(ColumnSelector::Number(1), lit_int(99)))],
    ));
    program.push(void_task(
        "check",
        vec![
            stmt_expr(assign(
                "cnt",
                call("sql.scalar", vec![lit_str("db"), lit_str("SELECT COUNT(*) FROM dest_table")]),
            )),
            stmt_log(id("cnt")),
        ],
    ));

    let (mut engine, log) = engine_with_logger();
    engine.add_connection(Box::new(SqliteEnvironment));
    engine.load_ast(program).expect("compiles");
    engine.call_task("setup", Vec::new()).expect("setup runs");
    engine.call_task("insert_one", Vec::new()).expect("insert_one runs");
    engine.call_task("check", Vec::new()).expect("check runs");
    assert_eq!(log.borrow().as_slice(), &["1".to_string()]);
}

#[test]
fn transfer_task_copies_source_rows_into_a_sqlite_table() {
    let mut program = Program::new();
    program.push(conn_decl("db", ":memory:"));
    program.push(table_type("dest_tbl", "db", "dest_table", &["value"]));
    program.push(void_task(
        "setup",
        vec![Stmt::SqlExec {
            connection: Identifier::new("db"),
            sql: lit_str("CREATE TABLE dest_table(value INTEGER)"),
            binds: vec![],
            info: info(),
        }],
    ));
    program.push(transfer_task(
        "xfer",
        template_ref("gen_range", vec![lit_int(1), lit_int(3)]),
        template_ref("dest_tbl", vec![]),
        vec![stmt_expr(column_assign(
            ColumnSelector::Number(1),
            column(ColumnKind::Value, ColumnSelector::Number(1)),
        ))],
    ));
    program.push(void_task(
        "check",
        vec![
            stmt_expr(assign(
                "cnt",
                call("sql.scalar", vec![lit_str("db"), lit_str("SELECT COUNT(*) FROM dest_table")]),
            )),
            stmt_log(id("cnt")),
        ],
    ));

    let (mut engine, log) = engine_with_logger();
    engine.add_connection(Box::new(SqliteEnvironment));
    engine.load_ast(program).expect("compiles");
    engine.call_task("setup", Vec::new()).expect("setup runs");
    engine.call_task("xfer", Vec::new()).expect("xfer runs");
    engine.call_task("check", Vec::new()).expect("check runs");
    assert_eq!(log.borrow().as_slice(), &["3".to_string()]);
}

#[test]
fn try_catch_handles_a_runtime_error() {
    let mut program = Program::new();
    program.push(void_task(
        "main",
        vec![Stmt::TryCatch {
            body: vec![stmt_expr(call("no_such_function", vec![]))],
            handlers: vec![CatchClause { matcher: CatchMatcher::Any, body: vec![stmt_log(lit_str("caught"))] }],
            info: info(),
        }],
    ));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), argon_dts::engine::EXIT_SUCCESS);
    assert_eq!(log.borrow().as_slice(), &["caught".to_string()]);
}

#[test]
fn string_concat_renders_null_as_a_marker() {
    let mut program = Program::new();
    program.push(void_task(
        "main",
        vec![
            stmt_expr(assign("msg", call("string.concat", vec![lit_str("a"), lit_null(), lit_str("b")]))),
            stmt_log(id("msg")),
        ],
    ));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), argon_dts::engine::EXIT_SUCCESS);
    assert_eq!(log.borrow().as_slice(), &["a<null>b".to_string()]);
}

#[test]
fn void_task_cannot_declare_a_source_template() {
    let mut program = Program::new();
    program.push(TopLevel::Task(TaskDecl {
        name: Identifier::new("bad"),
        shape: TaskShape::Void,
        args: vec![],
        dest: None,
        source: Some(template_ref("gen_range", vec![lit_int(1), lit_int(2)])),
        phases: TaskPhases::default(),
        info: info(),
    }));

    let mut engine = Engine::new(EngineOptions::default());
    let err = engine.load_ast(program).expect_err("a VOID task with a source template must be rejected");
    assert!(err.error_count() >= 1);
}

#[test]
fn compact_builtin_joins_staged_writes_and_publishes_the_result_row() {
    // `compact(ref, sep)` accumulates non-NULL `$1` writes; a STORE task
    // drives it the same way it would drive a real destination object, and
    // `%1` reads back the separator-joined text produced by `execute()`.
    let mut program = Program::new();
    program.push(TopLevel::Task(TaskDecl {
        name: Identifier::new("joiner"),
        shape: TaskShape::Store,
        args: vec![],
        dest: Some(template_ref("compact", vec![lit_null(), lit_str("-")])),
        source: None,
        phases: TaskPhases {
            rules: vec![stmt_expr(column_assign(ColumnSelector::Number(1), lit_str("alpha")))],
            after: vec![stmt_log(column(ColumnKind::Result, ColumnSelector::Number(1)))],
            ..Default::default()
        },
        info: info(),
    }));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    engine.call_task("joiner", Vec::new()).expect("joiner runs");
    assert_eq!(log.borrow().as_slice(), &["alpha".to_string()]);
}

#[test]
fn throw_is_caught_by_a_tasks_after_exception_handler() {
    let mut program = Program::new();
    program.push(exception_decl("E"));
    program.push(TopLevel::Task(TaskDecl {
        name: Identifier::new("main"),
        shape: TaskShape::Void,
        args: vec![],
        dest: None,
        source: None,
        phases: TaskPhases {
            rules: vec![Stmt::Throw { name: Identifier::new("E"), arg: Some(lit_str("boom")), info: info() }],
            after_handlers: vec![CatchClause {
                matcher: CatchMatcher::ExceptionName(Identifier::new("E")),
                body: vec![stmt_log(lit_str("caught"))],
            }],
            ..Default::default()
        },
        info: info(),
    }));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), argon_dts::engine::EXIT_SUCCESS);
    assert_eq!(log.borrow().as_slice(), &["caught".to_string()]);
}

#[test]
fn unhandled_throw_propagates_past_the_task() {
    let mut program = Program::new();
    program.push(exception_decl("E"));
    program.push(void_task(
        "main",
        vec![Stmt::Throw { name: Identifier::new("E"), arg: None, info: info() }],
    ));

    let (mut engine, _log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), argon_dts::engine::EXIT_ASSERT);
}

#[test]
fn numeric_format_then_from_string_round_trips() {
    let mut program = Program::new();
    program.push(void_task(
        "main",
        vec![
            stmt_expr(assign("formatted", call("numeric.format", vec![lit_numeric("4250", 2)]))),
            stmt_log(id("formatted")),
            stmt_expr(assign("back", call("numeric.from_string", vec![id("formatted")]))),
            stmt_assert(binary(BinaryOp::Eq, id("back"), call("numeric.cast", vec![lit_numeric("4250", 2)]))),
        ],
    ));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), argon_dts::engine::EXIT_SUCCESS);
    assert_eq!(log.borrow().as_slice(), &["42.50".to_string()]);
}

#[test]
fn date_format_uses_the_locale_default_pattern() {
    let mut program = Program::new();
    program.push(void_task(
        "main",
        vec![
            stmt_expr(assign("d", call("date.encode", vec![lit_int(2026), lit_int(8), lit_int(1)]))),
            stmt_log(call("date.format", vec![id("d")])),
        ],
    ));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    assert_eq!(engine.exec(), argon_dts::engine::EXIT_SUCCESS);
    assert_eq!(log.borrow().as_slice(), &["08/01/2026".to_string()]);
}

#[test]
fn store_task_rejects_a_main_column_read() {
    let mut program = Program::new();
    program.push(store_task(
        "bad",
        template_ref("gen_range", vec![lit_int(1), lit_int(2)]),
        vec![stmt_expr(column_assign(
            ColumnSelector::Number(1),
            column(ColumnKind::Value, ColumnSelector::Number(1)),
        ))],
    ));

    let mut engine = Engine::new(EngineOptions::default());
    let err = engine.load_ast(program).expect_err("a STORE task reading `$col` must be rejected");
    assert!(err.error_count() >= 1);
}

#[test]
fn fetch_task_never_runs_the_after_phase() {
    let mut program = Program::new();
    program.push(var_decl("hits", Some(lit_int(0))));
    program.push(TopLevel::Task(TaskDecl {
        name: Identifier::new("counter"),
        shape: TaskShape::Fetch,
        args: vec![],
        dest: None,
        source: Some(template_ref("gen_range", vec![lit_int(1), lit_int(3)])),
        phases: TaskPhases {
            after: vec![stmt_expr(assign("hits", binary(BinaryOp::Add, id("hits"), lit_int(1))))],
            r#final: vec![stmt_log(id("hits"))],
            ..Default::default()
        },
        info: info(),
    }));

    let (mut engine, log) = engine_with_logger();
    engine.load_ast(program).expect("compiles");
    engine.call_task("counter", Vec::new()).expect("counter runs");
    assert_eq!(log.borrow().as_slice(), &["0".to_string()]);
}

#[test]
fn sql_list_joins_rows_with_the_separator_argument() {
    let mut program = Program::new();
    program.push(conn_decl("db", ":memory:"));
    program.push(void_task(
        "setup",
        vec![
            Stmt::SqlExec {
                connection: Identifier::new("db"),
                sql: lit_str("CREATE TABLE t(v TEXT)"),
                binds: vec![],
                info: info(),
            },
            Stmt::SqlExec {
                connection: Identifier::new("db"),
                sql: lit_str("INSERT INTO t VALUES ('a')"),
                binds: vec![],
                info: info(),
            },
            Stmt::SqlExec {
                connection: Identifier::new("db"),
                sql: lit_str("INSERT INTO t VALUES ('b')"),
                binds: vec![],
                info: info(),
            },
        ],
    ));
    program.push(void_task(
        "check",
        vec![
            stmt_expr(assign(
                "joined",
                call("sql.list", vec![lit_str("db"), lit_str("SELECT v FROM t ORDER BY v"), lit_str("|")]),
            )),
            stmt_log(id("joined")),
        ],
    ));

    let (mut engine, log) = engine_with_logger();
    engine.add_connection(Box::new(SqliteEnvironment));
    engine.load_ast(program).expect("compiles");
    engine.call_task("setup", Vec::new()).expect("setup runs");
    engine.call_task("check", Vec::new()).expect("check runs");
    assert_eq!(log.borrow().as_slice(), &["a|b".to_string()]);
}

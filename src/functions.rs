//! Lambda values and the built-in function catalogue (`SPEC_FULL.md`
//! §4.14), grounded in `examples/original_source/src/builtin/*.cc`.

use crate::ast::{Expr, Identifier};
use crate::errors::RuntimeError;
use crate::ir::symbol_table::SubSymbols;
use crate::value::Variant;
use regex::Regex;
use rust_decimal::Decimal;

/// A lambda expression's captured closure plus its body, built by
/// [`crate::ir::symbol_table::SymbolTable::clone_symbols`] at the point the
/// lambda literal is evaluated.
pub struct LambdaValue {
    pub args: Vec<Identifier>,
    pub body: Expr,
    pub closure: SubSymbols,
}

/// A builtin's declared arity bounds, enforced before dispatch — matching
/// the original's `builtin_func_def{name, factory, min_arg, max_arg}`
/// table.
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

pub fn arity_of(name: &str) -> Option<Arity> {
    let a = |min, max| Some(Arity { min, max });
    match name {
        "string.concat" => a(0, usize::MAX),
        "string.len" => a(1, 1),
        "date.encode" => a(3, 3),
        "date.year" | "date.month" | "date.day" => a(1, 1),
        "date.format" => a(1, 2),
        "numeric.format" => a(1, 4),
        "numeric.from_string" => a(1, 1),
        "numeric.cast" => a(1, 2),
        "regex.match" => a(2, 2),
        "regex.search_n" => a(3, 3),
        "regex.replace" => a(3, 3),
        "sql.scalar" => a(2, usize::MAX),
        "sql.exec" => a(2, usize::MAX),
        "sql.list" => a(3, usize::MAX),
        "sys.terminate" => a(0, 1),
        "sys.isnull" => a(1, 1),
        "sys.charseq" => a(0, usize::MAX),
        "sys.byteseq" => a(0, usize::MAX),
        "sys.newline" => a(0, 0),
        "trx.start" | "trx.commit" => a(1, 1),
        "trx.rollback" => a(1, 2),
        "trx.savepoint" => a(2, 2),
        "seq.next" => a(1, 1),
        "debug.echo" => a(1, 1),
        "debug.symbol_exists" => a(1, 1),
        _ => None,
    }
}

pub fn check_arity(name: &str, argc: usize) -> Result<(), RuntimeError> {
    match arity_of(name) {
        Some(Arity { min, max }) if argc >= min && argc <= max => Ok(()),
        Some(Arity { min, max }) => Err(RuntimeError::internal(format!(
            "{name}: expected {min}..{max} arguments, got {argc}"
        ))),
        None => Err(RuntimeError::not_declared(name.to_string())),
    }
}

/// Builtins that are pure functions of their arguments (no connection,
/// transaction or sequence access). `sql.*`/`trx.*`/`seq.next` are
/// dispatched separately in [`crate::eval`] because they need a live
/// [`crate::elements::ConnectionHandle`]. `locale` is the engine's
/// `EngineOptions.locale`, consulted only by the locale-sensitive
/// formatters (`numeric.format`/`date.format`) when the caller omits the
/// separator/pattern arguments that would otherwise override it.
pub fn call_pure(name: &str, args: &[Variant], locale: &str) -> Result<Variant, RuntimeError> {
    check_arity(name, args.len())?;
    match name {
        "string.concat" => Ok(Variant::Str(
            args.iter().map(Variant::display_or_null_marker).collect::<String>(),
        )),
        "string.len" => match &args[0] {
            Variant::Null => Ok(Variant::Null),
            v => Ok(Variant::Int(v.to_string().chars().count() as i64)),
        },
        "date.encode" => {
            if args.iter().any(Variant::is_null) {
                return Ok(Variant::Null);
            }
            let (y, m, d) = (
                args[0].as_i64().unwrap_or_default() as i32,
                args[1].as_i64().unwrap_or_default() as u32,
                args[2].as_i64().unwrap_or_default() as u32,
            );
            chrono::NaiveDate::from_ymd_opt(y, m, d)
                .map(Variant::Date)
                .ok_or_else(|| RuntimeError::internal("date.encode: invalid date"))
        }
        "date.year" | "date.month" | "date.day" => match &args[0] {
            Variant::Null => Ok(Variant::Null),
            Variant::Date(d) => {
                use chrono::Datelike;
                Ok(Variant::Int(match name {
                    "date.year" => d.year() as i64,
                    "date.month" => d.month() as i64,
                    _ => d.day() as i64,
                }))
            }
            _ => Err(RuntimeError::internal(format!("{name}: argument is not a date"))),
        },
        "date.format" => match &args[0] {
            Variant::Null => Ok(Variant::Null),
            Variant::Date(d) => {
                let fmt = args
                    .get(1)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| default_date_format(locale).to_string());
                format_date(*d, &fmt).map(Variant::Str)
            }
            _ => Err(RuntimeError::internal("date.format: argument is not a date")),
        },
        "numeric.from_string" => match &args[0] {
            Variant::Null => Ok(Variant::Null),
            v => v
                .to_string()
                .parse()
                .map(Variant::Numeric)
                .map_err(|_| RuntimeError::internal("numeric.from_string: invalid numeric literal")),
        },
        "numeric.cast" => match to_decimal_operand(&args[0]) {
            None => Ok(Variant::Null),
            Some(d) => {
                let d = match args.get(1).and_then(Variant::as_i64) {
                    Some(scale) => d.round_dp(scale.max(0) as u32),
                    None => d,
                };
                Ok(Variant::Numeric(d))
            }
        },
        "numeric.format" => match to_decimal_operand(&args[0]) {
            None => Ok(Variant::Null),
            Some(d) => {
                let (default_thousand, default_decimal) = locale_separators(locale);
                let thousand_sep = args.get(2).map(|v| v.to_string()).unwrap_or_else(|| default_thousand.to_string());
                let decimal_sep = args.get(3).map(|v| v.to_string()).unwrap_or_else(|| default_decimal.to_string());
                let scale = args
                    .get(1)
                    .and_then(Variant::as_i64)
                    .map(|n| n.max(0) as u32)
                    .unwrap_or_else(|| d.scale());
                let rounded = d.round_dp(scale).abs();
                let digits = rounded.to_string();
                let (lpart, rpart) = match digits.split_once('.') {
                    Some((l, r)) => (l.to_string(), r.to_string()),
                    None => (digits, String::new()),
                };
                let mut s = group_thousands(&lpart, &thousand_sep);
                if !rpart.is_empty() {
                    s.push_str(&decimal_sep);
                    s.push_str(&rpart);
                }
                if d.is_sign_negative() {
                    s.insert(0, '-');
                }
                Ok(Variant::Str(s))
            }
        },
        "sys.isnull" => Ok(Variant::Bool(args[0].is_null())),
        "sys.newline" => Ok(Variant::Str("\r\n".to_string())),
        "sys.charseq" | "sys.byteseq" => {
            let bytes: Vec<u8> = args
                .iter()
                .map(|v| v.as_i64().unwrap_or(0) as u8)
                .collect();
            if name == "sys.charseq" {
                Ok(Variant::Str(String::from_utf8_lossy(&bytes).into_owned()))
            } else {
                Ok(Variant::VarBinary(bytes))
            }
        }
        "regex.match" => {
            let re = compile_regex(&args[1])?;
            Ok(Variant::Bool(re.is_match(&args[0].to_string())))
        }
        "regex.search_n" => {
            let re = compile_regex(&args[1])?;
            let n = args[2].as_i64().unwrap_or(0) as usize;
            Ok(re
                .captures(&args[0].to_string())
                .and_then(|c| c.get(n))
                .map(|m| Variant::Str(m.as_str().to_string()))
                .unwrap_or(Variant::Null))
        }
        "regex.replace" => {
            let re = compile_regex(&args[1])?;
            let replacement = args[2].to_string();
            Ok(Variant::Str(
                re.replace_all(&args[0].to_string(), replacement.as_str()).into_owned(),
            ))
        }
        "debug.echo" => {
            tracing::debug!(target: "argon::builtin", value = %args[0], "debug.echo");
            Ok(args[0].clone())
        }
        other => Err(RuntimeError::not_declared(other.to_string())),
    }
}

fn compile_regex(pattern: &Variant) -> Result<Regex, RuntimeError> {
    Regex::new(&pattern.to_string()).map_err(|e| RuntimeError::internal(format!("invalid regex: {e}")))
}

/// `Null` stays `Null` (propagated by the caller); anything already
/// numeric is taken as-is, everything else is parsed the same way
/// `numeric.from_string` does.
fn to_decimal_operand(v: &Variant) -> Option<Decimal> {
    match v {
        Variant::Null => None,
        Variant::Numeric(d) => Some(*d),
        Variant::Int(i) => Some(Decimal::from(*i)),
        other => other.to_string().parse().ok(),
    }
}

/// `(thousands, decimal)` separators `numeric.format` falls back to when
/// the caller doesn't supply its own — a deliberately small two-bucket
/// approximation of the original's `std::numpunct` lookup, since this
/// crate has no ICU/CLDR dependency.
fn locale_separators(locale: &str) -> (&'static str, &'static str) {
    let lower = locale.to_ascii_lowercase();
    if lower.starts_with("de") || lower.starts_with("fr") || lower.starts_with("it") {
        (".", ",")
    } else {
        (",", ".")
    }
}

/// Right-to-left grouping of a digit string into chunks of three, joined
/// by `sep` — the original's reverse-iterator grouping loop in
/// `numeric.cc::func_format::run`.
fn group_thousands(digits: &str, sep: &str) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut groups = Vec::new();
    let mut end = chars.len();
    while end > 3 {
        groups.push(chars[end - 3..end].iter().collect::<String>());
        end -= 3;
    }
    groups.push(chars[..end].iter().collect::<String>());
    groups.reverse();
    groups.join(sep)
}

fn default_date_format(locale: &str) -> &'static str {
    if locale.to_ascii_lowercase().starts_with("en") {
        "mm/dd/yyyy"
    } else {
        "dd.mm.yyyy"
    }
}

/// `yyyy`/`yy`, `mm`/`m`, `dd`/`d` tokens, everything else copied through
/// literally — matching the token grammar in `date.cc::func_format::run`.
fn format_date(d: chrono::NaiveDate, fmt: &str) -> Result<String, RuntimeError> {
    use chrono::Datelike;
    let chars: Vec<char> = fmt.chars().collect();
    let mut res = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == 'y' || c == 'm' || c == 'd' {
            let mut run = String::new();
            while i < chars.len() && chars[i] == c {
                run.push(chars[i]);
                i += 1;
            }
            let value = match c {
                'y' => d.year(),
                'm' => d.month() as i32,
                _ => d.day() as i32,
            };
            let width = match (c, run.as_str()) {
                ('y', "yyyy") => 4,
                ('y', "yy") => 2,
                ('m', "mm") | ('d', "dd") => 2,
                ('m', "m") | ('d', "d") => 1,
                _ => return Err(RuntimeError::internal(format!("date.format: invalid format token `{run}`"))),
            };
            res.push_str(&format!("{value:0width$}"));
        } else {
            res.push(c);
            i += 1;
        }
    }
    Ok(res)
}

/// Builtins dispatched purely by name that nonetheless need to know
/// whether they are even declared, used by `debug.symbol_exists`'s "does
/// this name resolve" check without raising on a miss.
pub fn is_builtin(name: &str) -> bool {
    arity_of(name).is_some()
}

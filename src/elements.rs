//! Runtime values: the polymorphic [`Element`] every symbol-table slot and
//! evaluator result is ultimately one of, per `SPEC_FULL.md` §3/§4.

use crate::ast::{FunctionDecl, Identifier};
use crate::control::ExceptionPayload;
use crate::db::Connection as DbConnection;
use crate::functions::LambdaValue;
use crate::ir::Type;
use crate::objects::Object;
use crate::tasks::Task;
use crate::value::Variant;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A live database connection, named the way it was declared, so
/// diagnostics can say which connection a `ConnectionErr` came from.
pub struct ConnectionHandle {
    pub name: Identifier,
    pub dsn: String,
    pub conn: Box<dyn DbConnection>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionHandle({})", self.name)
    }
}

/// The runtime value every symbol table slot, evaluator result and
/// function-call argument ultimately is.
#[derive(Clone)]
pub enum Element {
    Value(Variant),
    Connection(Rc<RefCell<ConnectionHandle>>),
    /// `seq.next(seq)` operates on a named sequence scoped to a
    /// connection; SQLite has no native sequence object so the concrete
    /// backend emulates one (see [`crate::db::sqlite`]).
    Sequence {
        connection: Rc<RefCell<ConnectionHandle>>,
        name: String,
    },
    TypeRef(Rc<Type>),
    Object(Rc<RefCell<Object>>),
    Task(Rc<RefCell<Task>>),
    Function(Rc<FunctionDecl>),
    Lambda(Rc<LambdaValue>),
    /// The payload carried by a caught exception while its handler runs;
    /// released as soon as the handler block exits (see
    /// [`crate::control::ScopedReleaseException`]).
    Exception(Rc<ExceptionPayload>),
}

impl Element {
    pub fn int(v: i64) -> Self {
        Element::Value(Variant::Int(v))
    }

    pub fn str(v: impl Into<String>) -> Self {
        Element::Value(Variant::Str(v.into()))
    }

    pub fn null() -> Self {
        Element::Value(Variant::Null)
    }

    pub fn as_value(&self) -> Option<&Variant> {
        match self {
            Element::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_value().and_then(Variant::as_i64)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Element::Value(v) => v.type_name(),
            Element::Connection(_) => "connection",
            Element::Sequence { .. } => "sequence",
            Element::TypeRef(_) => "type",
            Element::Object(_) => "object",
            Element::Task(_) => "task",
            Element::Function(_) => "function",
            Element::Lambda(_) => "lambda",
            Element::Exception(_) => "exception",
        }
    }

    /// Whether this element may appear as an ordinary expression operand.
    /// Non-value kinds (connections, objects, tasks, ...) only participate
    /// in specific syntactic positions (`$col`, `task.exec`, `trx.*`, ...)
    /// and raise `is not callable`/type errors everywhere else, matching
    /// the original `Element::run` default.
    pub fn is_value(&self) -> bool {
        matches!(self, Element::Value(_))
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element::{}", self.type_name())
    }
}

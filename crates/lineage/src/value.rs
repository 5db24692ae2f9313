//! Runtime values.
//!
//! Values live in the session heap (`EvalMemory`) and are addressed by
//! [`ValueId`]. A `ValueId` is the value's identity: lineage associations are
//! keyed by it, and forcing a thunk overwrites the slot in place so the
//! identity survives evaluation.

use crate::bindings::BindingsId;
use crate::expr::Expr;
use crate::symbol::Symbol;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Slot in the value heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into the session's built-in table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PrimOpId(pub(crate) u32);

/// Lexical environment of a lazy computation.
#[derive(Debug, Default)]
pub struct Env {
    pub up: Option<Rc<Env>>,
    pub vars: FxHashMap<Symbol, ValueId>,
}

impl Env {
    pub fn lookup(&self, name: Symbol) -> Option<ValueId> {
        let mut env = self;
        loop {
            if let Some(&value) = env.vars.get(&name) {
                return Some(value);
            }
            env = env.up.as_deref()?;
        }
    }
}

/// A deferred computation.
#[derive(Debug, Clone)]
pub struct Thunk {
    pub expr: Rc<Expr>,
    pub env: Rc<Env>,
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Attrs(BindingsId),
    List(Rc<[ValueId]>),
    PrimOp(PrimOpId),
    /// Built-in applied to fewer arguments than its arity.
    PrimOpApp { primop: PrimOpId, args: Rc<[ValueId]> },
    Thunk(Thunk),
    /// A thunk that is currently being forced.
    Blackhole,
}

/// Shape of a value, as seen by the language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    String,
    Attrs,
    List,
    Function,
    Thunk,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Attrs => "set",
            ValueType::List => "list",
            ValueType::Function => "lambda",
            ValueType::Thunk => "thunk",
        }
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Attrs(_) => ValueType::Attrs,
            Value::List(_) => ValueType::List,
            Value::PrimOp(_) | Value::PrimOpApp { .. } => ValueType::Function,
            Value::Thunk(_) | Value::Blackhole => ValueType::Thunk,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    pub fn string(s: &str) -> Self {
        Value::String(s.into())
    }

    pub fn is_thunk(&self) -> bool {
        matches!(self, Value::Thunk(_) | Value::Blackhole)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_attrs(&self) -> Option<BindingsId> {
        match self {
            Value::Attrs(bindings) => Some(*bindings),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ValueId]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

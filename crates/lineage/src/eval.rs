//! Expression evaluation.
//!
//! `eval` writes the weak head normal form of an expression into a caller
//! chosen slot. Sub-expressions that are not needed yet become thunks, except
//! constants (stored directly) and variables (which reuse the variable's own
//! slot, so the value keeps its identity and lineage).

use crate::bindings::{Attr, BindingsId};
use crate::error::{EvalError, EvalResult};
use crate::expr::{BinOp, Expr, ExprKind};
use crate::position::PosIdx;
use crate::provenance::kind;
use crate::state::EvalState;
use crate::symbol::Symbol;
use crate::value::{Env, Thunk, Value, ValueId};
use rustc_hash::FxHashMap;
use std::rc::Rc;

impl EvalState {
    pub(crate) fn eval(&mut self, expr: &Rc<Expr>, env: &Rc<Env>, dest: ValueId) -> EvalResult<()> {
        match &expr.kind {
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::String(_) => {
                self.mem.set(dest, constant(expr));
            }
            ExprKind::Var(name) => {
                let slot = self.lookup_var(env, *name, expr.pos)?;
                self.force_value(slot, expr.pos)?;
                self.assign(dest, slot);
            }
            ExprKind::Select { base, path } => {
                let mut current = self.eval_to_slot(base, env)?;
                for segment in path {
                    current = self.select_attr(current, segment.name, segment.pos)?;
                }
                self.force_value(current, expr.pos)?;
                self.assign(dest, current);
            }
            ExprKind::Attrs(defs) => {
                let mut builder = self.mem.build_bindings(defs.len())?;
                for def in defs {
                    let value = self.maybe_thunk(&def.value, env);
                    builder.insert(&mut self.mem, def.name, value, def.pos);
                }
                let bindings = builder.finish(&mut self.mem);
                self.mem.bindings_mut().set_pos(bindings, expr.pos);
                self.mem.set(dest, Value::Attrs(bindings));
            }
            ExprKind::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.maybe_thunk(item, env))
                    .collect();
                let list = self.mem.make_list(items);
                self.mem.set(dest, list);
            }
            ExprKind::Let { bindings, body } => {
                let mut vars = FxHashMap::default();
                for def in bindings {
                    vars.insert(def.name, self.mem.alloc_value(Value::Null));
                }
                let inner = Rc::new(Env {
                    up: Some(env.clone()),
                    vars,
                });
                for def in bindings {
                    if let Some(&slot) = inner.vars.get(&def.name) {
                        let value = self.thunk_or_constant(&def.value, &inner);
                        self.mem.init(slot, value);
                    }
                }
                self.eval(body, &inner, dest)?;
            }
            ExprKind::Apply { function, argument } => {
                let function = self.eval_to_slot(function, env)?;
                let argument = self.maybe_thunk(argument, env);
                self.call_function(function, argument, dest, expr.pos)?;
            }
            ExprKind::BinOp { op, lhs, rhs } => {
                let lhs = self.eval_to_slot(lhs, env)?;
                self.force_value(lhs, expr.pos)?;
                let rhs = self.eval_to_slot(rhs, env)?;
                self.force_value(rhs, expr.pos)?;
                self.eval_bin_op(*op, lhs, rhs, dest, expr.pos)?;
            }
            ExprKind::Interpolate(parts) => {
                let mut text = String::new();
                let mut slots = Vec::with_capacity(parts.len());
                for part in parts {
                    let slot = self.eval_to_slot(part, env)?;
                    self.force_value(slot, part.pos)?;
                    text.push_str(&self.expect_string(slot, part.pos)?);
                    slots.push(slot);
                }
                self.mem.set(dest, Value::String(text.into()));
                self.derive_provenance(dest, kind::STRING_INTERPOLATION, expr.pos, &slots);
            }
        }
        Ok(())
    }

    fn lookup_var(&self, env: &Env, name: Symbol, pos: PosIdx) -> EvalResult<ValueId> {
        env.lookup(name).ok_or_else(|| EvalError::UndefinedVariable {
            name: self.symbols.resolve(name).to_owned(),
            pos,
        })
    }

    /// A slot holding the (possibly unforced) value of `expr`.
    ///
    /// Variables resolve to their own slot; anything else gets a fresh one.
    fn eval_to_slot(&mut self, expr: &Rc<Expr>, env: &Rc<Env>) -> EvalResult<ValueId> {
        if let ExprKind::Var(name) = expr.kind {
            return self.lookup_var(env, name, expr.pos);
        }
        let slot = self.mem.alloc_value(Value::Null);
        self.eval(expr, env, slot)?;
        Ok(slot)
    }

    /// Delay `expr`, reusing variable slots and storing constants directly.
    ///
    /// Unbound variables are delayed too, so the error surfaces only if the
    /// value is actually needed.
    pub(crate) fn maybe_thunk(&mut self, expr: &Rc<Expr>, env: &Rc<Env>) -> ValueId {
        if let ExprKind::Var(name) = expr.kind {
            if let Some(slot) = env.lookup(name) {
                return slot;
            }
        }
        let value = self.thunk_or_constant(expr, env);
        self.mem.alloc_value(value)
    }

    fn thunk_or_constant(&self, expr: &Rc<Expr>, env: &Rc<Env>) -> Value {
        if expr.is_constant() {
            constant(expr)
        } else {
            Value::Thunk(Thunk {
                expr: expr.clone(),
                env: env.clone(),
            })
        }
    }

    fn eval_bin_op(
        &mut self,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        dest: ValueId,
        pos: PosIdx,
    ) -> EvalResult<()> {
        let (result, lineage_kind) = match (op, self.value(lhs), self.value(rhs)) {
            (BinOp::Add, Value::String(a), Value::String(b)) => {
                let text: String = [&**a, &**b].concat();
                (Value::String(text.into()), kind::STRING_CONCAT)
            }
            (BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div, a, b) => {
                (arithmetic(op, a, b, pos)?, arithmetic_kind(op))
            }
            (BinOp::Concat, Value::List(a), Value::List(b)) => {
                let items = a.iter().chain(b.iter()).copied().collect();
                (self.mem.make_list(items), kind::LIST_CONCAT)
            }
            (BinOp::Update, Value::Attrs(a), Value::Attrs(b)) => {
                let (a, b) = (*a, *b);
                (Value::Attrs(self.update_attrs(a, b)?), kind::ATTR_MERGE)
            }
            (BinOp::Concat, a, b) => return Err(type_error("list", a, b, pos)),
            (BinOp::Update, a, b) => return Err(type_error("set", a, b, pos)),
        };
        self.mem.set(dest, result);
        self.derive_provenance(dest, lineage_kind, pos, &[lhs, rhs]);
        Ok(())
    }

    /// `left // right`: right-hand attributes win. Sorted merge of two sorted
    /// containers.
    fn update_attrs(&mut self, left: BindingsId, right: BindingsId) -> EvalResult<BindingsId> {
        let arena = self.mem.bindings();
        if arena.get(right).is_empty() {
            return Ok(left);
        }
        if arena.get(left).is_empty() {
            return Ok(right);
        }

        let merged: Vec<Attr> = {
            let (left, right) = (arena.get(left).attrs(), arena.get(right).attrs());
            let mut merged = Vec::with_capacity(left.len() + right.len());
            let (mut i, mut j) = (0, 0);
            while i < left.len() && j < right.len() {
                if left[i].name < right[j].name {
                    merged.push(left[i]);
                    i += 1;
                } else {
                    if left[i].name == right[j].name {
                        i += 1;
                    }
                    merged.push(right[j]);
                    j += 1;
                }
            }
            merged.extend_from_slice(&left[i..]);
            merged.extend_from_slice(&right[j..]);
            merged
        };

        let mut builder = self.mem.build_bindings(merged.len())?;
        for attr in merged {
            builder.insert(&mut self.mem, attr.name, attr.value, attr.pos);
        }
        let bindings = builder.finish(&mut self.mem);
        self.merge_lineage(bindings, left, right);
        Ok(bindings)
    }
}

fn constant(expr: &Expr) -> Value {
    match &expr.kind {
        ExprKind::Int(number) => Value::Int(*number),
        ExprKind::Float(number) => Value::Float(*number),
        ExprKind::String(text) => Value::String(text.clone()),
        _ => Value::Null,
    }
}

fn arithmetic_kind(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => kind::BINARY_ADD,
        BinOp::Sub => kind::BINARY_SUB,
        BinOp::Mul => kind::BINARY_MUL,
        _ => kind::BINARY_DIV,
    }
}

fn type_error(expected: &'static str, a: &Value, b: &Value, pos: PosIdx) -> EvalError {
    let actual = if a.type_name() == expected { b } else { a };
    EvalError::TypeError {
        expected,
        actual: actual.type_name(),
        pos,
    }
}

/// Integer arithmetic is checked; mixing in a float makes the result a float.
fn arithmetic(op: BinOp, a: &Value, b: &Value, pos: PosIdx) -> EvalResult<Value> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                _ => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero { pos });
                    }
                    a.checked_div(b)
                }
            };
            result
                .map(Value::Int)
                .ok_or(EvalError::IntegerOverflow { pos })
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (as_float(a), as_float(b));
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                _ => {
                    if b == 0.0 {
                        return Err(EvalError::DivisionByZero { pos });
                    }
                    a / b
                }
            };
            Ok(Value::Float(result))
        }
        (Value::Int(_) | Value::Float(_), other) | (other, _) => Err(EvalError::TypeError {
            expected: "int",
            actual: other.type_name(),
            pos,
        }),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(number) => *number as f64,
        Value::Float(number) => *number,
        _ => f64::NAN,
    }
}

//! The evaluation session.
//!
//! [`EvalState`] owns every arena of one session: the value heap, record
//! containers, lineage nodes and the value → lineage association. All handles
//! handed out by a session are plain indices into these arenas, so nothing is
//! freed before the session is dropped and no handle can dangle. The session
//! is deliberately `!Send`: environments and expressions are `Rc`-shared.

use crate::association::ProvenanceTable;
use crate::bindings::{AttrLineage, BindingsId};
use crate::builtins::{self, PrimOp};
use crate::error::{Error, EvalError, EvalResult};
use crate::expr::Expr;
use crate::memory::{EvalMemory, EvalStats};
use crate::parser;
use crate::position::{Origin, PosIdx, PosTable};
use crate::provenance::{Dependencies, ProvId, ProvenanceInterner};
use crate::settings::EvalSettings;
use crate::symbol::{StaticSymbols, Symbol, SymbolTable};
use crate::value::{Env, PrimOpId, Value, ValueId};
use rustc_hash::FxHashSet;
use std::borrow::Cow;
use std::rc::Rc;

pub struct EvalState {
    pub settings: EvalSettings,
    pub symbols: SymbolTable,
    pub positions: PosTable,
    pub mem: EvalMemory,
    pub provenance_interner: ProvenanceInterner,
    /// Symbols the runtime itself refers to.
    pub s: StaticSymbols,
    provenance: ProvenanceTable,
    primops: Vec<PrimOp>,
    base_env: Rc<Env>,
    depth: u32,
    nr_thunks_forced: u64,
}

impl EvalState {
    pub fn new(settings: EvalSettings) -> Self {
        let mut symbols = SymbolTable::new();
        let s = StaticSymbols::new(&mut symbols);
        let mut state = Self {
            settings,
            symbols,
            positions: PosTable::new(),
            mem: EvalMemory::new(),
            provenance_interner: ProvenanceInterner::new(),
            s,
            provenance: ProvenanceTable::new(),
            primops: Vec::new(),
            base_env: Rc::new(Env::default()),
            depth: 0,
            nr_thunks_forced: 0,
        };
        state.create_base_env();
        state
    }

    fn create_base_env(&mut self) {
        let primops: Vec<PrimOp> = builtins::registered()
            .into_iter()
            .filter(|primop| {
                primop
                    .experimental_feature
                    .is_none_or(|feature| self.settings.is_enabled(feature))
            })
            .collect();

        let mut env = Env::default();
        let null = self.mem.alloc_value(Value::Null);
        let yes = self.mem.alloc_value(Value::Bool(true));
        let no = self.mem.alloc_value(Value::Bool(false));
        env.vars.insert(self.symbols.create("null"), null);
        env.vars.insert(self.symbols.create("true"), yes);
        env.vars.insert(self.symbols.create("false"), no);

        let builtins = match self.mem.build_bindings(primops.len()) {
            Ok(mut builder) => {
                for (index, primop) in primops.iter().enumerate() {
                    let name = self.symbols.create(primop.name);
                    let slot = builder.push(&mut self.mem, name, PosIdx::NONE);
                    self.mem.set(slot, Value::PrimOp(PrimOpId(index as u32)));
                }
                builder.finish(&mut self.mem)
            }
            Err(_) => BindingsId::EMPTY,
        };
        let builtins = self.mem.alloc_value(Value::Attrs(builtins));
        env.vars.insert(self.s.builtins, builtins);

        log::debug!(
            "registered {} builtins: {}",
            primops.len(),
            primops
                .iter()
                .map(|primop| primop.name)
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.primops = primops;
        self.base_env = Rc::new(env);
    }

    /// Parse `code` registered under `origin` into an expression tree.
    pub fn parse(&mut self, code: &str, origin: Origin) -> Result<Rc<Expr>, Error> {
        let origin = self.positions.add_origin(origin, code);
        parser::parse_expr(code, origin, &mut self.symbols, &mut self.positions)
            .map_err(Error::Parse)
    }

    /// Parse and evaluate `code` to weak head normal form.
    pub fn eval_string(&mut self, code: &str, origin: Origin) -> Result<ValueId, Error> {
        let expr = self.parse(code, origin)?;
        Ok(self.eval_expr(&expr)?)
    }

    pub fn eval_expr(&mut self, expr: &Rc<Expr>) -> EvalResult<ValueId> {
        let dest = self.mem.alloc_value(Value::Null);
        let env = self.base_env.clone();
        self.eval(expr, &env, dest)?;
        Ok(dest)
    }

    pub fn value(&self, v: ValueId) -> &Value {
        self.mem.value(v)
    }

    /// Evaluate a thunk in place. Anything else is already forced.
    ///
    /// On failure the slot gets its thunk back, so forcing it again raises
    /// the same error instead of a spurious infinite recursion.
    pub fn force_value(&mut self, v: ValueId, pos: PosIdx) -> EvalResult<()> {
        let thunk = match self.mem.value(v) {
            Value::Thunk(thunk) => thunk.clone(),
            Value::Blackhole => return Err(EvalError::InfiniteRecursion { pos }),
            _ => return Ok(()),
        };
        if self.depth >= self.settings.max_call_depth {
            return Err(EvalError::MaxCallDepthExceeded {
                max: self.settings.max_call_depth,
                pos,
            });
        }

        log::trace!("forcing {:?}", v);
        self.mem.set(v, Value::Blackhole);
        self.depth += 1;
        let result = self.eval(&thunk.expr, &thunk.env, v);
        self.depth -= 1;

        if let Err(error) = result {
            self.mem.set(v, Value::Thunk(thunk));
            return Err(error);
        }
        self.nr_thunks_forced += 1;
        Ok(())
    }

    /// Force `v` and everything reachable from it.
    pub fn force_value_deep(&mut self, v: ValueId) -> EvalResult<()> {
        let mut seen = FxHashSet::default();
        self.force_value_deep_inner(v, PosIdx::NONE, &mut seen)
    }

    fn force_value_deep_inner(
        &mut self,
        v: ValueId,
        pos: PosIdx,
        seen: &mut FxHashSet<ValueId>,
    ) -> EvalResult<()> {
        if !seen.insert(v) {
            return Ok(());
        }
        self.force_value(v, pos)?;
        let children: Vec<(ValueId, PosIdx)> = match self.mem.value(v) {
            Value::Attrs(bindings) => self
                .mem
                .bindings()
                .get(*bindings)
                .iter()
                .map(|attr| (attr.value, attr.pos))
                .collect(),
            Value::List(items) => items.iter().map(|&item| (item, pos)).collect(),
            _ => return Ok(()),
        };
        for (child, pos) in children {
            self.force_value_deep_inner(child, pos, seen)?;
        }
        Ok(())
    }

    /// Position a value remembers about its own origin.
    ///
    /// Unevaluated values report their expression, records the record
    /// expression that built them, everything else has none.
    pub fn get_value_source_pos(&self, v: ValueId) -> PosIdx {
        match self.mem.value(v) {
            Value::Thunk(thunk) => thunk.expr.pos,
            Value::Attrs(bindings) => self.mem.bindings().get(*bindings).pos(),
            _ => PosIdx::NONE,
        }
    }

    pub fn get_provenance(&self, v: ValueId) -> Option<ProvId> {
        self.provenance.get(v)
    }

    pub fn set_provenance(&mut self, v: ValueId, node: ProvId) {
        self.provenance.set(v, node);
    }

    pub fn remove_provenance(&mut self, v: ValueId) {
        self.provenance.remove(v);
    }

    /// Copy the value in `src` into `dest`, carrying its lineage along.
    ///
    /// Used where a value moves without being produced anew: variable
    /// references, attribute selection and list indexing.
    pub fn assign(&mut self, dest: ValueId, src: ValueId) {
        if dest == src {
            return;
        }
        let value = self.mem.value(src).clone();
        self.mem.set(dest, value);
        match self.provenance.get(src) {
            Some(node) => self.provenance.set(dest, node),
            None => self.provenance.remove(dest),
        };
    }

    /// Record that `dest` was computed by `kind` from `operands`.
    ///
    /// A node is only created when at least one operand is tracked; its
    /// dependencies are the tracked operands' nodes in operand order.
    pub fn derive_provenance(
        &mut self,
        dest: ValueId,
        kind: impl Into<Cow<'static, str>>,
        pos: PosIdx,
        operands: &[ValueId],
    ) {
        if self.provenance.is_empty() {
            return;
        }
        let deps: Dependencies = operands
            .iter()
            .filter_map(|&operand| self.provenance.get(operand))
            .collect();
        if deps.is_empty() {
            return;
        }
        let kind = kind.into();
        log::debug!("deriving {} lineage for {:?} from {:?}", kind, dest, deps);
        let node = self.provenance_interner.intern(None, kind, pos, deps);
        self.provenance.set(dest, node);
    }

    /// Merge the lineage sidecars of `left // right` into `merged`.
    ///
    /// Each attribute keeps the annotation of the operand it was taken from.
    pub(crate) fn merge_lineage(&mut self, merged: BindingsId, left: BindingsId, right: BindingsId) {
        let arena = self.mem.bindings();
        if !arena.has_any_tracked_bindings() {
            return;
        }
        let (left_view, right_view) = (arena.get(left), arena.get(right));
        if !left_view.has_lineage() && !right_view.has_lineage() {
            return;
        }

        let annotations: Vec<(Symbol, AttrLineage)> = arena
            .get(merged)
            .iter()
            .filter_map(|attr| {
                let lineage = if right_view.get(attr.name).is_some() {
                    right_view.lineage(attr.name)
                } else {
                    left_view.lineage(attr.name)
                };
                lineage.map(|lineage| (attr.name, lineage))
            })
            .collect();
        let has_annotation =
            |name: &Symbol| annotations.iter().any(|(annotated, _)| annotated == name);
        let mut path: Vec<Symbol> = left_view
            .tracking_path()
            .iter()
            .copied()
            .filter(|name| has_annotation(name))
            .collect();
        for name in right_view.tracking_path() {
            if !path.contains(name) {
                path.push(*name);
            }
        }

        let arena = self.mem.bindings_mut();
        arena.init_lineage(merged);
        for (name, lineage) in annotations {
            arena.set_lineage(merged, name, lineage);
        }
        arena.set_tracking_path(merged, path);
    }

    pub(crate) fn primop(&self, id: PrimOpId) -> &PrimOp {
        &self.primops[id.0 as usize]
    }

    /// Apply `fun` to one more argument, writing the result into `dest`.
    pub fn call_function(
        &mut self,
        fun: ValueId,
        arg: ValueId,
        dest: ValueId,
        pos: PosIdx,
    ) -> EvalResult<()> {
        self.force_value(fun, pos)?;
        let (primop, mut args) = match self.mem.value(fun) {
            Value::PrimOp(primop) => (*primop, Vec::with_capacity(1)),
            Value::PrimOpApp { primop, args } => (*primop, args.to_vec()),
            other => {
                return Err(EvalError::NotAFunction {
                    actual: other.type_name(),
                    pos,
                });
            }
        };
        args.push(arg);

        let (name, arity, fun) = {
            let primop = self.primop(primop);
            (primop.name, primop.args.len(), primop.fun)
        };
        if args.len() < arity {
            self.mem.set(
                dest,
                Value::PrimOpApp {
                    primop,
                    args: args.into(),
                },
            );
            return Ok(());
        }
        log::trace!("calling builtin {}", name);
        fun(self, pos, &args, dest)
    }

    /// Resolve `attr` in the record held by `v`, forcing `v` first.
    pub fn select_attr(&mut self, v: ValueId, attr: Symbol, pos: PosIdx) -> EvalResult<ValueId> {
        self.force_value(v, pos)?;
        let bindings = self.expect_attrs(v, pos)?;
        self.mem
            .bindings()
            .get(bindings)
            .get(attr)
            .map(|attr| attr.value)
            .ok_or_else(|| EvalError::MissingAttribute {
                name: self.symbols.resolve(attr).to_owned(),
                pos,
            })
    }

    pub fn expect_attrs(&self, v: ValueId, pos: PosIdx) -> EvalResult<BindingsId> {
        self.mem.value(v).as_attrs().ok_or_else(|| EvalError::TypeError {
            expected: "set",
            actual: self.mem.value(v).type_name(),
            pos,
        })
    }

    pub fn expect_list(&self, v: ValueId, pos: PosIdx) -> EvalResult<Rc<[ValueId]>> {
        self.mem.list_items(v).ok_or_else(|| EvalError::TypeError {
            expected: "list",
            actual: self.mem.value(v).type_name(),
            pos,
        })
    }

    pub fn expect_int(&self, v: ValueId, pos: PosIdx) -> EvalResult<i64> {
        self.mem.value(v).as_int().ok_or_else(|| EvalError::TypeError {
            expected: "int",
            actual: self.mem.value(v).type_name(),
            pos,
        })
    }

    pub fn expect_string(&self, v: ValueId, pos: PosIdx) -> EvalResult<Rc<str>> {
        match self.mem.value(v) {
            Value::String(text) => Ok(text.clone()),
            other => Err(EvalError::TypeError {
                expected: "string",
                actual: other.type_name(),
                pos,
            }),
        }
    }

    pub fn stats(&self) -> EvalStats {
        EvalStats {
            nr_thunks_forced: self.nr_thunks_forced,
            nr_provenance_nodes: self.provenance_interner.len() as u64,
            nr_tracked_values: self.provenance.len() as u64,
            ..self.mem.stats()
        }
    }

    /// Deeply force `v` and convert it to JSON.
    ///
    /// Self-referencing values nest without bound and fail once the nesting
    /// passes the configured maximum call depth.
    pub fn to_json(&mut self, v: ValueId) -> EvalResult<serde_json::Value> {
        self.force_value_deep(v)?;
        self.value_to_json(v, 0)
    }

    fn value_to_json(&self, v: ValueId, depth: u32) -> EvalResult<serde_json::Value> {
        use serde_json::Value as Json;
        if depth >= self.settings.max_call_depth {
            return Err(EvalError::MaxCallDepthExceeded {
                max: self.settings.max_call_depth,
                pos: PosIdx::NONE,
            });
        }
        let json = match self.mem.value(v) {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(text) => Json::String(text.to_string()),
            Value::Attrs(bindings) => {
                let mut object = serde_json::Map::new();
                for attr in self.mem.bindings().get(*bindings).iter() {
                    object.insert(
                        self.symbols.resolve(attr.name).to_owned(),
                        self.value_to_json(attr.value, depth + 1)?,
                    );
                }
                Json::Object(object)
            }
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .map(|item| self.value_to_json(*item, depth + 1))
                    .collect::<EvalResult<_>>()?,
            ),
            Value::PrimOp(_) | Value::PrimOpApp { .. } => Json::String("<PRIMOP>".to_owned()),
            Value::Thunk(_) | Value::Blackhole => Json::String("<CODE>".to_owned()),
        };
        Ok(json)
    }
}

impl Default for EvalState {
    fn default() -> Self {
        Self::new(EvalSettings::default())
    }
}

//! Built-in functions reachable as `builtins.<name>`.

use crate::error::{EvalError, EvalResult};
use crate::position::PosIdx;
use crate::settings::ExperimentalFeature;
use crate::state::EvalState;
use crate::value::{Value, ValueId};

mod provenance;

/// Signature shared by all built-ins: arguments are value slots, the result is
/// written into `dest`.
pub type PrimOpFn = fn(&mut EvalState, PosIdx, &[ValueId], ValueId) -> EvalResult<()>;

#[derive(Clone)]
pub struct PrimOp {
    pub name: &'static str,
    /// Parameter names; their count is the arity.
    pub args: &'static [&'static str],
    pub doc: &'static str,
    pub fun: PrimOpFn,
    /// Only registered when this feature is enabled.
    pub experimental_feature: Option<ExperimentalFeature>,
}

impl std::fmt::Debug for PrimOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimOp")
            .field("name", &self.name)
            .field("arity", &self.args.len())
            .finish()
    }
}

/// Every built-in the runtime knows, gated ones included.
pub fn registered() -> Vec<PrimOp> {
    let mut primops = vec![
        PrimOp {
            name: "typeOf",
            args: &["e"],
            doc: "Return the type of *e* as a string: `int`, `set`, `list`, ...",
            fun: function_type_of,
            experimental_feature: None,
        },
        PrimOp {
            name: "length",
            args: &["list"],
            doc: "Return the number of elements of *list*.",
            fun: function_length,
            experimental_feature: None,
        },
        PrimOp {
            name: "attrNames",
            args: &["set"],
            doc: "Return the names of the attributes of *set*, sorted alphabetically.",
            fun: function_attr_names,
            experimental_feature: None,
        },
        PrimOp {
            name: "elemAt",
            args: &["list", "n"],
            doc: "Return element *n* of *list*, counting from zero.",
            fun: function_elem_at,
            experimental_feature: None,
        },
    ];
    primops.extend(provenance::primops());
    primops
}

fn function_type_of(
    state: &mut EvalState,
    pos: PosIdx,
    args: &[ValueId],
    dest: ValueId,
) -> EvalResult<()> {
    state.force_value(args[0], pos)?;
    let name = state.value(args[0]).type_name();
    state.mem.set(dest, Value::string(name));
    Ok(())
}

fn function_length(
    state: &mut EvalState,
    pos: PosIdx,
    args: &[ValueId],
    dest: ValueId,
) -> EvalResult<()> {
    state.force_value(args[0], pos)?;
    let items = state.expect_list(args[0], pos)?;
    state.mem.set(dest, Value::Int(items.len() as i64));
    Ok(())
}

fn function_attr_names(
    state: &mut EvalState,
    pos: PosIdx,
    args: &[ValueId],
    dest: ValueId,
) -> EvalResult<()> {
    state.force_value(args[0], pos)?;
    let bindings = state.expect_attrs(args[0], pos)?;
    let mut names: Vec<String> = state
        .mem
        .bindings()
        .get(bindings)
        .iter()
        .map(|attr| state.symbols.resolve(attr.name).to_owned())
        .collect();
    names.sort();
    let items = names
        .iter()
        .map(|name| state.mem.alloc_value(Value::string(name)))
        .collect();
    let list = state.mem.make_list(items);
    state.mem.set(dest, list);
    Ok(())
}

fn function_elem_at(
    state: &mut EvalState,
    pos: PosIdx,
    args: &[ValueId],
    dest: ValueId,
) -> EvalResult<()> {
    state.force_value(args[0], pos)?;
    let items = state.expect_list(args[0], pos)?;
    state.force_value(args[1], pos)?;
    let index = state.expect_int(args[1], pos)?;
    let item = usize::try_from(index)
        .ok()
        .and_then(|index| items.get(index).copied())
        .ok_or(EvalError::IndexOutOfBounds {
            index,
            len: items.len(),
            pos,
        })?;
    state.force_value(item, pos)?;
    state.assign(dest, item);
    Ok(())
}

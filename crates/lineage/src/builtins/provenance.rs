//! `trackProvenance`, `getProvenance` and `removeProvenance`.

use super::PrimOp;
use crate::bindings::{AttrLineage, BindingsId};
use crate::error::EvalResult;
use crate::position::PosIdx;
use crate::provenance::{ProvId, kind};
use crate::settings::ExperimentalFeature;
use crate::state::EvalState;
use crate::symbol::Symbol;
use crate::value::{Value, ValueId};

pub(super) fn primops() -> [PrimOp; 3] {
    [
        PrimOp {
            name: "trackProvenance",
            args: &["identifier", "value"],
            doc: r#"
                Attach lineage to a copy of *value*, labelled with *identifier*
                (any value).

                Records and lists are tracked per attribute and per element,
                all with the same identifier. Their children are forced while
                tracking. If the value already carries lineage, the new node
                depends on the old one, forming a chain.

                ```
                let a = builtins.trackProvenance "answer" 42;
                in builtins.getProvenance a
                ```
            "#,
            fun: function_track_provenance,
            experimental_feature: Some(ExperimentalFeature::ProvenanceTracking),
        },
        PrimOp {
            name: "getProvenance",
            args: &["value"],
            doc: r#"
                Return the lineage of *value* as
                `{ identifier, kind, value, provenance, dependencies }`,
                or `null` when it carries none.
            "#,
            fun: function_get_provenance,
            experimental_feature: Some(ExperimentalFeature::ProvenanceTracking),
        },
        PrimOp {
            name: "removeProvenance",
            args: &["value"],
            doc: r#"
                Return a copy of *value* without lineage. Only the top level is
                stripped: attributes and elements keep theirs.
            "#,
            fun: function_remove_provenance,
            experimental_feature: Some(ExperimentalFeature::ProvenanceTracking),
        },
    ]
}

fn function_track_provenance(
    state: &mut EvalState,
    pos: PosIdx,
    args: &[ValueId],
    dest: ValueId,
) -> EvalResult<()> {
    let (identifier, value) = (args[0], args[1]);

    let source_pos = state.get_value_source_pos(value);
    // Forcing happens in place, so lineage a thunk produces lands on `value`
    state.force_value(value, pos)?;
    let existing = state.get_provenance(value);
    let source_pos = source_pos
        .or(state.get_value_source_pos(value))
        .or(pos);

    match state.value(value).clone() {
        Value::Attrs(bindings) => track_attrs(state, identifier, bindings, pos, dest),
        Value::List(items) => {
            let mut copies = Vec::with_capacity(items.len());
            for &item in items.iter() {
                let item_pos = state.get_value_source_pos(item);
                state.force_value(item, pos)?;
                let item_pos = item_pos.or(state.get_value_source_pos(item)).or(pos);
                let copy = state.value(item).clone();
                let copy = state.mem.alloc_value(copy);
                let existing = state.get_provenance(item);
                intern_definition(state, identifier, existing, item_pos, copy);
                copies.push(copy);
            }
            log::debug!("tracked {} list elements into {:?}", copies.len(), dest);
            let list = state.mem.make_list(copies);
            state.mem.set(dest, list);
            Ok(())
        }
        scalar => {
            state.mem.set(dest, scalar);
            let node = intern_definition(state, identifier, existing, source_pos, dest);
            log::debug!("tracked {:?} as {:?}", dest, node);
            Ok(())
        }
    }
}

fn track_attrs(
    state: &mut EvalState,
    identifier: ValueId,
    bindings: BindingsId,
    pos: PosIdx,
    dest: ValueId,
) -> EvalResult<()> {
    let (record_pos, attrs) = {
        let view = state.mem.bindings().get(bindings);
        (view.pos(), view.attrs().to_vec())
    };

    let mut builder = state.mem.build_bindings(attrs.len())?;
    let mut annotations: Vec<(Symbol, AttrLineage)> = Vec::with_capacity(attrs.len());
    for attr in &attrs {
        state.force_value(attr.value, pos)?;
        let attr_pos = attr
            .pos
            .or(state.get_value_source_pos(attr.value))
            .or(pos);
        let copy = builder.push(&mut state.mem, attr.name, attr.pos);
        let value = state.value(attr.value).clone();
        state.mem.set(copy, value);
        let existing = state.get_provenance(attr.value);
        let node = intern_definition(state, identifier, existing, attr_pos, copy);
        annotations.push((attr.name, AttrLineage { node, pos: attr_pos }));
    }
    let tracked = builder.finish(&mut state.mem);

    let arena = state.mem.bindings_mut();
    arena.set_pos(tracked, record_pos);
    arena.init_lineage(tracked);
    let path = annotations.iter().map(|(name, _)| *name).collect();
    for (name, lineage) in annotations {
        arena.set_lineage(tracked, name, lineage);
    }
    arena.set_tracking_path(tracked, path);

    log::debug!("tracked {} attributes into {:?}", attrs.len(), dest);
    state.mem.set(dest, Value::Attrs(tracked));
    Ok(())
}

/// Intern a `definition` node for `copy`, chained on `existing` when the
/// original value already had lineage.
fn intern_definition(
    state: &mut EvalState,
    identifier: ValueId,
    existing: Option<ProvId>,
    pos: PosIdx,
    copy: ValueId,
) -> ProvId {
    let node = state
        .provenance_interner
        .intern(Some(identifier), kind::DEFINITION, pos, existing);
    state.set_provenance(copy, node);
    node
}

fn function_get_provenance(
    state: &mut EvalState,
    pos: PosIdx,
    args: &[ValueId],
    dest: ValueId,
) -> EvalResult<()> {
    state.force_value(args[0], pos)?;
    let rendered = match state.get_provenance(args[0]) {
        Some(node) => render_provenance(state, node, Some(args[0]))?,
        None => Value::Null,
    };
    state.mem.set(dest, rendered);
    Ok(())
}

/// Render a node and its dependencies as language records.
///
/// `tracked` is the value the outermost node belongs to; dependency records
/// render `value = null` since their values are not known any more.
fn render_provenance(
    state: &mut EvalState,
    node: ProvId,
    tracked: Option<ValueId>,
) -> EvalResult<Value> {
    let node = state.provenance_interner[node].clone();
    let s = state.s;

    let mut builder = state.mem.build_bindings(5)?;

    let identifier = builder.push(&mut state.mem, s.identifier, PosIdx::NONE);
    if let Some(source) = node.identifier {
        copy_value(state, identifier, source);
    }

    let kind = builder.push(&mut state.mem, s.kind, PosIdx::NONE);
    state.mem.set(kind, Value::string(&node.kind));

    let value = builder.push(&mut state.mem, s.value, PosIdx::NONE);
    if let Some(source) = tracked {
        copy_value(state, value, source);
    }

    let provenance = builder.push(&mut state.mem, s.provenance, PosIdx::NONE);
    let rendered_pos = render_pos(state, node.pos)?;
    state.mem.set(provenance, rendered_pos);

    let dependencies = builder.push(&mut state.mem, s.dependencies, PosIdx::NONE);
    let mut items = Vec::with_capacity(node.deps.len());
    for &dep in &node.deps {
        let rendered = render_provenance(state, dep, None)?;
        items.push(state.mem.alloc_value(rendered));
    }
    let list = state.mem.make_list(items);
    state.mem.set(dependencies, list);

    Ok(Value::Attrs(builder.finish(&mut state.mem)))
}

/// Plain copy of the value only. Lineage stays with the source slot.
fn copy_value(state: &mut EvalState, dest: ValueId, source: ValueId) {
    let value = state.value(source).clone();
    state.mem.set(dest, value);
}

fn render_pos(state: &mut EvalState, pos: PosIdx) -> EvalResult<Value> {
    let Some(resolved) = state.positions.get(pos) else {
        return Ok(Value::Null);
    };
    let file = resolved.origin.display_name();
    let s = state.s;

    let mut builder = state
        .mem
        .build_bindings(if file.is_some() { 3 } else { 2 })?;
    if let Some(file) = file {
        let slot = builder.push(&mut state.mem, s.file, PosIdx::NONE);
        state.mem.set(slot, Value::string(&file));
    }
    let line = builder.push(&mut state.mem, s.line, PosIdx::NONE);
    state.mem.set(line, Value::Int(resolved.line.into()));
    let column = builder.push(&mut state.mem, s.column, PosIdx::NONE);
    state.mem.set(column, Value::Int(resolved.column.into()));

    Ok(Value::Attrs(builder.finish(&mut state.mem)))
}

fn function_remove_provenance(
    state: &mut EvalState,
    pos: PosIdx,
    args: &[ValueId],
    dest: ValueId,
) -> EvalResult<()> {
    state.force_value(args[0], pos)?;
    copy_value(state, dest, args[0]);
    state.remove_provenance(dest);
    Ok(())
}

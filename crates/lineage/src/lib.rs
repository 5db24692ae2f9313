//! A small lazy expression runtime that records data lineage.
//!
//! Values can be labelled with `builtins.trackProvenance`; operations on
//! labelled values derive new lineage nodes automatically, and
//! `builtins.getProvenance` renders the resulting graph back into the
//! language as records and lists.

pub mod association;
pub mod bindings;
pub mod builder;
pub mod builtins;
pub mod error;
mod eval;
pub mod expr;
pub mod memory;
pub mod parser;
pub mod position;
pub mod provenance;
pub mod settings;
pub mod state;
pub mod symbol;
pub mod value;

pub use bindings::{AttrLineage, Bindings, BindingsArena, BindingsId};
pub use builder::BindingsBuilder;
pub use error::{Diagnostic, Error, EvalError, EvalResult};
pub use memory::{EvalMemory, EvalStats};
pub use position::{Origin, PosIdx, PosTable};
pub use provenance::{ProvId, Provenance, ProvenanceInterner};
pub use settings::{EvalSettings, ExperimentalFeature};
pub use state::EvalState;
pub use value::{Value, ValueId};

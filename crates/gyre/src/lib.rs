mod analysis;
mod compiler;
mod emitter;
mod error;
mod flow;
mod mangle;
pub mod netlist;
pub mod passes;
mod scheduler;

pub(crate) use fxhash::FxHashMap as HashMap;
pub(crate) use fxhash::FxHashSet as HashSet;

pub use analysis::{ModuleAnalysis, analyze_design, analyze_module};
pub use compiler::{Compiler, Options, Output, DEFAULT_OPT_LEVEL};
pub use error::CompileError;
pub use flow::{FlowGraph, FlowNode, NodeId};
pub use malachite_bigint::BigUint;
pub use mangle::{
    mangle_cell_name, mangle_memory_name, mangle_module_name, mangle_name, mangle_wire_name,
};
pub use scheduler::Scheduler;

//! The pipeline driver: option handling, preparatory passes, per-module
//! analysis, and emission in design-level topological order.

use crate::analysis::analyze_design;
use crate::emitter;
use crate::error::CompileError;
use crate::netlist::cells::is_internal_cell;
use crate::netlist::{Design, ModuleId, Selection};
use crate::passes;
use crate::HashSet;
use std::collections::BTreeSet;

pub const DEFAULT_OPT_LEVEL: u32 = 5;

/// Code generation options. The optimization level maps monotonically
/// onto the elision/localization flags; higher levels only add flags.
#[derive(Debug, Clone)]
pub struct Options {
    /// Namespace the generated code lives in.
    pub namespace: String,
    /// Emit a separate interface alongside the implementation.
    pub split_interface: bool,
    /// Path the implementation uses to include the interface; required
    /// when `split_interface` is set.
    pub interface_filename: Option<String>,
    pub elide_internal: bool,
    pub elide_public: bool,
    pub localize_internal: bool,
    pub localize_public: bool,
    pub run_splitnets: bool,
}

impl Options {
    pub fn with_opt_level(level: u32) -> Result<Self, CompileError> {
        if level > 5 {
            return Err(CompileError::InvalidOptLevel(level));
        }
        Ok(Options {
            namespace: "gyre_design".into(),
            split_interface: false,
            interface_filename: None,
            elide_internal: level >= 1,
            localize_internal: level >= 2,
            elide_public: level >= 3,
            localize_public: level >= 4,
            run_splitnets: level >= 5,
        })
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::with_opt_level(DEFAULT_OPT_LEVEL).unwrap()
    }
}

/// The complete emitted simulator source. Callers own writing it out;
/// compilation never touches the filesystem, so an error can't leave a
/// truncated file behind.
#[derive(Debug, Clone)]
pub struct Output {
    pub implementation: String,
    pub interface: Option<String>,
}

pub struct Compiler {
    options: Options,
}

impl Compiler {
    pub fn new(options: Options) -> Self {
        Compiler { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Runs the preparatory passes, analyzes every selected module, and
    /// emits the simulator source.
    pub fn compile(&self, design: &mut Design) -> Result<Output, CompileError> {
        if self.options.split_interface && self.options.interface_filename.is_none() {
            return Err(CompileError::MissingInterfaceName);
        }
        prepare_design(design, self.options.run_splitnets)?;
        let analyses = analyze_design(design, &self.options)?;
        emitter::emit_design(design, &analyses, &self.options)
    }
}

/// Brings the netlist into the normal form the analysis expects:
/// init-type sync rules folded into init attributes and packed memories
/// unpacked, plus the per-driver net split at the highest level.
fn prepare_design(design: &mut Design, run_splitnets: bool) -> Result<(), CompileError> {
    let (has_sync_init, has_packed_mem) = passes::check_design(design)?;
    if has_sync_init {
        // proc_init is what matters; it expects pruned and cleaned
        // processes, so run those first in case the front-end didn't.
        passes::proc_prune(design);
        passes::proc_clean(design);
        passes::proc_init(design);
    }
    if has_packed_mem {
        passes::memory_unpack(design);
    }
    if has_sync_init || has_packed_mem {
        let (has_sync_init, has_packed_mem) = passes::check_design(design)?;
        assert!(
            !has_sync_init && !has_packed_mem,
            "pre-passes failed to normalize the design"
        );
    }
    if run_splitnets {
        passes::splitnets_driver(design);
        passes::opt_clean_purge(design);
    }
    Ok(())
}

/// Topological order over module instantiation: a module appears only
/// after every module it instantiates. Ready modules are taken in
/// design order, keeping the output stable across runs.
pub(crate) fn topo_sort_modules(design: &Design) -> Result<Vec<ModuleId>, CompileError> {
    let included: HashSet<ModuleId> = design
        .modules()
        .filter(|(_, m)| !m.blackbox && m.selection == Selection::Full)
        .map(|(id, _)| id)
        .collect();

    let mut children: std::collections::BTreeMap<ModuleId, BTreeSet<ModuleId>> =
        Default::default();
    for (module_id, module) in design.modules() {
        if !included.contains(&module_id) {
            continue;
        }
        let deps = children.entry(module_id).or_default();
        for (_, cell) in module.cells() {
            if is_internal_cell(&cell.ty) {
                continue;
            }
            let child = design
                .module_by_name(&cell.ty)
                .expect("user cell instantiates a module absent from the design");
            if included.contains(&child) && child != module_id {
                deps.insert(child);
            }
        }
    }

    let mut order = Vec::with_capacity(included.len());
    let mut placed: HashSet<ModuleId> = HashSet::default();
    while order.len() < children.len() {
        let mut advanced = false;
        for (&module_id, deps) in &children {
            if placed.contains(&module_id) {
                continue;
            }
            if deps.iter().all(|d| placed.contains(d)) {
                order.push(module_id);
                placed.insert(module_id);
                advanced = true;
            }
        }
        if !advanced {
            let stuck = children
                .keys()
                .find(|id| !placed.contains(id))
                .expect("no unplaced module in a stuck topological sort");
            return Err(CompileError::RecursiveInstantiation(
                design.module(*stuck).name.clone(),
            ));
        }
    }
    Ok(order)
}

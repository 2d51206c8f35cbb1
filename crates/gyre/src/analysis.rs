//! Per-module netlist analysis: edge-signal registration, memory port
//! planning, scheduling, and the elision/localization decisions the
//! emitter consumes.

use crate::compiler::Options;
use crate::error::CompileError;
use crate::flow::{FlowGraph, NodeId};
use crate::netlist::cells::is_internal_cell;
use crate::netlist::{CellId, Design, ModuleId, SigBit, SigMap, SigSpec, SyncType, WireId};
use crate::scheduler::Scheduler;
use crate::{HashMap, HashSet};
use std::collections::{BTreeMap, BTreeSet};

/// Everything the emitter needs to know about one module, produced by a
/// single code-generation invocation and released with it.
#[derive(Debug, Default)]
pub struct ModuleAnalysis {
    pub flow: FlowGraph,
    /// Flow nodes in evaluation order.
    pub schedule: Vec<NodeId>,
    /// Wires replaced by inlining their defining expression at the
    /// single use site, keyed to the defining node.
    pub elided_wires: HashMap<WireId, NodeId>,
    /// Stateful wires demoted to eval-local temporaries.
    pub localized_wires: HashSet<WireId>,
    /// Wires whose def node is scheduled after one of their use nodes.
    pub feedback_wires: BTreeSet<WireId>,
    /// Wires carrying at least one edge-sensitive bit.
    pub sync_wires: HashSet<WireId>,
    /// Consolidated edge kind per wire bit.
    pub sync_types: BTreeMap<SigBit, SyncType>,
    pub writable_memories: HashSet<crate::netlist::MemoryId>,
    /// For each transparent read port, the write ports in its domain
    /// whose same-cycle writes it must observe.
    pub transparent_for: HashMap<CellId, BTreeSet<CellId>>,
    /// For each user cell, which output port defines a given elided
    /// wire, so inlining can read `cell.<port>.curr`.
    pub cell_wire_defs: HashMap<CellId, HashMap<WireId, String>>,
    pub sigmap: SigMap,
}

impl ModuleAnalysis {
    /// Records that `signal` needs edge detection of the given kind.
    /// Conflicting kinds on the same bit consolidate to `BothEdges`.
    ///
    /// The commit phase works at wire granularity but edge-type sync
    /// rules at wire bit granularity (`always @(posedge clocks[0])` is
    /// legal), so sensitivity is tracked for both the bit and its wire.
    pub fn register_edge_signal(&mut self, signal: &SigSpec, kind: SyncType) {
        assert!(kind.is_edge());
        let signal = self.sigmap.map(signal);
        let bit = signal
            .as_bit()
            .expect("edge-sensitive signal must be a single wire bit");
        let existing = self.sync_types.entry(bit).or_insert(kind);
        if *existing != kind {
            *existing = SyncType::BothEdges;
        }
        self.sync_wires.insert(bit.wire);
    }

    /// Sync bits belonging to `wire`, in offset order.
    pub fn sync_bits_of(&self, wire: WireId) -> impl Iterator<Item = (SigBit, SyncType)> + '_ {
        self.sync_types
            .range(SigBit { wire, offset: 0 }..=SigBit { wire, offset: usize::MAX })
            .map(|(bit, kind)| (*bit, *kind))
    }
}

pub fn analyze_module(
    design: &Design,
    module_id: ModuleId,
    options: &Options,
) -> Result<ModuleAnalysis, CompileError> {
    let module = design.module(module_id);
    let mut analysis = ModuleAnalysis { sigmap: SigMap::build(module), ..Default::default() };

    for (lhs, rhs) in &module.connections {
        analysis.flow.add_connect(module, lhs.clone(), rhs.clone());
    }

    let mut mem_port_nodes: HashMap<CellId, NodeId> = HashMap::default();
    let mut memwr_per_domain: BTreeMap<(SigBit, crate::netlist::MemoryId), BTreeSet<CellId>> =
        BTreeMap::new();
    for (cell_id, cell) in module.cells() {
        if cell.ty == "$mem" {
            return Err(CompileError::PackedMemorySurvived(cell.name.clone()));
        }
        if is_internal_cell(&cell.ty) && !design.cell_known(cell) {
            return Err(CompileError::UnsupportedCell(cell.ty.clone()));
        }
        if cell.ty == "$meminit" {
            // Folded into the memory initializer; not a flow node.
            continue;
        }
        let node = analysis.flow.add_cell(design, module, cell_id);

        // FF cells behave like posedge/negedge processes. ($adff and
        // $dffsr stay level-sensitive on their reset inputs; only the
        // clock is an edge signal.)
        if matches!(cell.ty.as_str(), "$dff" | "$dffe" | "$adff" | "$dffsr") {
            if let Some(clk) = cell.port("CLK")
                && clk.as_bit().is_some()
            {
                let kind = if cell.param_bool("CLK_POLARITY") {
                    SyncType::Posedge
                } else {
                    SyncType::Negedge
                };
                analysis.register_edge_signal(clk, kind);
            }
        }
        if matches!(cell.ty.as_str(), "$memrd" | "$memwr") {
            let memory = module
                .memory_by_name(&cell.param_str("MEMID"))
                .expect("memory port references unknown memory");
            if cell.param_bool("CLK_ENABLE")
                && let Some(clk) = cell.port("CLK")
                && clk.as_bit().is_some()
            {
                let kind = if cell.param_bool("CLK_POLARITY") {
                    SyncType::Posedge
                } else {
                    SyncType::Negedge
                };
                analysis.register_edge_signal(clk, kind);
                if cell.ty == "$memwr" {
                    let clk_bit = analysis.sigmap.map(clk).as_bit().unwrap();
                    memwr_per_domain.entry((clk_bit, memory)).or_default().insert(cell_id);
                }
            }
            if cell.ty == "$memwr" {
                analysis.writable_memories.insert(memory);
            }
            mem_port_nodes.insert(cell_id, node);
        }
    }

    // Transparent read ports observe every write port in their domain;
    // that dependency is invisible in the netlist, so the EN/ADDR/DATA
    // of those write ports become explicit uses of the read node.
    for (cell_id, cell) in module.cells() {
        if cell.ty == "$memrd"
            && cell.param_bool("CLK_ENABLE")
            && cell.param_bool("TRANSPARENT")
            && let Some(clk) = cell.port("CLK")
            && clk.as_bit().is_some()
        {
            let clk_bit = analysis.sigmap.map(clk).as_bit().unwrap();
            let memory = module.memory_by_name(&cell.param_str("MEMID")).unwrap();
            if let Some(group) = memwr_per_domain.get(&(clk_bit, memory)) {
                let node = mem_port_nodes[&cell_id];
                for &memwr_id in group {
                    let memwr = module.cell(memwr_id);
                    for port in ["EN", "ADDR", "DATA"] {
                        if let Some(sig) = memwr.port(port) {
                            analysis.flow.add_uses(node, sig);
                        }
                    }
                }
                analysis.transparent_for.insert(cell_id, group.clone());
            }
        }
    }

    for (process_id, process) in module.processes() {
        analysis.flow.add_process(module, process_id);
        for sync in &process.syncs {
            match sync.kind {
                SyncType::Posedge | SyncType::Negedge | SyncType::BothEdges => {
                    analysis.register_edge_signal(&sync.signal, sync.kind);
                }
                SyncType::Level0 | SyncType::Level1 | SyncType::LevelAsync => {}
                SyncType::Init => {
                    return Err(CompileError::InitSyncSurvived(process.name.clone()));
                }
                SyncType::Global => {
                    return Err(CompileError::GlobalClock(process.name.clone()));
                }
            }
        }
    }

    for (wire_id, wire) in module.wires() {
        if !analysis.flow.is_elidable(wire_id) {
            continue;
        }
        if wire.port_id != 0 || wire.has_keep() {
            continue;
        }
        if wire.is_internal() && !options.elide_internal {
            continue;
        }
        if wire.is_public() && !options.elide_public {
            continue;
        }
        if analysis.sync_wires.contains(&wire_id) {
            continue;
        }
        let defs = &analysis.flow.wire_defs[&wire_id];
        assert_eq!(defs.len(), 1, "elidable wire with multiple defs");
        analysis.elided_wires.insert(wire_id, *defs.iter().next().unwrap());
    }

    // Elided outputs of internal cells are always on the well-known Y
    // port; user cells can have several, so remember which output port
    // defines which wire.
    for (cell_id, cell) in module.cells() {
        for (port, sig) in &cell.connections {
            if design.cell_output(cell, port)
                && let Some(wire) = sig.as_wire(module)
                && analysis.elided_wires.contains_key(&wire)
            {
                analysis
                    .cell_wire_defs
                    .entry(cell_id)
                    .or_default()
                    .insert(wire, port.clone());
            }
        }
    }

    let node_defs = analysis.flow.node_defs();

    let mut scheduler = Scheduler::new();
    let mut node_to_vertex: Vec<usize> = Vec::with_capacity(analysis.flow.node_count());
    let mut vertex_to_node: HashMap<usize, NodeId> = HashMap::default();
    for (node, _) in analysis.flow.nodes() {
        let vertex = scheduler.add_vertex();
        node_to_vertex.push(vertex);
        vertex_to_node.insert(vertex, node);
    }
    for (node, _) in analysis.flow.nodes() {
        if let Some(defs) = node_defs.get(&node) {
            for wire in defs {
                if let Some(users) = analysis.flow.wire_uses.get(wire) {
                    for succ in users {
                        scheduler.add_edge(node_to_vertex[node.0], node_to_vertex[succ.0]);
                    }
                }
            }
        }
    }

    let mut evaluated: HashSet<NodeId> = HashSet::default();
    for vertex in scheduler.schedule() {
        let node = vertex_to_node[&vertex];
        analysis.schedule.push(node);
        evaluated.insert(node);
        // A wire defined by a node scheduled after one of its users is
        // a feedback wire: usually a benign artifact of wire-level
        // (not bit-level) dependency tracking, but it needs state to
        // carry the value across delta cycles, so it can be neither
        // elided nor localized.
        if let Some(defs) = node_defs.get(&node) {
            for wire in defs {
                if let Some(users) = analysis.flow.wire_uses.get(wire) {
                    for succ in users {
                        if evaluated.contains(succ) {
                            analysis.feedback_wires.insert(*wire);
                            analysis.elided_wires.remove(wire);
                        }
                    }
                }
            }
        }
    }

    if !analysis.feedback_wires.is_empty() {
        log::warn!("module `{}` contains feedback arcs through wires:", module.name);
        for wire in &analysis.feedback_wires {
            log::warn!("  {}", module.wire(*wire).name);
        }
    }

    for (wire_id, wire) in module.wires() {
        // Elided wires are already gone; feedback wires need state.
        if analysis.elided_wires.contains_key(&wire_id)
            || analysis.feedback_wires.contains(&wire_id)
        {
            continue;
        }
        if wire.port_id != 0 || wire.has_keep() {
            continue;
        }
        if wire.is_internal() && !options.localize_internal {
            continue;
        }
        if wire.is_public() && !options.localize_public {
            continue;
        }
        if analysis.sync_wires.contains(&wire_id) {
            continue;
        }
        // FF outputs, clocked read data and sync action targets have no
        // flow defs at all; they hold state and stay as wires.
        if analysis.flow.wire_defs.get(&wire_id).map_or(0, |d| d.len()) != 1 {
            continue;
        }
        analysis.localized_wires.insert(wire_id);
    }

    log::debug!(
        "module `{}`: {} nodes scheduled, {} elided, {} localized, {} feedback",
        module.name,
        analysis.schedule.len(),
        analysis.elided_wires.len(),
        analysis.localized_wires.len(),
        analysis.feedback_wires.len()
    );

    Ok(analysis)
}

/// Analyzes every fully selected, non-blackbox module.
pub fn analyze_design(
    design: &Design,
    options: &Options,
) -> Result<HashMap<ModuleId, ModuleAnalysis>, CompileError> {
    let mut analyses = HashMap::default();
    let mut has_feedback = false;
    for (module_id, module) in design.modules() {
        if module.blackbox || module.selection != crate::netlist::Selection::Full {
            continue;
        }
        let analysis = analyze_module(design, module_id, options)?;
        has_feedback |= !analysis.feedback_wires.is_empty();
        analyses.insert(module_id, analysis);
    }
    if has_feedback {
        log::warn!("feedback arcs require delta cycles during evaluation");
    }
    Ok(analyses)
}

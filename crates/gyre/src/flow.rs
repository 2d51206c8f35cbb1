//! Def/use flow graph over the computational nodes of one module.
//!
//! Edges run from every node defining a wire to every node using it.
//! Outputs whose updates are deferred to a clock edge (sync flip-flop Q,
//! clocked memory read DATA, edge-sync process actions) do not count as
//! defs; scheduling them as combinational drivers would manufacture
//! spurious cycles.

use crate::HashMap;
use crate::netlist::cells::{is_elidable_cell, is_internal_cell, is_sync_ff_cell};
use crate::netlist::{CellId, Design, Module, ProcessId, SigSpec, WireId};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone)]
pub enum FlowNode {
    Connect { lhs: SigSpec, rhs: SigSpec },
    Cell(CellId),
    Process(ProcessId),
}

#[derive(Debug, Default)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
    pub wire_defs: HashMap<WireId, BTreeSet<NodeId>>,
    pub wire_uses: HashMap<WireId, BTreeSet<NodeId>>,
    wire_def_elidable: HashMap<WireId, bool>,
    /// First node seen using the wire, and whether it is still the only
    /// one. Elision requires a single use node (which may use other
    /// wires as well).
    wire_use_node: HashMap<WireId, (NodeId, bool)>,
}

impl FlowGraph {
    pub fn new() -> Self {
        FlowGraph::default()
    }

    pub fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &FlowNode)> {
        self.nodes.iter().enumerate().map(|(n, node)| (NodeId(n), node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn add_defs(&mut self, module: &Module, node: NodeId, sig: &SigSpec, elidable: bool) {
        for chunk in sig.chunks() {
            if let crate::netlist::SigChunk::Wire { wire, .. } = chunk {
                self.wire_defs.entry(*wire).or_default().insert(node);
            }
        }
        // Only a def of the entire wire, in bit order, can be elided.
        if let Some(wire) = sig.as_wire(module) {
            self.wire_def_elidable.insert(wire, elidable);
        }
    }

    pub fn add_uses(&mut self, node: NodeId, sig: &SigSpec) {
        for chunk in sig.chunks() {
            if let crate::netlist::SigChunk::Wire { wire, .. } = chunk {
                self.wire_uses.entry(*wire).or_default().insert(node);
                let (first, single) = self.wire_use_node.entry(*wire).or_insert((node, true));
                if *first != node {
                    *single = false;
                }
            }
        }
    }

    pub fn is_elidable(&self, wire: WireId) -> bool {
        self.wire_def_elidable.get(&wire).copied().unwrap_or(false)
            && self.wire_use_node.get(&wire).is_some_and(|(_, single)| *single)
    }

    pub fn add_connect(&mut self, module: &Module, lhs: SigSpec, rhs: SigSpec) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(FlowNode::Connect { lhs: lhs.clone(), rhs: rhs.clone() });
        self.add_defs(module, node, &lhs, true);
        self.add_uses(node, &rhs);
        node
    }

    pub fn add_cell(&mut self, design: &Design, module: &Module, id: CellId) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(FlowNode::Cell(id));
        let cell = module.cell(id);
        debug_assert!(design.cell_known(cell));
        for (port, sig) in &cell.connections {
            if design.cell_output(cell, port) {
                if is_sync_ff_cell(&cell.ty)
                    || (cell.ty == "$memrd" && cell.param_bool("CLK_ENABLE"))
                {
                    // Edge-deferred outputs introduce no defs.
                } else if is_elidable_cell(&cell.ty) {
                    self.add_defs(module, node, sig, true);
                } else if is_internal_cell(&cell.ty) {
                    self.add_defs(module, node, sig, false);
                } else {
                    // User cell outputs are plain wires read back out of
                    // the instance, so the connected wire can be elided.
                    self.add_defs(module, node, sig, true);
                }
            }
            if design.cell_input(cell, port) {
                self.add_uses(node, sig);
            }
        }
        node
    }

    pub fn add_process(&mut self, module: &Module, id: ProcessId) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(FlowNode::Process(id));
        let process = module.process(id);
        self.add_case(module, node, &process.root_case);
        for sync in &process.syncs {
            for (lhs, rhs) in &sync.actions {
                if !sync.kind.is_edge() {
                    self.add_defs(module, node, lhs, false);
                }
                self.add_uses(node, rhs);
            }
        }
        node
    }

    fn add_case(&mut self, module: &Module, node: NodeId, case: &crate::netlist::CaseRule) {
        for (lhs, rhs) in &case.actions {
            self.add_defs(module, node, lhs, false);
            self.add_uses(node, rhs);
        }
        for switch in &case.switches {
            self.add_uses(node, &switch.signal);
            for sub_case in &switch.cases {
                for compare in &sub_case.compare {
                    self.add_uses(node, compare);
                }
                self.add_case(module, node, sub_case);
            }
        }
    }

    /// Defs grouped by node, for building scheduler edges.
    pub fn node_defs(&self) -> HashMap<NodeId, BTreeSet<WireId>> {
        let mut defs: HashMap<NodeId, BTreeSet<WireId>> = HashMap::default();
        for (wire, nodes) in &self.wire_defs {
            for node in nodes {
                defs.entry(*node).or_default().insert(*wire);
            }
        }
        defs
    }
}

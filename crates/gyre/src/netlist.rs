//! In-memory netlist container.
//!
//! A [`Design`] owns modules; a [`Module`] owns width-typed wires,
//! memories, cells with named port connections, processes, and
//! module-level connections. Everything is arena-allocated and addressed
//! through typed indices so that iteration order is the insertion order
//! and two identical builds observe identical orders.

pub mod cells;
pub mod constant;
pub mod sig;

pub use constant::{Bit, Const};
pub use sig::{BitRef, SigBit, SigChunk, SigMap, SigSpec};

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WireId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

pub type Attributes = BTreeMap<String, Const>;

/// How much of a module the front-end selected for compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Full,
    Partial,
    None,
}

/// A named, width-typed bit vector with two faces in the produced
/// simulator: `next` (written during eval) and `curr` (read).
#[derive(Debug, Clone)]
pub struct Wire {
    pub name: String,
    pub width: usize,
    /// 1-based port index; 0 means the wire is not a port.
    pub port_id: usize,
    pub port_input: bool,
    pub port_output: bool,
    pub attributes: Attributes,
}

impl Wire {
    pub fn is_public(&self) -> bool {
        self.name.starts_with('\\')
    }

    pub fn is_internal(&self) -> bool {
        self.name.starts_with('$')
    }

    pub fn has_keep(&self) -> bool {
        self.attributes.get("\\keep").is_some_and(|c| c.as_bool())
    }

    pub fn init(&self) -> Option<&Const> {
        self.attributes.get("\\init")
    }
}

#[derive(Debug, Clone)]
pub struct Memory {
    pub name: String,
    pub width: usize,
    pub size: usize,
    pub start_offset: i64,
    pub attributes: Attributes,
}

/// A typed operator with named port connections and parameters. Both
/// maps are name-keyed so emission never depends on insertion order.
#[derive(Debug, Clone)]
pub struct Cell {
    pub name: String,
    pub ty: String,
    pub parameters: BTreeMap<String, Const>,
    pub connections: BTreeMap<String, SigSpec>,
    pub attributes: Attributes,
}

impl Cell {
    pub fn port(&self, name: &str) -> Option<&SigSpec> {
        self.connections.get(name)
    }

    pub fn has_port(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    pub fn param(&self, name: &str) -> Option<&Const> {
        self.parameters.get(name)
    }

    pub fn param_bool(&self, name: &str) -> bool {
        self.param(name).is_some_and(|c| c.as_bool())
    }

    pub fn param_usize(&self, name: &str) -> usize {
        self.param(name).and_then(|c| c.as_usize()).unwrap_or(0)
    }

    pub fn param_str(&self, name: &str) -> String {
        self.param(name).map(|c| c.decode_string()).unwrap_or_default()
    }
}

/// Trigger kind of a process sync rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncType {
    /// While the signal is low.
    Level0,
    /// While the signal is high.
    Level1,
    /// Unconditionally (asynchronous).
    LevelAsync,
    Posedge,
    Negedge,
    BothEdges,
    /// Power-on initialization; folded into wire init attributes by the
    /// process pre-passes.
    Init,
    /// Global clock; not supported by this backend.
    Global,
}

impl SyncType {
    pub fn is_edge(self) -> bool {
        matches!(self, SyncType::Posedge | SyncType::Negedge | SyncType::BothEdges)
    }
}

#[derive(Debug, Clone)]
pub struct SyncRule {
    pub kind: SyncType,
    pub signal: SigSpec,
    pub actions: Vec<(SigSpec, SigSpec)>,
}

#[derive(Debug, Clone, Default)]
pub struct CaseRule {
    pub attributes: Attributes,
    /// Patterns this case matches against the switch selector; empty
    /// means the default case.
    pub compare: Vec<SigSpec>,
    pub actions: Vec<(SigSpec, SigSpec)>,
    pub switches: Vec<SwitchRule>,
}

impl CaseRule {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.switches.iter().all(|sw| sw.cases.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct SwitchRule {
    pub attributes: Attributes,
    pub signal: SigSpec,
    pub cases: Vec<CaseRule>,
}

#[derive(Debug, Clone)]
pub struct Process {
    pub name: String,
    pub attributes: Attributes,
    pub root_case: CaseRule,
    pub syncs: Vec<SyncRule>,
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub attributes: Attributes,
    pub blackbox: bool,
    pub selection: Selection,
    wires: Vec<Wire>,
    memories: Vec<Memory>,
    cells: Vec<Cell>,
    processes: Vec<Process>,
    pub connections: Vec<(SigSpec, SigSpec)>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            attributes: Attributes::new(),
            blackbox: false,
            selection: Selection::Full,
            wires: Vec::new(),
            memories: Vec::new(),
            cells: Vec::new(),
            processes: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn add_wire(&mut self, name: impl Into<String>, width: usize) -> WireId {
        let id = WireId(self.wires.len() as u32);
        self.wires.push(Wire {
            name: name.into(),
            width,
            port_id: 0,
            port_input: false,
            port_output: false,
            attributes: Attributes::new(),
        });
        id
    }

    pub fn add_input(&mut self, name: impl Into<String>, width: usize) -> WireId {
        let id = self.add_wire(name, width);
        self.make_port(id, true, false);
        id
    }

    pub fn add_output(&mut self, name: impl Into<String>, width: usize) -> WireId {
        let id = self.add_wire(name, width);
        self.make_port(id, false, true);
        id
    }

    pub fn make_port(&mut self, id: WireId, input: bool, output: bool) {
        let port_id = self.wires.iter().map(|w| w.port_id).max().unwrap_or(0) + 1;
        let wire = self.wire_mut(id);
        wire.port_id = port_id;
        wire.port_input = input;
        wire.port_output = output;
    }

    pub fn wire(&self, id: WireId) -> &Wire {
        &self.wires[id.0 as usize]
    }

    pub fn wire_mut(&mut self, id: WireId) -> &mut Wire {
        &mut self.wires[id.0 as usize]
    }

    pub fn wires(&self) -> impl Iterator<Item = (WireId, &Wire)> {
        self.wires.iter().enumerate().map(|(n, w)| (WireId(n as u32), w))
    }

    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    pub(crate) fn replace_wires(&mut self, wires: Vec<Wire>) {
        self.wires = wires;
    }

    pub fn add_memory(
        &mut self,
        name: impl Into<String>,
        width: usize,
        size: usize,
        start_offset: i64,
    ) -> MemoryId {
        let id = MemoryId(self.memories.len() as u32);
        self.memories.push(Memory {
            name: name.into(),
            width,
            size,
            start_offset,
            attributes: Attributes::new(),
        });
        id
    }

    pub fn memory(&self, id: MemoryId) -> &Memory {
        &self.memories[id.0 as usize]
    }

    pub fn memories(&self) -> impl Iterator<Item = (MemoryId, &Memory)> {
        self.memories.iter().enumerate().map(|(n, m)| (MemoryId(n as u32), m))
    }

    pub fn memory_by_name(&self, name: &str) -> Option<MemoryId> {
        self.memories
            .iter()
            .position(|m| m.name == name)
            .map(|n| MemoryId(n as u32))
    }

    pub fn add_cell(&mut self, name: impl Into<String>, ty: impl Into<String>) -> CellId {
        let id = CellId(self.cells.len() as u32);
        self.cells.push(Cell {
            name: name.into(),
            ty: ty.into(),
            parameters: BTreeMap::new(),
            connections: BTreeMap::new(),
            attributes: Attributes::new(),
        });
        id
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.0 as usize]
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id.0 as usize]
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells.iter().enumerate().map(|(n, c)| (CellId(n as u32), c))
    }

    pub(crate) fn retain_cells(&mut self, mut keep: impl FnMut(&Cell) -> bool) {
        self.cells.retain(|c| keep(c));
    }

    pub fn add_process(&mut self, process: Process) -> ProcessId {
        let id = ProcessId(self.processes.len() as u32);
        self.processes.push(process);
        id
    }

    pub fn process(&self, id: ProcessId) -> &Process {
        &self.processes[id.0 as usize]
    }

    pub fn process_mut(&mut self, id: ProcessId) -> &mut Process {
        &mut self.processes[id.0 as usize]
    }

    pub fn processes(&self) -> impl Iterator<Item = (ProcessId, &Process)> {
        self.processes.iter().enumerate().map(|(n, p)| (ProcessId(n as u32), p))
    }

    pub(crate) fn processes_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.processes.iter_mut()
    }

    pub(crate) fn retain_processes(&mut self, mut keep: impl FnMut(&Process) -> bool) {
        self.processes.retain(|p| keep(p));
    }

    pub fn connect(&mut self, lhs: SigSpec, rhs: SigSpec) {
        debug_assert_eq!(lhs.width(), rhs.width());
        self.connections.push((lhs, rhs));
    }

    /// A signal covering the whole of `wire`.
    pub fn sig(&self, wire: WireId) -> SigSpec {
        SigSpec::from_chunk(SigChunk::Wire { wire, offset: 0, width: self.wire(wire).width })
    }

    /// A slice `(wire, offset, width)` as a signal.
    pub fn sig_slice(&self, wire: WireId, offset: usize, width: usize) -> SigSpec {
        debug_assert!(offset + width <= self.wire(wire).width);
        SigSpec::from_chunk(SigChunk::Wire { wire, offset, width })
    }
}

#[derive(Debug, Default)]
pub struct Design {
    modules: Vec<Module>,
}

impl Design {
    pub fn new() -> Self {
        Design::default()
    }

    pub fn add_module(&mut self, module: Module) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(module);
        id
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0 as usize]
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate().map(|(n, m)| (ModuleId(n as u32), m))
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.iter_mut()
    }

    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name == name)
            .map(|n| ModuleId(n as u32))
    }

    /// Whether the cell's port directions are known: true for understood
    /// internal cells and for instances of modules present in the design.
    pub fn cell_known(&self, cell: &Cell) -> bool {
        if cells::is_internal_cell(&cell.ty) {
            cells::is_known_internal_cell(&cell.ty)
        } else {
            self.module_by_name(&cell.ty).is_some()
        }
    }

    pub fn cell_input(&self, cell: &Cell, port: &str) -> bool {
        if cells::is_internal_cell(&cell.ty) {
            cells::internal_cell_input(&cell.ty, port)
        } else {
            self.user_port(cell, port).is_some_and(|w| w.port_input)
        }
    }

    pub fn cell_output(&self, cell: &Cell, port: &str) -> bool {
        if cells::is_internal_cell(&cell.ty) {
            cells::internal_cell_output(&cell.ty, port)
        } else {
            self.user_port(cell, port).is_some_and(|w| w.port_output)
        }
    }

    fn user_port(&self, cell: &Cell, port: &str) -> Option<&Wire> {
        let target = self.module_by_name(&cell.ty)?;
        self.module(target)
            .wires()
            .map(|(_, w)| w)
            .find(|w| w.name == port && w.port_id != 0)
    }
}

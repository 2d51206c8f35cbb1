//! C++ code emission.
//!
//! Walks each module's schedule and materializes the simulator source:
//! an aggregate deriving from the runtime's `module` base per netlist
//! module, an `eval()` that evaluates the scheduled nodes, and a
//! `commit()` that flips wire `next` into `curr` and raises the edge
//! flags the next `eval()` observes. Everything is written into string
//! buffers; nothing reaches the filesystem from here, so a failed
//! compilation leaves no truncated output behind.

use crate::analysis::ModuleAnalysis;
use crate::compiler::{Options, Output, topo_sort_modules};
use crate::error::CompileError;
use crate::flow::{FlowNode, NodeId};
use crate::mangle::{mangle_cell_name, mangle_memory_name, mangle_module_name, mangle_wire_name};
use crate::netlist::cells::{
    is_binary_cell, is_elidable_cell, is_ff_cell, is_internal_cell, is_unary_cell,
};
use crate::netlist::{
    Attributes, Bit, CaseRule, Cell, CellId, Const, Design, MemoryId, Module, ModuleId, ProcessId,
    SigBit, SigChunk, SigSpec, SwitchRule, SyncType, WireId,
};
use crate::HashMap;
use std::fmt::Write as _;

struct ModuleCtx<'a> {
    module: &'a Module,
    analysis: &'a ModuleAnalysis,
}

pub(crate) struct Emitter<'a> {
    design: &'a Design,
    options: &'a Options,
    out: String,
    indent: usize,
    temporary: usize,
}

/// `%#x`-style hex: plain `0` for zero, `0x...` otherwise.
fn hex(value: u64) -> String {
    if value == 0 { "0".into() } else { format!("{value:#x}") }
}

fn mangle_sigbit(module: &Module, bit: SigBit) -> String {
    let wire = module.wire(bit.wire);
    if wire.width == 1 {
        mangle_wire_name(&wire.name)
    } else {
        format!("{}_{}", mangle_wire_name(&wire.name), bit.offset)
    }
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(design: &'a Design, options: &'a Options) -> Self {
        Emitter { design, options, out: String::new(), indent: 0, temporary: 0 }
    }

    fn ind(&mut self) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
    }

    fn fresh_temporary(&mut self) -> String {
        let name = format!("tmp_{}", self.temporary);
        self.temporary += 1;
        name
    }

    fn dump_attrs(&mut self, attributes: &Attributes) {
        for (name, value) in attributes {
            self.ind();
            let _ = writeln!(self.out, "// {}: {}", name, value.attr_display());
        }
    }

    fn dump_const_init(&mut self, data: &Const, width: usize, offset: usize, fixed_width: bool) {
        self.out.push('{');
        let mut offset = offset;
        let mut width = width as i64;
        while width > 0 {
            let chunk = data.chunk_u32(offset, width.min(32) as usize);
            if fixed_width {
                let _ = write!(self.out, "{chunk:#010x}u");
            } else {
                let _ = write!(self.out, "{}u", hex(chunk as u64));
            }
            if width > 32 {
                self.out.push(',');
            }
            offset += 32;
            width -= 32;
        }
        self.out.push('}');
    }

    fn dump_const(&mut self, data: &Const, width: usize, offset: usize, fixed_width: bool) {
        let _ = write!(self.out, "value<{width}>");
        self.dump_const_init(data, width, offset, fixed_width);
    }

    fn dump_const_whole(&mut self, data: &Const) {
        self.dump_const(data, data.width(), 0, false);
    }

    /// Emits one chunk; returns whether the produced expression is
    /// "complex" (needs `.val()` where a plain `value<N>` is required).
    fn dump_sigchunk(&mut self, ctx: &ModuleCtx, chunk: &SigChunk, is_lhs: bool) -> bool {
        let (wire_id, offset, width) = match chunk {
            SigChunk::Const(data) => {
                self.dump_const_whole(data);
                return false;
            }
            SigChunk::Wire { wire, offset, width } => (*wire, *offset, *width),
        };
        let wire = ctx.module.wire(wire_id);
        if !is_lhs && ctx.analysis.elided_wires.contains_key(&wire_id) {
            let node = ctx.analysis.elided_wires[&wire_id];
            match ctx.analysis.flow.node(node) {
                FlowNode::Connect { rhs, .. } => {
                    self.dump_sigspec_rhs(ctx, rhs);
                }
                FlowNode::Cell(cell_id) => {
                    let cell = ctx.module.cell(*cell_id);
                    if is_elidable_cell(&cell.ty) {
                        self.dump_cell_expr(ctx, cell);
                    } else {
                        let port = &ctx.analysis.cell_wire_defs[cell_id][&wire_id];
                        let _ = write!(
                            self.out,
                            "{}.{}.curr",
                            mangle_cell_name(&cell.name),
                            mangle_wire_name(port)
                        );
                    }
                }
                FlowNode::Process(_) => unreachable!("processes define no elidable wires"),
            }
        } else if ctx.analysis.localized_wires.contains(&wire_id) {
            self.out.push_str(&mangle_wire_name(&wire.name));
        } else {
            let _ = write!(
                self.out,
                "{}.{}",
                mangle_wire_name(&wire.name),
                if is_lhs { "next" } else { "curr" }
            );
        }
        if width == wire.width && offset == 0 {
            false
        } else if width == 1 {
            let _ = write!(self.out, ".slice<{offset}>()");
            true
        } else {
            let _ = write!(self.out, ".slice<{},{}>()", offset + width - 1, offset);
            true
        }
    }

    fn dump_sigspec(&mut self, ctx: &ModuleCtx, sig: &SigSpec, is_lhs: bool) -> bool {
        if sig.is_empty() {
            self.out.push_str("value<0>()");
            return false;
        }
        if let Some(chunk) = sig.as_chunk() {
            return self.dump_sigchunk(ctx, chunk, is_lhs);
        }
        // Concatenation is emitted most significant chunk first, each
        // following chunk appended on the low side.
        let chunks = sig.chunks();
        self.dump_sigchunk(ctx, chunks.last().unwrap(), is_lhs);
        for chunk in chunks.iter().rev().skip(1) {
            self.out.push_str(".concat(");
            self.dump_sigchunk(ctx, chunk, is_lhs);
            self.out.push(')');
        }
        true
    }

    fn dump_sigspec_lhs(&mut self, ctx: &ModuleCtx, sig: &SigSpec) {
        self.dump_sigspec(ctx, sig, true);
    }

    /// Where template argument deduction needs an actual `value<N>`,
    /// complex expressions get an explicit `.val()` materialization.
    fn dump_sigspec_rhs(&mut self, ctx: &ModuleCtx, sig: &SigSpec) {
        let is_complex = self.dump_sigspec(ctx, sig, false);
        if is_complex {
            self.out.push_str(".val()");
        }
    }

    /// Names of the elided cells folded into `sig`'s inlined expression.
    fn collect_sigspec_rhs(&self, ctx: &ModuleCtx, sig: &SigSpec, cells: &mut Vec<String>) {
        for chunk in sig.chunks() {
            let SigChunk::Wire { wire, .. } = chunk else { continue };
            let Some(node) = ctx.analysis.elided_wires.get(wire) else { continue };
            match ctx.analysis.flow.node(*node) {
                FlowNode::Connect { rhs, .. } => self.collect_sigspec_rhs(ctx, rhs, cells),
                FlowNode::Cell(cell_id) => self.collect_cell(ctx, *cell_id, cells),
                FlowNode::Process(_) => unreachable!(),
            }
        }
    }

    fn is_connect_elided(&self, ctx: &ModuleCtx, lhs: &SigSpec) -> bool {
        lhs.as_wire(ctx.module)
            .is_some_and(|wire| ctx.analysis.elided_wires.contains_key(&wire))
    }

    fn dump_connect(&mut self, ctx: &ModuleCtx, lhs: &SigSpec, rhs: &SigSpec) {
        if self.is_connect_elided(ctx, lhs) {
            return;
        }
        self.ind();
        self.out.push_str("// connection\n");
        self.ind();
        self.dump_sigspec_lhs(ctx, lhs);
        self.out.push_str(" = ");
        self.dump_sigspec_rhs(ctx, rhs);
        self.out.push_str(";\n");
    }

    /// The expression form of an elidable cell, used both for inlining
    /// and for the right-hand side of its assignment.
    fn dump_cell_expr(&mut self, ctx: &ModuleCtx, cell: &Cell) {
        if is_unary_cell(&cell.ty) {
            let _ = write!(
                self.out,
                "{}_{}<{}>(",
                &cell.ty[1..],
                if cell.param_bool("A_SIGNED") { 's' } else { 'u' },
                cell.param_usize("Y_WIDTH")
            );
            self.dump_sigspec_rhs(ctx, &cell.connections["A"]);
            self.out.push(')');
        } else if is_binary_cell(&cell.ty) {
            let _ = write!(
                self.out,
                "{}_{}{}<{}>(",
                &cell.ty[1..],
                if cell.param_bool("A_SIGNED") { 's' } else { 'u' },
                if cell.param_bool("B_SIGNED") { 's' } else { 'u' },
                cell.param_usize("Y_WIDTH")
            );
            self.dump_sigspec_rhs(ctx, &cell.connections["A"]);
            self.out.push_str(", ");
            self.dump_sigspec_rhs(ctx, &cell.connections["B"]);
            self.out.push(')');
        } else if cell.ty == "$mux" {
            self.out.push('(');
            self.dump_sigspec_rhs(ctx, &cell.connections["S"]);
            self.out.push_str(" ? ");
            self.dump_sigspec_rhs(ctx, &cell.connections["B"]);
            self.out.push_str(" : ");
            self.dump_sigspec_rhs(ctx, &cell.connections["A"]);
            self.out.push(')');
        } else if cell.ty == "$concat" {
            self.dump_sigspec_rhs(ctx, &cell.connections["B"]);
            self.out.push_str(".concat(");
            self.dump_sigspec_rhs(ctx, &cell.connections["A"]);
            self.out.push_str(").val()");
        } else if cell.ty == "$slice" {
            self.dump_sigspec_rhs(ctx, &cell.connections["A"]);
            let offset = cell.param_usize("OFFSET");
            let _ = write!(
                self.out,
                ".slice<{},{}>().val()",
                offset + cell.param_usize("Y_WIDTH") - 1,
                offset
            );
        } else {
            unreachable!("not an elidable cell: {}", cell.ty);
        }
    }

    fn is_cell_elided(&self, ctx: &ModuleCtx, cell: &Cell) -> bool {
        is_elidable_cell(&cell.ty)
            && cell
                .port("Y")
                .and_then(|y| y.as_wire(ctx.module))
                .is_some_and(|wire| ctx.analysis.elided_wires.contains_key(&wire))
    }

    fn collect_cell(&self, ctx: &ModuleCtx, cell_id: CellId, cells: &mut Vec<String>) {
        let cell = ctx.module.cell(cell_id);
        if !self.is_cell_elided(ctx, cell) {
            return;
        }
        cells.push(cell.name.clone());
        for (port, sig) in &cell.connections {
            if port != "Y" {
                self.collect_sigspec_rhs(ctx, sig, cells);
            }
        }
    }

    fn edge_guard(&self, ctx: &ModuleCtx, cell: &Cell) -> String {
        let clk = ctx.analysis.sigmap.map(cell.port("CLK").unwrap());
        let bit = clk.as_bit().expect("clock must be a wire bit");
        let prefix = if cell.param_bool("CLK_POLARITY") { "posedge_" } else { "negedge_" };
        format!("{}{}", prefix, mangle_sigbit(ctx.module, bit))
    }

    fn dump_cell(&mut self, ctx: &ModuleCtx, cell_id: CellId) {
        let cell = ctx.module.cell(cell_id);
        if self.is_cell_elided(ctx, cell) {
            return;
        }
        if cell.ty == "$meminit" {
            return; // Folded into the memory initializer.
        }

        let mut elided_cells = Vec::new();
        if is_elidable_cell(&cell.ty) {
            for (port, sig) in &cell.connections {
                if port != "Y" {
                    self.collect_sigspec_rhs(ctx, sig, &mut elided_cells);
                }
            }
        }
        if elided_cells.is_empty() {
            self.dump_attrs(&cell.attributes);
            self.ind();
            let _ = writeln!(self.out, "// cell {}", cell.name);
        } else {
            self.ind();
            self.out.push_str("// cells");
            for name in &elided_cells {
                let _ = write!(self.out, " {}", name);
            }
            self.out.push('\n');
        }

        if is_elidable_cell(&cell.ty) {
            self.ind();
            self.dump_sigspec_lhs(ctx, &cell.connections["Y"]);
            self.out.push_str(" = ");
            self.dump_cell_expr(ctx, cell);
            self.out.push_str(";\n");
        } else if cell.ty == "$pmux" {
            self.dump_pmux(ctx, cell);
        } else if is_ff_cell(&cell.ty) {
            self.dump_ff(ctx, cell);
        } else if cell.ty == "$memrd" || cell.ty == "$memwr" {
            self.dump_mem_port(ctx, cell_id, cell);
        } else if is_internal_cell(&cell.ty) {
            unreachable!("unsupported internal cell `{}` survived analysis", cell.ty);
        } else {
            self.dump_user_cell(ctx, cell_id, cell);
        }
    }

    /// A parallel (one-hot) mux lowers to an if/else-if chain over the
    /// select bits, defaulting to the A input.
    fn dump_pmux(&mut self, ctx: &ModuleCtx, cell: &Cell) {
        let width = cell.param_usize("WIDTH");
        let s_width = cell.param_usize("S_WIDTH");
        let s = &cell.connections["S"];
        let a = &cell.connections["A"];
        let b = &cell.connections["B"];
        let y = &cell.connections["Y"];
        for part in 0..s_width {
            if part == 0 {
                self.ind();
            } else {
                self.out.push_str(" else ");
            }
            self.out.push_str("if (");
            self.dump_sigspec_rhs(ctx, &s.extract(part, 1));
            self.out.push_str(") {\n");
            self.indent += 1;
            self.ind();
            self.dump_sigspec_lhs(ctx, y);
            self.out.push_str(" = ");
            self.dump_sigspec_rhs(ctx, &b.extract(part * width, width));
            self.out.push_str(";\n");
            self.indent -= 1;
            self.ind();
            self.out.push('}');
        }
        self.out.push_str(" else {\n");
        self.indent += 1;
        self.ind();
        self.dump_sigspec_lhs(ctx, y);
        self.out.push_str(" = ");
        self.dump_sigspec_rhs(ctx, a);
        self.out.push_str(";\n");
        self.indent -= 1;
        self.ind();
        self.out.push_str("}\n");
    }

    fn dump_ff(&mut self, ctx: &ModuleCtx, cell: &Cell) {
        let q = &cell.connections["Q"];
        if cell.has_port("CLK") && cell.port("CLK").unwrap().as_bit().is_some() {
            // Edge-sensitive update.
            let guard = self.edge_guard(ctx, cell);
            self.ind();
            let _ = writeln!(self.out, "if ({guard}) {{");
            self.indent += 1;
            if cell.ty == "$dffe" {
                self.ind();
                self.out.push_str("if (");
                self.dump_sigspec_rhs(ctx, &cell.connections["EN"]);
                let _ = writeln!(
                    self.out,
                    " == value<1> {{{}u}}) {{",
                    cell.param_bool("EN_POLARITY") as u32
                );
                self.indent += 1;
            }
            self.ind();
            self.dump_sigspec_lhs(ctx, q);
            self.out.push_str(" = ");
            self.dump_sigspec_rhs(ctx, &cell.connections["D"]);
            self.out.push_str(";\n");
            if cell.ty == "$dffe" {
                self.indent -= 1;
                self.ind();
                self.out.push_str("}\n");
            }
            self.indent -= 1;
            self.ind();
            self.out.push_str("}\n");
        } else if cell.has_port("EN") {
            // Level-sensitive (latch) update.
            self.ind();
            self.out.push_str("if (");
            self.dump_sigspec_rhs(ctx, &cell.connections["EN"]);
            let _ = writeln!(
                self.out,
                " == value<1> {{{}u}}) {{",
                cell.param_bool("EN_POLARITY") as u32
            );
            self.indent += 1;
            self.ind();
            self.dump_sigspec_lhs(ctx, q);
            self.out.push_str(" = ");
            self.dump_sigspec_rhs(ctx, &cell.connections["D"]);
            self.out.push_str(";\n");
            self.indent -= 1;
            self.ind();
            self.out.push_str("}\n");
        }
        if cell.has_port("ARST") {
            // Asynchronous reset of the whole word.
            self.ind();
            self.out.push_str("if (");
            self.dump_sigspec_rhs(ctx, &cell.connections["ARST"]);
            let _ = writeln!(
                self.out,
                " == value<1> {{{}u}}) {{",
                cell.param_bool("ARST_POLARITY") as u32
            );
            self.indent += 1;
            self.ind();
            self.dump_sigspec_lhs(ctx, q);
            self.out.push_str(" = ");
            let value = cell
                .param("ARST_VALUE")
                .cloned()
                .unwrap_or_else(|| Const::zeros(cell.param_usize("WIDTH")));
            self.dump_const_whole(&value);
            self.out.push_str(";\n");
            self.indent -= 1;
            self.ind();
            self.out.push_str("}\n");
        }
        let width = cell.param_usize("WIDTH");
        if cell.has_port("SET") {
            // Asynchronous per-bit set.
            self.ind();
            self.dump_sigspec_lhs(ctx, q);
            self.out.push_str(" = ");
            self.dump_sigspec_lhs(ctx, q);
            self.out.push_str(".update(");
            self.dump_const_whole(&Const::ones(width));
            self.out.push_str(", ");
            self.dump_sigspec_rhs(ctx, &cell.connections["SET"]);
            if !cell.param_bool("SET_POLARITY") {
                self.out.push_str(".bit_not()");
            }
            self.out.push_str(");\n");
        }
        if cell.has_port("CLR") {
            // Asynchronous per-bit clear; takes priority over set.
            self.ind();
            self.dump_sigspec_lhs(ctx, q);
            self.out.push_str(" = ");
            self.dump_sigspec_lhs(ctx, q);
            self.out.push_str(".update(");
            self.dump_const_whole(&Const::zeros(width));
            self.out.push_str(", ");
            self.dump_sigspec_rhs(ctx, &cell.connections["CLR"]);
            if !cell.param_bool("CLR_POLARITY") {
                self.out.push_str(".bit_not()");
            }
            self.out.push_str(");\n");
        }
    }

    fn dump_mem_port(&mut self, ctx: &ModuleCtx, cell_id: CellId, cell: &Cell) {
        let clocked = cell.param_bool("CLK_ENABLE");
        if clocked {
            let guard = self.edge_guard(ctx, cell);
            self.ind();
            let _ = writeln!(self.out, "if ({guard}) {{");
            self.indent += 1;
        }
        let memory_id = ctx.module.memory_by_name(&cell.param_str("MEMID")).unwrap();
        let memory = ctx.module.memory(memory_id);
        let memory_name = mangle_memory_name(&memory.name);
        let addr = &cell.connections["ADDR"];
        let index = self.fresh_temporary();
        self.ind();
        let _ = write!(self.out, "auto {index} = memory_index(");
        self.dump_sigspec_rhs(ctx, addr);
        let _ = writeln!(self.out, ", {}, {});", memory.start_offset, memory.size);
        if cell.ty == "$memrd" {
            let en = &cell.connections["EN"];
            let en_guard = !en.is_fully_ones();
            if en_guard {
                self.ind();
                self.out.push_str("if (");
                self.dump_sigspec_rhs(ctx, en);
                self.out.push_str(") {\n");
                self.indent += 1;
            }
            // Two bounds checks: the assertion crashes loudly during
            // development, the branch keeps release builds (-DNDEBUG)
            // free of undefined behavior. Out-of-bounds reads yield
            // zero when assertions are off.
            self.ind();
            let _ = writeln!(self.out, "assert({index}.valid && \"out of bounds read\");");
            self.ind();
            let _ = writeln!(self.out, "if ({index}.valid) {{");
            self.indent += 1;
            let data = &cell.connections["DATA"];
            if ctx.analysis.writable_memories.contains(&memory_id) {
                let addr_temp = self.fresh_temporary();
                self.ind();
                let _ = write!(self.out, "const value<{}> &{} = ", addr.width(), addr_temp);
                self.dump_sigspec_rhs(ctx, addr);
                self.out.push_str(";\n");
                let lhs_temp = self.fresh_temporary();
                self.ind();
                let _ = writeln!(
                    self.out,
                    "value<{}> {} = {}[{}.index];",
                    memory.width, lhs_temp, memory_name, index
                );
                let mut transparent: Vec<CellId> = ctx
                    .analysis
                    .transparent_for
                    .get(&cell_id)
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default();
                transparent.sort_by_key(|id| ctx.module.cell(*id).param_usize("PRIORITY"));
                for memwr_id in transparent {
                    let memwr = ctx.module.cell(memwr_id);
                    self.ind();
                    let _ = write!(self.out, "if ({addr_temp} == ");
                    self.dump_sigspec_rhs(ctx, &memwr.connections["ADDR"]);
                    self.out.push_str(") {\n");
                    self.indent += 1;
                    self.ind();
                    let _ = write!(self.out, "{lhs_temp} = {lhs_temp}.update(");
                    self.dump_sigspec_rhs(ctx, &memwr.connections["DATA"]);
                    self.out.push_str(", ");
                    self.dump_sigspec_rhs(ctx, &memwr.connections["EN"]);
                    self.out.push_str(");\n");
                    self.indent -= 1;
                    self.ind();
                    self.out.push_str("}\n");
                }
                self.ind();
                self.dump_sigspec_lhs(ctx, data);
                let _ = writeln!(self.out, " = {lhs_temp};");
            } else {
                self.ind();
                self.dump_sigspec_lhs(ctx, data);
                let _ = writeln!(self.out, " = {}[{}.index];", memory_name, index);
            }
            self.indent -= 1;
            self.ind();
            self.out.push_str("} else {\n");
            self.indent += 1;
            self.ind();
            self.dump_sigspec_lhs(ctx, data);
            let _ = writeln!(self.out, " = value<{}> {{}};", memory.width);
            self.indent -= 1;
            self.ind();
            self.out.push_str("}\n");
            if en_guard {
                self.indent -= 1;
                self.ind();
                self.out.push_str("}\n");
            }
        } else {
            assert!(ctx.analysis.writable_memories.contains(&memory_id));
            // Out-of-bounds writes are defined to do nothing when
            // assertions are off; see the read port for rationale.
            self.ind();
            let _ = writeln!(self.out, "assert({index}.valid && \"out of bounds write\");");
            self.ind();
            let _ = writeln!(self.out, "if ({index}.valid) {{");
            self.indent += 1;
            self.ind();
            let _ = write!(self.out, "{}.update({}.index, ", memory_name, index);
            self.dump_sigspec_rhs(ctx, &cell.connections["DATA"]);
            self.out.push_str(", ");
            self.dump_sigspec_rhs(ctx, &cell.connections["EN"]);
            let _ = writeln!(self.out, ", {});", cell.param_usize("PRIORITY"));
            self.indent -= 1;
            self.ind();
            self.out.push_str("}\n");
        }
        if clocked {
            self.indent -= 1;
            self.ind();
            self.out.push_str("}\n");
        }
    }

    fn dump_user_cell(&mut self, ctx: &ModuleCtx, cell_id: CellId, cell: &Cell) {
        debug_assert!(self.design.cell_known(cell));
        let instance = mangle_cell_name(&cell.name);
        for (port, sig) in &cell.connections {
            if self.design.cell_input(cell, port) {
                self.ind();
                let _ = write!(self.out, "{}.{}.next = ", instance, mangle_wire_name(port));
                self.dump_sigspec_rhs(ctx, sig);
                self.out.push_str(";\n");
            }
        }
        self.ind();
        let _ = writeln!(self.out, "{}.eval();", instance);
        for (port, sig) in &cell.connections {
            if let Some(wire) = sig.as_wire(ctx.module)
                && ctx.analysis.elided_wires.contains_key(&wire)
                && ctx.analysis.cell_wire_defs.get(&cell_id).is_some_and(|m| m.contains_key(&wire))
            {
                continue;
            }
            if self.design.cell_output(cell, port) {
                self.ind();
                self.dump_sigspec_lhs(ctx, sig);
                let _ = writeln!(self.out, " = {}.{}.curr;", instance, mangle_wire_name(port));
            }
        }
    }

    fn dump_assign(&mut self, ctx: &ModuleCtx, lhs: &SigSpec, rhs: &SigSpec) {
        self.ind();
        self.dump_sigspec_lhs(ctx, lhs);
        self.out.push_str(" = ");
        self.dump_sigspec_rhs(ctx, rhs);
        self.out.push_str(";\n");
    }

    fn dump_case_rule(&mut self, ctx: &ModuleCtx, case: &CaseRule) {
        for (lhs, rhs) in &case.actions {
            self.dump_assign(ctx, lhs, rhs);
        }
        for switch in &case.switches {
            self.dump_switch_rule(ctx, switch);
        }
    }

    fn dump_switch_rule(&mut self, ctx: &ModuleCtx, switch: &SwitchRule) {
        // The switch attributes precede the captured selector; the
        // (nested) case attributes precede each branch.
        self.dump_attrs(&switch.attributes);
        let selector = self.fresh_temporary();
        self.ind();
        let _ = write!(self.out, "const value<{}> &{} = ", switch.signal.width(), selector);
        self.dump_sigspec(ctx, &switch.signal, false);
        self.out.push_str(";\n");

        for (index, case) in switch.cases.iter().enumerate() {
            self.dump_attrs(&case.attributes);
            self.ind();
            if index != 0 {
                self.out.push_str("} else ");
            }
            if !case.compare.is_empty() {
                self.out.push_str("if (");
                for (n, compare) in case.compare.iter().enumerate() {
                    if n != 0 {
                        self.out.push_str(" || ");
                    }
                    if compare.is_fully_def() {
                        let _ = write!(self.out, "{} == ", selector);
                        self.dump_sigspec(ctx, compare, false);
                    } else if compare.is_fully_const() {
                        // Patterns with x/z/a bits compare the defined
                        // bits only, as a masked equality.
                        let pattern = compare.as_const().unwrap();
                        let mut mask = Vec::new();
                        let mut value = Vec::new();
                        for bit in pattern.bits() {
                            match bit {
                                Bit::Zero | Bit::One => {
                                    mask.push(Bit::One);
                                    value.push(bit);
                                }
                                Bit::X | Bit::Z | Bit::Any => {
                                    mask.push(Bit::Zero);
                                    value.push(Bit::Zero);
                                }
                            }
                        }
                        let width = compare.width();
                        let _ = write!(self.out, "and_uu<{}>({}, ", width, selector);
                        self.dump_const_whole(&Const::from_bits(mask));
                        self.out.push_str(") == ");
                        self.dump_const_whole(&Const::from_bits(value));
                    } else {
                        unreachable!("malformed case compare pattern");
                    }
                }
                self.out.push_str(") ");
            }
            self.out.push_str("{\n");
            self.indent += 1;
            self.dump_case_rule(ctx, case);
            self.indent -= 1;
        }
        self.ind();
        self.out.push_str("}\n");
    }

    fn dump_process(&mut self, ctx: &ModuleCtx, process_id: ProcessId) {
        let process = ctx.module.process(process_id);
        self.dump_attrs(&process.attributes);
        self.ind();
        let _ = writeln!(self.out, "// process {}", process.name);
        self.dump_case_rule(ctx, &process.root_case);

        for sync in &process.syncs {
            match sync.kind {
                SyncType::Posedge | SyncType::Negedge | SyncType::BothEdges => {
                    let signal = ctx.analysis.sigmap.map(&sync.signal);
                    let bit = signal.as_bit().expect("sync signal must be a single wire bit");
                    let name = mangle_sigbit(ctx.module, bit);
                    let guard = match sync.kind {
                        SyncType::Posedge => format!("posedge_{name}"),
                        SyncType::Negedge => format!("negedge_{name}"),
                        SyncType::BothEdges => format!("posedge_{name} || negedge_{name}"),
                        _ => unreachable!(),
                    };
                    self.ind();
                    let _ = writeln!(self.out, "if ({guard}) {{");
                    self.indent += 1;
                    for (lhs, rhs) in &sync.actions {
                        self.dump_assign(ctx, lhs, rhs);
                    }
                    self.indent -= 1;
                    self.ind();
                    self.out.push_str("}\n");
                }
                SyncType::Level0 | SyncType::Level1 => {
                    self.ind();
                    self.out.push_str("if (");
                    self.dump_sigspec_rhs(ctx, &sync.signal);
                    let _ = writeln!(
                        self.out,
                        " == value<1> {{{}u}}) {{",
                        (sync.kind == SyncType::Level1) as u32
                    );
                    self.indent += 1;
                    for (lhs, rhs) in &sync.actions {
                        self.dump_assign(ctx, lhs, rhs);
                    }
                    self.indent -= 1;
                    self.ind();
                    self.out.push_str("}\n");
                }
                SyncType::LevelAsync => {
                    for (lhs, rhs) in &sync.actions {
                        self.dump_assign(ctx, lhs, rhs);
                    }
                }
                SyncType::Init | SyncType::Global => {
                    unreachable!("init/global sync rules are rejected during analysis")
                }
            }
        }
    }

    fn dump_wire(&mut self, ctx: &ModuleCtx, wire_id: WireId, is_local: bool) {
        if ctx.analysis.elided_wires.contains_key(&wire_id) {
            return;
        }
        let wire = ctx.module.wire(wire_id);
        if is_local {
            if !ctx.analysis.localized_wires.contains(&wire_id) {
                return;
            }
            self.dump_attrs(&wire.attributes);
            self.ind();
            let _ = writeln!(self.out, "value<{}> {};", wire.width, mangle_wire_name(&wire.name));
        } else {
            if ctx.analysis.localized_wires.contains(&wire_id) {
                return;
            }
            self.dump_attrs(&wire.attributes);
            self.ind();
            let _ = write!(self.out, "wire<{}> {}", wire.width, mangle_wire_name(&wire.name));
            if let Some(init) = wire.init() {
                self.out.push(' ');
                self.dump_const_init(init, init.width(), 0, false);
            }
            self.out.push_str(";\n");
            if ctx.analysis.sync_wires.contains(&wire_id) {
                for (bit, kind) in ctx.analysis.sync_bits_of(wire_id) {
                    let name = mangle_sigbit(ctx.module, bit);
                    if kind != SyncType::Negedge {
                        self.ind();
                        let _ = writeln!(self.out, "bool posedge_{} = false;", name);
                    }
                    if kind != SyncType::Posedge {
                        self.ind();
                        let _ = writeln!(self.out, "bool negedge_{} = false;", name);
                    }
                }
            }
        }
    }

    fn dump_memory(&mut self, ctx: &ModuleCtx, memory_id: MemoryId) {
        let memory = ctx.module.memory(memory_id);
        // Initializer cells apply highest priority last, lowest address
        // first within equal priorities.
        let mut init_cells: Vec<&Cell> = ctx
            .module
            .cells()
            .filter(|(_, c)| c.ty == "$meminit" && c.param_str("MEMID") == memory.name)
            .map(|(_, c)| c)
            .collect();
        let init_addr =
            |c: &Cell| c.connections["ADDR"].as_const().unwrap().as_usize().unwrap_or(0);
        init_cells.sort_by(|a, b| {
            b.param_usize("PRIORITY")
                .cmp(&a.param_usize("PRIORITY"))
                .then(init_addr(a).cmp(&init_addr(b)))
        });

        self.dump_attrs(&memory.attributes);
        self.ind();
        let writable = ctx.analysis.writable_memories.contains(&memory_id);
        let _ = write!(
            self.out,
            "{}memory<{}> {} {{ {}u",
            if writable { "" } else { "const " },
            memory.width,
            mangle_memory_name(&memory.name),
            memory.size
        );
        if init_cells.is_empty() {
            self.out.push_str(" };\n");
        } else {
            self.out.push_str(",\n");
            self.indent += 1;
            for cell in init_cells {
                self.dump_attrs(&cell.attributes);
                self.ind();
                let data = cell.connections["DATA"].as_const().unwrap();
                let width = cell.param_usize("WIDTH");
                let words = cell.param_usize("WORDS");
                let _ = write!(
                    self.out,
                    "memory<{}>::init<{}> {{ {}, {{",
                    memory.width,
                    words,
                    hex(init_addr(cell) as u64)
                );
                self.indent += 1;
                for n in 0..words {
                    if n % 4 == 0 {
                        self.out.push('\n');
                        self.ind();
                    } else {
                        self.out.push(' ');
                    }
                    self.dump_const(&data, width, n * width, true);
                    self.out.push(',');
                }
                self.indent -= 1;
                self.out.push('\n');
                self.ind();
                self.out.push_str("}},\n");
            }
            self.indent -= 1;
            self.ind();
            self.out.push_str("};\n");
        }
    }

    fn dump_module_intf(&mut self, ctx: &ModuleCtx) {
        self.dump_attrs(&ctx.module.attributes);
        let _ = writeln!(self.out, "struct {} : public module {{", mangle_module_name(&ctx.module.name));
        self.indent += 1;
        for (wire_id, _) in ctx.module.wires() {
            self.dump_wire(ctx, wire_id, false);
        }
        self.out.push('\n');
        let mut has_memories = false;
        for (memory_id, _) in ctx.module.memories() {
            self.dump_memory(ctx, memory_id);
            has_memories = true;
        }
        if has_memories {
            self.out.push('\n');
        }
        let mut has_cells = false;
        for (_, cell) in ctx.module.cells() {
            if is_internal_cell(&cell.ty) {
                continue;
            }
            self.ind();
            let _ = writeln!(
                self.out,
                "{} {};",
                mangle_module_name(&cell.ty),
                mangle_cell_name(&cell.name)
            );
            has_cells = true;
        }
        if has_cells {
            self.out.push('\n');
        }
        self.ind();
        self.out.push_str("void eval() override;\n");
        self.ind();
        self.out.push_str("bool commit() override;\n");
        self.indent -= 1;
        let _ = writeln!(self.out, "}}; // struct {}", mangle_module_name(&ctx.module.name));
        self.out.push('\n');
    }

    fn dump_module_impl(&mut self, ctx: &ModuleCtx) {
        let name = mangle_module_name(&ctx.module.name);
        let _ = writeln!(self.out, "void {}::eval() {{", name);
        self.indent += 1;
        for (wire_id, _) in ctx.module.wires() {
            self.dump_wire(ctx, wire_id, true);
        }
        for &node in &ctx.analysis.schedule {
            self.dump_node(ctx, node);
        }
        for (&bit, &kind) in &ctx.analysis.sync_types {
            let bit_name = mangle_sigbit(ctx.module, bit);
            if kind != SyncType::Negedge {
                self.ind();
                let _ = writeln!(self.out, "posedge_{} = false;", bit_name);
            }
            if kind != SyncType::Posedge {
                self.ind();
                let _ = writeln!(self.out, "negedge_{} = false;", bit_name);
            }
        }
        self.indent -= 1;
        self.out.push_str("}\n\n");

        let _ = writeln!(self.out, "bool {}::commit() {{", name);
        self.indent += 1;
        self.ind();
        self.out.push_str("bool changed = false;\n");
        for (wire_id, wire) in ctx.module.wires() {
            if ctx.analysis.elided_wires.contains_key(&wire_id)
                || ctx.analysis.localized_wires.contains(&wire_id)
            {
                continue;
            }
            let wire_name = mangle_wire_name(&wire.name);
            if ctx.analysis.sync_wires.contains(&wire_id) {
                let prev = format!("{wire_name}_prev");
                let edge = format!("{wire_name}_edge");
                self.ind();
                let _ = writeln!(self.out, "value<{}> {} = {}.curr;", wire.width, prev, wire_name);
                self.ind();
                let _ = writeln!(self.out, "if ({}.commit()) {{", wire_name);
                self.indent += 1;
                self.ind();
                let _ = writeln!(
                    self.out,
                    "value<{}> {} = {}.bit_xor({}.curr);",
                    wire.width, edge, prev, wire_name
                );
                for (bit, kind) in ctx.analysis.sync_bits_of(wire_id) {
                    let bit_name = mangle_sigbit(ctx.module, bit);
                    if kind != SyncType::Negedge {
                        self.ind();
                        let _ = writeln!(
                            self.out,
                            "if ({}.slice<{}>().val() && {}.curr.slice<{}>().val())",
                            edge, bit.offset, wire_name, bit.offset
                        );
                        self.indent += 1;
                        self.ind();
                        let _ = writeln!(self.out, "posedge_{} = true;", bit_name);
                        self.indent -= 1;
                    }
                    if kind != SyncType::Posedge {
                        self.ind();
                        let _ = writeln!(
                            self.out,
                            "if ({}.slice<{}>().val() && !{}.curr.slice<{}>().val())",
                            edge, bit.offset, wire_name, bit.offset
                        );
                        self.indent += 1;
                        self.ind();
                        let _ = writeln!(self.out, "negedge_{} = true;", bit_name);
                        self.indent -= 1;
                    }
                    self.ind();
                    self.out.push_str("changed = true;\n");
                }
                self.indent -= 1;
                self.ind();
                self.out.push_str("}\n");
            } else {
                self.ind();
                let _ = writeln!(self.out, "changed |= {}.commit();", wire_name);
            }
        }
        for (memory_id, memory) in ctx.module.memories() {
            if !ctx.analysis.writable_memories.contains(&memory_id) {
                continue;
            }
            self.ind();
            let _ = writeln!(self.out, "changed |= {}.commit();", mangle_memory_name(&memory.name));
        }
        for (_, cell) in ctx.module.cells() {
            if is_internal_cell(&cell.ty) {
                continue;
            }
            self.ind();
            let _ = writeln!(self.out, "changed |= {}.commit();", mangle_cell_name(&cell.name));
        }
        self.ind();
        self.out.push_str("return changed;\n");
        self.indent -= 1;
        self.out.push_str("}\n\n");
    }

    fn dump_node(&mut self, ctx: &ModuleCtx, node: NodeId) {
        match ctx.analysis.flow.node(node) {
            FlowNode::Connect { lhs, rhs } => self.dump_connect(ctx, lhs, rhs),
            FlowNode::Cell(cell_id) => self.dump_cell(ctx, *cell_id),
            FlowNode::Process(process_id) => self.dump_process(ctx, *process_id),
        }
    }

    pub(crate) fn dump_design(
        &mut self,
        analyses: &HashMap<ModuleId, ModuleAnalysis>,
    ) -> Result<Output, CompileError> {
        let order = topo_sort_modules(self.design)?;
        let include_guard = format!("{}_header", self.options.namespace).to_uppercase();

        let mut interface = None;
        if self.options.split_interface {
            let _ = writeln!(self.out, "#ifndef {include_guard}");
            let _ = writeln!(self.out, "#define {include_guard}");
            self.out.push('\n');
            self.out.push_str("#include <gyre/runtime.h>\n");
            self.out.push('\n');
            self.out.push_str("using namespace gyre;\n");
            self.out.push('\n');
            let _ = writeln!(self.out, "namespace {} {{", self.options.namespace);
            self.out.push('\n');
            for module_id in &order {
                let ctx = ModuleCtx {
                    module: self.design.module(*module_id),
                    analysis: &analyses[module_id],
                };
                self.dump_module_intf(&ctx);
            }
            let _ = writeln!(self.out, "}} // namespace {}", self.options.namespace);
            self.out.push('\n');
            self.out.push_str("#endif\n");
            interface = Some(std::mem::take(&mut self.out));
        }

        if self.options.split_interface {
            let intf_filename = self
                .options
                .interface_filename
                .as_deref()
                .ok_or(CompileError::MissingInterfaceName)?;
            let _ = writeln!(self.out, "#include \"{}\"", intf_filename);
        } else {
            self.out.push_str("#include <gyre/runtime.h>\n");
        }
        self.out.push('\n');
        self.out.push_str("using namespace gyre;\n");
        self.out.push('\n');
        let _ = writeln!(self.out, "namespace {} {{", self.options.namespace);
        self.out.push('\n');
        for module_id in &order {
            let ctx = ModuleCtx {
                module: self.design.module(*module_id),
                analysis: &analyses[module_id],
            };
            if !self.options.split_interface {
                self.dump_module_intf(&ctx);
            }
            self.dump_module_impl(&ctx);
        }
        let _ = writeln!(self.out, "}} // namespace {}", self.options.namespace);

        Ok(Output { implementation: std::mem::take(&mut self.out), interface })
    }
}

/// Emits the full design in design-level topological order (leaf modules
/// first) into in-memory buffers.
pub(crate) fn emit_design(
    design: &Design,
    analyses: &HashMap<ModuleId, ModuleAnalysis>,
    options: &Options,
) -> Result<Output, CompileError> {
    Emitter::new(design, options).dump_design(analyses)
}

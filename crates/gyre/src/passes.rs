//! Preparatory netlist passes invoked by the pipeline driver.
//!
//! Each pass is idempotent once its precondition holds: running it again
//! on its own output changes nothing.

use crate::error::CompileError;
use crate::netlist::{
    Bit, CaseRule, Const, Design, Module, Selection, SigBit, SigChunk, SigSpec, SyncType, Wire,
    WireId,
};
use crate::{HashMap, HashSet};

/// Scans the selected part of the design for constructs that later
/// stages refuse to see: init-type sync rules and packed memory cells.
/// Partially selected modules are rejected outright.
pub fn check_design(design: &Design) -> Result<(bool, bool), CompileError> {
    let mut has_sync_init = false;
    let mut has_packed_mem = false;
    for (_, module) in design.modules() {
        if module.blackbox {
            continue;
        }
        if module.selection == Selection::Partial {
            return Err(CompileError::PartialSelection(module.name.clone()));
        }
        if module.selection == Selection::None {
            continue;
        }
        for (_, process) in module.processes() {
            for sync in &process.syncs {
                if sync.kind == SyncType::Init {
                    has_sync_init = true;
                }
            }
        }
        for (_, cell) in module.cells() {
            if cell.ty == "$mem" {
                has_packed_mem = true;
            }
        }
    }
    Ok((has_sync_init, has_packed_mem))
}

/// Drops actions that assign to constant (wire-free) targets. Such
/// assignments can appear after other passes rewrite signals and have
/// no observable effect.
pub fn proc_prune(design: &mut Design) {
    fn prune_case(case: &mut CaseRule) {
        case.actions.retain(|(lhs, _)| {
            lhs.chunks().iter().any(|c| matches!(c, SigChunk::Wire { .. }))
        });
        for switch in &mut case.switches {
            for sub_case in &mut switch.cases {
                prune_case(sub_case);
            }
        }
    }
    for module in design.modules_mut() {
        for process in module.processes_mut() {
            prune_case(&mut process.root_case);
            for sync in &mut process.syncs {
                sync.actions.retain(|(lhs, _)| {
                    lhs.chunks().iter().any(|c| matches!(c, SigChunk::Wire { .. }))
                });
            }
        }
    }
}

/// Removes empty switches, empty processes, and sync rules with no
/// actions (except init rules, which `proc_init` still needs to see).
pub fn proc_clean(design: &mut Design) {
    fn clean_case(case: &mut CaseRule) {
        for switch in &mut case.switches {
            for sub_case in &mut switch.cases {
                clean_case(sub_case);
            }
            switch.cases.retain(|c| !c.is_empty() || !c.compare.is_empty());
        }
        case.switches.retain(|sw| !sw.cases.is_empty());
    }
    for module in design.modules_mut() {
        for process in module.processes_mut() {
            clean_case(&mut process.root_case);
            process
                .syncs
                .retain(|sync| !sync.actions.is_empty() || sync.kind == SyncType::Init);
        }
        module.retain_processes(|p| !p.root_case.is_empty() || !p.syncs.is_empty());
    }
}

/// Folds init-type sync rules into `\init` attributes on their target
/// wires. Bits not covered by any init action stay undefined.
pub fn proc_init(design: &mut Design) {
    for module in design.modules_mut() {
        let mut inits: Vec<(WireId, usize, Bit)> = Vec::new();
        for process in module.processes_mut() {
            for sync in &process.syncs {
                if sync.kind != SyncType::Init {
                    continue;
                }
                for (lhs, rhs) in &sync.actions {
                    let rhs_bits = rhs
                        .as_const()
                        .expect("init action value must be constant")
                        .bits();
                    for (target, value) in lhs.bits().iter().zip(rhs_bits) {
                        if let crate::netlist::BitRef::Wire(bit) = target {
                            inits.push((bit.wire, bit.offset, value));
                        }
                    }
                }
            }
            process.syncs.retain(|sync| sync.kind != SyncType::Init);
        }
        for (wire_id, offset, value) in inits {
            let wire = module.wire_mut(wire_id);
            let mut bits = match wire.attributes.get("\\init") {
                Some(c) => {
                    let mut bits = c.bits();
                    bits.resize(wire.width, Bit::X);
                    bits
                }
                None => vec![Bit::X; wire.width],
            };
            bits[offset] = value;
            wire.attributes.insert("\\init".into(), Const::from_bits(bits));
        }
    }
}

/// Replaces packed `$mem` cells with a memory object plus per-port
/// `$memrd`/`$memwr` cells and an `$meminit` cell for the initial
/// contents, so the backend only ever sees unpacked memories.
pub fn memory_unpack(design: &mut Design) {
    for module in design.modules_mut() {
        let packed: Vec<_> = module
            .cells()
            .filter(|(_, c)| c.ty == "$mem")
            .map(|(_, c)| c.clone())
            .collect();
        if packed.is_empty() {
            continue;
        }
        module.retain_cells(|c| c.ty != "$mem");
        for cell in packed {
            let memid = {
                let s = cell.param_str("MEMID");
                if s.is_empty() { cell.name.clone() } else { s }
            };
            let width = cell.param_usize("WIDTH");
            let size = cell.param_usize("SIZE");
            let abits = cell.param_usize("ABITS");
            let offset = cell
                .param("OFFSET")
                .and_then(|c| c.as_usize())
                .unwrap_or(0) as i64;
            module.add_memory(memid.clone(), width, size, offset);

            let rd_ports = cell.param_usize("RD_PORTS");
            for port in 0..rd_ports {
                let rd = module.add_cell(format!("{}$rd{}", cell.name, port), "$memrd");
                let rd_cell = module.cell_mut(rd);
                rd_cell.parameters.insert("MEMID".into(), Const::Str(memid.clone()));
                for (param, per_port) in [
                    ("CLK_ENABLE", "RD_CLK_ENABLE"),
                    ("CLK_POLARITY", "RD_CLK_POLARITY"),
                    ("TRANSPARENT", "RD_TRANSPARENT"),
                ] {
                    let bit = cell
                        .param(per_port)
                        .map(|c| c.bits().get(port).copied() == Some(Bit::One))
                        .unwrap_or(false);
                    rd_cell.parameters.insert(param.into(), Const::bool(bit));
                }
                for (conn, bus, bus_width) in [
                    ("CLK", "RD_CLK", 1),
                    ("EN", "RD_EN", 1),
                    ("ADDR", "RD_ADDR", abits),
                    ("DATA", "RD_DATA", width),
                ] {
                    if let Some(sig) = cell.port(bus) {
                        rd_cell
                            .connections
                            .insert(conn.into(), sig.extract(port * bus_width, bus_width));
                    }
                }
            }

            let wr_ports = cell.param_usize("WR_PORTS");
            for port in 0..wr_ports {
                let wr = module.add_cell(format!("{}$wr{}", cell.name, port), "$memwr");
                let wr_cell = module.cell_mut(wr);
                wr_cell.parameters.insert("MEMID".into(), Const::Str(memid.clone()));
                wr_cell.parameters.insert("PRIORITY".into(), Const::from_int(port as i64, 32));
                for (param, per_port) in
                    [("CLK_ENABLE", "WR_CLK_ENABLE"), ("CLK_POLARITY", "WR_CLK_POLARITY")]
                {
                    let bit = cell
                        .param(per_port)
                        .map(|c| c.bits().get(port).copied() == Some(Bit::One))
                        .unwrap_or(false);
                    wr_cell.parameters.insert(param.into(), Const::bool(bit));
                }
                for (conn, bus, bus_width) in [
                    ("CLK", "WR_CLK", 1),
                    ("EN", "WR_EN", width),
                    ("ADDR", "WR_ADDR", abits),
                    ("DATA", "WR_DATA", width),
                ] {
                    if let Some(sig) = cell.port(bus) {
                        wr_cell
                            .connections
                            .insert(conn.into(), sig.extract(port * bus_width, bus_width));
                    }
                }
            }

            if let Some(init) = cell.param("INIT")
                && init.bits().iter().any(|b| b.is_defined())
            {
                let mut bits = init.bits();
                bits.resize(size * width, Bit::X);
                let init_cell = module.add_cell(format!("{}$init", cell.name), "$meminit");
                let init_cell = module.cell_mut(init_cell);
                init_cell.parameters.insert("MEMID".into(), Const::Str(memid.clone()));
                init_cell.parameters.insert("WIDTH".into(), Const::from_int(width as i64, 32));
                init_cell.parameters.insert("WORDS".into(), Const::from_int(size as i64, 32));
                init_cell.parameters.insert("PRIORITY".into(), Const::from_int(0, 32));
                init_cell
                    .connections
                    .insert("ADDR".into(), SigSpec::from_const(Const::from_int(offset, abits.max(1))));
                init_cell
                    .connections
                    .insert("DATA".into(), SigSpec::from_const(Const::from_bits(bits)));
            }
        }
    }
}

/// Rewrites every signal in the module bit-by-bit through `f`.
fn rewrite_module_sigs(module: &mut Module, f: &impl Fn(SigBit) -> SigBit) {
    fn rewrite_case(case: &mut CaseRule, f: &impl Fn(SigBit) -> SigBit) {
        for compare in &mut case.compare {
            *compare = compare.rewritten(f);
        }
        for (lhs, rhs) in &mut case.actions {
            *lhs = lhs.rewritten(f);
            *rhs = rhs.rewritten(f);
        }
        for switch in &mut case.switches {
            switch.signal = switch.signal.rewritten(f);
            for sub_case in &mut switch.cases {
                rewrite_case(sub_case, f);
            }
        }
    }
    for (lhs, rhs) in &mut module.connections {
        *lhs = lhs.rewritten(f);
        *rhs = rhs.rewritten(f);
    }
    let cell_ids: Vec<_> = module.cells().map(|(id, _)| id).collect();
    for id in cell_ids {
        let cell = module.cell_mut(id);
        for sig in cell.connections.values_mut() {
            *sig = sig.rewritten(f);
        }
    }
    for process in module.processes_mut() {
        rewrite_case(&mut process.root_case, f);
        for sync in &mut process.syncs {
            sync.signal = sync.signal.rewritten(f);
            for (lhs, rhs) in &mut sync.actions {
                *lhs = lhs.rewritten(f);
                *rhs = rhs.rewritten(f);
            }
        }
    }
}

/// Splits wires driven in disjoint pieces by more than one driver into
/// one subwire per driven piece, so every resulting wire has a single
/// driver. Wires left without references are collected by
/// [`opt_clean_purge`]. Ports, `keep` wires, and wires with overlapping
/// drivers are left alone.
pub fn splitnets_driver(design: &mut Design) {
    for module in design.modules_mut() {
        // Driven ranges per wire, one entry per driving chunk.
        let mut driven: HashMap<WireId, Vec<(usize, usize)>> = HashMap::default();
        let mut record = |sig: &SigSpec| {
            for chunk in sig.chunks() {
                if let SigChunk::Wire { wire, offset, width } = chunk {
                    driven.entry(*wire).or_default().push((*offset, *width));
                }
            }
        };
        for (lhs, _) in &module.connections {
            record(lhs);
        }
        for (_, cell) in module.cells() {
            for (port, sig) in &cell.connections {
                // Internal-cell output classification is all that is
                // needed here; user cell outputs drive whole wires and
                // already have one driver each after flattening.
                if crate::netlist::cells::is_internal_cell(&cell.ty)
                    && crate::netlist::cells::internal_cell_output(&cell.ty, port)
                {
                    record(sig);
                }
            }
        }

        let mut bit_map: HashMap<SigBit, SigBit> = HashMap::default();
        let mut splits: Vec<(WireId, Vec<(usize, usize)>)> = Vec::new();
        for (wire_id, wire) in module.wires() {
            let Some(ranges) = driven.get(&wire_id) else { continue };
            if ranges.len() < 2 || wire.port_id != 0 || wire.has_keep() {
                continue;
            }
            let mut sorted = ranges.clone();
            sorted.sort();
            let overlapping = sorted
                .windows(2)
                .any(|w| w[0].0 + w[0].1 > w[1].0);
            if overlapping {
                continue;
            }
            // Undriven gaps become subwires too, so the whole wire is
            // covered and every reference can be rewritten.
            let mut pieces = Vec::new();
            let mut pos = 0;
            for (offset, width) in sorted {
                if pos < offset {
                    pieces.push((pos, offset - pos));
                }
                pieces.push((offset, width));
                pos = offset + width;
            }
            if pos < wire.width {
                pieces.push((pos, wire.width - pos));
            }
            splits.push((wire_id, pieces));
        }

        for (wire_id, pieces) in splits {
            let (name, init) = {
                let wire = module.wire(wire_id);
                (wire.name.clone(), wire.init().cloned())
            };
            for (offset, width) in pieces {
                let sub_name = format!("{}[{}:{}]", name, offset + width - 1, offset);
                let sub = module.add_wire(sub_name, width);
                if let Some(init) = &init {
                    let mut bits = init.bits();
                    bits.resize(module.wire(wire_id).width, Bit::X);
                    let sub_bits = bits[offset..offset + width].to_vec();
                    if sub_bits.iter().any(|b| b.is_defined()) {
                        module
                            .wire_mut(sub)
                            .attributes
                            .insert("\\init".into(), Const::from_bits(sub_bits));
                    }
                }
                for n in 0..width {
                    bit_map.insert(
                        SigBit { wire: wire_id, offset: offset + n },
                        SigBit { wire: sub, offset: n },
                    );
                }
            }
        }

        if !bit_map.is_empty() {
            rewrite_module_sigs(module, &|bit| bit_map.get(&bit).copied().unwrap_or(bit));
        }
    }
}

/// Removes wires that nothing references anymore, renumbering the wire
/// arena and rewriting all remaining signals. Ports and `keep` wires are
/// always retained; connections whose targets are all dead are dropped
/// with their wires.
pub fn opt_clean_purge(design: &mut Design) {
    for module in design.modules_mut() {
        let mut live: HashSet<WireId> = HashSet::default();
        fn mark(live: &mut HashSet<WireId>, sig: &SigSpec) {
            for chunk in sig.chunks() {
                if let SigChunk::Wire { wire, .. } = chunk {
                    live.insert(*wire);
                }
            }
        }
        for (wire_id, wire) in module.wires() {
            if wire.port_id != 0 || wire.has_keep() {
                live.insert(wire_id);
            }
        }
        for (_, cell) in module.cells() {
            for sig in cell.connections.values() {
                mark(&mut live, sig);
            }
        }
        fn mark_case(case: &CaseRule, live: &mut HashSet<WireId>) {
            for compare in &case.compare {
                mark(live, compare);
            }
            for (lhs, rhs) in &case.actions {
                mark(live, lhs);
                mark(live, rhs);
            }
            for switch in &case.switches {
                mark(live, &switch.signal);
                for sub_case in &switch.cases {
                    mark_case(sub_case, live);
                }
            }
        }
        for (_, process) in module.processes() {
            mark_case(&process.root_case, &mut live);
            for sync in &process.syncs {
                mark(&mut live, &sync.signal);
                for (lhs, rhs) in &sync.actions {
                    mark(&mut live, lhs);
                    mark(&mut live, rhs);
                }
            }
        }
        // A connection is alive only if it drives something alive; its
        // right-hand side stays alive with it.
        loop {
            let mut changed = false;
            for (lhs, rhs) in &module.connections {
                let drives_live = lhs.chunks().iter().any(|c| match c {
                    SigChunk::Wire { wire, .. } => live.contains(wire),
                    _ => false,
                });
                if drives_live {
                    for chunk in lhs.chunks().iter().chain(rhs.chunks()) {
                        if let SigChunk::Wire { wire, .. } = chunk
                            && live.insert(*wire)
                        {
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        module.connections.retain(|(lhs, _)| {
            lhs.chunks().iter().any(|c| match c {
                SigChunk::Wire { wire, .. } => live.contains(wire),
                _ => false,
            })
        });

        if live.len() == module.wire_count() {
            continue;
        }
        let mut remap: HashMap<WireId, WireId> = HashMap::default();
        let mut kept: Vec<Wire> = Vec::with_capacity(live.len());
        for (wire_id, wire) in module.wires() {
            if live.contains(&wire_id) {
                remap.insert(wire_id, WireId(kept.len() as u32));
                kept.push(wire.clone());
            }
        }
        module.replace_wires(kept);
        rewrite_module_sigs(module, &|bit| SigBit { wire: remap[&bit.wire], offset: bit.offset });
    }
}

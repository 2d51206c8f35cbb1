//! Yosys JSON netlist frontend.
//!
//! Reads the subset of the `yosys -o design.json` schema needed for
//! gate-level designs: ports, netnames, cells with parameters and
//! connections, and constant bits. Net indices become wires through the
//! first port or netname that mentions them; later aliases turn into
//! module-level connections, which the compiler's signal map folds away.

use miette::{IntoDiagnostic, Result, bail, miette};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use gyre::netlist::{Bit, Const, Design, Module, Selection, SigBit, SigSpec};

#[derive(Deserialize)]
struct JsonDesign {
    #[serde(default)]
    modules: BTreeMap<String, JsonModule>,
}

#[derive(Deserialize)]
struct JsonModule {
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    ports: BTreeMap<String, JsonPort>,
    #[serde(default)]
    cells: BTreeMap<String, JsonCell>,
    #[serde(default)]
    netnames: BTreeMap<String, JsonNet>,
}

#[derive(Deserialize)]
struct JsonPort {
    direction: String,
    bits: Vec<JsonBit>,
}

#[derive(Deserialize)]
struct JsonCell {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    connections: BTreeMap<String, Vec<JsonBit>>,
}

#[derive(Deserialize)]
struct JsonNet {
    bits: Vec<JsonBit>,
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
}

/// A single bit in a connection: a net index or a constant.
#[derive(Deserialize, Clone, PartialEq)]
#[serde(untagged)]
enum JsonBit {
    Net(u64),
    Const(String),
}

/// Yosys strips the `\` escape from public names when writing JSON;
/// internal `$` names pass through unchanged.
fn restore_name(name: &str) -> String {
    if name.starts_with('$') { name.to_owned() } else { format!("\\{name}") }
}

/// Parameters and attributes arrive either as plain integers or as
/// strings: strings of `0`/`1`/`x`/`z` are bit vectors (most significant
/// first), and genuine text that would look like one carries a trailing
/// space.
fn decode_value(value: &serde_json::Value) -> Result<Const> {
    match value {
        serde_json::Value::Number(n) => {
            let int = n.as_i64().ok_or_else(|| miette!("non-integer parameter value {n}"))?;
            Ok(Const::from_int(int, 32))
        }
        serde_json::Value::String(s) => {
            if let Some(stripped) = s.strip_suffix(' ') {
                return Ok(Const::Str(stripped.to_owned()));
            }
            if !s.is_empty() && s.bytes().all(|b| matches!(b, b'0' | b'1' | b'x' | b'z')) {
                let bits = s
                    .bytes()
                    .rev()
                    .map(|b| match b {
                        b'0' => Bit::Zero,
                        b'1' => Bit::One,
                        b'x' => Bit::X,
                        _ => Bit::Z,
                    })
                    .collect();
                return Ok(Const::from_bits(bits));
            }
            Ok(Const::Str(s.clone()))
        }
        serde_json::Value::Bool(b) => Ok(Const::bool(*b)),
        other => bail!("unsupported parameter value {other}"),
    }
}

fn decode_attributes(
    attributes: &BTreeMap<String, serde_json::Value>,
) -> Result<BTreeMap<String, Const>> {
    let mut out = BTreeMap::new();
    for (name, value) in attributes {
        out.insert(restore_name(name), decode_value(value)?);
    }
    Ok(out)
}

fn build_module(name: &str, jm: &JsonModule) -> Result<Module> {
    let mut module = Module::new(restore_name(name));
    module.attributes = decode_attributes(&jm.attributes)?;
    module.blackbox = module.attributes.get("\\blackbox").is_some_and(|c| c.as_bool());

    // Net index -> representative wire bit; first mention wins, ports
    // first so port wires canonicalize everything connected to them.
    let mut net_map: HashMap<u64, SigBit> = HashMap::new();
    let mut wire_bits: Vec<(gyre::netlist::WireId, Vec<JsonBit>)> = Vec::new();

    for (port_name, port) in &jm.ports {
        let wire = module.add_wire(restore_name(port_name), port.bits.len());
        match port.direction.as_str() {
            "input" => module.make_port(wire, true, false),
            "output" => module.make_port(wire, false, true),
            "inout" => module.make_port(wire, true, true),
            other => bail!("unknown port direction `{other}` on `{port_name}`"),
        }
        for (offset, bit) in port.bits.iter().enumerate() {
            if let JsonBit::Net(id) = bit {
                net_map.entry(*id).or_insert(SigBit { wire, offset });
            }
        }
        wire_bits.push((wire, port.bits.clone()));
    }

    for (net_name, net) in &jm.netnames {
        let net_name = restore_name(net_name);
        let existing = module
            .wires()
            .find(|(_, w)| w.name == net_name)
            .map(|(id, _)| id);
        let wire = match existing {
            Some(wire) => wire,
            None => {
                let wire = module.add_wire(net_name, net.bits.len());
                wire_bits.push((wire, net.bits.clone()));
                wire
            }
        };
        let attrs = decode_attributes(&net.attributes)?;
        module.wire_mut(wire).attributes.extend(attrs);
        for (offset, bit) in net.bits.iter().enumerate() {
            if let JsonBit::Net(id) = bit {
                net_map.entry(*id).or_insert(SigBit { wire, offset });
            }
        }
    }

    let mut sig_from_bits = |module: &mut Module, bits: &[JsonBit]| -> Result<SigSpec> {
        let mut sig = SigSpec::empty();
        for bit in bits {
            match bit {
                JsonBit::Net(id) => {
                    let rep = match net_map.get(id).copied() {
                        Some(rep) => rep,
                        None => {
                            // A net nothing names; give it an internal wire.
                            let wire = module.add_wire(format!("$net${id}"), 1);
                            let rep = SigBit { wire, offset: 0 };
                            net_map.insert(*id, rep);
                            rep
                        }
                    };
                    sig.append(&SigSpec::from_bit(rep));
                }
                JsonBit::Const(c) => {
                    let bit = match c.as_str() {
                        "0" => Bit::Zero,
                        "1" => Bit::One,
                        "x" => Bit::X,
                        "z" => Bit::Z,
                        other => bail!("unknown constant bit `{other}`"),
                    };
                    sig.append(&SigSpec::from_const(Const::from_bits(vec![bit])));
                }
            }
        }
        Ok(sig)
    };

    // Aliased nets: wires whose bits canonicalize elsewhere become
    // connections driven by the representative.
    for (wire, bits) in &wire_bits {
        let rep = sig_from_bits(&mut module, bits)?;
        if rep != module.sig(*wire) {
            let lhs = module.sig(*wire);
            module.connect(lhs, rep);
        }
    }

    for (cell_name, jc) in &jm.cells {
        let internal = jc.ty.starts_with('$');
        let ty = if internal { jc.ty.clone() } else { restore_name(&jc.ty) };
        let cell_id = module.add_cell(restore_name(cell_name), ty);
        let mut parameters = BTreeMap::new();
        for (param, value) in &jc.parameters {
            parameters.insert(param.clone(), decode_value(value)?);
        }
        let attributes = decode_attributes(&jc.attributes)?;
        let mut connections = BTreeMap::new();
        for (port, bits) in &jc.connections {
            let port = if internal { port.clone() } else { restore_name(port) };
            connections.insert(port, sig_from_bits(&mut module, bits)?);
        }
        let cell = module.cell_mut(cell_id);
        cell.parameters = parameters;
        cell.attributes = attributes;
        cell.connections = connections;
    }

    Ok(module)
}

pub fn parse_design(text: &str) -> Result<Design> {
    let parsed: JsonDesign = serde_json::from_str(text).into_diagnostic()?;
    let mut design = Design::new();
    for (name, jm) in &parsed.modules {
        let module = build_module(name, jm)?;
        design.add_module(module);
    }
    Ok(design)
}

/// Restricts selection to `top` and the modules it transitively
/// instantiates; everything else is excluded from compilation.
pub fn select_top(design: &mut Design, top: &str) -> Result<()> {
    let top_id = design
        .module_by_name(&restore_name(top))
        .or_else(|| design.module_by_name(top))
        .ok_or_else(|| miette!("no module named `{top}` in the design"))?;
    let mut selected = vec![top_id];
    let mut frontier = vec![top_id];
    while let Some(module_id) = frontier.pop() {
        let children: Vec<_> = design
            .module(module_id)
            .cells()
            .filter(|(_, c)| !c.ty.starts_with('$'))
            .filter_map(|(_, c)| design.module_by_name(&c.ty))
            .collect();
        for child in children {
            if !selected.contains(&child) {
                selected.push(child);
                frontier.push(child);
            }
        }
    }
    let all: Vec<_> = design.modules().map(|(id, _)| id).collect();
    for module_id in all {
        let keep = selected.contains(&module_id);
        design.module_mut(module_id).selection =
            if keep { Selection::Full } else { Selection::None };
    }
    Ok(())
}

use gyre::netlist::{Const, Design, Module, Selection};
use gyre::{CompileError, Compiler, Options};

/// `\top` instantiating `\sub`, which inverts its input.
fn hierarchy_design() -> Design {
    let mut design = Design::new();

    let mut sub = Module::new("\\sub");
    let i = sub.add_input("\\i", 1);
    let o = sub.add_output("\\o", 1);
    let not = sub.add_cell("$not$1", "$not");
    let conns = [("A", sub.sig(i)), ("Y", sub.sig(o))];
    {
        let cell = sub.cell_mut(not);
        cell.parameters.insert("A_SIGNED".into(), Const::bool(false));
        cell.parameters.insert("Y_WIDTH".into(), Const::from_int(1, 32));
        for (port, sig) in conns {
            cell.connections.insert(port.into(), sig);
        }
    }
    design.add_module(sub);

    let mut top = Module::new("\\top");
    let x = top.add_input("\\x", 1);
    let y = top.add_output("\\y", 1);
    let u1 = top.add_cell("\\u1", "\\sub");
    let conns = [("\\i", top.sig(x)), ("\\o", top.sig(y))];
    for (port, sig) in conns {
        top.cell_mut(u1).connections.insert(port.into(), sig);
    }
    design.add_module(top);
    design
}

#[test]
fn submodules_emit_before_their_parents() {
    let mut design = hierarchy_design();
    let output = Compiler::new(Options::with_opt_level(0).unwrap())
        .compile(&mut design)
        .unwrap();
    let implementation = output.implementation;
    let sub_pos = implementation.find("struct p_sub").unwrap();
    let top_pos = implementation.find("struct p_top").unwrap();
    assert!(sub_pos < top_pos);
    // The instance is a field typed to the instantiated module and is
    // evaluated and committed through the parent.
    assert!(implementation.contains("\tp_sub cell_p_u1;\n"));
    assert!(implementation.contains("\tcell_p_u1.p_i.next = p_x.curr;\n"));
    assert!(implementation.contains("\tcell_p_u1.eval();\n"));
    assert!(implementation.contains("\tp_y.next = cell_p_u1.p_o.curr;\n"));
    assert!(implementation.contains("\tchanged |= cell_p_u1.commit();\n"));
}

#[test]
fn split_interface_layout() {
    let mut options = Options::with_opt_level(0).unwrap();
    options.namespace = "demo".into();
    options.split_interface = true;
    options.interface_filename = Some("out.h".into());
    let mut design = hierarchy_design();
    let output = Compiler::new(options).compile(&mut design).unwrap();

    let interface = output.interface.expect("split mode produces an interface");
    assert!(interface.starts_with("#ifndef DEMO_HEADER\n#define DEMO_HEADER\n"));
    assert!(interface.contains("#include <gyre/runtime.h>\n"));
    assert!(interface.contains("namespace demo {\n"));
    assert!(interface.contains("struct p_sub : public module {\n"));
    assert!(interface.contains("struct p_top : public module {\n"));
    assert!(interface.contains("} // namespace demo\n"));
    assert!(interface.ends_with("#endif\n"));

    let implementation = output.implementation;
    assert!(implementation.starts_with("#include \"out.h\"\n"));
    assert!(!implementation.contains("struct p_top"));
    assert!(implementation.contains("void p_top::eval() {\n"));
    // Interfaces precede implementations in topological order too.
    let sub_pos = interface.find("struct p_sub").unwrap();
    let top_pos = interface.find("struct p_top").unwrap();
    assert!(sub_pos < top_pos);
}

#[test]
fn split_interface_requires_a_filename() {
    let mut options = Options::with_opt_level(0).unwrap();
    options.split_interface = true;
    let mut design = hierarchy_design();
    let result = Compiler::new(options).compile(&mut design);
    assert!(matches!(result, Err(CompileError::MissingInterfaceName)));
}

#[test]
fn identical_runs_are_byte_identical() {
    let compile = || {
        let mut design = hierarchy_design();
        Compiler::new(Options::default()).compile(&mut design).unwrap()
    };
    let first = compile();
    let second = compile();
    assert_eq!(first.implementation, second.implementation);
    assert_eq!(first.interface, second.interface);
}

#[test]
fn deselected_modules_are_not_emitted() {
    let mut design = hierarchy_design();
    let top = design.module_by_name("\\top").unwrap();
    design.module_mut(top).selection = Selection::None;
    let output = Compiler::new(Options::with_opt_level(0).unwrap())
        .compile(&mut design)
        .unwrap();
    assert!(output.implementation.contains("struct p_sub"));
    assert!(!output.implementation.contains("p_top"));
}

#[test]
fn partially_selected_modules_are_rejected() {
    let mut design = hierarchy_design();
    let top = design.module_by_name("\\top").unwrap();
    design.module_mut(top).selection = Selection::Partial;
    let result = Compiler::new(Options::with_opt_level(0).unwrap()).compile(&mut design);
    assert!(matches!(result, Err(CompileError::PartialSelection(name)) if name == "\\top"));
}

#[test]
fn blackbox_modules_are_skipped() {
    let mut design = hierarchy_design();
    let sub = design.module_by_name("\\sub").unwrap();
    design.module_mut(sub).blackbox = true;
    let output = Compiler::new(Options::with_opt_level(0).unwrap())
        .compile(&mut design)
        .unwrap();
    // The instance field remains, typed to the (externally provided)
    // blackbox; the blackbox itself is not emitted.
    assert!(output.implementation.contains("\tp_sub cell_p_u1;\n"));
    assert!(!output.implementation.contains("struct p_sub"));
}

#[test]
fn invalid_opt_level_is_rejected() {
    assert!(matches!(
        Options::with_opt_level(6),
        Err(CompileError::InvalidOptLevel(6))
    ));
}

#[test]
fn memory_initializers_are_sorted_and_chunked() {
    let mut m = Module::new("\\top");
    let ra = m.add_input("\\ra", 2);
    let rd = m.add_output("\\rd", 4);
    m.add_memory("\\rom", 4, 4, 0);
    let read = m.add_cell("$rd$1", "$memrd");
    let conns = [
        ("ADDR", m.sig(ra)),
        ("DATA", m.sig(rd)),
        ("EN", gyre::netlist::SigSpec::from_const(Const::ones(1))),
    ];
    {
        let cell = m.cell_mut(read);
        cell.parameters.insert("MEMID".into(), Const::Str("\\rom".into()));
        cell.parameters.insert("CLK_ENABLE".into(), Const::bool(false));
        for (port, sig) in conns {
            cell.connections.insert(port.into(), sig);
        }
    }
    for (name, priority, addr, word) in
        [("$init$low", 0, 0u32, 0x5u32), ("$init$high", 1, 2, 0xau32)]
    {
        let init = m.add_cell(name, "$meminit");
        let cell = m.cell_mut(init);
        cell.parameters.insert("MEMID".into(), Const::Str("\\rom".into()));
        cell.parameters.insert("PRIORITY".into(), Const::from_int(priority, 32));
        cell.parameters.insert("WIDTH".into(), Const::from_int(4, 32));
        cell.parameters.insert("WORDS".into(), Const::from_int(1, 32));
        cell.connections
            .insert("ADDR".into(), gyre::netlist::SigSpec::from_const(Const::from_int(addr as i64, 2)));
        cell.connections
            .insert("DATA".into(), gyre::netlist::SigSpec::from_const(Const::from_int(word as i64, 4)));
    }
    let mut design = Design::new();
    design.add_module(m);
    let output = Compiler::new(Options::with_opt_level(0).unwrap())
        .compile(&mut design)
        .unwrap()
        .implementation;
    // Higher priority first; addresses in hex; words as fixed-width
    // 32-bit chunks.
    let high = output.find("memory<4>::init<1> { 0x2, {").unwrap();
    let low = output.find("memory<4>::init<1> { 0, {").unwrap();
    assert!(high < low);
    assert!(output.contains("value<4>{0x0000000au},"));
    assert!(output.contains("value<4>{0x00000005u},"));
}

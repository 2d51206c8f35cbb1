use gyre::netlist::{CaseRule, Design, Module, Process};
use gyre::{Compiler, Options, analyze_module};

/// `\b <- \a` through nothing: ports stay wires at every level.
fn wire_copy_design() -> Design {
    let mut m = Module::new("\\top");
    let a = m.add_input("\\a", 1);
    let b = m.add_output("\\b", 1);
    let (sa, sb) = (m.sig(a), m.sig(b));
    m.connect(sb, sa);
    let mut design = Design::new();
    design.add_module(m);
    design
}

/// `\b <- $t <- \a`: the internal hop elides away at -O1.
fn internal_hop_design() -> Design {
    let mut m = Module::new("\\top");
    let a = m.add_input("\\a", 1);
    let t = m.add_wire("$t", 1);
    let b = m.add_output("\\b", 1);
    let (sa, st, sb) = (m.sig(a), m.sig(t), m.sig(b));
    m.connect(st.clone(), sa);
    m.connect(sb, st);
    let mut design = Design::new();
    design.add_module(m);
    design
}

fn compile_at(mut design: Design, level: u32) -> String {
    let compiler = Compiler::new(Options::with_opt_level(level).unwrap());
    compiler.compile(&mut design).unwrap().implementation
}

#[test]
fn port_wires_are_never_elided() {
    let baseline = compile_at(wire_copy_design(), 0);
    assert!(baseline.contains("\twire<1> p_a;\n"));
    assert!(baseline.contains("\twire<1> p_b;\n"));
    assert!(baseline.contains("\t// connection\n\tp_b.next = p_a.curr;\n"));
    for level in 1..=5 {
        assert_eq!(compile_at(wire_copy_design(), level), baseline);
    }
}

#[test]
fn internal_wire_elides_at_o1() {
    let o0 = compile_at(internal_hop_design(), 0);
    assert!(o0.contains("\twire<1> i_t;\n"));
    assert!(o0.contains("\tp_b.next = i_t.curr;\n"));

    let o1 = compile_at(internal_hop_design(), 1);
    assert!(!o1.contains("i_t"));
    assert!(o1.contains("\t// connection\n\tp_b.next = p_a.curr;\n"));
}

/// Two processes reading each other's outputs: whichever order the
/// scheduler picks, exactly one wire bends backwards.
fn benign_loop_design() -> Design {
    let mut m = Module::new("\\top");
    let w1 = m.add_wire("\\w1", 1);
    let w2 = m.add_wire("\\w2", 1);
    let o = m.add_output("\\o", 1);
    let proc_a = Process {
        name: "$proc$a".into(),
        attributes: Default::default(),
        root_case: CaseRule { actions: vec![(m.sig(w1), m.sig(w2))], ..Default::default() },
        syncs: Vec::new(),
    };
    let proc_b = Process {
        name: "$proc$b".into(),
        attributes: Default::default(),
        root_case: CaseRule { actions: vec![(m.sig(w2), m.sig(w1))], ..Default::default() },
        syncs: Vec::new(),
    };
    m.add_process(proc_a);
    m.add_process(proc_b);
    let (so, sw1) = (m.sig(o), m.sig(w1));
    m.connect(so, sw1);
    let mut design = Design::new();
    design.add_module(m);
    design
}

#[test]
fn benign_loop_yields_one_feedback_wire() {
    let design = benign_loop_design();
    let (module_id, _) = design.modules().next().unwrap();
    let analysis =
        analyze_module(&design, module_id, &Options::with_opt_level(4).unwrap()).unwrap();
    assert_eq!(analysis.feedback_wires.len(), 1);
    for wire in &analysis.feedback_wires {
        assert!(!analysis.elided_wires.contains_key(wire));
        assert!(!analysis.localized_wires.contains(wire));
    }
}

#[test]
fn benign_loop_still_compiles() {
    let output = compile_at(benign_loop_design(), 4);
    assert!(output.contains("bool p_top::commit()"));
}

/// A few internal hops, a public intermediate, and a twice-read fanout
/// wire: enough material for every optimization level to bite on.
fn layered_design() -> Design {
    let mut m = Module::new("\\top");
    let a = m.add_input("\\a", 8);
    let t1 = m.add_wire("$t1", 8);
    let t2 = m.add_wire("$t2", 8);
    let mid = m.add_wire("\\mid", 8);
    let o = m.add_output("\\o", 8);
    let fan = m.add_wire("$fan", 8);
    let p = m.add_output("\\p", 8);
    let q = m.add_output("\\q", 8);
    let conns = [
        (m.sig(t1), m.sig(a)),
        (m.sig(t2), m.sig(t1)),
        (m.sig(mid), m.sig(t2)),
        (m.sig(o), m.sig(mid)),
        (m.sig(fan), m.sig(a)),
        (m.sig(p), m.sig(fan)),
        (m.sig(q), m.sig(fan)),
    ];
    for (lhs, rhs) in conns {
        m.connect(lhs, rhs);
    }
    let mut design = Design::new();
    design.add_module(m);
    design
}

#[test]
fn optimization_is_monotone() {
    let mut previous: Option<(usize, usize)> = None;
    for level in 0..=5 {
        let design = layered_design();
        let (module_id, _) = design.modules().next().unwrap();
        let analysis =
            analyze_module(&design, module_id, &Options::with_opt_level(level).unwrap()).unwrap();
        let counts = (analysis.elided_wires.len(), analysis.localized_wires.len());
        if let Some((elided, localized)) = previous {
            assert!(counts.0 >= elided, "elision shrank from {elided} to {} at -O{level}", counts.0);
            assert!(
                counts.1 >= localized,
                "localization shrank from {localized} to {} at -O{level}",
                counts.1
            );
        }
        previous = Some(counts);
    }
}

#[test]
fn elision_and_localization_are_exclusive() {
    for level in 0..=5 {
        let design = layered_design();
        let (module_id, _) = design.modules().next().unwrap();
        let analysis =
            analyze_module(&design, module_id, &Options::with_opt_level(level).unwrap()).unwrap();
        for wire in &analysis.localized_wires {
            assert!(!analysis.elided_wires.contains_key(wire));
        }
    }
}

#[test]
fn fanout_wire_localizes_but_does_not_elide() {
    let design = layered_design();
    let (module_id, _) = design.modules().next().unwrap();
    let fan = design.module(module_id).wires().find(|(_, w)| w.name == "$fan").unwrap().0;
    let analysis =
        analyze_module(&design, module_id, &Options::with_opt_level(2).unwrap()).unwrap();
    assert!(!analysis.elided_wires.contains_key(&fan));
    assert!(analysis.localized_wires.contains(&fan));
}

#[test]
fn public_wires_elide_only_at_o3() {
    let design = layered_design();
    let (module_id, _) = design.modules().next().unwrap();
    let at_o2 = analyze_module(&design, module_id, &Options::with_opt_level(2).unwrap()).unwrap();
    let mid = design.module(module_id).wires().find(|(_, w)| w.name == "\\mid").unwrap().0;
    assert!(!at_o2.elided_wires.contains_key(&mid));
    let at_o3 = analyze_module(&design, module_id, &Options::with_opt_level(3).unwrap()).unwrap();
    assert!(at_o3.elided_wires.contains_key(&mid));
}

#[test]
fn keep_attribute_blocks_elision() {
    let mut design = internal_hop_design();
    let (module_id, _) = design.modules().next().unwrap();
    let t = design
        .module(module_id)
        .wires()
        .find(|(_, w)| w.name == "$t")
        .unwrap()
        .0;
    design
        .module_mut(module_id)
        .wire_mut(t)
        .attributes
        .insert("\\keep".into(), gyre::netlist::Const::bool(true));
    let analysis =
        analyze_module(&design, module_id, &Options::with_opt_level(5).unwrap()).unwrap();
    assert!(!analysis.elided_wires.contains_key(&t));
    assert!(!analysis.localized_wires.contains(&t));
}

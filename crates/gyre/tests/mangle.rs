use gyre::{mangle_cell_name, mangle_memory_name, mangle_name};
use insta::assert_snapshot;
use proptest::prelude::*;

#[test]
fn public_and_internal_prefixes() {
    assert_snapshot!(mangle_name("\\clk"), @"p_clk");
    assert_snapshot!(mangle_name("$auto$opt.cc:123$45"), @"i_auto_24_opt_2e_cc_3a_123_24_45");
}

#[test]
fn underscores_are_doubled() {
    assert_snapshot!(mangle_name("\\wide_bus_2"), @"p_wide__bus__2");
}

#[test]
fn non_alphanumerics_become_hex_escapes() {
    assert_snapshot!(mangle_name("\\mem[3]"), @"p_mem_5b_3_5d_");
    assert_snapshot!(mangle_name("\\a.b:c"), @"p_a_2e_b_3a_c");
}

#[test]
fn category_wrappers() {
    assert_snapshot!(mangle_memory_name("\\ram"), @"memory_p_ram");
    assert_snapshot!(mangle_cell_name("$flatten\\cpu.$proc$x"), @"cell_i_flatten_5c_cpu_2e__24_proc_24_x");
}

#[test]
fn escapes_do_not_collide() {
    // `$` escapes to `_24_`; an identifier spelling that out literally
    // must stay distinct.
    assert_ne!(mangle_name("\\a$b"), mangle_name("\\a_24_b"));
    assert_ne!(mangle_name("\\a_b"), mangle_name("\\a__b"));
}

fn identifier() -> impl Strategy<Value = String> {
    let prefix = prop::sample::select(vec!['\\', '$']);
    let tail = prop::collection::vec(
        prop::sample::select("abzAZX019_.$:\\[]#|'".chars().collect::<Vec<_>>()),
        0..16,
    );
    (prefix, tail).prop_map(|(p, tail)| {
        let mut name = String::new();
        name.push(p);
        name.extend(tail);
        name
    })
}

proptest! {
    #[test]
    fn mangling_is_injective(a in identifier(), b in identifier()) {
        prop_assume!(a != b);
        prop_assert_ne!(mangle_name(&a), mangle_name(&b));
    }

    #[test]
    fn mangling_is_stable(a in identifier()) {
        prop_assert_eq!(mangle_name(&a), mangle_name(&a));
    }

    #[test]
    fn mangled_names_are_valid_identifiers(a in identifier()) {
        let mangled = mangle_name(&a);
        prop_assert!(mangled.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'));
        prop_assert!(!mangled.starts_with(|c: char| c.is_ascii_digit()));
    }
}

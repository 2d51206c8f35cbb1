//! Netlist names may contain any non-whitespace character; C++
//! identifiers may not. The mangling scheme below keeps generated names
//! readable, never collides with C++ keywords or runtime names, and is
//! injective:
//!  - public names (leading `\`) map to a `p_` prefix, internal names
//!    (leading `$`) to `i_`;
//!  - alphanumerics pass through, `_` doubles to `__`, and any other
//!    byte becomes `_` + two lowercase hex digits + `_`.
//! Memories and cells additionally get a `memory_`/`cell_` namespace
//! prefix since they share the member namespace with wires.

pub fn mangle_name(name: &str) -> String {
    let mut mangled = String::with_capacity(name.len() + 2);
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b'\\') => mangled.push_str("p_"),
        Some(b'$') => mangled.push_str("i_"),
        first => panic!("malformed netlist identifier {name:?} (first byte {first:?})"),
    }
    for byte in bytes {
        if byte.is_ascii_alphanumeric() {
            mangled.push(byte as char);
        } else if byte == b'_' {
            mangled.push_str("__");
        } else {
            mangled.push('_');
            mangled.push(char::from_digit((byte >> 4) as u32, 16).unwrap());
            mangled.push(char::from_digit((byte & 0xf) as u32, 16).unwrap());
            mangled.push('_');
        }
    }
    mangled
}

pub fn mangle_module_name(name: &str) -> String {
    // Modules live in their own (class) namespace.
    mangle_name(name)
}

pub fn mangle_wire_name(name: &str) -> String {
    mangle_name(name)
}

pub fn mangle_memory_name(name: &str) -> String {
    format!("memory_{}", mangle_name(name))
}

pub fn mangle_cell_name(name: &str) -> String {
    format!("cell_{}", mangle_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(mangle_name("\\clk"), "p_clk");
        assert_eq!(mangle_name("$and$f.v:10$1"), "i_and_24_f_2e_v_3a_10_24_1");
    }

    #[test]
    fn underscore_escape() {
        assert_eq!(mangle_name("\\a_b"), "p_a__b");
    }

    #[test]
    #[should_panic]
    fn bad_leading_byte() {
        mangle_name("clk");
    }
}

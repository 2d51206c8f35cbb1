//! Classification of internal cell types and their port directions.

pub fn is_unary_cell(ty: &str) -> bool {
    matches!(
        ty,
        "$not"
            | "$logic_not"
            | "$reduce_and"
            | "$reduce_or"
            | "$reduce_xor"
            | "$reduce_xnor"
            | "$reduce_bool"
            | "$pos"
            | "$neg"
    )
}

pub fn is_binary_cell(ty: &str) -> bool {
    matches!(
        ty,
        "$and"
            | "$or"
            | "$xor"
            | "$xnor"
            | "$logic_and"
            | "$logic_or"
            | "$shl"
            | "$sshl"
            | "$shr"
            | "$sshr"
            | "$shift"
            | "$shiftx"
            | "$eq"
            | "$ne"
            | "$eqx"
            | "$nex"
            | "$gt"
            | "$ge"
            | "$lt"
            | "$le"
            | "$add"
            | "$sub"
            | "$mul"
            | "$div"
            | "$mod"
    )
}

/// Combinational cells whose single output can be folded into the
/// expression at its use site.
pub fn is_elidable_cell(ty: &str) -> bool {
    is_unary_cell(ty) || is_binary_cell(ty) || matches!(ty, "$mux" | "$concat" | "$slice")
}

/// Flip-flops whose output updates only on a clock edge.
pub fn is_sync_ff_cell(ty: &str) -> bool {
    matches!(ty, "$dff" | "$dffe")
}

pub fn is_ff_cell(ty: &str) -> bool {
    is_sync_ff_cell(ty) || matches!(ty, "$adff" | "$dffsr" | "$dlatch" | "$dlatchsr" | "$sr")
}

pub fn is_mem_port_cell(ty: &str) -> bool {
    matches!(ty, "$memrd" | "$memwr")
}

/// Internal cells are `$`-prefixed, except parametrized user modules.
pub fn is_internal_cell(ty: &str) -> bool {
    ty.starts_with('$') && !ty.starts_with("$paramod")
}

/// Internal cell types this backend understands.
pub fn is_known_internal_cell(ty: &str) -> bool {
    is_elidable_cell(ty)
        || is_ff_cell(ty)
        || is_mem_port_cell(ty)
        || matches!(ty, "$pmux" | "$meminit" | "$mem")
}

pub fn internal_cell_input(ty: &str, port: &str) -> bool {
    match port {
        "A" => is_elidable_cell(ty) || ty == "$pmux",
        "B" => is_binary_cell(ty) || matches!(ty, "$mux" | "$pmux" | "$concat"),
        "S" => matches!(ty, "$mux" | "$pmux"),
        "D" => is_ff_cell(ty),
        "CLK" => is_ff_cell(ty) || is_mem_port_cell(ty),
        "EN" => is_ff_cell(ty) || is_mem_port_cell(ty),
        "ARST" | "SET" | "CLR" => is_ff_cell(ty),
        "ADDR" => is_mem_port_cell(ty) || ty == "$meminit",
        "DATA" => matches!(ty, "$memwr" | "$meminit"),
        _ => false,
    }
}

pub fn internal_cell_output(ty: &str, port: &str) -> bool {
    match port {
        "Y" => is_elidable_cell(ty) || ty == "$pmux",
        "Q" => is_ff_cell(ty),
        "DATA" => ty == "$memrd",
        _ => false,
    }
}

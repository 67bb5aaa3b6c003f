use wardc::ast::{
    AssignOp, Effect, IterateAssign, IterateRound, IterateStmt, JumpKeyword, Stmt, StmtKind,
};
use wardc::compile::CompileErrorKind;
use wardc::program::FuncDef;
use wardc::types::TypeExpr;

mod common;
use common::*;

fn bump() -> Stmt {
    assign(AssignOp::PlusEq, local("n", u32t()), num(1))
}

fn round(length: u32, advance: u32, unroll: u32, body: Vec<Stmt>) -> IterateRound {
    IterateRound {
        length,
        advance,
        unroll,
        body,
    }
}

fn iterate(names: &[&str], rounds: Vec<IterateRound>) -> Stmt {
    stmt(StmtKind::Iterate(IterateStmt {
        id: 1,
        assigns: names
            .iter()
            .map(|n| IterateAssign {
                name: n.to_string(),
                rhs: args_field(n, TypeExpr::slice_u8()),
            })
            .collect(),
        rounds,
    }))
}

fn hasher(body: Vec<Stmt>) -> FuncDef {
    func(
        "decoder",
        "update",
        Effect::Impure,
        vec![
            param("p", TypeExpr::slice_u8()),
            param("q", TypeExpr::slice_u8()),
        ],
        body,
    )
}

#[test]
fn fixed_width_round_then_byte_tail() {
    let it = iterate(
        &["p"],
        vec![round(4, 4, 1, vec![bump()]), round(1, 1, 1, vec![bump()])],
    );
    let out = lower(hasher(vec![it]), Vec::new()).expect("lower");
    assert_eq!(
        normalize(&out),
        vec![
            "{",
            "ward_base__slice_u8 i_slice_p = a_p;",
            "v_p.ptr = i_slice_p.ptr;",
            "v_p.len = 4;",
            "const uint8_t* i_end0_p = ward_private_impl__ptr_u8_plus_len(v_p.ptr, (((i_slice_p.len - (size_t)(v_p.ptr - i_slice_p.ptr)) / 4) * 4));",
            "while (v_p.ptr < i_end0_p) {",
            "v_n += 1u;",
            "v_p.ptr += 4;",
            "}",
            "v_p.len = 1;",
            "const uint8_t* i_end1_p = ward_private_impl__ptr_u8_plus_len(i_slice_p.ptr, i_slice_p.len);",
            "while (v_p.ptr < i_end1_p) {",
            "v_n += 1u;",
            "v_p.ptr += 1;",
            "}",
            "v_p.len = 0;",
            "}",
        ]
    );
}

#[test]
fn unrolled_round_is_followed_by_a_single_step_round() {
    let it = iterate(&["p"], vec![round(8, 8, 2, vec![bump()])]);
    let out = lower(hasher(vec![it]), Vec::new()).expect("lower");
    assert_lines(
        &out,
        &[
            "v_p.len = 8;",
            "const uint8_t* i_end0_p = ward_private_impl__ptr_u8_plus_len(v_p.ptr, (((i_slice_p.len - (size_t)(v_p.ptr - i_slice_p.ptr)) / 16) * 16));",
            "while (v_p.ptr < i_end0_p) {",
            "v_n += 1u;",
            "v_p.ptr += 8;",
            "v_n += 1u;",
            "v_p.ptr += 8;",
            "}",
            "v_p.len = 8;",
            "const uint8_t* i_end1_p = ward_private_impl__ptr_u8_plus_len(v_p.ptr, (((i_slice_p.len - (size_t)(v_p.ptr - i_slice_p.ptr)) / 8) * 8));",
        ],
    );
}

#[test]
fn overlapping_windows_use_the_total_advance_helper() {
    let it = iterate(&["p"], vec![round(8, 4, 1, vec![bump()])]);
    let out = lower(hasher(vec![it]), Vec::new()).expect("lower");
    assert_lines(
        &out,
        &[
            "const uint8_t* i_end0_p = ward_private_impl__ptr_u8_plus_len(v_p.ptr, ward_private_impl__iterate_total_advance((i_slice_p.len - (size_t)(v_p.ptr - i_slice_p.ptr)), 8, 4));",
            "while (v_p.ptr < i_end0_p) {",
            "v_n += 1u;",
            "v_p.ptr += 4;",
            "}",
        ],
    );
}

#[test]
fn parallel_slices_are_clamped_to_the_shortest() {
    let it = iterate(&["p", "q"], vec![round(1, 1, 1, vec![bump()])]);
    let out = lower(hasher(vec![it]), Vec::new()).expect("lower");
    assert_lines(
        &out,
        &[
            "ward_base__slice_u8 i_slice_p = a_p;",
            "v_p.ptr = i_slice_p.ptr;",
            "ward_base__slice_u8 i_slice_q = a_q;",
            "v_q.ptr = i_slice_q.ptr;",
            "i_slice_p.len = ((size_t)(ward_base__u64__min(i_slice_p.len, i_slice_q.len)));",
            "v_p.len = 1;",
            "v_q.len = 1;",
        ],
    );
    assert_lines(&out, &["v_p.ptr += 1;", "v_q.ptr += 1;", "}", "v_p.len = 0;", "v_q.len = 0;"]);
}

#[test]
fn break_of_the_iterate_itself_is_native() {
    let it = iterate(&["p"], vec![round(1, 1, 1, vec![jump(JumpKeyword::Break, 1)])]);
    let out = lower(hasher(vec![it]), Vec::new()).expect("lower");
    assert_lines(&out, &["while (v_p.ptr < i_end0_p) {", "break;", "v_p.ptr += 1;", "}"]);
}

#[test]
fn break_out_of_an_iterate_from_a_nested_loop_is_rejected() {
    let inner = while_(2, const_true(), vec![jump(JumpKeyword::Break, 1)]);
    let it = iterate(&["p"], vec![round(1, 1, 1, vec![inner])]);
    let err = lower(hasher(vec![it]), Vec::new()).expect_err("deep iterate break");
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
}

#[test]
fn zero_sized_round_is_rejected() {
    let it = iterate(&["p"], vec![round(4, 0, 1, vec![bump()])]);
    let err = lower(hasher(vec![it]), Vec::new()).expect_err("advance 0");
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
}

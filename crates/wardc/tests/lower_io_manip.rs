use wardc::ast::{Effect, IoManipKeyword, IoManipStmt, Stmt, StmtKind};
use wardc::compile::{CompileErrorKind, CompileOptions};
use wardc::facts::FactStore;
use wardc::language::limits::Limits;
use wardc::types::TypeExpr;

mod common;
use common::*;

fn manip(keyword: IoManipKeyword, io: wardc::ast::Expr, arg1: Option<wardc::ast::Expr>, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::IoManip(IoManipStmt {
        keyword,
        io,
        arg1,
        history_position: None,
        body,
    }))
}

fn read_u8() -> Stmt {
    set(local("b", u8t()), io_q(src(), "read_u8", u8t()))
}

fn codec(body: Vec<Stmt>) -> wardc::program::FuncDef {
    func(
        "decoder",
        "transform",
        Effect::Coroutine,
        vec![
            param("src", TypeExpr::IoReader),
            param("dst", TypeExpr::IoWriter),
            param("data", TypeExpr::slice_u8()),
        ],
        body,
    )
}

#[test]
fn reader_limit_narrows_and_restores_the_window() {
    let f = codec(vec![manip(IoManipKeyword::Limit, src(), Some(num(3)), Vec::new())]);
    let out = lower(f, Vec::new()).expect("lower");
    assert_eq!(
        normalize(&out),
        vec![
            "{",
            "const bool o_0_closed_a_src = a_src && a_src->meta.closed;",
            "const uint8_t* o_0_io2_a_src = io2_a_src;",
            "ward_private_impl__io_reader__limit(&io2_a_src, iop_a_src, 3u);",
            "if (a_src) {",
            "size_t n = ((size_t)(io2_a_src - a_src->data.ptr));",
            "a_src->meta.closed = a_src->meta.closed && (a_src->meta.wi <= n);",
            "a_src->meta.wi = n;",
            "}",
            "io2_a_src = o_0_io2_a_src;",
            "if (a_src) {",
            "a_src->meta.closed = o_0_closed_a_src;",
            "a_src->meta.wi = ((size_t)(io2_a_src - a_src->data.ptr));",
            "}",
            "}",
        ]
    );
}

#[test]
fn writer_limit_moves_the_buffer_length() {
    let f = codec(vec![manip(IoManipKeyword::Limit, dst(), Some(num(8)), Vec::new())]);
    let out = lower(f, Vec::new()).expect("lower");
    assert_eq!(
        normalize(&out),
        vec![
            "{",
            "uint8_t* o_0_io2_a_dst = io2_a_dst;",
            "ward_private_impl__io_writer__limit(&io2_a_dst, iop_a_dst, 8u);",
            "if (a_dst) {",
            "size_t n = ((size_t)(io2_a_dst - a_dst->data.ptr));",
            "a_dst->data.len = n;",
            "}",
            "io2_a_dst = o_0_io2_a_dst;",
            "if (a_dst) {",
            "a_dst->data.len = ((size_t)(io2_a_dst - a_dst->data.ptr));",
            "}",
            "}",
        ]
    );
}

#[test]
fn facts_about_the_limited_buffer_do_not_enter_the_block() {
    let f = codec(vec![manip(
        IoManipKeyword::Limit,
        src(),
        Some(num(3)),
        vec![read_u8()],
    )]);
    let out = lower(f, vec![len_ge(src(), 4)]).expect("lower");
    assert_lines(
        &out,
        &[
            "WARD_BASE__COROUTINE_SUSPENSION_POINT(1);",
            "if (WARD_BASE__UNLIKELY(((uint64_t)(io2_a_src - iop_a_src)) < 1u)) {",
        ],
    );
}

#[test]
fn bind_points_a_local_reader_at_a_slice() {
    let r = local("r", TypeExpr::IoReader);
    let f = codec(vec![
        var("r", TypeExpr::IoReader),
        manip(
            IoManipKeyword::Bind,
            r,
            Some(args_field("data", TypeExpr::slice_u8())),
            Vec::new(),
        ),
    ]);
    let out = lower(f, Vec::new()).expect("lower");
    assert_eq!(
        normalize(&out),
        vec![
            "{",
            "ward_base__io_buffer* o_0_v_r = v_r;",
            "const uint8_t* o_0_iop_v_r = iop_v_r;",
            "const uint8_t* o_0_io0_v_r = io0_v_r;",
            "const uint8_t* o_0_io1_v_r = io1_v_r;",
            "const uint8_t* o_0_io2_v_r = io2_v_r;",
            "v_r = ward_private_impl__io_reader__set(&u_r, &iop_v_r, &io0_v_r, &io1_v_r, &io2_v_r, a_data, 0u);",
            "v_r = o_0_v_r;",
            "iop_v_r = o_0_iop_v_r;",
            "io0_v_r = o_0_io0_v_r;",
            "io1_v_r = o_0_io1_v_r;",
            "io2_v_r = o_0_io2_v_r;",
            "}",
        ]
    );
}

#[test]
fn bind_of_an_argument_is_rejected() {
    let f = codec(vec![manip(
        IoManipKeyword::Bind,
        src(),
        Some(args_field("data", TypeExpr::slice_u8())),
        Vec::new(),
    )]);
    let err = lower(f, Vec::new()).expect_err("bind args.src");
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
}

#[test]
fn writer_forget_history_rebases_the_buffer() {
    let f = codec(vec![manip(IoManipKeyword::ForgetHistory, dst(), None, Vec::new())]);
    let out = lower(f, Vec::new()).expect("lower");
    assert_eq!(
        normalize(&out),
        vec![
            "{",
            "uint8_t* o_0_io0_a_dst = io0_a_dst;",
            "uint8_t* o_0_io1_a_dst = io1_a_dst;",
            "io0_a_dst = iop_a_dst;",
            "io1_a_dst = iop_a_dst;",
            "ward_base__io_buffer o_0_a_dst;",
            "if (a_dst) {",
            "memcpy(&o_0_a_dst, a_dst, sizeof(*a_dst));",
            "size_t wi0 = a_dst->meta.wi;",
            "a_dst->data.ptr += wi0;",
            "a_dst->data.len -= wi0;",
            "a_dst->meta.ri = 0;",
            "a_dst->meta.wi = 0;",
            "a_dst->meta.pos = ward_base__u64__sat_add(a_dst->meta.pos, wi0);",
            "}",
            "if (a_dst) {",
            "memcpy(a_dst, &o_0_a_dst, sizeof(*a_dst));",
            "a_dst->meta.wi = ((size_t)(iop_a_dst - a_dst->data.ptr));",
            "io0_a_dst = o_0_io0_a_dst;",
            "io1_a_dst = o_0_io1_a_dst;",
            "}",
            "}",
        ]
    );
}

#[test]
fn reader_forget_history_is_rejected() {
    let f = codec(vec![manip(IoManipKeyword::ForgetHistory, src(), None, Vec::new())]);
    let err = lower(f, Vec::new()).expect_err("reader forget_history");
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
}

#[test]
fn blocks_are_numbered_within_the_function() {
    let f = codec(vec![
        manip(IoManipKeyword::Limit, src(), Some(num(3)), Vec::new()),
        manip(IoManipKeyword::Limit, src(), Some(num(2)), Vec::new()),
    ]);
    let out = lower(f, Vec::new()).expect("lower");
    assert_lines(&out, &["const bool o_1_closed_a_src = a_src && a_src->meta.closed;"]);

    let pkg = package(vec![codec(Vec::new())]);
    let f = codec(vec![
        manip(IoManipKeyword::Limit, src(), Some(num(3)), Vec::new()),
        manip(IoManipKeyword::Limit, src(), Some(num(2)), Vec::new()),
    ]);
    let options = CompileOptions {
        limits: Limits {
            max_io_manips: 1,
            ..Limits::default()
        },
        ..CompileOptions::default()
    };
    let err = lower_with(&pkg, &f, FactStore::new(), &options).expect_err("io manip budget");
    assert_eq!(err.kind, CompileErrorKind::Budget);
    assert_eq!(err.message.matches("(fn=").count(), 1, "{}", err.message);
}

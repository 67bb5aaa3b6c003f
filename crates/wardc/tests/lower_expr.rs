use wardc::ast::{BinaryOp, Effect, Expr, ExprKind, Name, UnaryOp};
use wardc::c_emit::emit_expr;
use wardc::compile::{CompileErrorKind, CompileOptions, CompilerError};
use wardc::language::limits::Limits;
use wardc::types::{NumType, TypeExpr};

mod common;
use common::*;

fn render(e: &Expr) -> Result<String, CompilerError> {
    render_in(&decode(Vec::new()), e)
}

fn render_in(f: &wardc::program::FuncDef, e: &Expr) -> Result<String, CompilerError> {
    let pkg = package(vec![f.clone()]);
    emit_expr(&pkg, Some(f), e, &CompileOptions::default())
}

#[test]
fn constants_render_unsigned_unless_negative() {
    assert_eq!(render(&Expr::number(4, u32t())).expect("render"), "4u");
    assert_eq!(
        render(&Expr::number(-3, TypeExpr::Num(NumType::I32))).expect("render"),
        "-3"
    );
    let folded = binary(BinaryOp::Plus, num(2), num(2), TypeExpr::Ideal).with_const(4);
    assert_eq!(render(&folded).expect("render"), "4u");
    assert_eq!(render(&const_true()).expect("render"), "true");
}

#[test]
fn small_integer_arithmetic_is_cast_back() {
    let e = binary(BinaryOp::Plus, local("a", u8t()), local("b", u8t()), u8t());
    assert_eq!(render(&e).expect("render"), "((uint8_t)((v_a + v_b)))");

    let e = binary(BinaryOp::Plus, local("a", u32t()), local("b", u32t()), u32t());
    assert_eq!(render(&e).expect("render"), "(v_a + v_b)");

    let e = binary(BinaryOp::ModPlus, local("a", u32t()), local("b", u32t()), u32t());
    assert_eq!(render(&e).expect("render"), "((uint32_t)((v_a + v_b)))");
}

#[test]
fn constant_shift_operand_takes_the_result_type() {
    let e = binary(BinaryOp::ShiftL, num(1), local("n", u32t()), u32t());
    assert_eq!(render(&e).expect("render"), "(((uint32_t)(1u)) << v_n)");
}

#[test]
fn saturating_ops_call_helpers() {
    let e = binary(BinaryOp::SatPlus, local("a", u8t()), local("b", u8t()), u8t());
    assert_eq!(render(&e).expect("render"), "ward_base__u8__sat_add(v_a, v_b)");
    let e = binary(BinaryOp::SatMinus, local("a", u64t()), num(1), u64t());
    assert_eq!(render(&e).expect("render"), "ward_base__u64__sat_sub(v_a, 1u)");

    let signed = TypeExpr::Num(NumType::I32);
    let e = binary(BinaryOp::SatPlus, local("a", signed.clone()), local("b", signed.clone()), signed);
    let err = render(&e).expect_err("signed saturating add");
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
}

#[test]
fn status_comparisons_use_message_pointers() {
    let st = local("st", TypeExpr::Status);
    let e = cmp(BinaryOp::EqEq, st.clone(), status("#bad header"));
    assert_eq!(
        render(&e).expect("render"),
        "(v_st.repr == ward_demo__error__bad_header)"
    );

    let ok = Expr::new(
        ExprKind::Literal(wardc::ast::Literal::Ok),
        TypeExpr::Status,
    );
    let e = cmp(BinaryOp::NotEq, st, ok);
    assert_eq!(render(&e).expect("render"), "(v_st.repr != NULL)");
}

#[test]
fn unknown_local_status_is_rejected() {
    let err = render(&status("#no such thing")).expect_err("undeclared status");
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
    assert_eq!(
        render(&base_status("$short read")).expect("render"),
        "ward_base__make_status(ward_base__suspension__short_read)"
    );
}

#[test]
fn members_route_to_their_storage_area() {
    assert_eq!(
        render(&this_field("decoder", "x", u32t())).expect("render"),
        "self->private_impl.f_x"
    );
    let history = TypeExpr::Array {
        len: 32,
        elem: Box::new(u8t()),
        read_only: false,
    };
    assert_eq!(
        render(&this_field("decoder", "history", history)).expect("render"),
        "self->private_data.f_history"
    );
    assert_eq!(render(&args_field("n", u32t())).expect("render"), "a_n");
}

#[test]
fn user_method_call_passes_receiver_pointer() {
    let e = call(
        this("decoder"),
        "take",
        vec![("n", num(4))],
        TypeExpr::Status,
        Effect::Impure,
    );
    assert_eq!(render(&e).expect("render"), "ward_demo__decoder__take(self, 4u)");
}

#[test]
fn io_queries_read_window_pointers() {
    assert_eq!(
        render(&length(src())).expect("render"),
        "((uint64_t)(io2_a_src - iop_a_src))"
    );
    let pos = call(src(), "position", Vec::new(), u64t(), Effect::Pure);
    assert_eq!(
        render(&pos).expect("render"),
        "ward_private_impl__io_reader__position(a_src, iop_a_src)"
    );
    let peek = call(src(), "peek_u16le", Vec::new(), TypeExpr::Num(NumType::U16), Effect::Pure);
    assert_eq!(
        render(&peek).expect("render"),
        "ward_base__peek_u16le__no_bounds_check(iop_a_src)"
    );
}

#[test]
fn suspending_io_builtin_cannot_be_a_sub_expression() {
    let e = binary(
        BinaryOp::Plus,
        io_q(src(), "read_u32le", u32t()),
        num(1),
        u32t(),
    );
    let err = render(&e).expect_err("nested read");
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
}

#[test]
fn coroutine_resumed_depends_on_the_function() {
    let e = Expr::new(ExprKind::Ident(Name::CoroutineResumed), TypeExpr::Bool);
    assert_eq!(render(&e).expect("render"), "(self->private_impl.p_decode != 0)");

    let plain = func("decoder", "reset_state", Effect::Impure, Vec::new(), Vec::new());
    assert_eq!(render_in(&plain, &e).expect("render"), "false");
}

#[test]
fn casts_drop_masks_implied_by_the_target() {
    let masked = binary(BinaryOp::Amp, local("x", u64t()), num(0xFF), u64t());
    let e = Expr::new(
        ExprKind::Cast {
            lhs: Box::new(masked),
            target: u8t(),
        },
        u8t(),
    );
    assert_eq!(render(&e).expect("render"), "((uint8_t)(v_x))");
}

#[test]
fn unary_and_numeric_builtins() {
    let not = Expr::new(
        ExprKind::Unary {
            op: UnaryOp::Not,
            rhs: Box::new(local("b", TypeExpr::Bool)),
        },
        TypeExpr::Bool,
    );
    assert_eq!(render(&not).expect("render"), "(!v_b)");

    let min = call(
        local("x", u32t()),
        "min",
        vec![("no_more_than", local("y", u32t()))],
        u32t(),
        Effect::Pure,
    );
    assert_eq!(render(&min).expect("render"), "ward_base__u32__min(v_x, v_y)");

    let len = length(local("s", TypeExpr::slice_u8()));
    assert_eq!(render(&len).expect("render"), "((uint64_t)(v_s.len))");
}

#[test]
fn expression_depth_is_bounded() {
    let mut e = local("b", TypeExpr::Bool);
    for _ in 0..8 {
        e = Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Not,
                rhs: Box::new(e),
            },
            TypeExpr::Bool,
        );
    }
    let f = decode(Vec::new());
    let pkg = package(vec![f.clone()]);
    let options = CompileOptions {
        limits: Limits {
            max_expr_depth: 2,
            ..Limits::default()
        },
        ..CompileOptions::default()
    };
    let err = emit_expr(&pkg, Some(&f), &e, &options).expect_err("too deep");
    assert_eq!(err.kind, CompileErrorKind::Budget);
}

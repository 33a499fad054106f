use std::collections::HashMap;
use std::error::Error as _;

use navxpath::ast::{ArithOp, Axis, Expr, NodeTest, Step};
use navxpath::simple_node::{attr, doc, elem};
use navxpath::{
    AtomicValue, DynamicContextBuilder, Error, ErrorCode, ExpandedName, QName, SimpleNavigator, StaticContext,
    StaticContextBuilder, compile,
};
use rstest::{fixture, rstest};

type N = SimpleNavigator;

#[fixture]
fn tree() -> N {
    doc().child(elem("root").child(elem("a").attr(attr("id", "a1")))).build()
}

fn compile_err(expr: &Expr) -> Error {
    match compile(expr, &StaticContext::<N>::default()) {
        Ok(_) => panic!("expected a static error"),
        Err(e) => e,
    }
}

fn eval_err(expr: &Expr, node: Option<&N>) -> Error {
    let c = compile(expr, &StaticContext::<N>::default()).unwrap();
    let mut d = DynamicContextBuilder::new();
    if let Some(n) = node {
        d = d.with_context_node(n.clone());
    }
    c.evaluate(&d.build()).unwrap_err()
}

#[rstest]
#[case::unbound_variable(Expr::var("nope"), ErrorCode::XPST0008)]
#[case::unknown_function(Expr::call("nope", vec![]), ErrorCode::XPST0017)]
#[case::unknown_prefix_in_name_test(Expr::relative(vec![Step::new(Axis::Child, NodeTest::prefixed("q", "a"))]), ErrorCode::XPST0081)]
#[case::unknown_prefix_in_function(Expr::FunctionCall { name: QName::prefixed("q", "f"), args: vec![] }, ErrorCode::XPST0081)]
#[case::variable_out_of_scope(
    Expr::seq(vec![Expr::for_in("x", Expr::int(1), Expr::var("x")), Expr::var("x")]),
    ErrorCode::XPST0008
)]
fn static_errors(#[case] expr: Expr, #[case] code: ErrorCode) {
    let e = compile_err(&expr);
    assert_eq!(e.code_enum(), code);
    assert!(e.is_static());
}

#[rstest]
fn wrong_arity_lists_the_available_ones() {
    let e = compile_err(&Expr::call("count", vec![]));
    assert_eq!(e.code_enum(), ErrorCode::XPST0017);
    assert!(e.message.contains("available arities: 1"), "{}", e.message);

    let e = compile_err(&Expr::call("string", vec![Expr::int(1), Expr::int(2)]));
    assert!(e.message.contains("0, 1"), "{}", e.message);
}

#[rstest]
fn missing_context_item() {
    let e = eval_err(&Expr::relative(vec![Step::child("a")]), None);
    assert_eq!(e.code_enum(), ErrorCode::XPDY0002);
    let e = eval_err(&Expr::root(vec![Step::child("a")]), None);
    assert_eq!(e.code_enum(), ErrorCode::XPDY0002);
}

#[rstest]
fn missing_external_variable_value() {
    let ctx = StaticContextBuilder::<N>::new().with_variable(ExpandedName::local("v")).build();
    let c = compile(&Expr::var("v"), &ctx).unwrap();
    let e = c.create_pool(&HashMap::new()).unwrap_err();
    assert_eq!(e.code_enum(), ErrorCode::XPDY0002);
    let e = c.evaluate(&DynamicContextBuilder::new().build()).unwrap_err();
    assert_eq!(e.code_enum(), ErrorCode::XPDY0002);
}

#[rstest]
fn atomic_path_start_is_rejected(tree: N) {
    let e = Expr::seq(vec![Expr::int(1), Expr::int(2)]).path_from(vec![Step::child("a")]);
    assert_eq!(eval_err(&e, Some(&tree)).code_enum(), ErrorCode::XPTY0019);
}

#[rstest]
fn atomic_intermediate_step_is_rejected(tree: N) {
    // /root/(1)/a
    let e = Expr::root(vec![Step::child("root"), Step::expr(Expr::int(1)), Step::child("a")]);
    assert_eq!(eval_err(&e, Some(&tree)).code_enum(), ErrorCode::XPTY0019);
}

#[rstest]
fn axis_needs_a_node() {
    let c = compile(&Expr::relative(vec![Step::child("a")]), &StaticContext::<N>::default()).unwrap();
    let e = c
        .evaluate(&DynamicContextBuilder::new().with_context_item(AtomicValue::String("x".into())).build())
        .unwrap_err();
    assert_eq!(e.code_enum(), ErrorCode::XPTY0020);
    assert!(e.message.contains("child"));
}

#[rstest]
#[case::division_by_zero(Expr::arith(Expr::int(1), ArithOp::IDiv, Expr::int(0)), ErrorCode::FOAR0001)]
#[case::decimal_division_by_zero(Expr::arith(Expr::decimal(1.5), ArithOp::Div, Expr::int(0)), ErrorCode::FOAR0001)]
#[case::overflow(Expr::arith(Expr::int(i64::MAX), ArithOp::Add, Expr::int(1)), ErrorCode::FOAR0002)]
#[case::negation_overflow(Expr::neg(Expr::int(i64::MIN)), ErrorCode::FOAR0002)]
#[case::duration_negation_overflow(Expr::neg(Expr::typed(AtomicValue::YearMonthDuration(i32::MIN))), ErrorCode::FOAR0002)]
#[case::day_time_negation_overflow(Expr::neg(Expr::typed(AtomicValue::DayTimeDuration(i64::MIN))), ErrorCode::FOAR0002)]
fn arithmetic_errors_surface_as_type_errors(#[case] expr: Expr, #[case] cause: ErrorCode) {
    let e = eval_err(&expr, None);
    assert_eq!(e.code_enum(), ErrorCode::XPTY0004);
    assert!(e.message.contains("arithmetic operation failed"), "{}", e.message);
    assert_eq!(e.source_code(), Some(cause));
    assert!(e.source().is_some());
}

#[rstest]
fn double_division_by_zero_is_infinite() {
    let c = compile(&Expr::arith(Expr::double(1.0), ArithOp::Div, Expr::int(0)), &StaticContext::<N>::default())
        .unwrap();
    let out = c.evaluate(&DynamicContextBuilder::new().build()).unwrap();
    assert_eq!(out, vec![navxpath::Item::Atomic(AtomicValue::Double(f64::INFINITY))]);
}

#[rstest]
fn untyped_value_that_is_not_a_number(tree: N) {
    // /root/a/@id + 1
    let e = Expr::arith(
        Expr::root(vec![Step::child("root"), Step::child("a"), Step::attribute("id")]),
        ArithOp::Add,
        Expr::int(1),
    );
    assert_eq!(eval_err(&e, Some(&tree)).code_enum(), ErrorCode::FORG0001);
}

#[rstest]
fn ebv_of_several_atomics(tree: N) {
    let e = Expr::if_then_else(Expr::seq(vec![Expr::int(1), Expr::int(2)]), Expr::int(1), Expr::int(2));
    assert_eq!(eval_err(&e, Some(&tree)).code_enum(), ErrorCode::FORG0006);
}

#[rstest]
fn operand_with_several_items() {
    let e = Expr::arith(Expr::seq(vec![Expr::int(1), Expr::int(2)]), ArithOp::Add, Expr::int(1));
    assert_eq!(eval_err(&e, None).code_enum(), ErrorCode::XPTY0004);
}

#[rstest]
fn codes_round_trip_and_render() {
    for c in [ErrorCode::FOAR0001, ErrorCode::XPTY0018, ErrorCode::XPST0081, ErrorCode::XPDY0002] {
        assert_eq!(ErrorCode::from_code(c.as_str()), c);
    }
    assert_eq!(ErrorCode::from_code("err:NOPE0000"), ErrorCode::Unknown);
    let e = Error::format(ErrorCode::XPST0008, &[&"v"]);
    assert_eq!(e.to_string(), "error: variable $v is not declared (err:XPST0008)");
}

#[rstest]
fn only_the_codepoint_collation_is_supported() {
    let ctx = StaticContextBuilder::<N>::new().with_default_collation("http://example.com/collation/fuzzy").build();
    let e = compile(&Expr::int(1), &ctx).err().unwrap();
    assert_eq!(e.code_enum(), ErrorCode::FOCH0002);
    assert!(e.message.contains("fuzzy"), "{}", e.message);

    let ctx = StaticContextBuilder::<N>::new().with_default_collation(navxpath::consts::CODEPOINT_URI).build();
    assert!(compile(&Expr::int(1), &ctx).is_ok());
}

#[rstest]
fn failure_while_counting_the_group_reaches_last() {
    // (for $i in (1, 0) return 10 idiv $i)[for $z in 1 return last()]
    let source = Expr::for_in(
        "i",
        Expr::seq(vec![Expr::int(1), Expr::int(0)]),
        Expr::arith(Expr::int(10), ArithOp::IDiv, Expr::var("i")),
    );
    let e = Expr::filter(source, vec![Expr::for_in("z", Expr::int(1), Expr::call("last", vec![]))]);
    let e = eval_err(&e, None);
    assert_eq!(e.code_enum(), ErrorCode::XPTY0004);
    assert_eq!(e.source_code(), Some(ErrorCode::FOAR0001));
}

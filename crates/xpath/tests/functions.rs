use std::sync::Arc;

use chrono::NaiveDate;
use navxpath::ast::{ArithOp, Axis, CompOp, Expr, NodeTest, QName, Step};
use navxpath::simple_node::{attr, doc, elem, ns, text};
use navxpath::{
    AtomicValue, DynamicContextBuilder, FunctionRegistry, Item, SimpleNavigator, StaticContext, StaticContextBuilder,
    Value, XPathResultType, compile, functions::core_functions,
};
use rstest::{fixture, rstest};

type N = SimpleNavigator;

#[fixture]
fn tree() -> N {
    doc()
        .child(
            elem("root")
                .namespace(ns("p", "urn:p"))
                .child(elem("p:item").attr(attr("qty", "3")).child(text("alpha")))
                .child(elem("p:item").attr(attr("qty", "4")).child(text("beta"))),
        )
        .build()
}

fn run(expr: &Expr, ctx: &StaticContext<N>, node: Option<&N>) -> Vec<Item<N>> {
    let c = compile(expr, ctx).unwrap();
    let mut d = DynamicContextBuilder::new();
    if let Some(n) = node {
        d = d.with_context_node(n.clone());
    }
    c.evaluate(&d.build()).unwrap()
}

fn single(expr: &Expr, node: Option<&N>) -> AtomicValue {
    let out = run(expr, &StaticContext::default(), node);
    assert_eq!(out.len(), 1, "expected one item");
    out[0].as_atomic().cloned().unwrap()
}

fn items() -> Expr {
    Expr::root(vec![Step::child("root"), Step::new(Axis::Child, NodeTest::wildcard())])
}

#[rstest]
fn count_and_sum(tree: N) {
    assert_eq!(single(&Expr::call("count", vec![items()]), Some(&tree)), AtomicValue::Integer(2));
    let qty = Expr::root(vec![
        Step::child("root"),
        Step::new(Axis::Child, NodeTest::wildcard()),
        Step::attribute("qty"),
    ]);
    assert_eq!(single(&Expr::call("sum", vec![qty]), Some(&tree)), AtomicValue::Double(7.0));
    assert_eq!(single(&Expr::call("sum", vec![Expr::empty()]), None), AtomicValue::Integer(0));
    assert_eq!(
        single(&Expr::call("sum", vec![Expr::seq(vec![Expr::int(1), Expr::int(2), Expr::int(3)])]), None),
        AtomicValue::Integer(6)
    );
}

#[rstest]
#[case::concat(
    Expr::call("concat", vec![Expr::string("a"), Expr::int(1), Expr::empty()]),
    AtomicValue::String("a1".into())
)]
#[case::string_length(Expr::call("string-length", vec![Expr::string("héllo")]), AtomicValue::Integer(5))]
#[case::string_of_number(Expr::call("string", vec![Expr::int(42)]), AtomicValue::String("42".into()))]
#[case::number_of_string(Expr::call("number", vec![Expr::string("2.5")]), AtomicValue::Double(2.5))]
#[case::not(Expr::call("not", vec![Expr::empty()]), AtomicValue::Boolean(true))]
#[case::exists(Expr::call("exists", vec![Expr::int(0)]), AtomicValue::Boolean(true))]
#[case::empty(Expr::call("empty", vec![Expr::empty()]), AtomicValue::Boolean(true))]
#[case::boolean_of_zero(Expr::call("boolean", vec![Expr::int(0)]), AtomicValue::Boolean(false))]
#[case::boolean_of_string(Expr::call("boolean", vec![Expr::string("x")]), AtomicValue::Boolean(true))]
fn core_library(#[case] expr: Expr, #[case] expected: AtomicValue) {
    assert_eq!(single(&expr, None), expected);
}

#[rstest]
fn number_of_garbage_is_nan() {
    match single(&Expr::call("number", vec![Expr::string("x")]), None) {
        AtomicValue::Double(d) => assert!(d.is_nan()),
        other => panic!("unexpected {other:?}"),
    }
}

#[rstest]
fn names_keep_the_lexical_prefix(tree: N) {
    let first = Expr::filter(items(), vec![Expr::int(1)]);
    assert_eq!(single(&Expr::call("name", vec![first.clone()]), Some(&tree)), AtomicValue::String("p:item".into()));
    assert_eq!(single(&Expr::call("local-name", vec![first]), Some(&tree)), AtomicValue::String("item".into()));
    assert_eq!(single(&Expr::call("name", vec![Expr::empty()]), None), AtomicValue::String(String::new()));
}

#[rstest]
fn top_level_focus(tree: N) {
    assert_eq!(single(&Expr::call("position", vec![]), Some(&tree)), AtomicValue::Integer(1));
    assert_eq!(single(&Expr::call("last", vec![]), Some(&tree)), AtomicValue::Integer(1));
    assert_eq!(single(&Expr::call("string", vec![]), Some(&tree)), AtomicValue::String("alphabeta".into()));
}

#[rstest]
#[case::integers(Expr::int(1), CompOp::Lt, Expr::int(2), true)]
#[case::mixed_numerics(Expr::int(2), CompOp::Eq, Expr::decimal(2.0), true)]
#[case::strings(Expr::string("b"), CompOp::Gt, Expr::string("a"), true)]
#[case::nan(Expr::double(f64::NAN), CompOp::Eq, Expr::double(f64::NAN), false)]
fn value_comparisons(#[case] l: Expr, #[case] op: CompOp, #[case] r: Expr, #[case] expected: bool) {
    assert_eq!(single(&Expr::value_cmp(l, op, r), None), AtomicValue::Boolean(expected));
}

#[rstest]
fn value_comparison_with_an_empty_operand_is_empty() {
    let out = run(&Expr::value_cmp(Expr::empty(), CompOp::Eq, Expr::int(1)), &StaticContext::default(), None);
    assert!(out.is_empty());
}

#[rstest]
fn general_comparisons_are_existential(tree: N) {
    let seq = Expr::seq(vec![Expr::int(1), Expr::int(5)]);
    assert_eq!(single(&Expr::cmp(seq.clone(), CompOp::Eq, Expr::int(5)), None), AtomicValue::Boolean(true));
    assert_eq!(single(&Expr::cmp(seq, CompOp::Gt, Expr::int(5)), None), AtomicValue::Boolean(false));
    assert_eq!(single(&Expr::cmp(Expr::empty(), CompOp::Eq, Expr::empty()), None), AtomicValue::Boolean(false));

    // untyped attribute values compare numerically against numbers
    let qty = Expr::root(vec![
        Step::child("root"),
        Step::new(Axis::Child, NodeTest::wildcard()),
        Step::attribute("qty"),
    ]);
    assert_eq!(single(&Expr::cmp(qty.clone(), CompOp::Eq, Expr::double(4.0)), Some(&tree)), AtomicValue::Boolean(true));
    assert_eq!(single(&Expr::cmp(qty, CompOp::Eq, Expr::string("3")), Some(&tree)), AtomicValue::Boolean(true));
}

#[rstest]
fn date_plus_year_month_duration() {
    let date = |y, m, d| AtomicValue::Date { date: NaiveDate::from_ymd_opt(y, m, d).unwrap(), tz: None };
    let e = Expr::arith(
        Expr::typed(date(2024, 1, 15)),
        ArithOp::Add,
        Expr::typed(AtomicValue::YearMonthDuration(14)),
    );
    assert_eq!(single(&e, None), date(2025, 3, 15));
    let c = compile(&e, &StaticContext::<N>::default()).unwrap();
    assert_eq!(c.return_type(), XPathResultType::Date);
}

#[rstest]
fn custom_functions(tree: N) {
    let mut reg: FunctionRegistry<N> = core_functions();
    reg.register_local("twice", 1, XPathResultType::Number, |_, mut args| {
        let v = args.pop().map(|v| v.take(1)).transpose()?.unwrap_or_default();
        let n = match v.first().and_then(Item::as_atomic) {
            Some(AtomicValue::Integer(i)) => *i,
            _ => 0,
        };
        Ok(Value::atomic(AtomicValue::Integer(n * 2)))
    });
    reg.register_ns("urn:ext", "answer", 0, XPathResultType::Number, |_, _| {
        Ok(Value::atomic(AtomicValue::Integer(42)))
    });
    let ctx = StaticContextBuilder::new().with_functions(Arc::new(reg)).with_namespace("x", "urn:ext").build();

    let out = run(&Expr::call("twice", vec![Expr::int(21)]), &ctx, None);
    assert_eq!(out, vec![Item::Atomic(AtomicValue::Integer(42))]);

    let call = Expr::FunctionCall { name: QName::prefixed("x", "answer"), args: vec![] };
    assert_eq!(run(&call, &ctx, Some(&tree)), vec![Item::Atomic(AtomicValue::Integer(42))]);

    // core functions stay reachable through the default function namespace
    let out = run(&Expr::call("count", vec![items()]), &ctx, Some(&tree));
    assert_eq!(out, vec![Item::Atomic(AtomicValue::Integer(2))]);
}

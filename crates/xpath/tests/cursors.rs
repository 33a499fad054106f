use navxpath::ast::{ArithOp, Axis, CompOp, Expr, NodeTest, Step};
use navxpath::simple_node::{doc, elem, text};
use navxpath::{BoxCursor, DynamicContextBuilder, Item, SequenceCursor, SimpleNavigator, StaticContext, compile};
use rstest::{fixture, rstest};

type N = SimpleNavigator;

#[fixture]
fn tree() -> N {
    let b = |v: &str| elem("b").child(text(v));
    doc()
        .child(
            elem("root")
                .child(elem("a").child(b("1")).child(b("2")))
                .child(elem("a").child(b("3")).child(elem("d").child(b("5"))).child(b("4"))),
        )
        .build()
}

fn stream(expr: &Expr, node: &N) -> BoxCursor<N> {
    let c = compile(expr, &StaticContext::<N>::default()).unwrap();
    c.evaluate_stream(&DynamicContextBuilder::new().with_context_node(node.clone()).build()).unwrap()
}

fn take(c: &mut BoxCursor<N>, n: usize) -> Vec<String> {
    let mut out = Vec::new();
    while out.len() < n && c.move_next().unwrap() {
        out.push(c.current().unwrap().value());
    }
    out
}

fn rest(c: &mut BoxCursor<N>) -> Vec<String> {
    take(c, usize::MAX)
}

fn ints(v: &[i64]) -> Expr {
    Expr::seq(v.iter().map(|&i| Expr::int(i)).collect())
}

#[rstest]
#[case::descendants(Expr::root_descendant(vec![Step::child("b")]))]
#[case::sorted(Expr::root_descendant(vec![Step::child("b"), Step::new(Axis::Parent, NodeTest::node())]))]
#[case::for_over_atomics(Expr::for_in("x", ints(&[1, 2, 3, 4]), Expr::arith(Expr::var("x"), ArithOp::Mul, Expr::int(10))))]
#[case::for_over_paths(Expr::for_in(
    "a",
    Expr::root(vec![Step::child("root"), Step::child("a")]),
    Expr::var("a").path_from(vec![Step::child("b")]),
))]
#[case::nested_for(Expr::for_in(
    "x",
    ints(&[1, 2]),
    Expr::for_in("y", ints(&[10, 20, 30]), Expr::arith(Expr::var("x"), ArithOp::Add, Expr::var("y"))),
))]
#[case::predicate_with_last(Expr::filter(
    Expr::root_descendant(vec![Step::child("b")]),
    vec![Expr::value_cmp(Expr::call("position", vec![]), CompOp::Lt, Expr::call("last", vec![]))],
))]
#[case::expression_step(Expr::root(vec![
    Step::child("root"),
    Step::child("a"),
    Step::expr(Expr::call("count", vec![Expr::relative(vec![Step::child("b")])])),
]))]
fn clone_continues_independently(tree: N, #[case] expr: Expr) {
    let full = rest(&mut stream(&expr, &tree));
    assert!(full.len() >= 2);

    let mut original = stream(&expr, &tree);
    let head = take(&mut original, 1);
    let mut copy = original.clone_instance();

    // drain the clone first; the original must not move
    let copied_rest = rest(&mut copy);
    assert_eq!(original.current().map(Item::value), Some(head[0].clone()));
    let original_rest = rest(&mut original);

    assert_eq!(copied_rest, full[1..].to_vec());
    assert_eq!(original_rest, full[1..].to_vec());
}

#[rstest]
fn interleaved_clone_and_original_do_not_share_variables() {
    let expr = Expr::for_in("x", ints(&[1, 2, 3]), Expr::seq(vec![Expr::var("x"), Expr::var("x")]));
    let c = compile(&expr, &StaticContext::<N>::default()).unwrap();
    let mut original = c.evaluate_stream(&DynamicContextBuilder::new().build()).unwrap();
    take(&mut original, 1);
    let mut copy = original.clone_instance();
    let mut seen = Vec::new();
    loop {
        let a = original.move_next().unwrap();
        let b = copy.move_next().unwrap();
        assert_eq!(a, b);
        if !a {
            break;
        }
        let (x, y) = (original.current().unwrap().value(), copy.current().unwrap().value());
        assert_eq!(x, y);
        seen.push(x);
    }
    assert_eq!(seen, vec!["1", "2", "2", "3", "3"]);
}

#[rstest]
fn reset_replays_from_the_start(tree: N) {
    let mut c = stream(&Expr::root_descendant(vec![Step::child("b")]), &tree);
    let first = rest(&mut c);
    assert!(c.is_finished());
    c.reset();
    assert_eq!(rest(&mut c), first);
}

#[rstest]
fn ranges_are_produced_on_demand() {
    let e = Expr::range(Expr::int(1), Expr::int(i64::MAX));
    let c = compile(&e, &StaticContext::<N>::default()).unwrap();
    let mut cursor = c.evaluate_stream(&DynamicContextBuilder::new().build()).unwrap();
    assert_eq!(take(&mut cursor, 3), vec!["1", "2", "3"]);
    assert_eq!(cursor.sequential_position(), 3);
}

#[rstest]
fn failed_cursor_stays_finished() {
    let e = Expr::for_in(
        "x",
        ints(&[1, 0, 2]),
        Expr::arith(Expr::int(1), ArithOp::IDiv, Expr::var("x")),
    );
    let c = compile(&e, &StaticContext::<N>::default()).unwrap();
    let mut cursor = c.evaluate_stream(&DynamicContextBuilder::new().build()).unwrap();
    assert!(cursor.move_next().unwrap());
    assert!(cursor.move_next().is_err());
    assert!(!cursor.move_next().unwrap());
    assert!(cursor.is_finished());
}

use navxpath::ast::{Axis, Expr, NodeTest, Step};
use navxpath::engine::sort_document_order;
use navxpath::simple_node::{attr, doc, elem, text};
use navxpath::{
    DocumentOrderPolicy, DynamicContextBuilder, ErrorCode, ExpandedName, Item, SimpleNavigator, StaticContext,
    StaticContextBuilder, XPathNavigator, compile,
};
use rstest::{fixture, rstest};

type N = SimpleNavigator;

#[fixture]
fn tree() -> N {
    let b = |v: &str| elem("b").child(text(v));
    doc()
        .child(
            elem("root")
                .child(elem("a").attr(attr("id", "a1")).child(b("1")).child(b("2")).child(elem("c")))
                .child(elem("a").attr(attr("id", "a2")).child(b("3")).child(elem("d").child(b("5"))).child(b("4"))),
        )
        .build()
}

fn eval_with(expr: &Expr, ctx: &StaticContext<N>, node: &N) -> Result<Vec<Item<N>>, navxpath::Error> {
    compile(expr, ctx)?.evaluate(&DynamicContextBuilder::new().with_context_node(node.clone()).build())
}

fn eval(expr: &Expr, node: &N) -> Result<Vec<Item<N>>, navxpath::Error> {
    eval_with(expr, &StaticContext::default(), node)
}

fn names(items: &[Item<N>]) -> Vec<String> {
    items.iter().filter_map(Item::as_node).map(XPathNavigator::local_name).collect()
}

fn parents_of_b() -> Expr {
    Expr::root_descendant(vec![Step::child("b"), Step::new(Axis::Parent, NodeTest::node())])
}

#[rstest]
fn duplicates_are_removed_by_default(tree: N) {
    assert_eq!(names(&eval(&parents_of_b(), &tree).unwrap()), vec!["a", "a", "d"]);
}

#[rstest]
fn duplicate_removal_can_be_switched_off(tree: N) {
    let ctx = StaticContextBuilder::new().with_duplicate_removal(false).build();
    let out = eval_with(&parents_of_b(), &ctx, &tree).unwrap();
    assert_eq!(names(&out), vec!["a", "a", "a", "a", "d"]);
    // still sorted: both copies of the first a precede the second a
    assert!(out[0].as_node().unwrap().is_same_position(out[1].as_node().unwrap()));
}

#[rstest]
#[case::absolute(Expr::root(vec![Step::child("root"), Step::child("a"), Step::child("b")]))]
#[case::descendants(Expr::root_descendant(vec![Step::child("b")]))]
#[case::fused(Expr::root_descendant(vec![Step::child("a"), Step::child("b")]))]
#[case::attributes(Expr::root_descendant(vec![Step::attribute("id")]))]
#[case::filtered(Expr::root(vec![Step::child("root"), Step::child("a").with_predicate(Expr::int(2)), Step::child("b")]))]
#[case::self_step(Expr::root(vec![Step::child("root"), Step::axis(Axis::SelfAxis, "root"), Step::child("a")]))]
fn forcing_the_wrap_changes_nothing(tree: N, #[case] expr: Expr) {
    let auto = StaticContext::<N>::default();
    let always = StaticContextBuilder::new().with_document_order(DocumentOrderPolicy::Always).build();
    assert!(compile(&expr, &auto).unwrap().is_ordered_path());
    assert!(compile(&expr, &always).unwrap().sorts_result());
    assert_eq!(eval_with(&expr, &auto, &tree).unwrap(), eval_with(&expr, &always, &tree).unwrap());
}

#[rstest]
fn preceding_sibling_is_returned_in_document_order(tree: N) {
    let e = Expr::root(vec![
        Step::child("root"),
        Step::child("a").with_predicate(Expr::int(2)),
        Step::child("b").with_predicate(Expr::int(2)),
        Step::new(Axis::PrecedingSibling, NodeTest::wildcard()),
    ]);
    let out = eval(&e, &tree).unwrap();
    assert_eq!(names(&out), vec!["b", "d"]);
    assert_eq!(out[0].value(), "3");
}

#[rstest]
fn mixed_step_result_is_rejected(tree: N) {
    // /root/a/(b, 1)
    let e = Expr::root(vec![
        Step::child("root"),
        Step::child("a"),
        Step::expr(Expr::seq(vec![Expr::relative(vec![Step::child("b")]), Expr::int(1)])),
    ]);
    assert_eq!(eval(&e, &tree).unwrap_err().code_enum(), ErrorCode::XPTY0018);
}

#[rstest]
fn atomic_last_step_keeps_its_order(tree: N) {
    // /root/a/string(@id)
    let e = Expr::root(vec![
        Step::child("root"),
        Step::child("a"),
        Step::expr(Expr::call("string", vec![Expr::relative(vec![Step::attribute("id")])])),
    ]);
    let out: Vec<String> = eval(&e, &tree).unwrap().iter().map(Item::value).collect();
    assert_eq!(out, vec!["a1", "a2"]);
}

#[rstest]
fn union_sorts_and_deduplicates(tree: N) {
    let second = Expr::root(vec![Step::child("root"), Step::child("a").with_predicate(Expr::int(2))]);
    let all = Expr::root(vec![Step::child("root"), Step::child("a")]);
    let e = Expr::union(second, all).path_from(vec![Step::attribute("id")]);
    let out: Vec<String> = eval(&e, &tree).unwrap().iter().map(Item::value).collect();
    assert_eq!(out, vec!["a1", "a2"]);
}

#[rstest]
fn union_rejects_atomics(tree: N) {
    let e = Expr::union(Expr::root(vec![Step::child("root")]), Expr::int(1));
    assert_eq!(eval(&e, &tree).unwrap_err().code_enum(), ErrorCode::XPTY0004);
}

#[rstest]
fn nodes_of_several_documents_sort_by_document() {
    let first = doc().child(elem("r").child(elem("x"))).build();
    let second = doc().child(elem("r").child(elem("y"))).build();
    let ctx = StaticContextBuilder::<N>::new().with_variable(ExpandedName::local("docs")).build();
    let e = Expr::var("docs").path_from(vec![Step::child("r"), Step::new(Axis::Child, NodeTest::wildcard())]);
    let dyn_ctx = DynamicContextBuilder::new()
        .with_variable(ExpandedName::local("docs"), vec![Item::Node(second), Item::Node(first)])
        .build();
    let out = compile(&e, &ctx).unwrap().evaluate(&dyn_ctx).unwrap();
    assert_eq!(names(&out), vec!["x", "y"]);
}

#[rstest]
fn sorting_is_idempotent(tree: N) {
    let mut nodes: Vec<N> =
        eval(&Expr::root_descendant(vec![Step::new(Axis::Child, NodeTest::node())]), &tree)
            .unwrap()
            .into_iter()
            .filter_map(|it| it.as_node().cloned())
            .collect();
    let sorted = nodes.clone();
    sort_document_order(&mut nodes, true);
    assert_eq!(nodes, sorted);

    nodes.reverse();
    sort_document_order(&mut nodes, true);
    assert_eq!(nodes, sorted);
}

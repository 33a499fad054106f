use navxpath::ast::{Axis, Expr, NodeTest, Step};
use navxpath::simple_node::{doc, elem, text};
use navxpath::{CompiledExpr, DynamicContextBuilder, Item, SimpleNavigator, StaticContext, compile};
use rstest::rstest;

type N = SimpleNavigator;

fn compiled(expr: &Expr) -> CompiledExpr<N> {
    compile(expr, &StaticContext::default()).unwrap()
}

fn b(i: &str) -> navxpath::simple_node::SimpleNodeBuilder {
    elem("b").child(text(i))
}

fn tree() -> N {
    doc()
        .child(
            elem("root")
                .child(elem("a").child(b("1")).child(b("2")))
                .child(elem("a").child(b("3")).child(elem("d").child(b("5"))).child(b("4"))),
        )
        .build()
}

fn values(expr: &Expr) -> Vec<String> {
    let out = compiled(expr).evaluate(&DynamicContextBuilder::new().with_context_node(tree()).build()).unwrap();
    out.iter().map(Item::value).collect()
}

#[rstest]
#[case::absolute_children(Expr::root(vec![Step::child("a"), Step::child("b")]), vec!["Child(a)", "Child(b)"])]
#[case::descendant(Expr::root_descendant(vec![Step::child("b")]), vec!["Descendant(b)"])]
#[case::position_filter(
    Expr::relative(vec![Step::child("a"), Step::child("b").with_predicate(Expr::int(2))]),
    vec!["Child(a)", "Child(b)", "PositionFilter(2)"]
)]
#[case::fused_children(Expr::root_descendant(vec![Step::child("a"), Step::child("b")]), vec!["ChildOverDescendants(a,b)"])]
#[case::predicate_blocks_collapse(
    Expr::root_descendant(vec![Step::child("b").with_predicate(Expr::relative(vec![Step::child("c")]))]),
    vec!["DescendantOrSelf(node())", "Child(b)", "Predicate"]
)]
#[case::whole_double_is_a_position(
    Expr::relative(vec![Step::child("b").with_predicate(Expr::double(2.0))]),
    vec!["Child(b)", "PositionFilter(2)"]
)]
#[case::zero_stays_a_predicate(
    Expr::relative(vec![Step::child("b").with_predicate(Expr::int(0))]),
    vec!["Child(b)", "Predicate"]
)]
#[case::fraction_stays_a_predicate(
    Expr::relative(vec![Step::child("b").with_predicate(Expr::decimal(1.5))]),
    vec!["Child(b)", "Predicate"]
)]
#[case::attribute_after_descendants(
    Expr::root_descendant(vec![Step::attribute("id")]),
    vec!["DescendantOrSelf(node())", "Attribute(id)"]
)]
#[case::filter_expression(
    Expr::filter(Expr::root_descendant(vec![Step::child("b")]), vec![Expr::int(2)]),
    vec!["PositionFilter(2)"]
)]
fn describe_steps_shows_rewrites(#[case] expr: Expr, #[case] expected: Vec<&str>) {
    assert_eq!(compiled(&expr).describe_steps(), expected);
}

#[rstest]
fn absolute_child_path_is_not_materialized() {
    let c = compiled(&Expr::root(vec![Step::child("a"), Step::child("b")]));
    assert!(c.is_ordered_path());
    assert!(!c.sorts_result());
}

#[rstest]
#[case(Expr::root_descendant(vec![Step::child("b")]), true)]
#[case(Expr::root_descendant(vec![Step::child("a"), Step::child("b")]), true)]
#[case(Expr::root(vec![Step::child("root"), Step::child("a"), Step::new(Axis::Parent, NodeTest::node())]), false)]
#[case(Expr::root_descendant(vec![Step::child("d"), Step::new(Axis::Descendant, NodeTest::wildcard()), Step::child("b")]), false)]
#[case(Expr::root(vec![Step::child("root"), Step::child("a").with_predicate(Expr::int(1)), Step::new(Axis::FollowingSibling, NodeTest::wildcard())]), false)]
fn orderedness_decisions(#[case] expr: Expr, #[case] ordered: bool) {
    let c = compiled(&expr);
    assert_eq!(c.is_ordered_path(), ordered);
    assert_eq!(c.sorts_result(), !ordered);
}

#[rstest]
fn positions_count_per_parent_in_paths() {
    // //b[2]: second b child of every element that has one
    let per_parent = Expr::root_descendant(vec![Step::child("b").with_predicate(Expr::int(2))]);
    assert_eq!(values(&per_parent), vec!["2", "4"]);

    // (//b)[2]: second b overall
    let flat = Expr::filter(Expr::root_descendant(vec![Step::child("b")]), vec![Expr::int(2)]);
    assert_eq!(values(&flat), vec!["2"]);
}

#[rstest]
fn fused_run_matches_only_complete_chains() {
    let e = Expr::root_descendant(vec![Step::child("d"), Step::child("b")]);
    assert_eq!(compiled(&e).describe_steps(), vec!["ChildOverDescendants(d,b)"]);
    assert_eq!(values(&e), vec!["5"]);
}

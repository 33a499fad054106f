//! The fused child-over-descendants step must agree with the unfused walk.

use navxpath::ast::{Axis, Expr, NodeTest, Step};
use navxpath::simple_node::{doc, elem, text};
use navxpath::{DynamicContextBuilder, SimpleNavigator, StaticContext, XPathNavigator, compile};
use rstest::{fixture, rstest};

type N = SimpleNavigator;

// <a>
//   <b>1</b>
//   <a><b>2</b><a><b>3</b></a><b>4</b></a>
//   <c><a><b>5</b><c/></a></c>
//   <b>6</b>
// </a>
#[fixture]
fn tree() -> N {
    let b = |v: &str| elem("b").child(text(v));
    doc()
        .child(
            elem("a")
                .child(b("1"))
                .child(elem("a").child(b("2")).child(elem("a").child(b("3"))).child(b("4")))
                .child(elem("c").child(elem("a").child(b("5")).child(elem("c"))))
                .child(b("6")),
        )
        .build()
}

fn values(expr: &Expr, ctx: &N) -> Vec<String> {
    let c = compile(expr, &StaticContext::<N>::default()).unwrap();
    let out = c.evaluate(&DynamicContextBuilder::new().with_context_node(ctx.clone()).build()).unwrap();
    out.iter().map(|i| i.value()).collect()
}

fn nodes(expr: &Expr, ctx: &N) -> Vec<N> {
    let c = compile(expr, &StaticContext::<N>::default()).unwrap();
    let out = c.evaluate(&DynamicContextBuilder::new().with_context_node(ctx.clone()).build()).unwrap();
    out.iter().filter_map(|i| i.as_node().cloned()).collect()
}

fn describe(expr: &Expr) -> Vec<String> {
    compile(expr, &StaticContext::<N>::default()).unwrap().describe_steps()
}

/// `descendant-or-self::node()[true()]`: same nodes, but the predicate keeps
/// the steps apart.
fn unfused_dos() -> Step {
    Step::descendant_or_self().with_predicate(Expr::call("true", vec![]))
}

#[rstest]
#[case::two_names(vec!["a", "b"])]
#[case::three_names(vec!["a", "a", "b"])]
#[case::no_match(vec!["c", "b"])]
#[case::wildcard_tail(vec!["c", "*"])]
fn absolute_runs_agree(tree: N, #[case] names: Vec<&str>) {
    let steps: Vec<Step> = names
        .iter()
        .map(|n| if *n == "*" { Step::new(Axis::Child, NodeTest::wildcard()) } else { Step::child(n) })
        .collect();
    let fused = Expr::root_descendant(steps.clone());
    assert!(describe(&fused)[0].starts_with("ChildOverDescendants("), "{:?}", describe(&fused));

    let mut plain = vec![unfused_dos()];
    plain.extend(steps);
    assert_eq!(values(&fused, &tree), values(&Expr::root(plain), &tree));
}

#[rstest]
fn relative_run_from_an_inner_node(tree: N) {
    // context: the second `a` (nested one)
    let inner = {
        let c = compile(
            &Expr::root(vec![Step::child("a"), Step::child("a")]),
            &StaticContext::<N>::default(),
        )
        .unwrap();
        let out = c.evaluate(&DynamicContextBuilder::new().with_context_node(tree.clone()).build()).unwrap();
        out[0].as_node().cloned().unwrap()
    };
    assert_eq!(inner.local_name(), "a");

    let fused = Expr::relative(vec![Step::descendant_or_self(), Step::child("a"), Step::child("b")]);
    let plain = Expr::relative(vec![unfused_dos(), Step::child("a"), Step::child("b")]);
    // only the `a` below the context has `b` children in range
    assert_eq!(values(&fused, &inner), ["3"]);
    assert_eq!(values(&fused, &inner), values(&plain, &inner));
}

#[rstest]
fn context_never_matches_the_first_test() {
    // .//a/b from <a><b>x</b></a>
    let root = doc().child(elem("a").child(elem("b").child(text("x")))).build();
    let a = nodes(&Expr::root(vec![Step::child("a")]), &root).remove(0);
    let fused = Expr::relative(vec![Step::descendant_or_self(), Step::child("a"), Step::child("b")]);
    assert!(values(&fused, &a).is_empty());
    assert_eq!(values(&fused, &root), ["x"]);
}

#[rstest]
#[case::two_names(vec!["a", "b"])]
#[case::three_names(vec!["a", "a", "b"])]
#[case::repeated_name(vec!["a", "a"])]
#[case::mixed(vec!["c", "a", "b"])]
#[case::wildcards(vec!["*", "*"])]
fn relative_runs_agree_from_every_node(tree: N, #[case] names: Vec<&str>) {
    let steps: Vec<Step> = names
        .iter()
        .map(|n| if *n == "*" { Step::new(Axis::Child, NodeTest::wildcard()) } else { Step::child(n) })
        .collect();
    let mut fused = vec![Step::descendant_or_self()];
    fused.extend(steps.clone());
    let fused = Expr::relative(fused);
    assert!(describe(&fused)[0].starts_with("ChildOverDescendants("), "{:?}", describe(&fused));
    let mut plain = vec![unfused_dos()];
    plain.extend(steps);
    let plain = Expr::relative(plain);

    let mut contexts = vec![tree.clone()];
    contexts.extend(nodes(&Expr::root_descendant(vec![Step::new(Axis::Child, NodeTest::wildcard())]), &tree));
    assert_eq!(contexts.len(), 13);
    for ctx in &contexts {
        assert_eq!(values(&fused, ctx), values(&plain, ctx), "context {}", ctx.local_name());
    }
}

#[rstest]
fn whole_document_run(tree: N) {
    let fused = Expr::root_descendant(vec![Step::child("a"), Step::child("b")]);
    assert_eq!(values(&fused, &tree), ["1", "2", "3", "4", "5", "6"]);
}

extern crate criterion;

use criterion::{criterion_group, criterion_main, Criterion};

use compatscan_lib::style::cascade::CascadeResolver;
use compatscan_lib::style::selector::BuiltinSelectors;
use compatscan_lib::style::stylesheet::parse_stylesheet;
use compatscan_lib::NodeShape;

const STYLESHEET: &str = r#"
    div { display: block; }
    .item { color: red; }
    div > .item { color: blue; }
    #main .item:first-child { transform: scale(2); }
    section p.item { position: fixed; }
    [data-kind="card"] { display: flex !important; }
"#;

fn bench_wide_tree(c: &mut Criterion) {
    let rules = parse_stylesheet(STYLESHEET).unwrap();
    let mut root = NodeShape::new("div").with_attribute("id", "main");
    for i in 0..10_000 {
        let mut child = NodeShape::new("p").with_attribute("class", "item");
        if i % 3 == 0 {
            child = child.with_attribute("data-kind", "card");
        }
        root = root.with_child(child);
    }

    c.bench_function("wide_tree_cascade", |b| {
        let engine = BuiltinSelectors::new();
        b.iter(|| {
            let resolver = CascadeResolver::new(&rules, &engine, &engine);
            resolver.build_styled_tree(&root)
        })
    });
}

fn bench_deep_nesting(c: &mut Criterion) {
    let rules = parse_stylesheet(STYLESHEET).unwrap();
    let mut deep = NodeShape::new("p").with_attribute("class", "item");
    for depth in 0..500 {
        let tag = if depth % 2 == 0 { "section" } else { "div" };
        deep = NodeShape::new(tag).with_child(deep);
    }

    c.bench_function("deep_nesting_cascade", |b| {
        let engine = BuiltinSelectors::new();
        b.iter(|| {
            let resolver = CascadeResolver::new(&rules, &engine, &engine);
            resolver.build_styled_tree(&deep)
        })
    });
}

criterion_group!(benches, bench_wide_tree, bench_deep_nesting);
criterion_main!(benches);

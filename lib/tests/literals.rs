mod harness;

use harness::*;
use rb2class::compiler::ir::{Node, ScopeArena, StaticScope};
use rb2class::vm::Artifact;

fn routines_named(artifact: &Artifact, prefix: &str) -> usize {
    artifact
        .routines()
        .iter()
        .filter(|routine| routine.name.to_string().starts_with(prefix))
        .count()
}

fn numbers<'s>(count: i64) -> Node<'s> {
    Node::Array((1..=count).map(int).collect())
}

#[test]
fn large_array_literals_are_split_across_builders() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["big", "small"]));
    let root = script(vec![
        Node::assign(0, numbers(250)),
        Node::assign(1, numbers(50)),
        puts(Node::call(Node::local(0), "sum", vec![])),
        puts(Node::call(Node::local(0), "size", vec![])),
        puts(Node::call(Node::local(0), "last", vec![])),
        puts(Node::call(Node::local(1), "sum", vec![])),
    ]);

    let artifact = compile(settings("big_array"), &root, scope).expect("compiles");
    assert_eq!(routines_named(&artifact, "array_builder_"), 3);

    assert_eq!(output_of("big_array", &root, scope), "31375\n250\n250\n1275\n");
}

#[test]
fn arrays_with_non_literal_elements_are_built_inline() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["x"]));
    let mut elements: Vec<Node> = (0..150).map(|_| int(1)).collect();
    elements.push(Node::local(0));
    let root = script(vec![
        Node::assign(0, int(10)),
        puts(Node::call(Node::Array(elements), "sum", vec![])),
    ]);

    let artifact = compile(settings("mixed_array"), &root, scope).expect("compiles");
    assert_eq!(routines_named(&artifact, "array_builder_"), 0);
    assert_eq!(output_of("mixed_array", &root, scope), "160\n");
}

#[test]
fn large_hash_literals_are_split_across_builders() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["h"]));
    let pairs = (0..120)
        .map(|idx| (Node::sym(&format!("k{}", idx)), int(idx * 2)))
        .collect();
    let root = script(vec![
        Node::assign(0, Node::Hash(pairs)),
        puts(Node::call(Node::local(0), "size", vec![])),
        puts(Node::call(Node::local(0), "[]", vec![Node::sym("k0")])),
        puts(Node::call(Node::local(0), "[]", vec![Node::sym("k119")])),
    ]);

    let mut small = settings("big_hash");
    small.hash_chunk_size = 50;
    let artifact = compile(small, &root, scope).expect("compiles");
    assert_eq!(routines_named(&artifact, "hash_builder_"), 3);

    assert_eq!(output_of("big_hash", &root, scope), "120\n0\n238\n");
}

#[test]
fn long_scripts_chain_into_continuation_routines() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["total"]));
    let mut statements = vec![Node::assign(0, int(0))];
    for step in 1..=11 {
        statements.push(Node::assign(0, binop(Node::local(0), "+", int(step))));
    }
    statements.push(puts(Node::local(0)));
    let root = script(statements);

    let mut chained = settings("chained");
    chained.chained_compile_line_count = 5;
    let artifact = compile(chained, &root, scope).expect("compiles");
    assert_eq!(routines_named(&artifact, "chained_"), 2);

    let mut chained = settings("chained");
    chained.chained_compile_line_count = 5;
    let outcome = run_with(chained, &root, scope);
    assert_eq!(outcome.output(), "66\n");
    assert_eq!(outcome.value().as_fixnum(), None);
}

#[test]
fn string_literals_are_fresh_on_every_evaluation() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["list", "i"]));
    let root = script(vec![
        Node::assign(0, Node::ZArray),
        Node::assign(1, int(0)),
        while_loop(
            binop(Node::local(1), "<", int(2)),
            Node::Block(vec![
                binop(Node::local(0), "<<", Node::str("a")),
                Node::assign(1, binop(Node::local(1), "+", int(1))),
            ]),
        ),
        binop(
            Node::call(Node::local(0), "first", vec![]),
            "<<",
            Node::str("b"),
        ),
        Node::fcall("p", vec![Node::local(0)]),
        Node::fcall(
            "p",
            vec![Node::call(
                Node::call(Node::local(0), "first", vec![]),
                "equal?",
                vec![Node::call(Node::local(0), "last", vec![])],
            )],
        ),
    ]);

    assert_eq!(
        output_of("fresh_strings", &root, scope),
        "[\"ab\", \"a\"]\nfalse\n"
    );
}

#[test]
fn interpolation_symbols_and_ranges() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["n"]));
    let root = script(vec![
        Node::assign(0, int(3)),
        puts(Node::DStr(vec![
            Node::str("n = "),
            Node::local(0),
            Node::str(", half = "),
            binop(Node::local(0), "/", Node::Float(2.0)),
        ])),
        Node::fcall(
            "p",
            vec![Node::DSymbol(vec![Node::str("item_"), Node::local(0)])],
        ),
        Node::fcall(
            "p",
            vec![Node::Range {
                begin: int(1).boxed(),
                end: Node::local(0).boxed(),
                exclusive: true,
            }],
        ),
        Node::fcall(
            "p",
            vec![Node::Hash(vec![(Node::sym("a"), int(1)), (Node::str("b"), Node::Nil)])],
        ),
    ]);

    assert_eq!(
        output_of("interpolation", &root, scope),
        "n = 3, half = 1.5\n:item_3\n1...3\n{:a=>1, \"b\"=>nil}\n"
    );
}

#[test]
fn regexp_matches_record_the_last_match() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        Node::fcall(
            "p",
            vec![Node::Match3 {
                value: Node::str("hello world").boxed(),
                regexp: Node::Regexp {
                    pattern: "wor".to_string(),
                    options: 0,
                }
                .boxed(),
            }],
        ),
        puts(Node::Backref('`')),
        puts(Node::Backref('&')),
        Node::fcall(
            "p",
            vec![Node::Match2 {
                regexp: Node::Regexp {
                    pattern: "xyz".to_string(),
                    options: 0,
                }
                .boxed(),
                value: Node::str("hello").boxed(),
            }],
        ),
        Node::fcall("p", vec![Node::Backref('&')]),
    ]);

    assert_eq!(
        output_of("regexp", &root, scope),
        "6\nhello \nwor\nnil\nnil\n"
    );
}

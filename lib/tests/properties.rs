mod harness;

use harness::*;
use proptest::prelude::*;
use rb2class::compiler::ir::{Node, ScopeArena, StaticScope};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn chunked_arrays_keep_every_element(
        values in prop::collection::vec(-1000i64..1000, 0..300),
        threshold in 1usize..120,
        chunk_size in 1usize..80,
    ) {
        let arena = ScopeArena::new();
        let scope = &*arena.alloc(StaticScope::local(&["xs"]));
        let root = script(vec![
            Node::assign(0, Node::Array(values.iter().copied().map(int).collect())),
            puts(Node::call(Node::local(0), "sum", vec![])),
            puts(Node::call(Node::local(0), "size", vec![])),
        ]);

        let mut settings = settings("chunked");
        settings.array_chunk_threshold = threshold;
        settings.array_chunk_size = chunk_size;
        let outcome = run_with(settings, &root, scope);

        let expected = format!("{}\n{}\n", values.iter().sum::<i64>(), values.len());
        prop_assert_eq!(outcome.output(), expected.as_str());
    }

    #[test]
    fn chaining_never_changes_what_a_script_does(
        steps in prop::collection::vec(-50i64..50, 1..40),
        per_routine in 1usize..12,
    ) {
        let arena = ScopeArena::new();
        let scope = &*arena.alloc(StaticScope::local(&["acc", "count"]));
        let mut statements = vec![Node::assign(0, int(0)), Node::assign(1, int(0))];
        for step in &steps {
            statements.push(Node::Block(vec![
                Node::assign(0, binop(Node::local(0), "+", int(*step))),
                Node::assign(1, binop(Node::local(1), "+", int(1))),
            ]));
        }
        statements.push(puts(Node::local(0)));
        statements.push(puts(Node::local(1)));
        let root = script(statements);

        let mut settings = settings("chaining");
        settings.chained_compile_line_count = per_routine;
        let outcome = run_with(settings, &root, scope);

        let expected = format!("{}\n{}\n", steps.iter().sum::<i64>(), steps.len());
        prop_assert_eq!(outcome.output(), expected.as_str());
    }
}

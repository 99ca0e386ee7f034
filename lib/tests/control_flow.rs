mod harness;

use harness::*;
use rb2class::compiler::ir::{
    BlockArgs, Closure, Node, Position, RescueClause, ScopeArena, StaticScope, When,
};

#[test]
fn while_loop_polls_on_every_condition_check() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i", "total"]));
    let root = script(vec![
        Node::assign(0, int(0)),
        Node::assign(1, int(0)),
        while_loop(
            binop(Node::local(0), "<", int(5)),
            Node::Block(vec![
                Node::assign(1, binop(Node::local(1), "+", Node::local(0))),
                Node::assign(0, binop(Node::local(0), "+", int(1))),
            ]),
        ),
        puts(Node::local(1)),
    ]);

    let outcome = run("while_sum", &root, scope);
    assert_eq!(outcome.output(), "10\n");
    assert_eq!(outcome.runtime.polls(), 6);
}

#[test]
fn post_condition_loop_runs_its_body_first() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![Node::While {
        cond: Node::False.boxed(),
        body: Some(puts(Node::str("once")).boxed()),
        check_first: false,
        until: false,
        nonlocal_flow: false,
    }]);

    assert_eq!(output_of("do_while", &root, scope), "once\n");
}

#[test]
fn loop_whose_first_check_fails_never_runs_its_body() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["go", "result"]));
    let root = script(vec![
        Node::assign(0, Node::False),
        Node::assign(1, int(1)),
        Node::assign(
            1,
            while_loop(Node::local(0), puts(Node::str("body"))),
        ),
        Node::fcall("p", vec![Node::local(1)]),
        // a condition known to be false at compile time
        Node::fcall(
            "p",
            vec![while_loop(Node::False, puts(Node::str("body")))],
        ),
    ]);

    assert_eq!(output_of("never", &root, scope), "nil\nnil\n");
}

#[test]
fn until_loop_stops_once_the_condition_holds() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i"]));
    let root = script(vec![
        Node::assign(0, int(0)),
        Node::While {
            cond: binop(Node::local(0), "==", int(3)).boxed(),
            body: Some(Node::assign(0, binop(Node::local(0), "+", int(1))).boxed()),
            check_first: true,
            until: true,
            nonlocal_flow: false,
        },
        puts(Node::local(0)),
    ]);

    assert_eq!(output_of("until", &root, scope), "3\n");
}

#[test]
fn break_gives_the_loop_its_value() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["x", "y"]));
    let root = script(vec![
        Node::assign(0, while_loop(Node::True, Node::Break(Some(int(42).boxed())))),
        Node::assign(1, while_loop(Node::False, Node::Nil)),
        puts(Node::local(0)),
        Node::fcall("p", vec![Node::local(1)]),
    ]);

    assert_eq!(output_of("break_value", &root, scope), "42\nnil\n");
}

#[test]
fn next_skips_the_rest_of_the_body() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i"]));
    let root = script(vec![
        Node::assign(0, int(0)),
        while_loop(
            binop(Node::local(0), "<", int(5)),
            Node::Block(vec![
                Node::assign(0, binop(Node::local(0), "+", int(1))),
                if_then(Node::call(Node::local(0), "even?", vec![]), Node::Next(None)),
                Node::fcall("print", vec![Node::local(0)]),
            ]),
        ),
    ]);

    assert_eq!(output_of("next", &root, scope), "135");
}

#[test]
fn redo_restarts_the_body_without_checking_the_condition() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i", "redone"]));
    let root = script(vec![
        Node::assign(0, int(0)),
        Node::assign(1, Node::False),
        while_loop(
            binop(Node::local(0), "<", int(2)),
            Node::Block(vec![
                Node::assign(0, binop(Node::local(0), "+", int(1))),
                if_then(
                    Node::And(
                        binop(Node::local(0), "==", int(2)).boxed(),
                        Node::Not(Node::local(1).boxed()).boxed(),
                    ),
                    Node::Block(vec![Node::assign(1, Node::True), Node::Redo]),
                ),
                Node::fcall("print", vec![Node::local(0)]),
            ]),
        ),
    ]);

    assert_eq!(output_of("redo", &root, scope), "13");
}

#[test]
fn break_from_a_block_ends_the_call() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["r"]));
    let block = &*arena.alloc(StaticScope::block(scope, &["x"]));
    let closure = Closure {
        scope: block,
        args: BlockArgs::locals(&[0]),
        body: Some(
            if_then(
                binop(Node::local(0), "==", int(2)),
                Node::Break(Some(binop(Node::local(0), "*", int(10)).boxed())),
            )
            .boxed(),
        ),
        position: Position::line(1),
    };
    let root = script(vec![
        Node::assign(
            0,
            with_block(
                Node::call(Node::Array(vec![int(1), int(2), int(3)]), "each", vec![]),
                closure,
            ),
        ),
        puts(Node::local(0)),
    ]);

    assert_eq!(output_of("block_break", &root, scope), "20\n");
}

#[test]
fn next_in_a_block_gives_the_yield_its_value() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let block = &*arena.alloc(StaticScope::block(scope, &["x"]));
    let closure = Closure {
        scope: block,
        args: BlockArgs::locals(&[0]),
        body: Some(
            Node::Block(vec![
                if_then(
                    binop(Node::local(0), "==", int(2)),
                    Node::Next(Some(int(0).boxed())),
                ),
                Node::local(0),
            ])
            .boxed(),
        ),
        position: Position::line(1),
    };
    let root = script(vec![Node::fcall(
        "p",
        vec![with_block(
            Node::call(Node::Array(vec![int(1), int(2), int(3)]), "map", vec![]),
            closure,
        )],
    )]);

    assert_eq!(output_of("block_next", &root, scope), "[1, 0, 3]\n");
}

#[test]
fn blocks_update_variables_of_the_enclosing_scope() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i"]).with_captured(&[0]));
    let block = &*arena.alloc(StaticScope::block(scope, &[]));
    let closure = Closure {
        scope: block,
        args: BlockArgs::none(),
        body: Some(
            Node::Block(vec![
                assign_outer(0, 1, binop(outer(0, 1), "+", int(1))),
                if_then(binop(outer(0, 1), "==", int(3)), Node::Break(None)),
            ])
            .boxed(),
        ),
        position: Position::line(2),
    };
    let root = script(vec![
        Node::assign(0, int(0)),
        with_block(Node::VCall("loop".to_string()), closure),
        puts(Node::local(0)),
    ]);

    assert_eq!(output_of("loop_block", &root, scope), "3\n");
}

#[test]
fn case_dispatches_through_case_equality() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["x"]));
    let range = |begin, end| Node::Range {
        begin: int(begin).boxed(),
        end: int(end).boxed(),
        exclusive: false,
    };
    let classify = |subject: Node<'static>| Node::Case {
        subject: Some(subject.boxed()),
        whens: vec![
            When {
                values: vec![range(1, 3)],
                body: Some(Node::str("low").boxed()),
            },
            When {
                values: vec![range(4, 6), int(10)],
                body: Some(Node::str("mid").boxed()),
            },
            When {
                values: vec![Node::Const("String".to_string())],
                body: Some(Node::str("text").boxed()),
            },
        ],
        else_branch: Some(Node::str("other").boxed()),
    };
    let root = script(vec![
        Node::assign(0, int(5)),
        puts(classify(Node::local(0))),
        puts(classify(int(10))),
        puts(classify(Node::str("five"))),
        puts(classify(int(2))),
        puts(classify(Node::Nil)),
    ]);

    assert_eq!(
        output_of("case", &root, scope),
        "mid\nmid\ntext\nlow\nother\n"
    );
}

#[test]
fn case_without_subject_tests_each_condition() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["x"]));
    let root = script(vec![
        Node::assign(0, int(7)),
        puts(Node::Case {
            subject: None,
            whens: vec![
                When {
                    values: vec![binop(Node::local(0), "<", int(5))],
                    body: Some(Node::str("small").boxed()),
                },
                When {
                    values: vec![binop(Node::local(0), "<", int(10))],
                    body: Some(Node::str("medium").boxed()),
                },
            ],
            else_branch: None,
        }),
    ]);

    assert_eq!(output_of("case_bare", &root, scope), "medium\n");
}

#[test]
fn short_circuit_operators_keep_operand_values() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["a"]));
    let root = script(vec![
        puts(Node::Or(Node::Nil.boxed(), Node::str("default").boxed())),
        Node::fcall("p", vec![Node::And(int(1).boxed(), Node::Nil.boxed())]),
        Node::fcall("p", vec![Node::Not(int(0).boxed())]),
        Node::OpAsgnOr {
            read: Node::local(0).boxed(),
            assign: Node::assign(0, int(5)).boxed(),
        },
        Node::OpAsgnOr {
            read: Node::local(0).boxed(),
            assign: Node::assign(0, int(6)).boxed(),
        },
        puts(Node::local(0)),
    ]);

    assert_eq!(
        output_of("short_circuit", &root, scope),
        "default\nnil\nfalse\n5\n"
    );
}

#[test]
fn loops_with_signals_survive_outlining() {
    // `break` inside a rescue region of a loop body arrives as a signal
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i"]));
    let body = Node::Block(vec![
        Node::assign(0, binop(Node::local(0), "+", int(1))),
        Node::Rescue {
            body: Some(
                if_then(
                    binop(Node::local(0), "==", int(3)),
                    Node::Break(Some(Node::str("stopped").boxed())),
                )
                .boxed(),
            ),
            clauses: vec![RescueClause {
                exceptions: vec![],
                body: Some(puts(Node::str("rescued")).boxed()),
            }],
            else_branch: None,
        },
    ]);
    let root = script(vec![
        Node::assign(0, int(0)),
        puts(Node::While {
            cond: Node::True.boxed(),
            body: Some(body.boxed()),
            check_first: true,
            until: false,
            nonlocal_flow: true,
        }),
        puts(Node::local(0)),
    ]);

    for outline in [true, false] {
        let mut settings = settings("loop_signals");
        settings.outline_exception_regions = outline;
        let outcome = run_with(settings, &root, scope);
        assert!(outcome.result.is_ok(), "outline: {}", outline);
        assert_eq!(outcome.output(), "stopped\n3\n", "outline: {}", outline);
    }
}

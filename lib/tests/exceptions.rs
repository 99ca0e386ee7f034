mod harness;

use harness::*;
use rb2class::compiler::ir::{
    ArgsSpec, ConstPath, MethodDef, Node, Position, RescueClause, ScopeArena, StaticScope,
};

fn raise<'s>(message: &str) -> Node<'s> {
    Node::fcall("raise", vec![Node::str(message)])
}

fn raise_class<'s>(class: &str, message: &str) -> Node<'s> {
    Node::fcall("raise", vec![constant(class), Node::str(message)])
}

fn constant<'s>(name: &str) -> Node<'s> {
    Node::Const(name.to_string())
}

fn error_message<'s>() -> Node<'s> {
    Node::call(Node::GlobalVar("$!".to_string()), "message", vec![])
}

fn rescue<'s>(body: Node<'s>, clauses: Vec<RescueClause<'s>>) -> Node<'s> {
    Node::Rescue {
        body: Some(body.boxed()),
        clauses,
        else_branch: None,
    }
}

fn clause<'s>(exceptions: &[&str], body: Node<'s>) -> RescueClause<'s> {
    RescueClause {
        exceptions: exceptions.iter().map(|name| constant(name)).collect(),
        body: Some(body.boxed()),
    }
}

fn ensure<'s>(body: Node<'s>, cleanup: Node<'s>) -> Node<'s> {
    Node::Ensure {
        body: Some(body.boxed()),
        ensure: Some(cleanup.boxed()),
    }
}

/// Exception regions compile both outlined and inline; either way the script must behave the same
fn output_both_ways<'s>(name: &str, root: &Node<'s>, scope: &'s StaticScope<'s>) -> String {
    let mut outputs = vec![];
    for outline in [true, false] {
        let mut settings = settings(name);
        settings.outline_exception_regions = outline;
        let outcome = run_with(settings, root, scope);
        if let Err(unwind) = &outcome.result {
            panic!("{} (outline: {}) unwound: {}", name, outline, unwind);
        }
        outputs.push(outcome.output().to_string());
    }
    assert_eq!(outputs[0], outputs[1], "outlined and inline regions disagree");
    outputs.remove(0)
}

#[test]
fn rescue_sets_and_restores_error_info() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        rescue(
            Node::Block(vec![raise("boom"), puts(Node::str("unreachable"))]),
            vec![clause(&[], puts(error_message()))],
        ),
        Node::fcall("p", vec![Node::GlobalVar("$!".to_string())]),
    ]);

    assert_eq!(output_both_ways("rescue", &root, scope), "boom\nnil\n");
}

#[test]
fn rescue_clauses_match_by_class() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![rescue(
        raise_class("ArgumentError", "bad"),
        vec![
            clause(&["TypeError"], puts(Node::str("type"))),
            clause(
                &["NameError", "ArgumentError"],
                puts(Node::DStr(vec![Node::str("argument: "), error_message()])),
            ),
            clause(&[], puts(Node::str("standard"))),
        ],
    )]);

    assert_eq!(output_both_ways("rescue_class", &root, scope), "argument: bad\n");
}

#[test]
fn unmatched_exceptions_keep_propagating() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        puts(Node::str("before")),
        rescue(
            raise_class("TypeError", "wrong type"),
            vec![clause(&["ArgumentError"], puts(Node::str("rescued")))],
        ),
        puts(Node::str("after")),
    ]);

    let outcome = run("unmatched", &root, scope);
    assert_eq!(outcome.output(), "before\n");
    assert_eq!(
        outcome.raised(),
        ("TypeError".to_string(), "wrong type".to_string())
    );
}

#[test]
fn else_branch_runs_when_nothing_is_raised() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![Node::Rescue {
        body: Some(puts(Node::str("body")).boxed()),
        clauses: vec![clause(&[], puts(Node::str("rescue")))],
        else_branch: Some(puts(Node::str("else")).boxed()),
    }]);

    assert_eq!(output_both_ways("rescue_else", &root, scope), "body\nelse\n");
}

#[test]
fn rescue_is_an_expression() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["x"]));
    let root = script(vec![
        Node::assign(
            0,
            binop(
                int(1),
                "+",
                rescue(raise("inner"), vec![clause(&[], int(7))]),
            ),
        ),
        puts(Node::local(0)),
    ]);

    assert_eq!(output_both_ways("rescue_value", &root, scope), "8\n");
}

#[test]
fn retry_runs_the_body_again() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["attempts"]));
    let root = script(vec![
        Node::assign(0, int(0)),
        rescue(
            Node::Block(vec![
                Node::assign(0, binop(Node::local(0), "+", int(1))),
                if_then(binop(Node::local(0), "<", int(3)), raise("again")),
                puts(Node::local(0)),
            ]),
            vec![clause(&[], Node::Retry)],
        ),
    ]);

    assert_eq!(output_both_ways("retry", &root, scope), "3\n");
}

#[test]
fn ensure_runs_once_on_every_exit() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["x"]));
    let root = script(vec![
        // normal completion keeps the body's value
        Node::assign(
            0,
            ensure(
                Node::Block(vec![puts(Node::str("body")), int(1)]),
                Node::Block(vec![puts(Node::str("cleanup 1")), int(2)]),
            ),
        ),
        puts(Node::local(0)),
        // raise
        rescue(
            ensure(raise("failed"), puts(Node::str("cleanup 2"))),
            vec![clause(&[], puts(error_message()))],
        ),
        // break
        Node::While {
            cond: Node::True.boxed(),
            body: Some(ensure(Node::Break(None), puts(Node::str("cleanup 3"))).boxed()),
            check_first: true,
            until: false,
            nonlocal_flow: true,
        },
        puts(Node::str("done")),
    ]);

    assert_eq!(
        output_both_ways("ensure", &root, scope),
        "body\ncleanup 1\n1\ncleanup 2\nfailed\ncleanup 3\ndone\n"
    );
}

#[test]
fn ensure_runs_once_when_next_ends_an_iteration() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i"]));
    let root = script(vec![
        Node::assign(0, int(0)),
        Node::While {
            cond: binop(Node::local(0), "<", int(2)).boxed(),
            body: Some(
                ensure(
                    Node::Block(vec![
                        Node::assign(0, binop(Node::local(0), "+", int(1))),
                        if_then(binop(Node::local(0), "==", int(1)), Node::Next(None)),
                        puts(Node::str("body")),
                    ]),
                    puts(Node::str("cleanup")),
                )
                .boxed(),
            ),
            check_first: true,
            until: false,
            nonlocal_flow: true,
        },
        puts(Node::local(0)),
    ]);

    assert_eq!(
        output_both_ways("ensure_next", &root, scope),
        "cleanup\nbody\ncleanup\n2\n"
    );
}

#[test]
fn once_regexps_in_ensure_clauses_are_built_once() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i"]));
    let matched = Node::Match3 {
        value: Node::str("xa1").boxed(),
        regexp: Node::DRegexp {
            parts: vec![Node::str("a"), Node::local(0)],
            options: 0,
            once: true,
        }
        .boxed(),
    };
    // the first pass leaves normally, the second through `break`
    let root = script(vec![
        Node::assign(0, int(0)),
        Node::While {
            cond: Node::True.boxed(),
            body: Some(
                ensure(
                    Node::Block(vec![
                        Node::assign(0, binop(Node::local(0), "+", int(1))),
                        if_then(binop(Node::local(0), "==", int(2)), Node::Break(None)),
                    ]),
                    puts(matched),
                )
                .boxed(),
            ),
            check_first: true,
            until: false,
            nonlocal_flow: true,
        },
    ]);

    let mut inline = settings("once");
    inline.outline_exception_regions = false;
    let artifact = compile(inline, &root, scope).expect("compiles");
    let once_fields = artifact
        .fields()
        .iter()
        .filter(|field| field.name.to_string().starts_with("once"))
        .count();
    assert_eq!(once_fields, 1);

    assert_eq!(output_both_ways("once", &root, scope), "1\n1\n");
}

#[test]
fn ensure_runs_when_a_method_returns_early() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let method_scope = &*arena.alloc(StaticScope::local(&[]));
    let def = Node::Defn(MethodDef {
        name: "early".to_string(),
        scope: method_scope,
        args: ArgsSpec::none(),
        body: Some(
            ensure(
                Node::Block(vec![
                    Node::Return(Some(int(1).boxed())),
                    puts(Node::str("unreachable")),
                ]),
                puts(Node::str("cleanup")),
            )
            .boxed(),
        ),
        position: Position::line(1),
    });
    let root = script(vec![def, puts(Node::VCall("early".to_string()))]);

    assert_eq!(output_both_ways("ensure_return", &root, scope), "cleanup\n1\n");
}

#[test]
fn custom_exception_classes_are_rescued_by_ancestor() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["e"]));
    let class_scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        Node::Class {
            path: ConstPath::Unscoped("AppError".to_string()),
            superclass: Some(constant("StandardError").boxed()),
            scope: class_scope,
            body: None,
            position: Position::line(1),
        },
        rescue(
            raise_class("AppError", "custom"),
            vec![clause(
                &["StandardError"],
                Node::Block(vec![
                    Node::assign(0, Node::GlobalVar("$!".to_string())),
                    puts(Node::DStr(vec![
                        Node::call(
                            Node::call(Node::local(0), "class", vec![]),
                            "name",
                            vec![],
                        ),
                        Node::str(": "),
                        Node::call(Node::local(0), "message", vec![]),
                    ])),
                ]),
            )],
        ),
        Node::fcall("p", vec![Node::call(constant("AppError"), "ancestors", vec![])]),
    ]);

    assert_eq!(
        output_both_ways("custom_error", &root, scope),
        "AppError: custom\n[AppError, StandardError, Exception, Object, Kernel]\n"
    );
}

#[test]
fn wrong_argument_counts_raise_argument_errors() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let method_scope = &*arena.alloc(StaticScope::local(&["a", "b"]).with_args(2, 0, None));
    let root = script(vec![
        Node::Defn(MethodDef {
            name: "pair".to_string(),
            scope: method_scope,
            args: ArgsSpec::required(2),
            body: Some(binop(Node::local(0), "+", Node::local(1)).boxed()),
            position: Position::line(1),
        }),
        puts(Node::fcall("pair", vec![int(1), int(2)])),
        rescue(
            Node::fcall("pair", vec![int(1)]),
            vec![clause(&["ArgumentError"], puts(error_message()))],
        ),
    ]);

    assert_eq!(
        output_both_ways("arity", &root, scope),
        "3\nwrong number of arguments (given 1, expected 2)\n"
    );
}

#[test]
fn missing_methods_raise_no_method_error() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![Node::call(Node::Nil, "frobnicate", vec![])]);

    let outcome = run("missing", &root, scope);
    assert_eq!(
        outcome.raised(),
        (
            "NoMethodError".to_string(),
            "undefined method `frobnicate' for nil:NilClass".to_string()
        )
    );
}

#[test]
fn undefined_bare_identifiers_raise_name_error() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![Node::VCall("nothing_here".to_string())]);

    let outcome = run("vcall", &root, scope);
    assert_eq!(
        outcome.raised(),
        (
            "NameError".to_string(),
            "undefined local variable or method `nothing_here' for main:Object".to_string()
        )
    );
}

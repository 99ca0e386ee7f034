mod harness;

use harness::*;
use rb2class::compiler::ir::{
    ArgsSpec, BlockArgs, Closure, ConstPath, MethodDef, Node, Position, Rest, ScopeArena,
    StaticScope,
};

fn def<'s>(
    name: &str,
    scope: &'s StaticScope<'s>,
    args: ArgsSpec<'s>,
    body: Node<'s>,
) -> Node<'s> {
    Node::Defn(MethodDef {
        name: name.to_string(),
        scope,
        args,
        body: Some(body.boxed()),
        position: Position::line(1),
    })
}

fn class<'s>(
    name: &str,
    superclass: Option<&str>,
    scope: &'s StaticScope<'s>,
    body: Node<'s>,
) -> Node<'s> {
    Node::Class {
        path: ConstPath::Unscoped(name.to_string()),
        superclass: superclass.map(|name| Node::Const(name.to_string()).boxed()),
        scope,
        body: Some(body.boxed()),
        position: Position::line(1),
    }
}

fn new<'s>(class: &str, args: Vec<Node<'s>>) -> Node<'s> {
    Node::call(Node::Const(class.to_string()), "new", args)
}

fn closure<'s>(scope: &'s StaticScope<'s>, params: &[usize], body: Node<'s>) -> Closure<'s> {
    Closure {
        scope,
        args: BlockArgs::locals(params),
        body: Some(body.boxed()),
        position: Position::line(1),
    }
}

#[test]
fn specific_arity_methods_take_positional_arguments() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let add = &*arena.alloc(StaticScope::local(&["a", "b"]).with_args(2, 0, None));
    let root = script(vec![
        def(
            "add",
            add,
            ArgsSpec::required(2),
            binop(Node::local(0), "+", Node::local(1)),
        ),
        puts(Node::fcall("add", vec![int(2), int(3)])),
        // splatted arguments are spread before dispatch
        puts(Node::fcall(
            "add",
            vec![Node::Splat(Node::Array(vec![int(4), int(5)]).boxed())],
        )),
    ]);

    assert_eq!(output_of("add", &root, scope), "5\n9\n");
}

#[test]
fn optional_and_rest_parameters_bind_from_boxed_arguments() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let greet = &*arena.alloc(StaticScope::local(&["name", "greeting"]).with_args(1, 1, None));
    let count = &*arena.alloc(StaticScope::local(&["first", "rest"]).with_args(1, 0, Some(1)));
    let root = script(vec![
        def(
            "greet",
            greet,
            ArgsSpec {
                required: vec![0],
                optional: vec![(1, Node::str("Hello"))],
                rest: Rest::None,
                block: None,
            },
            Node::DStr(vec![Node::local(1), Node::str(", "), Node::local(0)]),
        ),
        def(
            "count",
            count,
            ArgsSpec {
                required: vec![0],
                optional: vec![],
                rest: Rest::Named(1),
                block: None,
            },
            Node::Array(vec![Node::local(0), Node::call(Node::local(1), "size", vec![])]),
        ),
        puts(Node::fcall("greet", vec![Node::str("world")])),
        puts(Node::fcall("greet", vec![Node::str("you"), Node::str("Bye")])),
        Node::fcall("p", vec![Node::fcall("count", vec![int(1), int(2), int(3)])]),
        Node::fcall("p", vec![Node::fcall("count", vec![int(1)])]),
    ]);

    assert_eq!(
        output_of("optional", &root, scope),
        "Hello, world\nBye, you\n[1, 2]\n[1, 0]\n"
    );
}

#[test]
fn yield_calls_the_block_of_the_method() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let twice = &*arena.alloc(StaticScope::local(&[]));
    let maybe = &*arena.alloc(StaticScope::local(&[]));
    let block = &*arena.alloc(StaticScope::block(scope, &["x"]));
    let root = script(vec![
        def(
            "twice",
            twice,
            ArgsSpec::none(),
            Node::Block(vec![Node::Yield(vec![int(1)]), Node::Yield(vec![int(2)])]),
        ),
        def(
            "maybe",
            maybe,
            ArgsSpec::none(),
            if_else(
                Node::fcall("block_given?", vec![]),
                Node::str("block"),
                Node::str("none"),
            ),
        ),
        with_block(
            Node::fcall("twice", vec![]),
            closure(block, &[0], puts(binop(Node::local(0), "*", int(10)))),
        ),
        puts(Node::fcall("maybe", vec![])),
        puts(with_block(
            Node::fcall("maybe", vec![]),
            Closure {
                scope: &*arena.alloc(StaticScope::block(scope, &[])),
                args: BlockArgs::none(),
                body: None,
                position: Position::line(1),
            },
        )),
    ]);

    assert_eq!(
        output_of("yield", &root, scope),
        "10\n20\nnone\nblock\n"
    );
}

#[test]
fn yield_without_a_block_raises_local_jump_error() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let body = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        def("needs_block", body, ArgsSpec::none(), Node::Yield(vec![])),
        Node::fcall("needs_block", vec![]),
    ]);

    let outcome = run("no_block", &root, scope);
    assert_eq!(
        outcome.raised(),
        (
            "LocalJumpError".to_string(),
            "no block given (yield)".to_string()
        )
    );
}

#[test]
fn closures_capture_variables_of_methods() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let method = &*arena.alloc(StaticScope::local(&["total"]).with_captured(&[0]));
    let block = &*arena.alloc(StaticScope::block(method, &["x"]));
    let root = script(vec![
        def(
            "sum",
            method,
            ArgsSpec::none(),
            Node::Block(vec![
                Node::assign(0, int(0)),
                with_block(
                    Node::call(Node::Array(vec![int(1), int(2), int(3)]), "each", vec![]),
                    closure(
                        block,
                        &[0],
                        assign_outer(0, 1, binop(outer(0, 1), "+", Node::local(0))),
                    ),
                ),
                Node::local(0),
            ]),
        ),
        puts(Node::fcall("sum", vec![])),
    ]);

    assert_eq!(output_of("capture", &root, scope), "6\n");
}

#[test]
fn return_from_a_proc_leaves_the_method_but_a_lambda_only_leaves_itself() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let with_proc = &*arena.alloc(StaticScope::local(&["pr"]));
    let with_lambda = &*arena.alloc(StaticScope::local(&["l"]));
    let proc_block = &*arena.alloc(StaticScope::block(with_proc, &[]));
    let lambda_block = &*arena.alloc(StaticScope::block(with_lambda, &[]));
    let root = script(vec![
        def(
            "from_proc",
            with_proc,
            ArgsSpec::none(),
            Node::Block(vec![
                Node::assign(
                    0,
                    with_block(
                        Node::fcall("proc", vec![]),
                        closure(proc_block, &[], Node::Return(Some(Node::str("proc").boxed()))),
                    ),
                ),
                Node::call(Node::local(0), "call", vec![]),
                Node::str("method"),
            ]),
        ),
        def(
            "from_lambda",
            with_lambda,
            ArgsSpec::none(),
            Node::Block(vec![
                Node::assign(
                    0,
                    Node::Lambda(closure(
                        lambda_block,
                        &[],
                        Node::Return(Some(Node::str("lambda").boxed())),
                    )),
                ),
                Node::call(Node::local(0), "call", vec![]),
                Node::str("method"),
            ]),
        ),
        puts(Node::fcall("from_proc", vec![])),
        puts(Node::fcall("from_lambda", vec![])),
    ]);

    assert_eq!(output_of("returns", &root, scope), "proc\nmethod\n");
}

#[test]
fn lambdas_check_their_arity() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["l"]));
    let block = &*arena.alloc(StaticScope::block(scope, &["a", "b"]));
    let root = script(vec![
        Node::assign(
            0,
            Node::Lambda(closure(block, &[0, 1], binop(Node::local(0), "+", Node::local(1)))),
        ),
        puts(Node::call(Node::local(0), "call", vec![int(1), int(2)])),
        Node::call(Node::local(0), "call", vec![int(1)]),
    ]);

    let outcome = run("lambda_arity", &root, scope);
    assert_eq!(outcome.output(), "3\n");
    assert_eq!(
        outcome.raised(),
        (
            "ArgumentError".to_string(),
            "wrong number of arguments (given 1, expected 2)".to_string()
        )
    );
}

#[test]
fn classes_with_initialize_accessors_and_super() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["pt"]));
    let point_body = &*arena.alloc(StaticScope::local(&[]));
    let init = &*arena.alloc(StaticScope::local(&["x", "y"]).with_args(2, 0, None));
    let describe = &*arena.alloc(StaticScope::local(&[]));
    let labeled_body = &*arena.alloc(StaticScope::local(&[]));
    let labeled_describe = &*arena.alloc(StaticScope::local(&[]));

    let point = class(
        "Point",
        None,
        point_body,
        Node::Block(vec![
            Node::fcall("attr_accessor", vec![Node::sym("x"), Node::sym("y")]),
            def(
                "initialize",
                init,
                ArgsSpec::required(2),
                Node::Block(vec![
                    Node::InstAsgn {
                        name: "@x".to_string(),
                        value: Some(Node::local(0).boxed()),
                    },
                    Node::InstAsgn {
                        name: "@y".to_string(),
                        value: Some(Node::local(1).boxed()),
                    },
                ]),
            ),
            def(
                "describe",
                describe,
                ArgsSpec::none(),
                Node::DStr(vec![
                    Node::str("("),
                    Node::InstVar("@x".to_string()),
                    Node::str(", "),
                    Node::InstVar("@y".to_string()),
                    Node::str(")"),
                ]),
            ),
        ]),
    );
    let labeled = class(
        "Labeled",
        Some("Point"),
        labeled_body,
        def(
            "describe",
            labeled_describe,
            ArgsSpec::none(),
            binop(Node::str("point "), "+", Node::ZSuper { iter: None }),
        ),
    );
    let root = script(vec![
        point,
        labeled,
        Node::assign(0, new("Labeled", vec![int(1), int(2)])),
        Node::AttrAssign {
            receiver: Node::local(0).boxed(),
            name: "x=".to_string(),
            args: vec![int(5)],
        },
        puts(Node::call(Node::local(0), "describe", vec![])),
        puts(Node::call(Node::local(0), "x", vec![])),
        puts(Node::call(Node::Const("Labeled".to_string()), "superclass", vec![])),
    ]);

    assert_eq!(
        output_of("classes", &root, scope),
        "point (5, 2)\n5\nPoint\n"
    );
}

#[test]
fn private_methods_reject_explicit_receivers() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let body = &*arena.alloc(StaticScope::local(&[]));
    let secret = &*arena.alloc(StaticScope::local(&[]));
    let reveal = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        class(
            "Vault",
            None,
            body,
            Node::Block(vec![
                def(
                    "reveal",
                    reveal,
                    ArgsSpec::none(),
                    Node::fcall("secret", vec![]),
                ),
                Node::fcall("private", vec![]),
                def("secret", secret, ArgsSpec::none(), Node::str("hidden")),
            ]),
        ),
        puts(Node::call(new("Vault", vec![]), "reveal", vec![])),
        Node::call(new("Vault", vec![]), "secret", vec![]),
    ]);

    let outcome = run("private", &root, scope);
    assert_eq!(outcome.output(), "hidden\n");
    assert_eq!(
        outcome.raised(),
        (
            "NoMethodError".to_string(),
            "private method `secret' called for an instance of Vault".to_string()
        )
    );
}

#[test]
fn singleton_methods_and_modules() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let greeter_body = &*arena.alloc(StaticScope::local(&[]));
    let hello = &*arena.alloc(StaticScope::local(&[]));
    let widget_body = &*arena.alloc(StaticScope::local(&[]));
    let build = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        Node::Module {
            path: ConstPath::Unscoped("Greeter".to_string()),
            scope: greeter_body,
            body: Some(
                def(
                    "hello",
                    hello,
                    ArgsSpec::none(),
                    binop(Node::str("hello from "), "+", Node::call(
                        Node::call(Node::SelfRef, "class", vec![]),
                        "name",
                        vec![],
                    )),
                )
                .boxed(),
            ),
            position: Position::line(1),
        },
        class(
            "Widget",
            None,
            widget_body,
            Node::Block(vec![
                Node::fcall("include", vec![Node::Const("Greeter".to_string())]),
                Node::Defs {
                    receiver: Node::SelfRef.boxed(),
                    def: MethodDef {
                        name: "build".to_string(),
                        scope: build,
                        args: ArgsSpec::none(),
                        body: Some(Node::fcall("new", vec![]).boxed()),
                        position: Position::line(3),
                    },
                },
            ]),
        ),
        puts(Node::call(
            Node::call(Node::Const("Widget".to_string()), "build", vec![]),
            "hello",
            vec![],
        )),
        Node::fcall(
            "p",
            vec![Node::call(
                Node::Const("Widget".to_string()),
                "include?",
                vec![Node::Const("Greeter".to_string())],
            )],
        ),
    ]);

    assert_eq!(
        output_of("singleton", &root, scope),
        "hello from Widget\ntrue\n"
    );
}

#[test]
fn redefinition_invalidates_call_site_caches() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["i"]));
    let first = &*arena.alloc(StaticScope::local(&[]));
    let second = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        def("version", first, ArgsSpec::none(), int(1)),
        Node::assign(0, int(0)),
        while_loop(
            binop(Node::local(0), "<", int(2)),
            Node::Block(vec![
                Node::fcall("print", vec![Node::fcall("version", vec![])]),
                def("version", second, ArgsSpec::none(), int(2)),
                Node::assign(0, binop(Node::local(0), "+", int(1))),
            ]),
        ),
    ]);

    assert_eq!(output_of("redefine", &root, scope), "12");
}

#[test]
fn classes_without_initialize_take_the_default() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let body = &*arena.alloc(StaticScope::local(&[]));
    let bar = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        class("Foo", None, body, def("bar", bar, ArgsSpec::none(), int(7))),
        puts(Node::call(new("Foo", vec![]), "bar", vec![])),
        Node::fcall(
            "p",
            vec![Node::call(new("Foo", vec![]), "respond_to?", vec![Node::sym("initialize")])],
        ),
    ]);

    assert_eq!(output_of("plain_class", &root, scope), "7\nfalse\n");
}

#[test]
fn packed_arguments_enter_through_the_boxed_routine() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let add = &*arena.alloc(StaticScope::local(&["a", "b"]).with_args(2, 0, None));
    let define = || {
        def(
            "add",
            add,
            ArgsSpec::required(2),
            binop(Node::local(0), "*", Node::local(1)),
        )
    };
    let root = script(vec![
        define(),
        puts(Node::fcall("add", vec![int(6), int(7)])),
        // `send` hands the arguments over as one list
        puts(Node::fcall("send", vec![Node::sym("add"), int(6), int(7)])),
    ]);

    let artifact = compile(settings("entries"), &root, scope).expect("compiles");
    let names: Vec<String> = artifact
        .routines()
        .iter()
        .map(|routine| routine.name.to_string())
        .filter(|name| name.starts_with("method__"))
        .collect();
    assert_eq!(names.len(), 2, "{:?}", names);
    assert!(names.iter().any(|name| name.ends_with("$boxed")));

    assert_eq!(output_of("entries", &root, scope), "42\n42\n");

    let calls = vec![
        (Node::fcall("add", vec![int(1), int(2), int(3)]), 3),
        (Node::fcall("send", vec![Node::sym("add"), int(1), int(2), int(3)]), 3),
        (Node::fcall("send", vec![Node::sym("add"), int(1)]), 1),
    ];
    for (call, given) in calls {
        let root = script(vec![define(), call]);
        let outcome = run("entries", &root, scope);
        assert_eq!(
            outcome.raised(),
            (
                "ArgumentError".to_string(),
                format!("wrong number of arguments (given {}, expected 2)", given)
            )
        );
    }
}

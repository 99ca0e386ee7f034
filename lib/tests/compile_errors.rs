mod harness;

use harness::*;
use rb2class::compiler::ir::{
    ArgsSpec, BlockArgs, Closure, MethodDef, Node, Position, ScopeArena, StaticScope,
};
use rb2class::compiler::{Error, Settings, SourcePosition};

#[test]
fn block_argument_outside_a_call_is_not_compilable() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["pr"]));
    let root = script(vec![
        Node::assign(0, Node::Nil),
        Node::BlockPass(Node::local(0).boxed()),
    ]);

    match compile(settings("bad"), &root, scope) {
        Err(TestError::Compilation(Error::NotCompilable { construct, position })) => {
            assert_eq!(construct, "block argument outside of a call");
            assert_eq!(
                position,
                Some(SourcePosition {
                    file: "bad.rb".to_string(),
                    line: 2,
                })
            );
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("compiled a stray block argument"),
    }
}

#[test]
fn multiple_assignment_needs_a_value() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&["a", "b"]));
    let root = script(vec![Node::MultipleAsgn {
        targets: vec![
            Node::LocalAsgn {
                index: 0,
                depth: 0,
                value: None,
            },
            Node::LocalAsgn {
                index: 1,
                depth: 0,
                value: None,
            },
        ],
        rest: None,
        value: None,
    }]);

    let err = compile(settings("masgn"), &root, scope).err();
    assert!(
        matches!(
            err,
            Some(TestError::Compilation(Error::NotCompilable { .. }))
        ),
        "{:?}",
        err
    );
}

#[test]
fn loops_with_signals_in_methods_with_closures_run_on_heap_storage() {
    // the block alone would pick boxed storage, and the loop starts on a non-empty stack
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let method = &*arena.alloc(StaticScope::local(&["i"]));
    let block = &*arena.alloc(StaticScope::block(method, &["y"]));
    let body = Node::Block(vec![
        Node::assign(0, int(0)),
        Node::newline(
            4,
            binop(
                int(1),
                "+",
                Node::While {
                    cond: Node::True.boxed(),
                    body: Some(
                        Node::Block(vec![
                            with_block(
                                Node::call(Node::Array(vec![int(1)]), "each", vec![]),
                                Closure {
                                    scope: block,
                                    args: BlockArgs::locals(&[0]),
                                    body: None,
                                    position: Position::line(4),
                                },
                            ),
                            Node::Break(Some(int(2).boxed())),
                        ])
                        .boxed(),
                    ),
                    check_first: true,
                    until: false,
                    nonlocal_flow: true,
                },
            ),
        ),
    ]);
    let root = script(vec![
        Node::Defn(MethodDef {
            name: "tight".to_string(),
            scope: method,
            args: ArgsSpec::none(),
            body: Some(body.boxed()),
            position: Position::line(3),
        }),
        puts(Node::fcall("tight", vec![])),
    ]);

    let artifact = compile(settings("tight"), &root, scope).expect("compiles");
    assert!(artifact
        .routines()
        .iter()
        .any(|routine| routine.name.to_string().starts_with("rescue_")));
    assert_eq!(output_of("tight", &root, scope), "3\n");
}

#[test]
fn the_same_loop_compiles_at_the_top_level() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![puts(binop(
        int(1),
        "+",
        Node::While {
            cond: Node::True.boxed(),
            body: Some(Node::Break(Some(int(2).boxed())).boxed()),
            check_first: true,
            until: false,
            nonlocal_flow: true,
        },
    ))]);

    let artifact = compile(settings("loose"), &root, scope).expect("compiles");
    assert!(artifact
        .routines()
        .iter()
        .any(|routine| routine.name.to_string().starts_with("rescue_")));
    assert_eq!(output_of("loose", &root, scope), "3\n");
}

#[test]
fn artifact_names_are_validated() {
    assert!(matches!(
        Settings::new("scripts/a;b", "a.rb"),
        Err(Error::MalformedName(_))
    ));
    assert!(matches!(Settings::new("", "a.rb"), Err(Error::MalformedName(_))));
    assert!(Settings::new("scripts/nested/ok", "ok.rb").is_ok());
}

mod harness;

use harness::*;
use rb2class::compiler::ir::{
    ArgsSpec, ConstPath, MethodDef, Node, Position, ScopeArena, StaticScope,
};
use rb2class::compiler::DynamicLinkage;

fn declare<'s>(name: &str, value: Node<'s>) -> Node<'s> {
    Node::ConstDecl {
        path: ConstPath::Unscoped(name.to_string()),
        value: Some(value.boxed()),
    }
}

fn constant<'s>(name: &str) -> Node<'s> {
    Node::Const(name.to_string())
}

fn def<'s>(name: &str, scope: &'s StaticScope<'s>, body: Node<'s>) -> Node<'s> {
    Node::Defn(MethodDef {
        name: name.to_string(),
        scope,
        args: ArgsSpec::none(),
        body: Some(body.boxed()),
        position: Position::line(1),
    })
}

#[test]
fn cached_constants_see_redefinitions() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let reader = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        declare("X", int(1)),
        def("read", reader, constant("X")),
        puts(Node::fcall("read", vec![])),
        declare("X", int(2)),
        puts(Node::fcall("read", vec![])),
        puts(constant("X")),
    ]);

    for linkage in [DynamicLinkage::NONE, DynamicLinkage::ALL] {
        let mut settings = settings("constants");
        settings.dynamic_linkage = linkage;
        let outcome = run_with(settings, &root, scope);
        assert!(outcome.result.is_ok(), "{:?}", linkage);
        assert_eq!(outcome.output(), "1\n2\n2\n", "{:?}", linkage);
        assert_eq!(outcome.runtime.constant_version("X"), 2);
    }
}

#[test]
fn constants_resolve_through_the_lexical_scope() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let outer = &*arena.alloc(StaticScope::local(&[]));
    let inner = &*arena.alloc(StaticScope::local(&[]));
    let limit = &*arena.alloc(StaticScope::local(&[]));
    let inner_class = Node::Class {
        path: ConstPath::Unscoped("Inner".to_string()),
        superclass: None,
        scope: inner,
        body: Some(def("limit", limit, constant("LIMIT")).boxed()),
        position: Position::line(3),
    };
    let root = script(vec![
        Node::Module {
            path: ConstPath::Unscoped("Outer".to_string()),
            scope: outer,
            body: Some(Node::Block(vec![declare("LIMIT", int(5)), inner_class]).boxed()),
            position: Position::line(1),
        },
        puts(Node::call(
            Node::call(
                Node::Colon2 {
                    scope: constant("Outer").boxed(),
                    name: "Inner".to_string(),
                },
                "new",
                vec![],
            ),
            "limit",
            vec![],
        )),
        puts(Node::Colon2 {
            scope: constant("Outer").boxed(),
            name: "Inner".to_string(),
        }),
        puts(Node::Colon3("Outer".to_string())),
    ]);

    assert_eq!(
        output_of("lexical", &root, scope),
        "5\nOuter::Inner\nOuter\n"
    );
}

#[test]
fn scoped_declarations_land_in_the_named_module() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let config = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![
        Node::Module {
            path: ConstPath::Unscoped("Config".to_string()),
            scope: config,
            body: None,
            position: Position::line(1),
        },
        Node::ConstDecl {
            path: ConstPath::Scoped(constant("Config").boxed(), "PORT".to_string()),
            value: Some(int(8080).boxed()),
        },
        puts(Node::Colon2 {
            scope: constant("Config").boxed(),
            name: "PORT".to_string(),
        }),
        Node::fcall("p", vec![Node::Defined(constant("PORT").boxed())]),
        Node::fcall("p", vec![Node::Defined(constant("Config").boxed())]),
    ]);

    assert_eq!(
        output_of("scoped_constant", &root, scope),
        "8080\nnil\n\"constant\"\n"
    );
}

#[test]
fn missing_constants_raise_name_error() {
    let arena = ScopeArena::new();
    let scope = &*arena.alloc(StaticScope::local(&[]));
    let root = script(vec![puts(constant("Missing"))]);

    for linkage in [DynamicLinkage::NONE, DynamicLinkage::ALL] {
        let mut settings = settings("missing_constant");
        settings.dynamic_linkage = linkage;
        let outcome = run_with(settings, &root, scope);
        assert_eq!(
            outcome.raised(),
            (
                "NameError".to_string(),
                "uninitialized constant Missing".to_string()
            )
        );
    }
}

//! Compile-and-run helpers shared by the integration tests
//!
//! Tests build the annotated tree the way the external analyzer would hand it over, compile it
//! into an artifact and run that artifact on the reference machine.

#![allow(dead_code)]

use rb2class::compiler::ir::{Node, StaticScope};
use rb2class::compiler::{self, Settings};
use rb2class::machine::{Runtime, Unwind, Value};
use rb2class::vm::Artifact;
use std::fmt;

#[derive(Debug)]
pub enum TestError {
    Compilation(compiler::Error),

    /// A signal escaped the loaded script
    Unwound(String),
}

impl From<compiler::Error> for TestError {
    fn from(err: compiler::Error) -> TestError {
        TestError::Compilation(err)
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Compilation(err) => write!(f, "compilation failed: {}", err),
            TestError::Unwound(msg) => write!(f, "script unwound: {}", msg),
        }
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Default settings for a script called `name`
pub fn settings(name: &str) -> Settings {
    Settings::new(format!("scripts/{}", name), format!("{}.rb", name))
        .expect("test artifact names are well formed")
}

/// What running a script left behind
pub struct Outcome {
    pub runtime: Runtime,
    pub result: Result<Value, Unwind>,
}

impl Outcome {
    pub fn output(&self) -> &str {
        self.runtime.output()
    }

    /// Value of the last top-level statement
    pub fn value(&self) -> &Value {
        match &self.result {
            Ok(value) => value,
            Err(unwind) => panic!("script unwound: {}", unwind),
        }
    }

    /// Class name and message of the exception that escaped the script
    pub fn raised(&self) -> (String, String) {
        match &self.result {
            Err(Unwind::Raise(exception)) => (
                self.runtime.real_class_of(exception).name(),
                self.runtime.exception_message(exception),
            ),
            Err(other) => panic!("expected an exception, got {}", other),
            Ok(value) => panic!("expected an exception, got {:?}", value),
        }
    }
}

pub fn compile<'s>(
    settings: Settings,
    root: &Node<'s>,
    scope: &'s StaticScope<'s>,
) -> Result<Artifact, TestError> {
    init_logging();
    Ok(compiler::compile(settings, root, scope)?)
}

/// Compile a script and run it on a fresh runtime
pub fn run_with<'s>(settings: Settings, root: &Node<'s>, scope: &'s StaticScope<'s>) -> Outcome {
    let artifact = match compile(settings, root, scope) {
        Ok(artifact) => artifact,
        Err(err) => panic!("{}", err),
    };
    let mut runtime = Runtime::new();
    let result = match runtime.load(artifact) {
        Ok(instance) => runtime.run(&instance),
        Err(unwind) => panic!("{}", TestError::Unwound(unwind.to_string())),
    };
    Outcome { runtime, result }
}

pub fn run<'s>(name: &str, root: &Node<'s>, scope: &'s StaticScope<'s>) -> Outcome {
    run_with(settings(name), root, scope)
}

/// Run a script and return what it printed, failing if anything escaped it
pub fn output_of<'s>(name: &str, root: &Node<'s>, scope: &'s StaticScope<'s>) -> String {
    let outcome = run(name, root, scope);
    if let Err(unwind) = &outcome.result {
        panic!("script {} unwound: {}", name, unwind);
    }
    outcome.output().to_string()
}

/// Top-level script: one statement per line
pub fn script(statements: Vec<Node<'_>>) -> Node<'_> {
    Node::Block(
        statements
            .into_iter()
            .enumerate()
            .map(|(idx, statement)| Node::newline(idx as u32 + 1, statement))
            .collect(),
    )
}

pub fn puts(value: Node<'_>) -> Node<'_> {
    Node::fcall("puts", vec![value])
}

pub fn int<'s>(value: i64) -> Node<'s> {
    Node::Fixnum(value)
}

pub fn binop<'s>(lhs: Node<'s>, op: &str, rhs: Node<'s>) -> Node<'s> {
    Node::call(lhs, op, vec![rhs])
}

/// Variable of an enclosing scope, `depth` levels up
pub fn outer<'s>(index: usize, depth: usize) -> Node<'s> {
    Node::LocalVar { index, depth }
}

pub fn assign_outer<'s>(index: usize, depth: usize, value: Node<'s>) -> Node<'s> {
    Node::LocalAsgn {
        index,
        depth,
        value: Some(value.boxed()),
    }
}

pub fn if_then<'s>(cond: Node<'s>, then_branch: Node<'s>) -> Node<'s> {
    Node::If {
        cond: cond.boxed(),
        then_branch: Some(then_branch.boxed()),
        else_branch: None,
    }
}

pub fn if_else<'s>(cond: Node<'s>, then_branch: Node<'s>, else_branch: Node<'s>) -> Node<'s> {
    Node::If {
        cond: cond.boxed(),
        then_branch: Some(then_branch.boxed()),
        else_branch: Some(else_branch.boxed()),
    }
}

pub fn while_loop<'s>(cond: Node<'s>, body: Node<'s>) -> Node<'s> {
    Node::While {
        cond: cond.boxed(),
        body: Some(body.boxed()),
        check_first: true,
        until: false,
        nonlocal_flow: false,
    }
}

/// Call with a block literal
pub fn with_block<'s>(call: Node<'s>, closure: rb2class::compiler::ir::Closure<'s>) -> Node<'s> {
    let iter = Some(Node::Iter(closure).boxed());
    match call {
        Node::Call {
            receiver,
            name,
            args,
            ..
        } => Node::Call {
            receiver,
            name,
            args,
            iter,
        },
        Node::FCall { name, args, .. } => Node::FCall { name, args, iter },
        Node::VCall(name) => Node::FCall {
            name,
            args: vec![],
            iter,
        },
        other => panic!("can't attach a block to {:?}", other),
    }
}

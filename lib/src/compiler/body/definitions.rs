//! Closures, method definitions and class bodies
//!
//! Each of these compiles into a routine of its own. Closures and methods also get a descriptor
//! in the artifact, which is how the runtime finds their routines again.

use super::invoke::{BlockSource, Operand};
use super::{BodyCompiler, RoutineSpec, ScopingKind};
use crate::abi::{
    Arity, BlockDescriptor, BlockKind, CallType, CatchType, Descriptor, MethodDescriptor,
    RuntimeHelper, SlotLayout, ARGS, CONTEXT, SELF, THIS,
};
use crate::compiler::cache::CacheKey;
use crate::compiler::ir::{Closure, ConstPath, MethodDef, Node, Position, StaticScope};
use crate::compiler::script::{Counter, ScriptCompiler};
use crate::compiler::variables::StorageKind;
use crate::compiler::{AstInspector, Error};
use crate::vm::{CodeBuilder, CodeBuilderExts, MemberName, Routine, RoutineAccessFlags};

impl<'c, 's> BodyCompiler<'c, 's> {
    /// Compile a closure literal, pushing a block for it
    pub(crate) fn compile_closure(
        &mut self,
        closure: &Closure<'s>,
        kind: BlockKind,
    ) -> Result<(), Error> {
        self.compile_block_routine(
            closure.scope,
            &closure.args.targets,
            closure.args.rest.as_deref(),
            closure.args.block,
            closure.body.as_deref(),
            closure.position,
            kind,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_block_routine(
        &mut self,
        scope: &'s StaticScope<'s>,
        targets: &[Node<'s>],
        rest: Option<&Node<'s>>,
        block_arg: Option<usize>,
        body: Option<&Node<'s>>,
        position: Position,
        kind: BlockKind,
    ) -> Result<(), Error> {
        if kind.shares_scope() && !self.storage.is_heap_backed() {
            return Err(self.unsupported_storage("for loop"));
        }

        let index = self.script.next_index(Counter::Inner);
        let name = MemberName::generated("block_", index, kind.routine_suffix());
        let layout = SlotLayout::new(1);
        let spec = RoutineSpec::new(
            name.clone(),
            &self.spec.source_name,
            layout,
            ScopingKind::Closure,
        )
        .boxed();
        let storage = StorageKind::Heap.build(layout, scope);

        let mut closure = BodyCompiler::new(&mut *self.script, spec, scope, storage);
        closure.set_line(position.line)?;
        closure.bind_block_params(targets, rest, block_arg)?;
        closure.place_redo_label()?;
        closure.compile_opt(body, true)?;
        closure.code.return_value()?;
        let script = closure.finish()?;

        let descriptor = script.artifact.add_descriptor(Descriptor::Block(BlockDescriptor {
            routine: name,
            kind,
            arity: Arity {
                required: targets.len(),
                optional: 0,
                rest: rest.is_some(),
            },
            scope: scope.descriptor(),
            file: script.settings.source_file.clone(),
            line: position.line,
        }));

        self.code.get_local(CONTEXT)?;
        self.code.get_local(SELF)?;
        self.load_cached(CacheKey::BlockBody(descriptor))?;
        let create = if kind.shares_scope() {
            RuntimeHelper::CreateSharedScopeBlock
        } else {
            RuntimeHelper::CreateBlock
        };
        self.code.invoke(create)?;
        Ok(())
    }

    pub(super) fn compile_lambda(&mut self, closure: &Closure<'s>) -> Result<(), Error> {
        self.compile_closure(closure, BlockKind::Lambda)?;
        self.code.get_local(CONTEXT)?;
        self.code.swap()?;
        self.code.invoke(RuntimeHelper::NewLambda)?;
        Ok(())
    }

    /// `BEGIN { }` runs where it appears
    pub(super) fn compile_pre_exe(&mut self, closure: &Closure<'s>) -> Result<(), Error> {
        self.compile_closure(closure, BlockKind::Begin)?;
        self.code.get_local(CONTEXT)?;
        self.code.swap()?;
        self.code.invoke(RuntimeHelper::RunBeginBlock)?;
        Ok(())
    }

    /// `END { }` is handed to the runtime, to run at exit
    pub(super) fn compile_post_exe(&mut self, closure: &Closure<'s>) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.compile_closure(closure, BlockKind::End)?;
        self.code.invoke(RuntimeHelper::RegisterEndBlock)?;
        self.load_nil()
    }

    /// `for var in iter` calls `iter.each` with a closure sharing this body's scope
    pub(super) fn compile_for(
        &mut self,
        node: &Node<'s>,
        var: &Node<'s>,
        iter: &Node<'s>,
        body: Option<&Node<'s>>,
        position: Position,
    ) -> Result<(), Error> {
        let scope = self.scope;
        self.compile_value(iter)?;
        let receiver = self.storage.grab_temp();
        self.code.set_local(receiver)?;

        self.compile_block_routine(
            scope,
            std::slice::from_ref(var),
            None,
            None,
            body,
            position,
            BlockKind::For,
        )?;
        let block = self.storage.grab_temp();
        self.code.set_local(block)?;

        self.compile_invocation(
            Self::site(node),
            "each",
            CallType::Normal,
            Operand::Temp(receiver),
            &[],
            BlockSource::Temp(block),
        )?;
        self.storage.release_temp(block);
        self.storage.release_temp(receiver);
        Ok(())
    }

    pub(super) fn compile_defn(&mut self, def: &MethodDef<'s>) -> Result<(), Error> {
        let descriptor = compile_method(&mut *self.script, def)?;
        self.code.get_local(CONTEXT)?;
        self.code.get_local(SELF)?;
        self.code.get_local(THIS)?;
        self.code.const_int(descriptor as i64)?;
        self.code.invoke(RuntimeHelper::Def)?;
        Ok(())
    }

    pub(super) fn compile_defs(
        &mut self,
        receiver: &Node<'s>,
        def: &MethodDef<'s>,
    ) -> Result<(), Error> {
        let descriptor = compile_method(&mut *self.script, def)?;
        self.code.get_local(CONTEXT)?;
        self.compile_value(receiver)?;
        self.code.get_local(THIS)?;
        self.code.const_int(descriptor as i64)?;
        self.code.invoke(RuntimeHelper::Defs)?;
        Ok(())
    }

    /// Push the module a class or module gets defined under (`null` for the lexical module)
    fn compile_namespace(&mut self, path: &ConstPath<'s>) -> Result<(), Error> {
        match path {
            ConstPath::Unscoped(_) => self.code.const_null()?,
            ConstPath::Scoped(scope, _) => {
                self.code.get_local(CONTEXT)?;
                self.compile_value(scope)?;
                self.code.invoke(RuntimeHelper::PrepareClassNamespace)?;
            }
            ConstPath::TopLevel(_) => {
                self.code.get_local(CONTEXT)?;
                self.code.invoke(RuntimeHelper::GetObjectClass)?;
            }
        }
        Ok(())
    }

    pub(super) fn compile_class(
        &mut self,
        path: &ConstPath<'s>,
        superclass: Option<&Node<'s>>,
        scope: &'s StaticScope<'s>,
        body: Option<&Node<'s>>,
        position: Position,
    ) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.compile_namespace(path)?;
        self.code.const_string(path.name())?;
        match superclass {
            Some(superclass) => {
                self.code.get_local(CONTEXT)?;
                self.compile_value(superclass)?;
                self.code.invoke(RuntimeHelper::PrepareSuperClass)?;
            }
            None => self.code.const_null()?,
        }
        self.code.invoke(RuntimeHelper::DefineClassUnder)?;
        self.compile_class_body("class_", path.name(), scope, body, position)
    }

    pub(super) fn compile_module(
        &mut self,
        path: &ConstPath<'s>,
        scope: &'s StaticScope<'s>,
        body: Option<&Node<'s>>,
        position: Position,
    ) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.compile_namespace(path)?;
        self.code.const_string(path.name())?;
        self.code.invoke(RuntimeHelper::DefineModuleUnder)?;
        self.compile_class_body("module__", path.name(), scope, body, position)
    }

    pub(super) fn compile_sclass(
        &mut self,
        receiver: &Node<'s>,
        scope: &'s StaticScope<'s>,
        body: Option<&Node<'s>>,
        position: Position,
    ) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.compile_value(receiver)?;
        self.code.invoke(RuntimeHelper::GetSingletonClass)?;
        self.compile_class_body("sclass_", "__singleton__", scope, body, position)
    }

    /// Compile a class body into its own routine and call it with the class (on top of the
    /// stack) as `self`
    ///
    /// The body routine brackets its code with the runtime's class entry/exit bookkeeping, on
    /// exceptional exits as well.
    fn compile_class_body(
        &mut self,
        prefix: &str,
        source_name: &str,
        scope: &'s StaticScope<'s>,
        body: Option<&Node<'s>>,
        position: Position,
    ) -> Result<(), Error> {
        let module = self.storage.grab_temp();
        self.code.set_local(module)?;

        let nodes: Vec<&Node<'s>> = body.into_iter().collect();
        let storage_kind = StorageKind::for_body(&AstInspector::inspect(&nodes));
        let index = self.script.next_index(Counter::Inner);
        let name = MemberName::generated(prefix, index, source_name);
        let layout = SlotLayout::new(0);
        let spec = RoutineSpec::new(name.clone(), source_name, layout, ScopingKind::ClassBody);
        let storage = storage_kind.build(layout, scope);
        log::debug!("class body {} uses {:?} storage", name, storage_kind);

        let mut class_body = BodyCompiler::new(&mut *self.script, spec, scope, storage);
        class_body.compile_class_routine(storage_kind, body, position)?;
        class_body.finish()?;

        self.code.get_local(THIS)?;
        self.code.get_local(CONTEXT)?;
        self.code.get_local(module)?;
        self.code.const_null()?;
        self.code.invoke_routine(name, layout.signature(false))?;
        self.storage.release_temp(module);
        Ok(())
    }

    fn compile_class_routine(
        &mut self,
        storage_kind: StorageKind,
        body: Option<&Node<'s>>,
        position: Position,
    ) -> Result<(), Error> {
        let start = self.code.fresh_label();
        let end = self.code.fresh_label();
        let handler = self.code.fresh_label();

        self.set_line(position.line)?;
        self.code.get_local(CONTEXT)?;
        self.code.get_local(SELF)?;
        self.load_cached(CacheKey::StaticScope(self.scope.descriptor().encode()))?;
        self.code.const_bool(storage_kind.needs_scope())?;
        self.code.invoke(RuntimeHelper::PreCompiledClass)?;

        self.code.place_marker(start)?;
        self.storage.begin_class(&mut self.code)?;
        self.compile_opt(body, true)?;
        self.code.place_marker(end)?;
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::PostCompiledClass)?;
        self.code.return_value()?;

        self.code.add_try_region(start, end, handler, CatchType::Any)?;
        self.code.place_label(handler)?;
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::PostCompiledClass)?;
        self.code.throw()?;
        Ok(())
    }
}

/// Compile a method definition, returning the index of its descriptor
///
/// Methods of specific arity get a routine taking their arguments in slots, plus a wrapper
/// taking boxed arguments. The others only get the boxed routine, which checks its own arity.
pub(crate) fn compile_method<'s>(
    script: &mut ScriptCompiler,
    def: &MethodDef<'s>,
) -> Result<usize, Error> {
    let mut nodes: Vec<&Node<'s>> = def.body.as_deref().into_iter().collect();
    nodes.extend(def.args.optional.iter().map(|(_, default)| default));
    let inspector = AstInspector::inspect(&nodes);
    let storage_kind = StorageKind::for_body(&inspector);

    let arity = def.args.arity();
    let index = script.next_index(Counter::Method);
    let fast_name = MemberName::generated("method__", index, &def.name);
    let boxed_name = fast_name.concat(&MemberName::BOXED_SUFFIX);
    log::debug!(
        "method {} (arity {}) uses {:?} storage",
        def.name,
        arity.value(),
        storage_kind
    );

    let fast_routine = if arity.is_specific() {
        let layout = SlotLayout::new(arity.required as u16);
        let spec = RoutineSpec::new(fast_name.clone(), &def.name, layout, ScopingKind::Method);
        let storage = storage_kind.build(layout, def.scope);
        let mut method = BodyCompiler::new(&mut *script, spec, def.scope, storage);
        method.set_line(def.position.line)?;
        method.bind_specific_args(&def.args)?;
        method.compile_opt(def.body.as_deref(), true)?;
        method.code.return_value()?;
        method.finish()?;

        arity_wrapper(script, &boxed_name, &fast_name, arity.required)?;
        Some(fast_name)
    } else {
        let layout = SlotLayout::new(1);
        let spec =
            RoutineSpec::new(boxed_name.clone(), &def.name, layout, ScopingKind::Method).boxed();
        let storage = storage_kind.build(layout, def.scope);
        let mut method = BodyCompiler::new(&mut *script, spec, def.scope, storage);
        method.set_line(def.position.line)?;
        method.bind_boxed_args(&def.args)?;
        method.compile_opt(def.body.as_deref(), true)?;
        method.code.return_value()?;
        method.finish()?;
        None
    };

    Ok(script.artifact.add_descriptor(Descriptor::Method(MethodDescriptor {
        name: def.name.clone(),
        routine: boxed_name,
        fast_routine,
        arity,
        scope: def.scope.descriptor(),
        file: script.settings.source_file.clone(),
        line: def.position.line,
        call_config: inspector.call_configuration(),
    })))
}

/// Routine taking boxed arguments that checks their count and calls the specific-arity routine
fn arity_wrapper(
    script: &mut ScriptCompiler,
    name: &MemberName,
    target: &MemberName,
    required: usize,
) -> Result<(), Error> {
    let boxed = SlotLayout::new(1);
    let specific = SlotLayout::new(required as u16);
    let mut code = CodeBuilder::new(boxed.signature(true));

    code.get_local(CONTEXT)?;
    code.get_local(ARGS)?;
    code.const_int(required as i64)?;
    code.const_int(required as i64)?;
    code.invoke(RuntimeHelper::CheckArity)?;

    code.get_local(THIS)?;
    code.get_local(CONTEXT)?;
    code.get_local(SELF)?;
    for position in 0..required {
        code.get_local(CONTEXT)?;
        code.get_local(ARGS)?;
        code.const_int(position as i64)?;
        code.invoke(RuntimeHelper::HostEntryOrNil)?;
    }
    code.get_local(boxed.closure())?;
    code.invoke_routine(target.clone(), specific.signature(false))?;
    code.return_value()?;

    script.artifact.add_routine(Routine {
        access_flags: RoutineAccessFlags::PUBLIC,
        name: name.clone(),
        signature: boxed.signature(true),
        code: code.result()?,
    })?;
    Ok(())
}

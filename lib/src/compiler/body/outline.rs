//! Splitting one body across several routines
//!
//! Outlined regions, chained continuations and literal builders all run as separate routines.
//! The first two share the heap scope of the body they were split from, so they are only
//! possible for heap-backed storage.

use super::{BodyCompiler, RoutineSpec};
use crate::abi::SlotLayout;
use crate::compiler::script::Counter;
use crate::compiler::variables::StackVariables;
use crate::compiler::Error;
use crate::vm::{CodeBuilderExts, MemberName, Signature};

impl<'c, 's> BodyCompiler<'c, 's> {
    /// Compile part of the body in a routine of its own, then call it in place
    ///
    /// The new routine takes the same parameters as this one and leaves one value, which is
    /// the value of the outlined code here.
    pub(crate) fn outline<F>(
        &mut self,
        prefix: &str,
        counter: Counter,
        suffix: &str,
        compile: F,
    ) -> Result<(), Error>
    where
        F: for<'x> FnOnce(&mut BodyCompiler<'x, 's>) -> Result<(), Error>,
    {
        let storage = match self.storage.outlined() {
            Some(storage) => storage,
            None => return Err(self.unsupported_storage(suffix.trim_matches('_'))),
        };
        let index = self.script.next_index(counter);
        let name = MemberName::generated(prefix, index, suffix);
        log::debug!("outlining {} from {}", name, self.spec.name);

        let spec = self.continuation_spec(name.clone());
        let line = self.line;
        let mut outlined = BodyCompiler::new(&mut *self.script, spec, self.scope, storage);
        if let Some(line) = line {
            outlined.set_line(line)?;
        }
        outlined.storage.begin_chained(&mut outlined.code)?;
        compile(&mut outlined)?;
        outlined.code.return_value()?;
        outlined.finish()?;

        self.invoke_sibling(name)
    }

    /// Finish this routine with a call to a fresh routine continuing the same body
    ///
    /// The operand stack must be empty. The value of the continuation becomes the value of
    /// this routine.
    pub(crate) fn chain_to_routine(mut self) -> Result<BodyCompiler<'c, 's>, Error> {
        let storage = match self.storage.outlined() {
            Some(storage) => storage,
            None => return Err(self.unsupported_storage("chained routine")),
        };
        let index = self.script.next_index(Counter::Chained);
        let name = MemberName::generated("chained_", index, &self.spec.source_name);
        log::debug!("chaining {} to {}", self.spec.name, name);

        self.invoke_sibling(name.clone())?;
        self.code.return_value()?;

        let spec = self.continuation_spec(name);
        let scope = self.scope;
        let line = self.line;
        let script = self.finish()?;

        let mut chained = BodyCompiler::new(script, spec, scope, storage);
        chained.line = line;
        chained.storage.begin_chained(&mut chained.code)?;
        Ok(chained)
    }

    /// Shape of a synthetic routine continuing this body
    fn continuation_spec(&self, name: MemberName) -> RoutineSpec {
        RoutineSpec {
            name,
            source_name: self.spec.source_name.clone(),
            layout: self.spec.layout,
            boxed_args: self.spec.boxed_args,
            kind: self.spec.kind.chained(),
            synthetic: true,
            signature: self.spec.signature.clone(),
        }
    }

    /// Compile a literal builder routine: it sees no variables, only its own parameters
    ///
    /// `compile` emits the whole body, return included.
    pub(crate) fn compile_builder<F>(
        &mut self,
        name: MemberName,
        signature: Signature,
        compile: F,
    ) -> Result<(), Error>
    where
        F: for<'x> FnOnce(&mut BodyCompiler<'x, 's>) -> Result<(), Error>,
    {
        let layout = SlotLayout::new(0);
        let spec = RoutineSpec {
            name,
            source_name: self.spec.source_name.clone(),
            layout,
            boxed_args: false,
            kind: self.spec.kind.chained(),
            synthetic: true,
            signature: Some(signature),
        };
        let storage = Box::new(StackVariables::new(layout, 0));
        let mut builder = BodyCompiler::new(&mut *self.script, spec, self.scope, storage);
        compile(&mut builder)?;
        builder.finish()?;
        Ok(())
    }
}

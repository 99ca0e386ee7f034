use super::body::{BodyCompiler, RoutineSpec, ScopingKind};
use super::cache::{Cache, CacheEntry, CacheKey};
use super::ir::{Node, StaticScope};
use super::variables::StorageKind;
use super::{Error, Settings};
use crate::abi::{CatchType, RuntimeHelper, SlotLayout, CONTEXT, SELF, THIS};
use crate::vm::{
    Artifact, BranchInstruction, CodeBuilder, CodeBuilderExts, Instruction, MemberName, Routine,
    RoutineAccessFlags, Signature, SlotType,
};
use std::collections::HashMap;

/// Independent sequences used to number generated routines
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Counter {
    Method,

    /// Closures and class bodies
    Inner,
    Ensure,

    /// Rescue regions, `defined?` probes and outlined loops
    Rescue,

    /// Literal builders
    Chunk,
    Chained,
}

/// Compiles one script into one artifact
///
/// Holds what every body compiler of the script shares: the settings, the artifact under
/// construction, the constant cache and the counters naming generated routines.
pub struct ScriptCompiler {
    pub(crate) settings: Settings,
    pub(crate) artifact: Artifact,
    cache: Cache,
    counters: HashMap<Counter, usize>,
}

impl ScriptCompiler {
    pub fn new(settings: Settings) -> ScriptCompiler {
        let artifact = Artifact::new(
            settings.artifact_name.clone(),
            settings.source_file.clone(),
        );
        ScriptCompiler {
            settings,
            artifact,
            cache: Cache::new(),
            counters: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Next value of a naming counter
    pub fn next_index(&mut self, counter: Counter) -> usize {
        let next = self.counters.entry(counter).or_insert(0);
        let index = *next;
        *next += 1;
        index
    }

    /// Entry of the constant cache for a key, created on first use
    pub fn cached(&mut self, key: CacheKey) -> Result<CacheEntry, Error> {
        self.cache
            .obtain(&mut self.artifact, &self.settings.dynamic_linkage, key)
    }

    /// Fresh field for a value computed once per site
    pub fn once_field(&mut self, site: usize) -> Result<MemberName, Error> {
        self.cache.once_field(&mut self.artifact, site)
    }

    /// Compile a whole script
    ///
    /// The top-level body goes into `__file__` (continued in `chained_*` routines every
    /// `chained_compile_line_count` statements), wrapped by the `load` entry routine.
    pub fn compile<'s>(
        mut self,
        root: &Node<'s>,
        scope: &'s StaticScope<'s>,
    ) -> Result<Artifact, Error> {
        log::debug!(
            "compiling {} into {:?}",
            self.settings.source_file,
            self.settings.artifact_name
        );
        self.compile_root(root, scope)?;
        self.compile_load(scope)?;
        self.compile_constructor()?;
        log::debug!(
            "compiled {:?}: {} routines, {} fields, {} cache entries",
            self.artifact.name,
            self.artifact.routines().len(),
            self.artifact.fields().len(),
            self.cache.len()
        );
        Ok(self.artifact)
    }

    fn compile_root<'s>(
        &mut self,
        root: &Node<'s>,
        scope: &'s StaticScope<'s>,
    ) -> Result<(), Error> {
        let statements: Vec<&Node<'s>> = match root {
            Node::Block(nodes) => nodes.iter().collect(),
            other => vec![other],
        };
        let per_routine = self.settings.chained_compile_line_count.max(1);

        let layout = SlotLayout::new(1);
        let spec =
            RoutineSpec::new(MemberName::FILE, "__file__", layout, ScopingKind::Root).boxed();
        let storage = StorageKind::Heap.build(layout, scope);
        let mut body = BodyCompiler::new(self, spec, scope, storage);
        body.storage.begin_method(&mut body.code, &[])?;

        if statements.is_empty() {
            body.load_nil()?;
        }
        for (idx, statement) in statements.iter().enumerate() {
            if idx > 0 && idx % per_routine == 0 {
                body = body.chain_to_routine()?;
            }
            body.compile(statement, idx + 1 == statements.len())?;
        }
        body.code.return_value()?;
        body.finish()?;
        Ok(())
    }

    /// `load(this, context, self)`: run the top-level body inside the runtime's load
    /// bookkeeping, which is undone even if the body raises
    fn compile_load(&mut self, scope: &StaticScope<'_>) -> Result<(), Error> {
        let signature = Signature::new(
            vec![SlotType::Artifact, SlotType::Context, SlotType::Object],
            Some(SlotType::Object),
        );
        let file_layout = SlotLayout::new(1);
        let mut code = CodeBuilder::new(signature.clone());
        let start = code.fresh_label();
        let end = code.fresh_label();
        let handler = code.fresh_label();

        code.get_local(CONTEXT)?;
        self.cached(CacheKey::StaticScope(scope.descriptor().encode()))?
            .load(&mut code)?;
        code.invoke(RuntimeHelper::PreLoad)?;

        code.place_marker(start)?;
        code.get_local(THIS)?;
        code.get_local(CONTEXT)?;
        code.get_local(SELF)?;
        code.const_int(0)?;
        code.push_instruction(Instruction::NewArray)?;
        code.const_null()?;
        code.invoke_routine(MemberName::FILE, file_layout.signature(true))?;
        code.place_marker(end)?;
        code.get_local(CONTEXT)?;
        code.invoke(RuntimeHelper::PostLoad)?;
        code.return_value()?;

        code.add_try_region(start, end, handler, CatchType::Any)?;
        code.place_label(handler)?;
        code.get_local(CONTEXT)?;
        code.invoke(RuntimeHelper::PostLoad)?;
        code.throw()?;

        self.artifact.add_routine(Routine {
            access_flags: RoutineAccessFlags::PUBLIC,
            name: MemberName::LOAD,
            signature,
            code: code.result()?,
        })?;
        Ok(())
    }

    /// `<init>(this)`: field-cached constants start out stale
    fn compile_constructor(&mut self) -> Result<(), Error> {
        let signature = Signature::new(vec![SlotType::Artifact], None);
        let mut code = CodeBuilder::new(signature.clone());
        for field in self.cache.generation_fields() {
            code.get_local(THIS)?;
            code.const_int(-1)?;
            code.push_instruction(Instruction::PutField(field.clone()))?;
        }
        code.push_branch_instruction(BranchInstruction::Return)?;

        self.artifact.add_routine(Routine {
            access_flags: RoutineAccessFlags::PUBLIC,
            name: MemberName::INIT,
            signature,
            code: code.result()?,
        })?;
        Ok(())
    }
}

/// Compile a script with the given settings
pub fn compile<'s>(
    settings: Settings,
    root: &Node<'s>,
    scope: &'s StaticScope<'s>,
) -> Result<Artifact, Error> {
    ScriptCompiler::new(settings).compile(root, scope)
}

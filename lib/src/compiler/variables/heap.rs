use super::{TempLocals, VariableCompiler};
use crate::abi::{RuntimeHelper, SlotLayout, CONTEXT};
use crate::compiler::ir::StaticScope;
use crate::compiler::Error;
use crate::vm::{CodeBuilder, CodeBuilderExts, Instruction, LocalHome};

/// Variables with dedicated fast accessors in the runtime scope
const FAST_SLOTS: usize = 4;

/// Every variable lives in the runtime scope of the body
///
/// The scope and its values array are fetched once at the start of every routine and kept in
/// fixed slots. Depth-zero variables use the fast accessors or direct array access; variables of
/// enclosing scopes go through the scope's depth-aware accessors.
pub struct HeapVariables {
    layout: SlotLayout,
    temps: TempLocals,
}

impl HeapVariables {
    pub fn new(layout: SlotLayout) -> HeapVariables {
        HeapVariables {
            layout,
            temps: TempLocals::new(layout.first_temp()),
        }
    }

    pub(super) fn load_scope(&self, code: &mut CodeBuilder) -> Result<(), Error> {
        code.get_local(CONTEXT)?;
        code.invoke(RuntimeHelper::GetCurrentScope)?;
        code.dup()?;
        code.set_local(self.layout.dynamic_scope())?;
        code.invoke(RuntimeHelper::ScopeValues)?;
        code.set_local(self.layout.vars_array())?;
        Ok(())
    }

    pub(super) fn heap_assign(
        layout: &SlotLayout,
        code: &mut CodeBuilder,
        index: usize,
        depth: usize,
    ) -> Result<(), Error> {
        if depth == 0 && index < FAST_SLOTS {
            code.get_local(layout.dynamic_scope())?;
            code.swap()?;
            code.invoke(RuntimeHelper::SetValueDepthZero(index as u8))?;
        } else if depth == 0 {
            code.get_local(layout.vars_array())?;
            code.swap()?;
            code.const_int(index as i64)?;
            code.swap()?;
            code.push_instruction(Instruction::ArrayStore)?;
        } else {
            code.get_local(layout.dynamic_scope())?;
            code.swap()?;
            code.const_int(index as i64)?;
            code.const_int(depth as i64)?;
            code.invoke(RuntimeHelper::SetValue)?;
        }
        Ok(())
    }

    pub(super) fn heap_retrieve(
        layout: &SlotLayout,
        code: &mut CodeBuilder,
        index: usize,
        depth: usize,
    ) -> Result<(), Error> {
        if depth == 0 && index < FAST_SLOTS {
            code.get_local(layout.dynamic_scope())?;
            code.invoke(RuntimeHelper::GetValueDepthZero(index as u8))?;
        } else if depth == 0 {
            code.get_local(layout.vars_array())?;
            code.const_int(index as i64)?;
            code.push_instruction(Instruction::ArrayLoad)?;
        } else {
            code.get_local(layout.dynamic_scope())?;
            code.const_int(index as i64)?;
            code.const_int(depth as i64)?;
            code.invoke(RuntimeHelper::GetValue)?;
        }
        Ok(())
    }
}

impl VariableCompiler for HeapVariables {
    // The runtime fills fresh scopes with `nil`
    fn begin_method(&mut self, code: &mut CodeBuilder, _bound: &[usize]) -> Result<(), Error> {
        self.load_scope(code)
    }

    fn begin_chained(&mut self, code: &mut CodeBuilder) -> Result<(), Error> {
        self.load_scope(code)
    }

    fn assign(&mut self, code: &mut CodeBuilder, index: usize, depth: usize) -> Result<(), Error> {
        Self::heap_assign(&self.layout, code, index, depth)
    }

    fn retrieve(
        &mut self,
        code: &mut CodeBuilder,
        index: usize,
        depth: usize,
    ) -> Result<(), Error> {
        Self::heap_retrieve(&self.layout, code, index, depth)
    }

    fn declare_locals(&self, code: &mut CodeBuilder, scope: &StaticScope<'_>) {
        for (index, name) in scope.variables().iter().enumerate() {
            code.declare_local(name, LocalHome::Heap(index));
        }
    }

    fn temps(&mut self) -> &mut TempLocals {
        &mut self.temps
    }

    fn outlined(&self) -> Option<Box<dyn VariableCompiler>> {
        Some(Box::new(HeapVariables::new(self.layout)))
    }

    fn is_heap_backed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::Callee;

    #[test]
    fn fast_and_slow_paths() {
        let layout = SlotLayout::new(1);
        let mut code = CodeBuilder::new(layout.signature(true));
        let mut vars = HeapVariables::new(layout);
        vars.begin_method(&mut code, &[]).unwrap();

        vars.retrieve(&mut code, 1, 0).unwrap();
        vars.assign(&mut code, 6, 0).unwrap();
        vars.retrieve(&mut code, 2, 1).unwrap();
        vars.assign(&mut code, 0, 2).unwrap();
        assert_eq!(code.current_depth(), Some(0));

        code.const_null().unwrap();
        code.return_value().unwrap();
        let code = code.result().unwrap();
        let insns: Vec<_> = code.instructions().collect();
        assert!(insns.contains(&&Instruction::Invoke(Callee::Helper(
            RuntimeHelper::GetValueDepthZero(1)
        ))));
        assert!(insns.contains(&&Instruction::ArrayStore));
        assert!(insns.contains(&&Instruction::Invoke(Callee::Helper(
            RuntimeHelper::GetValue
        ))));
    }

    #[test]
    fn locals_are_declared_by_scope_index() {
        let scope = StaticScope::local(&["a", "b"]);
        let layout = SlotLayout::new(0);
        let mut code = CodeBuilder::new(layout.signature(false));
        let vars = HeapVariables::new(layout);
        vars.declare_locals(&mut code, &scope);

        code.const_null().unwrap();
        code.return_value().unwrap();
        let code = code.result().unwrap();
        assert_eq!(code.local_home("a"), Some(LocalHome::Heap(0)));
        assert_eq!(code.local_home("b"), Some(LocalHome::Heap(1)));
        assert_eq!(code.local_home("c"), None);
    }
}

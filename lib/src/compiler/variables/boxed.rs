use super::heap::HeapVariables;
use super::{TempLocals, VariableCompiler};
use crate::abi::{RuntimeHelper, SlotLayout, CONTEXT};
use crate::compiler::ir::StaticScope;
use crate::compiler::Error;
use crate::vm::{CodeBuilder, CodeBuilderExts, LocalHome};

/// Captured variables live in the runtime scope, the others in local slots
pub struct BoxedVariables {
    layout: SlotLayout,
    captured: Vec<bool>,
    heap: HeapVariables,
    temps: TempLocals,
}

impl BoxedVariables {
    pub fn new(layout: SlotLayout, scope: &StaticScope<'_>) -> BoxedVariables {
        let count = scope.variable_count();
        BoxedVariables {
            layout,
            captured: (0..count).map(|idx| scope.is_captured(idx)).collect(),
            heap: HeapVariables::new(layout),
            temps: TempLocals::new(layout.first_temp() + count as u16),
        }
    }

    fn is_inline(&self, index: usize, depth: usize) -> bool {
        depth == 0 && !self.captured.get(index).copied().unwrap_or(false)
    }

    fn slot(&self, index: usize) -> u16 {
        self.layout.first_temp() + index as u16
    }

    fn has_inline_variables(&self) -> bool {
        self.captured.iter().any(|captured| !captured)
    }
}

impl VariableCompiler for BoxedVariables {
    fn begin_method(&mut self, code: &mut CodeBuilder, bound: &[usize]) -> Result<(), Error> {
        self.heap.load_scope(code)?;
        for index in 0..self.captured.len() {
            if self.is_inline(index, 0) && !bound.contains(&index) {
                code.get_local(CONTEXT)?;
                code.invoke(RuntimeHelper::GetNil)?;
                code.set_local(self.slot(index))?;
            }
        }
        code.reserve_locals(self.temps.base());
        Ok(())
    }

    fn begin_chained(&mut self, code: &mut CodeBuilder) -> Result<(), Error> {
        if self.has_inline_variables() {
            return Err(Error::UnsupportedStorage {
                construct: "chained routine".to_string(),
                position: None,
            });
        }
        self.heap.load_scope(code)
    }

    fn assign(&mut self, code: &mut CodeBuilder, index: usize, depth: usize) -> Result<(), Error> {
        if self.is_inline(index, depth) {
            code.set_local(self.slot(index))?;
            Ok(())
        } else {
            HeapVariables::heap_assign(&self.layout, code, index, depth)
        }
    }

    fn retrieve(
        &mut self,
        code: &mut CodeBuilder,
        index: usize,
        depth: usize,
    ) -> Result<(), Error> {
        if self.is_inline(index, depth) {
            code.get_local(self.slot(index))?;
            Ok(())
        } else {
            HeapVariables::heap_retrieve(&self.layout, code, index, depth)
        }
    }

    fn declare_locals(&self, code: &mut CodeBuilder, scope: &StaticScope<'_>) {
        for (index, name) in scope.variables().iter().enumerate() {
            let home = if self.is_inline(index, 0) {
                LocalHome::Slot(self.slot(index))
            } else {
                LocalHome::Heap(index)
            };
            code.declare_local(name, home);
        }
    }

    fn temps(&mut self) -> &mut TempLocals {
        &mut self.temps
    }

    /// Only shareable when nothing lives in local slots
    fn outlined(&self) -> Option<Box<dyn VariableCompiler>> {
        if self.has_inline_variables() {
            None
        } else {
            Some(Box::new(HeapVariables::new(self.layout)))
        }
    }

    fn is_heap_backed(&self) -> bool {
        !self.has_inline_variables()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::Instruction;

    #[test]
    fn per_variable_placement() {
        let scope = StaticScope::local(&["a", "b", "c"]).with_captured(&[1]);
        let layout = SlotLayout::new(0);
        let mut code = CodeBuilder::new(layout.signature(false));
        let mut vars = BoxedVariables::new(layout, &scope);
        vars.begin_method(&mut code, &[]).unwrap();

        vars.retrieve(&mut code, 0, 0).unwrap();
        vars.assign(&mut code, 1, 0).unwrap();
        vars.retrieve(&mut code, 2, 0).unwrap();
        code.return_value().unwrap();
        let code = code.result().unwrap();

        let insns: Vec<_> = code.instructions().cloned().collect();
        assert!(insns.contains(&Instruction::Load(layout.first_temp())));
        assert!(insns.contains(&Instruction::Load(layout.first_temp() + 2)));
        assert!(!insns.contains(&Instruction::Load(layout.first_temp() + 1)));
        assert!(vars.outlined().is_none());
    }

    #[test]
    fn captured_locals_are_declared_on_the_heap() {
        let scope = StaticScope::local(&["a", "b", "c"]).with_captured(&[1]);
        let layout = SlotLayout::new(0);
        let mut code = CodeBuilder::new(layout.signature(false));
        let vars = BoxedVariables::new(layout, &scope);
        vars.declare_locals(&mut code, &scope);

        code.const_null().unwrap();
        code.return_value().unwrap();
        let code = code.result().unwrap();
        assert_eq!(code.local_home("a"), Some(LocalHome::Slot(layout.first_temp())));
        assert_eq!(code.local_home("b"), Some(LocalHome::Heap(1)));
        assert_eq!(code.local_home("c"), Some(LocalHome::Slot(layout.first_temp() + 2)));
    }
}

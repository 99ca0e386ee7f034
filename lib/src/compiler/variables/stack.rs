use super::{TempLocals, VariableCompiler};
use crate::abi::{RuntimeHelper, SlotLayout, CONTEXT};
use crate::compiler::ir::StaticScope;
use crate::compiler::Error;
use crate::vm::{CodeBuilder, CodeBuilderExts, LocalHome};

/// Every variable lives in a local slot of the routine
///
/// Only usable for bodies that nothing can capture: the variables die with the routine
/// activation and can't be shared with outlined routines.
pub struct StackVariables {
    layout: SlotLayout,
    variable_count: usize,
    temps: TempLocals,
}

impl StackVariables {
    pub fn new(layout: SlotLayout, variable_count: usize) -> StackVariables {
        StackVariables {
            layout,
            variable_count,
            temps: TempLocals::new(layout.first_temp() + variable_count as u16),
        }
    }

    fn slot(&self, index: usize) -> u16 {
        self.layout.first_temp() + index as u16
    }

    fn check_depth(depth: usize) -> Result<(), Error> {
        if depth == 0 {
            Ok(())
        } else {
            Err(Error::NotCompilable {
                construct: format!("variable access at depth {} from a stack-based body", depth),
                position: None,
            })
        }
    }
}

impl VariableCompiler for StackVariables {
    fn begin_method(&mut self, code: &mut CodeBuilder, bound: &[usize]) -> Result<(), Error> {
        for index in (0..self.variable_count).filter(|idx| !bound.contains(idx)) {
            code.get_local(CONTEXT)?;
            code.invoke(RuntimeHelper::GetNil)?;
            code.set_local(self.slot(index))?;
        }
        code.reserve_locals(self.temps.base());
        Ok(())
    }

    fn begin_chained(&mut self, _code: &mut CodeBuilder) -> Result<(), Error> {
        Err(Error::UnsupportedStorage {
            construct: "chained routine".to_string(),
            position: None,
        })
    }

    fn assign(&mut self, code: &mut CodeBuilder, index: usize, depth: usize) -> Result<(), Error> {
        Self::check_depth(depth)?;
        code.set_local(self.slot(index))?;
        Ok(())
    }

    fn retrieve(
        &mut self,
        code: &mut CodeBuilder,
        index: usize,
        depth: usize,
    ) -> Result<(), Error> {
        Self::check_depth(depth)?;
        code.get_local(self.slot(index))?;
        Ok(())
    }

    fn declare_locals(&self, code: &mut CodeBuilder, scope: &StaticScope<'_>) {
        for (index, name) in scope.variables().iter().enumerate().take(self.variable_count) {
            code.declare_local(name, LocalHome::Slot(self.slot(index)));
        }
    }

    fn temps(&mut self) -> &mut TempLocals {
        &mut self.temps
    }

    fn outlined(&self) -> Option<Box<dyn VariableCompiler>> {
        None
    }

    fn is_heap_backed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{Instruction, LocalVariable};

    #[test]
    fn unbound_locals_start_nil() {
        let layout = SlotLayout::new(2);
        let mut code = CodeBuilder::new(layout.signature(false));
        let mut vars = StackVariables::new(layout, 4);
        vars.begin_method(&mut code, &[0, 1]).unwrap();

        let temp = vars.grab_temp();
        assert_eq!(temp, layout.first_temp() + 4);
        vars.release_temp(temp);

        code.get_local(crate::abi::ARGS).unwrap();
        code.return_value().unwrap();
        let code = code.result().unwrap();
        let stores: Vec<_> = code
            .instructions()
            .filter_map(|insn| match insn {
                Instruction::Store(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec![layout.first_temp() + 2, layout.first_temp() + 3]);
    }

    #[test]
    fn cannot_be_shared() {
        let vars = StackVariables::new(SlotLayout::new(0), 1);
        assert!(vars.outlined().is_none());
        assert!(!vars.is_heap_backed());
    }

    #[test]
    fn locals_are_declared_in_their_slots() {
        let scope = StaticScope::local(&["x", "y"]);
        let layout = SlotLayout::new(1);
        let mut code = CodeBuilder::new(layout.signature(false));
        let vars = StackVariables::new(layout, scope.variable_count());
        vars.declare_locals(&mut code, &scope);

        code.const_null().unwrap();
        code.return_value().unwrap();
        let code = code.result().unwrap();
        assert_eq!(
            code.locals,
            vec![
                LocalVariable {
                    name: "x".to_string(),
                    home: LocalHome::Slot(layout.first_temp()),
                },
                LocalVariable {
                    name: "y".to_string(),
                    home: LocalHome::Slot(layout.first_temp() + 1),
                },
            ]
        );
    }
}

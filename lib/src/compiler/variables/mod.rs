//! Variable storage strategies
//!
//! The body compiler reads and writes variables by index (and depth, for variables of enclosing
//! closures' scopes) without knowing where they live. Each strategy also hands out temporary
//! slots, in an index range disjoint from every named variable.

mod boxed;
mod heap;
mod stack;

pub use boxed::BoxedVariables;
pub use heap::HeapVariables;
pub use stack::StackVariables;

use super::ir::StaticScope;
use super::{AstInspector, Error};
use crate::abi::SlotLayout;
use crate::vm::CodeBuilder;

pub trait VariableCompiler {
    /// Prepare storage at the start of a method body
    ///
    /// Declared variables that aren't in `bound` (the argument variables about to be assigned)
    /// must read as `nil` afterwards.
    fn begin_method(&mut self, code: &mut CodeBuilder, bound: &[usize]) -> Result<(), Error>;

    /// Prepare storage at the start of a closure body
    fn begin_closure(&mut self, code: &mut CodeBuilder, bound: &[usize]) -> Result<(), Error> {
        self.begin_method(code, bound)
    }

    /// Prepare storage at the start of a class, singleton class or module body
    fn begin_class(&mut self, code: &mut CodeBuilder) -> Result<(), Error> {
        self.begin_method(code, &[])
    }

    /// Prepare storage in a routine continuing (or outlined from) a body, whose variables have
    /// already been initialized
    fn begin_chained(&mut self, code: &mut CodeBuilder) -> Result<(), Error>;

    /// Pop the value on top of the stack into a variable
    fn assign(&mut self, code: &mut CodeBuilder, index: usize, depth: usize)
        -> Result<(), Error>;

    /// Push the value of a variable
    fn retrieve(&mut self, code: &mut CodeBuilder, index: usize, depth: usize)
        -> Result<(), Error>;

    /// Record the storage of every variable of `scope` in the routine's debug entries
    fn declare_locals(&self, code: &mut CodeBuilder, scope: &StaticScope<'_>);

    fn temps(&mut self) -> &mut TempLocals;

    /// Storage for another routine sharing these variables, if the variables can be shared
    fn outlined(&self) -> Option<Box<dyn VariableCompiler>>;

    fn is_heap_backed(&self) -> bool;

    /// Reserve a temporary slot
    fn grab_temp(&mut self) -> u16 {
        self.temps().grab()
    }

    /// Release the most recently reserved temporary slot
    fn release_temp(&mut self, slot: u16) {
        self.temps().release(slot)
    }
}

/// Stack-discipline allocator of temporary local slots
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TempLocals {
    base: u16,
    next: u16,
    high_water: u16,
}

impl TempLocals {
    pub fn new(base: u16) -> TempLocals {
        TempLocals {
            base,
            next: base,
            high_water: base,
        }
    }

    /// First slot that is ever handed out
    pub fn base(&self) -> u16 {
        self.base
    }

    /// One past the highest slot handed out so far
    pub fn high_water(&self) -> u16 {
        self.high_water
    }

    /// Number of slots currently reserved
    pub fn live(&self) -> u16 {
        self.next - self.base
    }

    pub fn grab(&mut self) -> u16 {
        let slot = self.next;
        self.next += 1;
        self.high_water = self.high_water.max(self.next);
        slot
    }

    pub fn release(&mut self, slot: u16) {
        debug_assert_eq!(
            slot + 1,
            self.next,
            "temporary slot {} released out of order",
            slot
        );
        self.next -= 1;
    }
}

/// Which storage strategy a body uses
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StorageKind {
    /// Every variable lives in the heap scope
    Heap,

    /// Captured variables live in the heap scope, the others in local slots
    Boxed,

    /// Every variable lives in a local slot
    Stack,
}

impl StorageKind {
    /// Storage for a method or class body
    pub fn for_body(inspector: &AstInspector) -> StorageKind {
        if inspector.has_scope_aware_methods() {
            StorageKind::Heap
        } else if inspector.has_closure() {
            StorageKind::Boxed
        } else {
            StorageKind::Stack
        }
    }

    /// Does the runtime need to push a heap scope for bodies using this storage?
    pub fn needs_scope(&self) -> bool {
        !matches!(self, StorageKind::Stack)
    }

    pub fn build(&self, layout: SlotLayout, scope: &StaticScope<'_>) -> Box<dyn VariableCompiler> {
        match self {
            StorageKind::Heap => Box::new(HeapVariables::new(layout)),
            StorageKind::Boxed => Box::new(BoxedVariables::new(layout, scope)),
            StorageKind::Stack => Box::new(StackVariables::new(layout, scope.variable_count())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn temps_are_lifo() {
        let mut temps = TempLocals::new(10);
        let a = temps.grab();
        let b = temps.grab();
        assert_eq!((a, b), (10, 11));
        temps.release(b);
        let c = temps.grab();
        assert_eq!(c, 11);
        temps.release(c);
        temps.release(a);
        assert_eq!(temps.live(), 0);
        assert_eq!(temps.high_water(), 12);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn out_of_order_release_is_caught() {
        let mut temps = TempLocals::new(0);
        let a = temps.grab();
        let _b = temps.grab();
        temps.release(a);
    }

    proptest::proptest! {
        #[test]
        fn nested_reservations_are_dense(depths in proptest::collection::vec(0usize..6, 1..20)) {
            let mut temps = TempLocals::new(4);
            let mut deepest = 0;
            for depth in depths {
                let slots: Vec<u16> = (0..depth).map(|_| temps.grab()).collect();
                proptest::prop_assert_eq!(slots, (4..4 + depth as u16).collect::<Vec<u16>>());
                for slot in (4..4 + depth as u16).rev() {
                    temps.release(slot);
                }
                deepest = deepest.max(depth);
                proptest::prop_assert_eq!(temps.live(), 0);
            }
            proptest::prop_assert_eq!(temps.high_water(), 4 + deepest as u16);
        }
    }
}

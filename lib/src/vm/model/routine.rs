use crate::vm::{Code, MemberName, RoutineAccessFlags, Signature};

#[derive(Clone, Debug, PartialEq)]
pub struct Routine {
    pub access_flags: RoutineAccessFlags,
    pub name: MemberName,
    pub signature: Signature,
    pub code: Code,
}

impl Routine {
    pub fn is_synthetic(&self) -> bool {
        self.access_flags.contains(RoutineAccessFlags::SYNTHETIC)
    }
}

use crate::vm::{FieldAccessFlags, MemberName, SlotType};

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name: MemberName,
    pub slot_type: SlotType,
}

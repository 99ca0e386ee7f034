use bitflags::bitflags;

bitflags! {
    /// Access flags on routines
    pub struct RoutineAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const FINAL = 0x0010;
        const VARARGS = 0x0080;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access flags on fields
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const FINAL = 0x0010;
        const SYNTHETIC = 0x1000;
    }
}

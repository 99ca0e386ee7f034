use std::fmt;

/// Position in a routine under construction: a basic block or a try-region marker
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SynLabel(u32);

impl SynLabel {
    /// Entry block of every routine
    pub const ENTRY: SynLabel = SynLabel(0);
}

/// Hands out labels in creation order, right after [`SynLabel::ENTRY`]
#[derive(Clone, Debug)]
pub struct LabelCounter {
    issued: u32,
}

impl LabelCounter {
    pub fn new() -> LabelCounter {
        LabelCounter { issued: 1 }
    }

    pub fn fresh(&mut self) -> SynLabel {
        let label = SynLabel(self.issued);
        self.issued += 1;
        label
    }
}

impl Default for LabelCounter {
    fn default() -> LabelCounter {
        LabelCounter::new()
    }
}

impl fmt::Debug for SynLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == SynLabel::ENTRY {
            f.write_str("entry")
        } else {
            write!(f, "L{}", self.0)
        }
    }
}

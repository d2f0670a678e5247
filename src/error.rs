use std::fmt;

/// Error type for structural reconstruction failures.
///
/// Every variant is fatal for the method being analyzed and is caught at the
/// method boundary by the driver, which marks the method instead of
/// propagating across methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StructureError {
    /// An instruction did not have the shape the current rewrite requires
    /// (e.g. a `monitorenter` whose objectref is not a recognized monitor
    /// capture).
    UnexpectedInstruction { offset: i32 },
    /// A catch handler protected no instructions.
    EmptyCatchBlock,
    /// A block extraction referenced an offset outside the current list.
    OutOfBounds { offset: i32 },
    /// A recognizer reached a state the compiler families we know cannot
    /// produce.
    UnexpectedStructure(&'static str),
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureError::UnexpectedInstruction { offset } => {
                write!(f, "unexpected instruction shape at offset {}", offset)
            }
            StructureError::EmptyCatchBlock => write!(f, "empty catch block"),
            StructureError::OutOfBounds { offset } => {
                write!(f, "offset {} outside the current instruction list", offset)
            }
            StructureError::UnexpectedStructure(what) => {
                write!(f, "unexpected structure: {}", what)
            }
        }
    }
}

impl std::error::Error for StructureError {}

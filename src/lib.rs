//! Structural reconstruction of decoded Java bytecode.
//!
//! The crate takes the flat, offset-ordered statement list an upstream
//! class-file reader produces for one method body and rebuilds the nested
//! control-flow tree the compiler started from: loops in their eight shapes,
//! conditionals, `switch` in its integer, enum and string lowerings,
//! `try`/`catch`/`finally` (including the `jsr` subroutine form) and
//! `synchronized` blocks, with declarations placed at the narrowest scope
//! and remaining jumps rewritten as breaks, continues or labels.
//!
//! Entry point: [`structure::build`], once per method.

#[macro_use]
extern crate bitflags;

pub mod bytecode;
pub mod constant_pool;
pub mod error;
pub mod instruction;
pub mod local_variables;
pub mod structure;
pub mod types;

pub use error::StructureError;
pub use structure::build;

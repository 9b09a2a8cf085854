//! LLVM code generation backend: lowers a validated, fully annotated program
//! tree ([`tree`]) to LLVM IR and a native object file.
//!
//! The module boundaries mirror `why_lib`'s own `codegen` module, widened
//! from a struct-and-function language to one with multiple inheritance,
//! unions, optionals and bitfields: [`types`] and [`layout`] describe the
//! data; [`mangle`] names it; [`translate`] maps semantic types to LLVM
//! types; [`class_emit`] builds class aggregates and their runtime
//! descriptors; [`cast`] and [`copy_destroy`] implement the two engines
//! every value-producing node calls into; [`scope_stack`] and [`context`]
//! hold per-compilation state; [`node`] dispatches tree nodes to IR; and
//! [`driver`] sequences all of the above over a whole program.

pub mod cast;
pub mod class_emit;
pub mod config;
pub mod context;
pub mod copy_destroy;
pub mod driver;
pub mod error;
pub mod layout;
pub mod mangle;
pub mod node;
pub mod position;
pub mod scope_stack;
pub mod translate;
pub mod tree;
pub mod types;

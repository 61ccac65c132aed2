//! A copy-and-patch JIT backend for a micro-op trace interpreter.
//!
//! This crate does not generate machine code from scratch. It pastes
//! together pre-compiled binary fragments (*stencils*), produced ahead of
//! time by a native toolchain that is out of scope for this crate, patching
//! each fragment's unresolved references (*holes*) with the concrete
//! addresses and operand values determined at trace-compile time.
//!
//! The pipeline, end to end:
//!
//! 1. A [`trace::StencilTable`] (supplied by the embedder, typically a
//!    `'static` generated by a `build.rs`) pairs one [`stencil::StencilGroup`]
//!    per opcode, plus a trampoline and a fatal-error tail.
//! 2. [`compiler::compile`] walks a trace, sizes the total region
//!    ([`memory`]), allocates it RW, copies and patches
//!    ([`stencil`]/[`reloc`]) each instruction's stencils in turn, then
//!    flips the region to RX and attaches it to a [`trace::Executor`].
//! 3. [`compiler::free`] releases a compiled executor's region.
//!
//! The whole subsystem lives behind the `jit` feature (on by default);
//! disabling it compiles this crate down to nothing.

#![cfg_attr(not(feature = "jit"), allow(unused))]

#[cfg(feature = "jit")]
mod bits;
#[cfg(feature = "jit")]
pub mod compiler;
#[cfg(feature = "jit")]
pub mod error;
#[cfg(feature = "jit")]
pub mod memory;
#[cfg(feature = "jit")]
pub mod patches;
#[cfg(feature = "jit")]
pub mod reloc;
#[cfg(feature = "jit")]
pub mod stencil;
#[cfg(feature = "jit")]
pub mod trace;

#[cfg(feature = "jit")]
pub use compiler::{compile, compile_raw, free};
#[cfg(feature = "jit")]
pub use error::JitError;
#[cfg(feature = "jit")]
pub use patches::{HoleValue, PatchTable};
#[cfg(feature = "jit")]
pub use reloc::{Hole, HoleKind};
#[cfg(feature = "jit")]
pub use stencil::{Stencil, StencilGroup};
#[cfg(feature = "jit")]
pub use trace::{EntryOpcodes, Executor, Format, StencilTable, TraceInstruction, UOP_MAX_TRACE_LENGTH};

//! The error taxonomy for the JIT backend.
//!
//! Everything recoverable collapses to a single [`JitError`]; everything else
//! ([`ContractViolation`]) indicates a bug in either this crate or the
//! offline toolchain that produced the stencil table, and is only ever
//! surfaced through `unreachable!` at the call site rather than returned,
//! matching the original `Py_UNREACHABLE` policy.

use std::io;

/// Recoverable failures the backend can report to its caller.
///
/// At the FFI-shaped boundary ([`crate::compiler::compile_raw`]) every
/// variant collapses to `-1`; no structured error crosses that boundary.
#[derive(Debug, thiserror::Error)]
pub enum JitError {
    /// The OS refused to map the requested pages.
    #[error("JIT unable to allocate memory ({0})")]
    Allocation(io::Error),

    /// Flipping a region from RW to RX (or flushing the i-cache first)
    /// failed partway through.
    #[error("JIT unable to protect executable memory ({0})")]
    Protection(io::Error),

    /// Releasing a region back to the OS failed. This variant is only ever
    /// logged via [`log::warn!`], never returned, matching `_PyJIT_Free`'s
    /// `PyErr_WriteUnraisable` policy: a free failure must not abort
    /// compilation that already succeeded or is already in flight.
    #[error("JIT unable to free memory ({0})")]
    Free(io::Error),
}

/// A contract violation: a hole kind the engine doesn't recognize, a
/// bitfield write that doesn't fit its declared width, a branch
/// displacement out of range, or a stencil whose instruction word fails
/// the encoding-class assertion its hole kind presumes.
///
/// These indicate the offline toolchain and this crate have drifted out of
/// sync, not a runtime condition a caller can recover from. Debug builds
/// assert eagerly; release builds reach `unreachable!()`, matching
/// `Py_UNREACHABLE()` in the original.
#[derive(Debug, thiserror::Error)]
#[error("JIT contract violation: {0}")]
pub struct ContractViolation(pub &'static str);

/// Panics with a [`ContractViolation`] message. Centralizes the
/// "this should never happen" path so every call site reads the same way.
#[cold]
#[track_caller]
pub(crate) fn contract_violation(message: &'static str) -> ! {
    unreachable!("{}", ContractViolation(message));
}

//! Types consumed from the interpreter: trace instructions, the executor
//! object that ends up owning the compiled region, and the stencil table
//! the offline toolchain is responsible for producing.

use crate::memory::ExecutableBuffer;
use crate::stencil::StencilGroup;

/// An opcode: an index into [`StencilTable::groups`].
pub type Opcode = u16;

/// The longest trace this crate will ever be asked to compile. Sized to
/// match the interpreter's own `UOP_MAX_TRACE_LENGTH`; callers are expected
/// to enforce this bound before calling [`crate::compiler::compile`], which
/// only asserts it.
pub const UOP_MAX_TRACE_LENGTH: usize = 200;

/// Which hole values a trace instruction's format wires up, beyond the
/// ones every instruction sets (`CODE`, `CONTINUE`, `DATA`, `EXECUTOR`,
/// `OPARG`, `OPERAND`/`OPERAND_HI`/`OPERAND_LO`, `TOP`, `ZERO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Sets `TARGET` to `target`.
    Target,
    /// Sets `EXIT_INDEX` to `exit_index`, and `ERROR_TARGET` if
    /// `error_target` is an in-range instruction index.
    Exit,
    /// Sets `JUMP_TARGET` to the start of `jump_target` (which must be an
    /// in-range instruction index), and `ERROR_TARGET` likewise.
    Jump,
}

/// One micro-op in the trace: an opcode selecting a stencil group, plus the
/// small operands the stencil's holes reference.
#[derive(Debug, Clone, Copy)]
pub struct TraceInstruction {
    pub opcode: Opcode,
    pub oparg: u16,
    pub operand: u64,
    pub target: u64,
    pub exit_index: u32,
    pub jump_target: u32,
    pub error_target: u32,
    pub format: Format,
}

/// Which opcodes the interpreter uses as `trace[0]` — out of scope to
/// define here (they belong to the surrounding interpreter's opcode
/// namespace), but the trace compiler must assert against them, so the
/// caller supplies them alongside the stencil table.
#[derive(Debug, Clone, Copy)]
pub struct EntryOpcodes {
    pub trace_entry: Opcode,
    pub cold_exit: Opcode,
}

/// Everything the offline toolchain produces: a dense, opcode-indexed array
/// of stencil groups, the two distinguished groups outside that array, and
/// the entry opcodes the trace compiler asserts against.
///
/// Modeled as an immutable binding the caller owns for the process's
/// lifetime (typically a `'static` generated by `build.rs`), per the design
/// notes' "global mutable state" guidance: there is exactly one of these per
/// process, it is produced once, and this crate never mutates it.
pub struct StencilTable<'a> {
    pub groups: &'a [StencilGroup],
    pub trampoline: StencilGroup,
    pub fatal_error: StencilGroup,
    pub entry_opcodes: EntryOpcodes,
}

impl<'a> StencilTable<'a> {
    pub fn group_for(&self, opcode: Opcode) -> &StencilGroup {
        &self.groups[opcode as usize]
    }
}

/// The region a successful compile attaches to the executor, and the
/// bookkeeping needed to free it.
struct CompiledRegion {
    buffer: ExecutableBuffer,
    side_entry_offset: usize,
}

/// The interpreter-owned object that ends up holding the JIT region.
///
/// `exit_count` is read-only from this crate's perspective (the interpreter
/// sets it up before compiling); `jit_code`/`jit_side_entry`/`jit_size` are
/// only ever written by [`crate::compiler::compile`] and
/// [`crate::compiler::free`].
pub struct Executor {
    pub exit_count: u32,
    region: Option<CompiledRegion>,
}

impl Executor {
    /// Creates an executor with no compiled region yet, and the given
    /// number of side exits (used to bounds-check `EXIT` instructions).
    pub fn new(exit_count: u32) -> Self {
        Self {
            exit_count,
            region: None,
        }
    }

    /// Base address of the JIT region, or `None` before a successful
    /// compile (or after `free`).
    pub fn jit_code(&self) -> Option<*const u8> {
        self.region.as_ref().map(|r| r.buffer.as_ptr())
    }

    /// First byte past the trampoline: the entry point used for traces
    /// that don't need the calling-convention adapter (a cold re-entry,
    /// for instance).
    pub fn jit_side_entry(&self) -> Option<*const u8> {
        self.region
            .as_ref()
            .map(|r| unsafe { r.buffer.as_ptr().add(r.side_entry_offset) })
    }

    /// Total size of the JIT region, in bytes. Always a page-size multiple.
    pub fn jit_size(&self) -> usize {
        self.region.as_ref().map_or(0, |r| r.buffer.len())
    }

    pub(crate) fn attach(&mut self, buffer: ExecutableBuffer, side_entry_offset: usize) {
        self.region = Some(CompiledRegion {
            buffer,
            side_entry_offset,
        });
    }

    /// Releases the compiled region, if any. Idempotent: a second call is a
    /// no-op, since the first already left `region` as `None`.
    pub(crate) fn release(&mut self) {
        self.region = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_executor_has_no_region() {
        let executor = Executor::new(4);
        assert!(executor.jit_code().is_none());
        assert!(executor.jit_side_entry().is_none());
        assert_eq!(executor.jit_size(), 0);
    }

    #[test]
    fn release_is_idempotent() {
        let mut executor = Executor::new(0);
        executor.release();
        executor.release();
        assert!(executor.jit_code().is_none());
    }
}

//! The trace compiler: two-pass layout (size, then emit) of trampoline +
//! per-opcode stencils + fatal-error tail, wiring up the patch table and
//! finalizing memory permissions.
//!
//! Grounded line-for-line on `_PyJIT_Compile`/`_PyJIT_Free` in
//! `original_source/Python/jit.c`.

use crate::error::JitError;
use crate::memory::{self, JitBuffer};
use crate::patches::{HoleValue, PatchTable};
use crate::stencil;
use crate::trace::{Executor, Format, StencilTable, TraceInstruction, UOP_MAX_TRACE_LENGTH};

/// Compiles `trace[..length]` into executable code and attaches it to
/// `executor`. On success, `executor.jit_code()`/`jit_side_entry()`/
/// `jit_size()` are populated and the previous region (if any) has already
/// been replaced -- callers that want to keep a failed compile's prior code
/// should check the return value before assuming otherwise, though in
/// practice a fresh `Executor` is compiled into exactly once.
pub fn compile(
    table: &StencilTable<'_>,
    executor: &mut Executor,
    trace: &[TraceInstruction],
) -> Result<(), JitError> {
    assert!(
        trace.len() <= UOP_MAX_TRACE_LENGTH,
        "trace length {} exceeds UOP_MAX_TRACE_LENGTH ({})",
        trace.len(),
        UOP_MAX_TRACE_LENGTH,
    );

    // --- Pass 1: size ---
    let mut instruction_starts = vec![0usize; trace.len()];
    let mut code_size = table.trampoline.code.body_size();
    let mut data_size = table.trampoline.data.body_size();
    for (i, instruction) in trace.iter().enumerate() {
        let group = table.group_for(instruction.opcode);
        instruction_starts[i] = code_size;
        code_size += group.code.body_size();
        data_size += group.data.body_size();
    }
    code_size += table.fatal_error.code.body_size();
    data_size += table.fatal_error.data.body_size();
    let total_size = memory::round_up_to_page_size(code_size + data_size);

    // --- Allocate ---
    let mut buffer = JitBuffer::allocate(total_size)?;
    // SAFETY: `memory` is valid for `total_size` bytes for the remainder of
    // this function; nothing else holds a reference to it yet.
    let memory = unsafe { buffer.as_mut_ptr() };
    let mut code = memory;
    let mut data = unsafe { memory.add(code_size) };

    // --- Trampoline emission ---
    {
        let group = &table.trampoline;
        let mut patches = PatchTable::defaulted();
        patches.set(HoleValue::Code, code as u64);
        patches.set(HoleValue::Continue, code as u64 + group.code.body_size() as u64);
        patches.set(HoleValue::Data, data as u64);
        patches.set(HoleValue::Executor, executor as *const Executor as u64);
        patches.set(HoleValue::Top, memory as u64 + table.trampoline.code.body_size() as u64);
        patches.set(HoleValue::Zero, 0);
        // SAFETY: `code`/`data` have room for this group's bodies by
        // construction of the size pass above.
        unsafe { stencil::emit(group, &patches) };
        code = unsafe { code.add(group.code.body_size()) };
        data = unsafe { data.add(group.data.body_size()) };
    }

    assert!(
        trace.is_empty()
            || trace[0].opcode == table.entry_opcodes.trace_entry
            || trace[0].opcode == table.entry_opcodes.cold_exit,
        "trace must begin with the trace-entry or cold-exit opcode",
    );

    // --- Per-instruction emission ---
    for (i, instruction) in trace.iter().enumerate() {
        let group = table.group_for(instruction.opcode);
        let mut patches = PatchTable::defaulted();
        patches.set(HoleValue::Code, code as u64);
        patches.set(HoleValue::Continue, code as u64 + group.code.body_size() as u64);
        patches.set(HoleValue::Data, data as u64);
        patches.set(HoleValue::Executor, executor as *const Executor as u64);
        patches.set(HoleValue::Oparg, instruction.oparg as u64);
        if cfg!(target_pointer_width = "64") {
            patches.set(HoleValue::Operand, instruction.operand);
        } else {
            patches.set(HoleValue::OperandHi, instruction.operand >> 32);
            patches.set(HoleValue::OperandLo, instruction.operand & u32::MAX as u64);
        }

        match instruction.format {
            Format::Target => {
                patches.set(HoleValue::Target, instruction.target);
            }
            Format::Exit => {
                assert!(
                    instruction.exit_index < executor.exit_count,
                    "exit_index {} out of range for {} exits",
                    instruction.exit_index,
                    executor.exit_count,
                );
                patches.set(HoleValue::ExitIndex, instruction.exit_index as u64);
                if (instruction.error_target as usize) < trace.len() {
                    patches.set(
                        HoleValue::ErrorTarget,
                        memory as u64 + instruction_starts[instruction.error_target as usize] as u64,
                    );
                }
            }
            Format::Jump => {
                assert!(
                    (instruction.jump_target as usize) < trace.len(),
                    "jump_target {} out of range for a trace of length {}",
                    instruction.jump_target,
                    trace.len(),
                );
                patches.set(
                    HoleValue::JumpTarget,
                    memory as u64 + instruction_starts[instruction.jump_target as usize] as u64,
                );
                if (instruction.error_target as usize) < trace.len() {
                    patches.set(
                        HoleValue::ErrorTarget,
                        memory as u64 + instruction_starts[instruction.error_target as usize] as u64,
                    );
                }
            }
        }

        if trace.len() > 1 {
            patches.set(HoleValue::Top, memory as u64 + instruction_starts[1] as u64);
        }
        patches.set(HoleValue::Zero, 0);

        // SAFETY: `code`/`data` have room for this instruction's group by
        // construction of the size pass above.
        unsafe { stencil::emit(group, &patches) };
        code = unsafe { code.add(group.code.body_size()) };
        data = unsafe { data.add(group.data.body_size()) };
    }

    // --- Fatal-error tail emission ---
    {
        let group = &table.fatal_error;
        let mut patches = PatchTable::defaulted();
        // `CONTINUE` and `TOP` alias the tail's own `CODE` position: the
        // tail never falls through, so there is nothing meaningful to
        // "continue" or "top" to. Retained from the original rather than
        // resolved to something more conventional.
        patches.set(HoleValue::Code, code as u64);
        patches.set(HoleValue::Continue, code as u64);
        patches.set(HoleValue::Data, data as u64);
        patches.set(HoleValue::Executor, executor as *const Executor as u64);
        patches.set(HoleValue::Top, code as u64);
        patches.set(HoleValue::Zero, 0);
        // SAFETY: same as above.
        unsafe { stencil::emit(group, &patches) };
        code = unsafe { code.add(group.code.body_size()) };
        data = unsafe { data.add(group.data.body_size()) };
    }

    debug_assert_eq!(code as usize - memory as usize, code_size);
    debug_assert_eq!(data as usize - memory as usize, code_size + data_size);

    // --- Finalize ---
    match buffer.mark_executable() {
        Ok(executable) => {
            executor.attach(executable, table.trampoline.code.body_size());
            Ok(())
        }
        Err(err) => {
            // `buffer` drops here, releasing the region; the executor is
            // left untouched (its previous region, if any, is unaffected).
            Err(err)
        }
    }
}

/// Releases `executor`'s compiled region, if any. A free failure is logged
/// (via `log::warn!`, inside [`crate::memory::ExecutableBuffer`]'s `Drop`)
/// but never propagated, and the executor's fields are cleared regardless
/// -- a second call is a no-op.
pub fn free(executor: &mut Executor) {
    executor.release();
}

/// The FFI-shaped entry point: `0` on success, `-1` on a recoverable
/// failure, matching the original's `_PyJIT_Compile` contract exactly. No
/// structured error crosses this boundary; callers that want the error
/// should use [`compile`] directly.
pub fn compile_raw(
    table: &StencilTable<'_>,
    executor: &mut Executor,
    trace: &[TraceInstruction],
) -> i32 {
    match compile(table, executor, trace) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

//! Hand-authored x86-64 stencil fixtures standing in for the offline
//! toolchain's generated table, used only by the integration tests in this
//! directory. Production embeddings would generate this table via
//! `build.rs`, as `cranelift-jit`'s own `build.rs`-backed crates do for
//! their code tables.

#![allow(dead_code)]

use tracejit::{
    EntryOpcodes, Executor, Format, Hole, HoleKind, HoleValue, Stencil, StencilGroup,
    StencilTable, TraceInstruction,
};

/// Returns 0 to its caller without touching the stack: `mov eax, 0; ret`.
/// Used alone as a length-1 trace (seed scenario 1).
pub const RETURN_ZERO_OPCODE: u16 = 10;
/// `jmp rel32`, patched against `JUMP_TARGET` (seed scenario 4's entry).
pub const JUMP_OPCODE: u16 = 11;
/// `ud2` -- must never be reached if the jump above lands correctly.
pub const TRAP_OPCODE: u16 = 12;
/// `mov eax, 42; ret` -- the jump's landing pad.
pub const LANDING_OPCODE: u16 = 13;
/// A stencil with a fully empty code and data body (seed scenario 2).
pub const NOP_LIKE_OPCODE: u16 = 14;
/// A single `nop` whose data half carries an `ERROR_TARGET` hole (seed
/// scenario 3).
pub const EXIT_PROBE_OPCODE: u16 = 15;
pub const COLD_EXIT_OPCODE: u16 = 99;

const GROUP_COUNT: usize = 16;

static RETURN_ZERO_CODE: [u8; 6] = [0xB8, 0x00, 0x00, 0x00, 0x00, 0xC3];

// `jmp rel32` with a hole patched against `JUMP_TARGET`; `addend = -4`
// accounts for the displacement being relative to the end of the
// instruction (the field's end), not its start (where the hole sits).
static JUMP_CODE: [u8; 5] = [0xE9, 0x00, 0x00, 0x00, 0x00];
static JUMP_HOLES: [Hole; 1] = [Hole {
    offset: 1,
    kind: HoleKind::X8664RelocBranch,
    value: HoleValue::JumpTarget,
    symbol: 0,
    addend: -4,
}];

static TRAP_CODE: [u8; 2] = [0x0F, 0x0B];
static LANDING_CODE: [u8; 6] = [0xB8, 0x2A, 0x00, 0x00, 0x00, 0xC3];

static NOP_CODE: [u8; 1] = [0x90];
static ERROR_TARGET_DATA: [u8; 8] = [0; 8];
static ERROR_TARGET_HOLES: [Hole; 1] = [Hole {
    offset: 0,
    kind: HoleKind::X8664RelocUnsigned,
    value: HoleValue::ErrorTarget,
    symbol: 0,
    addend: 0,
}];

fn empty_stencil() -> Stencil {
    Stencil {
        body: &[],
        holes: &[],
    }
}

/// A stencil table covering the fixture opcodes above, with an empty
/// trampoline (this platform's calling convention needs no adapter) and a
/// two-byte `ud2` fatal tail. `entry_opcode` is whichever fixture opcode the
/// calling test's trace starts with.
pub fn table(entry_opcode: u16) -> StencilTable<'static> {
    let mut groups = vec![StencilGroup::EMPTY; GROUP_COUNT];

    groups[RETURN_ZERO_OPCODE as usize] = StencilGroup {
        code: Stencil {
            body: &RETURN_ZERO_CODE,
            holes: &[],
        },
        data: empty_stencil(),
    };
    groups[JUMP_OPCODE as usize] = StencilGroup {
        code: Stencil {
            body: &JUMP_CODE,
            holes: &JUMP_HOLES,
        },
        data: empty_stencil(),
    };
    groups[TRAP_OPCODE as usize] = StencilGroup {
        code: Stencil {
            body: &TRAP_CODE,
            holes: &[],
        },
        data: empty_stencil(),
    };
    groups[LANDING_OPCODE as usize] = StencilGroup {
        code: Stencil {
            body: &LANDING_CODE,
            holes: &[],
        },
        data: empty_stencil(),
    };
    groups[NOP_LIKE_OPCODE as usize] = StencilGroup::EMPTY;
    groups[EXIT_PROBE_OPCODE as usize] = StencilGroup {
        code: Stencil {
            body: &NOP_CODE,
            holes: &[],
        },
        data: Stencil {
            body: &ERROR_TARGET_DATA,
            holes: &ERROR_TARGET_HOLES,
        },
    };

    StencilTable {
        groups: Box::leak(groups.into_boxed_slice()),
        trampoline: StencilGroup::EMPTY,
        fatal_error: StencilGroup {
            code: Stencil {
                body: &TRAP_CODE,
                holes: &[],
            },
            data: empty_stencil(),
        },
        entry_opcodes: EntryOpcodes {
            trace_entry: entry_opcode,
            cold_exit: COLD_EXIT_OPCODE,
        },
    }
}

pub fn target_instruction(opcode: u16) -> TraceInstruction {
    TraceInstruction {
        opcode,
        oparg: 0,
        operand: 0,
        target: 0,
        exit_index: 0,
        jump_target: 0,
        error_target: u32::MAX,
        format: Format::Target,
    }
}

pub fn jump_instruction(opcode: u16, jump_target: u32) -> TraceInstruction {
    TraceInstruction {
        opcode,
        oparg: 0,
        operand: 0,
        target: 0,
        exit_index: 0,
        jump_target,
        error_target: u32::MAX,
        format: Format::Jump,
    }
}

pub fn exit_instruction(opcode: u16, exit_index: u32, error_target: u32) -> TraceInstruction {
    TraceInstruction {
        opcode,
        oparg: 0,
        operand: 0,
        target: 0,
        exit_index,
        jump_target: 0,
        error_target,
        format: Format::Exit,
    }
}

pub fn fresh_executor(exit_count: u32) -> Executor {
    Executor::new(exit_count)
}

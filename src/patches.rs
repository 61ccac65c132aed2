//! The patch table: a per-emission mapping from symbolic hole-value
//! identifiers (`CODE`, `DATA`, `EXECUTOR`, ...) to concrete 64-bit
//! addresses or literals.
//!
//! Modeled as a fixed-size array indexed by a closed enumeration rather than
//! a hash map, per the "pointer graphs" guidance in the design notes:
//! stencil references are non-owning, and there are few enough hole values
//! that a linear array beats any hashing overhead.

/// Symbolic identifiers a [`Hole`](crate::stencil::Hole) can reference.
///
/// `OPERAND_HI`/`OPERAND_LO` only matter on 32-bit hosts; on 64-bit hosts
/// `OPERAND` carries the whole value. Both are always present in the table
/// so a single `GET_PATCHES`-equivalent template works on every host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum HoleValue {
    Code = 0,
    Data,
    Continue,
    Top,
    Executor,
    Oparg,
    Operand,
    OperandHi,
    OperandLo,
    Target,
    JumpTarget,
    ErrorTarget,
    ExitIndex,
    Zero,
}

impl HoleValue {
    pub(crate) const COUNT: usize = 14;

    pub(crate) const ALL: [HoleValue; Self::COUNT] = [
        HoleValue::Code,
        HoleValue::Data,
        HoleValue::Continue,
        HoleValue::Top,
        HoleValue::Executor,
        HoleValue::Oparg,
        HoleValue::Operand,
        HoleValue::OperandHi,
        HoleValue::OperandLo,
        HoleValue::Target,
        HoleValue::JumpTarget,
        HoleValue::ErrorTarget,
        HoleValue::ExitIndex,
        HoleValue::Zero,
    ];
}

/// A freshly-defaulted-then-overwritten mapping from [`HoleValue`] to a
/// 64-bit address or literal, scoped to one stencil emission.
///
/// Equivalent to the original's `uintptr_t patches[] = GET_PATCHES();`
/// followed by a handful of targeted overwrites.
#[derive(Debug, Clone, Copy)]
pub struct PatchTable {
    values: [u64; HoleValue::COUNT],
}

impl PatchTable {
    /// A table with every hole value defaulted to zero, equivalent to the
    /// offline toolchain's `GET_PATCHES()` template before any
    /// emission-specific overwrites.
    pub fn defaulted() -> Self {
        Self {
            values: [0; HoleValue::COUNT],
        }
    }

    pub fn get(&self, value: HoleValue) -> u64 {
        self.values[value as usize]
    }

    pub fn set(&mut self, value: HoleValue, patch: u64) {
        self.values[value as usize] = patch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaulted_table_is_all_zero() {
        let table = PatchTable::defaulted();
        for value in HoleValue::ALL {
            assert_eq!(table.get(value), 0);
        }
    }

    #[test]
    fn set_only_touches_its_own_slot() {
        let mut table = PatchTable::defaulted();
        table.set(HoleValue::Data, 0x1000);
        for value in HoleValue::ALL {
            let expected = if value == HoleValue::Data { 0x1000 } else { 0 };
            assert_eq!(table.get(value), expected);
        }
    }
}

//! Stencils: pre-compiled binary fragments, and the emitter that copies one
//! into place and patches its holes.

use crate::patches::{HoleValue, PatchTable};
use crate::reloc::{self, Hole};

/// One compiled fragment: raw bytes to copy, plus the ordered relocations
/// to apply once they're copied.
#[derive(Debug, Clone, Copy)]
pub struct Stencil {
    /// Raw bytes to be copied verbatim before patching.
    pub body: &'static [u8],
    /// Pending relocations, in the order the engine must apply them (this
    /// matters for the AArch64 ADRP-pair fusion, which inspects `holes[i+1]`).
    pub holes: &'static [Hole],
}

impl Stencil {
    /// Size of this stencil's body, in bytes.
    pub fn body_size(&self) -> usize {
        self.body.len()
    }
}

/// The empty stencil: a zero-byte body with no holes. Used for the
/// trampoline and fatal-error tail on platforms where they degenerate to
/// nothing.
pub const EMPTY_STENCIL: Stencil = Stencil {
    body: &[],
    holes: &[],
};

/// A code Stencil and a data Stencil sharing one patch table during
/// emission. Indexed by opcode in the offline toolchain's table; the
/// trampoline and fatal-error tail are the two distinguished groups outside
/// that table.
#[derive(Debug, Clone, Copy)]
pub struct StencilGroup {
    pub code: Stencil,
    pub data: Stencil,
}

impl StencilGroup {
    pub const EMPTY: StencilGroup = StencilGroup {
        code: EMPTY_STENCIL,
        data: EMPTY_STENCIL,
    };
}

/// Copies `stencil.body` to `base` and applies its holes against `patches`.
///
/// # Safety
///
/// `base` must point to at least `stencil.body_size()` writable bytes, and
/// every hole's offset (plus its relocation's width) must lie within that
/// range.
unsafe fn copy_and_patch(base: *mut u8, stencil: &Stencil, patches: &PatchTable) {
    if stencil.body.is_empty() {
        return;
    }
    // SAFETY: delegated to the caller.
    unsafe {
        std::ptr::copy_nonoverlapping(stencil.body.as_ptr(), base, stencil.body.len());
        reloc::apply(base, stencil.holes, patches);
    }
}

/// Emits one `StencilGroup`: the data half first (so the code half's
/// relaxation reads, which dereference addresses pointing into the data
/// region, observe valid bytes), then the code half.
///
/// `patches` must already have [`HoleValue::Data`] and [`HoleValue::Code`]
/// set to the destination addresses for this group's two halves.
///
/// # Safety
///
/// The destination addresses in `patches` for `Data` and `Code` must each
/// point to at least `group.data.body_size()`/`group.code.body_size()`
/// writable bytes, per [`copy_and_patch`]'s contract.
pub(crate) unsafe fn emit(group: &StencilGroup, patches: &PatchTable) {
    let data_base = patches.get(HoleValue::Data) as *mut u8;
    let code_base = patches.get(HoleValue::Code) as *mut u8;
    // SAFETY: delegated to the caller.
    unsafe {
        copy_and_patch(data_base, &group.data, patches);
        copy_and_patch(code_base, &group.code, patches);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitting_empty_group_touches_nothing() {
        let mut patches = PatchTable::defaulted();
        // Point both halves at a real (but zero-length) allocation's
        // address so the null destination is never dereferenced; since
        // both bodies are empty, `copy_and_patch` returns before doing so.
        let sentinel = 1usize; // a non-null, non-dereferenced marker address
        patches.set(HoleValue::Data, sentinel as u64);
        patches.set(HoleValue::Code, sentinel as u64);
        // SAFETY: both stencils in `StencilGroup::EMPTY` have empty bodies,
        // so `emit` never dereferences the sentinel addresses.
        unsafe { emit(&StencilGroup::EMPTY, &patches) };
    }

    #[test]
    fn copy_and_patch_preserves_bytes_outside_holes() {
        let stencil = Stencil {
            body: &[0xAA, 0xBB, 0xCC, 0xDD, 0x00, 0x00, 0x00, 0x00],
            holes: &[Hole {
                offset: 4,
                kind: reloc::HoleKind::RAarch64Abs64,
                value: HoleValue::Zero,
                symbol: 0,
                addend: 0,
            }],
        };
        let mut patches = PatchTable::defaulted();
        patches.set(HoleValue::Zero, 0);
        // The hole at offset 4 writes an 8-byte value, so the buffer needs
        // 12 bytes for that write to stay in bounds.
        let mut buf = [0xFFu8; 12];
        unsafe { copy_and_patch(buf.as_mut_ptr(), &stencil, &patches) };
        assert_eq!(&buf[0..4], &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(u64::from_ne_bytes(buf[4..12].try_into().unwrap()), 0);
    }
}

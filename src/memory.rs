//! The OS memory facade: page-aligned allocate / free / mark-executable,
//! with instruction-cache coherence handled as part of the RW -> RX flip.
//!
//! Grounded on `jit_alloc`/`jit_free`/`mark_executable` in the original
//! source, and on `wasmtime-internal-jit-icache-coherence`'s `cfg_if!`
//! dispatch for the flush step.

use crate::error::JitError;
use std::io;
use std::ptr::NonNull;

/// The OS page size, in bytes. Cached on first use; it cannot change while
/// the process is running.
pub fn page_size() -> usize {
    use std::sync::OnceLock;
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: `sysconf` with this argument has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    debug_assert!(size > 0);
    size as usize
}

#[cfg(windows)]
fn query_page_size() -> usize {
    use windows_sys::Win32::System::SystemInformation::GetSystemInfo;
    let mut info = unsafe { std::mem::zeroed() };
    // SAFETY: `info` is a valid, properly-sized out parameter.
    unsafe { GetSystemInfo(&mut info) };
    info.dwPageSize as usize
}

/// Rounds `size` up to the next multiple of the page size.
pub fn round_up_to_page_size(size: usize) -> usize {
    let page = page_size();
    (size + page - 1) / page * page
}

/// A freshly-allocated, zero-filled, readable-and-writable region.
///
/// Owns its memory: dropping it without calling [`JitBuffer::mark_executable`]
/// releases the pages, logging (but not propagating) any OS failure, exactly
/// as `_PyJIT_Free`'s `PyErr_WriteUnraisable` does.
pub struct JitBuffer {
    ptr: NonNull<u8>,
    len: usize,
    // Set once the buffer has been handed off to `mark_executable` or `free`
    // so `Drop` doesn't double-release.
    released: bool,
}

// SAFETY: the buffer is an owned, exclusively-held anonymous mapping; no
// other handle to these pages exists until `mark_executable` returns one.
unsafe impl Send for JitBuffer {}

impl JitBuffer {
    /// Allocates `size` bytes, zero-filled and read/write. `size` must be a
    /// nonzero multiple of the page size.
    pub fn allocate(size: usize) -> Result<Self, JitError> {
        debug_assert_ne!(size, 0);
        debug_assert_eq!(size % page_size(), 0);
        let ptr = platform::alloc(size).map_err(JitError::Allocation)?;
        Ok(Self {
            ptr,
            len: size,
            released: false,
        })
    }

    /// Number of bytes in the region.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Raw, writable pointer to the start of the region.
    ///
    /// # Safety
    ///
    /// The caller must not write past `len()` bytes, and must not retain the
    /// pointer past the point where `mark_executable` is called (the region
    /// becomes non-writable at that point, and later writes through a stale
    /// pointer are undefined behavior on most platforms).
    pub unsafe fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Flushes the instruction cache and transitions the region from RW to
    /// RX. Consumes `self`: there is no way to get a writable view of these
    /// pages back, which is the Rust-native way to enforce the "never
    /// simultaneously writable and executable" invariant at the type level
    /// rather than only by discipline.
    ///
    /// A size-0 region (which cannot actually occur, since `allocate`
    /// requires a nonzero size) would be a no-op per the original's
    /// `mark_executable`; callers that legitimately have zero bytes to
    /// protect should simply not call this at all.
    pub fn mark_executable(mut self) -> Result<ExecutableBuffer, JitError> {
        platform::flush_icache(self.ptr, self.len);
        #[cfg(test)]
        if testing::protect_failure_is_forced() {
            // `self` drops here (released == false), freeing the region just
            // as a real `mprotect`/`VirtualProtect` failure would.
            return Err(JitError::Protection(io::Error::other(
                "simulated mark_executable failure (test fault injection)",
            )));
        }
        platform::protect_exec(self.ptr, self.len).map_err(JitError::Protection)?;
        self.released = true;
        Ok(ExecutableBuffer {
            ptr: self.ptr,
            len: self.len,
        })
    }
}


impl Drop for JitBuffer {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(err) = platform::free(self.ptr, self.len) {
                log::warn!("JIT unable to free memory ({err})");
            }
        }
    }
}

/// A finalized, read-execute region. The only operations available are
/// reading its base address and size and eventually freeing it; nothing in
/// this crate ever writes through one again.
pub struct ExecutableBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: same reasoning as `JitBuffer`; the region is read/execute only.
unsafe impl Send for ExecutableBuffer {}
unsafe impl Sync for ExecutableBuffer {}

impl ExecutableBuffer {
    /// Base address of the region.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Size of the region, in bytes. Always a multiple of the page size.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Releases the region back to the OS. Reports (via `log::warn!`) but
    /// does not propagate a failure, matching `_PyJIT_Free`.
    pub fn free(self) {
        // `Drop` does the actual work; this just makes the intent explicit
        // at call sites that want to free eagerly rather than on scope exit.
        drop(self);
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        if let Err(err) = platform::free(self.ptr, self.len) {
            log::warn!("JIT unable to free memory ({err})");
        }
    }
}

#[cfg(unix)]
mod platform {
    use super::NonNull;
    use std::io;

    pub(super) fn alloc(size: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: a fixed set of well-formed arguments to `mmap`; the
        // returned pointer is checked for `MAP_FAILED` before use.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(NonNull::new(ptr as *mut u8).expect("mmap returned a non-null pointer"))
    }

    pub(super) fn free(ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        // SAFETY: `ptr`/`size` describe exactly the region returned by a
        // prior `alloc` call of the same size.
        let failed = unsafe { libc::munmap(ptr.as_ptr().cast(), size) } != 0;
        if failed {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn protect_exec(ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        // SAFETY: `ptr`/`size` describe a region previously mapped
        // read/write by `alloc` of the same size.
        let failed =
            unsafe { libc::mprotect(ptr.as_ptr().cast(), size, libc::PROT_READ | libc::PROT_EXEC) }
                != 0;
        if failed {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn flush_icache(ptr: NonNull<u8>, size: usize) {
        cfg_if::cfg_if! {
            if #[cfg(any(target_arch = "x86", target_arch = "x86_64"))] {
                // x86/x86-64 keep the instruction and data caches coherent
                // in hardware; no explicit flush is needed.
                let _ = (ptr, size);
            } else {
                // SAFETY: `ptr..ptr+size` is the region we're about to
                // protect executable; `__clear_cache` only reads the range.
                unsafe {
                    let start = ptr.as_ptr();
                    let end = start.add(size);
                    clear_cache_range(start.cast(), end.cast());
                }
            }
        }
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    unsafe fn clear_cache_range(start: *mut std::ffi::c_void, end: *mut std::ffi::c_void) {
        extern "C" {
            #[link_name = "__clear_cache"]
            fn clear_cache(start: *mut std::ffi::c_void, end: *mut std::ffi::c_void);
        }
        unsafe { clear_cache(start, end) }
    }
}

#[cfg(windows)]
mod platform {
    use super::NonNull;
    use std::io;
    use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_EXECUTE_READ, PAGE_READWRITE,
    };
    use windows_sys::Win32::System::Threading::GetCurrentProcess;

    pub(super) fn alloc(size: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: a fixed set of well-formed arguments to `VirtualAlloc`.
        let ptr = unsafe {
            VirtualAlloc(
                std::ptr::null(),
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        NonNull::new(ptr as *mut u8).ok_or_else(io::Error::last_os_error)
    }

    pub(super) fn free(ptr: NonNull<u8>, _size: usize) -> io::Result<()> {
        // SAFETY: `ptr` is exactly the base address returned by `alloc`;
        // `MEM_RELEASE` requires the size argument to be zero.
        let failed = unsafe { VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) } == 0;
        if failed {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn protect_exec(ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        let mut old = 0u32;
        // SAFETY: `ptr`/`size` describe a region previously committed
        // read/write by `alloc` of the same size.
        let failed =
            unsafe { VirtualProtect(ptr.as_ptr().cast(), size, PAGE_EXECUTE_READ, &mut old) } == 0;
        if failed {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn flush_icache(ptr: NonNull<u8>, size: usize) {
        // SAFETY: `ptr..ptr+size` is the region we're about to protect
        // executable; this only reads the range.
        unsafe {
            FlushInstructionCache(GetCurrentProcess(), ptr.as_ptr().cast(), size);
        }
    }
}

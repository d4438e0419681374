//! Anonymous shared mappings and the cross-process construction barrier.
//!
//! The region owner maps before forking; children inherit the mapping, so
//! every participant sees the same addresses.

use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use nix::libc;

use crate::error::FfqError;

/// mmap an anonymous MAP_SHARED region of `bytes`.
///
/// # Safety
///
/// The caller owns the mapping and must pair it with `unmap_shared`.
pub unsafe fn map_shared(bytes: usize) -> Result<*mut u8, FfqError> {
    let ptr = libc::mmap(
        ptr::null_mut(),
        bytes,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if ptr == libc::MAP_FAILED {
        return Err(FfqError::RegionAllocFailed(bytes));
    }
    Ok(ptr.cast())
}

/// # Safety
///
/// `ptr`/`len` must come from a successful `map_shared`, and no live
/// reference into the mapping may outlive this call.
pub unsafe fn unmap_shared(ptr: *mut u8, len: usize) {
    if libc::munmap(ptr.cast(), len) == -1 {
        panic!("munmap failed: {}", std::io::Error::last_os_error());
    }
}

/// Owned anonymous shared mapping. Created by the region owner before
/// forking; peers hold raw pointers into it, never a `SharedRegion`.
#[derive(Debug)]
pub struct SharedRegion {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for SharedRegion {}

impl SharedRegion {
    pub fn new(len: usize) -> Result<Self, FfqError> {
        let ptr = unsafe { map_shared(len)? };
        Ok(Self { ptr, len })
    }

    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer `offset` bytes into the mapping.
    ///
    /// # Safety
    ///
    /// `offset` must be within the mapping and suitably aligned for the
    /// object placed there.
    pub unsafe fn at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset < self.len);
        self.ptr.add(offset)
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe { unmap_shared(self.ptr, self.len) };
    }
}

/// Sense-reversing barrier living inside a shared mapping.
///
/// Every participant calls `wait` (or `wait_timeout`) once per phase; the
/// last arrival flips the generation and releases the rest. The queue
/// protocol uses one crossing after construction and one before teardown.
#[repr(C)]
pub struct ShmBarrier {
    members: u32,
    arrived: AtomicU32,
    generation: AtomicU32,
}

impl ShmBarrier {
    pub fn shared_size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Placement-construct a barrier for `members` participants.
    ///
    /// # Safety
    ///
    /// `mem` must point to `shared_size()` writable shared bytes, aligned
    /// for `Self`, written before any participant calls `wait`.
    pub unsafe fn init_in_shared(mem: *mut u8, members: u32) -> &'static Self {
        assert!(members >= 1);
        let barrier_ptr = mem as *mut Self;
        ptr::write(
            barrier_ptr,
            Self {
                members,
                arrived: AtomicU32::new(0),
                generation: AtomicU32::new(0),
            },
        );
        &*barrier_ptr
    }

    /// # Safety
    ///
    /// `mem` must be a mapping some process already ran `init_in_shared` on.
    pub unsafe fn attach(mem: *mut u8) -> &'static Self {
        &*(mem as *const Self)
    }

    /// Block until all members arrive.
    pub fn wait(&self) {
        let crossed = self.wait_deadline(None);
        debug_assert!(crossed);
    }

    /// Block until all members arrive or `timeout` elapses. Returns false
    /// on timeout; the barrier is unusable afterwards.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_deadline(Some(timeout))
    }

    fn wait_deadline(&self, timeout: Option<Duration>) -> bool {
        let generation = self.generation.load(Ordering::Acquire);
        if self.arrived.fetch_add(1, Ordering::AcqRel) + 1 == self.members {
            self.arrived.store(0, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::Release);
            return true;
        }

        let start = Instant::now();
        while self.generation.load(Ordering::Acquire) == generation {
            if let Some(limit) = timeout {
                if start.elapsed() > limit {
                    return false;
                }
            }
            std::hint::spin_loop();
        }
        true
    }
}

// Region backends for the ring and the peer tables.
// Heap regions serve threads of one process; /dev/shm + mmap regions can be
// opened by name from another process.

use std::alloc::{self, Layout};
use std::fmt::{self, Debug};
use std::io;
use std::ptr::NonNull;

/// Alignment every backend guarantees for the start of its region.
pub const REGION_ALIGN: usize = 128;

/// A contiguous, writable byte region owned by one backend.
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Get a pointer to the start of the region (aligned to [`REGION_ALIGN`])
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the region in bytes
    fn size(&self) -> usize;

    /// Get the OS handle behind the region, if any
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Process heap, no OS object behind it
    None,
    /// Unix file descriptor (Linux)
    Fd(i32),
}

/// A zeroed heap allocation aligned to [`REGION_ALIGN`].
pub struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The region is plain bytes; synchronisation is the queue's job.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "HeapRegion::new(): size must be greater than zero",
            ));
        }

        let layout = Layout::from_size_align(size, REGION_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("failed to allocate {size} byte heap region"),
            )
        })?;

        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl Debug for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapRegion")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size", &self.layout.size())
            .finish()
    }
}

impl SharedMemoryBackend for HeapRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::None
    }
}

/// Create a new shared memory region named `name` with the specified size.
///
/// The file lives at `/dev/shm/<name>` and is unlinked when the returned
/// backend is dropped.
#[cfg(target_os = "linux")]
pub fn create_shared_memory(name: &str, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::create(name, size)?))
}

/// Attach to an existing shared memory region of at least `min_size` bytes.
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(name: &str, min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::attach(name, min_size)?))
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(_name: &str, _size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named ring regions require Linux /dev/shm",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_name: &str, _min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named ring regions require Linux /dev/shm",
    ))
}

#[cfg(target_os = "linux")]
pub use linux::LinuxSharedMemory;

#[cfg(target_os = "linux")]
mod linux {
    use super::{RawHandle, SharedMemoryBackend};
    use std::fs::{self, OpenOptions};
    use std::io;
    use std::os::fd::{AsRawFd, IntoRawFd};
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::PathBuf;
    use std::ptr::{self, NonNull};

    /// A `/dev/shm` file mapped `MAP_SHARED` into this process.
    #[derive(Debug)]
    pub struct LinuxSharedMemory {
        ptr: NonNull<u8>,
        size: usize,
        fd: i32,
        /// Set for the creator, which removes the file on drop.
        path: Option<PathBuf>,
    }

    unsafe impl Send for LinuxSharedMemory {}
    unsafe impl Sync for LinuxSharedMemory {}

    fn shm_path(name: &str) -> io::Result<PathBuf> {
        if name.is_empty() || name.contains('/') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid shared memory name {name:?}"),
            ));
        }
        Ok(PathBuf::from(format!("/dev/shm/{name}")))
    }

    /// mmap `size` bytes of `fd`. Closes `fd` on failure.
    unsafe fn map_fd(fd: i32, size: usize) -> io::Result<NonNull<u8>> {
        let ptr = libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        );

        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        // mmap hands back page-aligned memory, which satisfies REGION_ALIGN.
        NonNull::new(ptr as *mut u8).ok_or_else(|| {
            libc::close(fd);
            io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping")
        })
    }

    impl LinuxSharedMemory {
        /// Create (or truncate) `/dev/shm/<name>` and map `size` bytes of it.
        pub fn create(name: &str, size: usize) -> io::Result<Self> {
            let path = shm_path(name)?;

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)
                .map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!("create {}: {e}", path.display()),
                    )
                })?;

            if unsafe { libc::ftruncate(file.as_raw_fd(), size as libc::off_t) } != 0 {
                let err = io::Error::last_os_error();
                let _ = fs::remove_file(&path);
                return Err(err);
            }

            // Keep the file descriptor alive for the lifetime of the mapping
            let fd = file.into_raw_fd();
            let ptr = match unsafe { map_fd(fd, size) } {
                Ok(ptr) => ptr,
                Err(e) => {
                    let _ = fs::remove_file(&path);
                    return Err(e);
                }
            };

            Ok(Self {
                ptr,
                size,
                fd,
                path: Some(path),
            })
        }

        /// Map an existing `/dev/shm/<name>` created by another handle or process.
        pub fn attach(name: &str, min_size: usize) -> io::Result<Self> {
            let path = shm_path(name)?;

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("open {}: {e}", path.display()),
                    )
                })?;

            let size = file.metadata()?.len() as usize;
            if size == 0 || size < min_size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("region {} holds {size} bytes, need at least {min_size}", path.display()),
                ));
            }

            let fd = file.into_raw_fd();
            let ptr = unsafe { map_fd(fd, size)? };

            Ok(Self {
                ptr,
                size,
                fd,
                path: None,
            })
        }

        /// True when this handle created the file and will unlink it on drop.
        pub fn is_owner(&self) -> bool {
            self.path.is_some()
        }
    }

    impl Drop for LinuxSharedMemory {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
                libc::close(self.fd);
            }
            if let Some(path) = self.path.take() {
                let _ = fs::remove_file(path);
            }
        }
    }

    impl SharedMemoryBackend for LinuxSharedMemory {
        fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        fn size(&self) -> usize {
            self.size
        }

        fn raw_handle(&self) -> RawHandle {
            RawHandle::Fd(self.fd)
        }
    }
}

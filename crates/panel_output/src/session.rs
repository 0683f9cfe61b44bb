use common_io::{argb_frame_len, nv12_frame_len, DeviceError, DisplaySink, OverlayPlane, SharedOverlay};
use libloading::{Library, Symbol};
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum PanelError {
    LibraryLoad(String),
    SymbolMissing(&'static str),
    OpenFailed,
    TooFewSlots(i32),
    SessionClosed,
    BadSlot(usize),
    FrameSizeMismatch { expected: usize, actual: usize },
    CommitFailed(i32),
    OverlayUpdateFailed(i32),
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelError::LibraryLoad(msg) => write!(f, "failed to load display library: {}", msg),
            PanelError::SymbolMissing(name) => {
                write!(f, "display library is missing symbol {}", name)
            }
            PanelError::OpenFailed => write!(f, "display open returned a null handle"),
            PanelError::TooFewSlots(n) => {
                write!(f, "display granted only {} video slot(s), need at least 2", n)
            }
            PanelError::SessionClosed => write!(f, "display session is closed"),
            PanelError::BadSlot(slot) => write!(f, "slot index {} is out of range", slot),
            PanelError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "frame is {} bytes but the display slot takes {}",
                actual, expected
            ),
            PanelError::CommitFailed(rc) => write!(f, "display commit failed (rc={})", rc),
            PanelError::OverlayUpdateFailed(rc) => {
                write!(f, "overlay plane update failed (rc={})", rc)
            }
        }
    }
}

impl std::error::Error for PanelError {}

type OpenFn = unsafe extern "C" fn(u32, u32) -> *mut c_void;
type BufferCountFn = unsafe extern "C" fn(*mut c_void) -> i32;
type BufferMapFn = unsafe extern "C" fn(*mut c_void, u32) -> *mut u8;
type UpdateBufferFn = unsafe extern "C" fn(*mut c_void, u32) -> i32;
type CommitFn = unsafe extern "C" fn(*mut c_void) -> i32;
type WaitVsyncFn = unsafe extern "C" fn(*mut c_void);
type OpenOverlayFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type OverlayUpdateFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *const u8) -> i32;
type CloseFn = unsafe extern "C" fn(*mut c_void);

/// Display library handle plus every entry point, resolved once at open.
struct Shared {
    _lib: Library,
    disp: *mut c_void,
    closed: AtomicBool,
    buffer_map_fn: BufferMapFn,
    update_buffer_fn: UpdateBufferFn,
    commit_fn: CommitFn,
    wait_vsync_fn: WaitVsyncFn,
    overlay_update_fn: OverlayUpdateFn,
    close_fn: CloseFn,
}

// The display handle is shared between the session (video plane, main
// thread) and the overlay (box plane, detection thread). The vendor library
// serializes plane operations internally; the overlay is additionally behind
// a Mutex.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, PanelError> {
    let raw: Symbol<'_, T> = unsafe { lib.get(name.as_bytes()) }
        .map_err(|_| PanelError::SymbolMissing(name))?;
    Ok(*raw)
}

/// The panel's ARGB box plane. Handed out at most once per session.
pub struct PanelOverlay {
    shared: Arc<Shared>,
    plane: *mut c_void,
    width: u32,
    height: u32,
}

unsafe impl Send for PanelOverlay {}

impl OverlayPlane for PanelOverlay {
    fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn update(&mut self, argb: &[u8]) -> Result<(), DeviceError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(PanelError::SessionClosed.into());
        }
        let expected = argb_frame_len(self.width, self.height);
        if argb.len() != expected {
            return Err(PanelError::FrameSizeMismatch { expected, actual: argb.len() }.into());
        }
        let rc = unsafe {
            (self.shared.overlay_update_fn)(self.shared.disp, self.plane, argb.as_ptr())
        };
        if rc != 0 {
            return Err(PanelError::OverlayUpdateFailed(rc).into());
        }
        Ok(())
    }
}

/// One open panel: a ring of mapped NV12 video slots plus, when the hardware
/// has a second plane, one ARGB overlay surface.
pub struct PanelSession {
    shared: Arc<Shared>,
    open: bool,
    width: u32,
    height: u32,
    slots: usize,
    frame_len: usize,
    overlay: Option<SharedOverlay>,
}

unsafe impl Send for PanelSession {}

impl PanelSession {
    /// Load the vendor display library, open the panel at the given
    /// geometry, and probe for the overlay plane.
    pub fn open(lib_path: &str, width: u32, height: u32) -> Result<Self, PanelError> {
        let lib = unsafe { Library::new(lib_path) }
            .map_err(|e| PanelError::LibraryLoad(format!("{}: {}", lib_path, e)))?;

        let open_fn: OpenFn = symbol(&lib, "display_open")?;
        let buffer_count_fn: BufferCountFn = symbol(&lib, "display_buffer_count")?;
        let buffer_map_fn: BufferMapFn = symbol(&lib, "display_buffer_map")?;
        let update_buffer_fn: UpdateBufferFn = symbol(&lib, "display_update_buffer")?;
        let commit_fn: CommitFn = symbol(&lib, "display_commit")?;
        let wait_vsync_fn: WaitVsyncFn = symbol(&lib, "display_wait_vsync")?;
        let open_overlay_fn: OpenOverlayFn = symbol(&lib, "display_open_overlay")?;
        let overlay_update_fn: OverlayUpdateFn = symbol(&lib, "display_overlay_update")?;
        let close_fn: CloseFn = symbol(&lib, "display_close")?;

        let disp = unsafe { open_fn(width, height) };
        if disp.is_null() {
            return Err(PanelError::OpenFailed);
        }

        let count = unsafe { buffer_count_fn(disp) };
        if count < 2 {
            unsafe { close_fn(disp) };
            return Err(PanelError::TooFewSlots(count));
        }

        let shared = Arc::new(Shared {
            _lib: lib,
            disp,
            closed: AtomicBool::new(false),
            buffer_map_fn,
            update_buffer_fn,
            commit_fn,
            wait_vsync_fn,
            overlay_update_fn,
            close_fn,
        });

        // Null plane handle means the panel has no second plane; boxes are
        // simply not drawn in that case.
        let plane = unsafe { open_overlay_fn(disp) };
        let overlay: Option<SharedOverlay> = if plane.is_null() {
            None
        } else {
            Some(Arc::new(Mutex::new(PanelOverlay {
                shared: Arc::clone(&shared),
                plane,
                width,
                height,
            })))
        };

        Ok(PanelSession {
            shared,
            open: true,
            width,
            height,
            slots: count as usize,
            frame_len: nv12_frame_len(width, height),
            overlay,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.shared.closed.store(true, Ordering::Release);
        unsafe { (self.shared.close_fn)(self.shared.disp) };
        self.open = false;
    }

    fn check_slot(&self, slot: usize) -> Result<(), PanelError> {
        if !self.open {
            return Err(PanelError::SessionClosed);
        }
        if slot >= self.slots {
            return Err(PanelError::BadSlot(slot));
        }
        Ok(())
    }
}

impl Drop for PanelSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl DisplaySink for PanelSession {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn write_slot(&mut self, slot: usize, nv12: &[u8]) -> Result<(), DeviceError> {
        self.check_slot(slot)?;
        if nv12.len() != self.frame_len {
            return Err(PanelError::FrameSizeMismatch {
                expected: self.frame_len,
                actual: nv12.len(),
            }
            .into());
        }
        let map = unsafe { (self.shared.buffer_map_fn)(self.shared.disp, slot as u32) };
        if map.is_null() {
            return Err(PanelError::BadSlot(slot).into());
        }
        unsafe { std::ptr::copy_nonoverlapping(nv12.as_ptr(), map, self.frame_len) };
        Ok(())
    }

    fn commit(&mut self, slot: usize) -> Result<(), DeviceError> {
        self.check_slot(slot)?;
        let rc = unsafe { (self.shared.update_buffer_fn)(self.shared.disp, slot as u32) };
        if rc != 0 {
            return Err(PanelError::CommitFailed(rc).into());
        }
        let rc = unsafe { (self.shared.commit_fn)(self.shared.disp) };
        if rc != 0 {
            return Err(PanelError::CommitFailed(rc).into());
        }
        Ok(())
    }

    fn wait_vsync(&mut self) {
        if self.open {
            unsafe { (self.shared.wait_vsync_fn)(self.shared.disp) };
        }
    }

    fn take_overlay(&mut self) -> Option<SharedOverlay> {
        self.overlay.take()
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        PanelSession::close(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display() {
        let display = format!("{}", PanelError::TooFewSlots(1));
        assert!(display.contains("need at least 2"));
        let display = format!("{}", PanelError::FrameSizeMismatch { expected: 10, actual: 4 });
        assert!(display.contains("10"));
    }

    #[test]
    fn open_rejects_missing_library() {
        let err = PanelSession::open("/nonexistent/libpaneldisp.so", 480, 800)
            .err()
            .unwrap();
        assert!(matches!(err, PanelError::LibraryLoad(_)));
    }
}

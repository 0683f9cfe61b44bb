use crate::error::DetectError;
use libloading::{Library, Symbol};
use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::slice;

type CreateFn = unsafe extern "C" fn(*const c_char, i32) -> *mut c_void;
type RunNv12Fn = unsafe extern "C" fn(*mut c_void, *const u8, i32, i32) -> i32;
type OutputCountFn = unsafe extern "C" fn(*mut c_void) -> i32;
type OutputFn = unsafe extern "C" fn(*mut c_void, i32, *mut i32) -> *const f32;
type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Session on the vendor NPU runtime. The runtime owns model loading, the
/// on-device letterbox preprocessor, and the output tensors; this handle
/// exposes one inference entry and read access to the raw outputs.
pub struct NpuRuntime {
    _lib: Library,
    session: *mut c_void,
    run_nv12_fn: RunNv12Fn,
    output_count_fn: OutputCountFn,
    output_fn: OutputFn,
    destroy_fn: DestroyFn,
    has_run: bool,
}

// The session pointer moves to the detection thread with its owner; the
// runtime is only ever called from one thread at a time.
unsafe impl Send for NpuRuntime {}

fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, DetectError> {
    let raw: Symbol<'_, T> = unsafe { lib.get(name.as_bytes()) }
        .map_err(|_| DetectError::SymbolMissing(name))?;
    Ok(*raw)
}

impl NpuRuntime {
    pub fn open(lib_path: &str, model_path: &str, variant: i32) -> Result<Self, DetectError> {
        let lib = unsafe { Library::new(lib_path) }
            .map_err(|e| DetectError::LibraryLoad(format!("{}: {}", lib_path, e)))?;

        let create_fn: CreateFn = symbol(&lib, "npu_create")?;
        let run_nv12_fn: RunNv12Fn = symbol(&lib, "npu_run_nv12")?;
        let output_count_fn: OutputCountFn = symbol(&lib, "npu_output_count")?;
        let output_fn: OutputFn = symbol(&lib, "npu_output")?;
        let destroy_fn: DestroyFn = symbol(&lib, "npu_destroy")?;

        let model_c = CString::new(model_path)
            .map_err(|_| DetectError::ModelLoad(format!("bad model path: {}", model_path)))?;
        let session = unsafe { create_fn(model_c.as_ptr(), variant) };
        if session.is_null() {
            return Err(DetectError::ModelLoad(model_path.to_string()));
        }

        Ok(NpuRuntime {
            _lib: lib,
            session,
            run_nv12_fn,
            output_count_fn,
            output_fn,
            destroy_fn,
            has_run: false,
        })
    }

    /// One inference pass over an NV12 image. Invalidates the previous
    /// pass's output slices.
    pub fn run_nv12(&mut self, nv12: &[u8], width: u32, height: u32) -> Result<(), DetectError> {
        if self.session.is_null() {
            return Err(DetectError::SessionClosed);
        }
        let rc = unsafe {
            (self.run_nv12_fn)(self.session, nv12.as_ptr(), width as i32, height as i32)
        };
        if rc != 0 {
            return Err(DetectError::InferFailed(rc));
        }
        self.has_run = true;
        Ok(())
    }

    pub fn output_count(&self) -> usize {
        if self.session.is_null() {
            return 0;
        }
        let n = unsafe { (self.output_count_fn)(self.session) };
        n.max(0) as usize
    }

    /// Raw output tensor for one scale. Valid until the next `run_nv12`.
    pub fn output(&self, index: usize) -> Result<&[f32], DetectError> {
        if self.session.is_null() || !self.has_run {
            return Err(DetectError::SessionClosed);
        }
        let mut len: i32 = 0;
        let ptr = unsafe { (self.output_fn)(self.session, index as i32, &mut len) };
        if ptr.is_null() || len < 0 {
            return Err(DetectError::BadOutputLayout { index, len: 0, expected: 0 });
        }
        Ok(unsafe { slice::from_raw_parts(ptr, len as usize) })
    }

    pub fn close(&mut self) {
        if !self.session.is_null() {
            unsafe { (self.destroy_fn)(self.session) };
            self.session = std::ptr::null_mut();
        }
    }
}

impl Drop for NpuRuntime {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_missing_library() {
        let err = NpuRuntime::open("/nonexistent/libnpu.so", "model.kmodel", 0)
            .err()
            .unwrap();
        assert!(matches!(err, DetectError::LibraryLoad(_)));
    }
}

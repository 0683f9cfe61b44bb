use crate::sys;
use common_io::{nv12_strided_len, CapturedFrame, DeviceError, FrameMeta, FrameSource};
use std::ffi::CString;
use std::fmt;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::slice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    DeviceOpen { errno: i32 },
    NotACaptureDevice,
    FormatRejected,
    Ioctl { op: &'static str, errno: i32 },
    InsufficientBuffers(u32),
    MmapFailed { errno: i32 },
    SessionClosed,
    BadBufferIndex(u32),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceOpen { errno } => {
                write!(f, "failed to open video device: {}", io::Error::from_raw_os_error(*errno))
            }
            CaptureError::NotACaptureDevice => {
                write!(f, "device does not support streaming video capture")
            }
            CaptureError::FormatRejected => {
                write!(f, "driver refused the NV12 capture format")
            }
            CaptureError::Ioctl { op, errno } => {
                write!(f, "{} failed: {}", op, io::Error::from_raw_os_error(*errno))
            }
            CaptureError::InsufficientBuffers(n) => {
                write!(f, "driver granted only {} capture buffer(s), need at least 2", n)
            }
            CaptureError::MmapFailed { errno } => {
                write!(f, "mmap of capture buffer failed: {}", io::Error::from_raw_os_error(*errno))
            }
            CaptureError::SessionClosed => write!(f, "capture session is closed"),
            CaptureError::BadBufferIndex(i) => {
                write!(f, "driver returned out-of-range buffer index {}", i)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// ioctl with EINTR retry. V4L2 drivers interrupt freely under signal load.
fn xioctl<T>(fd: RawFd, request: libc::c_ulong, arg: *mut T) -> Result<(), i32> {
    loop {
        let rc = unsafe { libc::ioctl(fd, request, arg) };
        if rc == 0 {
            return Ok(());
        }
        let errno = last_errno();
        if errno != libc::EINTR {
            return Err(errno);
        }
    }
}

struct MappedBuffer {
    ptr: *mut u8,
    len: usize,
}

/// Memory-mapped streaming capture on a V4L2 device. The driver owns a ring
/// of NV12 buffers; each dequeued buffer stays on loan until `enqueue_buffer`
/// hands it back.
pub struct CaptureSession {
    fd: RawFd,
    open: bool,
    streaming: bool,
    buffers: Vec<MappedBuffer>,
    width: u32,
    height: u32,
    stride: u32,
    frame_count: u64,
}

// The mmap pointers are owned exclusively by this session.
unsafe impl Send for CaptureSession {}

impl CaptureSession {
    pub fn open(
        device: &str,
        width: u32,
        height: u32,
        buffer_count: u32,
    ) -> Result<Self, CaptureError> {
        let path = CString::new(device).map_err(|_| CaptureError::DeviceOpen { errno: libc::EINVAL })?;
        let fd = unsafe {
            libc::open(path.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK | libc::O_CLOEXEC)
        };
        if fd < 0 {
            return Err(CaptureError::DeviceOpen { errno: last_errno() });
        }

        let mut session = CaptureSession {
            fd,
            open: true,
            streaming: false,
            buffers: Vec::new(),
            width: 0,
            height: 0,
            stride: 0,
            frame_count: 0,
        };
        match session.initialize(width, height, buffer_count) {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close();
                Err(e)
            }
        }
    }

    fn initialize(&mut self, width: u32, height: u32, buffer_count: u32) -> Result<(), CaptureError> {
        let mut cap: sys::v4l2_capability = unsafe { mem::zeroed() };
        xioctl(self.fd, sys::VIDIOC_QUERYCAP, &mut cap)
            .map_err(|errno| CaptureError::Ioctl { op: "VIDIOC_QUERYCAP", errno })?;
        let needed = sys::V4L2_CAP_VIDEO_CAPTURE | sys::V4L2_CAP_STREAMING;
        if cap.capabilities & needed != needed {
            return Err(CaptureError::NotACaptureDevice);
        }

        let mut fmt: sys::v4l2_format = unsafe { mem::zeroed() };
        fmt.type_ = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE;
        fmt.fmt.pix = sys::v4l2_pix_format {
            width,
            height,
            pixelformat: sys::V4L2_PIX_FMT_NV12,
            field: sys::V4L2_FIELD_NONE,
            ..unsafe { mem::zeroed() }
        };
        xioctl(self.fd, sys::VIDIOC_S_FMT, &mut fmt)
            .map_err(|errno| CaptureError::Ioctl { op: "VIDIOC_S_FMT", errno })?;
        let pix = unsafe { &fmt.fmt.pix };
        if pix.pixelformat != sys::V4L2_PIX_FMT_NV12 {
            return Err(CaptureError::FormatRejected);
        }
        // The driver may adjust the geometry; what it reports back is what
        // arrives in every buffer.
        self.width = pix.width;
        self.height = pix.height;
        self.stride = if pix.bytesperline != 0 { pix.bytesperline } else { pix.width };
        if (pix.sizeimage as usize) < nv12_strided_len(self.stride, self.height) {
            return Err(CaptureError::FormatRejected);
        }

        let mut req: sys::v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = buffer_count;
        req.type_ = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE;
        req.memory = sys::V4L2_MEMORY_MMAP;
        xioctl(self.fd, sys::VIDIOC_REQBUFS, &mut req)
            .map_err(|errno| CaptureError::Ioctl { op: "VIDIOC_REQBUFS", errno })?;
        if req.count < 2 {
            return Err(CaptureError::InsufficientBuffers(req.count));
        }

        for index in 0..req.count {
            let mut buf: sys::v4l2_buffer = unsafe { mem::zeroed() };
            buf.index = index;
            buf.type_ = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE;
            buf.memory = sys::V4L2_MEMORY_MMAP;
            xioctl(self.fd, sys::VIDIOC_QUERYBUF, &mut buf)
                .map_err(|errno| CaptureError::Ioctl { op: "VIDIOC_QUERYBUF", errno })?;

            let len = buf.length as usize;
            let offset = unsafe { buf.m.offset };
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    self.fd,
                    offset as libc::off_t,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(CaptureError::MmapFailed { errno: last_errno() });
            }
            self.buffers.push(MappedBuffer { ptr: ptr as *mut u8, len });
        }

        for index in 0..self.buffers.len() as u32 {
            self.queue_buffer(index)?;
        }

        let mut buf_type: libc::c_int = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
        xioctl(self.fd, sys::VIDIOC_STREAMON, &mut buf_type)
            .map_err(|errno| CaptureError::Ioctl { op: "VIDIOC_STREAMON", errno })?;
        self.streaming = true;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Pull the next filled buffer. `Ok(None)` when the driver has nothing
    /// ready yet; the caller backs off and retries.
    pub fn dequeue_frame(&mut self) -> Result<Option<CapturedFrame<'_>>, CaptureError> {
        if !self.open {
            return Err(CaptureError::SessionClosed);
        }

        let mut buf: sys::v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = sys::V4L2_MEMORY_MMAP;
        if let Err(errno) = xioctl(self.fd, sys::VIDIOC_DQBUF, &mut buf) {
            if errno == libc::EAGAIN {
                return Ok(None);
            }
            return Err(CaptureError::Ioctl { op: "VIDIOC_DQBUF", errno });
        }

        let index = buf.index;
        let mapped = self
            .buffers
            .get(index as usize)
            .ok_or(CaptureError::BadBufferIndex(index))?;

        let t_capture_ns = (buf.timestamp.tv_sec.max(0) as u64) * 1_000_000_000
            + (buf.timestamp.tv_usec.max(0) as u64) * 1_000;
        let meta = FrameMeta {
            width: self.width,
            height: self.height,
            stride_bytes: self.stride,
            frame_idx: self.frame_count,
            t_capture_ns,
        };
        self.frame_count += 1;

        // The whole mapping, not `bytesused`: the format negotiation pinned
        // sizeimage to at least one full strided frame, and some drivers
        // report 0 here for uncompressed captures.
        let data = unsafe { slice::from_raw_parts(mapped.ptr, mapped.len) };
        Ok(Some(CapturedFrame { meta, index, data }))
    }

    /// Hand a buffer back to the driver's free ring.
    pub fn enqueue_buffer(&mut self, index: u32) -> Result<(), CaptureError> {
        if !self.open {
            return Err(CaptureError::SessionClosed);
        }
        if index as usize >= self.buffers.len() {
            return Err(CaptureError::BadBufferIndex(index));
        }
        self.queue_buffer(index)
    }

    fn queue_buffer(&mut self, index: u32) -> Result<(), CaptureError> {
        let mut buf: sys::v4l2_buffer = unsafe { mem::zeroed() };
        buf.index = index;
        buf.type_ = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = sys::V4L2_MEMORY_MMAP;
        xioctl(self.fd, sys::VIDIOC_QBUF, &mut buf)
            .map_err(|errno| CaptureError::Ioctl { op: "VIDIOC_QBUF", errno })
    }

    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        if self.streaming {
            let mut buf_type: libc::c_int = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
            if let Err(errno) = xioctl(self.fd, sys::VIDIOC_STREAMOFF, &mut buf_type) {
                eprintln!(
                    "v4l2: VIDIOC_STREAMOFF failed: {}",
                    io::Error::from_raw_os_error(errno)
                );
            }
            self.streaming = false;
        }
        for mapped in self.buffers.drain(..) {
            unsafe {
                libc::munmap(mapped.ptr as *mut libc::c_void, mapped.len);
            }
        }
        unsafe {
            libc::close(self.fd);
        }
        self.open = false;
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl FrameSource for CaptureSession {
    fn dequeue(&mut self) -> Result<Option<CapturedFrame<'_>>, DeviceError> {
        self.dequeue_frame().map_err(Into::into)
    }

    fn enqueue(&mut self, index: u32) -> Result<(), DeviceError> {
        self.enqueue_buffer(index).map_err(Into::into)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        CaptureSession::close(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display() {
        let display = format!("{}", CaptureError::InsufficientBuffers(1));
        assert!(display.contains("need at least 2"));
        let display = format!("{}", CaptureError::Ioctl { op: "VIDIOC_DQBUF", errno: libc::EIO });
        assert!(display.contains("VIDIOC_DQBUF"));
    }

    #[test]
    fn open_rejects_missing_device() {
        let err = CaptureSession::open("/dev/does-not-exist-video99", 800, 480, 4)
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::DeviceOpen { .. }));
    }
}

//! Minimal V4L2 ABI surface for the streaming-capture ioctls this crate
//! issues. Struct layouts follow videodev2.h for 64-bit targets; request
//! codes are computed from the struct sizes so they stay in sync.

#![allow(non_camel_case_types)]

use std::mem::size_of;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_FIELD_NONE: u32 = 1;

pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;

pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

pub const V4L2_PIX_FMT_NV12: u32 = fourcc(b'N', b'V', b'1', b'2');

#[repr(C)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct v4l2_pix_format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

#[repr(C)]
pub union v4l2_format_union {
    pub pix: v4l2_pix_format,
    pub raw_data: [u8; 200],
    // v4l2_window holds pointers, forcing 8-byte union alignment in C.
    pub _align: [u64; 25],
}

#[repr(C)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_union,
}

#[repr(C)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub reserved: [u8; 4],
}

#[repr(C)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: libc::c_ulong,
    pub fd: i32,
}

#[repr(C)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: u32,
}

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> libc::c_ulong {
    ((dir << 30) | ((size as u32) << 16) | ((ty as u32) << 8) | (nr as u32)) as libc::c_ulong
}

pub const VIDIOC_QUERYCAP: libc::c_ulong =
    ioc(IOC_READ, b'V', 0, size_of::<v4l2_capability>());
pub const VIDIOC_S_FMT: libc::c_ulong =
    ioc(IOC_READ | IOC_WRITE, b'V', 4, size_of::<v4l2_format>());
pub const VIDIOC_REQBUFS: libc::c_ulong =
    ioc(IOC_READ | IOC_WRITE, b'V', 8, size_of::<v4l2_requestbuffers>());
pub const VIDIOC_QUERYBUF: libc::c_ulong =
    ioc(IOC_READ | IOC_WRITE, b'V', 9, size_of::<v4l2_buffer>());
pub const VIDIOC_QBUF: libc::c_ulong =
    ioc(IOC_READ | IOC_WRITE, b'V', 15, size_of::<v4l2_buffer>());
pub const VIDIOC_DQBUF: libc::c_ulong =
    ioc(IOC_READ | IOC_WRITE, b'V', 17, size_of::<v4l2_buffer>());
pub const VIDIOC_STREAMON: libc::c_ulong =
    ioc(IOC_WRITE, b'V', 18, size_of::<libc::c_int>());
pub const VIDIOC_STREAMOFF: libc::c_ulong =
    ioc(IOC_WRITE, b'V', 19, size_of::<libc::c_int>());

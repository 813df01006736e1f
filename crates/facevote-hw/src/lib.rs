//! facevote-hw: camera capture for the voting station.
//!
//! Provides grayscale frames from V4L2 devices and the `FrameSource` trait
//! the enrollment and recognition loops pull frames from.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::{Frame, FrameSource};

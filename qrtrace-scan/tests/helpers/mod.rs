//! Test Helper Utilities
//!
//! Shared fakes and fixtures for testing qrtrace-scan

#![allow(dead_code)]

pub mod fakes;
pub mod qr_images;

pub use fakes::{FakeCamera, FakeDecoder, FakeLookup};
pub use qr_images::{qr_frame, qr_png_bytes, write_frame_dir};

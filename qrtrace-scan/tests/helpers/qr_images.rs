//! QR image fixtures generated with the `qrcode` crate

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};

const MODULE_PX: u32 = 6;
const QUIET_ZONE: u32 = 4;

/// Render `text` as a greyscale QR frame with a quiet zone
pub fn qr_frame(text: &str) -> GrayImage {
    let code = QrCode::new(text.as_bytes()).expect("encode QR");
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let size = (modules + 2 * QUIET_ZONE) * MODULE_PX;

    GrayImage::from_fn(size, size, |x, y| {
        let mx = (x / MODULE_PX) as i64 - QUIET_ZONE as i64;
        let my = (y / MODULE_PX) as i64 - QUIET_ZONE as i64;
        let inside = mx >= 0 && my >= 0 && (mx as u32) < modules && (my as u32) < modules;
        if inside && colors[(my as u32 * modules + mx as u32) as usize] == Color::Dark {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// PNG-encoded QR image for `text`
pub fn qr_png_bytes(text: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(qr_frame(text))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode PNG");
    bytes
}

/// Write `blank_frames` empty frames followed by one QR frame for `text`
pub fn write_frame_dir(dir: &Path, blank_frames: usize, text: &str) {
    for i in 0..blank_frames {
        GrayImage::from_pixel(120, 120, Luma([255]))
            .save(dir.join(format!("frame-{:04}.png", i)))
            .expect("write blank frame");
    }
    std::fs::write(
        dir.join(format!("frame-{:04}.png", blank_frames)),
        qr_png_bytes(text),
    )
    .expect("write QR frame");
}

//! Face signature extraction from detected regions.
//!
//! A signature is the face region cropped out of the grayscale frame,
//! resized to a fixed square grid and flattened into `[0, 1]` floats.
//! Every signature produced by one extractor has the same width.

use crate::types::{BoundingBox, Signature};
use image::imageops::{self, FilterType};
use image::GrayImage;
use thiserror::Error;

pub const DEFAULT_GRID_SIZE: u32 = 100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    #[error("invalid face region {width}x{height} at ({x}, {y})")]
    InvalidRegion { x: f32, y: f32, width: f32, height: f32 },
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },
}

/// Turns a detected face region into a fixed-length signature.
pub trait SignatureExtractor {
    fn extract(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Signature, SignatureError>;

    /// Width of every signature this extractor produces.
    fn dimensions(&self) -> usize;
}

/// Flattened normalized pixel grid.
#[derive(Debug, Clone, Copy)]
pub struct PixelGridExtractor {
    size: u32,
}

impl PixelGridExtractor {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }
}

impl Default for PixelGridExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_SIZE)
    }
}

impl SignatureExtractor for PixelGridExtractor {
    fn extract(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Signature, SignatureError> {
        let expected = width as usize * height as usize;
        if frame.len() < expected {
            return Err(SignatureError::FrameTooShort {
                expected,
                actual: frame.len(),
            });
        }
        let (x, y, w, h) = clamp_region(face, width, height)?;

        let image = GrayImage::from_raw(width, height, frame[..expected].to_vec()).ok_or(
            SignatureError::FrameTooShort {
                expected,
                actual: frame.len(),
            },
        )?;
        let crop = imageops::crop_imm(&image, x, y, w, h).to_image();
        let grid = imageops::resize(&crop, self.size, self.size, FilterType::Triangle);

        let values = grid.into_raw().into_iter().map(|p| p as f32 / 255.0).collect();
        Ok(Signature { values })
    }

    fn dimensions(&self) -> usize {
        (self.size * self.size) as usize
    }
}

/// Clamp a bounding box to the frame, returning integer (x, y, w, h).
fn clamp_region(
    face: &BoundingBox,
    width: u32,
    height: u32,
) -> Result<(u32, u32, u32, u32), SignatureError> {
    let invalid = || SignatureError::InvalidRegion {
        x: face.x,
        y: face.y,
        width: face.width,
        height: face.height,
    };

    let finite = [face.x, face.y, face.width, face.height]
        .iter()
        .all(|v| v.is_finite());
    if !finite || face.width <= 0.0 || face.height <= 0.0 {
        return Err(invalid());
    }

    let x0 = face.x.floor().clamp(0.0, width as f32) as u32;
    let y0 = face.y.floor().clamp(0.0, height as f32) as u32;
    let x1 = (face.x + face.width).ceil().clamp(0.0, width as f32) as u32;
    let y1 = (face.y + face.height).ceil().clamp(0.0, height as f32) as u32;

    if x1 <= x0 || y1 <= y0 {
        return Err(invalid());
    }

    Ok((x0, y0, x1 - x0, y1 - y0))
}

use serde::{Deserialize, Serialize};

/// Axis-aligned face bounding box in original-resolution pixel coordinates.
///
/// Invariant: `x + width <= frame_width` and `y + height <= frame_height`
/// for the frame it was detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    /// Maps a box detected on a downscaled frame back to the original frame.
    ///
    /// Each coordinate is divided by `downscale` and truncated, then the box
    /// is clamped into `frame_width x frame_height`. Negative inputs clamp
    /// to 0.
    pub fn from_detection(
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        downscale: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let rescale = |v: i32| -> u32 {
            let scaled = (v.max(0) as f64 / downscale).trunc();
            if scaled >= u32::MAX as f64 {
                u32::MAX
            } else {
                scaled as u32
            }
        };

        let x = rescale(x).min(frame_width);
        let y = rescale(y).min(frame_height);
        Self {
            x,
            y,
            width: rescale(width).min(frame_width - x),
            height: rescale(height).min(frame_height - y),
        }
    }

    #[cfg(test)]
    pub(crate) fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= frame_width as u64
            && self.y as u64 + self.height as u64 <= frame_height as u64
    }
}

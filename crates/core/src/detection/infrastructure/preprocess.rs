//! Frame preparation for the cascade classifier: shrink, then drop to a
//! single luminance channel.

use ndarray::Axis;

use crate::shared::frame::Frame;

/// ITU-R BT.601 luma weights for R, G, B.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Resizes an RGB frame by a linear `factor` (bilinear).
///
/// Target dimensions are truncated, never below 1 pixel. A factor of 1.0
/// returns the frame unchanged.
pub fn downscale(frame: &Frame, factor: f64) -> Result<Frame, Box<dyn std::error::Error>> {
    if frame.channels() != 3 {
        return Err(format!("expected RGB frame, got {} channels", frame.channels()).into());
    }
    if (factor - 1.0).abs() < f64::EPSILON {
        return Ok(frame.clone());
    }

    let width = ((frame.width() as f64 * factor) as u32).max(1);
    let height = ((frame.height() as f64 * factor) as u32).max(1);

    let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or("Failed to create image from frame data")?;
    let resized =
        image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);

    Ok(Frame::new(
        resized.into_raw(),
        width,
        height,
        3,
        frame.index(),
    ))
}

/// Converts an RGB frame to a 1-channel luminance frame.
pub fn luminance(frame: &Frame) -> Result<Frame, Box<dyn std::error::Error>> {
    if frame.channels() != 3 {
        return Err(format!("expected RGB frame, got {} channels", frame.channels()).into());
    }

    let pixels = frame.as_ndarray()?;
    let gray: Vec<u8> = pixels
        .lanes(Axis(2))
        .into_iter()
        .map(|rgb| {
            let y: f32 = rgb
                .iter()
                .zip(LUMA_WEIGHTS)
                .map(|(&c, w)| c as f32 * w)
                .sum();
            y.round().min(255.0) as u8
        })
        .collect();

    Ok(Frame::new(
        gray,
        frame.width(),
        frame.height(),
        1,
        frame.index(),
    ))
}

//! QA overlay: tint hard-label pixels of an 8-bit RGB image.
use image::{Rgb, RgbImage};
use thiserror::Error;

use crate::grid::HardLabel;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("image is {image_w}x{image_h} but label is {label_w}x{label_h}")]
    ShapeMismatch {
        image_w: u32,
        image_h: u32,
        label_w: usize,
        label_h: usize,
    },
    #[error("label class {0} has no palette entry")]
    MissingClass(u8),
}

/// Class-indexed colour table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette(pub Vec<[u8; 3]>);

impl Palette {
    /// PASCAL-VOC style palette: the bits of the class index are spread
    /// across R, G, B from the most significant bit down.
    /// Class 0 is black, class 1 is `[128, 0, 0]`.
    pub fn voc(num_classes: usize) -> Self {
        let colors = (0..num_classes)
            .map(|k| {
                let mut c = [0u8; 3];
                let mut label = k;
                let mut i = 0;
                while label > 0 && i < 8 {
                    c[0] |= ((label & 1) as u8) << (7 - i);
                    c[1] |= (((label >> 1) & 1) as u8) << (7 - i);
                    c[2] |= (((label >> 2) & 1) as u8) << (7 - i);
                    label >>= 3;
                    i += 1;
                }
                c
            })
            .collect();
        Self(colors)
    }

    pub fn get(&self, class: u8) -> Option<[u8; 3]> {
        self.0.get(class as usize).copied()
    }
}

/// Blend `palette[label]` into `base` at ratio `alpha` wherever the label is
/// nonzero. Class-0 pixels are copied unchanged.
///
/// Per channel: `out = trunc(px · (1 − α) + α · colour)`.
pub fn overlay(
    base: &RgbImage,
    label: &HardLabel,
    palette: &Palette,
    alpha: f32,
) -> Result<RgbImage, OverlayError> {
    let (iw, ih) = base.dimensions();
    if iw as usize != label.width || ih as usize != label.height {
        return Err(OverlayError::ShapeMismatch {
            image_w: iw,
            image_h: ih,
            label_w: label.width,
            label_h: label.height,
        });
    }

    let mut out = base.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let class = label.get(y as usize, x as usize);
        if class == 0 {
            continue;
        }
        let color = palette.get(class).ok_or(OverlayError::MissingClass(class))?;
        let Rgb(src) = *px;
        let mut blended = [0u8; 3];
        for ch in 0..3 {
            let v = src[ch] as f32 * (1.0 - alpha) + alpha * color[ch] as f32;
            blended[ch] = v.clamp(0.0, 255.0) as u8;
        }
        *px = Rgb(blended);
    }
    Ok(out)
}

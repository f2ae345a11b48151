use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use image::{imageops, RgbaImage};
use thiserror::Error;

use crate::vial::{encode_png, VialImage};

#[derive(Debug, Error, PartialEq)]
pub enum CropError {
    #[error("Vial at ({center_x}, {center_y}) with radius {radius} lies outside the image")]
    OutsideImage {
        center_x: f32,
        center_y: f32,
        radius: f32,
    },

    #[error("Could not encode vial preview: {0}")]
    Encode(String),
}

/// Pixel rectangle of a crop after clamping to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBounds {
    /// The `2r` square around the center, clipped to the image. `None` when nothing is left.
    pub fn around(
        center_x: f32,
        center_y: f32,
        radius: f32,
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        if !(center_x.is_finite() && center_y.is_finite() && radius.is_finite()) {
            return None;
        }

        let side = (2.0 * radius).round() as i64;
        let left = (center_x - radius).round() as i64;
        let top = (center_y - radius).round() as i64;

        let x0 = left.max(0);
        let y0 = top.max(0);
        let x1 = left.saturating_add(side).min(i64::from(image_width));
        let y1 = top.saturating_add(side).min(i64::from(image_height));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// A vial cut out of the photo, ready for the result list.
#[derive(Debug, Clone)]
pub struct CroppedVial {
    pub bounds: CropBounds,
    pub image: RgbaImage,
    pub data_url: String,
}

impl CroppedVial {
    pub fn html(&self) -> String {
        format!("<img src=\"{}\">", self.data_url)
    }
}

pub fn crop_vial(
    image: &VialImage,
    center_x: f32,
    center_y: f32,
    radius: f32,
) -> Result<CroppedVial, CropError> {
    let bounds = CropBounds::around(center_x, center_y, radius, image.width, image.height)
        .ok_or(CropError::OutsideImage {
            center_x,
            center_y,
            radius,
        })?;

    let cropped = imageops::crop_imm(
        image.pixels(),
        bounds.x,
        bounds.y,
        bounds.width,
        bounds.height,
    )
    .to_image();
    let png = encode_png(&cropped).map_err(|err| CropError::Encode(format!("{err:#}")))?;

    Ok(CroppedVial {
        bounds,
        image: cropped,
        data_url: format!("data:image/png;base64,{}", BASE64_STANDARD.encode(png)),
    })
}

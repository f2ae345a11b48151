use std::io::Cursor;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use eframe::egui::ColorImage;
use image::{ImageFormat, RgbaImage};
use serde::Deserialize;

/// A detected vial: its label and the circle it occupies, in image pixels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "(String, f32, f32, f32)")]
pub struct Vial {
    pub label: String,
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
}

impl Vial {
    pub fn new(label: impl Into<String>, center_x: f32, center_y: f32, radius: f32) -> Self {
        Self {
            label: label.into(),
            center_x,
            center_y,
            radius,
        }
    }
}

impl From<(String, f32, f32, f32)> for Vial {
    fn from((label, center_x, center_y, radius): (String, f32, f32, f32)) -> Self {
        Self::new(label, center_x, center_y, radius)
    }
}

/// The fully decoded photo returned by the processing service.
#[derive(Debug, Clone, PartialEq)]
pub struct VialImage {
    pub width: u32,
    pub height: u32,
    pixels: RgbaImage,
}

impl VialImage {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            pixels,
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn to_color_image(&self) -> ColorImage {
        rgba_to_color_image(&self.pixels)
    }
}

pub fn rgba_to_color_image(pixels: &RgbaImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied(
        [pixels.width() as usize, pixels.height() as usize],
        pixels.as_raw(),
    )
}

/// One element of the `/process_image` response array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    pub img: String,
    pub img_width: u32,
    pub img_height: u32,
    pub vials: Vec<Vial>,
}

/// A response whose raster has been decoded and is ready to be loaded.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: VialImage,
    pub vials: Vec<Vial>,
}

pub fn parse_process_response(body: &[u8]) -> Result<ProcessedImage> {
    let mut items: Vec<ProcessedImage> =
        serde_json::from_slice(body).context("Response is not a valid processing result")?;
    if items.is_empty() {
        bail!("Processing result array is empty");
    }
    Ok(items.swap_remove(0))
}

pub fn decode_processed_image(processed: ProcessedImage) -> Result<LoadedImage> {
    let png_bytes = BASE64_STANDARD
        .decode(processed.img.trim())
        .context("Image field is not valid base64")?;
    let decoded = image::load(Cursor::new(png_bytes), ImageFormat::Png)
        .context("Image field is not a decodable PNG")?
        .to_rgba8();

    if decoded.width() == 0 || decoded.height() == 0 {
        bail!("Processed image is empty");
    }
    if decoded.width() != processed.img_width || decoded.height() != processed.img_height {
        log::warn!(
            "Reported size {}x{} differs from decoded raster {}x{}; using raster size",
            processed.img_width,
            processed.img_height,
            decoded.width(),
            decoded.height()
        );
    }

    Ok(LoadedImage {
        image: VialImage::from_rgba(decoded),
        vials: processed.vials,
    })
}

pub fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>> {
    let mut encoded = Vec::new();
    pixels
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .context("Could not encode PNG")?;
    Ok(encoded)
}

#[cfg(test)]
pub(crate) fn encode_png_base64(pixels: &RgbaImage) -> String {
    BASE64_STANDARD.encode(encode_png(pixels).expect("PNG encoding should succeed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn vial_deserializes_from_four_element_array() {
        let vial: Vial = serde_json::from_str(r#"["A1", 100, 100.5, 20]"#).expect("vial parses");
        assert_eq!(vial, Vial::new("A1", 100.0, 100.5, 20.0));
    }

    #[test]
    fn parse_response_takes_first_element() {
        let body = br#"[{"text":"Processed image part 1","img":"abc","imgWidth":4,"imgHeight":2,"vials":[["B2",1,1,1]]}]"#;
        let processed = parse_process_response(body).expect("response parses");
        assert_eq!(processed.img, "abc");
        assert_eq!(processed.img_width, 4);
        assert_eq!(processed.img_height, 2);
        assert_eq!(processed.vials, vec![Vial::new("B2", 1.0, 1.0, 1.0)]);
    }

    #[test]
    fn parse_response_rejects_empty_array_and_garbage() {
        assert!(parse_process_response(b"[]").is_err());
        assert!(parse_process_response(b"<html>oops</html>").is_err());
        assert!(parse_process_response(br#"[{"img":"abc"}]"#).is_err());
    }

    #[test]
    fn parse_response_requires_vials_field() {
        let body = br#"[{"img":"abc","imgWidth":4,"imgHeight":2}]"#;
        let error = parse_process_response(body).expect_err("should fail");
        assert!(format!("{error:#}").contains("vials"));
        let with_vials = br#"[{"img":"abc","imgWidth":4,"imgHeight":2,"vials":[]}]"#;
        assert!(parse_process_response(with_vials).is_ok());
    }

    #[test]
    fn decode_processed_image_yields_full_raster() {
        let pixels = RgbaImage::from_pixel(6, 3, Rgba([10, 20, 30, 255]));
        let processed = ProcessedImage {
            img: encode_png_base64(&pixels),
            img_width: 6,
            img_height: 3,
            vials: vec![Vial::new("A1", 2.0, 1.0, 1.0)],
        };
        let loaded = decode_processed_image(processed).expect("image decodes");
        assert_eq!((loaded.image.width, loaded.image.height), (6, 3));
        assert_eq!(loaded.image.pixels().get_pixel(5, 2), &Rgba([10, 20, 30, 255]));
        assert_eq!(loaded.vials.len(), 1);
        assert_eq!(loaded.image.to_color_image().size, [6, 3]);
    }

    #[test]
    fn decode_processed_image_rejects_bad_base64() {
        let processed = ProcessedImage {
            img: "not base64!!".to_string(),
            img_width: 1,
            img_height: 1,
            vials: Vec::new(),
        };
        let error = decode_processed_image(processed).expect_err("should fail");
        assert!(format!("{error:#}").contains("base64"));
    }
}

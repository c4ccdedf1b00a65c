use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};

const JPEG_QUALITY: u8 = 92;

/// A frame ready for the classifier (`data_url`) and for the capture buffer
/// (`jpeg`). Both hold the same bytes.
pub struct EncodedFrame {
    pub jpeg: Arc<Vec<u8>>,
    pub data_url: String,
}

/// Stretches the frame to `size`×`size` and encodes it as JPEG.
pub fn encode_frame(image: &DynamicImage, size: u32) -> Result<EncodedFrame> {
    let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .context("failed to encode frame as JPEG")?;

    let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg));
    Ok(EncodedFrame {
        jpeg: Arc::new(jpeg),
        data_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    #[test]
    fn test_encoded_frame_is_square_jpeg() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 180, Rgb([40, 80, 120])));
        let encoded = encode_frame(&source, 640).unwrap();

        assert!(encoded.data_url.starts_with("data:image/jpeg;base64,"));
        let decoded = image::load_from_memory_with_format(&encoded.jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 640));

        let payload = encoded.data_url.trim_start_matches("data:image/jpeg;base64,");
        assert_eq!(BASE64.decode(payload).unwrap(), *encoded.jpeg);
    }
}

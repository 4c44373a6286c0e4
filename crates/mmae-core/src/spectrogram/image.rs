use png::{BitDepth, ColorType, Encoder};

use super::{Colormap, RenderError, Spectrogram};

#[must_use]
pub fn render_rgb(spectrogram: &Spectrogram, colormap: Colormap) -> Vec<u8> {
    spectrogram
        .values
        .iter()
        .flat_map(|&value| colormap.rgb(value))
        .collect()
}

pub fn encode_png(width: usize, height: usize, rgb: &[u8]) -> Result<Vec<u8>, RenderError> {
    let to_u32 = |value: usize| {
        u32::try_from(value).map_err(|_| RenderError::Encoding(format!("dimension {value} too large")))
    };
    if rgb.len() != width * height * 3 {
        return Err(RenderError::Encoding(format!(
            "expected {} rgb bytes for {width}x{height}, got {}",
            width * height * 3,
            rgb.len()
        )));
    }

    let mut png_bytes = Vec::new();
    {
        let mut encoder = Encoder::new(&mut png_bytes, to_u32(width)?, to_u32(height)?);
        encoder.set_color(ColorType::Rgb);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|error| RenderError::Encoding(error.to_string()))?;
        writer
            .write_image_data(rgb)
            .map_err(|error| RenderError::Encoding(error.to_string()))?;
        writer
            .finish()
            .map_err(|error| RenderError::Encoding(error.to_string()))?;
    }
    Ok(png_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_has_signature_and_dimensions() {
        let rgb = vec![10_u8; 4 * 2 * 3];
        let png_bytes = encode_png(4, 2, &rgb).expect("png should encode");
        assert_eq!(&png_bytes[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(&png_bytes[16..20], &4_u32.to_be_bytes());
        assert_eq!(&png_bytes[20..24], &2_u32.to_be_bytes());
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        assert!(matches!(
            encode_png(4, 4, &[0; 3]),
            Err(RenderError::Encoding(_))
        ));
    }
}

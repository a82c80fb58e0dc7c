use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use ndarray::{Array, IxDyn};

/// Resizes RGB frames to the model input size and scales them to a float
/// NHWC tensor.
///
/// The deployed classifiers take `[1, h, w, 3]` float input in 0..1; no
/// mean/std normalization and no letterboxing - a plain resize, which the
/// grid edge margins downstream assume.
pub struct PreProcessor {
    pub input_size: (u32, u32),
    rgb_buffer: Vec<u8>,
}

impl PreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            rgb_buffer: Vec::with_capacity(1920 * 1080 * 3),
        }
    }

    /// Frame pixels must be tightly packed RGB; anything else is a caller
    /// bug and is reported, not worked around.
    pub fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<Array<f32, IxDyn>> {
        let expected = (width * height * 3) as usize;
        if pixels.len() != expected {
            anyhow::bail!(
                "Frame buffer size mismatch: expected {} bytes for {}x{} RGB, got {}",
                expected,
                width,
                height,
                pixels.len()
            );
        }

        self.rgb_buffer.clear();
        self.rgb_buffer.extend_from_slice(pixels);

        let src = Image::from_slice_u8(width, height, &mut self.rgb_buffer, PixelType::U8x3)?;
        let (in_w, in_h) = self.input_size;
        let mut resized = Image::new(in_w, in_h, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        let input: Vec<f32> = resized.buffer().iter().map(|&b| b as f32 / 255.0).collect();

        Ok(Array::from_shape_vec(
            IxDyn(&[1, in_h as usize, in_w as usize, 3]),
            input,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_shape_is_nhwc() {
        let mut pre = PreProcessor::new((96, 96));
        let pixels = vec![0u8; 320 * 240 * 3];
        let input = pre.preprocess(&pixels, 320, 240).unwrap();
        assert_eq!(input.shape(), &[1, 96, 96, 3]);
    }

    #[test]
    fn pixels_scaled_to_unit_range() {
        let mut pre = PreProcessor::new((4, 4));
        let pixels = vec![255u8; 4 * 4 * 3];
        let input = pre.preprocess(&pixels, 4, 4).unwrap();
        assert!((input[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((input[[0, 3, 3, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn buffer_size_mismatch_is_an_error() {
        let mut pre = PreProcessor::new((96, 96));
        let pixels = vec![0u8; 100];
        let result = pre.preprocess(&pixels, 320, 240);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("mismatch"));
    }
}

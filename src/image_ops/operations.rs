use fast_image_resize::{FilterType, ResizeAlg, ResizeOptions, Resizer};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, ImageResult};
use std::io::{BufRead, Cursor, Seek};

/// Quality of every JPEG we produce, both cached originals and served previews
pub const JPEG_QUALITY: u8 = 85;

/// Decode any format supported by `image`, guessing it from the payload
pub fn decode<R: BufRead + Seek>(reader: R) -> ImageResult<DynamicImage> {
    ImageReader::new(reader).with_guessed_format()?.decode()
}

pub fn decode_bytes(data: &[u8]) -> ImageResult<DynamicImage> {
    decode(Cursor::new(data))
}

/// Resize to exactly `width` x `height` with Lanczos3, ignoring source ratio.
///
/// Upscales when source is smaller. Output is always 8 bit RGB, since it only ever
/// goes into JPEG.
pub fn resize_exact(
    img: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<DynamicImage, fast_image_resize::ResizeError> {
    let src = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut dst = DynamicImage::new_rgb8(width, height);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
    resizer.resize(&src, &mut dst, &options)?;

    Ok(dst)
}

/// JPEG encode at [`JPEG_QUALITY`]. Alpha is dropped
pub fn encode_jpeg(img: &DynamicImage) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img.write_with_encoder(encoder)?,
        _ => DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?,
    }
    Ok(buf)
}

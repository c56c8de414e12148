use crate::image_ops::image_types::Extensions;
use http::HeaderMap;
use image::DynamicImage;

/// Source location without scheme, `host[:port]/path`. Used verbatim as the cache key
pub type ImageId = String;

/// Decoded original image, with origin headers when it was freshly downloaded
pub struct OriginalImage {
    pub image: DynamicImage,
    /// Empty on cache hit
    pub headers: HeaderMap,
}

impl OriginalImage {
    pub fn new(image: DynamicImage, headers: HeaderMap) -> Self {
        OriginalImage { image, headers }
    }
}

/// Resized and encoded image, ready to be served
pub struct ProcessedImage {
    pub data: Vec<u8>,
    pub headers: HeaderMap,
    pub extension: Extensions,
}

impl ProcessedImage {
    pub fn new(data: Vec<u8>, headers: HeaderMap, extension: Extensions) -> Self {
        ProcessedImage {
            data,
            headers,
            extension,
        }
    }
}

//! Post form validation
//!
//! Turns raw submitted fields into typed, accepted values before they reach
//! the posts service. Every failing field is reported at once, keyed by
//! field name, so the caller can render all messages together.

use crate::config::{
    MAX_IMAGE_BYTES, MAX_IMAGE_DECODE_BYTES, MAX_IMAGE_DIMENSION, MIN_CONTENT_CHARS, MIN_TITLE_CHARS,
};
use crate::error::{AppError, Result};
use image::{ImageFormat, ImageReader, Limits};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

/// An uploaded file as received from the caller
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Client-supplied name, informational only
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Raw post submission, every field possibly missing
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image: Option<ImageUpload>,
}

/// Accepted image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// File extension used for stored keys
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
        }
    }

    /// Recover the kind from a stored key's extension
    pub fn from_key(key: &str) -> Option<ImageKind> {
        match key.rsplit_once('.')?.1 {
            "jpg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
        }
    }
}

/// Image bytes that passed size, format and decode checks.
///
/// Only this module can construct one.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    bytes: Vec<u8>,
    kind: ImageKind,
}

impl ValidatedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Accepted input for creating a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image: ValidatedImage,
}

/// Accepted input for updating a post
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub title: String,
    pub content: String,
    pub image: Option<ValidatedImage>,
}

/// Field name -> messages
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Validate a submission for creating a post (image required)
pub fn validate_create(form: PostForm) -> Result<NewPost> {
    let mut errors = ValidationErrors::new();

    let title = check_text(form.title, "title", MIN_TITLE_CHARS, &mut errors);
    let content = check_text(form.content, "content", MIN_CONTENT_CHARS, &mut errors);
    let image = match form.image {
        Some(upload) => check_image(upload, &mut errors),
        None => {
            errors.add("image", "The image field is required.");
            None
        }
    };

    match (title, content, image) {
        (Some(title), Some(content), Some(image)) => errors.into_result(|| NewPost {
            title,
            content,
            image,
        }),
        _ => Err(AppError::Validation(errors)),
    }
}

/// Validate a submission for updating a post (image optional)
pub fn validate_update(form: PostForm) -> Result<PostChanges> {
    let mut errors = ValidationErrors::new();

    let title = check_text(form.title, "title", MIN_TITLE_CHARS, &mut errors);
    let content = check_text(form.content, "content", MIN_CONTENT_CHARS, &mut errors);
    let image = form.image.map(|upload| check_image(upload, &mut errors));

    match (title, content, image) {
        (Some(title), Some(content), None) => errors.into_result(|| PostChanges {
            title,
            content,
            image: None,
        }),
        (Some(title), Some(content), Some(Some(image))) => errors.into_result(|| PostChanges {
            title,
            content,
            image: Some(image),
        }),
        _ => Err(AppError::Validation(errors)),
    }
}

fn check_text(
    value: Option<String>,
    field: &str,
    min_chars: usize,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let value = value.as_deref().map(str::trim).unwrap_or_default();

    if value.is_empty() {
        errors.add(field, format!("The {} field is required.", field));
        return None;
    }

    if value.chars().count() < min_chars {
        errors.add(
            field,
            format!("The {} must be at least {} characters.", field, min_chars),
        );
        return None;
    }

    Some(value.to_string())
}

fn check_image(upload: ImageUpload, errors: &mut ValidationErrors) -> Option<ValidatedImage> {
    if upload.bytes.is_empty() {
        errors.add("image", "The image field is required.");
        return None;
    }

    if upload.bytes.len() > MAX_IMAGE_BYTES {
        errors.add(
            "image",
            format!(
                "The image may not be greater than {} kilobytes.",
                MAX_IMAGE_BYTES / 1024
            ),
        );
        return None;
    }

    let kind = match image::guess_format(&upload.bytes) {
        Ok(ImageFormat::Jpeg) => ImageKind::Jpeg,
        Ok(ImageFormat::Png) => ImageKind::Png,
        Ok(other) => {
            tracing::debug!("Rejected image format {:?} ({:?})", other, upload.filename);
            errors.add("image", "The image must be a file of type: jpeg, jpg, png.");
            return None;
        }
        Err(_) => {
            errors.add("image", "The image must be an image.");
            return None;
        }
    };

    // Header only, the pixel buffer is not allocated yet
    let (width, height) =
        match ImageReader::with_format(Cursor::new(upload.bytes.as_slice()), kind.format())
            .into_dimensions()
        {
            Ok(dimensions) => dimensions,
            Err(e) => {
                tracing::debug!("Image header unreadable ({:?}): {}", upload.filename, e);
                errors.add("image", "The image must be an image.");
                return None;
            }
        };

    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        tracing::debug!("Rejected {}x{} image ({:?})", width, height, upload.filename);
        errors.add(
            "image",
            format!(
                "The image dimensions may not exceed {0}x{0} pixels.",
                MAX_IMAGE_DIMENSION
            ),
        );
        return None;
    }

    let mut reader = ImageReader::with_format(Cursor::new(upload.bytes.as_slice()), kind.format());
    reader.limits(decode_limits());
    if let Err(e) = reader.decode() {
        tracing::debug!("Image failed to decode ({:?}): {}", upload.filename, e);
        errors.add("image", "The image must be an image.");
        return None;
    }

    Some(ValidatedImage {
        bytes: upload.bytes,
        kind,
    })
}

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_IMAGE_DECODE_BYTES);
    limits
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    /// Encode a small solid image in the given format
    pub fn encode(format: ImageFormat, shade: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([shade, 0, 0])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    pub fn png(shade: u8) -> Vec<u8> {
        encode(ImageFormat::Png, shade)
    }

    pub fn jpeg(shade: u8) -> Vec<u8> {
        encode(ImageFormat::Jpeg, shade)
    }
}

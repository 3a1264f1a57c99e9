//! Image references and their wire tokens.
//!
//! Decoding dispatches on a fixed prefix grammar, in this order:
//!
//! ```text
//! image:<width>;<height>;<format>;<base64>   in-memory raster (gray8, gray16, rgb)
//! data:<mime>;base64;<base64>                encoded file (image/jpeg, image/png)
//! file://<path>                              local file path
//! <scheme>://<rest>                          any other URL
//! ```
//!
//! Anything else is a decode error. Pixel payloads are opaque bytes here; only
//! their size is checked against the declared dimensions.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraxError};

/// Prefix of in-memory raster tokens.
pub const MEMORY_PREFIX: &str = "image:";
/// Prefix of encoded buffer tokens.
pub const BUFFER_PREFIX: &str = "data:";
/// Prefix of file path tokens.
pub const FILE_PREFIX: &str = "file://";

/// Image variants, used for capability sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Path,
    Url,
    Memory,
    Buffer,
}

impl ImageKind {
    /// All image kinds.
    pub const ALL: [ImageKind; 4] = [
        ImageKind::Path,
        ImageKind::Url,
        ImageKind::Memory,
        ImageKind::Buffer,
    ];

    /// Name used in capability lists.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Path => "path",
            ImageKind::Url => "url",
            ImageKind::Memory => "memory",
            ImageKind::Buffer => "buffer",
        }
    }

    /// Look up a kind by its capability name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image planes a frame may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Color,
    Depth,
    Ir,
}

impl Channel {
    /// All channels, in wire order.
    pub const ALL: [Channel; 3] = [Channel::Color, Channel::Depth, Channel::Ir];

    /// Name used in capability lists.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Color => "color",
            Channel::Depth => "depth",
            Channel::Ir => "ir",
        }
    }

    /// Look up a channel by its capability name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.as_str() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw pixel layouts of in-memory images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit single channel.
    Gray8,
    /// 16-bit single channel, native byte order.
    Gray16,
    /// 8-bit interleaved RGB.
    Rgb,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Gray16 => 2,
            PixelFormat::Rgb => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Gray16 => "gray16",
            PixelFormat::Rgb => "rgb",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [PixelFormat::Gray8, PixelFormat::Gray16, PixelFormat::Rgb]
            .into_iter()
            .find(|format| format.as_str() == name)
    }
}

/// Compressed file formats of encoded buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedFormat {
    Jpeg,
    Png,
}

impl EncodedFormat {
    /// MIME type used in the `data:` token.
    pub fn mime(&self) -> &'static str {
        match self {
            EncodedFormat::Jpeg => "image/jpeg",
            EncodedFormat::Png => "image/png",
        }
    }

    /// Look up a format by MIME type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" => Some(EncodedFormat::Jpeg),
            "image/png" => Some(EncodedFormat::Png),
            _ => None,
        }
    }

    /// Detect the format from the file signature.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

        if data.starts_with(PNG_SIGNATURE) {
            Some(EncodedFormat::Png)
        } else if data.starts_with(JPEG_SIGNATURE) {
            Some(EncodedFormat::Jpeg)
        } else {
            None
        }
    }
}

/// Raw raster held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl MemoryImage {
    /// Create a raster image.
    ///
    /// # Errors
    ///
    /// Returns `EncodingFailure` if `data` does not hold exactly
    /// `width * height * bytes_per_pixel` bytes.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(TraxError::encoding(format!(
                "{}x{} {} image needs {} bytes, got {}",
                width,
                height,
                format.as_str(),
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Compressed image file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub format: EncodedFormat,
    pub data: Vec<u8>,
}

impl EncodedImage {
    pub fn new(format: EncodedFormat, data: Vec<u8>) -> Self {
        Self { format, data }
    }

    /// Wrap file contents, detecting the format from its signature.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedValue` if the signature is neither JPEG nor PNG.
    pub fn detect(data: Vec<u8>) -> Result<Self> {
        let format = EncodedFormat::sniff(&data)
            .ok_or_else(|| TraxError::unsupported("unrecognized image file signature"))?;
        Ok(Self { format, data })
    }
}

/// Reference to one image plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    /// Local file path.
    FilePath(String),
    /// Remote or custom-scheme URL.
    Url(String),
    /// Raw raster.
    Memory(MemoryImage),
    /// Compressed file contents.
    Encoded(EncodedImage),
}

impl Image {
    /// Create a file path reference.
    pub fn path(path: impl Into<String>) -> Self {
        Image::FilePath(path.into())
    }

    /// Create a URL reference; `file://` URLs become file paths.
    pub fn url(url: impl Into<String>) -> Self {
        let url = url.into();
        match url.strip_prefix(FILE_PREFIX) {
            Some(path) => Image::FilePath(path.to_string()),
            None => Image::Url(url),
        }
    }

    /// Get the variant of this image.
    pub fn kind(&self) -> ImageKind {
        match self {
            Image::FilePath(_) => ImageKind::Path,
            Image::Url(_) => ImageKind::Url,
            Image::Memory(_) => ImageKind::Memory,
            Image::Encoded(_) => ImageKind::Buffer,
        }
    }

    /// Encode as a wire token.
    ///
    /// # Errors
    ///
    /// Returns `EncodingFailure` for an empty path or a URL that would not
    /// decode back as a URL.
    pub fn encode(&self) -> Result<String> {
        match self {
            Image::FilePath(path) => {
                if path.is_empty() {
                    return Err(TraxError::encoding("empty image path"));
                }
                Ok(format!("{}{}", FILE_PREFIX, path))
            }
            Image::Url(url) => {
                if url.starts_with(FILE_PREFIX) || !has_url_scheme(url) {
                    return Err(TraxError::encoding(format!(
                        "'{}' is not a non-file URL",
                        url
                    )));
                }
                Ok(url.clone())
            }
            Image::Memory(image) => Ok(format!(
                "{}{};{};{};{}",
                MEMORY_PREFIX,
                image.width,
                image.height,
                image.format.as_str(),
                STANDARD.encode(&image.data)
            )),
            Image::Encoded(image) => Ok(format!(
                "{}{};base64;{}",
                BUFFER_PREFIX,
                image.format.mime(),
                STANDARD.encode(&image.data)
            )),
        }
    }

    /// Decode a wire token.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` when the token matches none of the forms
    /// or its payload is inconsistent, and `UnsupportedValue` for unknown
    /// pixel or file formats.
    pub fn decode(token: &str) -> Result<Image> {
        if let Some(body) = token.strip_prefix(MEMORY_PREFIX) {
            return decode_memory(body);
        }
        if let Some(body) = token.strip_prefix(BUFFER_PREFIX) {
            return decode_buffer(body);
        }
        if let Some(path) = token.strip_prefix(FILE_PREFIX) {
            if path.is_empty() {
                return Err(TraxError::malformed("empty file:// image path"));
            }
            return Ok(Image::FilePath(path.to_string()));
        }
        if has_url_scheme(token) {
            return Ok(Image::Url(token.to_string()));
        }
        Err(TraxError::malformed(format!(
            "unrecognized image reference '{}'",
            truncate(token)
        )))
    }
}

fn decode_memory(body: &str) -> Result<Image> {
    let mut fields = body.splitn(4, ';');
    let (Some(width), Some(height), Some(format), Some(payload)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(TraxError::malformed(
            "memory image needs width;height;format;data",
        ));
    };

    let width: u32 = width
        .parse()
        .map_err(|_| TraxError::malformed(format!("invalid image width '{}'", width)))?;
    let height: u32 = height
        .parse()
        .map_err(|_| TraxError::malformed(format!("invalid image height '{}'", height)))?;
    let format = PixelFormat::from_name(format)
        .ok_or_else(|| TraxError::unsupported(format!("unknown pixel format '{}'", format)))?;
    let data = decode_base64(payload)?;

    MemoryImage::new(width, height, format, data)
        .map(Image::Memory)
        .map_err(|e| TraxError::malformed(e.to_string()))
}

fn decode_buffer(body: &str) -> Result<Image> {
    let (mime, rest) = body
        .split_once(';')
        .ok_or_else(|| TraxError::malformed("encoded image is missing its format"))?;
    let payload = rest
        .strip_prefix("base64;")
        .or_else(|| rest.strip_prefix("base64,"))
        .ok_or_else(|| TraxError::malformed("encoded image is not base64"))?;

    let format = EncodedFormat::from_mime(mime)
        .ok_or_else(|| TraxError::unsupported(format!("unknown image format '{}'", mime)))?;
    Ok(Image::Encoded(EncodedImage::new(
        format,
        decode_base64(payload)?,
    )))
}

fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(payload)
        .map_err(|e| TraxError::malformed(format!("invalid base64 image data: {}", e)))
}

/// `scheme://` with scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ).
fn has_url_scheme(token: &str) -> bool {
    let Some((scheme, rest)) = token.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    !rest.is_empty()
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn truncate(token: &str) -> &str {
    match token.char_indices().nth(48) {
        Some((index, _)) => &token[..index],
        None => token,
    }
}

/// Images for one request, keyed by channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageList {
    images: BTreeMap<Channel, Image>,
}

impl ImageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the image of a channel, replacing any previous one.
    pub fn set(&mut self, channel: Channel, image: Image) {
        self.images.insert(channel, image);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, channel: Channel, image: Image) -> Self {
        self.set(channel, image);
        self
    }

    #[inline]
    pub fn get(&self, channel: Channel) -> Option<&Image> {
        self.images.get(&channel)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Iterate in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, &Image)> {
        self.images.iter().map(|(channel, image)| (*channel, image))
    }
}

impl From<Image> for ImageList {
    /// A single color image.
    fn from(image: Image) -> Self {
        ImageList::new().with(Channel::Color, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_round_trip() {
        let image = Image::path("/data/seq 1/00000001.jpg");
        let token = image.encode().unwrap();
        assert_eq!(token, "file:///data/seq 1/00000001.jpg");
        assert_eq!(Image::decode(&token).unwrap(), image);
    }

    #[test]
    fn test_url_round_trip() {
        let image = Image::url("http://example.org/frame.png?id=3");
        let token = image.encode().unwrap();
        assert_eq!(token, "http://example.org/frame.png?id=3");
        assert_eq!(Image::decode(&token).unwrap(), image);
        assert_eq!(image.kind(), ImageKind::Url);
    }

    #[test]
    fn test_file_url_becomes_path() {
        assert_eq!(Image::url("file:///tmp/a.png"), Image::path("/tmp/a.png"));
        assert!(Image::Url("file:///tmp/a.png".into()).encode().is_err());
    }

    #[test]
    fn test_memory_image() {
        let image = Image::Memory(
            MemoryImage::new(2, 1, PixelFormat::Rgb, vec![1, 2, 3, 4, 5, 6]).unwrap(),
        );
        let token = image.encode().unwrap();
        assert_eq!(token, "image:2;1;rgb;AQIDBAUG");
        assert_eq!(Image::decode(&token).unwrap(), image);
    }

    #[test]
    fn test_memory_image_size_mismatch() {
        let err = MemoryImage::new(2, 2, PixelFormat::Gray16, vec![0; 4]).unwrap_err();
        assert!(matches!(err, TraxError::EncodingFailure(_)));

        assert!(Image::decode("image:2;2;gray8;AAA=").is_err());
    }

    #[test]
    fn test_memory_image_unknown_format() {
        let err = Image::decode("image:1;1;bgra;AAAAAA==").unwrap_err();
        assert!(matches!(err, TraxError::UnsupportedValue(_)));
    }

    #[test]
    fn test_encoded_buffer() {
        let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        let image = Image::Encoded(EncodedImage::detect(png).unwrap());
        assert_eq!(image.kind(), ImageKind::Buffer);

        let token = image.encode().unwrap();
        assert!(token.starts_with("data:image/png;base64;"));
        assert!(!token.contains(','));
        assert_eq!(Image::decode(&token).unwrap(), image);
    }

    #[test]
    fn test_encoded_buffer_data_url_separator() {
        let image = Image::decode("data:image/jpeg;base64,/9j/").unwrap();
        assert_eq!(
            image,
            Image::Encoded(EncodedImage::new(EncodedFormat::Jpeg, vec![0xFF, 0xD8, 0xFF]))
        );
    }

    #[test]
    fn test_sniff_rejects_unknown() {
        assert!(EncodedImage::detect(b"GIF89a".to_vec()).is_err());
    }

    #[test]
    fn test_invalid_base64() {
        let err = Image::decode("data:image/png;base64,@@@").unwrap_err();
        assert!(matches!(err, TraxError::MalformedMessage(_)));
    }

    #[test]
    fn test_unrecognized_token_is_an_error() {
        for token in ["/tmp/a.png", "frame.jpg", "file://", "1abc://x", "http://"] {
            assert!(Image::decode(token).is_err(), "token {:?}", token);
        }
    }

    #[test]
    fn test_image_list() {
        let images = ImageList::from(Image::path("/a.png"))
            .with(Channel::Ir, Image::path("/b.png"))
            .with(Channel::Depth, Image::path("/c.png"));

        let channels: Vec<Channel> = images.iter().map(|(channel, _)| channel).collect();
        assert_eq!(channels, vec![Channel::Color, Channel::Depth, Channel::Ir]);
        assert_eq!(images.get(Channel::Ir), Some(&Image::path("/b.png")));
    }
}

//! Tracker metadata exchanged in the `hello` handshake.
//!
//! The server advertises what it accepts as `trax.*` properties on `hello`;
//! any other key is custom tracker metadata. Absent keys take the defaults of
//! the oldest protocol revision, so old trackers keep working.
//!
//! # Example
//!
//! ```
//! use trax_protocol::codec::{ImageKind, RegionKind};
//! use trax_protocol::session::{ImageFormats, Metadata, RegionFormats};
//!
//! let metadata = Metadata::new(
//!     RegionFormats::of(&[RegionKind::Rectangle]),
//!     ImageFormats::of(&[ImageKind::Path]),
//! )
//! .with_name("dummy");
//!
//! let properties = metadata.to_properties().unwrap();
//! assert_eq!(properties.get("trax.region"), Some("rectangle"));
//! assert_eq!(Metadata::from_properties(&properties).unwrap(), metadata);
//! ```

use serde::{Deserialize, Serialize};

use crate::codec::{Channel, ImageKind, Properties, RegionKind};
use crate::error::{Result, TraxError};

use super::capabilities::{Capability, CapabilitySet, Channels, ImageFormats, RegionFormats};

/// Protocol revision written by this implementation.
pub const PROTOCOL_VERSION: u32 = 3;

/// Revision assumed when a peer does not state one.
pub const LEGACY_VERSION: u32 = 1;

/// Namespace reserved for protocol keys.
pub const RESERVED_PREFIX: &str = "trax.";

pub const VERSION_KEY: &str = "trax.version";
pub const REGION_KEY: &str = "trax.region";
pub const IMAGE_KEY: &str = "trax.image";
pub const CHANNELS_KEY: &str = "trax.channels";
pub const NAME_KEY: &str = "trax.name";
pub const DESCRIPTION_KEY: &str = "trax.description";
pub const FAMILY_KEY: &str = "trax.family";
pub const MULTI_OBJECT_KEY: &str = "trax.multiobject";

/// Capabilities and identity of a tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Protocol revision.
    pub version: u32,
    /// Region kinds accepted in requests.
    pub region_formats: RegionFormats,
    /// Image kinds accepted in requests.
    pub image_formats: ImageFormats,
    /// Image channels expected in every request.
    pub channels: Channels,
    pub name: String,
    pub description: String,
    pub family: String,
    /// Whether one message may carry several objects.
    pub multi_object: bool,
    custom: Properties,
}

impl Metadata {
    /// Create metadata for the current protocol revision with a color channel.
    pub fn new(region_formats: RegionFormats, image_formats: ImageFormats) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            region_formats,
            image_formats,
            channels: Channels::of(&[Channel::Color]),
            name: String::new(),
            description: String::new(),
            family: String::new(),
            multi_object: false,
            custom: Properties::new(),
        }
    }

    pub fn with_channels(mut self, channels: Channels) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }

    pub fn with_multi_object(mut self, multi_object: bool) -> Self {
        self.multi_object = multi_object;
        self
    }

    /// Add a custom metadata entry.
    ///
    /// # Errors
    ///
    /// Returns `EncodingFailure` for invalid keys or keys in the reserved
    /// `trax.` namespace.
    pub fn with_custom(mut self, key: &str, value: impl ToString) -> Result<Self> {
        if key.starts_with(RESERVED_PREFIX) {
            return Err(TraxError::encoding(format!(
                "custom metadata key '{}' uses the reserved trax. namespace",
                key
            )));
        }
        self.custom.set(key, value)?;
        Ok(self)
    }

    /// Custom (non-protocol) metadata.
    #[inline]
    pub fn custom(&self) -> &Properties {
        &self.custom
    }

    /// Whether the tracker accepts several objects per message.
    #[inline]
    pub fn supports_multi_object(&self) -> bool {
        self.multi_object
    }

    /// Encode as `hello` properties.
    ///
    /// # Errors
    ///
    /// Returns `EncodingFailure` if a capability set is empty.
    pub fn to_properties(&self) -> Result<Properties> {
        require_non_empty(&self.region_formats, "region format")?;
        require_non_empty(&self.image_formats, "image format")?;
        require_non_empty(&self.channels, "channel")?;

        let mut properties = self.custom.clone();
        properties.set(VERSION_KEY, self.version)?;
        properties.set(REGION_KEY, self.region_formats.to_wire())?;
        properties.set(IMAGE_KEY, self.image_formats.to_wire())?;
        properties.set(CHANNELS_KEY, self.channels.to_wire())?;
        properties.set(NAME_KEY, &self.name)?;
        properties.set(DESCRIPTION_KEY, &self.description)?;
        properties.set(FAMILY_KEY, &self.family)?;
        properties.set(MULTI_OBJECT_KEY, self.multi_object)?;
        Ok(properties)
    }

    /// Decode from `hello` properties.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` for unparsable values and `UnsupportedValue`
    /// when an advertised list contains nothing this implementation knows.
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut metadata = Metadata {
            version: LEGACY_VERSION,
            ..Metadata::default()
        };

        if let Some(version) = properties.get(VERSION_KEY) {
            metadata.version = version.trim().parse().map_err(|_| {
                TraxError::malformed(format!("invalid protocol version '{}'", version))
            })?;
        }
        if let Some(list) = properties.get(REGION_KEY) {
            metadata.region_formats = parse_list(REGION_KEY, list)?;
        }
        if let Some(list) = properties.get(IMAGE_KEY) {
            metadata.image_formats = parse_list(IMAGE_KEY, list)?;
        }
        if let Some(list) = properties.get(CHANNELS_KEY) {
            metadata.channels = parse_list(CHANNELS_KEY, list)?;
        }
        if let Some(flag) = properties.get(MULTI_OBJECT_KEY) {
            metadata.multi_object = properties.get_bool(MULTI_OBJECT_KEY).ok_or_else(|| {
                TraxError::malformed(format!("invalid multi-object flag '{}'", flag))
            })?;
        }

        metadata.name = properties.get(NAME_KEY).unwrap_or_default().to_string();
        metadata.description = properties
            .get(DESCRIPTION_KEY)
            .unwrap_or_default()
            .to_string();
        metadata.family = properties.get(FAMILY_KEY).unwrap_or_default().to_string();

        for (key, value) in properties.iter() {
            if !key.starts_with(RESERVED_PREFIX) {
                metadata.custom.set(key, value)?;
            }
        }

        Ok(metadata)
    }
}

impl Default for Metadata {
    /// Rectangle regions, path images and a color channel.
    fn default() -> Self {
        Metadata::new(
            RegionFormats::of(&[RegionKind::Rectangle]),
            ImageFormats::of(&[ImageKind::Path]),
        )
    }
}

fn require_non_empty<T: Capability>(set: &CapabilitySet<T>, what: &str) -> Result<()> {
    if set.is_empty() {
        return Err(TraxError::encoding(format!(
            "metadata must list at least one {}",
            what
        )));
    }
    Ok(())
}

fn parse_list<T: Capability>(key: &str, list: &str) -> Result<CapabilitySet<T>> {
    let (set, unknown) = CapabilitySet::<T>::from_wire(list);
    if !unknown.is_empty() {
        tracing::warn!("Ignoring unknown {} entries: {}", key, unknown.join(", "));
    }
    if set.is_empty() {
        return Err(TraxError::unsupported(format!(
            "{} '{}' names nothing supported",
            key, list
        )));
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata::new(
            RegionFormats::of(&[RegionKind::Rectangle, RegionKind::Polygon]),
            ImageFormats::of(&[ImageKind::Path, ImageKind::Memory]),
        )
        .with_channels(Channels::of(&[Channel::Color, Channel::Depth]))
        .with_name("NCC")
        .with_description("Normalized cross correlation tracker")
        .with_family("correlation")
        .with_multi_object(true)
        .with_custom("ncc.window", 32)
        .unwrap()
    }

    #[test]
    fn test_properties_layout() {
        let properties = sample().to_properties().unwrap();

        assert_eq!(properties.get(VERSION_KEY), Some("3"));
        assert_eq!(properties.get(REGION_KEY), Some("rectangle;polygon"));
        assert_eq!(properties.get(IMAGE_KEY), Some("path;memory"));
        assert_eq!(properties.get(CHANNELS_KEY), Some("color;depth"));
        assert_eq!(properties.get(NAME_KEY), Some("NCC"));
        assert_eq!(properties.get(MULTI_OBJECT_KEY), Some("true"));
        assert_eq!(properties.get("ncc.window"), Some("32"));
    }

    #[test]
    fn test_round_trip() {
        let metadata = sample();
        let parsed = Metadata::from_properties(&metadata.to_properties().unwrap()).unwrap();
        assert_eq!(parsed, metadata);
        assert!(parsed.supports_multi_object());
        assert_eq!(parsed.custom().get_int("ncc.window"), Some(32));
    }

    #[test]
    fn test_legacy_defaults() {
        let metadata = Metadata::from_properties(&Properties::new()).unwrap();

        assert_eq!(metadata.version, LEGACY_VERSION);
        assert_eq!(metadata.region_formats, RegionFormats::of(&[RegionKind::Rectangle]));
        assert_eq!(metadata.image_formats, ImageFormats::of(&[ImageKind::Path]));
        assert_eq!(metadata.channels, Channels::of(&[Channel::Color]));
        assert!(!metadata.supports_multi_object());
        assert!(metadata.name.is_empty());
    }

    #[test]
    fn test_comma_lists_and_unknown_names() {
        let mut properties = Properties::new();
        properties.set(REGION_KEY, "polygon,hexagon").unwrap();
        properties.set(IMAGE_KEY, "url").unwrap();

        let metadata = Metadata::from_properties(&properties).unwrap();
        assert_eq!(metadata.region_formats, RegionFormats::of(&[RegionKind::Polygon]));
        assert_eq!(metadata.image_formats, ImageFormats::of(&[ImageKind::Url]));
    }

    #[test]
    fn test_nothing_supported() {
        let mut properties = Properties::new();
        properties.set(REGION_KEY, "hexagon").unwrap();
        let err = Metadata::from_properties(&properties).unwrap_err();
        assert!(matches!(err, TraxError::UnsupportedValue(_)));
    }

    #[test]
    fn test_invalid_values() {
        let mut properties = Properties::new();
        properties.set(VERSION_KEY, "two").unwrap();
        assert!(Metadata::from_properties(&properties).is_err());

        let mut properties = Properties::new();
        properties.set(MULTI_OBJECT_KEY, "maybe").unwrap();
        assert!(Metadata::from_properties(&properties).is_err());
    }

    #[test]
    fn test_reserved_custom_key() {
        let err = Metadata::default().with_custom("trax.secret", 1).unwrap_err();
        assert!(matches!(err, TraxError::EncodingFailure(_)));
    }

    #[test]
    fn test_empty_capability_set_cannot_be_advertised() {
        let metadata = Metadata::new(RegionFormats::empty(), ImageFormats::of(&[ImageKind::Path]));
        assert!(metadata.to_properties().is_err());
    }

    #[test]
    fn test_serde_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["region_formats"], serde_json::json!(["rectangle", "polygon"]));
        assert_eq!(json["multi_object"], true);
    }
}

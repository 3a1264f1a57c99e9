//! Capability sets negotiated during the handshake.
//!
//! A set is a small bitmask over one of the closed vocabularies (region kinds,
//! image kinds, channels). On the wire it is a `;`-separated list of names.
//!
//! # Example
//!
//! ```
//! use trax_protocol::codec::RegionKind;
//! use trax_protocol::session::RegionFormats;
//!
//! let formats = RegionFormats::of(&[RegionKind::Rectangle, RegionKind::Polygon]);
//! assert_eq!(formats.to_wire(), "rectangle;polygon");
//! assert!(formats.contains(RegionKind::Polygon));
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::{Channel, ImageKind, Region, RegionKind};
use crate::error::{Result, TraxError};

/// Separator used when writing lists.
pub const LIST_SEPARATOR: char = ';';

/// A member of a closed capability vocabulary.
pub trait Capability: Copy + Eq + fmt::Debug + 'static {
    /// Every member, in canonical order.
    const ALL: &'static [Self];

    /// Wire name.
    fn name(&self) -> &'static str;

    /// Look up a member by wire name.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|item| item.name() == name)
    }
}

impl Capability for RegionKind {
    const ALL: &'static [Self] = &RegionKind::ALL;

    fn name(&self) -> &'static str {
        self.as_str()
    }
}

impl Capability for ImageKind {
    const ALL: &'static [Self] = &ImageKind::ALL;

    fn name(&self) -> &'static str {
        self.as_str()
    }
}

impl Capability for Channel {
    const ALL: &'static [Self] = &Channel::ALL;

    fn name(&self) -> &'static str {
        self.as_str()
    }
}

/// Set of capabilities of one vocabulary.
pub struct CapabilitySet<T: Capability> {
    bits: u8,
    _marker: PhantomData<T>,
}

/// Region kinds a tracker accepts.
pub type RegionFormats = CapabilitySet<RegionKind>;
/// Image kinds a tracker accepts.
pub type ImageFormats = CapabilitySet<ImageKind>;
/// Image channels a tracker consumes.
pub type Channels = CapabilitySet<Channel>;

impl<T: Capability> CapabilitySet<T> {
    /// Create an empty set.
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _marker: PhantomData,
        }
    }

    /// Create a set from a slice of members.
    pub fn of(items: &[T]) -> Self {
        items.iter().copied().collect()
    }

    #[inline]
    fn bit(item: T) -> u8 {
        T::ALL
            .iter()
            .position(|candidate| *candidate == item)
            .map_or(0, |index| 1 << index)
    }

    pub fn insert(&mut self, item: T) {
        self.bits |= Self::bit(item);
    }

    pub fn remove(&mut self, item: T) {
        self.bits &= !Self::bit(item);
    }

    #[inline]
    pub fn contains(&self, item: T) -> bool {
        self.bits & Self::bit(item) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Iterate members in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        T::ALL.iter().copied().filter(move |item| self.contains(*item))
    }

    /// Encode as a `;`-separated list.
    pub fn to_wire(&self) -> String {
        let names: Vec<&str> = self.iter().map(|item| item.name()).collect();
        names.join(&LIST_SEPARATOR.to_string())
    }

    /// Decode a `;` or `,` separated list.
    ///
    /// Returns the set and the names that were not recognized.
    pub fn from_wire(list: &str) -> (Self, Vec<String>) {
        let mut set = Self::empty();
        let mut unknown = Vec::new();
        for name in list
            .split([LIST_SEPARATOR, ','])
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            match T::from_name(name) {
                Some(item) => set.insert(item),
                None => unknown.push(name.to_string()),
            }
        }
        (set, unknown)
    }
}

impl RegionFormats {
    /// Return `region` in a form this set accepts.
    ///
    /// A region of a supported kind is returned as is. Otherwise it is
    /// converted to the first supported kind among rectangle, polygon and
    /// mask that it converts to.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedValue` if no supported kind can represent it.
    pub fn accommodate(&self, region: &Region) -> Result<Region> {
        if self.contains(region.kind()) {
            return Ok(region.clone());
        }
        [RegionKind::Rectangle, RegionKind::Polygon, RegionKind::Mask]
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .find_map(|kind| region.convert(kind).ok())
            .ok_or_else(|| {
                TraxError::unsupported(format!(
                    "{} region is not among supported formats [{}]",
                    region.kind(),
                    self.to_wire()
                ))
            })
    }
}

impl<T: Capability> Clone for CapabilitySet<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Capability> Copy for CapabilitySet<T> {}

impl<T: Capability> PartialEq for CapabilitySet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T: Capability> Eq for CapabilitySet<T> {}

impl<T: Capability> Default for CapabilitySet<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Capability> FromIterator<T> for CapabilitySet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::empty();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl<T: Capability> fmt::Debug for CapabilitySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Capability> fmt::Display for CapabilitySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl<T: Capability> Serialize for CapabilitySet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|item| item.name()))
    }
}

impl<'de, T: Capability> Deserialize<'de> for CapabilitySet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names
            .iter()
            .map(|name| {
                T::from_name(name)
                    .ok_or_else(|| D::Error::custom(format!("unknown capability '{}'", name)))
            })
            .collect()
    }
}

//! Tracked objects and their placement in messages.
//!
//! Each object contributes one positional region token, in list order. Its
//! properties travel as message properties named
//! `trax.object.<index>.<key>` and are moved back onto the object on decode.

use crate::codec::{Properties, Region};
use crate::error::{Result, TraxError};

/// Property namespace of per-object properties.
pub const OBJECT_PROPERTY_PREFIX: &str = "trax.object.";

/// One tracked object: a region and its own properties.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub region: Region,
    pub properties: Properties,
}

impl TrackedObject {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            properties: Properties::new(),
        }
    }

    pub fn with_properties(region: Region, properties: Properties) -> Self {
        Self { region, properties }
    }
}

impl From<Region> for TrackedObject {
    fn from(region: Region) -> Self {
        TrackedObject::new(region)
    }
}

/// Ordered list of tracked objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectList {
    objects: Vec<TrackedObject>,
}

impl ObjectList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: impl Into<TrackedObject>) {
        self.objects.push(object.into());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&TrackedObject> {
        self.objects.get(index)
    }

    /// Region of the first object, the only one in single-object sessions.
    pub fn first_region(&self) -> Option<&Region> {
        self.objects.first().map(|object| &object.region)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackedObject> {
        self.objects.iter()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.objects.iter().map(|object| &object.region)
    }
}

impl From<Region> for ObjectList {
    fn from(region: Region) -> Self {
        std::iter::once(TrackedObject::new(region)).collect()
    }
}

impl From<Vec<TrackedObject>> for ObjectList {
    fn from(objects: Vec<TrackedObject>) -> Self {
        Self { objects }
    }
}

impl FromIterator<TrackedObject> for ObjectList {
    fn from_iter<I: IntoIterator<Item = TrackedObject>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<Region> for ObjectList {
    fn from_iter<I: IntoIterator<Item = Region>>(iter: I) -> Self {
        iter.into_iter().map(TrackedObject::new).collect()
    }
}

impl IntoIterator for ObjectList {
    type Item = TrackedObject;
    type IntoIter = std::vec::IntoIter<TrackedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}

impl<'a> IntoIterator for &'a ObjectList {
    type Item = &'a TrackedObject;
    type IntoIter = std::slice::Iter<'a, TrackedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

/// Append region tokens to `arguments` and per-object properties to `properties`.
pub(crate) fn encode_objects(
    objects: &ObjectList,
    arguments: &mut Vec<String>,
    properties: &mut Properties,
) -> Result<()> {
    for (index, object) in objects.iter().enumerate() {
        arguments.push(object.region.encode());
        for (key, value) in object.properties.iter() {
            properties.set(&format!("{}{}.{}", OBJECT_PROPERTY_PREFIX, index, key), value)?;
        }
    }
    Ok(())
}

/// Decode region tokens, moving per-object properties out of `properties`.
pub(crate) fn decode_objects(tokens: &[String], properties: &mut Properties) -> Result<ObjectList> {
    let mut objects: Vec<TrackedObject> = tokens
        .iter()
        .map(|token| Region::decode(token).map(TrackedObject::new))
        .collect::<Result<_>>()?;

    for (suffix, value) in properties.drain_prefixed(OBJECT_PROPERTY_PREFIX) {
        let (index, key) = suffix
            .split_once('.')
            .filter(|(_, key)| !key.is_empty())
            .ok_or_else(|| {
                TraxError::malformed(format!(
                    "invalid object property '{}{}'",
                    OBJECT_PROPERTY_PREFIX, suffix
                ))
            })?;
        let object = index
            .parse::<usize>()
            .ok()
            .and_then(|index| objects.get_mut(index))
            .ok_or_else(|| {
                TraxError::malformed(format!(
                    "object property '{}' refers to no object of {}",
                    suffix,
                    tokens.len()
                ))
            })?;
        object.properties.insert_decoded(key.to_string(), value);
    }

    Ok(objects.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(region: Region, label: &str) -> TrackedObject {
        let mut properties = Properties::new();
        properties.set("label", label).unwrap();
        TrackedObject::with_properties(region, properties)
    }

    #[test]
    fn test_encode_layout() {
        let objects: ObjectList = vec![
            labelled(Region::rectangle(1.0, 2.0, 3.0, 4.0), "car"),
            TrackedObject::new(Region::special(0)),
        ]
        .into();

        let mut arguments = vec!["file:///a.jpg".to_string()];
        let mut properties = Properties::new();
        properties.set("global", "yes").unwrap();
        encode_objects(&objects, &mut arguments, &mut properties).unwrap();

        assert_eq!(arguments, vec!["file:///a.jpg", "1,2,3,4", "0"]);
        assert_eq!(properties.get("trax.object.0.label"), Some("car"));
        assert_eq!(properties.len(), 2);
    }

    #[test]
    fn test_decode_moves_object_properties() {
        let objects: ObjectList = vec![
            labelled(Region::rectangle(1.0, 2.0, 3.0, 4.0), "car"),
            labelled(Region::rectangle(5.0, 6.0, 7.0, 8.0), "bike"),
        ]
        .into();

        let mut arguments = Vec::new();
        let mut properties = Properties::new();
        properties.set("trax.confidence", 0.5).unwrap();
        encode_objects(&objects, &mut arguments, &mut properties).unwrap();

        let decoded = decode_objects(&arguments, &mut properties).unwrap();
        assert_eq!(decoded, objects);
        assert_eq!(properties.len(), 1);
        assert_eq!(properties.get("trax.confidence"), Some("0.5"));
    }

    #[test]
    fn test_decode_rejects_dangling_object_property() {
        let mut properties = Properties::new();
        properties.set("trax.object.3.label", "ghost").unwrap();
        let err = decode_objects(&["1,2,3,4".to_string()], &mut properties).unwrap_err();
        assert!(matches!(err, TraxError::MalformedMessage(_)));

        let mut properties = Properties::new();
        properties.set("trax.object.zero.label", "x").unwrap();
        assert!(decode_objects(&["1".to_string()], &mut properties).is_err());
    }

    #[test]
    fn test_decode_bad_region() {
        let mut properties = Properties::new();
        assert!(decode_objects(&["1,2".to_string()], &mut properties).is_err());
    }

    #[test]
    fn test_collect_regions() {
        let objects: ObjectList = [Region::special(1), Region::special(2)].into_iter().collect();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects.first_region(), Some(&Region::special(1)));
        assert_eq!(objects.regions().count(), 2);
    }
}

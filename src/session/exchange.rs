//! Argument layout of `initialize`, `frame` and `status` messages.
//!
//! Requests carry one image token per negotiated channel, in channel order,
//! followed by one region token per object. Both roles check the values
//! against the negotiated metadata.

use crate::codec::{Image, ImageList};
use crate::error::{Result, TraxError};
use crate::protocol::MessageKind;

use super::{Metadata, ObjectList, RegionFormats, TrackedObject};

/// Append the image token of every negotiated channel.
///
/// Images for channels the tracker does not consume are left out.
pub(crate) fn encode_images(
    images: &ImageList,
    metadata: &Metadata,
    arguments: &mut Vec<String>,
) -> Result<()> {
    for channel in metadata.channels.iter() {
        let image = images.get(channel).ok_or_else(|| {
            TraxError::unsupported(format!("no image for negotiated channel '{}'", channel))
        })?;
        if !metadata.image_formats.contains(image.kind()) {
            return Err(TraxError::unsupported(format!(
                "{} image on channel '{}' is not among supported formats [{}]",
                image.kind(),
                channel,
                metadata.image_formats
            )));
        }
        arguments.push(image.encode()?);
    }

    for (channel, _) in images.iter() {
        if !metadata.channels.contains(channel) {
            tracing::debug!(%channel, "Leaving out image for unused channel");
        }
    }
    Ok(())
}

/// Split request arguments into image tokens and object tokens.
pub(crate) fn split_arguments<'a>(
    arguments: &'a [String],
    metadata: &Metadata,
) -> Result<(&'a [String], &'a [String])> {
    let count = metadata.channels.len();
    if arguments.len() < count {
        return Err(TraxError::malformed(format!(
            "expected {} image arguments, got {}",
            count,
            arguments.len()
        )));
    }
    Ok(arguments.split_at(count))
}

/// Decode image tokens received for the negotiated channels.
pub(crate) fn decode_images(tokens: &[String], metadata: &Metadata) -> Result<ImageList> {
    let mut images = ImageList::new();
    for (channel, token) in metadata.channels.iter().zip(tokens) {
        let image = Image::decode(token)?;
        if !metadata.image_formats.contains(image.kind()) {
            return Err(TraxError::unsupported(format!(
                "received {} image on channel '{}', negotiated [{}]",
                image.kind(),
                channel,
                metadata.image_formats
            )));
        }
        images.set(channel, image);
    }
    Ok(images)
}

/// Reject regions whose kind was not negotiated.
pub(crate) fn check_regions(objects: &ObjectList, formats: &RegionFormats) -> Result<()> {
    match objects.regions().find(|region| !formats.contains(region.kind())) {
        Some(region) => Err(TraxError::unsupported(format!(
            "received {} region, negotiated [{}]",
            region.kind(),
            formats
        ))),
        None => Ok(()),
    }
}

/// Convert object regions into negotiated kinds.
pub(crate) fn prepare_objects(objects: &ObjectList, formats: &RegionFormats) -> Result<ObjectList> {
    objects
        .iter()
        .map(|object| {
            Ok(TrackedObject::with_properties(
                formats.accommodate(&object.region)?,
                object.properties.clone(),
            ))
        })
        .collect::<Result<Vec<_>>>()
        .map(ObjectList::from)
}

/// Describe why `count` objects do not fit a message of `kind`.
pub(crate) fn object_count_problem(
    kind: MessageKind,
    count: usize,
    multi_object: bool,
) -> Option<String> {
    match kind {
        MessageKind::Initialize if count == 0 => {
            Some("initialize needs at least one object".to_string())
        }
        MessageKind::Initialize | MessageKind::Status if !multi_object && count != 1 => Some(
            format!("{} carries {} objects in a single-object session", kind, count),
        ),
        MessageKind::Frame if !multi_object && count != 0 => Some(format!(
            "frame carries {} objects in a single-object session",
            count
        )),
        _ => None,
    }
}

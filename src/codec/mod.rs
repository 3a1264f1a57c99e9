//! Value codec - typed values and their wire tokens.
//!
//! Stateless conversions between typed values and the textual tokens that
//! travel as message arguments:
//!
//! - [`Region`]: Special / Rectangle / Polygon / Mask, with geometry helpers
//! - [`Image`]: file path, URL, in-memory raster, encoded buffer
//! - [`Properties`]: `key=value` maps with typed accessors
//!
//! # Example
//!
//! ```
//! use trax_protocol::codec::{Image, Region};
//!
//! let region: Region = "10,10,50,50".parse().unwrap();
//! assert_eq!(region, Region::rectangle(10.0, 10.0, 50.0, 50.0));
//!
//! let image = Image::decode("file:///tmp/00000001.jpg").unwrap();
//! assert_eq!(image, Image::path("/tmp/00000001.jpg"));
//! ```

mod geometry;
mod image;
mod properties;
mod region;

pub use geometry::Bounds;
pub use image::{
    Channel, EncodedFormat, EncodedImage, Image, ImageKind, ImageList, MemoryImage, PixelFormat,
};
pub use properties::{is_valid_key, Properties, MAX_KEY_LENGTH};
pub use region::{Mask, Polygon, Rectangle, Region, RegionKind, MASK_PREFIX};

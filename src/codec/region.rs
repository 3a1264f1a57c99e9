//! Region values and their wire tokens.
//!
//! The wire form of Special, Rectangle and Polygon carries no type tag; the
//! decoder dispatches on the number of comma separated values:
//!
//! | values            | region                      |
//! |-------------------|-----------------------------|
//! | 1                 | `Special(code)`             |
//! | 4                 | `Rectangle(x, y, w, h)`     |
//! | even, 6 or more   | `Polygon` of `count/2` points |
//! | anything else     | decode error                |
//!
//! A 4-value token is therefore always a rectangle, never a 2-point polygon.
//!
//! Masks carry an explicit discriminator and are run-length encoded:
//!
//! ```text
//! m<x>,<y>,<width>,<height>[,<run>,<run>,...]
//! ```
//!
//! Runs count consecutive pixels of the row-major bitmap, alternating between
//! zeros and ones and starting with zeros (the first run may be `0`). They must
//! add up to `width * height`.
//!
//! # Example
//!
//! ```
//! use trax_protocol::codec::{Region, RegionKind};
//!
//! let region = Region::decode("1,2,3,4,5,6").unwrap();
//! assert_eq!(region.kind(), RegionKind::Polygon);
//! assert_eq!(region.encode(), "1,2,3,4,5,6");
//! ```

use std::fmt::{self, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraxError};

/// Discriminator that starts a mask token.
pub const MASK_PREFIX: char = 'm';

/// Upper bound on mask size, in pixels.
pub const MAX_MASK_PIXELS: u64 = 1 << 28;

/// Region variants, used for capability sets and conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Special,
    Rectangle,
    Polygon,
    Mask,
}

impl RegionKind {
    /// All region kinds.
    pub const ALL: [RegionKind; 4] = [
        RegionKind::Special,
        RegionKind::Rectangle,
        RegionKind::Polygon,
        RegionKind::Mask,
    ];

    /// Name used in capability lists.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKind::Special => "special",
            RegionKind::Rectangle => "rectangle",
            RegionKind::Polygon => "polygon",
            RegionKind::Mask => "mask",
        }
    }

    /// Look up a kind by its capability name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box with top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    /// Create a rectangle.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Corner points: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [(f32, f32); 4] {
        let right = self.x + self.width;
        let bottom = self.y + self.height;
        [
            (self.x, self.y),
            (right, self.y),
            (right, bottom),
            (self.x, bottom),
        ]
    }
}

/// Closed polygon with at least three points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f32, f32)>", into = "Vec<(f32, f32)>")]
pub struct Polygon {
    points: Vec<(f32, f32)>,
}

impl Polygon {
    /// Minimum number of points.
    pub const MIN_POINTS: usize = 3;

    /// Create a polygon.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedValue` if fewer than three points are given.
    pub fn new(points: Vec<(f32, f32)>) -> Result<Self> {
        if points.len() < Self::MIN_POINTS {
            return Err(TraxError::unsupported(format!(
                "polygon needs at least {} points, got {}",
                Self::MIN_POINTS,
                points.len()
            )));
        }
        Ok(Self { points })
    }

    /// Get the points in order.
    #[inline]
    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a polygon has at least three points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl TryFrom<Vec<(f32, f32)>> for Polygon {
    type Error = TraxError;

    fn try_from(points: Vec<(f32, f32)>) -> Result<Self> {
        Polygon::new(points)
    }
}

impl From<Polygon> for Vec<(f32, f32)> {
    fn from(polygon: Polygon) -> Self {
        polygon.points
    }
}

/// Binary occupancy mask anchored at an offset in image coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MaskRepr", into = "MaskRepr")]
pub struct Mask {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct MaskRepr {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// Create a mask from a row-major bitmap. Non-zero bytes count as set.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedValue` if the mask exceeds [`MAX_MASK_PIXELS`] or
    /// `data.len() != width * height`.
    pub fn new(x: i32, y: i32, width: u32, height: u32, mut data: Vec<u8>) -> Result<Self> {
        check_mask_size(width, height)?;
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(TraxError::unsupported(format!(
                "mask bitmap has {} bytes, expected {}x{} = {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        for value in data.iter_mut() {
            *value = u8::from(*value != 0);
        }
        Ok(Self {
            x,
            y,
            width,
            height,
            data,
        })
    }

    /// Horizontal offset.
    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Vertical offset.
    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    /// Bitmap width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Bitmap height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major bitmap of 0/1 bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Check a pixel in mask-local coordinates. Out of range is unset.
    pub fn get(&self, column: u32, row: u32) -> bool {
        if column >= self.width || row >= self.height {
            return false;
        }
        self.data[(row as usize) * (self.width as usize) + column as usize] != 0
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&value| value != 0).count()
    }
}

impl TryFrom<MaskRepr> for Mask {
    type Error = TraxError;

    fn try_from(repr: MaskRepr) -> Result<Self> {
        Mask::new(repr.x, repr.y, repr.width, repr.height, repr.data)
    }
}

impl From<Mask> for MaskRepr {
    fn from(mask: Mask) -> Self {
        MaskRepr {
            x: mask.x,
            y: mask.y,
            width: mask.width,
            height: mask.height,
            data: mask.data,
        }
    }
}

/// Localization of a tracked object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Region {
    /// Status code without geometry.
    Special(i32),
    Rectangle(Rectangle),
    Polygon(Polygon),
    Mask(Mask),
}

impl Region {
    /// Create a special region.
    pub fn special(code: i32) -> Self {
        Region::Special(code)
    }

    /// Create a rectangle region.
    pub fn rectangle(x: f32, y: f32, width: f32, height: f32) -> Self {
        Region::Rectangle(Rectangle::new(x, y, width, height))
    }

    /// Create a polygon region.
    pub fn polygon(points: Vec<(f32, f32)>) -> Result<Self> {
        Polygon::new(points).map(Region::Polygon)
    }

    /// Get the variant of this region.
    pub fn kind(&self) -> RegionKind {
        match self {
            Region::Special(_) => RegionKind::Special,
            Region::Rectangle(_) => RegionKind::Rectangle,
            Region::Polygon(_) => RegionKind::Polygon,
            Region::Mask(_) => RegionKind::Mask,
        }
    }

    /// Encode as a wire token.
    pub fn encode(&self) -> String {
        let mut token = String::new();
        match self {
            Region::Special(code) => {
                let _ = write!(token, "{}", code);
            }
            Region::Rectangle(rect) => {
                let _ = write!(
                    token,
                    "{},{},{},{}",
                    rect.x, rect.y, rect.width, rect.height
                );
            }
            Region::Polygon(polygon) => {
                for (index, (x, y)) in polygon.points().iter().enumerate() {
                    if index > 0 {
                        token.push(',');
                    }
                    let _ = write!(token, "{},{}", x, y);
                }
            }
            Region::Mask(mask) => encode_mask(mask, &mut token),
        }
        token
    }

    /// Decode a wire token.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` for non-numeric values, an arity outside the
    /// table above, or an inconsistent mask.
    pub fn decode(token: &str) -> Result<Region> {
        let token = token.trim();
        if let Some(body) = token.strip_prefix(MASK_PREFIX) {
            return decode_mask(body);
        }

        let values = token
            .split(',')
            .map(|value| {
                value.trim().parse::<f32>().map_err(|_| {
                    TraxError::malformed(format!("invalid number '{}' in region", value))
                })
            })
            .collect::<Result<Vec<f32>>>()?;

        match values.len() {
            1 => decode_special(token, values[0]),
            4 => {
                // legacy trackers report a status code as `nan,nan,nan,-code`
                if values[0].is_nan() && !values[3].is_nan() {
                    return (values[3] as i32)
                        .checked_neg()
                        .map(Region::Special)
                        .ok_or_else(|| {
                            TraxError::malformed(format!(
                                "legacy status code '{}' is out of range",
                                values[3]
                            ))
                        });
                }
                Ok(Region::rectangle(values[0], values[1], values[2], values[3]))
            }
            n if n >= 6 && n % 2 == 0 => {
                let points = values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect();
                Region::polygon(points)
            }
            n => Err(TraxError::malformed(format!(
                "region token has {} values",
                n
            ))),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Region {
    type Err = TraxError;

    fn from_str(token: &str) -> Result<Self> {
        Region::decode(token)
    }
}

impl From<Rectangle> for Region {
    fn from(rect: Rectangle) -> Self {
        Region::Rectangle(rect)
    }
}

impl From<Polygon> for Region {
    fn from(polygon: Polygon) -> Self {
        Region::Polygon(polygon)
    }
}

impl From<Mask> for Region {
    fn from(mask: Mask) -> Self {
        Region::Mask(mask)
    }
}

fn decode_special(token: &str, value: f32) -> Result<Region> {
    if let Ok(code) = token.parse::<i32>() {
        return Ok(Region::Special(code));
    }
    if !value.is_finite() {
        return Err(TraxError::malformed(format!(
            "special region code '{}' is not finite",
            token
        )));
    }
    Ok(Region::Special(value as i32))
}

fn encode_mask(mask: &Mask, token: &mut String) {
    let _ = write!(
        token,
        "{}{},{},{},{}",
        MASK_PREFIX, mask.x, mask.y, mask.width, mask.height
    );

    let mut current = 0u8;
    let mut run = 0usize;
    for &value in &mask.data {
        if value == current {
            run += 1;
        } else {
            let _ = write!(token, ",{}", run);
            current = value;
            run = 1;
        }
    }
    if !mask.data.is_empty() {
        let _ = write!(token, ",{}", run);
    }
}

fn decode_mask(body: &str) -> Result<Region> {
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(TraxError::malformed(
            "mask token needs x, y, width and height",
        ));
    }

    let x: i32 = parse_mask_field(fields[0], "x")?;
    let y: i32 = parse_mask_field(fields[1], "y")?;
    let width: u32 = parse_mask_field(fields[2], "width")?;
    let height: u32 = parse_mask_field(fields[3], "height")?;

    let total = u64::from(width) * u64::from(height);
    if total > MAX_MASK_PIXELS {
        return Err(TraxError::malformed(format!(
            "mask of {}x{} pixels is too large",
            width, height
        )));
    }

    let mut data = Vec::with_capacity(total as usize);
    let mut value = 0u8;
    for field in &fields[4..] {
        let run: u64 = parse_mask_field(field, "run")?;
        if data.len() as u64 + run > total {
            return Err(TraxError::malformed("mask runs exceed mask size"));
        }
        data.resize(data.len() + run as usize, value);
        value ^= 1;
    }

    if data.len() as u64 != total {
        return Err(TraxError::malformed(format!(
            "mask runs cover {} pixels, expected {}",
            data.len(),
            total
        )));
    }

    Mask::new(x, y, width, height, data)
        .map(Region::Mask)
        .map_err(|e| TraxError::malformed(e.to_string()))
}

fn check_mask_size(width: u32, height: u32) -> Result<()> {
    if u64::from(width) * u64::from(height) > MAX_MASK_PIXELS {
        return Err(TraxError::unsupported(format!(
            "mask of {}x{} pixels is too large",
            width, height
        )));
    }
    Ok(())
}

fn parse_mask_field<T: FromStr>(field: &str, name: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| TraxError::malformed(format!("invalid mask {} '{}'", name, field)))
}

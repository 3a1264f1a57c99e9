//! Region geometry: bounds, point tests, conversions and overlap.
//!
//! Rasterization samples pixel centers: pixel `(i, j)` is covered by a region
//! when the point `(i + 0.5, j + 0.5)` lies inside it.

use crate::error::{Result, TraxError};

use super::region::{Mask, Polygon, Rectangle, Region, RegionKind, MAX_MASK_PIXELS};

/// Axis-aligned bounds in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Bounds {
    /// Create bounds, normalizing swapped edges.
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    /// Bounds of an image of the given size.
    pub fn image(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Smallest bounds containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Overlapping part, if any.
    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        (left < right && top < bottom).then(|| Bounds::new(left, top, right, bottom))
    }
}

impl From<Bounds> for Rectangle {
    fn from(bounds: Bounds) -> Self {
        Rectangle::new(bounds.left, bounds.top, bounds.width(), bounds.height())
    }
}

/// Integer pixel window used for rasterization.
#[derive(Debug, Clone, Copy)]
struct PixelGrid {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
}

impl PixelGrid {
    /// Smallest grid covering `bounds`, at most [`MAX_MASK_PIXELS`] in size.
    fn covering(bounds: &Bounds) -> Result<Self> {
        let left = bounds.left.floor() as i32;
        let top = bounds.top.floor() as i32;
        let right = bounds.right.ceil() as i32;
        let bottom = bounds.bottom.ceil() as i32;
        let width = (i64::from(right) - i64::from(left)).max(0) as u32;
        let height = (i64::from(bottom) - i64::from(top)).max(0) as u32;
        if u64::from(width) * u64::from(height) > MAX_MASK_PIXELS {
            return Err(TraxError::unsupported(format!(
                "{}x{} pixel grid is too large to rasterize",
                width, height
            )));
        }
        Ok(Self {
            left,
            top,
            width,
            height,
        })
    }

    fn pixels(self) -> impl Iterator<Item = (f32, f32)> {
        (0..self.height).flat_map(move |row| {
            (0..self.width).map(move |column| {
                (
                    (self.left + column as i32) as f32 + 0.5,
                    (self.top + row as i32) as f32 + 0.5,
                )
            })
        })
    }

    fn rasterize(&self, region: &Region) -> Result<Mask> {
        let data = self
            .pixels()
            .map(|(x, y)| u8::from(region.contains(x, y)))
            .collect();
        Mask::new(self.left, self.top, self.width, self.height, data)
    }
}

impl Region {
    /// Axis-aligned bounds of the region; `None` for Special.
    ///
    /// For masks this is the box around the set pixels. An empty mask has
    /// zero-sized bounds at its offset.
    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            Region::Special(_) => None,
            Region::Rectangle(rect) => Some(Bounds::new(
                rect.x,
                rect.y,
                rect.x + rect.width,
                rect.y + rect.height,
            )),
            Region::Polygon(polygon) => Some(polygon_bounds(polygon)),
            Region::Mask(mask) => Some(mask_bounds(mask)),
        }
    }

    /// Check whether a point in image coordinates lies inside the region.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        match self {
            Region::Special(_) => false,
            Region::Rectangle(_) => self
                .bounds()
                .is_some_and(|b| x >= b.left && x < b.right && y >= b.top && y < b.bottom),
            Region::Polygon(polygon) => polygon_contains(polygon.points(), x, y),
            Region::Mask(mask) => {
                let column = x.floor() as i64 - i64::from(mask.x());
                let row = y.floor() as i64 - i64::from(mask.y());
                column >= 0
                    && row >= 0
                    && column <= u32::MAX as i64
                    && row <= u32::MAX as i64
                    && mask.get(column as u32, row as u32)
            }
        }
    }

    /// Convert to another region variant, producing a new value.
    ///
    /// - Rectangle to Polygon: corners top-left, top-right, bottom-right, bottom-left
    /// - Polygon or Mask to Rectangle: bounding box
    /// - Mask to Polygon: corners of the bounding box
    /// - Rectangle or Polygon to Mask: rasterized over the bounding box
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedValue` when converting from or to Special, or when
    /// the rasterized mask would exceed [`MAX_MASK_PIXELS`].
    pub fn convert(&self, to: RegionKind) -> Result<Region> {
        if self.kind() == to {
            return Ok(self.clone());
        }

        match (self, to) {
            (Region::Special(_), _) | (_, RegionKind::Special) => Err(TraxError::unsupported(
                format!("cannot convert {} region to {}", self.kind(), to),
            )),
            (Region::Rectangle(rect), RegionKind::Polygon) => {
                Region::polygon(rect.corners().to_vec())
            }
            (_, RegionKind::Rectangle) => Ok(Region::Rectangle(self.bounds_or_unsupported()?.into())),
            (Region::Mask(_), RegionKind::Polygon) => {
                self.convert(RegionKind::Rectangle)?.convert(RegionKind::Polygon)
            }
            (_, RegionKind::Mask) => {
                PixelGrid::covering(&self.bounds_or_unsupported()?)?
                    .rasterize(self)
                    .map(Region::Mask)
            }
            (_, RegionKind::Polygon) => Err(TraxError::unsupported(format!(
                "cannot convert {} region to polygon",
                self.kind()
            ))),
        }
    }

    /// Intersection over union of two regions.
    ///
    /// When `bounds` is given (typically the image size) both regions are
    /// clipped to it first. Two regions with no area give `0.0`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedValue` if either region is Special or the compared
    /// area exceeds [`MAX_MASK_PIXELS`].
    pub fn overlap(&self, other: &Region, bounds: Option<Bounds>) -> Result<f32> {
        let frame = self.bounds_or_unsupported()?.union(&other.bounds_or_unsupported()?);
        let frame = match bounds {
            Some(limit) => match frame.intersection(&limit) {
                Some(clipped) => clipped,
                None => return Ok(0.0),
            },
            None => frame,
        };

        let mut intersection = 0u64;
        let mut union = 0u64;
        for (x, y) in PixelGrid::covering(&frame)?.pixels() {
            if let Some(limit) = bounds {
                if x < limit.left || x >= limit.right || y < limit.top || y >= limit.bottom {
                    continue;
                }
            }
            match (self.contains(x, y), other.contains(x, y)) {
                (true, true) => {
                    intersection += 1;
                    union += 1;
                }
                (true, false) | (false, true) => union += 1,
                (false, false) => {}
            }
        }

        if union == 0 {
            return Ok(0.0);
        }
        Ok(intersection as f32 / union as f32)
    }

    fn bounds_or_unsupported(&self) -> Result<Bounds> {
        self.bounds().ok_or_else(|| {
            TraxError::unsupported(format!("{} region has no geometry", self.kind()))
        })
    }
}

fn polygon_bounds(polygon: &Polygon) -> Bounds {
    let (mut left, mut top) = (f32::INFINITY, f32::INFINITY);
    let (mut right, mut bottom) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for &(x, y) in polygon.points() {
        left = left.min(x);
        top = top.min(y);
        right = right.max(x);
        bottom = bottom.max(y);
    }
    Bounds::new(left, top, right, bottom)
}

fn mask_bounds(mask: &Mask) -> Bounds {
    let mut extent: Option<(u32, u32, u32, u32)> = None;
    for row in 0..mask.height() {
        for column in 0..mask.width() {
            if !mask.get(column, row) {
                continue;
            }
            extent = Some(match extent {
                None => (column, row, column, row),
                Some((l, t, r, b)) => (l.min(column), t.min(row), r.max(column), b.max(row)),
            });
        }
    }

    let (x, y) = (mask.x() as f32, mask.y() as f32);
    match extent {
        Some((l, t, r, b)) => Bounds::new(
            x + l as f32,
            y + t as f32,
            x + r as f32 + 1.0,
            y + b as f32 + 1.0,
        ),
        None => Bounds::new(x, y, x, y),
    }
}

/// Even-odd rule point in polygon test.
fn polygon_contains(points: &[(f32, f32)], x: f32, y: f32) -> bool {
    let mut inside = false;
    let mut previous = points[points.len() - 1];
    for &current in points {
        let (xi, yi) = current;
        let (xj, yj) = previous;
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        previous = current;
    }
    inside
}

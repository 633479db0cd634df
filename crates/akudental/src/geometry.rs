use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct Point {
    pub(crate) x: f64,
    pub(crate) y: f64,
}

/// An ordered ring of points. The ring is implicitly closed; a
/// trailing point equal to the first one is dropped.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub(crate) const MIN_POINTS: usize = 3;

    /// Creates a polygon from a flat COCO coordinate list
    /// `[x0, y0, x1, y1, ...]`.
    pub(crate) fn from_flat(coords: &[f64]) -> Result<Self, String> {
        if coords.len() % 2 != 0 {
            return Err(format!(
                "odd number of polygon coordinates ({})",
                coords.len()
            ));
        }

        if let Some(value) = coords.iter().find(|v| !v.is_finite()) {
            return Err(format!("non-finite coordinate {value}"));
        }

        let mut points: Vec<Point> = coords
            .chunks_exact(2)
            .map(|xy| Point { x: xy[0], y: xy[1] })
            .collect();

        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        if points.len() < Self::MIN_POINTS {
            return Err(format!(
                "polygon needs at least {} points, got {}",
                Self::MIN_POINTS,
                points.len()
            ));
        }

        Ok(Self { points })
    }

    #[inline]
    pub(crate) fn points(&self) -> &[Point] {
        &self.points
    }
}

/// An axis-aligned bounding box in COCO notation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct BBox {
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) width: f64,
    pub(crate) height: f64,
}

impl BBox {
    pub(crate) fn from_slice(values: &[f64]) -> Result<Self, String> {
        let [x, y, width, height] = values else {
            return Err(format!(
                "bbox needs 4 values, got {}",
                values.len()
            ));
        };

        if values.iter().any(|v| !v.is_finite()) {
            return Err("bbox contains non-finite values".into());
        }

        if *width < 0.0 || *height < 0.0 {
            return Err("bbox has negative extent".into());
        }

        Ok(Self {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        })
    }

    /// Computes the tight box enclosing all given polygons. Returns
    /// `None` if there are no polygons.
    pub(crate) fn enclosing<'a, I>(polygons: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Polygon>,
    {
        let mut points =
            polygons.into_iter().flat_map(|polygon| polygon.points());
        let first = points.next()?;

        let (min_x, min_y, max_x, max_y) = points.fold(
            (first.x, first.y, first.x, first.y),
            |(min_x, min_y, max_x, max_y), p| {
                (
                    min_x.min(p.x),
                    min_y.min(p.y),
                    max_x.max(p.x),
                    max_y.max(p.y),
                )
            },
        );

        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }

    pub(crate) fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

impl Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.x, self.y, self.width, self.height
        )
    }
}

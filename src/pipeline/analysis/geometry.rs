//! Contour shapes from binarized images.
//!
//! Contour tracing is delegated to `imageproc::contours`; this module turns
//! each outer border into the measures the detectors threshold on
//! (area, bounding box, convex-hull solidity, circularity).

use std::f64::consts::PI;

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;

use super::types::BoundingBox;

/// Measured outer contour.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    /// Polygon area enclosed by the traced border (shoelace formula).
    pub area: f64,
    pub perimeter: f64,
    pub bounding_box: BoundingBox,
    pub hull_area: f64,
}

impl Shape {
    fn from_contour(contour: &Contour<i32>) -> Option<Self> {
        let points = &contour.points;
        let first = points.first()?;

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        let hull = convex_hull(points);
        Some(Self {
            area: polygon_area(points),
            perimeter: polygon_perimeter(points),
            bounding_box: BoundingBox {
                x: min_x.max(0) as u32,
                y: min_y.max(0) as u32,
                width: (max_x - min_x + 1) as u32,
                height: (max_y - min_y + 1) as u32,
            },
            hull_area: polygon_area(&hull),
        })
    }

    /// Bounding-box width over height.
    pub fn aspect_ratio(&self) -> f64 {
        self.bounding_box.aspect_ratio()
    }

    /// Contour area over convex-hull area; 0 for degenerate hulls.
    pub fn solidity(&self) -> f64 {
        if self.hull_area > 0.0 {
            self.area / self.hull_area
        } else {
            0.0
        }
    }

    /// `4πA / P²`, 1.0 for a perfect circle.
    pub fn circularity(&self) -> f64 {
        if self.perimeter > 0.0 {
            4.0 * PI * self.area / (self.perimeter * self.perimeter)
        } else {
            0.0
        }
    }
}

/// Outer borders of foreground (non-zero) regions that are not nested
/// inside another region.
pub fn external_shapes(binary: &GrayImage) -> Vec<Shape> {
    find_contours::<i32>(binary)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(Shape::from_contour)
        .collect()
}

/// Absolute shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        twice += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    (twice as f64 / 2.0).abs()
}

/// Closed perimeter length.
pub fn polygon_perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let b = &points[(i + 1) % points.len()];
            let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Convex hull via Andrew's monotone chain, counter-clockwise.
pub fn convex_hull(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut pts: Vec<Point<i32>> = points.to_vec();
    pts.sort_by(|a, b| a.x.cmp(&b.x).then(a.y.cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: &Point<i32>, a: &Point<i32>, b: &Point<i32>| -> i64 {
        (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
    };

    let mut lower: Vec<Point<i32>> = Vec::new();
    for p in &pts {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<Point<i32>> = Vec::new();
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn canvas_with_rect(w: u32, h: u32, rx: u32, ry: u32, rw: u32, rh: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let inside = x >= rx && x < rx + rw && y >= ry && y < ry + rh;
            Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn rectangle_area_and_box() {
        let img = canvas_with_rect(100, 80, 10, 20, 40, 20);
        let shapes = external_shapes(&img);
        assert_eq!(shapes.len(), 1);
        let s = &shapes[0];
        assert_eq!(s.bounding_box, BoundingBox { x: 10, y: 20, width: 40, height: 20 });
        // Border runs through pixel centers: (40-1) x (20-1)
        assert!((s.area - 741.0).abs() < 1e-9);
        assert!((s.solidity() - 1.0).abs() < 1e-9);
        assert!((s.aspect_ratio() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn nested_region_is_not_external() {
        // Ring with a filled dot inside the hole
        let img = GrayImage::from_fn(60, 60, |x, y| {
            let ring = (5..55).contains(&x) && (5..55).contains(&y)
                && !((10..50).contains(&x) && (10..50).contains(&y));
            let dot = (25..35).contains(&x) && (25..35).contains(&y);
            Luma([if ring || dot { 255 } else { 0 }])
        });
        let shapes = external_shapes(&img);
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].bounding_box.width, 50);
    }

    #[test]
    fn empty_image_has_no_shapes() {
        let img = GrayImage::new(30, 30);
        assert!(external_shapes(&img).is_empty());
    }

    #[test]
    fn hull_of_square_with_interior_point() {
        let pts = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
            Point::new(5, 5),
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!((polygon_area(&hull) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn l_shape_has_lower_solidity() {
        let pts = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 2),
            Point::new(2, 2),
            Point::new(2, 10),
            Point::new(0, 10),
        ];
        let shape_area = polygon_area(&pts);
        let hull_area = polygon_area(&convex_hull(&pts));
        assert!((shape_area - 36.0).abs() < 1e-9);
        assert!(shape_area / hull_area < 0.7);
    }

    #[test]
    fn circularity_of_square_is_pi_over_four() {
        let shape = Shape {
            area: 100.0,
            perimeter: 40.0,
            bounding_box: BoundingBox { x: 0, y: 0, width: 10, height: 10 },
            hull_area: 100.0,
        };
        assert!((shape.circularity() - PI / 4.0).abs() < 1e-9);
    }
}

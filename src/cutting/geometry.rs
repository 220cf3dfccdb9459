use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn almost_eq(&self, other: &Point) -> bool {
        (self.x - other.x).abs() < EPSILON && (self.y - other.y).abs() < EPSILON
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn length(&self) -> f64 {
        self.max_y - self.min_y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Axis aligned rectangle anchored at the origin; `width` runs along x.
    pub fn rect(width: f64, length: f64) -> Self {
        Self::new(vec![
            Point::new(0.0, 0.0),
            Point::new(width, 0.0),
            Point::new(width, length),
            Point::new(0.0, length),
        ])
    }

    /// Shoelace formula, always non-negative.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let p = self.points[i];
                let q = self.points[(i + 1) % n];
                p.x * q.y - q.x * p.y
            })
            .sum();
        twice.abs() / 2.0
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.points.first()?;
        let init = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        Some(self.points.iter().fold(init, |b, p| BoundingBox {
            min_x: b.min_x.min(p.x),
            min_y: b.min_y.min(p.y),
            max_x: b.max_x.max(p.x),
            max_y: b.max_y.max(p.y),
        }))
    }
}

/// Signed distance-like value: positive on the left of `a -> b`.
fn side(a: Point, b: Point, p: Point) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn intersect(p: Point, q: Point, sp: f64, sq: f64) -> Point {
    let t = sp / (sp - sq);
    Point::new(p.x + (q.x - p.x) * t, p.y + (q.y - p.y) * t)
}

/// Keeps the part of `polygon` where `sign * side >= 0`.
fn clip(polygon: &Polygon, a: Point, b: Point, sign: f64) -> Polygon {
    let n = polygon.points.len();
    let mut out: Vec<Point> = Vec::with_capacity(n + 2);
    for i in 0..n {
        let p = polygon.points[i];
        let q = polygon.points[(i + 1) % n];
        let sp = sign * side(a, b, p);
        let sq = sign * side(a, b, q);

        if sp >= -EPSILON {
            out.push(p);
        }
        if (sp > EPSILON && sq < -EPSILON) || (sp < -EPSILON && sq > EPSILON) {
            out.push(intersect(p, q, sp, sq));
        }
    }
    out.dedup_by(|x, y| x.almost_eq(y));
    if out.len() > 1 && out[0].almost_eq(&out[out.len() - 1]) {
        out.pop();
    }
    Polygon::new(out)
}

/// Splits a convex polygon by the infinite line through `a` and `b`.
///
/// Returns the input unchanged when the line misses it or `a == b`.
pub fn split_polygon_with_line(polygon: &Polygon, a: Point, b: Point) -> Vec<Polygon> {
    if a.almost_eq(&b) {
        return vec![polygon.clone()];
    }
    let left = clip(polygon, a, b, 1.0);
    let right = clip(polygon, a, b, -1.0);
    if left.area() <= EPSILON || right.area() <= EPSILON {
        return vec![polygon.clone()];
    }
    vec![left, right]
}

pub fn split_shapes_with_line(shapes: &[Polygon], a: Point, b: Point) -> Vec<Polygon> {
    shapes
        .iter()
        .flat_map(|shape| split_polygon_with_line(shape, a, b))
        .collect()
}

/// Applies every cut in order, starting from a `width` x `length` rectangle.
pub fn cut_rectangle(width: f64, length: f64, cuts: &[[Point; 2]]) -> Vec<Polygon> {
    cuts.iter()
        .fold(vec![Polygon::rect(width, length)], |shapes, [a, b]| {
            split_shapes_with_line(&shapes, *a, *b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_rect_area_and_bounds() {
        let r = Polygon::rect(120.0, 60.0);
        assert!(approx(r.area(), 7200.0));
        let bb = r.bounding_box().unwrap();
        assert!(approx(bb.width(), 120.0));
        assert!(approx(bb.length(), 60.0));
    }

    #[test]
    fn test_area_ignores_winding() {
        let mut r = Polygon::rect(10.0, 5.0);
        r.points.reverse();
        assert!(approx(r.area(), 50.0));
        assert_eq!(Polygon::new(vec![Point::new(0.0, 0.0)]).area(), 0.0);
    }

    #[test]
    fn test_vertical_split() {
        let r = Polygon::rect(100.0, 50.0);
        let pieces = split_polygon_with_line(&r, Point::new(40.0, -10.0), Point::new(40.0, 80.0));
        assert_eq!(pieces.len(), 2);
        let mut areas: Vec<f64> = pieces.iter().map(Polygon::area).collect();
        areas.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(approx(areas[0], 2000.0));
        assert!(approx(areas[1], 3000.0));
    }

    #[test]
    fn test_diagonal_split_conserves_area() {
        let r = Polygon::rect(100.0, 50.0);
        let pieces = split_polygon_with_line(&r, Point::new(0.0, 0.0), Point::new(100.0, 50.0));
        assert_eq!(pieces.len(), 2);
        for p in &pieces {
            assert_eq!(p.points.len(), 3);
            assert!(approx(p.area(), 2500.0));
        }
    }

    #[test]
    fn test_line_missing_polygon_returns_input() {
        let r = Polygon::rect(10.0, 10.0);
        let pieces = split_polygon_with_line(&r, Point::new(20.0, 0.0), Point::new(20.0, 1.0));
        assert_eq!(pieces, vec![r.clone()]);

        let along_edge = split_polygon_with_line(&r, Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert_eq!(along_edge.len(), 1);
    }

    #[test]
    fn test_degenerate_line_returns_input() {
        let r = Polygon::rect(10.0, 10.0);
        let p = Point::new(5.0, 5.0);
        assert_eq!(split_polygon_with_line(&r, p, p), vec![r]);
    }

    #[test]
    fn test_split_shapes_and_cut_rectangle() {
        let cuts = [
            [Point::new(60.0, 0.0), Point::new(60.0, 1.0)],
            [Point::new(0.0, 30.0), Point::new(1.0, 30.0)],
        ];
        let pieces = cut_rectangle(120.0, 60.0, &cuts);
        assert_eq!(pieces.len(), 4);
        let total: f64 = pieces.iter().map(Polygon::area).sum();
        assert!(approx(total, 7200.0));
        for p in &pieces {
            let bb = p.bounding_box().unwrap();
            assert!(approx(bb.width(), 60.0));
            assert!(approx(bb.length(), 30.0));
        }
    }
}

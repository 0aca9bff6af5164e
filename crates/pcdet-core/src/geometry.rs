use glam::Vec2;

/// Tolerance used for edge and vertex coincidence tests.
pub const GEOMETRY_EPS: f32 = 1e-8;

/// Upper bound on the vertices of a clipped polygon.
///
/// Clipping a quadrilateral against four half-planes adds at most one vertex per plane.
const MAX_VERTICES: usize = 8;

/// A rectangle in the plane rotated about its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect2d {
    /// The center of the rectangle.
    pub center: Vec2,
    /// Half of the extents along the local axes.
    pub half_extent: Vec2,
    /// The rotation of the local axes in radians.
    pub yaw: f32,
}

impl Rect2d {
    /// Create a new rotated rectangle.
    pub fn new(center: Vec2, half_extent: Vec2, yaw: f32) -> Self {
        Self {
            center,
            half_extent,
            yaw,
        }
    }

    /// The area of the rectangle, zero for degenerate extents.
    #[inline]
    pub fn area(&self) -> f32 {
        4.0 * self.half_extent.x.max(0.0) * self.half_extent.y.max(0.0)
    }

    /// The four corners in counter-clockwise order.
    pub fn corners(&self) -> [Vec2; 4] {
        let rot = Vec2::from_angle(self.yaw);
        let (hx, hy) = (self.half_extent.x, self.half_extent.y);
        [
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ]
        .map(|c| self.center + rot.rotate(c))
    }

    /// Express a point in the local frame of the rectangle.
    #[inline]
    pub fn to_local(&self, p: Vec2) -> Vec2 {
        Vec2::from_angle(-self.yaw).rotate(p - self.center)
    }

    /// Check whether a point lies in the rectangle grown by `margin` on every side.
    #[inline]
    pub fn contains(&self, p: Vec2, margin: f32) -> bool {
        let local = self.to_local(p);
        local.x.abs() <= self.half_extent.x + margin && local.y.abs() <= self.half_extent.y + margin
    }

    /// Radius of the circle around the center enclosing the rectangle.
    #[inline]
    pub fn bounding_radius(&self) -> f32 {
        self.half_extent.length()
    }
}

/// A convex polygon with a fixed vertex capacity.
#[derive(Debug, Clone, Copy)]
struct ClipPolygon {
    vertices: [Vec2; MAX_VERTICES],
    len: usize,
}

impl ClipPolygon {
    fn empty() -> Self {
        Self {
            vertices: [Vec2::ZERO; MAX_VERTICES],
            len: 0,
        }
    }

    fn from_quad(quad: [Vec2; 4]) -> Self {
        let mut poly = Self::empty();
        quad.iter().for_each(|&v| poly.push(v));
        poly
    }

    #[inline]
    fn push(&mut self, v: Vec2) {
        // skip vertices that coincide with the previous one
        if self.len > 0 && (self.vertices[self.len - 1] - v).length_squared() <= GEOMETRY_EPS {
            return;
        }
        if self.len < MAX_VERTICES {
            self.vertices[self.len] = v;
            self.len += 1;
        }
    }

    fn as_slice(&self) -> &[Vec2] {
        &self.vertices[..self.len]
    }

    /// Keep the part of the polygon on the left of the directed edge `a -> b`.
    fn clip(&self, a: Vec2, b: Vec2) -> Self {
        let edge = b - a;
        let side = |p: Vec2| edge.perp_dot(p - a);

        let mut out = Self::empty();
        let pts = self.as_slice();
        for (i, &cur) in pts.iter().enumerate() {
            let prev = pts[(i + pts.len() - 1) % pts.len()];
            let (d_prev, d_cur) = (side(prev), side(cur));
            let prev_in = d_prev >= -GEOMETRY_EPS;
            let cur_in = d_cur >= -GEOMETRY_EPS;
            if cur_in != prev_in {
                let t = d_prev / (d_prev - d_cur);
                out.push(prev + (cur - prev) * t);
            }
            if cur_in {
                out.push(cur);
            }
        }
        // the first and last vertex may coincide after wrapping around
        if out.len > 1 {
            let gap = out.vertices[0] - out.vertices[out.len - 1];
            if gap.length_squared() <= GEOMETRY_EPS {
                out.len -= 1;
            }
        }
        out
    }
}

/// Compute the area of a simple polygon with the shoelace formula.
///
/// # Arguments
///
/// * `vertices` - The polygon vertices in order, either orientation.
///
/// # Returns
///
/// The unsigned area, zero for fewer than three vertices.
pub fn polygon_area(vertices: &[Vec2]) -> f32 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let twice_area: f32 = vertices
        .iter()
        .zip(vertices.iter().cycle().skip(1))
        .map(|(a, b)| a.perp_dot(*b))
        .sum();
    0.5 * twice_area.abs()
}

/// Compute the intersection polygon of two rotated rectangles.
///
/// Sutherland-Hodgman clipping of the corners of `a` against the four edges of `b`.
pub fn rotated_rect_intersection_polygon(a: &Rect2d, b: &Rect2d) -> Vec<Vec2> {
    clip_rects(a, b)
        .map(|poly| poly.as_slice().to_vec())
        .unwrap_or_default()
}

fn clip_rects(a: &Rect2d, b: &Rect2d) -> Option<ClipPolygon> {
    if a.area() <= 0.0 || b.area() <= 0.0 {
        return None;
    }
    // disjoint bounding circles cannot overlap
    if (a.center - b.center).length() > a.bounding_radius() + b.bounding_radius() {
        return None;
    }

    let clipper = b.corners();
    let mut poly = ClipPolygon::from_quad(a.corners());
    for i in 0..4 {
        poly = poly.clip(clipper[i], clipper[(i + 1) % 4]);
        if poly.len < 3 {
            return None;
        }
    }
    Some(poly)
}

/// Compute the area of the intersection of two rotated rectangles.
///
/// Degenerate configurations such as touching edges, collinear edges or zero extents
/// produce zero, and a rectangle nested in the other produces its own area.
///
/// # Arguments
///
/// * `a` - The first rectangle.
/// * `b` - The second rectangle.
///
/// # Returns
///
/// The intersection area.
///
/// # Example
///
/// ```
/// use glam::Vec2;
/// use pcdet_core::geometry::{rotated_rect_intersection, Rect2d};
///
/// let a = Rect2d::new(Vec2::ZERO, Vec2::new(1.0, 1.0), 0.0);
/// let b = Rect2d::new(Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), 0.0);
/// assert!((rotated_rect_intersection(&a, &b) - 2.0).abs() < 1e-5);
/// ```
pub fn rotated_rect_intersection(a: &Rect2d, b: &Rect2d) -> f32 {
    match clip_rects(a, b) {
        // the clipped area never exceeds the smaller rectangle
        Some(poly) => polygon_area(poly.as_slice()).min(a.area()).min(b.area()),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn rect(cx: f32, cy: f32, dx: f32, dy: f32, yaw: f32) -> Rect2d {
        Rect2d::new(Vec2::new(cx, cy), Vec2::new(dx * 0.5, dy * 0.5), yaw)
    }

    #[test]
    fn test_corners_ccw() {
        let r = rect(1.0, 2.0, 2.0, 4.0, 0.0);
        let c = r.corners();
        assert_relative_eq!(c[0].x, 0.0);
        assert_relative_eq!(c[0].y, 0.0);
        assert_relative_eq!(c[2].x, 2.0);
        assert_relative_eq!(c[2].y, 4.0);
        // counter-clockwise means positive signed area
        let signed: f32 = (0..4).map(|i| c[i].perp_dot(c[(i + 1) % 4])).sum();
        assert!(signed > 0.0);
        assert_relative_eq!(polygon_area(&c), 8.0, epsilon = 1e-5);
    }

    #[test]
    fn test_identical() {
        let r = rect(3.0, -1.0, 2.0, 3.0, 0.7);
        assert_relative_eq!(rotated_rect_intersection(&r, &r), 6.0, epsilon = 1e-4);
    }

    #[test]
    fn test_half_overlap() {
        let a = rect(0.0, 0.0, 2.0, 2.0, 0.0);
        let b = rect(1.0, 0.0, 2.0, 2.0, 0.0);
        assert_relative_eq!(rotated_rect_intersection(&a, &b), 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_disjoint_and_touching() {
        let a = rect(0.0, 0.0, 2.0, 2.0, 0.0);
        let far = rect(10.0, 0.0, 2.0, 2.0, 0.3);
        let touching = rect(2.0, 0.0, 2.0, 2.0, 0.0);
        assert_eq!(rotated_rect_intersection(&a, &far), 0.0);
        assert_relative_eq!(rotated_rect_intersection(&a, &touching), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_nested() {
        let outer = rect(0.0, 0.0, 10.0, 10.0, 0.2);
        let inner = rect(0.5, 0.5, 1.0, 2.0, 1.1);
        assert_relative_eq!(rotated_rect_intersection(&outer, &inner), 2.0, epsilon = 1e-4);
        assert_relative_eq!(rotated_rect_intersection(&inner, &outer), 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_rotated_square() {
        // a unit square rotated by 45 degrees over itself leaves an octagon
        let a = rect(0.0, 0.0, 2.0, 2.0, 0.0);
        let b = rect(0.0, 0.0, 2.0, 2.0, FRAC_PI_4);
        let expected = 8.0 * (2.0f32.sqrt() - 1.0);
        assert_relative_eq!(rotated_rect_intersection(&a, &b), expected, epsilon = 1e-4);
        assert_eq!(rotated_rect_intersection_polygon(&a, &b).len(), 8);
    }

    #[test]
    fn test_quarter_turn_is_symmetric() {
        let a = rect(0.0, 0.0, 4.0, 2.0, 0.0);
        let b = rect(0.0, 0.0, 2.0, 4.0, FRAC_PI_2);
        assert_relative_eq!(rotated_rect_intersection(&a, &b), 8.0, epsilon = 1e-4);
        let c = rect(0.0, 0.0, 4.0, 2.0, PI);
        assert_relative_eq!(rotated_rect_intersection(&a, &c), 8.0, epsilon = 1e-4);
    }

    #[test]
    fn test_degenerate_extent() {
        let a = rect(0.0, 0.0, 0.0, 2.0, 0.0);
        let b = rect(0.0, 0.0, 2.0, 2.0, 0.0);
        assert_eq!(rotated_rect_intersection(&a, &b), 0.0);
    }

    #[test]
    fn test_random_bounds_and_symmetry() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let a = rect(
                rng.random_range(-2.0..2.0),
                rng.random_range(-2.0..2.0),
                rng.random_range(0.5..4.0),
                rng.random_range(0.5..4.0),
                rng.random_range(-PI..PI),
            );
            let b = rect(
                rng.random_range(-2.0..2.0),
                rng.random_range(-2.0..2.0),
                rng.random_range(0.5..4.0),
                rng.random_range(0.5..4.0),
                rng.random_range(-PI..PI),
            );
            let ab = rotated_rect_intersection(&a, &b);
            let ba = rotated_rect_intersection(&b, &a);
            assert!(ab >= 0.0);
            assert!(ab <= a.area().min(b.area()) + 1e-4);
            assert_relative_eq!(ab, ba, epsilon = 1e-3, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_contains() {
        let r = rect(1.0, 1.0, 2.0, 4.0, FRAC_PI_2);
        assert!(r.contains(Vec2::new(2.9, 1.0), 0.0));
        assert!(!r.contains(Vec2::new(1.0, 2.9), 0.0));
        assert!(r.contains(Vec2::new(1.0, 2.05), 0.1));
    }
}

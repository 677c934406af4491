//! World-space primitives: rectangles, affine transforms, cubic beziers and easing.

use super::types::Position;

/// Axis-aligned rectangle. `width`/`height` are non-negative once normalized.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
	pub x: f64,
	pub y: f64,
	pub width: f64,
	pub height: f64,
}

impl Rect {
	pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
		Self {
			x,
			y,
			width,
			height,
		}
	}

	/// Builds a rectangle from two arbitrary corners, e.g. a marquee dragged up-left.
	pub fn from_corners(a: Position, b: Position) -> Self {
		let (min_x, max_x) = (a.x.min(b.x), a.x.max(b.x));
		let (min_y, max_y) = (a.y.min(b.y), a.y.max(b.y));
		Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
	}

	pub fn max_x(&self) -> f64 {
		self.x + self.width
	}

	pub fn max_y(&self) -> f64 {
		self.y + self.height
	}

	pub fn center(&self) -> Position {
		Position::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
	}

	pub fn is_empty(&self) -> bool {
		!(self.width > 0.0 && self.height > 0.0)
	}

	/// Inclusive containment, so points on the border count as inside.
	pub fn contains(&self, p: Position) -> bool {
		p.x >= self.x && p.x <= self.max_x() && p.y >= self.y && p.y <= self.max_y()
	}

	pub fn intersects(&self, other: &Rect) -> bool {
		self.x <= other.max_x()
			&& other.x <= self.max_x()
			&& self.y <= other.max_y()
			&& other.y <= self.max_y()
	}

	pub fn expand(&self, amount: f64) -> Self {
		Self::new(
			self.x - amount,
			self.y - amount,
			self.width + amount * 2.0,
			self.height + amount * 2.0,
		)
	}

	pub fn union(&self, other: &Rect) -> Self {
		let min_x = self.x.min(other.x);
		let min_y = self.y.min(other.y);
		let max_x = self.max_x().max(other.max_x());
		let max_y = self.max_y().max(other.max_y());
		Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
	}
}

/// 2D affine transform in canvas `setTransform(a, b, c, d, e, f)` order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform2d {
	pub a: f64,
	pub b: f64,
	pub c: f64,
	pub d: f64,
	pub e: f64,
	pub f: f64,
}

impl Transform2d {
	pub const IDENTITY: Self = Self {
		a: 1.0,
		b: 0.0,
		c: 0.0,
		d: 1.0,
		e: 0.0,
		f: 0.0,
	};

	/// Uniform scale followed by a translation; the only shape the viewport produces.
	pub const fn scale_translate(scale: f64, tx: f64, ty: f64) -> Self {
		Self {
			a: scale,
			b: 0.0,
			c: 0.0,
			d: scale,
			e: tx,
			f: ty,
		}
	}

	pub fn apply(&self, p: Position) -> Position {
		Position::new(
			self.a * p.x + self.c * p.y + self.e,
			self.b * p.x + self.d * p.y + self.f,
		)
	}
}

/// Cubic Bézier segment used for connection curves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubicBezier {
	pub p0: Position,
	pub p1: Position,
	pub p2: Position,
	pub p3: Position,
}

impl CubicBezier {
	pub fn point_at(&self, t: f64) -> Position {
		let mt = 1.0 - t;
		let (a, b, c, d) = (mt * mt * mt, 3.0 * mt * mt * t, 3.0 * mt * t * t, t * t * t);
		Position::new(
			a * self.p0.x + b * self.p1.x + c * self.p2.x + d * self.p3.x,
			a * self.p0.y + b * self.p1.y + c * self.p2.y + d * self.p3.y,
		)
	}

	/// First derivative at `t`.
	pub fn tangent_at(&self, t: f64) -> Position {
		let mt = 1.0 - t;
		let (a, b, c) = (3.0 * mt * mt, 6.0 * mt * t, 3.0 * t * t);
		Position::new(
			a * (self.p1.x - self.p0.x) + b * (self.p2.x - self.p1.x) + c * (self.p3.x - self.p2.x),
			a * (self.p1.y - self.p0.y) + b * (self.p2.y - self.p1.y) + c * (self.p3.y - self.p2.y),
		)
	}

	/// Bounding box of the control hull; always contains the curve.
	pub fn hull_bounds(&self) -> Rect {
		let xs = [self.p0.x, self.p1.x, self.p2.x, self.p3.x];
		let ys = [self.p0.y, self.p1.y, self.p2.y, self.p3.y];
		let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min);
		let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
		let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min);
		let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
		Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
	}

	/// `steps + 1` evenly spaced parameter samples including both endpoints.
	pub fn sample(&self, steps: usize) -> impl Iterator<Item = Position> + '_ {
		let steps = steps.max(1);
		(0..=steps).map(move |i| self.point_at(i as f64 / steps as f64))
	}
}

pub fn distance(a: Position, b: Position) -> f64 {
	(a.x - b.x).hypot(a.y - b.y)
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
	a + (b - a) * t
}

pub fn ease_out_cubic(t: f64) -> f64 {
	1.0 - (1.0 - t).powi(3)
}

/// Hermite ramp of `x` between `edge0` and `edge1`, clamped to `[0, 1]`.
pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
	if edge1 <= edge0 {
		return if x >= edge1 { 1.0 } else { 0.0 };
	}
	let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
	t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
pub(crate) fn assert_close(actual: f64, expected: f64, tolerance: f64) {
	assert!(
		(actual - expected).abs() <= tolerance,
		"expected {expected}, got {actual} (tolerance {tolerance})"
	);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn from_corners_normalizes_negative_drags() {
		let rect = Rect::from_corners(Position::new(100.0, 80.0), Position::new(20.0, 10.0));
		assert_eq!(rect, Rect::new(20.0, 10.0, 80.0, 70.0));
	}

	#[test]
	fn touching_rects_intersect() {
		let a = Rect::new(0.0, 0.0, 10.0, 10.0);
		assert!(a.intersects(&Rect::new(10.0, 10.0, 5.0, 5.0)));
		assert!(!a.intersects(&Rect::new(10.5, 0.0, 5.0, 5.0)));
	}

	#[test]
	fn bezier_hits_endpoints_and_stays_in_hull() {
		let curve = CubicBezier {
			p0: Position::new(0.0, 0.0),
			p1: Position::new(50.0, 0.0),
			p2: Position::new(50.0, 100.0),
			p3: Position::new(100.0, 100.0),
		};
		assert_eq!(curve.point_at(0.0), curve.p0);
		assert_eq!(curve.point_at(1.0), curve.p3);
		let hull = curve.hull_bounds();
		assert!(curve.sample(16).all(|p| hull.contains(p)));
		assert_eq!(curve.sample(16).count(), 17);
	}

	#[test]
	fn tangent_at_end_follows_last_control_leg() {
		let curve = CubicBezier {
			p0: Position::new(0.0, 0.0),
			p1: Position::new(40.0, 0.0),
			p2: Position::new(160.0, 50.0),
			p3: Position::new(200.0, 50.0),
		};
		let tangent = curve.tangent_at(1.0);
		assert_close(tangent.x, 120.0, 1e-9);
		assert_close(tangent.y, 0.0, 1e-9);
	}

	#[test]
	fn smoothstep_clamps() {
		assert_eq!(smoothstep(1.0, 2.0, 0.0), 0.0);
		assert_eq!(smoothstep(1.0, 2.0, 3.0), 1.0);
		assert_close(smoothstep(1.0, 2.0, 1.5), 0.5, 1e-12);
	}
}

//! Pan/zoom state mapping the infinite world plane onto the canvas.
//!
//! Screen coordinates are CSS pixels relative to the canvas' top-left corner.
//! The device pixel ratio only enters through [`Viewport::combined_transform`],
//! so hit-testing and input never see backing-store pixels.
//!
//! Time-based motion (animated transitions and inertia) is advanced explicitly
//! through [`Viewport::advance`] with a frame timestamp, which keeps the
//! viewport free of any timer and lets tests drive it with a fake clock.

use std::collections::VecDeque;

use super::geometry::{Rect, Transform2d, ease_out_cubic, lerp};
use super::style::ViewportConfig;
use super::types::Position;

/// Nominal frame length inertia speeds are expressed in.
const FRAME_MS: f64 = 1000.0 / 60.0;

#[derive(Clone, Copy, Debug)]
struct PanSample {
	dx: f64,
	dy: f64,
	at: f64,
}

#[derive(Clone, Copy, Debug)]
struct ViewAnimation {
	start_time: f64,
	duration: f64,
	from_zoom: f64,
	to_zoom: f64,
	from_offset: Position,
	to_offset: Position,
}

#[derive(Clone, Copy, Debug)]
struct Inertia {
	velocity: Position,
	last_time: f64,
}

/// What is currently driving `offset`/`zoom` besides direct input. Animation and
/// inertia are mutually exclusive by construction.
#[derive(Clone, Copy, Debug, Default)]
enum Motion {
	#[default]
	Idle,
	Animating(ViewAnimation),
	Coasting(Inertia),
}

pub struct Viewport {
	config: ViewportConfig,
	offset: Position,
	zoom: f64,
	width: f64,
	height: f64,
	device_pixel_ratio: f64,
	motion: Motion,
	pan_history: VecDeque<PanSample>,
	on_change: Option<Box<dyn FnMut()>>,
}

impl std::fmt::Debug for Viewport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Viewport")
			.field("offset", &self.offset)
			.field("zoom", &self.zoom)
			.field("width", &self.width)
			.field("height", &self.height)
			.field("device_pixel_ratio", &self.device_pixel_ratio)
			.field("motion", &self.motion)
			.finish()
	}
}

impl Viewport {
	/// The config is normalized first, so an inverted or non-finite zoom range
	/// cannot reach [`f64::clamp`].
	pub fn new(config: ViewportConfig, width: f64, height: f64) -> Self {
		let config = config.normalized();
		let zoom = 1.0_f64.clamp(config.min_zoom, config.max_zoom);
		Self {
			config,
			offset: Position::default(),
			zoom,
			width,
			height,
			device_pixel_ratio: 1.0,
			motion: Motion::Idle,
			pan_history: VecDeque::new(),
			on_change: None,
		}
	}

	pub fn zoom(&self) -> f64 {
		self.zoom
	}

	pub fn offset(&self) -> Position {
		self.offset
	}

	pub fn width(&self) -> f64 {
		self.width
	}

	pub fn height(&self) -> f64 {
		self.height
	}

	pub fn device_pixel_ratio(&self) -> f64 {
		self.device_pixel_ratio
	}

	pub fn config(&self) -> &ViewportConfig {
		&self.config
	}

	/// Registers the callback invoked whenever [`Viewport::advance`] moves the view,
	/// typically a render request.
	pub fn set_on_change(&mut self, callback: impl FnMut() + 'static) {
		self.on_change = Some(Box::new(callback));
	}

	/// Updates the canvas' CSS size and device pixel ratio.
	pub fn resize(&mut self, width: f64, height: f64, device_pixel_ratio: f64) {
		self.width = width.max(0.0);
		self.height = height.max(0.0);
		self.device_pixel_ratio = if device_pixel_ratio > 0.0 && device_pixel_ratio.is_finite() {
			device_pixel_ratio
		} else {
			1.0
		};
	}

	pub fn to_world_coords(&self, screen: Position) -> Position {
		Position::new(
			(screen.x - self.offset.x) / self.zoom,
			(screen.y - self.offset.y) / self.zoom,
		)
	}

	pub fn to_screen_coords(&self, world: Position) -> Position {
		Position::new(
			world.x * self.zoom + self.offset.x,
			world.y * self.zoom + self.offset.y,
		)
	}

	/// World-to-backing-store transform: pan, zoom and device pixel ratio folded
	/// into one matrix.
	pub fn combined_transform(&self) -> Transform2d {
		let dpr = self.device_pixel_ratio;
		Transform2d::scale_translate(self.zoom * dpr, self.offset.x * dpr, self.offset.y * dpr)
	}

	/// World-space rectangle currently covered by the canvas.
	pub fn visible_bounds(&self) -> Rect {
		let top_left = self.to_world_coords(Position::new(0.0, 0.0));
		let bottom_right = self.to_world_coords(Position::new(self.width, self.height));
		Rect::from_corners(top_left, bottom_right)
	}

	/// Rounds a world coordinate onto the device pixel grid at the current zoom.
	pub fn snap_to_pixel(&self, world: f64) -> f64 {
		let scale = self.zoom * self.device_pixel_ratio;
		(world * scale).round() / scale
	}

	fn screen_center(&self) -> Position {
		Position::new(self.width * 0.5, self.height * 0.5)
	}

	fn clamp_zoom(&self, zoom: f64) -> f64 {
		if zoom.is_nan() {
			return self.zoom;
		}
		zoom.clamp(self.config.min_zoom, self.config.max_zoom)
	}

	/// Offset that keeps the world point under `anchor` in place at `zoom`.
	fn anchored_offset(&self, zoom: f64, anchor: Position) -> Position {
		let world_anchor = self.to_world_coords(anchor);
		Position::new(anchor.x - world_anchor.x * zoom, anchor.y - world_anchor.y * zoom)
	}

	/// Sets the zoom, keeping the world point under `anchor` (the screen centre by
	/// default) stationary. Cancels any animation or inertia.
	pub fn set_zoom(&mut self, zoom: f64, anchor: Option<Position>) {
		self.stop_motion();
		self.apply_zoom(zoom, anchor);
	}

	fn apply_zoom(&mut self, zoom: f64, anchor: Option<Position>) {
		let zoom = self.clamp_zoom(zoom);
		let anchor = anchor.unwrap_or_else(|| self.screen_center());
		self.offset = self.anchored_offset(zoom, anchor);
		self.zoom = zoom;
	}

	pub fn zoom_by(&mut self, factor: f64, anchor: Option<Position>) {
		self.set_zoom(self.zoom * factor, anchor);
	}

	/// One wheel notch; negative `delta_y` (scrolling up) zooms in.
	pub fn zoom_by_wheel(&mut self, delta_y: f64, anchor: Position) {
		if delta_y == 0.0 {
			return;
		}
		let factor = if delta_y > 0.0 {
			1.0 / self.config.wheel_zoom_factor
		} else {
			self.config.wheel_zoom_factor
		};
		self.zoom_by(factor, Some(anchor));
	}

	/// Nearest configured zoom level when within tolerance, otherwise `zoom` unchanged.
	pub fn snap_zoom(&self, zoom: f64) -> f64 {
		self.config
			.zoom_levels
			.iter()
			.copied()
			.filter(|level| ((zoom - level) / level).abs() <= self.config.zoom_snap_tolerance)
			.min_by(|a, b| (zoom - a).abs().total_cmp(&(zoom - b).abs()))
			.unwrap_or(zoom)
	}

	/// Next level strictly above the current (snapped) zoom.
	pub fn next_zoom_level(&self) -> f64 {
		let current = self.snap_zoom(self.zoom);
		self.config
			.zoom_levels
			.iter()
			.copied()
			.find(|level| *level > current)
			.map_or(self.config.max_zoom, |level| self.clamp_zoom(level))
	}

	/// Next level strictly below the current (snapped) zoom.
	pub fn previous_zoom_level(&self) -> f64 {
		let current = self.snap_zoom(self.zoom);
		self.config
			.zoom_levels
			.iter()
			.rev()
			.copied()
			.find(|level| *level < current)
			.map_or(self.config.min_zoom, |level| self.clamp_zoom(level))
	}

	pub fn zoom_in(&mut self, anchor: Option<Position>, now: f64) {
		let target = self.next_zoom_level();
		self.animate_zoom_to(target, anchor, now);
	}

	pub fn zoom_out(&mut self, anchor: Option<Position>, now: f64) {
		let target = self.previous_zoom_level();
		self.animate_zoom_to(target, anchor, now);
	}

	/// Moves the view by a screen-space delta and records it for inertia.
	pub fn pan(&mut self, dx: f64, dy: f64, now: f64) {
		self.stop_motion();
		self.offset.x += dx;
		self.offset.y += dy;
		self.pan_history.push_back(PanSample { dx, dy, at: now });
		self.trim_pan_history(now);
	}

	fn trim_pan_history(&mut self, now: f64) {
		let window = self.config.pan_history_window_ms;
		while self
			.pan_history
			.front()
			.is_some_and(|sample| now - sample.at > window)
		{
			self.pan_history.pop_front();
		}
	}

	/// Average release velocity in px per nominal frame.
	fn release_velocity(&mut self, now: f64) -> Option<Position> {
		self.trim_pan_history(now);
		let first = self.pan_history.front()?;
		let span = (now - first.at).max(FRAME_MS);
		let (sum_x, sum_y) = self
			.pan_history
			.iter()
			.fold((0.0, 0.0), |(x, y), s| (x + s.dx, y + s.dy));
		Some(Position::new(sum_x / span * FRAME_MS, sum_y / span * FRAME_MS))
	}

	/// Starts coasting with the recent pan velocity. Returns whether inertia began.
	pub fn start_inertia(&mut self, now: f64) -> bool {
		let velocity = self.release_velocity(now);
		self.pan_history.clear();
		let Some(velocity) = velocity else {
			return false;
		};
		if velocity.x.hypot(velocity.y) < self.config.inertia_min_speed {
			return false;
		}
		self.motion = Motion::Coasting(Inertia {
			velocity,
			last_time: now,
		});
		true
	}

	pub fn stop_motion(&mut self) {
		self.motion = Motion::Idle;
	}

	pub fn is_moving(&self) -> bool {
		!matches!(self.motion, Motion::Idle)
	}

	pub fn is_animating(&self) -> bool {
		matches!(self.motion, Motion::Animating(_))
	}

	pub fn is_coasting(&self) -> bool {
		matches!(self.motion, Motion::Coasting(_))
	}

	/// Steps the active animation or inertia to `now`. Returns whether motion is
	/// still in progress afterwards.
	pub fn advance(&mut self, now: f64) -> bool {
		let changed = match self.motion {
			Motion::Idle => false,
			Motion::Animating(anim) => {
				let t = if anim.duration > 0.0 {
					((now - anim.start_time) / anim.duration).clamp(0.0, 1.0)
				} else {
					1.0
				};
				if t >= 1.0 {
					self.zoom = anim.to_zoom;
					self.offset = anim.to_offset;
					self.motion = Motion::Idle;
				} else {
					let eased = ease_out_cubic(t);
					self.zoom = lerp(anim.from_zoom, anim.to_zoom, eased);
					self.offset = Position::new(
						lerp(anim.from_offset.x, anim.to_offset.x, eased),
						lerp(anim.from_offset.y, anim.to_offset.y, eased),
					);
				}
				true
			}
			Motion::Coasting(mut inertia) => {
				let frames = (now - inertia.last_time) / FRAME_MS;
				if frames > 0.0 {
					self.offset.x += inertia.velocity.x * frames;
					self.offset.y += inertia.velocity.y * frames;
					let decay = self.config.inertia_friction.powf(frames);
					inertia.velocity.x *= decay;
					inertia.velocity.y *= decay;
					inertia.last_time = now;
					let speed = inertia.velocity.x.hypot(inertia.velocity.y);
					self.motion = if speed < self.config.inertia_stop_speed {
						Motion::Idle
					} else {
						Motion::Coasting(inertia)
					};
					true
				} else {
					false
				}
			}
		};
		if changed && let Some(callback) = self.on_change.as_mut() {
			callback();
		}
		self.is_moving()
	}

	fn start_animation(&mut self, to_zoom: f64, to_offset: Position, now: f64) {
		self.pan_history.clear();
		self.motion = Motion::Animating(ViewAnimation {
			start_time: now,
			duration: self.config.animation_duration_ms,
			from_zoom: self.zoom,
			to_zoom,
			from_offset: self.offset,
			to_offset,
		});
	}

	/// Animated counterpart of [`Viewport::set_zoom`].
	pub fn animate_zoom_to(&mut self, zoom: f64, anchor: Option<Position>, now: f64) {
		let zoom = self.clamp_zoom(zoom);
		let anchor = anchor.unwrap_or_else(|| self.screen_center());
		let offset = self.anchored_offset(zoom, anchor);
		self.start_animation(zoom, offset, now);
	}

	fn centered_offset(&self, world: Position, zoom: f64) -> Position {
		let center = self.screen_center();
		Position::new(center.x - world.x * zoom, center.y - world.y * zoom)
	}

	pub fn center_on(&mut self, world: Position) {
		self.stop_motion();
		self.offset = self.centered_offset(world, self.zoom);
	}

	/// Glides so that `world` ends up in the middle of the canvas, optionally
	/// changing zoom on the way.
	pub fn animate_center_on(&mut self, world: Position, zoom: Option<f64>, now: f64) {
		let zoom = self.clamp_zoom(zoom.unwrap_or(self.zoom));
		let offset = self.centered_offset(world, zoom);
		self.start_animation(zoom, offset, now);
	}

	/// Zoom and offset that frame the given world box with `padding` screen pixels
	/// on each side, never zooming past 1:1. `None` for degenerate input.
	fn fit_target(
		&self,
		min_x: f64,
		min_y: f64,
		max_x: f64,
		max_y: f64,
		padding: f64,
	) -> Option<(f64, Position)> {
		let content_width = max_x - min_x;
		let content_height = max_y - min_y;
		if !(content_width > 0.0 && content_height > 0.0) {
			return None;
		}
		let available_width = self.width - padding * 2.0;
		let available_height = self.height - padding * 2.0;
		if !(available_width > 0.0 && available_height > 0.0) {
			return None;
		}
		let zoom = (available_width / content_width)
			.min(available_height / content_height)
			.min(1.0);
		let zoom = self.clamp_zoom(zoom);
		let mid = Position::new((min_x + max_x) * 0.5, (min_y + max_y) * 0.5);
		Some((zoom, self.centered_offset(mid, zoom)))
	}

	/// Frames the world box immediately. Returns `false` (and changes nothing) for
	/// zero-area bounds.
	pub fn fit_bounds(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64, padding: f64) -> bool {
		let Some((zoom, offset)) = self.fit_target(min_x, min_y, max_x, max_y, padding) else {
			return false;
		};
		self.stop_motion();
		self.zoom = zoom;
		self.offset = offset;
		true
	}

	pub fn animate_fit_bounds(&mut self, bounds: Rect, padding: f64, now: f64) -> bool {
		let Some((zoom, offset)) =
			self.fit_target(bounds.x, bounds.y, bounds.max_x(), bounds.max_y(), padding)
		else {
			return false;
		};
		self.start_animation(zoom, offset, now);
		true
	}

	/// Back to 1:1 with the world origin at the top-left corner.
	pub fn reset(&mut self) {
		self.stop_motion();
		self.zoom = self.clamp_zoom(1.0);
		self.offset = Position::default();
	}

	pub fn animate_reset(&mut self, now: f64) {
		self.start_animation(self.clamp_zoom(1.0), Position::default(), now);
	}
}

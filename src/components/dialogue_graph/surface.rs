//! Drawing surface abstraction.
//!
//! [`Canvas2d`] is the subset of the HTML canvas 2D API the renderers use. The
//! browser contexts implement it in `web`; [`DisplayList`] implements it by
//! recording commands, which makes it the surface the unit tests draw into.
//! Recorded pictures measure text with a fixed estimate, so they never stand
//! in for a real raster in the browser.

use web_sys::OffscreenCanvas;

use super::error::RenderError;
use super::geometry::{Rect, Transform2d};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAlign {
	Left,
	Center,
	Right,
}

impl TextAlign {
	pub fn as_str(self) -> &'static str {
		match self {
			TextAlign::Left => "left",
			TextAlign::Center => "center",
			TextAlign::Right => "right",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextBaseline {
	Top,
	Middle,
	Alphabetic,
}

impl TextBaseline {
	pub fn as_str(self) -> &'static str {
		match self {
			TextBaseline::Top => "top",
			TextBaseline::Middle => "middle",
			TextBaseline::Alphabetic => "alphabetic",
		}
	}
}

/// Immediate-mode 2D drawing calls, mirroring `CanvasRenderingContext2d`.
pub trait Canvas2d {
	fn save(&mut self);
	fn restore(&mut self);
	fn set_transform(&mut self, transform: Transform2d);
	fn translate(&mut self, x: f64, y: f64);
	fn scale(&mut self, x: f64, y: f64);

	fn clear_rect(&mut self, rect: Rect);
	fn fill_rect(&mut self, rect: Rect);
	fn stroke_rect(&mut self, rect: Rect);

	fn begin_path(&mut self);
	fn move_to(&mut self, x: f64, y: f64);
	fn line_to(&mut self, x: f64, y: f64);
	fn quadratic_curve_to(&mut self, cx: f64, cy: f64, x: f64, y: f64);
	fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64);
	fn arc(&mut self, x: f64, y: f64, radius: f64, start: f64, end: f64);
	fn close_path(&mut self);
	fn fill(&mut self);
	fn stroke(&mut self);

	fn set_fill_style(&mut self, color: &str);
	fn set_stroke_style(&mut self, color: &str);
	fn set_line_width(&mut self, width: f64);
	fn set_line_dash(&mut self, segments: &[f64]);
	fn set_global_alpha(&mut self, alpha: f64);
	fn set_shadow(&mut self, blur: f64, color: &str);

	fn set_font(&mut self, font: &str);
	fn set_text_align(&mut self, align: TextAlign);
	fn set_text_baseline(&mut self, baseline: TextBaseline);
	fn fill_text(&mut self, text: &str, x: f64, y: f64);
	/// Advance width of `text` in the current font.
	fn measure_text(&mut self, text: &str) -> f64;

	/// Copies an offscreen raster into `dest` (in current user space).
	fn draw_offscreen(&mut self, image: &OffscreenCanvas, dest: Rect);
}

/// Appends a rounded-rectangle subpath.
pub fn rounded_rect_path(ctx: &mut dyn Canvas2d, rect: Rect, radius: f64) {
	let r = radius.min(rect.width * 0.5).min(rect.height * 0.5).max(0.0);
	let (x, y, right, bottom) = (rect.x, rect.y, rect.max_x(), rect.max_y());
	ctx.move_to(x + r, y);
	ctx.line_to(right - r, y);
	ctx.quadratic_curve_to(right, y, right, y + r);
	ctx.line_to(right, bottom - r);
	ctx.quadratic_curve_to(right, bottom, right - r, bottom);
	ctx.line_to(x + r, bottom);
	ctx.quadratic_curve_to(x, bottom, x, bottom - r);
	ctx.line_to(x, y + r);
	ctx.quadratic_curve_to(x, y, x + r, y);
	ctx.close_path();
}

/// One recorded [`Canvas2d`] call.
#[derive(Clone, Debug)]
pub enum DrawCommand {
	Save,
	Restore,
	SetTransform(Transform2d),
	Translate(f64, f64),
	Scale(f64, f64),
	ClearRect(Rect),
	FillRect(Rect),
	StrokeRect(Rect),
	BeginPath,
	MoveTo(f64, f64),
	LineTo(f64, f64),
	QuadraticCurveTo(f64, f64, f64, f64),
	BezierCurveTo([f64; 6]),
	Arc {
		x: f64,
		y: f64,
		radius: f64,
		start: f64,
		end: f64,
	},
	ClosePath,
	Fill,
	Stroke,
	FillStyle(String),
	StrokeStyle(String),
	LineWidth(f64),
	LineDash(Vec<f64>),
	GlobalAlpha(f64),
	Shadow(f64, String),
	Font(String),
	TextAlign(TextAlign),
	TextBaseline(TextBaseline),
	FillText(String, f64, f64),
	DrawOffscreen(OffscreenCanvas, Rect),
}

/// Recorded drawing that can be replayed onto any [`Canvas2d`].
#[derive(Clone, Debug)]
pub struct DisplayList {
	commands: Vec<DrawCommand>,
	font_size: f64,
}

impl DisplayList {
	pub fn new() -> Self {
		Self {
			commands: Vec::new(),
			font_size: 10.0,
		}
	}

	pub fn commands(&self) -> &[DrawCommand] {
		&self.commands
	}

	pub fn clear(&mut self) {
		self.commands.clear();
	}

	pub fn len(&self) -> usize {
		self.commands.len()
	}

	pub fn is_empty(&self) -> bool {
		self.commands.is_empty()
	}

	/// All strings passed to `fill_text`, in draw order.
	pub fn texts(&self) -> Vec<&str> {
		self.commands
			.iter()
			.filter_map(|cmd| match cmd {
				DrawCommand::FillText(text, ..) => Some(text.as_str()),
				_ => None,
			})
			.collect()
	}

	pub fn replay(&self, target: &mut dyn Canvas2d) {
		for cmd in &self.commands {
			match cmd {
				DrawCommand::Save => target.save(),
				DrawCommand::Restore => target.restore(),
				DrawCommand::SetTransform(t) => target.set_transform(*t),
				DrawCommand::Translate(x, y) => target.translate(*x, *y),
				DrawCommand::Scale(x, y) => target.scale(*x, *y),
				DrawCommand::ClearRect(r) => target.clear_rect(*r),
				DrawCommand::FillRect(r) => target.fill_rect(*r),
				DrawCommand::StrokeRect(r) => target.stroke_rect(*r),
				DrawCommand::BeginPath => target.begin_path(),
				DrawCommand::MoveTo(x, y) => target.move_to(*x, *y),
				DrawCommand::LineTo(x, y) => target.line_to(*x, *y),
				DrawCommand::QuadraticCurveTo(cx, cy, x, y) => {
					target.quadratic_curve_to(*cx, *cy, *x, *y)
				}
				DrawCommand::BezierCurveTo([a, b, c, d, e, f]) => {
					target.bezier_curve_to(*a, *b, *c, *d, *e, *f)
				}
				DrawCommand::Arc {
					x,
					y,
					radius,
					start,
					end,
				} => target.arc(*x, *y, *radius, *start, *end),
				DrawCommand::ClosePath => target.close_path(),
				DrawCommand::Fill => target.fill(),
				DrawCommand::Stroke => target.stroke(),
				DrawCommand::FillStyle(c) => target.set_fill_style(c),
				DrawCommand::StrokeStyle(c) => target.set_stroke_style(c),
				DrawCommand::LineWidth(w) => target.set_line_width(*w),
				DrawCommand::LineDash(d) => target.set_line_dash(d),
				DrawCommand::GlobalAlpha(a) => target.set_global_alpha(*a),
				DrawCommand::Shadow(blur, c) => target.set_shadow(*blur, c),
				DrawCommand::Font(f) => target.set_font(f),
				DrawCommand::TextAlign(a) => target.set_text_align(*a),
				DrawCommand::TextBaseline(b) => target.set_text_baseline(*b),
				DrawCommand::FillText(text, x, y) => target.fill_text(text, *x, *y),
				DrawCommand::DrawOffscreen(image, dest) => target.draw_offscreen(image, *dest),
			}
		}
	}
}

impl Default for DisplayList {
	fn default() -> Self {
		Self::new()
	}
}

fn font_size_px(font: &str) -> Option<f64> {
	font.split_whitespace()
		.find_map(|part| part.strip_suffix("px"))
		.and_then(|size| size.parse().ok())
}

impl Canvas2d for DisplayList {
	fn save(&mut self) {
		self.commands.push(DrawCommand::Save);
	}

	fn restore(&mut self) {
		self.commands.push(DrawCommand::Restore);
	}

	fn set_transform(&mut self, transform: Transform2d) {
		self.commands.push(DrawCommand::SetTransform(transform));
	}

	fn translate(&mut self, x: f64, y: f64) {
		self.commands.push(DrawCommand::Translate(x, y));
	}

	fn scale(&mut self, x: f64, y: f64) {
		self.commands.push(DrawCommand::Scale(x, y));
	}

	fn clear_rect(&mut self, rect: Rect) {
		self.commands.push(DrawCommand::ClearRect(rect));
	}

	fn fill_rect(&mut self, rect: Rect) {
		self.commands.push(DrawCommand::FillRect(rect));
	}

	fn stroke_rect(&mut self, rect: Rect) {
		self.commands.push(DrawCommand::StrokeRect(rect));
	}

	fn begin_path(&mut self) {
		self.commands.push(DrawCommand::BeginPath);
	}

	fn move_to(&mut self, x: f64, y: f64) {
		self.commands.push(DrawCommand::MoveTo(x, y));
	}

	fn line_to(&mut self, x: f64, y: f64) {
		self.commands.push(DrawCommand::LineTo(x, y));
	}

	fn quadratic_curve_to(&mut self, cx: f64, cy: f64, x: f64, y: f64) {
		self.commands.push(DrawCommand::QuadraticCurveTo(cx, cy, x, y));
	}

	fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) {
		self.commands
			.push(DrawCommand::BezierCurveTo([c1x, c1y, c2x, c2y, x, y]));
	}

	fn arc(&mut self, x: f64, y: f64, radius: f64, start: f64, end: f64) {
		self.commands.push(DrawCommand::Arc {
			x,
			y,
			radius,
			start,
			end,
		});
	}

	fn close_path(&mut self) {
		self.commands.push(DrawCommand::ClosePath);
	}

	fn fill(&mut self) {
		self.commands.push(DrawCommand::Fill);
	}

	fn stroke(&mut self) {
		self.commands.push(DrawCommand::Stroke);
	}

	fn set_fill_style(&mut self, color: &str) {
		self.commands.push(DrawCommand::FillStyle(color.to_string()));
	}

	fn set_stroke_style(&mut self, color: &str) {
		self.commands.push(DrawCommand::StrokeStyle(color.to_string()));
	}

	fn set_line_width(&mut self, width: f64) {
		self.commands.push(DrawCommand::LineWidth(width));
	}

	fn set_line_dash(&mut self, segments: &[f64]) {
		self.commands.push(DrawCommand::LineDash(segments.to_vec()));
	}

	fn set_global_alpha(&mut self, alpha: f64) {
		self.commands.push(DrawCommand::GlobalAlpha(alpha));
	}

	fn set_shadow(&mut self, blur: f64, color: &str) {
		self.commands.push(DrawCommand::Shadow(blur, color.to_string()));
	}

	fn set_font(&mut self, font: &str) {
		if let Some(size) = font_size_px(font) {
			self.font_size = size;
		}
		self.commands.push(DrawCommand::Font(font.to_string()));
	}

	fn set_text_align(&mut self, align: TextAlign) {
		self.commands.push(DrawCommand::TextAlign(align));
	}

	fn set_text_baseline(&mut self, baseline: TextBaseline) {
		self.commands.push(DrawCommand::TextBaseline(baseline));
	}

	fn fill_text(&mut self, text: &str, x: f64, y: f64) {
		self.commands
			.push(DrawCommand::FillText(text.to_string(), x, y));
	}

	// No font engine here, so approximate an average glyph advance.
	fn measure_text(&mut self, text: &str) -> f64 {
		text.chars().count() as f64 * self.font_size * 0.55
	}

	fn draw_offscreen(&mut self, image: &OffscreenCanvas, dest: Rect) {
		self.commands
			.push(DrawCommand::DrawOffscreen(image.clone(), dest));
	}
}

/// A raster (or raster stand-in) that can be drawn into once and blitted often.
pub trait Surface {
	/// Backing width in device pixels.
	fn width(&self) -> u32;
	/// Backing height in device pixels.
	fn height(&self) -> u32;
	fn context(&mut self) -> &mut dyn Canvas2d;
	/// Draws the whole surface stretched over `dest` in the target's user space.
	fn blit(&self, target: &mut dyn Canvas2d, dest: Rect);
}

/// Allocates [`Surface`]s. Picked once when the renderer is constructed.
pub trait SurfaceFactory {
	fn create(&self, width: u32, height: u32) -> Result<Box<dyn Surface>, RenderError>;
}

/// In-memory surface that keeps the drawing as a [`DisplayList`].
#[derive(Debug)]
pub struct PictureSurface {
	picture: DisplayList,
	width: u32,
	height: u32,
}

impl PictureSurface {
	pub fn picture(&self) -> &DisplayList {
		&self.picture
	}
}

impl Surface for PictureSurface {
	fn width(&self) -> u32 {
		self.width
	}

	fn height(&self) -> u32 {
		self.height
	}

	fn context(&mut self) -> &mut dyn Canvas2d {
		&mut self.picture
	}

	fn blit(&self, target: &mut dyn Canvas2d, dest: Rect) {
		target.save();
		target.translate(dest.x, dest.y);
		target.scale(
			dest.width / f64::from(self.width),
			dest.height / f64::from(self.height),
		);
		self.picture.replay(target);
		target.restore();
	}
}

/// Factory for [`PictureSurface`]. Also the placeholder handed to a renderer
/// whose node cache is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct PictureSurfaceFactory;

impl SurfaceFactory for PictureSurfaceFactory {
	fn create(&self, width: u32, height: u32) -> Result<Box<dyn Surface>, RenderError> {
		if width == 0 || height == 0 {
			return Err(RenderError::SurfaceCreation(format!(
				"degenerate size {width}x{height}"
			)));
		}
		Ok(Box::new(PictureSurface {
			picture: DisplayList::new(),
			width,
			height,
		}))
	}
}

//! Browser backends: canvas contexts as [`Canvas2d`], offscreen node rasters
//! and `requestAnimationFrame` as a [`FrameSource`].

use log::{info, warn};
use wasm_bindgen::prelude::*;
use web_sys::{
	CanvasRenderingContext2d, HtmlCanvasElement, OffscreenCanvas, OffscreenCanvasRenderingContext2d,
	Performance, Window,
};

use super::error::RenderError;
use super::geometry::{Rect, Transform2d};
use super::render_loop::{FrameCallback, FrameHandle, FrameSource};
use super::surface::{Canvas2d, Surface, SurfaceFactory, TextAlign, TextBaseline};

fn dash_array(segments: &[f64]) -> js_sys::Array {
	segments.iter().map(|s| JsValue::from_f64(*s)).collect()
}

// Both context types share the canvas 2D API but no common Rust trait, so the
// impl is stamped out per type. Calls go through `<$ty>::` to reach the
// inherent web-sys methods rather than recursing into the trait.
macro_rules! impl_canvas2d {
	($ty:ty) => {
		impl Canvas2d for $ty {
			fn save(&mut self) {
				<$ty>::save(self);
			}

			fn restore(&mut self) {
				<$ty>::restore(self);
			}

			fn set_transform(&mut self, t: Transform2d) {
				let _ = <$ty>::set_transform(self, t.a, t.b, t.c, t.d, t.e, t.f);
			}

			fn translate(&mut self, x: f64, y: f64) {
				let _ = <$ty>::translate(self, x, y);
			}

			fn scale(&mut self, x: f64, y: f64) {
				let _ = <$ty>::scale(self, x, y);
			}

			fn clear_rect(&mut self, r: Rect) {
				<$ty>::clear_rect(self, r.x, r.y, r.width, r.height);
			}

			fn fill_rect(&mut self, r: Rect) {
				<$ty>::fill_rect(self, r.x, r.y, r.width, r.height);
			}

			fn stroke_rect(&mut self, r: Rect) {
				<$ty>::stroke_rect(self, r.x, r.y, r.width, r.height);
			}

			fn begin_path(&mut self) {
				<$ty>::begin_path(self);
			}

			fn move_to(&mut self, x: f64, y: f64) {
				<$ty>::move_to(self, x, y);
			}

			fn line_to(&mut self, x: f64, y: f64) {
				<$ty>::line_to(self, x, y);
			}

			fn quadratic_curve_to(&mut self, cx: f64, cy: f64, x: f64, y: f64) {
				<$ty>::quadratic_curve_to(self, cx, cy, x, y);
			}

			fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) {
				<$ty>::bezier_curve_to(self, c1x, c1y, c2x, c2y, x, y);
			}

			fn arc(&mut self, x: f64, y: f64, radius: f64, start: f64, end: f64) {
				let _ = <$ty>::arc(self, x, y, radius.max(0.0), start, end);
			}

			fn close_path(&mut self) {
				<$ty>::close_path(self);
			}

			fn fill(&mut self) {
				<$ty>::fill(self);
			}

			fn stroke(&mut self) {
				<$ty>::stroke(self);
			}

			fn set_fill_style(&mut self, color: &str) {
				<$ty>::set_fill_style_str(self, color);
			}

			fn set_stroke_style(&mut self, color: &str) {
				<$ty>::set_stroke_style_str(self, color);
			}

			fn set_line_width(&mut self, width: f64) {
				<$ty>::set_line_width(self, width);
			}

			fn set_line_dash(&mut self, segments: &[f64]) {
				let _ = <$ty>::set_line_dash(self, &dash_array(segments));
			}

			fn set_global_alpha(&mut self, alpha: f64) {
				<$ty>::set_global_alpha(self, alpha);
			}

			fn set_shadow(&mut self, blur: f64, color: &str) {
				<$ty>::set_shadow_blur(self, blur);
				<$ty>::set_shadow_color(self, color);
			}

			fn set_font(&mut self, font: &str) {
				<$ty>::set_font(self, font);
			}

			fn set_text_align(&mut self, align: TextAlign) {
				<$ty>::set_text_align(self, align.as_str());
			}

			fn set_text_baseline(&mut self, baseline: TextBaseline) {
				<$ty>::set_text_baseline(self, baseline.as_str());
			}

			fn fill_text(&mut self, text: &str, x: f64, y: f64) {
				let _ = <$ty>::fill_text(self, text, x, y);
			}

			fn measure_text(&mut self, text: &str) -> f64 {
				<$ty>::measure_text(self, text).map_or(0.0, |m| m.width())
			}

			fn draw_offscreen(&mut self, image: &OffscreenCanvas, dest: Rect) {
				let _ = <$ty>::draw_image_with_offscreen_canvas_and_dw_and_dh(
					self,
					image,
					dest.x,
					dest.y,
					dest.width,
					dest.height,
				);
			}
		}
	};
}

impl_canvas2d!(CanvasRenderingContext2d);
impl_canvas2d!(OffscreenCanvasRenderingContext2d);

/// Node raster backed by an `OffscreenCanvas`.
pub struct OffscreenSurface {
	canvas: OffscreenCanvas,
	ctx: OffscreenCanvasRenderingContext2d,
}

impl Surface for OffscreenSurface {
	fn width(&self) -> u32 {
		self.canvas.width()
	}

	fn height(&self) -> u32 {
		self.canvas.height()
	}

	fn context(&mut self) -> &mut dyn Canvas2d {
		&mut self.ctx
	}

	fn blit(&self, target: &mut dyn Canvas2d, dest: Rect) {
		target.draw_offscreen(&self.canvas, dest);
	}
}

pub struct OffscreenSurfaceFactory;

impl SurfaceFactory for OffscreenSurfaceFactory {
	fn create(&self, width: u32, height: u32) -> Result<Box<dyn Surface>, RenderError> {
		let canvas = OffscreenCanvas::new(width, height)
			.map_err(|e| RenderError::SurfaceCreation(RenderError::from(e).to_string()))?;
		let ctx = canvas
			.get_context("2d")?
			.ok_or(RenderError::ContextUnavailable)?
			.dyn_into::<OffscreenCanvasRenderingContext2d>()
			.map_err(|_| RenderError::ContextUnavailable)?;
		Ok(Box::new(OffscreenSurface { canvas, ctx }))
	}
}

/// Offscreen canvases where the browser has them. Without them there is no
/// raster to cache into, and the host should draw nodes directly.
pub fn detect_surface_factory() -> Option<Box<dyn SurfaceFactory>> {
	let supported = js_sys::Reflect::has(&js_sys::global(), &JsValue::from_str("OffscreenCanvas"))
		.unwrap_or(false);
	if supported {
		info!("node cache using OffscreenCanvas surfaces");
		Some(Box::new(OffscreenSurfaceFactory))
	} else {
		warn!("OffscreenCanvas unavailable; node cache disabled");
		None
	}
}

/// The on-screen canvas and its 2D context.
pub struct WebCanvas {
	canvas: HtmlCanvasElement,
	ctx: CanvasRenderingContext2d,
}

impl WebCanvas {
	/// Fails with [`RenderError::ContextUnavailable`] when no 2D context can be had.
	pub fn new(canvas: HtmlCanvasElement) -> Result<Self, RenderError> {
		let ctx = canvas
			.get_context("2d")?
			.ok_or(RenderError::ContextUnavailable)?
			.dyn_into::<CanvasRenderingContext2d>()
			.map_err(|_| RenderError::ContextUnavailable)?;
		Ok(Self { canvas, ctx })
	}

	pub fn element(&self) -> &HtmlCanvasElement {
		&self.canvas
	}

	pub fn context(&mut self) -> &mut dyn Canvas2d {
		&mut self.ctx
	}

	/// Sizes the backing store to `css × dpr` device pixels while keeping the
	/// element's layout size in CSS pixels.
	pub fn resize(&self, css_width: f64, css_height: f64, device_pixel_ratio: f64) {
		self.canvas
			.set_width((css_width * device_pixel_ratio).round().max(1.0) as u32);
		self.canvas
			.set_height((css_height * device_pixel_ratio).round().max(1.0) as u32);
		let style = self.canvas.style();
		let _ = style.set_property("width", &format!("{css_width}px"));
		let _ = style.set_property("height", &format!("{css_height}px"));
	}
}

/// `requestAnimationFrame` on the window, timed by `performance.now()`.
pub struct RafFrameSource {
	window: Window,
	performance: Option<Performance>,
}

impl RafFrameSource {
	pub fn new() -> Result<Self, RenderError> {
		let window = web_sys::window().ok_or(RenderError::ContextUnavailable)?;
		let performance = window.performance();
		Ok(Self {
			window,
			performance,
		})
	}
}

impl FrameSource for RafFrameSource {
	fn now(&self) -> f64 {
		self.performance
			.as_ref()
			.map_or_else(js_sys::Date::now, Performance::now)
	}

	fn request_frame(&self, callback: FrameCallback) -> Option<FrameHandle> {
		let closure = Closure::once_into_js(move |timestamp: f64| callback(timestamp));
		self.window
			.request_animation_frame(closure.unchecked_ref())
			.map(|id| FrameHandle(i64::from(id)))
			.ok()
	}

	fn cancel_frame(&self, handle: FrameHandle) {
		if let Ok(id) = i32::try_from(handle.0) {
			let _ = self.window.cancel_animation_frame(id);
		}
	}
}

use std::fmt;

use wasm_bindgen::JsValue;

/// Failures surfaced by the drawing surfaces.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
	/// The canvas refused to hand out a 2D context. Nothing can render without one.
	ContextUnavailable,
	/// An offscreen raster for the node cache could not be allocated.
	SurfaceCreation(String),
	/// Any other exception thrown by a canvas call.
	Js(String),
}

impl fmt::Display for RenderError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RenderError::ContextUnavailable => write!(f, "2d canvas context is unavailable"),
			RenderError::SurfaceCreation(msg) => write!(f, "failed to create offscreen surface: {msg}"),
			RenderError::Js(msg) => write!(f, "canvas call failed: {msg}"),
		}
	}
}

impl std::error::Error for RenderError {}

impl From<JsValue> for RenderError {
	fn from(value: JsValue) -> Self {
		RenderError::Js(value.as_string().unwrap_or_else(|| format!("{value:?}")))
	}
}

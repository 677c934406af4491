//! Immutable configuration tables handed to the renderer at construction.
//!
//! Every table has serde defaults, so a host can override any subset from JSON
//! and several renderers with different styles can live side by side.

use serde::{Deserialize, Serialize};

use super::types::{ConnectionType, NodeType};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
	pub viewport: ViewportConfig,
	pub render_loop: LoopConfig,
	pub spatial: SpatialConfig,
	pub cache: CacheConfig,
	pub hit_test: HitTestConfig,
	pub grid: GridStyle,
	pub nodes: NodeStyle,
	pub connections: ConnectionStyle,
	pub overlay: OverlayStyle,
	pub background: String,
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			viewport: ViewportConfig::default(),
			render_loop: LoopConfig::default(),
			spatial: SpatialConfig::default(),
			cache: CacheConfig::default(),
			hit_test: HitTestConfig::default(),
			grid: GridStyle::default(),
			nodes: NodeStyle::default(),
			connections: ConnectionStyle::default(),
			overlay: OverlayStyle::default(),
			background: "#0f172a".into(),
		}
	}
}

impl RenderConfig {
	/// Parses a (possibly partial) JSON override on top of the defaults.
	/// Out-of-range numbers are replaced, see [`RenderConfig::normalized`].
	pub fn from_json(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json).map(Self::normalized)
	}

	/// Replaces values the renderer cannot work with (non-finite numbers,
	/// non-positive sizes, an inverted zoom range) by their defaults.
	pub fn normalized(mut self) -> Self {
		self.viewport = self.viewport.normalized();
		self.render_loop = self.render_loop.normalized();
		self.spatial = self.spatial.normalized();
		self.cache = self.cache.normalized();
		self.hit_test = self.hit_test.normalized();
		self.nodes.shadow_blur = non_negative(self.nodes.shadow_blur, NodeStyle::default().shadow_blur);
		// Cached rasters must hold the whole shadow.
		self.cache.padding = self.cache.padding.max(self.nodes.shadow_blur);
		self
	}
}

fn positive(value: f64, default: f64) -> f64 {
	if value.is_finite() && value > 0.0 { value } else { default }
}

fn non_negative(value: f64, default: f64) -> f64 {
	if value.is_finite() && value >= 0.0 { value } else { default }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportConfig {
	pub min_zoom: f64,
	pub max_zoom: f64,
	/// Discrete levels used by zoom stepping, ascending.
	pub zoom_levels: Vec<f64>,
	/// Relative distance within which `snap_zoom` pulls onto a level.
	pub zoom_snap_tolerance: f64,
	pub animation_duration_ms: f64,
	pub pan_history_window_ms: f64,
	/// Velocity multiplier applied once per 60 Hz frame while coasting.
	pub inertia_friction: f64,
	/// Release speed (px per frame) needed to start coasting.
	pub inertia_min_speed: f64,
	/// Coasting stops below this speed (px per frame).
	pub inertia_stop_speed: f64,
	/// Zoom multiplier per wheel notch.
	pub wheel_zoom_factor: f64,
}

impl Default for ViewportConfig {
	fn default() -> Self {
		Self {
			min_zoom: 0.015,
			max_zoom: 256.0,
			zoom_levels: vec![
				0.015625, 0.03125, 0.0625, 0.125, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0, 6.0, 8.0,
				16.0, 32.0, 64.0, 128.0, 256.0,
			],
			zoom_snap_tolerance: 0.05,
			animation_duration_ms: 250.0,
			pan_history_window_ms: 100.0,
			inertia_friction: 0.92,
			inertia_min_speed: 0.5,
			inertia_stop_speed: 0.05,
			wheel_zoom_factor: 1.1,
		}
	}
}

impl ViewportConfig {
	/// Keeps `min_zoom <= max_zoom` (swapping an inverted pair), drops unusable
	/// zoom levels and sorts the rest, and resets invalid motion constants.
	pub fn normalized(mut self) -> Self {
		let defaults = Self::default();
		self.min_zoom = positive(self.min_zoom, defaults.min_zoom);
		self.max_zoom = positive(self.max_zoom, defaults.max_zoom);
		if self.min_zoom > self.max_zoom {
			std::mem::swap(&mut self.min_zoom, &mut self.max_zoom);
		}
		self.zoom_levels
			.retain(|level| level.is_finite() && *level > 0.0);
		self.zoom_levels.sort_by(f64::total_cmp);
		self.zoom_levels.dedup();
		self.zoom_snap_tolerance = non_negative(self.zoom_snap_tolerance, defaults.zoom_snap_tolerance);
		self.animation_duration_ms = non_negative(self.animation_duration_ms, defaults.animation_duration_ms);
		self.pan_history_window_ms = non_negative(self.pan_history_window_ms, defaults.pan_history_window_ms);
		// Friction of 1 or more would coast forever.
		if !(self.inertia_friction.is_finite() && (0.0..1.0).contains(&self.inertia_friction)) {
			self.inertia_friction = defaults.inertia_friction;
		}
		self.inertia_min_speed = non_negative(self.inertia_min_speed, defaults.inertia_min_speed);
		self.inertia_stop_speed = positive(self.inertia_stop_speed, defaults.inertia_stop_speed);
		self.wheel_zoom_factor = positive(self.wheel_zoom_factor, defaults.wheel_zoom_factor);
		self
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoopConfig {
	pub target_frame_ms: f64,
	/// Deferred work only starts while more than this much budget remains.
	pub safety_margin_ms: f64,
	pub history_len: usize,
	pub stats_interval_ms: f64,
}

impl Default for LoopConfig {
	fn default() -> Self {
		Self {
			target_frame_ms: 1000.0 / 60.0,
			safety_margin_ms: 2.0,
			history_len: 60,
			stats_interval_ms: 1000.0,
		}
	}
}

impl LoopConfig {
	pub fn normalized(mut self) -> Self {
		let defaults = Self::default();
		self.target_frame_ms = positive(self.target_frame_ms, defaults.target_frame_ms);
		self.safety_margin_ms = non_negative(self.safety_margin_ms, defaults.safety_margin_ms);
		self.history_len = self.history_len.max(1);
		self.stats_interval_ms = positive(self.stats_interval_ms, defaults.stats_interval_ms);
		self
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpatialConfig {
	pub cell_size: f64,
	/// Share of changed nodes above which a frame rebuilds instead of patching.
	pub rebuild_ratio: f64,
}

impl Default for SpatialConfig {
	fn default() -> Self {
		Self {
			cell_size: 200.0,
			rebuild_ratio: 0.5,
		}
	}
}

impl SpatialConfig {
	pub fn normalized(mut self) -> Self {
		let defaults = Self::default();
		self.cell_size = positive(self.cell_size, defaults.cell_size);
		self.rebuild_ratio = non_negative(self.rebuild_ratio, defaults.rebuild_ratio);
		self
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
	pub enabled: bool,
	pub capacity: usize,
	/// World units reserved around a node for shadow and glow.
	pub padding: f64,
	/// Relative scale change a cached raster tolerates before re-rendering.
	pub scale_tolerance: f64,
	/// Above this raster scale nodes are drawn directly.
	pub max_scale: f64,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			capacity: 200,
			padding: 12.0,
			scale_tolerance: 0.05,
			max_scale: 4.0,
		}
	}
}

impl CacheConfig {
	pub fn normalized(mut self) -> Self {
		let defaults = Self::default();
		self.padding = non_negative(self.padding, defaults.padding);
		self.scale_tolerance = non_negative(self.scale_tolerance, defaults.scale_tolerance);
		self.max_scale = positive(self.max_scale, defaults.max_scale);
		self
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HitTestConfig {
	/// Screen-space distance for connection hits.
	pub connection_threshold_px: f64,
	pub connection_samples: usize,
	/// World-space radius for port hits.
	pub port_radius: f64,
}

impl Default for HitTestConfig {
	fn default() -> Self {
		Self {
			connection_threshold_px: 8.0,
			connection_samples: 20,
			port_radius: 10.0,
		}
	}
}

impl HitTestConfig {
	pub fn normalized(mut self) -> Self {
		let defaults = Self::default();
		self.connection_threshold_px = non_negative(self.connection_threshold_px, defaults.connection_threshold_px);
		self.connection_samples = self.connection_samples.max(1);
		self.port_radius = non_negative(self.port_radius, defaults.port_radius);
		self
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GridKind {
	Dots,
	Lines,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridStyle {
	pub kind: GridKind,
	/// World spacing of the minor grid.
	pub spacing: f64,
	/// Every n-th minor line is a major line.
	pub major_every: u32,
	/// Below this zoom no grid is drawn at all.
	pub min_zoom: f64,
	/// A grid level starts fading in when its screen spacing exceeds this many px...
	pub fade_start_px: f64,
	/// ...and is fully opaque from here on.
	pub fade_end_px: f64,
	pub minor_color: String,
	pub major_color: String,
}

impl Default for GridStyle {
	fn default() -> Self {
		Self {
			kind: GridKind::Dots,
			spacing: 20.0,
			major_every: 5,
			min_zoom: 0.1,
			fade_start_px: 6.0,
			fade_end_px: 14.0,
			minor_color: "rgba(148, 163, 184, 0.25)".into(),
			major_color: "rgba(148, 163, 184, 0.45)".into(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeColors {
	pub dialogue: String,
	pub dialogue_fragment: String,
	pub branch: String,
	pub condition: String,
	pub instruction: String,
	pub hub: String,
	pub jump: String,
	pub flow_fragment: String,
}

impl Default for TypeColors {
	fn default() -> Self {
		Self {
			dialogue: "#3b82f6".into(),
			dialogue_fragment: "#3b82f6".into(),
			branch: "#f59e0b".into(),
			condition: "#10b981".into(),
			instruction: "#8b5cf6".into(),
			hub: "#06b6d4".into(),
			jump: "#8b5cf6".into(),
			flow_fragment: "#6366f1".into(),
		}
	}
}

impl TypeColors {
	pub fn for_type(&self, node_type: NodeType) -> &str {
		match node_type {
			NodeType::Dialogue => &self.dialogue,
			NodeType::DialogueFragment => &self.dialogue_fragment,
			NodeType::Branch => &self.branch,
			NodeType::Condition => &self.condition,
			NodeType::Instruction => &self.instruction,
			NodeType::Hub => &self.hub,
			NodeType::Jump => &self.jump,
			NodeType::FlowFragment => &self.flow_fragment,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeStyle {
	pub type_colors: TypeColors,
	pub body_color: String,
	pub border_color: String,
	pub text_color: String,
	pub muted_text_color: String,
	pub header_height: f64,
	pub corner_radius: f64,
	pub border_width: f64,
	pub font_family: String,
	pub title_font_size: f64,
	pub body_font_size: f64,
	pub line_height: f64,
	pub content_padding: f64,
	pub shadow_color: String,
	/// Shadow blur in world units.
	pub shadow_blur: f64,
	pub port_radius: f64,
	pub port_color: String,
	pub port_connected_color: String,
	pub selected_color: String,
	pub hover_color: String,
	/// Below this zoom nodes are drawn as plain boxes without text or ports.
	pub detail_min_zoom: f64,
}

impl Default for NodeStyle {
	fn default() -> Self {
		Self {
			type_colors: TypeColors::default(),
			body_color: "#1e293b".into(),
			border_color: "#334155".into(),
			text_color: "#e2e8f0".into(),
			muted_text_color: "#94a3b8".into(),
			header_height: 28.0,
			corner_radius: 6.0,
			border_width: 1.0,
			font_family: "sans-serif".into(),
			title_font_size: 12.0,
			body_font_size: 11.0,
			line_height: 15.0,
			content_padding: 8.0,
			shadow_color: "rgba(0, 0, 0, 0.45)".into(),
			shadow_blur: 8.0,
			port_radius: 5.0,
			port_color: "#64748b".into(),
			port_connected_color: "#e2e8f0".into(),
			selected_color: "#fbbf24".into(),
			hover_color: "rgba(255, 255, 255, 0.5)".into(),
			detail_min_zoom: 0.35,
		}
	}
}

impl NodeStyle {
	pub fn font(&self, size: f64) -> String {
		format!("{}px {}", size, self.font_family)
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionStyle {
	pub flow_color: String,
	pub data_color: String,
	pub selected_color: String,
	pub hover_color: String,
	/// Screen-space stroke width.
	pub width: f64,
	/// Horizontal control-point offset as a share of horizontal distance.
	pub curvature: f64,
	pub min_control_offset: f64,
	pub max_control_offset: f64,
	/// Screen-space arrowhead length.
	pub arrow_size: f64,
	pub data_dash: Vec<f64>,
	pub label_color: String,
	pub preview_color: String,
	pub preview_valid_color: String,
	pub preview_invalid_color: String,
}

impl Default for ConnectionStyle {
	fn default() -> Self {
		Self {
			flow_color: "rgba(100, 180, 255, 0.8)".into(),
			data_color: "rgba(16, 185, 129, 0.8)".into(),
			selected_color: "#fbbf24".into(),
			hover_color: "rgba(255, 255, 255, 0.9)".into(),
			width: 2.0,
			curvature: 0.5,
			min_control_offset: 30.0,
			max_control_offset: 150.0,
			arrow_size: 10.0,
			data_dash: vec![8.0, 4.0],
			label_color: "#cbd5e1".into(),
			preview_color: "rgba(148, 163, 184, 0.9)".into(),
			preview_valid_color: "#22c55e".into(),
			preview_invalid_color: "#ef4444".into(),
		}
	}
}

impl ConnectionStyle {
	pub fn color_for(&self, connection_type: ConnectionType) -> &str {
		match connection_type {
			ConnectionType::Flow => &self.flow_color,
			ConnectionType::Data => &self.data_color,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayStyle {
	pub selection_fill: String,
	pub selection_stroke: String,
	pub guide_color: String,
}

impl Default for OverlayStyle {
	fn default() -> Self {
		Self {
			selection_fill: "rgba(59, 130, 246, 0.12)".into(),
			selection_stroke: "rgba(59, 130, 246, 0.8)".into(),
			guide_color: "rgba(244, 114, 182, 0.9)".into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_json_keeps_defaults() {
		let config = RenderConfig::from_json(
			r#"{"viewport": {"maxZoom": 8}, "cache": {"capacity": 16}, "grid": {"kind": "lines"}}"#,
		)
		.expect("config should parse");
		assert_eq!(config.viewport.max_zoom, 8.0);
		assert_eq!(config.viewport.min_zoom, ViewportConfig::default().min_zoom);
		assert_eq!(config.cache.capacity, 16);
		assert_eq!(config.grid.kind, GridKind::Lines);
		assert_eq!(config.spatial.cell_size, 200.0);
	}

	#[test]
	fn inverted_zoom_range_is_swapped() {
		let config = RenderConfig::from_json(r#"{"viewport": {"maxZoom": 0.01}}"#).expect("config should parse");
		assert_eq!(config.viewport.min_zoom, 0.01);
		assert_eq!(config.viewport.max_zoom, 0.015);
	}

	#[test]
	fn unusable_numbers_fall_back_to_defaults() {
		let config = RenderConfig::from_json(
			r#"{
				"viewport": {"minZoom": -1, "maxZoom": 0, "zoomLevels": [4, -2, 0.5, 4], "inertiaFriction": 1.5},
				"spatial": {"cellSize": 0},
				"cache": {"maxScale": -3},
				"hitTest": {"connectionSamples": 0}
			}"#,
		)
		.expect("config should parse");
		let defaults = RenderConfig::default();
		assert_eq!(config.viewport.min_zoom, defaults.viewport.min_zoom);
		assert_eq!(config.viewport.max_zoom, defaults.viewport.max_zoom);
		assert_eq!(config.viewport.zoom_levels, vec![0.5, 4.0]);
		assert_eq!(config.viewport.inertia_friction, defaults.viewport.inertia_friction);
		assert_eq!(config.spatial.cell_size, 200.0);
		assert_eq!(config.cache.max_scale, defaults.cache.max_scale);
		assert_eq!(config.hit_test.connection_samples, 1);
	}

	#[test]
	fn cache_padding_covers_node_shadow() {
		let config = RenderConfig::from_json(r#"{"cache": {"padding": 2}, "nodes": {"shadowBlur": 30}}"#)
			.expect("config should parse");
		assert_eq!(config.cache.padding, 30.0);
		assert_eq!(RenderConfig::default().normalized().cache.padding, 12.0);
	}

	#[test]
	fn non_finite_values_are_replaced() {
		let mut viewport = ViewportConfig {
			min_zoom: f64::NAN,
			max_zoom: f64::INFINITY,
			..ViewportConfig::default()
		};
		viewport.zoom_levels.push(f64::NAN);
		let viewport = viewport.normalized();
		assert_eq!(viewport.min_zoom, 0.015);
		assert_eq!(viewport.max_zoom, 256.0);
		assert!(viewport.zoom_levels.iter().all(|l| l.is_finite()));
		let spatial = SpatialConfig {
			cell_size: f64::NAN,
			..SpatialConfig::default()
		}
		.normalized();
		assert_eq!(spatial.cell_size, 200.0);
	}

	#[test]
	fn every_node_type_has_an_accent() {
		let colors = TypeColors::default();
		assert_eq!(colors.for_type(NodeType::Branch), "#f59e0b");
		assert_eq!(colors.for_type(NodeType::Hub), "#06b6d4");
	}
}

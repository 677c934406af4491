//! Per-frame orchestration and hit-testing.
//!
//! [`GraphRenderer`] owns the viewport, spatial index and node cache. Each
//! [`GraphRenderer::render`] call takes a full graph snapshot and draws it back
//! to front: background, grid, connections, connection preview, nodes, overlays.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use log::{info, warn};

use super::connection_render::{
	ConnectionPreview, LinkState, curve_between, curve_hit, draw_connection, draw_preview,
};
use super::geometry::{Rect, Transform2d, distance, smoothstep};
use super::node_cache::NodeCache;
use super::node_render::{
	ConnectedPorts, draw_hover_ring, draw_node, draw_node_simplified, draw_selection_outline,
	port_position,
};
use super::spatial_index::SpatialIndex;
use super::style::{GridKind, GridStyle, RenderConfig};
use super::surface::{Canvas2d, SurfaceFactory};
use super::types::{Connection, Node, PortSide, Position};
use super::viewport::Viewport;

/// Alignment guide line in world space, shown while dragging.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Guide {
	Vertical(f64),
	Horizontal(f64),
}

/// A port found by [`GraphRenderer::hit_test_port`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortHit {
	pub node_id: String,
	pub side: PortSide,
	pub index: usize,
}

/// What one frame drew.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSummary {
	pub visible_nodes: usize,
	pub visible_connections: usize,
	pub skipped_connections: usize,
	pub cache_hits: u64,
	pub cache_misses: u64,
	/// False when the zoom is below the detail threshold.
	pub detailed: bool,
}

pub struct GraphRenderer {
	config: RenderConfig,
	viewport: Viewport,
	index: SpatialIndex,
	cache: NodeCache,
	fingerprints: HashMap<String, u64>,
	selected_nodes: HashSet<String>,
	selected_connections: HashSet<String>,
	hovered_node: Option<String>,
	hovered_connection: Option<String>,
	preview: Option<ConnectionPreview>,
	selection_box: Option<Rect>,
	guides: Vec<Guide>,
	// Ids already reported, so a bad entity logs once rather than every frame.
	warned: HashSet<String>,
}

impl GraphRenderer {
	pub fn new(config: RenderConfig, factory: Box<dyn SurfaceFactory>) -> Self {
		let config = config.normalized();
		let viewport = Viewport::new(config.viewport.clone(), 0.0, 0.0);
		let index = SpatialIndex::new(config.spatial.cell_size);
		let cache = NodeCache::new(config.cache.clone(), factory);
		Self {
			config,
			viewport,
			index,
			cache,
			fingerprints: HashMap::new(),
			selected_nodes: HashSet::new(),
			selected_connections: HashSet::new(),
			hovered_node: None,
			hovered_connection: None,
			preview: None,
			selection_box: None,
			guides: Vec::new(),
			warned: HashSet::new(),
		}
	}

	pub fn config(&self) -> &RenderConfig {
		&self.config
	}

	pub fn viewport(&self) -> &Viewport {
		&self.viewport
	}

	pub fn viewport_mut(&mut self) -> &mut Viewport {
		&mut self.viewport
	}

	pub fn cache(&self) -> &NodeCache {
		&self.cache
	}

	/// Call whenever the canvas' CSS size or the device pixel ratio changes.
	pub fn resize(&mut self, width: f64, height: f64, device_pixel_ratio: f64) {
		self.viewport.resize(width, height, device_pixel_ratio);
		info!(
			"renderer resized to {width}x{height} css px at dpr {}",
			self.viewport.device_pixel_ratio()
		);
	}

	pub fn set_selection<'a>(
		&mut self,
		nodes: impl IntoIterator<Item = &'a str>,
		connections: impl IntoIterator<Item = &'a str>,
	) {
		self.selected_nodes = nodes.into_iter().map(String::from).collect();
		self.selected_connections = connections.into_iter().map(String::from).collect();
	}

	pub fn selected_nodes(&self) -> &HashSet<String> {
		&self.selected_nodes
	}

	pub fn is_selected(&self, node_id: &str) -> bool {
		self.selected_nodes.contains(node_id)
	}

	pub fn set_hovered_node(&mut self, id: Option<String>) {
		self.hovered_node = id;
	}

	pub fn set_hovered_connection(&mut self, id: Option<String>) {
		self.hovered_connection = id;
	}

	pub fn set_preview(&mut self, preview: Option<ConnectionPreview>) {
		self.preview = preview;
	}

	/// Marquee rectangle in world space.
	pub fn set_selection_box(&mut self, rect: Option<Rect>) {
		self.selection_box = rect;
	}

	pub fn set_guides(&mut self, guides: Vec<Guide>) {
		self.guides = guides;
	}

	/// Drops every cached raster, e.g. after a style change.
	pub fn clear_cache(&mut self) {
		self.cache.clear();
	}

	pub fn render(&mut self, ctx: &mut dyn Canvas2d, nodes: &[Node], connections: &[Connection]) -> FrameSummary {
		let dpr = self.viewport.device_pixel_ratio();
		let zoom = self.viewport.zoom();
		let visible = self.viewport.visible_bounds();
		let mut summary = FrameSummary {
			detailed: zoom >= self.config.nodes.detail_min_zoom,
			..FrameSummary::default()
		};

		ctx.set_transform(Transform2d::IDENTITY);
		let backing = Rect::new(
			0.0,
			0.0,
			self.viewport.width() * dpr,
			self.viewport.height() * dpr,
		);
		ctx.clear_rect(backing);
		ctx.set_fill_style(&self.config.background);
		ctx.fill_rect(backing);
		ctx.set_transform(self.viewport.combined_transform());

		self.index.sync(nodes, self.config.spatial.rebuild_ratio);
		for node in nodes.iter().filter(|n| !n.has_valid_geometry()) {
			if self.warned.insert(format!("node:{}", node.id)) {
				warn!("skipping node {} with invalid geometry {:?}", node.id, node.size);
			}
		}

		let visible_nodes: Vec<&Node> = self
			.index
			.query_slots(visible)
			.into_iter()
			.filter_map(|slot| nodes.get(slot))
			.filter(|n| n.bounds().intersects(&visible))
			.collect();
		summary.visible_nodes = visible_nodes.len();

		let by_id: HashMap<&str, &Node> = nodes
			.iter()
			.filter(|n| n.has_valid_geometry())
			.map(|n| (n.id.as_str(), n))
			.collect();
		let connected: ConnectedPorts<'_> = connections
			.iter()
			.flat_map(|c| {
				[
					(c.from_node_id.as_str(), PortSide::Output, c.from_port_index),
					(c.to_node_id.as_str(), PortSide::Input, c.to_port_index),
				]
			})
			.collect();

		draw_grid(ctx, visible, zoom, &self.config.grid);

		let arrow_margin = self.config.connections.arrow_size / zoom;
		for connection in connections {
			let (Some(from), Some(to)) = (
				by_id.get(connection.from_node_id.as_str()),
				by_id.get(connection.to_node_id.as_str()),
			) else {
				summary.skipped_connections += 1;
				if self.warned.insert(format!("connection:{}", connection.id)) {
					warn!(
						"skipping connection {}: endpoint {} -> {} not in snapshot",
						connection.id, connection.from_node_id, connection.to_node_id
					);
				}
				continue;
			};
			let curve = curve_between(connection, from, to, &self.config.nodes, &self.config.connections);
			if !curve.hull_bounds().expand(arrow_margin).intersects(&visible) {
				continue;
			}
			let state = if self.selected_connections.contains(&connection.id) {
				LinkState::Selected
			} else if self.hovered_connection.as_deref() == Some(connection.id.as_str()) {
				LinkState::Hovered
			} else {
				LinkState::Normal
			};
			draw_connection(ctx, &curve, connection, state, &self.config.connections, zoom);
			summary.visible_connections += 1;
		}

		if let Some(preview) = &self.preview {
			draw_preview(ctx, preview, &self.config.connections, zoom);
		}

		let (hits_before, misses_before) = self.cache.stats();
		let raster_scale = zoom * dpr;
		let use_cache = self.config.cache.enabled && raster_scale <= self.config.cache.max_scale;
		let style = &self.config.nodes;
		for node in &visible_nodes {
			if !summary.detailed {
				draw_node_simplified(ctx, node, style);
				continue;
			}
			if !use_cache {
				draw_node(ctx, node, style, &connected, raster_scale);
				continue;
			}

			let fingerprint = appearance_fingerprint(node, &connected);
			if let Some(previous) = self.fingerprints.insert(node.id.clone(), fingerprint)
				&& previous != fingerprint
			{
				self.cache.invalidate(&node.id);
			}
			let area = self.cache.blit_rect(node);
			match self
				.cache
				.get_or_create(node, raster_scale, |c| {
					draw_node(c, node, style, &connected, raster_scale)
				})
			{
				Ok(raster) => {
					let origin = Position::new(
						self.viewport.snap_to_pixel(area.x),
						self.viewport.snap_to_pixel(area.y),
					);
					raster.surface.blit(ctx, raster.dest(origin));
				}
				Err(err) => {
					if self.warned.insert(format!("cache:{}", node.id)) {
						warn!("drawing node {} uncached: {err}", node.id);
					}
					draw_node(ctx, node, style, &connected, raster_scale);
				}
			}
		}
		let (hits, misses) = self.cache.stats();
		summary.cache_hits = hits - hits_before;
		summary.cache_misses = misses - misses_before;

		if summary.detailed
			&& let Some(hovered) = self.hovered_node.as_deref()
			&& let Some(node) = visible_nodes.iter().find(|n| n.id == hovered)
		{
			draw_hover_ring(ctx, node, style, zoom);
		}
		for node in visible_nodes.iter().filter(|n| self.selected_nodes.contains(&n.id)) {
			draw_selection_outline(ctx, node, style, zoom);
		}
		self.draw_overlays(ctx, visible, zoom);

		let present: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
		self.cache.retain(&present);
		self.fingerprints.retain(|id, _| present.contains(id.as_str()));
		summary
	}

	fn draw_overlays(&self, ctx: &mut dyn Canvas2d, visible: Rect, zoom: f64) {
		let overlay = &self.config.overlay;
		if !self.guides.is_empty() {
			ctx.set_stroke_style(&overlay.guide_color);
			ctx.set_line_width(1.0 / zoom);
			ctx.set_line_dash(&[4.0 / zoom, 4.0 / zoom]);
			ctx.begin_path();
			for guide in &self.guides {
				match *guide {
					Guide::Vertical(x) => {
						ctx.move_to(x, visible.y);
						ctx.line_to(x, visible.max_y());
					}
					Guide::Horizontal(y) => {
						ctx.move_to(visible.x, y);
						ctx.line_to(visible.max_x(), y);
					}
				}
			}
			ctx.stroke();
			ctx.set_line_dash(&[]);
		}
		if let Some(rect) = self.selection_box {
			ctx.set_fill_style(&overlay.selection_fill);
			ctx.fill_rect(rect);
			ctx.set_stroke_style(&overlay.selection_stroke);
			ctx.set_line_width(1.0 / zoom);
			ctx.stroke_rect(rect);
		}
	}

	/// Topmost node whose box contains `world`. Later nodes in the snapshot are
	/// drawn on top, so the scan runs back to front.
	pub fn hit_test_node<'a>(&self, nodes: &'a [Node], world: Position) -> Option<&'a Node> {
		nodes
			.iter()
			.rev()
			.find(|n| n.has_valid_geometry() && n.bounds().contains(world))
	}

	/// Topmost connection passing within the configured screen distance of `world`.
	pub fn hit_test_connection<'a>(
		&self,
		nodes: &[Node],
		connections: &'a [Connection],
		world: Position,
	) -> Option<&'a Connection> {
		let threshold = self.config.hit_test.connection_threshold_px / self.viewport.zoom();
		let by_id: HashMap<&str, &Node> = nodes
			.iter()
			.filter(|n| n.has_valid_geometry())
			.map(|n| (n.id.as_str(), n))
			.collect();
		connections.iter().rev().find(|c| {
			let (Some(from), Some(to)) = (
				by_id.get(c.from_node_id.as_str()),
				by_id.get(c.to_node_id.as_str()),
			) else {
				return false;
			};
			let curve = curve_between(c, from, to, &self.config.nodes, &self.config.connections);
			curve_hit(&curve, world, threshold, self.config.hit_test.connection_samples)
		})
	}

	/// Port whose anchor lies within the hit radius of `world`, topmost node first.
	pub fn hit_test_port(&self, nodes: &[Node], world: Position) -> Option<PortHit> {
		let radius = self.config.hit_test.port_radius;
		nodes
			.iter()
			.rev()
			.filter(|n| n.has_valid_geometry() && n.bounds().expand(radius).contains(world))
			.find_map(|node| {
				[PortSide::Input, PortSide::Output]
					.into_iter()
					.find_map(|side| {
						node.ports(side).iter().find_map(|port| {
							let anchor = port_position(node, side, port.index, &self.config.nodes)?;
							(distance(anchor, world) <= radius).then(|| PortHit {
								node_id: node.id.clone(),
								side,
								index: port.index,
							})
						})
					})
			})
	}

	/// Every node whose box overlaps `rect`, in snapshot order. The rectangle may
	/// have negative extent (a marquee dragged up or left).
	pub fn get_nodes_in_box<'a>(&self, nodes: &'a [Node], rect: Rect) -> Vec<&'a Node> {
		let rect = Rect::from_corners(
			Position::new(rect.x, rect.y),
			Position::new(rect.max_x(), rect.max_y()),
		);
		nodes
			.iter()
			.filter(|n| n.has_valid_geometry() && n.bounds().intersects(&rect))
			.collect()
	}
}

/// Hash of everything that changes how a node looks in its cached raster.
/// Position is left out: rasters are position independent.
fn appearance_fingerprint(node: &Node, connected: &ConnectedPorts<'_>) -> u64 {
	let mut hasher = DefaultHasher::new();
	node.node_type.hash(&mut hasher);
	node.size.width.to_bits().hash(&mut hasher);
	node.size.height.to_bits().hash(&mut hasher);
	node.color.hash(&mut hasher);
	node.data.hash(&mut hasher);
	for side in [PortSide::Input, PortSide::Output] {
		for port in node.ports(side) {
			port.hash(&mut hasher);
			connected
				.contains(&(node.id.as_str(), side, port.index))
				.hash(&mut hasher);
		}
	}
	hasher.finish()
}

/// Draws the minor and major grid levels, each faded in by its on-screen
/// spacing. Returns how many levels were drawn.
fn draw_grid(ctx: &mut dyn Canvas2d, visible: Rect, zoom: f64, style: &GridStyle) -> usize {
	if zoom < style.min_zoom || style.spacing <= 0.0 {
		return 0;
	}
	let major = style.spacing * f64::from(style.major_every.max(1));
	let levels = [
		(style.spacing, style.minor_color.as_str(), 1.0),
		(major, style.major_color.as_str(), 1.5),
	];
	let mut drawn = 0;
	for (spacing, color, weight) in levels {
		let alpha = smoothstep(style.fade_start_px, style.fade_end_px, spacing * zoom);
		if alpha <= 0.0 {
			continue;
		}
		let (x0, x1) = (
			(visible.x / spacing).floor() as i64,
			(visible.max_x() / spacing).ceil() as i64,
		);
		let (y0, y1) = (
			(visible.y / spacing).floor() as i64,
			(visible.max_y() / spacing).ceil() as i64,
		);
		ctx.set_global_alpha(alpha);
		match style.kind {
			GridKind::Dots => {
				let size = weight * 1.5 / zoom;
				ctx.set_fill_style(color);
				for i in x0..=x1 {
					for j in y0..=y1 {
						let (x, y) = (i as f64 * spacing, j as f64 * spacing);
						ctx.fill_rect(Rect::new(x - size * 0.5, y - size * 0.5, size, size));
					}
				}
			}
			GridKind::Lines => {
				ctx.set_stroke_style(color);
				ctx.set_line_width(weight / zoom);
				ctx.begin_path();
				for i in x0..=x1 {
					let x = i as f64 * spacing;
					ctx.move_to(x, visible.y);
					ctx.line_to(x, visible.max_y());
				}
				for j in y0..=y1 {
					let y = j as f64 * spacing;
					ctx.move_to(visible.x, y);
					ctx.line_to(visible.max_x(), y);
				}
				ctx.stroke();
			}
		}
		drawn += 1;
	}
	ctx.set_global_alpha(1.0);
	drawn
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;
	use std::rc::Rc;

	use super::*;
	use crate::components::dialogue_graph::connection_render::PreviewValidity;
	use crate::components::dialogue_graph::error::RenderError;
	use crate::components::dialogue_graph::surface::{
		DisplayList, DrawCommand, PictureSurfaceFactory, Surface,
	};
	use crate::components::dialogue_graph::types::{
		ConnectionType, DialogueData, NodeData, NodeType, Port, Size,
	};

	fn ports(n: usize) -> Vec<Port> {
		(0..n)
			.map(|i| Port {
				id: format!("p{i}"),
				index: i,
				label: None,
			})
			.collect()
	}

	fn node(id: &str, x: f64, y: f64, w: f64, h: f64) -> Node {
		Node {
			id: id.into(),
			node_type: NodeType::Dialogue,
			position: Position::new(x, y),
			size: Size {
				width: w,
				height: h,
			},
			input_ports: ports(1),
			output_ports: ports(1),
			color: None,
			data: NodeData::Dialogue(DialogueData {
				speaker: Some(format!("Speaker {id}")),
				text: "Hello".into(),
				..DialogueData::default()
			}),
		}
	}

	fn link(id: &str, from: &str, to: &str) -> Connection {
		Connection {
			id: id.into(),
			from_node_id: from.into(),
			from_port_index: 0,
			to_node_id: to.into(),
			to_port_index: 0,
			connection_type: ConnectionType::Flow,
			label: None,
		}
	}

	fn renderer() -> GraphRenderer {
		let mut renderer = GraphRenderer::new(RenderConfig::default(), Box::new(PictureSurfaceFactory));
		renderer.resize(800.0, 600.0, 1.0);
		renderer
	}

	#[test]
	fn hit_test_node_uses_exact_box() {
		let r = renderer();
		let nodes = vec![node("a", 0.0, 0.0, 100.0, 50.0)];
		assert_eq!(
			r.hit_test_node(&nodes, Position::new(50.0, 25.0)).map(|n| n.id.as_str()),
			Some("a")
		);
		assert!(r.hit_test_node(&nodes, Position::new(150.0, 25.0)).is_none());
	}

	#[test]
	fn hit_test_prefers_topmost() {
		let r = renderer();
		let nodes = vec![node("below", 0.0, 0.0, 100.0, 100.0), node("above", 50.0, 50.0, 100.0, 100.0)];
		let hit = r.hit_test_node(&nodes, Position::new(75.0, 75.0));
		assert_eq!(hit.map(|n| n.id.as_str()), Some("above"));
	}

	#[test]
	fn nodes_in_box_accepts_reversed_drag() {
		let r = renderer();
		let nodes = vec![
			node("a", 0.0, 0.0, 100.0, 50.0),
			node("b", 300.0, 0.0, 100.0, 50.0),
			node("c", 0.0, 0.0, 0.0, 50.0),
		];
		let found = r.get_nodes_in_box(&nodes, Rect::new(250.0, 60.0, -200.0, -30.0));
		let ids: Vec<&str> = found.iter().map(|n| n.id.as_str()).collect();
		assert_eq!(ids, vec!["a"]);
	}

	#[test]
	fn offscreen_nodes_are_culled() {
		let mut r = renderer();
		let nodes = vec![node("near", 100.0, 100.0, 200.0, 100.0), node("far", 5000.0, 5000.0, 200.0, 100.0)];
		let mut ctx = DisplayList::new();
		let summary = r.render(&mut ctx, &nodes, &[]);
		assert_eq!(summary.visible_nodes, 1);
		let texts = ctx.texts();
		assert!(texts.contains(&"Speaker near"));
		assert!(!texts.contains(&"Speaker far"));
	}

	#[test]
	fn dangling_connection_is_skipped_alone() {
		let mut r = renderer();
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0), node("b", 400.0, 0.0, 200.0, 100.0)];
		let connections = vec![link("ok", "a", "b"), link("bad", "a", "ghost")];
		let mut ctx = DisplayList::new();
		let summary = r.render(&mut ctx, &nodes, &connections);
		assert_eq!(summary.visible_connections, 1);
		assert_eq!(summary.skipped_connections, 1);
		assert_eq!(summary.visible_nodes, 2);
	}

	#[test]
	fn unchanged_nodes_are_served_from_cache() {
		let mut r = renderer();
		let mut nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0)];
		let mut ctx = DisplayList::new();
		let first = r.render(&mut ctx, &nodes, &[]);
		assert_eq!((first.cache_hits, first.cache_misses), (0, 1));

		nodes[0].position = Position::new(40.0, 20.0);
		let moved = r.render(&mut ctx, &nodes, &[]);
		assert_eq!((moved.cache_hits, moved.cache_misses), (1, 0));

		nodes[0].data = NodeData::Dialogue(DialogueData {
			text: "Changed".into(),
			..DialogueData::default()
		});
		let edited = r.render(&mut ctx, &nodes, &[]);
		assert_eq!((edited.cache_hits, edited.cache_misses), (0, 1));
	}

	#[test]
	fn reused_raster_keeps_world_size_after_small_zoom() {
		let mut r = renderer();
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0)];
		r.render(&mut DisplayList::new(), &nodes, &[]);

		r.viewport_mut().set_zoom(1.04, Some(Position::new(0.0, 0.0)));
		let mut ctx = DisplayList::new();
		let summary = r.render(&mut ctx, &nodes, &[]);
		assert_eq!((summary.cache_hits, summary.cache_misses), (1, 0));
		// Blit scale times the raster's inner scale must be 1 in world space.
		let world_scale: f64 = ctx
			.commands()
			.iter()
			.filter_map(|c| match c {
				DrawCommand::Scale(sx, _) => Some(*sx),
				_ => None,
			})
			.product();
		assert!((world_scale - 1.0).abs() < 1e-9, "{world_scale}");
	}

	#[test]
	fn new_connection_invalidates_port_styling() {
		let mut r = renderer();
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0), node("b", 400.0, 0.0, 200.0, 100.0)];
		let mut ctx = DisplayList::new();
		r.render(&mut ctx, &nodes, &[]);
		let linked = r.render(&mut ctx, &nodes, &[link("c", "a", "b")]);
		assert_eq!(linked.cache_misses, 2);
	}

	#[test]
	fn cached_and_direct_rendering_draw_the_same_text() {
		let nodes = vec![node("a", 10.0, 10.0, 200.0, 100.0)];
		let mut cached = renderer();
		let mut cached_ctx = DisplayList::new();
		cached.render(&mut cached_ctx, &nodes, &[]);

		let mut config = RenderConfig::default();
		config.cache.enabled = false;
		let mut direct = GraphRenderer::new(config, Box::new(PictureSurfaceFactory));
		direct.resize(800.0, 600.0, 1.0);
		let mut direct_ctx = DisplayList::new();
		direct.render(&mut direct_ctx, &nodes, &[]);

		assert_eq!(cached_ctx.texts(), direct_ctx.texts());
	}

	struct CountingFactory(Rc<Cell<usize>>);

	impl SurfaceFactory for CountingFactory {
		fn create(&self, width: u32, height: u32) -> Result<Box<dyn Surface>, RenderError> {
			self.0.set(self.0.get() + 1);
			PictureSurfaceFactory.create(width, height)
		}
	}

	#[test]
	fn disabled_cache_never_allocates_surfaces() {
		let created = Rc::new(Cell::new(0));
		let mut config = RenderConfig::default();
		config.cache.enabled = false;
		let mut r = GraphRenderer::new(config, Box::new(CountingFactory(created.clone())));
		r.resize(800.0, 600.0, 1.0);
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0), node("b", 300.0, 0.0, 200.0, 100.0)];
		let mut ctx = DisplayList::new();
		let summary = r.render(&mut ctx, &nodes, &[]);
		assert_eq!(created.get(), 0);
		assert_eq!((summary.cache_hits, summary.cache_misses), (0, 0));
		assert!(r.cache().is_empty());
		assert!(ctx.texts().contains(&"Speaker b"));
	}

	#[test]
	fn low_zoom_draws_simplified_nodes_without_cache() {
		let mut r = renderer();
		r.viewport_mut().set_zoom(0.2, None);
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0)];
		let mut ctx = DisplayList::new();
		let summary = r.render(&mut ctx, &nodes, &[]);
		assert!(!summary.detailed);
		assert_eq!(summary.visible_nodes, 1);
		assert!(ctx.texts().is_empty());
		assert!(r.cache().is_empty());
	}

	struct FailingFactory;

	impl SurfaceFactory for FailingFactory {
		fn create(&self, _: u32, _: u32) -> Result<Box<dyn Surface>, RenderError> {
			Err(RenderError::SurfaceCreation("no memory".into()))
		}
	}

	#[test]
	fn surface_failure_falls_back_to_direct_drawing() {
		let mut r = GraphRenderer::new(RenderConfig::default(), Box::new(FailingFactory));
		r.resize(800.0, 600.0, 1.0);
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0)];
		let mut ctx = DisplayList::new();
		r.render(&mut ctx, &nodes, &[]);
		assert!(ctx.texts().contains(&"Speaker a"));
	}

	#[test]
	fn frame_starts_with_dpr_folded_transform() {
		let mut r = renderer();
		r.resize(400.0, 300.0, 2.0);
		r.viewport_mut().set_zoom(1.5, Some(Position::new(0.0, 0.0)));
		let mut ctx = DisplayList::new();
		r.render(&mut ctx, &[], &[]);
		let cmds = ctx.commands();
		assert!(matches!(cmds[0], DrawCommand::SetTransform(t) if t == Transform2d::IDENTITY));
		assert!(matches!(cmds[1], DrawCommand::ClearRect(rect) if rect == Rect::new(0.0, 0.0, 800.0, 600.0)));
		assert!(matches!(
			cmds[4],
			DrawCommand::SetTransform(t) if t == Transform2d::scale_translate(3.0, 0.0, 0.0)
		));
	}

	#[test]
	fn grid_fades_with_zoom() {
		let style = GridStyle::default();
		let visible = Rect::new(0.0, 0.0, 100.0, 100.0);
		let mut ctx = DisplayList::new();
		assert_eq!(draw_grid(&mut ctx, visible, 0.05, &style), 0);
		assert!(ctx.is_empty());
		assert_eq!(draw_grid(&mut ctx, visible, 0.2, &style), 1);
		assert_eq!(draw_grid(&mut ctx, visible, 1.0, &style), 2);

		let mut faded = DisplayList::new();
		draw_grid(&mut faded, visible, 0.5, &style);
		assert!(
			faded
				.commands()
				.iter()
				.any(|c| matches!(c, DrawCommand::GlobalAlpha(a) if *a > 0.0 && *a < 1.0))
		);
	}

	#[test]
	fn port_and_connection_hits() {
		let r = renderer();
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 128.0), node("b", 600.0, 0.0, 200.0, 128.0)];
		let connections = vec![link("c", "a", "b")];
		// Single ports sit halfway down the 100-unit body below the 28-unit header.
		let port = r.hit_test_port(&nodes, Position::new(203.0, 80.0));
		assert_eq!(
			port,
			Some(PortHit {
				node_id: "a".into(),
				side: PortSide::Output,
				index: 0,
			})
		);
		assert!(r.hit_test_port(&nodes, Position::new(100.0, 80.0)).is_none());

		let hit = r.hit_test_connection(&nodes, &connections, Position::new(400.0, 82.0));
		assert_eq!(hit.map(|c| c.id.as_str()), Some("c"));
		assert!(r.hit_test_connection(&nodes, &connections, Position::new(400.0, 200.0)).is_none());
	}

	#[test]
	fn overlays_follow_state() {
		let mut r = renderer();
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0)];
		r.set_selection(["a"], std::iter::empty());
		r.set_selection_box(Some(Rect::new(10.0, 10.0, 50.0, 50.0)));
		r.set_preview(Some(ConnectionPreview {
			from: Position::new(200.0, 64.0),
			to: Position::new(300.0, 200.0),
			validity: PreviewValidity::Valid,
		}));
		let mut ctx = DisplayList::new();
		r.render(&mut ctx, &nodes, &[]);
		let config = RenderConfig::default();
		let has_stroke = |color: &str| {
			ctx.commands()
				.iter()
				.any(|c| matches!(c, DrawCommand::StrokeStyle(s) if s == color))
		};
		assert!(has_stroke(&config.nodes.selected_color));
		assert!(has_stroke(&config.overlay.selection_stroke));
		assert!(has_stroke(&config.connections.preview_valid_color));
		assert!(matches!(ctx.commands().last(), Some(DrawCommand::StrokeRect(_))));
	}

	#[test]
	fn overlapping_nodes_draw_in_snapshot_order() {
		let mut r = renderer();
		let mut nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0), node("b", 50.0, 50.0, 200.0, 100.0)];
		let titles = |r: &mut GraphRenderer, nodes: &[Node]| {
			let mut ctx = DisplayList::new();
			r.render(&mut ctx, nodes, &[]);
			ctx.texts()
				.into_iter()
				.filter(|t| t.starts_with("Speaker"))
				.map(str::to_owned)
				.collect::<Vec<_>>()
		};
		assert_eq!(titles(&mut r, &nodes), ["Speaker a", "Speaker b"]);

		nodes.swap(0, 1);
		assert_eq!(titles(&mut r, &nodes), ["Speaker b", "Speaker a"]);
	}

	#[test]
	fn removed_nodes_leave_cache() {
		let mut r = renderer();
		let nodes = vec![node("a", 0.0, 0.0, 200.0, 100.0), node("b", 300.0, 0.0, 200.0, 100.0)];
		let mut ctx = DisplayList::new();
		r.render(&mut ctx, &nodes, &[]);
		assert_eq!(r.cache().len(), 2);
		r.render(&mut ctx, &nodes[..1], &[]);
		assert_eq!(r.cache().len(), 1);
	}
}

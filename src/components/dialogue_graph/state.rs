//! Interaction layer of the canvas host.
//!
//! Translates pointer, wheel and key input into viewport changes, selection,
//! node drags and new connections. It owns the host's copy of the graph
//! snapshot and hands it to [`GraphRenderer`] every frame. Nothing in here
//! touches the DOM, so the whole gesture flow is testable natively.

use std::collections::HashSet;

use log::debug;

use super::connection_render::{ConnectionPreview, PreviewValidity};
use super::geometry::Rect;
use super::node_render::anchor_position;
use super::render::{FrameSummary, GraphRenderer, Guide, PortHit};
use super::style::RenderConfig;
use super::surface::{Canvas2d, SurfaceFactory};
use super::types::{Connection, ConnectionType, DialogueGraph, Node, PortSide, Position};

/// Screen padding kept around the graph when fitting it into view.
pub const FIT_PADDING: f64 = 50.0;
/// Screen distance within which dragged node edges show alignment guides.
pub const GUIDE_TOLERANCE_PX: f64 = 6.0;

#[derive(Clone, Debug, PartialEq)]
enum Gesture {
	Idle,
	Panning {
		last: Position,
	},
	DraggingNodes {
		last_world: Position,
		ids: Vec<String>,
	},
	Marquee {
		start: Position,
		base: HashSet<String>,
	},
	Connecting {
		from: PortHit,
		target: Option<PortHit>,
	},
}

/// Follow-up work an input event asks of the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Response {
	/// The next frame must redraw.
	pub redraw: bool,
	/// The viewport started an animation or inertia that needs per-frame stepping.
	pub motion: bool,
	/// Hover should be re-evaluated at the pointer; cheap to postpone.
	pub hover: bool,
}

impl Response {
	fn redraw() -> Self {
		Self {
			redraw: true,
			..Self::default()
		}
	}

	fn motion(started: bool) -> Self {
		Self {
			redraw: true,
			motion: started,
			hover: false,
		}
	}
}

pub struct CanvasState {
	renderer: GraphRenderer,
	graph: DialogueGraph,
	gesture: Gesture,
	selected: HashSet<String>,
	selected_connection: Option<String>,
	hovered: Option<String>,
	hovered_connection: Option<String>,
	next_connection: u64,
}

impl CanvasState {
	pub fn new(config: RenderConfig, factory: Box<dyn SurfaceFactory>, graph: DialogueGraph) -> Self {
		Self {
			renderer: GraphRenderer::new(config, factory),
			graph,
			gesture: Gesture::Idle,
			selected: HashSet::new(),
			selected_connection: None,
			hovered: None,
			hovered_connection: None,
			next_connection: 0,
		}
	}

	/// Next `link-<n>` id not already present in the graph.
	fn unused_connection_id(&mut self) -> String {
		loop {
			self.next_connection += 1;
			let id = format!("link-{}", self.next_connection);
			if !self.graph.connections.iter().any(|c| c.id == id) {
				return id;
			}
		}
	}

	pub fn renderer(&self) -> &GraphRenderer {
		&self.renderer
	}

	pub fn renderer_mut(&mut self) -> &mut GraphRenderer {
		&mut self.renderer
	}

	pub fn graph(&self) -> &DialogueGraph {
		&self.graph
	}

	pub fn selected(&self) -> &HashSet<String> {
		&self.selected
	}

	pub fn hovered(&self) -> Option<&str> {
		self.hovered.as_deref()
	}

	/// Swaps in a new snapshot, dropping selection for nodes that disappeared.
	pub fn set_graph(&mut self, graph: DialogueGraph) {
		self.graph = graph;
		let present: HashSet<&str> = self.graph.nodes.iter().map(|n| n.id.as_str()).collect();
		self.selected.retain(|id| present.contains(id.as_str()));
		if self
			.hovered
			.as_deref()
			.is_some_and(|id| !present.contains(id))
		{
			self.hovered = None;
		}
		if let Some(id) = &self.selected_connection
			&& !self.graph.connections.iter().any(|c| &c.id == id)
		{
			self.selected_connection = None;
		}
		self.gesture = Gesture::Idle;
		self.sync_decorations();
	}

	/// Frames the whole graph immediately; used once the first size is known.
	pub fn fit_to_content(&mut self) -> bool {
		let Some(bounds) = self.graph.content_bounds() else {
			return false;
		};
		self.renderer.viewport_mut().fit_bounds(
			bounds.x,
			bounds.y,
			bounds.max_x(),
			bounds.max_y(),
			FIT_PADDING,
		)
	}

	pub fn render(&mut self, ctx: &mut dyn Canvas2d) -> FrameSummary {
		self.renderer
			.render(ctx, &self.graph.nodes, &self.graph.connections)
	}

	fn world(&self, screen: Position) -> Position {
		self.renderer.viewport().to_world_coords(screen)
	}

	fn sync_decorations(&mut self) {
		let connection = self.selected_connection.as_deref();
		self.renderer
			.set_selection(self.selected.iter().map(String::as_str), connection);
		self.renderer.set_hovered_node(self.hovered.clone());
	}

	pub fn pointer_down(&mut self, screen: Position, shift: bool) -> Response {
		let world = self.world(screen);
		self.renderer.viewport_mut().stop_motion();
		let nodes = &self.graph.nodes;

		if let Some(port) = self.renderer.hit_test_port(nodes, world)
			&& port.side == PortSide::Output
		{
			self.gesture = Gesture::Connecting {
				from: port,
				target: None,
			};
			self.update_preview(world);
			return Response::redraw();
		}

		if let Some(node) = self.renderer.hit_test_node(nodes, world) {
			let id = node.id.clone();
			self.selected_connection = None;
			if shift {
				if !self.selected.remove(&id) {
					self.selected.insert(id);
				}
			} else if !self.selected.contains(&id) {
				self.selected = HashSet::from([id]);
			}
			// Drag the selection in snapshot order so the topmost node leads.
			let ids: Vec<String> = nodes
				.iter()
				.filter(|n| self.selected.contains(&n.id))
				.map(|n| n.id.clone())
				.collect();
			self.gesture = Gesture::DraggingNodes {
				last_world: world,
				ids,
			};
			self.sync_decorations();
			return Response::redraw();
		}

		if shift {
			self.gesture = Gesture::Marquee {
				start: world,
				base: self.selected.clone(),
			};
			self.renderer
				.set_selection_box(Some(Rect::new(world.x, world.y, 0.0, 0.0)));
			return Response::redraw();
		}

		self.selected.clear();
		self.selected_connection = self
			.renderer
			.hit_test_connection(nodes, &self.graph.connections, world)
			.map(|c| c.id.clone());
		self.gesture = if self.selected_connection.is_some() {
			Gesture::Idle
		} else {
			Gesture::Panning { last: screen }
		};
		self.sync_decorations();
		Response::redraw()
	}

	pub fn pointer_move(&mut self, screen: Position, now: f64) -> Response {
		let world = self.world(screen);
		match &mut self.gesture {
			Gesture::Idle => Response {
				hover: true,
				..Response::default()
			},
			Gesture::Panning { last } => {
				let (dx, dy) = (screen.x - last.x, screen.y - last.y);
				*last = screen;
				self.renderer.viewport_mut().pan(dx, dy, now);
				Response::redraw()
			}
			Gesture::DraggingNodes { last_world, ids } => {
				let (dx, dy) = (world.x - last_world.x, world.y - last_world.y);
				*last_world = world;
				let ids = ids.clone();
				for id in &ids {
					if let Some(node) = self.graph.node_mut(id) {
						node.position.x += dx;
						node.position.y += dy;
					}
				}
				let guides = ids
					.last()
					.and_then(|lead| self.graph.node(lead))
					.map(|lead| {
						let tolerance = GUIDE_TOLERANCE_PX / self.renderer.viewport().zoom();
						alignment_guides(
							lead,
							self.graph.nodes.iter().filter(|n| !ids.contains(&n.id)),
							tolerance,
						)
					})
					.unwrap_or_default();
				self.renderer.set_guides(guides);
				Response::redraw()
			}
			Gesture::Marquee { start, base } => {
				let rect = Rect::from_corners(*start, world);
				let mut selected = base.clone();
				selected.extend(
					self.renderer
						.get_nodes_in_box(&self.graph.nodes, rect)
						.into_iter()
						.map(|n| n.id.clone()),
				);
				self.selected = selected;
				self.renderer.set_selection_box(Some(rect));
				self.sync_decorations();
				Response::redraw()
			}
			Gesture::Connecting { .. } => {
				self.update_preview(world);
				Response::redraw()
			}
		}
	}

	fn update_preview(&mut self, world: Position) {
		let Gesture::Connecting { from, target } = &mut self.gesture else {
			return;
		};
		let style = &self.renderer.config().nodes;
		let Some(from_node) = self.graph.node(&from.node_id) else {
			return;
		};
		let start = anchor_position(from_node, PortSide::Output, from.index, style);

		*target = self
			.renderer
			.hit_test_port(&self.graph.nodes, world)
			.filter(|hit| hit.side == PortSide::Input);
		let (end, validity) = match target {
			Some(hit) => {
				let valid = hit.node_id != from.node_id && !self.graph.input_taken(&hit.node_id, hit.index);
				let end = self
					.graph
					.node(&hit.node_id)
					.map_or(world, |n| anchor_position(n, PortSide::Input, hit.index, style));
				let validity = if valid {
					PreviewValidity::Valid
				} else {
					PreviewValidity::Invalid
				};
				(end, validity)
			}
			None => (world, PreviewValidity::Pending),
		};
		self.renderer.set_preview(Some(ConnectionPreview {
			from: start,
			to: end,
			validity,
		}));
	}

	pub fn pointer_up(&mut self, now: f64) -> Response {
		let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
		match gesture {
			Gesture::Idle => Response::default(),
			Gesture::Panning { .. } => Response::motion(self.renderer.viewport_mut().start_inertia(now)),
			Gesture::DraggingNodes { .. } => {
				self.renderer.set_guides(Vec::new());
				Response::redraw()
			}
			Gesture::Marquee { .. } => {
				self.renderer.set_selection_box(None);
				Response::redraw()
			}
			Gesture::Connecting { from, target } => {
				self.renderer.set_preview(None);
				if let Some(to) = target
					&& to.node_id != from.node_id
					&& !self.graph.input_taken(&to.node_id, to.index)
				{
					let id = self.unused_connection_id();
					let connection = Connection {
						id,
						from_node_id: from.node_id,
						from_port_index: from.index,
						to_node_id: to.node_id,
						to_port_index: to.index,
						connection_type: ConnectionType::Flow,
						label: None,
					};
					debug!("created connection {}", connection.id);
					self.graph.connections.push(connection);
				}
				Response::redraw()
			}
		}
	}

	/// Abandons the current gesture without side effects such as inertia or new links.
	pub fn pointer_leave(&mut self) -> Response {
		self.gesture = Gesture::Idle;
		self.renderer.set_preview(None);
		self.renderer.set_selection_box(None);
		self.renderer.set_guides(Vec::new());
		self.hovered = None;
		self.hovered_connection = None;
		self.renderer.set_hovered_node(None);
		self.renderer.set_hovered_connection(None);
		Response::redraw()
	}

	/// Re-evaluates what is under the pointer. Returns whether anything changed.
	pub fn hover_at(&mut self, screen: Position) -> bool {
		if self.gesture != Gesture::Idle {
			return false;
		}
		let world = self.world(screen);
		let node = self
			.renderer
			.hit_test_node(&self.graph.nodes, world)
			.map(|n| n.id.clone());
		let connection = if node.is_none() {
			self.renderer
				.hit_test_connection(&self.graph.nodes, &self.graph.connections, world)
				.map(|c| c.id.clone())
		} else {
			None
		};
		if node == self.hovered && connection == self.hovered_connection {
			return false;
		}
		self.hovered = node;
		self.hovered_connection = connection;
		self.renderer.set_hovered_node(self.hovered.clone());
		self.renderer
			.set_hovered_connection(self.hovered_connection.clone());
		true
	}

	pub fn wheel(&mut self, delta_y: f64, screen: Position) -> Response {
		self.renderer.viewport_mut().zoom_by_wheel(delta_y, screen);
		Response::redraw()
	}

	pub fn double_click(&mut self, now: f64) -> Response {
		let started = self
			.graph
			.content_bounds()
			.is_some_and(|bounds| self.renderer.viewport_mut().animate_fit_bounds(bounds, FIT_PADDING, now));
		Response::motion(started)
	}

	pub fn key(&mut self, key: &str, now: f64) -> Response {
		let viewport = self.renderer.viewport_mut();
		match key {
			"+" | "=" => {
				viewport.zoom_in(None, now);
				Response::motion(true)
			}
			"-" | "_" => {
				viewport.zoom_out(None, now);
				Response::motion(true)
			}
			"0" => {
				viewport.animate_reset(now);
				Response::motion(true)
			}
			"f" | "F" => self.double_click(now),
			"Escape" => {
				self.selected.clear();
				self.selected_connection = None;
				self.sync_decorations();
				Response::redraw()
			}
			_ => Response::default(),
		}
	}
}

/// Guide lines where `moving`'s edges or centre line up with another node's,
/// within `tolerance` world units.
pub fn alignment_guides<'a>(
	moving: &Node,
	others: impl Iterator<Item = &'a Node>,
	tolerance: f64,
) -> Vec<Guide> {
	let bounds = moving.bounds();
	let xs = [bounds.x, bounds.center().x, bounds.max_x()];
	let ys = [bounds.y, bounds.center().y, bounds.max_y()];
	let mut guides = Vec::new();
	for other in others.filter(|n| n.has_valid_geometry()) {
		let ob = other.bounds();
		for x in [ob.x, ob.center().x, ob.max_x()] {
			if xs.iter().any(|m| (m - x).abs() <= tolerance) && !guides.contains(&Guide::Vertical(x)) {
				guides.push(Guide::Vertical(x));
			}
		}
		for y in [ob.y, ob.center().y, ob.max_y()] {
			if ys.iter().any(|m| (m - y).abs() <= tolerance) && !guides.contains(&Guide::Horizontal(y)) {
				guides.push(Guide::Horizontal(y));
			}
		}
	}
	guides
}

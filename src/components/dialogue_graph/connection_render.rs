//! Connection curves: geometry, drawing and hit-testing.
//!
//! All widths and sizes in [`ConnectionStyle`] are screen pixels; drawing
//! happens in world space, so they are divided by the current zoom.

use super::geometry::{CubicBezier, distance};
use super::node_render::anchor_position;
use super::style::{ConnectionStyle, NodeStyle};
use super::surface::{Canvas2d, TextAlign, TextBaseline};
use super::types::{Connection, ConnectionType, Node, PortSide, Position};

/// Highlight state of a drawn connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
	#[default]
	Normal,
	Hovered,
	Selected,
}

/// Whether the connection being dragged would be accepted where it currently points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreviewValidity {
	/// Not over any input port.
	#[default]
	Pending,
	Valid,
	Invalid,
}

/// In-progress connection drag, from an output port to the cursor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConnectionPreview {
	pub from: Position,
	pub to: Position,
	pub validity: PreviewValidity,
}

/// Horizontal S-curve from `from` to `to`. Control points are pushed out
/// horizontally by a share of the horizontal distance, clamped so short links
/// still bend and long links do not balloon.
pub fn connection_curve(from: Position, to: Position, style: &ConnectionStyle) -> CubicBezier {
	let offset = ((to.x - from.x).abs() * style.curvature)
		.clamp(style.min_control_offset, style.max_control_offset.max(style.min_control_offset));
	CubicBezier {
		p0: from,
		p1: Position::new(from.x + offset, from.y),
		p2: Position::new(to.x - offset, to.y),
		p3: to,
	}
}

/// Curve for `connection` between its two (already resolved) nodes.
pub fn curve_between(
	connection: &Connection,
	from: &Node,
	to: &Node,
	node_style: &NodeStyle,
	style: &ConnectionStyle,
) -> CubicBezier {
	connection_curve(
		anchor_position(from, PortSide::Output, connection.from_port_index, node_style),
		anchor_position(to, PortSide::Input, connection.to_port_index, node_style),
		style,
	)
}

/// Unit direction of the curve where it arrives at its end.
fn end_direction(curve: &CubicBezier) -> (f64, f64) {
	let tangent = curve.tangent_at(1.0);
	let len = tangent.x.hypot(tangent.y);
	if len > 1e-9 {
		return (tangent.x / len, tangent.y / len);
	}
	let (dx, dy) = (curve.p3.x - curve.p0.x, curve.p3.y - curve.p0.y);
	let len = dx.hypot(dy);
	if len > 1e-9 { (dx / len, dy / len) } else { (1.0, 0.0) }
}

fn bezier_path(ctx: &mut dyn Canvas2d, curve: &CubicBezier) {
	ctx.begin_path();
	ctx.move_to(curve.p0.x, curve.p0.y);
	ctx.bezier_curve_to(
		curve.p1.x, curve.p1.y, curve.p2.x, curve.p2.y, curve.p3.x, curve.p3.y,
	);
}

fn arrowhead(ctx: &mut dyn Canvas2d, curve: &CubicBezier, size: f64) {
	let (ux, uy) = end_direction(curve);
	let tip = curve.p3;
	let (back_x, back_y) = (tip.x - ux * size, tip.y - uy * size);
	let (px, py) = (-uy * size * 0.5, ux * size * 0.5);
	ctx.begin_path();
	ctx.move_to(tip.x, tip.y);
	ctx.line_to(back_x + px, back_y + py);
	ctx.line_to(back_x - px, back_y - py);
	ctx.close_path();
	ctx.fill();
}

pub fn draw_connection(
	ctx: &mut dyn Canvas2d,
	curve: &CubicBezier,
	connection: &Connection,
	state: LinkState,
	style: &ConnectionStyle,
	zoom: f64,
) {
	let (color, width_factor) = match state {
		LinkState::Normal => (style.color_for(connection.connection_type), 1.0),
		LinkState::Hovered => (style.hover_color.as_str(), 1.5),
		LinkState::Selected => (style.selected_color.as_str(), 2.0),
	};
	ctx.set_stroke_style(color);
	ctx.set_line_width(style.width * width_factor / zoom);
	match connection.connection_type {
		ConnectionType::Flow => ctx.set_line_dash(&[]),
		ConnectionType::Data => {
			let dash: Vec<f64> = style.data_dash.iter().map(|d| d / zoom).collect();
			ctx.set_line_dash(&dash);
		}
	}
	bezier_path(ctx, curve);
	ctx.stroke();
	ctx.set_line_dash(&[]);

	ctx.set_fill_style(color);
	arrowhead(ctx, curve, style.arrow_size * width_factor.sqrt() / zoom);

	if let Some(label) = connection.label.as_deref().filter(|l| !l.is_empty()) {
		let mid = curve.point_at(0.5);
		ctx.set_font(&format!("{}px sans-serif", 11.0 / zoom.max(0.5)));
		ctx.set_fill_style(&style.label_color);
		ctx.set_text_align(TextAlign::Center);
		ctx.set_text_baseline(TextBaseline::Alphabetic);
		ctx.fill_text(label, mid.x, mid.y - 4.0 / zoom);
	}
}

pub fn draw_preview(ctx: &mut dyn Canvas2d, preview: &ConnectionPreview, style: &ConnectionStyle, zoom: f64) {
	let color = match preview.validity {
		PreviewValidity::Pending => &style.preview_color,
		PreviewValidity::Valid => &style.preview_valid_color,
		PreviewValidity::Invalid => &style.preview_invalid_color,
	};
	let curve = connection_curve(preview.from, preview.to, style);
	ctx.set_stroke_style(color);
	ctx.set_line_width(style.width / zoom);
	ctx.set_line_dash(&[6.0 / zoom, 4.0 / zoom]);
	bezier_path(ctx, &curve);
	ctx.stroke();
	ctx.set_line_dash(&[]);

	ctx.set_fill_style(color);
	ctx.begin_path();
	ctx.arc(preview.to.x, preview.to.y, 4.0 / zoom, 0.0, std::f64::consts::TAU);
	ctx.fill();
}

/// Whether `point` lies within `threshold` (world units) of any of `samples + 1`
/// points evenly spaced in parameter along the curve.
pub fn curve_hit(curve: &CubicBezier, point: Position, threshold: f64, samples: usize) -> bool {
	if !curve.hull_bounds().expand(threshold).contains(point) {
		return false;
	}
	curve.sample(samples).any(|p| distance(p, point) <= threshold)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::dialogue_graph::geometry::assert_close;
	use crate::components::dialogue_graph::surface::{DisplayList, DrawCommand};

	fn link(connection_type: ConnectionType, label: Option<&str>) -> Connection {
		Connection {
			id: "c".into(),
			from_node_id: "a".into(),
			from_port_index: 0,
			to_node_id: "b".into(),
			to_port_index: 0,
			connection_type,
			label: label.map(String::from),
		}
	}

	#[test]
	fn control_offset_is_clamped() {
		let style = ConnectionStyle::default();
		let near = connection_curve(Position::new(0.0, 0.0), Position::new(20.0, 50.0), &style);
		assert_eq!(near.p1, Position::new(30.0, 0.0));
		assert_eq!(near.p2, Position::new(-10.0, 50.0));

		let mid = connection_curve(Position::new(0.0, 0.0), Position::new(200.0, 0.0), &style);
		assert_eq!(mid.p1.x, 100.0);

		let far = connection_curve(Position::new(0.0, 0.0), Position::new(1000.0, 0.0), &style);
		assert_eq!(far.p1.x, 150.0);
		assert_eq!(far.p2.x, 850.0);
	}

	#[test]
	fn arrow_follows_end_tangent() {
		let style = ConnectionStyle::default();
		let curve = connection_curve(Position::new(0.0, 0.0), Position::new(300.0, 100.0), &style);
		// The second control point sits level with the end, so the curve arrives horizontally.
		let (ux, uy) = end_direction(&curve);
		assert_close(ux, 1.0, 1e-9);
		assert_close(uy, 0.0, 1e-9);

		let degenerate = CubicBezier {
			p0: Position::new(5.0, 5.0),
			p1: Position::new(5.0, 5.0),
			p2: Position::new(5.0, 5.0),
			p3: Position::new(5.0, 5.0),
		};
		assert_eq!(end_direction(&degenerate), (1.0, 0.0));
	}

	#[test]
	fn data_links_are_dashed_and_scaled_by_zoom() {
		let style = ConnectionStyle::default();
		let curve = connection_curve(Position::new(0.0, 0.0), Position::new(300.0, 0.0), &style);
		let mut ctx = DisplayList::new();
		draw_connection(&mut ctx, &curve, &link(ConnectionType::Data, None), LinkState::Normal, &style, 2.0);
		let cmds = ctx.commands();
		assert!(cmds.iter().any(|c| matches!(c, DrawCommand::LineDash(d) if d == &vec![4.0, 2.0])));
		assert!(cmds.iter().any(|c| matches!(c, DrawCommand::LineWidth(w) if *w == 1.0)));
		assert!(matches!(cmds.last(), Some(DrawCommand::Fill)));

		let mut flow = DisplayList::new();
		draw_connection(&mut flow, &curve, &link(ConnectionType::Flow, None), LinkState::Normal, &style, 1.0);
		assert!(
			flow.commands()
				.iter()
				.all(|c| !matches!(c, DrawCommand::LineDash(d) if !d.is_empty()))
		);
	}

	#[test]
	fn label_is_drawn_at_midpoint() {
		let style = ConnectionStyle::default();
		let curve = connection_curve(Position::new(0.0, 0.0), Position::new(300.0, 100.0), &style);
		let mut ctx = DisplayList::new();
		draw_connection(&mut ctx, &curve, &link(ConnectionType::Flow, Some("yes")), LinkState::Selected, &style, 1.0);
		let mid = curve.point_at(0.5);
		let found = ctx.commands().iter().find_map(|c| match c {
			DrawCommand::FillText(text, x, y) => Some((text.clone(), *x, *y)),
			_ => None,
		});
		assert_eq!(found, Some(("yes".to_string(), mid.x, mid.y - 4.0)));
		assert!(
			ctx.commands()
				.iter()
				.any(|c| matches!(c, DrawCommand::StrokeStyle(s) if *s == style.selected_color))
		);
	}

	#[test]
	fn hit_uses_threshold_around_samples() {
		let style = ConnectionStyle::default();
		let curve = connection_curve(Position::new(0.0, 0.0), Position::new(400.0, 0.0), &style);
		// A straight horizontal curve: sample spacing is 20 units at 20 samples.
		assert!(curve_hit(&curve, Position::new(200.0, 3.0), 8.0, 20));
		assert!(!curve_hit(&curve, Position::new(200.0, 30.0), 8.0, 20));
		assert!(!curve_hit(&curve, Position::new(-50.0, 0.0), 8.0, 20));
	}

	#[test]
	fn preview_color_tracks_validity() {
		let style = ConnectionStyle::default();
		let mut ctx = DisplayList::new();
		let preview = ConnectionPreview {
			from: Position::new(0.0, 0.0),
			to: Position::new(100.0, 40.0),
			validity: PreviewValidity::Invalid,
		};
		draw_preview(&mut ctx, &preview, &style, 1.0);
		assert!(
			ctx.commands()
				.iter()
				.any(|c| matches!(c, DrawCommand::StrokeStyle(s) if *s == style.preview_invalid_color))
		);
	}
}

//! Drawing of a single node, plus the port anchor layout shared with hit-testing.

use std::collections::HashSet;
use std::f64::consts::PI;

use super::geometry::Rect;
use super::style::NodeStyle;
use super::surface::{Canvas2d, TextAlign, TextBaseline, rounded_rect_path};
use super::types::{Node, NodeData, PortSide, Position};

/// Ports with at least one attached connection, as `(node id, side, port index)`.
pub type ConnectedPorts<'a> = HashSet<(&'a str, PortSide, usize)>;

const ELLIPSIS: &str = "…";

/// World-space centre of a port. Ports are spaced evenly down the body below the
/// header, inputs on the left edge and outputs on the right.
pub fn port_position(node: &Node, side: PortSide, index: usize, style: &NodeStyle) -> Option<Position> {
	let count = node.ports(side).len();
	if index >= count {
		return None;
	}
	let bounds = node.bounds();
	let header = if style.header_height < bounds.height {
		style.header_height
	} else {
		0.0
	};
	let body_top = bounds.y + header;
	let body_height = bounds.height - header;
	let y = body_top + body_height * (index + 1) as f64 / (count + 1) as f64;
	let x = match side {
		PortSide::Input => bounds.x,
		PortSide::Output => bounds.max_x(),
	};
	Some(Position::new(x, y))
}

/// Where a connection attaches: the port centre, or the middle of the edge when
/// the node has no such port.
pub fn anchor_position(node: &Node, side: PortSide, index: usize, style: &NodeStyle) -> Position {
	port_position(node, side, index, style).unwrap_or_else(|| {
		let bounds = node.bounds();
		let x = match side {
			PortSide::Input => bounds.x,
			PortSide::Output => bounds.max_x(),
		};
		Position::new(x, bounds.center().y)
	})
}

pub fn accent_color<'a>(node: &'a Node, style: &'a NodeStyle) -> &'a str {
	node.color
		.as_deref()
		.unwrap_or_else(|| style.type_colors.for_type(node.node_type))
}

pub fn node_title(node: &Node) -> String {
	let named = match &node.data {
		NodeData::Dialogue(d) | NodeData::DialogueFragment(d) => d.speaker.clone(),
		NodeData::Hub(hub) => hub.display_name.clone(),
		NodeData::FlowFragment(fragment) => Some(fragment.display_name.clone()),
		NodeData::Branch
		| NodeData::Condition { .. }
		| NodeData::Instruction { .. }
		| NodeData::Jump(_) => None,
	};
	named
		.filter(|name| !name.trim().is_empty())
		.unwrap_or_else(|| node.node_type.display_name().to_string())
}

/// Paragraphs shown in the content area, before wrapping.
pub fn content_lines(node: &Node) -> Vec<String> {
	match &node.data {
		NodeData::Dialogue(d) | NodeData::DialogueFragment(d) => {
			let mut lines = Vec::new();
			if let Some(directions) = d.stage_directions.as_deref().filter(|s| !s.is_empty()) {
				lines.push(format!("({directions})"));
			}
			if !d.text.is_empty() {
				lines.push(format!("\u{201c}{}\u{201d}", d.text));
			}
			if let Some(menu) = d.menu_text.as_deref().filter(|s| !s.is_empty()) {
				lines.push(format!("Menu: {menu}"));
			}
			if d.auto_transition {
				lines.push("Auto transition".into());
			}
			lines
		}
		NodeData::Branch => vec!["Takes the first valid output".into()],
		NodeData::Condition { script } => {
			if script.expression.is_empty() {
				vec!["if (true)".into()]
			} else {
				vec![format!("if ({})", script.expression)]
			}
		}
		NodeData::Instruction { script } => {
			if script.expression.is_empty() {
				vec!["No instruction".into()]
			} else {
				vec![script.expression.clone()]
			}
		}
		NodeData::Hub(_) => Vec::new(),
		NodeData::Jump(jump) => match &jump.target_node_id {
			Some(target) => match jump.target_pin_index {
				Some(pin) => vec![format!("\u{2192} {target} [{pin}]")],
				None => vec![format!("\u{2192} {target}")],
			},
			None => vec!["No target".into()],
		},
		NodeData::FlowFragment(fragment) => fragment.text.iter().cloned().collect(),
	}
}

/// Greedy word wrap against the context's current font. The last line is
/// ellipsized when the text does not fit in `max_lines`.
pub fn wrap_text(ctx: &mut dyn Canvas2d, text: &str, max_width: f64, max_lines: usize) -> Vec<String> {
	let mut lines: Vec<String> = Vec::new();
	if max_lines == 0 || max_width <= 0.0 {
		return lines;
	}
	let mut current = String::new();
	let mut truncated = false;
	for word in text.split_whitespace() {
		let candidate = if current.is_empty() {
			word.to_string()
		} else {
			format!("{current} {word}")
		};
		if current.is_empty() || ctx.measure_text(&candidate) <= max_width {
			current = candidate;
			continue;
		}
		lines.push(std::mem::replace(&mut current, word.to_string()));
		if lines.len() == max_lines {
			truncated = true;
			break;
		}
	}
	if !truncated && !current.is_empty() {
		lines.push(current);
	}
	if let Some(last) = lines.last_mut()
		&& (truncated || ctx.measure_text(last) > max_width)
	{
		*last = fit_with_ellipsis(ctx, last, max_width);
	}
	lines
}

fn fit_with_ellipsis(ctx: &mut dyn Canvas2d, text: &str, max_width: f64) -> String {
	let mut chars: Vec<char> = text.chars().collect();
	loop {
		let candidate: String = chars.iter().collect::<String>() + ELLIPSIS;
		if chars.is_empty() || ctx.measure_text(&candidate) <= max_width {
			return candidate;
		}
		chars.pop();
		while chars.last().is_some_and(|c| c.is_whitespace()) {
			chars.pop();
		}
	}
}

/// Full-detail node: shadowed body, header bar, content and ports.
///
/// `raster_scale` is device pixels per world unit on `ctx`. Canvas shadows
/// ignore the transform, so the world-unit blur is converted with it.
pub fn draw_node(
	ctx: &mut dyn Canvas2d,
	node: &Node,
	style: &NodeStyle,
	connected: &ConnectedPorts<'_>,
	raster_scale: f64,
) {
	let bounds = node.bounds();
	let accent = accent_color(node, style);
	let radius = style.corner_radius;

	ctx.save();
	ctx.set_shadow(style.shadow_blur * raster_scale, &style.shadow_color);
	ctx.set_fill_style(&style.body_color);
	ctx.begin_path();
	rounded_rect_path(ctx, bounds, radius);
	ctx.fill();
	ctx.restore();

	let header_height = style.header_height.min(bounds.height);
	ctx.set_fill_style(accent);
	ctx.begin_path();
	rounded_rect_path(ctx, Rect::new(bounds.x, bounds.y, bounds.width, header_height), radius);
	ctx.fill();
	// Square off the header's lower corners where it meets the body.
	if header_height > radius {
		ctx.fill_rect(Rect::new(
			bounds.x,
			bounds.y + header_height - radius,
			bounds.width,
			radius,
		));
	}

	ctx.set_stroke_style(&style.border_color);
	ctx.set_line_width(style.border_width);
	ctx.begin_path();
	rounded_rect_path(ctx, bounds, radius);
	ctx.stroke();

	let padding = style.content_padding;
	let text_width = bounds.width - padding * 2.0;
	ctx.set_font(&format!("bold {}", style.font(style.title_font_size)));
	ctx.set_fill_style(&style.text_color);
	ctx.set_text_align(TextAlign::Left);
	ctx.set_text_baseline(TextBaseline::Middle);
	let title = node_title(node);
	let title = if ctx.measure_text(&title) > text_width {
		fit_with_ellipsis(ctx, &title, text_width)
	} else {
		title
	};
	ctx.fill_text(&title, bounds.x + padding, bounds.y + header_height * 0.5);

	draw_content(ctx, node, style, header_height);
	draw_ports(ctx, node, style, connected);
}

fn draw_content(ctx: &mut dyn Canvas2d, node: &Node, style: &NodeStyle, header_height: f64) {
	let bounds = node.bounds();
	let padding = style.content_padding;
	let top = bounds.y + header_height + padding;
	let available = bounds.max_y() - padding - top;
	let mut budget = (available / style.line_height).floor().max(0.0) as usize;
	if budget == 0 {
		return;
	}
	let max_width = bounds.width - padding * 2.0;

	ctx.set_font(&style.font(style.body_font_size));
	ctx.set_text_align(TextAlign::Left);
	ctx.set_text_baseline(TextBaseline::Top);
	let mut y = top;
	for paragraph in content_lines(node) {
		if budget == 0 {
			break;
		}
		// Stage directions are set apart in a muted colour.
		let color = if paragraph.starts_with('(') {
			&style.muted_text_color
		} else {
			&style.text_color
		};
		ctx.set_fill_style(color);
		let wrapped = wrap_text(ctx, &paragraph, max_width, budget);
		budget -= wrapped.len();
		for line in wrapped {
			ctx.fill_text(&line, bounds.x + padding, y);
			y += style.line_height;
		}
	}
}

fn draw_ports(ctx: &mut dyn Canvas2d, node: &Node, style: &NodeStyle, connected: &ConnectedPorts<'_>) {
	ctx.set_font(&style.font(style.body_font_size * 0.9));
	ctx.set_text_baseline(TextBaseline::Middle);
	ctx.set_line_width(style.border_width);
	ctx.set_stroke_style(&style.border_color);
	for side in [PortSide::Input, PortSide::Output] {
		for port in node.ports(side) {
			let Some(center) = port_position(node, side, port.index, style) else {
				continue;
			};
			let is_connected = connected.contains(&(node.id.as_str(), side, port.index));
			ctx.set_fill_style(if is_connected {
				&style.port_connected_color
			} else {
				&style.port_color
			});
			ctx.begin_path();
			ctx.arc(center.x, center.y, style.port_radius, 0.0, 2.0 * PI);
			ctx.fill();
			ctx.stroke();

			if let Some(label) = port.label.as_deref().filter(|l| !l.is_empty()) {
				let inset = style.port_radius + 4.0;
				ctx.set_fill_style(&style.muted_text_color);
				match side {
					PortSide::Input => {
						ctx.set_text_align(TextAlign::Left);
						ctx.fill_text(label, center.x + inset, center.y);
					}
					PortSide::Output => {
						ctx.set_text_align(TextAlign::Right);
						ctx.fill_text(label, center.x - inset, center.y);
					}
				}
			}
		}
	}
}

/// Low-zoom stand-in: body and header band only, no text or ports.
pub fn draw_node_simplified(ctx: &mut dyn Canvas2d, node: &Node, style: &NodeStyle) {
	let bounds = node.bounds();
	ctx.set_fill_style(&style.body_color);
	ctx.fill_rect(bounds);
	ctx.set_fill_style(accent_color(node, style));
	ctx.fill_rect(Rect::new(
		bounds.x,
		bounds.y,
		bounds.width,
		style.header_height.min(bounds.height),
	));
}

/// Outline drawn around a selected node. `zoom` keeps the stroke a constant screen width.
pub fn draw_selection_outline(ctx: &mut dyn Canvas2d, node: &Node, style: &NodeStyle, zoom: f64) {
	let gap = 3.0 / zoom;
	ctx.set_stroke_style(&style.selected_color);
	ctx.set_line_width(2.0 / zoom);
	ctx.begin_path();
	rounded_rect_path(ctx, node.bounds().expand(gap), style.corner_radius + gap);
	ctx.stroke();
}

pub fn draw_hover_ring(ctx: &mut dyn Canvas2d, node: &Node, style: &NodeStyle, zoom: f64) {
	let gap = 1.5 / zoom;
	ctx.save();
	ctx.set_shadow(10.0, &style.hover_color);
	ctx.set_stroke_style(&style.hover_color);
	ctx.set_line_width(1.5 / zoom);
	ctx.begin_path();
	rounded_rect_path(ctx, node.bounds().expand(gap), style.corner_radius + gap);
	ctx.stroke();
	ctx.restore();
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::dialogue_graph::geometry::assert_close;
	use crate::components::dialogue_graph::surface::{DisplayList, DrawCommand};
	use crate::components::dialogue_graph::types::{
		DialogueData, JumpData, NodeType, Port, ScriptFragment, Size,
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

	fn node(data: NodeData, node_type: NodeType) -> Node {
		Node {
			id: "n".into(),
			node_type,
			position: Position::new(100.0, 200.0),
			size: Size {
				width: 200.0,
				height: 128.0,
			},
			input_ports: ports(1),
			output_ports: ports(3),
			color: None,
			data,
		}
	}

	fn dialogue(text: &str) -> Node {
		node(
			NodeData::Dialogue(DialogueData {
				speaker: Some("Guard".into()),
				text: text.into(),
				..DialogueData::default()
			}),
			NodeType::Dialogue,
		)
	}

	#[test]
	fn ports_are_spaced_evenly_below_header() {
		let style = NodeStyle::default();
		let n = dialogue("hi");
		let input = port_position(&n, PortSide::Input, 0, &style).expect("input port");
		assert_eq!(input.x, 100.0);
		assert_close(input.y, 200.0 + 28.0 + 50.0, 1e-9);

		let outputs: Vec<Position> = (0..3)
			.map(|i| port_position(&n, PortSide::Output, i, &style).expect("output port"))
			.collect();
		assert!(outputs.iter().all(|p| p.x == 300.0));
		assert_close(outputs[0].y, 228.0 + 25.0, 1e-9);
		assert_close(outputs[2].y, 228.0 + 75.0, 1e-9);
		assert!(port_position(&n, PortSide::Output, 3, &style).is_none());
	}

	#[test]
	fn anchor_falls_back_to_edge_middle() {
		let style = NodeStyle::default();
		let mut n = dialogue("hi");
		n.input_ports.clear();
		assert_eq!(
			anchor_position(&n, PortSide::Input, 0, &style),
			Position::new(100.0, 264.0)
		);
	}

	#[test]
	fn draws_title_and_content() {
		let style = NodeStyle::default();
		let mut ctx = DisplayList::new();
		draw_node(&mut ctx, &dialogue("Halt!"), &style, &ConnectedPorts::new(), 1.0);
		let texts = ctx.texts();
		assert_eq!(texts[0], "Guard");
		assert!(texts.contains(&"\u{201c}Halt!\u{201d}"));
	}

	#[test]
	fn shadow_blur_follows_raster_scale() {
		let style = NodeStyle::default();
		let mut ctx = DisplayList::new();
		draw_node(&mut ctx, &dialogue("Halt!"), &style, &ConnectedPorts::new(), 2.5);
		assert!(
			ctx.commands()
				.iter()
				.any(|cmd| matches!(cmd, DrawCommand::Shadow(blur, _) if *blur == 20.0))
		);
	}

	#[test]
	fn title_falls_back_to_type_name() {
		let n = node(
			NodeData::Condition {
				script: ScriptFragment {
					expression: "gold > 10".into(),
					is_condition: true,
				},
			},
			NodeType::Condition,
		);
		assert_eq!(node_title(&n), "Condition");
		assert_eq!(content_lines(&n), vec!["if (gold > 10)".to_string()]);

		let jump = node(NodeData::Jump(JumpData::default()), NodeType::Jump);
		assert_eq!(content_lines(&jump), vec!["No target".to_string()]);
	}

	#[test]
	fn long_text_wraps_and_is_clipped_to_body() {
		let style = NodeStyle::default();
		let mut ctx = DisplayList::new();
		let text = "word ".repeat(200);
		draw_node(&mut ctx, &dialogue(&text), &style, &ConnectedPorts::new(), 1.0);
		// Body is 128 - 28 - 16 = 84 high, which fits 5 lines of 15.
		let body_lines: Vec<&str> = ctx.texts().into_iter().skip(1).collect();
		assert_eq!(body_lines.len(), 5);
		assert!(body_lines[4].ends_with(ELLIPSIS));
	}

	#[test]
	fn wrap_respects_width() {
		let mut ctx = DisplayList::new();
		ctx.set_font("10px sans-serif");
		// 5.5 px per char at 10px.
		let lines = wrap_text(&mut ctx, "aaaa bbbb cccc dddd", 56.0, 10);
		assert_eq!(lines, vec!["aaaa bbbb", "cccc dddd"]);
		let clipped = wrap_text(&mut ctx, "aaaa bbbb cccc dddd", 56.0, 1);
		assert_eq!(clipped.len(), 1);
		assert!(clipped[0].ends_with(ELLIPSIS));
		assert!(ctx.measure_text(&clipped[0]) <= 56.0);
	}

	#[test]
	fn connected_ports_use_connected_color() {
		let style = NodeStyle::default();
		let mut ctx = DisplayList::new();
		let n = dialogue("hi");
		let connected = ConnectedPorts::from([("n", PortSide::Output, 1)]);
		draw_node(&mut ctx, &n, &style, &connected, 1.0);
		let unconnected_fills = ctx
			.commands()
			.iter()
			.filter(|cmd| matches!(cmd, DrawCommand::FillStyle(c) if *c == style.port_color))
			.count();
		assert_eq!(unconnected_fills, 3);
	}

	#[test]
	fn color_override_wins_over_type_color() {
		let style = NodeStyle::default();
		let mut n = dialogue("hi");
		assert_eq!(accent_color(&n, &style), "#3b82f6");
		n.color = Some("#ff0000".into());
		assert_eq!(accent_color(&n, &style), "#ff0000");
	}

	#[test]
	fn simplified_node_has_no_text() {
		let style = NodeStyle::default();
		let mut ctx = DisplayList::new();
		draw_node_simplified(&mut ctx, &dialogue("hi"), &style);
		assert!(ctx.texts().is_empty());
		assert_eq!(
			ctx.commands()
				.iter()
				.filter(|cmd| matches!(cmd, DrawCommand::FillRect(_)))
				.count(),
			2
		);
	}
}

//! Read-only graph snapshot consumed by the renderer.
//!
//! The graph model itself (editing, validation, undo) lives outside this
//! component; these types mirror its serialized form so a snapshot can be
//! handed over as-is.

use serde::{Deserialize, Serialize};

use super::geometry::Rect;

/// World-space point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
	pub x: f64,
	pub y: f64,
}

impl Position {
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

/// Node extent in world units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Size {
	pub width: f64,
	pub height: f64,
}

impl Default for Size {
	fn default() -> Self {
		Self {
			width: 200.0,
			height: 100.0,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
	Dialogue,
	DialogueFragment,
	Branch,
	Condition,
	Instruction,
	Hub,
	Jump,
	FlowFragment,
}

impl NodeType {
	pub fn display_name(self) -> &'static str {
		match self {
			NodeType::Dialogue => "Dialogue",
			NodeType::DialogueFragment => "Dialogue Fragment",
			NodeType::Branch => "Branch",
			NodeType::Condition => "Condition",
			NodeType::Instruction => "Instruction",
			NodeType::Hub => "Hub",
			NodeType::Jump => "Jump",
			NodeType::FlowFragment => "Flow Fragment",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionType {
	Flow,
	Data,
}

/// Which edge of a node a port sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortSide {
	Input,
	Output,
}

/// An input or output pin. `index` always equals the port's position in its list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
	pub id: String,
	pub index: usize,
	#[serde(default)]
	pub label: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DialogueData {
	pub speaker: Option<String>,
	pub text: String,
	pub menu_text: Option<String>,
	pub stage_directions: Option<String>,
	pub auto_transition: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptFragment {
	pub expression: String,
	pub is_condition: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JumpData {
	pub target_node_id: Option<String>,
	pub target_pin_index: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HubData {
	pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlowFragmentData {
	pub display_name: String,
	pub text: Option<String>,
}

impl Default for FlowFragmentData {
	fn default() -> Self {
		Self {
			display_name: "Flow Fragment".to_string(),
			text: None,
		}
	}
}

/// Type-specific payload of a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum NodeData {
	Dialogue(DialogueData),
	DialogueFragment(DialogueData),
	Branch,
	Condition { script: ScriptFragment },
	Instruction { script: ScriptFragment },
	Hub(HubData),
	Jump(JumpData),
	FlowFragment(FlowFragmentData),
}

impl Default for NodeData {
	fn default() -> Self {
		NodeData::DialogueFragment(DialogueData::default())
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	pub id: String,
	pub node_type: NodeType,
	pub position: Position,
	#[serde(default)]
	pub size: Size,
	#[serde(default)]
	pub input_ports: Vec<Port>,
	#[serde(default)]
	pub output_ports: Vec<Port>,
	#[serde(default)]
	pub color: Option<String>,
	#[serde(default)]
	pub data: NodeData,
}

impl Node {
	/// World-space bounding box.
	pub fn bounds(&self) -> Rect {
		Rect::new(
			self.position.x,
			self.position.y,
			self.size.width,
			self.size.height,
		)
	}

	/// Nodes with non-positive or non-finite geometry are neither drawn nor indexed.
	pub fn has_valid_geometry(&self) -> bool {
		self.size.width > 0.0
			&& self.size.height > 0.0
			&& self.size.width.is_finite()
			&& self.size.height.is_finite()
			&& self.position.x.is_finite()
			&& self.position.y.is_finite()
	}

	pub fn ports(&self, side: PortSide) -> &[Port] {
		match side {
			PortSide::Input => &self.input_ports,
			PortSide::Output => &self.output_ports,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
	pub id: String,
	pub from_node_id: String,
	pub from_port_index: usize,
	pub to_node_id: String,
	pub to_port_index: usize,
	#[serde(default = "default_connection_type")]
	pub connection_type: ConnectionType,
	#[serde(default)]
	pub label: Option<String>,
}

fn default_connection_type() -> ConnectionType {
	ConnectionType::Flow
}

/// A full node + connection snapshot, as handed to the renderer each frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueGraph {
	pub nodes: Vec<Node>,
	pub connections: Vec<Connection>,
}

impl DialogueGraph {
	/// Union of all valid node boxes, or `None` for an empty graph.
	pub fn content_bounds(&self) -> Option<Rect> {
		self.nodes
			.iter()
			.filter(|node| node.has_valid_geometry())
			.map(Node::bounds)
			.reduce(|acc, rect| acc.union(&rect))
	}

	pub fn node(&self, id: &str) -> Option<&Node> {
		self.nodes.iter().find(|node| node.id == id)
	}

	pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
		self.nodes.iter_mut().find(|node| node.id == id)
	}

	/// Whether an input port already has its (single) incoming connection.
	pub fn input_taken(&self, node_id: &str, port_index: usize) -> bool {
		self.connections
			.iter()
			.any(|c| c.to_node_id == node_id && c.to_port_index == port_index)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn node_payload_uses_tagged_json() {
		let json = r#"{
			"id": "n1",
			"nodeType": "condition",
			"position": {"x": 10, "y": 20},
			"size": {"width": 180, "height": 90},
			"inputPorts": [{"id": "p0", "index": 0}],
			"outputPorts": [
				{"id": "p1", "index": 0, "label": "True"},
				{"id": "p2", "index": 1, "label": "False"}
			],
			"data": {"type": "condition", "data": {"script": {"expression": "gold > 10", "isCondition": true}}}
		}"#;
		let node: Node = serde_json::from_str(json).expect("node should parse");
		assert_eq!(node.node_type, NodeType::Condition);
		assert_eq!(node.output_ports.len(), 2);
		match &node.data {
			NodeData::Condition { script } => assert_eq!(script.expression, "gold > 10"),
			other => panic!("unexpected payload {other:?}"),
		}
	}

	#[test]
	fn zero_sized_node_is_invalid() {
		let mut node: Node = serde_json::from_str(
			r#"{"id": "a", "nodeType": "hub", "position": {"x": 0, "y": 0}}"#,
		)
		.expect("node should parse");
		assert!(node.has_valid_geometry());
		node.size.width = 0.0;
		assert!(!node.has_valid_geometry());
		node.size.width = -5.0;
		assert!(!node.has_valid_geometry());
	}

	#[test]
	fn content_bounds_skips_invalid_nodes() {
		let mut graph: DialogueGraph = serde_json::from_str(
			r#"{"nodes": [
				{"id": "a", "nodeType": "hub", "position": {"x": 0, "y": 0}, "size": {"width": 100, "height": 50}},
				{"id": "b", "nodeType": "hub", "position": {"x": 300, "y": 200}, "size": {"width": 100, "height": 50}},
				{"id": "c", "nodeType": "hub", "position": {"x": 9000, "y": 9000}, "size": {"width": 0, "height": 50}}
			]}"#,
		)
		.expect("graph should parse");
		let bounds = graph.content_bounds().expect("bounds");
		assert_eq!(bounds, Rect::new(0.0, 0.0, 400.0, 250.0));

		graph.nodes.clear();
		assert!(graph.content_bounds().is_none());
	}
}

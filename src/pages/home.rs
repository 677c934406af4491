use anyhow::Context;
use leptos::prelude::*;
use log::error;

use crate::components::dialogue_graph::types::DialogueData;
use crate::components::dialogue_graph::{
	Connection, ConnectionType, DialogueGraph, DialogueGraphCanvas, Node, NodeData, NodeType, Port,
	Position, RenderStats, Size,
};

/// Hand-written quest dialogue shown at the top of the demo.
const SAMPLE: &str = include_str!("sample_dialogue.json");

const SPEAKERS: [&str; 4] = ["Innkeeper", "Player", "Guard", "Stranger"];
const LINES: [&str; 5] = [
	"Have you heard the rumours about the old mill?",
	"Aye.",
	"Someone has been stealing grain from the cellar every night for a week now, and nobody saw a thing.",
	"Keep your voice down.",
	"The road north is closed until the spring thaw.",
];

fn load_sample() -> anyhow::Result<DialogueGraph> {
	serde_json::from_str(SAMPLE).context("bundled sample dialogue is not a valid graph snapshot")
}

/// Simple pseudo-random number generator (deterministic for consistency).
fn rand_simple(seed: usize) -> f64 {
	let x = ((seed + 1) * 9301 + 49297) % 233280;
	(x as f64) / 233280.0
}

fn ports(count: usize) -> Vec<Port> {
	(0..count)
		.map(|index| Port {
			id: format!("p{index}"),
			index,
			label: None,
		})
		.collect()
}

/// A `rows × cols` grid of dialogue fragments. Each fragment flows into its
/// right neighbour, and every third column also feeds the fragment below
/// through a data link. Large enough to exercise culling and the node cache.
fn generate_fragments(rows: usize, cols: usize, origin_y: f64) -> DialogueGraph {
	let id = |row: usize, col: usize| format!("frag-{row}-{col}");
	let mut nodes = Vec::with_capacity(rows * cols);
	let mut connections = Vec::new();

	for row in 0..rows {
		for col in 0..cols {
			let seed = row * cols + col;
			let line = LINES[(rand_simple(seed) * LINES.len() as f64) as usize % LINES.len()];
			nodes.push(Node {
				id: id(row, col),
				node_type: NodeType::DialogueFragment,
				position: Position::new(col as f64 * 280.0, origin_y + row as f64 * 200.0),
				size: Size {
					width: 220.0,
					height: 120.0,
				},
				input_ports: ports(2),
				output_ports: ports(2),
				color: None,
				data: NodeData::DialogueFragment(DialogueData {
					speaker: Some(SPEAKERS[seed % SPEAKERS.len()].to_string()),
					text: line.to_string(),
					..DialogueData::default()
				}),
			});

			if col + 1 < cols {
				connections.push(Connection {
					id: format!("flow-{row}-{col}"),
					from_node_id: id(row, col),
					from_port_index: 0,
					to_node_id: id(row, col + 1),
					to_port_index: 0,
					connection_type: ConnectionType::Flow,
					label: None,
				});
			}
			if row + 1 < rows && col % 3 == 0 {
				connections.push(Connection {
					id: format!("data-{row}-{col}"),
					from_node_id: id(row, col),
					from_port_index: 1,
					to_node_id: id(row + 1, col),
					to_port_index: 1,
					connection_type: ConnectionType::Data,
					label: None,
				});
			}
		}
	}

	DialogueGraph { nodes, connections }
}

fn demo_graph() -> DialogueGraph {
	let mut graph = load_sample().unwrap_or_else(|err| {
		error!("{err:#}");
		DialogueGraph::default()
	});
	let generated = generate_fragments(12, 20, 700.0);
	graph.nodes.extend(generated.nodes);
	graph.connections.extend(generated.connections);
	graph
}

fn format_stats(stats: &RenderStats) -> String {
	format!(
		"{:.0} fps · frame {:.1} ms · render {:.2} ms · idle {:.1} ms",
		stats.fps, stats.average_frame_time, stats.last_render_time, stats.idle_time
	)
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let sample = demo_graph();
	let graph = Signal::derive(move || sample.clone());
	let (stats, set_stats) = signal(RenderStats::default());

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="fullscreen-graph">
				<DialogueGraphCanvas graph=graph fullscreen=true stats=set_stats />
				<div class="graph-overlay">
					<h1>"Dialogue Graph"</h1>
					<p class="subtitle">
						"Drag to pan, scroll to zoom, double-click to fit. Shift-drag selects. Drag from an output port to connect. +/-/0 step zoom."
					</p>
					<p class="stats">{move || format_stats(&stats.get())}</p>
				</div>
			</div>
		</ErrorBoundary>
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn bundled_sample_parses() {
		let graph = load_sample().expect("sample should parse");
		assert_eq!(graph.nodes.len(), 9);
		assert!(matches!(
			graph.node("choice").map(|n| &n.data),
			Some(NodeData::Branch)
		));
		let data_links = graph
			.connections
			.iter()
			.filter(|c| c.connection_type == ConnectionType::Data)
			.count();
		assert_eq!(data_links, 1);
	}

	#[test]
	fn demo_graph_links_are_consistent() {
		let graph = demo_graph();
		assert_eq!(graph.nodes.len(), 9 + 12 * 20);
		let mut inputs = HashSet::new();
		for link in &graph.connections {
			let from = graph.node(&link.from_node_id).expect("source exists");
			let to = graph.node(&link.to_node_id).expect("target exists");
			assert!(link.from_port_index < from.output_ports.len(), "{}", link.id);
			assert!(link.to_port_index < to.input_ports.len(), "{}", link.id);
			assert!(
				inputs.insert((link.to_node_id.as_str(), link.to_port_index)),
				"input used twice by {}",
				link.id
			);
		}
	}
}

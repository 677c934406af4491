//! Uniform-grid spatial index over node bounding boxes.
//!
//! Queries are cell-granular: they never miss a node whose box overlaps the
//! query rectangle, but may return nodes that only share a cell with it.
//! Callers that need exact answers re-check against the node's box.

use std::collections::{HashMap, HashSet};

use log::debug;

use super::geometry::Rect;
use super::types::Node;

type CellKey = (i64, i64);

/// Boxes covering more cells than this are kept out of the grid and checked
/// on every query instead.
const MAX_CELLS_PER_ENTRY: i64 = 1024;

#[derive(Debug)]
pub struct SpatialIndex {
	cell_size: f64,
	cells: HashMap<CellKey, HashSet<String>>,
	entries: HashMap<String, Rect>,
	oversized: HashSet<String>,
	/// Position of each node in the last snapshot passed to `sync` or `rebuild`.
	slots: HashMap<String, usize>,
}

impl SpatialIndex {
	pub fn new(cell_size: f64) -> Self {
		Self {
			cell_size: if cell_size > 0.0 { cell_size } else { 200.0 },
			cells: HashMap::new(),
			entries: HashMap::new(),
			oversized: HashSet::new(),
			slots: HashMap::new(),
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.entries.contains_key(id)
	}

	/// Box the index currently holds for `id`.
	pub fn bounds_of(&self, id: &str) -> Option<Rect> {
		self.entries.get(id).copied()
	}

	fn cell_range(&self, rect: &Rect) -> (CellKey, CellKey) {
		let min = (
			(rect.x / self.cell_size).floor() as i64,
			(rect.y / self.cell_size).floor() as i64,
		);
		let max = (
			(rect.max_x() / self.cell_size).floor() as i64,
			(rect.max_y() / self.cell_size).floor() as i64,
		);
		(min, max)
	}

	fn cell_count(((min_x, min_y), (max_x, max_y)): (CellKey, CellKey)) -> i64 {
		max_x
			.saturating_sub(min_x)
			.saturating_add(1)
			.saturating_mul(max_y.saturating_sub(min_y).saturating_add(1))
	}

	/// Adds or moves a node. Nodes with invalid geometry are dropped from the index.
	pub fn insert(&mut self, node: &Node) {
		self.remove(&node.id);
		if !node.has_valid_geometry() {
			return;
		}
		let bounds = node.bounds();
		let range = self.cell_range(&bounds);
		self.entries.insert(node.id.clone(), bounds);
		if Self::cell_count(range) > MAX_CELLS_PER_ENTRY {
			debug!("node {} spans too many cells, kept outside the grid", node.id);
			self.oversized.insert(node.id.clone());
			return;
		}
		let ((min_x, min_y), (max_x, max_y)) = range;
		for cx in min_x..=max_x {
			for cy in min_y..=max_y {
				self.cells
					.entry((cx, cy))
					.or_default()
					.insert(node.id.clone());
			}
		}
	}

	pub fn remove(&mut self, id: &str) -> bool {
		let Some(bounds) = self.entries.remove(id) else {
			return false;
		};
		if self.oversized.remove(id) {
			return true;
		}
		let ((min_x, min_y), (max_x, max_y)) = self.cell_range(&bounds);
		for cx in min_x..=max_x {
			for cy in min_y..=max_y {
				if let Some(cell) = self.cells.get_mut(&(cx, cy)) {
					cell.remove(id);
					if cell.is_empty() {
						self.cells.remove(&(cx, cy));
					}
				}
			}
		}
		true
	}

	pub fn clear(&mut self) {
		self.cells.clear();
		self.entries.clear();
		self.oversized.clear();
		self.slots.clear();
	}

	pub fn rebuild<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) {
		self.clear();
		for (slot, node) in nodes.into_iter().enumerate() {
			self.insert(node);
			if self.entries.contains_key(&node.id) {
				self.slots.insert(node.id.clone(), slot);
			}
		}
		debug!("spatial index rebuilt with {} nodes", self.entries.len());
	}

	/// Ids of every node sharing a cell with the rectangle.
	pub fn query_rect(&self, x: f64, y: f64, width: f64, height: f64) -> HashSet<&str> {
		let mut found = HashSet::new();
		let rect = Rect::new(x, y, width.max(0.0), height.max(0.0));
		if ![rect.x, rect.y, rect.width, rect.height]
			.iter()
			.all(|v| v.is_finite())
		{
			return found;
		}
		found.extend(
			self.oversized
				.iter()
				.filter(|id| self.entries.get(*id).is_some_and(|b| b.intersects(&rect)))
				.map(String::as_str),
		);
		let range = self.cell_range(&rect);
		let ((min_x, min_y), (max_x, max_y)) = range;
		// A huge query touches more cells than there are entries; scan those instead.
		if Self::cell_count(range) > self.cells.len() as i64 {
			for ((cx, cy), ids) in &self.cells {
				if (min_x..=max_x).contains(cx) && (min_y..=max_y).contains(cy) {
					found.extend(ids.iter().map(String::as_str));
				}
			}
			return found;
		}
		for cx in min_x..=max_x {
			for cy in min_y..=max_y {
				if let Some(ids) = self.cells.get(&(cx, cy)) {
					found.extend(ids.iter().map(String::as_str));
				}
			}
		}
		found
	}

	/// Snapshot positions of the nodes [`query_rect`](Self::query_rect) returns,
	/// ascending, so callers keep the snapshot's draw order.
	pub fn query_slots(&self, rect: Rect) -> Vec<usize> {
		let mut slots: Vec<usize> = self
			.query_rect(rect.x, rect.y, rect.width, rect.height)
			.into_iter()
			.filter_map(|id| self.slots.get(id).copied())
			.collect();
		slots.sort_unstable();
		slots
	}

	/// Brings the index in line with a full snapshot: inserts new or moved nodes and
	/// drops ids that disappeared. Falls back to a rebuild when most nodes changed.
	pub fn sync(&mut self, nodes: &[Node], rebuild_ratio: f64) {
		let mut changed = Vec::new();
		for (slot, node) in nodes.iter().enumerate() {
			let current = node.has_valid_geometry().then(|| node.bounds());
			if self.entries.get(&node.id).copied() != current {
				changed.push(slot);
			} else if current.is_some() && self.slots.get(&node.id) != Some(&slot) {
				self.slots.insert(node.id.clone(), slot);
			}
		}

		if changed.len() as f64 > nodes.len() as f64 * rebuild_ratio {
			self.rebuild(nodes);
			return;
		}
		for slot in changed {
			let node = &nodes[slot];
			self.insert(node);
			if self.entries.contains_key(&node.id) {
				self.slots.insert(node.id.clone(), slot);
			} else {
				self.slots.remove(&node.id);
			}
		}
		let valid = nodes.iter().filter(|n| n.has_valid_geometry()).count();
		if self.entries.len() > valid || self.slots.len() > valid {
			let present: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
			let gone: Vec<String> = self
				.entries
				.keys()
				.chain(self.slots.keys())
				.filter(|id| !present.contains(id.as_str()))
				.cloned()
				.collect();
			for id in gone {
				self.remove(&id);
				self.slots.remove(&id);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::dialogue_graph::types::{NodeData, NodeType, Position, Size};

	fn node(id: &str, x: f64, y: f64, w: f64, h: f64) -> Node {
		Node {
			id: id.into(),
			node_type: NodeType::Hub,
			position: Position::new(x, y),
			size: Size {
				width: w,
				height: h,
			},
			input_ports: vec![],
			output_ports: vec![],
			color: None,
			data: NodeData::Branch,
		}
	}

	#[test]
	fn node_spanning_cells_is_found_from_each() {
		let mut index = SpatialIndex::new(100.0);
		index.insert(&node("wide", 50.0, 50.0, 300.0, 20.0));
		for x in [60.0, 160.0, 260.0, 340.0] {
			assert!(index.query_rect(x, 55.0, 1.0, 1.0).contains("wide"), "missed at x={x}");
		}
		assert!(index.query_rect(450.0, 55.0, 10.0, 10.0).is_empty());
	}

	#[test]
	fn remove_is_exact_inverse_of_insert() {
		let mut index = SpatialIndex::new(100.0);
		index.insert(&node("a", -150.0, -150.0, 400.0, 400.0));
		assert!(index.remove("a"));
		assert!(index.is_empty());
		assert!(index.cells.is_empty());
		assert!(!index.remove("a"));
	}

	#[test]
	fn reinsert_moves_node() {
		let mut index = SpatialIndex::new(100.0);
		index.insert(&node("a", 0.0, 0.0, 50.0, 50.0));
		index.insert(&node("a", 1000.0, 1000.0, 50.0, 50.0));
		assert!(index.query_rect(0.0, 0.0, 60.0, 60.0).is_empty());
		assert!(index.query_rect(1000.0, 1000.0, 10.0, 10.0).contains("a"));
		assert_eq!(index.len(), 1);
	}

	#[test]
	fn invalid_geometry_is_not_indexed() {
		let mut index = SpatialIndex::new(100.0);
		index.insert(&node("flat", 0.0, 0.0, 100.0, 0.0));
		index.insert(&node("neg", 0.0, 0.0, -10.0, 10.0));
		assert!(index.is_empty());
	}

	#[test]
	fn no_false_negatives() {
		let mut index = SpatialIndex::new(200.0);
		let mut nodes = Vec::new();
		let mut seed = 7_u64;
		let mut next = move || {
			seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
			((seed >> 33) as f64 / (1u64 << 31) as f64) * 4000.0 - 2000.0
		};
		for i in 0..300 {
			let (x, y) = (next(), next());
			let (w, h) = (next().abs() * 0.2 + 1.0, next().abs() * 0.1 + 1.0);
			nodes.push(node(&i.to_string(), x, y, w, h));
		}
		index.rebuild(&nodes);

		for _ in 0..50 {
			let query = Rect::new(next(), next(), next().abs() * 0.5, next().abs() * 0.5);
			let found = index.query_rect(query.x, query.y, query.width, query.height);
			for n in &nodes {
				if n.bounds().intersects(&query) {
					assert!(found.contains(n.id.as_str()), "missed node {}", n.id);
				}
			}
		}
	}

	#[test]
	fn huge_query_scans_occupied_cells() {
		let mut index = SpatialIndex::new(200.0);
		index.insert(&node("a", 0.0, 0.0, 10.0, 10.0));
		index.insert(&node("b", 1e6, -1e6, 10.0, 10.0));
		let all = index.query_rect(-1e7, -1e7, 2e7, 2e7);
		assert_eq!(all.len(), 2);
	}

	#[test]
	fn oversized_node_stays_out_of_the_grid() {
		let mut index = SpatialIndex::new(200.0);
		index.insert(&node("huge", -1e8, 0.0, 2e8, 50.0));
		index.insert(&node("small", 0.0, 500.0, 10.0, 10.0));
		assert_eq!(index.cells.len(), 1);
		assert!(index.query_rect(3e7, 10.0, 1.0, 1.0).contains("huge"));
		assert!(!index.query_rect(3e7, 100.0, 1.0, 1.0).contains("huge"));
		assert!(index.remove("huge"));
		assert!(index.oversized.is_empty());
		assert_eq!(index.len(), 1);
	}

	#[test]
	fn slots_follow_snapshot_order() {
		let mut index = SpatialIndex::new(100.0);
		let mut nodes: Vec<Node> = (0..6)
			.map(|i| node(&format!("n{i}"), i as f64 * 20.0, 0.0, 10.0, 10.0))
			.collect();
		index.sync(&nodes, 0.5);
		assert_eq!(index.query_slots(Rect::new(0.0, 0.0, 200.0, 20.0)), vec![0, 1, 2, 3, 4, 5]);

		// Moving n1 to the end of the snapshot changes nothing geometric.
		let moved = nodes.remove(1);
		nodes.push(moved);
		index.sync(&nodes, 0.5);
		let ids: Vec<&str> = index
			.query_slots(Rect::new(0.0, 0.0, 200.0, 20.0))
			.into_iter()
			.map(|slot| nodes[slot].id.as_str())
			.collect();
		assert_eq!(ids, vec!["n0", "n2", "n3", "n4", "n5", "n1"]);
	}

	#[test]
	fn sync_tracks_moves_and_removals() {
		let mut index = SpatialIndex::new(100.0);
		let mut nodes: Vec<Node> = (0..10)
			.map(|i| node(&format!("n{i}"), i as f64 * 150.0, 0.0, 100.0, 50.0))
			.collect();
		index.sync(&nodes, 0.5);
		assert_eq!(index.len(), 10);

		nodes[3].position = Position::new(5000.0, 5000.0);
		nodes.remove(7);
		index.sync(&nodes, 0.5);
		assert_eq!(index.len(), 9);
		assert!(!index.contains("n7"));
		assert!(index.query_rect(5000.0, 5000.0, 1.0, 1.0).contains("n3"));
		assert!(!index.query_rect(450.0, 0.0, 100.0, 50.0).contains("n3"));
	}
}

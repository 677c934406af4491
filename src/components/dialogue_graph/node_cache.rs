//! Version-keyed cache of pre-rendered node rasters.
//!
//! Purely an optimization: blitting a cached surface must look the same as
//! drawing the node directly.

use std::collections::{HashMap, HashSet};

use log::debug;

use super::error::RenderError;
use super::geometry::Rect;
use super::style::CacheConfig;
use super::surface::{Canvas2d, Surface, SurfaceFactory};
use super::types::{Node, Position};

struct CacheEntry {
	version: u64,
	scale: f64,
	surface: Box<dyn Surface>,
	last_used: u64,
}

/// A cached surface and the raster scale it was drawn at. That scale may
/// differ from the requested one by up to the scale tolerance.
#[derive(Clone, Copy)]
pub struct CachedRaster<'a> {
	pub surface: &'a dyn Surface,
	pub scale: f64,
}

impl CachedRaster<'_> {
	/// World-space destination for blitting at `origin`, the top-left of
	/// [`NodeCache::blit_rect`]. Sized from the raster's own scale so the node
	/// keeps its world size whatever the current zoom.
	pub fn dest(&self, origin: Position) -> Rect {
		Rect::new(
			origin.x,
			origin.y,
			f64::from(self.surface.width()) / self.scale,
			f64::from(self.surface.height()) / self.scale,
		)
	}
}

pub struct NodeCache {
	config: CacheConfig,
	factory: Box<dyn SurfaceFactory>,
	versions: HashMap<String, u64>,
	entries: HashMap<String, CacheEntry>,
	clock: u64,
	hits: u64,
	misses: u64,
}

impl NodeCache {
	pub fn new(config: CacheConfig, factory: Box<dyn SurfaceFactory>) -> Self {
		Self {
			config,
			factory,
			versions: HashMap::new(),
			entries: HashMap::new(),
			clock: 0,
			hits: 0,
			misses: 0,
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// `(hits, misses)` since construction.
	pub fn stats(&self) -> (u64, u64) {
		(self.hits, self.misses)
	}

	pub fn version(&self, id: &str) -> u64 {
		self.versions.get(id).copied().unwrap_or(0)
	}

	/// Marks the node's appearance as changed; its next lookup re-renders.
	pub fn invalidate(&mut self, id: &str) {
		*self.versions.entry(id.to_string()).or_insert(0) += 1;
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	/// Drops entries and version counters for ids not in `present`.
	pub fn retain(&mut self, present: &HashSet<&str>) {
		self.entries.retain(|id, _| present.contains(id.as_str()));
		self.versions.retain(|id, _| present.contains(id.as_str()));
	}

	/// World-space rectangle a cached surface for `node` covers.
	pub fn blit_rect(&self, node: &Node) -> Rect {
		node.bounds().expand(self.config.padding)
	}

	fn scale_matches(&self, cached: f64, wanted: f64) -> bool {
		(cached - wanted).abs() <= self.config.scale_tolerance * wanted.abs()
	}

	/// Returns the cached raster for `node` at `scale`, rendering it with `render`
	/// first when missing, outdated or too far off in scale. `render` draws the
	/// node at its world position; the cache takes care of the local transform.
	pub fn get_or_create(
		&mut self,
		node: &Node,
		scale: f64,
		render: impl FnOnce(&mut dyn Canvas2d),
	) -> Result<CachedRaster<'_>, RenderError> {
		self.clock += 1;
		let clock = self.clock;
		let version = self.version(&node.id);
		let reusable = self
			.entries
			.get(&node.id)
			.is_some_and(|entry| entry.version == version && self.scale_matches(entry.scale, scale));

		if reusable {
			self.hits += 1;
		} else {
			self.misses += 1;
			let surface = self.render_surface(node, scale, render)?;
			self.entries.insert(
				node.id.clone(),
				CacheEntry {
					version,
					scale,
					surface,
					last_used: clock,
				},
			);
			self.evict();
		}

		let entry = self
			.entries
			.get_mut(&node.id)
			.ok_or_else(|| RenderError::SurfaceCreation("cache capacity is zero".into()))?;
		entry.last_used = clock;
		Ok(CachedRaster {
			surface: entry.surface.as_ref(),
			scale: entry.scale,
		})
	}

	fn render_surface(
		&self,
		node: &Node,
		scale: f64,
		render: impl FnOnce(&mut dyn Canvas2d),
	) -> Result<Box<dyn Surface>, RenderError> {
		let area = self.blit_rect(node);
		let width = (area.width * scale).ceil();
		let height = (area.height * scale).ceil();
		if !(width >= 1.0 && height >= 1.0 && width <= f64::from(u32::MAX) && height <= f64::from(u32::MAX))
		{
			return Err(RenderError::SurfaceCreation(format!(
				"raster {width}x{height} for node {} is out of range",
				node.id
			)));
		}
		let mut surface = self.factory.create(width as u32, height as u32)?;
		let ctx = surface.context();
		ctx.save();
		ctx.scale(scale, scale);
		ctx.translate(-area.x, -area.y);
		render(&mut *ctx);
		ctx.restore();
		Ok(surface)
	}

	fn evict(&mut self) {
		while self.entries.len() > self.config.capacity {
			let Some(oldest) = self
				.entries
				.iter()
				.min_by_key(|(_, entry)| entry.last_used)
				.map(|(id, _)| id.clone())
			else {
				break;
			};
			self.entries.remove(&oldest);
			debug!("node cache evicted {oldest}");
		}
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use super::*;
	use crate::components::dialogue_graph::surface::PictureSurfaceFactory;
	use crate::components::dialogue_graph::types::{NodeData, NodeType, Position, Size};

	fn node(id: &str) -> Node {
		Node {
			id: id.into(),
			node_type: NodeType::Branch,
			position: Position::new(30.0, 40.0),
			size: Size {
				width: 100.0,
				height: 50.0,
			},
			input_ports: vec![],
			output_ports: vec![],
			color: None,
			data: NodeData::Branch,
		}
	}

	fn cache(capacity: usize) -> NodeCache {
		NodeCache::new(
			CacheConfig {
				capacity,
				..CacheConfig::default()
			},
			Box::new(PictureSurfaceFactory),
		)
	}

	fn address(raster: CachedRaster<'_>) -> *const () {
		raster.surface as *const dyn Surface as *const ()
	}

	#[test]
	fn unchanged_node_reuses_surface() {
		let mut cache = cache(10);
		let n = node("a");
		let renders = Cell::new(0);

		let first = address(
			cache
				.get_or_create(&n, 1.0, |_| renders.set(renders.get() + 1))
				.expect("surface"),
		);
		let second = address(
			cache
				.get_or_create(&n, 1.02, |_| renders.set(renders.get() + 1))
				.expect("surface"),
		);
		assert_eq!(first, second);
		assert_eq!(renders.get(), 1);
		assert_eq!(cache.stats(), (1, 1));
	}

	#[test]
	fn reused_raster_reports_its_own_scale() {
		let mut cache = cache(10);
		let n = node("a");
		cache.get_or_create(&n, 1.0, |_| {}).expect("surface");
		let raster = cache.get_or_create(&n, 1.04, |_| {}).expect("surface");
		assert_eq!(raster.scale, 1.0);
		// 124 world units of padded width at scale 1 stay 124 world units.
		let dest = raster.dest(Position::new(18.0, 28.0));
		assert_eq!(dest, Rect::new(18.0, 28.0, 124.0, 74.0));
	}

	#[test]
	fn invalidation_and_scale_change_rerender() {
		let mut cache = cache(10);
		let n = node("a");
		let renders = Cell::new(0);

		cache
			.get_or_create(&n, 1.0, |_| renders.set(renders.get() + 1))
			.expect("surface");
		cache.invalidate("a");
		cache
			.get_or_create(&n, 1.0, |_| renders.set(renders.get() + 1))
			.expect("surface");
		assert_eq!(renders.get(), 2);
		cache
			.get_or_create(&n, 2.0, |_| renders.set(renders.get() + 1))
			.expect("surface");
		assert_eq!(renders.get(), 3);
		assert_eq!(cache.version("a"), 1);
	}

	#[test]
	fn surface_is_padded_and_scaled() {
		let mut cache = cache(10);
		let n = node("a");
		let raster = cache.get_or_create(&n, 2.0, |_| {}).expect("surface");
		assert_eq!(raster.surface.width(), 248);
		assert_eq!(raster.surface.height(), 148);
		assert_eq!(cache.blit_rect(&n), Rect::new(18.0, 28.0, 124.0, 74.0));
	}

	#[test]
	fn evicts_least_recently_used() {
		let mut cache = cache(2);
		let (a, b, c) = (node("a"), node("b"), node("c"));
		cache.get_or_create(&a, 1.0, |_| {}).expect("surface");
		cache.get_or_create(&b, 1.0, |_| {}).expect("surface");
		cache.get_or_create(&a, 1.0, |_| {}).expect("surface");
		cache.get_or_create(&c, 1.0, |_| {}).expect("surface");
		assert_eq!(cache.len(), 2);
		assert!(cache.entries.contains_key("a"));
		assert!(!cache.entries.contains_key("b"));
	}

	#[test]
	fn retain_drops_missing_ids() {
		let mut cache = cache(10);
		cache.get_or_create(&node("a"), 1.0, |_| {}).expect("surface");
		cache.get_or_create(&node("b"), 1.0, |_| {}).expect("surface");
		cache.invalidate("b");
		cache.retain(&HashSet::from(["a"]));
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.version("b"), 0);
	}
}

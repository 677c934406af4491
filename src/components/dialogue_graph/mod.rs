//! Canvas renderer for dialogue node graphs.
//!
//! The core (viewport, render loop, spatial index, node cache and drawing
//! routines) is written against the [`surface::Canvas2d`] trait and runs
//! natively in tests; [`web`] binds it to the browser and
//! [`DialogueGraphCanvas`] hosts it as a Leptos component.

mod component;
pub mod connection_render;
pub mod error;
pub mod geometry;
pub mod node_cache;
pub mod node_render;
pub mod render;
pub mod render_loop;
pub mod spatial_index;
pub mod state;
pub mod style;
pub mod surface;
pub mod types;
pub mod viewport;
pub mod web;

pub use component::DialogueGraphCanvas;
pub use error::RenderError;
pub use render::{FrameSummary, GraphRenderer};
pub use render_loop::{RenderLoop, RenderStats};
pub use style::RenderConfig;
pub use types::{Connection, ConnectionType, DialogueGraph, Node, NodeData, NodeType, Port, Position, Size};
pub use viewport::Viewport;

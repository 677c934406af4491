//! Reusable UI components.

pub mod dialogue_graph;

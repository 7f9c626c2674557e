pub mod graph;
pub mod theme;

pub mod controller;
pub mod progress;
pub mod reader;
pub mod stage;
pub mod tool;

pub mod config;
pub mod console;
pub mod error;
pub mod lane;
pub mod recommendation;
pub mod render;
pub mod roi;
pub mod state;
pub mod stream;

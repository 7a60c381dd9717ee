//! # CLI UI Module
//!
//! Styling and formatting layer for docvec CLI output.
//!
//! - `color`: color mode detection (`--color`, `NO_COLOR`, TTY)
//! - `style`: message prefixes and styled fragments
//! - `format`: small text formatters
//! - `table`: comfy-table renderers for results, benchmarks and backends

pub mod color;
pub mod format;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use style::{MessageType, Style};

/// Utility types shared across the engine

pub mod handle_table;

pub use handle_table::*;

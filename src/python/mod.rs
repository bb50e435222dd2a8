//! Python bindings, compiled with the `python` feature.

pub mod bindings;
pub mod numpy_bridge;

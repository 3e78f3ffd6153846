//! Region data: the in-memory store and synthetic regions.

pub mod store;
pub mod synthetic;

pub use store::*;
pub use synthetic::*;

pub mod analytics;
mod estimate;
pub mod lifecycle;

pub use lifecycle::SessionEngine;

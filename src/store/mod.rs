pub mod sessions;
pub mod stats;
pub mod templates;

pub use sessions::SessionStore;
pub use stats::StatsStore;
pub use templates::TemplateStore;

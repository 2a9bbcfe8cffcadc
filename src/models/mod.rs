pub mod lifecycle;
pub mod registry;

pub use lifecycle::LifecycleManager;
pub use registry::ModelRegistry;

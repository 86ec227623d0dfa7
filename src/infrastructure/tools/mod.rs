//! Tool registry implementations

mod static_registry;

pub use static_registry::StaticToolRegistry;

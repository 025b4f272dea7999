pub mod definition;
pub mod registry;

pub use definition::BarterDefinition;
pub use registry::{BarterRegistry, HotReloadEvent};

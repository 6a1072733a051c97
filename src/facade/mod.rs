pub mod host;
pub mod manager;

pub use host::SpaceHost;
pub use manager::ForceManager;

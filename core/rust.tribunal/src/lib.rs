pub mod appeals;
pub mod data;
pub mod ops;
pub mod platform;
pub mod punishments;
pub mod store;
pub mod taskman;
pub mod types;

pub type Error = Box<dyn std::error::Error + Send + Sync>; // This is constant and should be copy pasted

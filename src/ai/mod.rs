mod cloud_api;
mod context;
mod generator;

pub use cloud_api::*;
pub use context::*;
pub use generator::*;

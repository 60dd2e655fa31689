pub mod devices;
pub mod plan;

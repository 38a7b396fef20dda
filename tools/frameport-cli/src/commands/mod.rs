pub mod check;
pub mod next_version;
pub mod plan;
pub mod render;

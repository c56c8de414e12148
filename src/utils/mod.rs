pub mod background;
pub mod types;

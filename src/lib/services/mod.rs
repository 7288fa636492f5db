pub mod specs;
pub mod types;

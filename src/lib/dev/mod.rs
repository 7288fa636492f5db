pub mod dev;
pub mod signals;
pub mod state;
pub mod types;

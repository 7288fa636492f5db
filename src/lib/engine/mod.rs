pub mod docker;
pub mod images;
#[cfg(test)]
pub mod mock;
pub mod types;

pub mod hasura;
pub mod types;

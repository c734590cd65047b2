pub mod market;
pub mod sentiment;

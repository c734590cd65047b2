pub mod aggregate;
pub mod analyzer;
pub mod parser;

pub mod normalize;
pub mod stopwords;

pub use normalize::normalize;

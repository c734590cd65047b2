pub mod chart;
pub mod http;
pub mod listing;
pub mod news;

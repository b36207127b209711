pub mod challenge;
pub mod rating;
pub mod resolution;

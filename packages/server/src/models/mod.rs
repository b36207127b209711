pub mod account;
pub mod archive;
pub mod category;
pub mod challenge;
pub mod result;
pub mod shared;
pub mod user;
pub mod vote;

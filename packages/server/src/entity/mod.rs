pub mod archived_challenge;
pub mod archived_challenge_user;
pub mod category;
pub mod category_rating;
pub mod challenge;
pub mod challenge_user;
pub mod role;
pub mod role_permission;
pub mod sub_category;
pub mod sub_category_rating;
pub mod uploaded_result;
pub mod user;
pub mod vote;

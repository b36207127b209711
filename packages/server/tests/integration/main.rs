
mod account;
mod archive;
mod categories;
mod challenges;
mod jobs;
mod results;
mod users;
mod votes;

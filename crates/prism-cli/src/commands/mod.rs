pub mod account;
pub mod conversation;
pub mod generate;
pub mod preference;

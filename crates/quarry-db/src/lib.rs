pub mod catalog;
pub mod user_store;

pub use user_store::{NewUser, UserPatch, UserRecord, UserStore};

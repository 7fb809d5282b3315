pub mod backends;
pub mod identity;

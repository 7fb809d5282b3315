#[cfg(test)]
pub mod fakes;
pub mod models;
pub mod services;

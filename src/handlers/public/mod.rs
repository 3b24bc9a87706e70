// handlers/public/mod.rs - Unauthenticated endpoints

pub mod health; // GET /health
pub mod root; // GET /

pub use health::health;
pub use root::root;

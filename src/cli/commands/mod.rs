pub mod migrate;
pub mod permissions;
pub mod sweep;
pub mod token;

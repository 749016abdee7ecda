pub mod error;
pub mod messages;
pub mod protocol;
pub mod registry;
pub mod types;
pub mod version;

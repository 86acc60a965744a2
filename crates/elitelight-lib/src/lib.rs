//! EliteLight: safe, serialized control of a local-network LED strip
//! driven by Elite Dangerous game events.

pub mod backoff;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod hooks;
pub mod led;
pub mod mapping;
pub mod probe;
pub mod serializer;
pub mod transport;

pub use error::ElitelightError;

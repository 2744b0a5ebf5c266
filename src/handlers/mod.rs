//! HTTP handlers for resource endpoints and search.

pub mod resource;
pub mod search;
pub use resource::ResourceName;

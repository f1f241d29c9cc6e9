//! Pub/sub topic resolution and JSON/plain-text payload mapping (§4.4).

pub mod data_mapper;
pub mod error;
pub mod json_mapper;
pub mod router;

pub use data_mapper::DataMapper;
pub use error::TopicError;
pub use json_mapper::JsonMapper;
pub use router::TopicRouter;

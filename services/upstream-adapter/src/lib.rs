//! HTTP(S) client that replays another MTConnect agent's stream into the
//! head of this pipeline (§4.8, C11).

pub mod adapter;
pub mod error;
pub mod identity;
pub mod multipart;

pub use adapter::{AdapterConfig, ConnectionState, SampleMode, UpstreamAdapter, UpstreamErrorCode};
pub use error::AdapterError;
pub use identity::adapter_identity;
pub use multipart::{extract_boundary, MultipartReader};

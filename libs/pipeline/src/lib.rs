//! The transform graph engine (C3/C4/C5): a dynamically reconfigurable DAG
//! of named transforms sharing state via a [`PipelineContext`], executed on
//! a serializing [`strand::Strand`].

pub mod context;
pub mod error;
pub mod frame;
pub mod guard;
pub mod pipeline;
pub mod strand;
pub mod transform;

pub use context::PipelineContext;
pub use error::PipelineError;
pub use frame::Frame;
pub use guard::{Guard, GuardResult};
pub use pipeline::{Named, Pipeline, PipelineNode};
pub use strand::{Strand, StrandHandle};
pub use transform::{StartTransform, Transform};

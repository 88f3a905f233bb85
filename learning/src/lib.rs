//! Consumers of the event stream that turn raw events into application state.
//!
//! - [`JobEventBridge`] follows one background job (quiz, flashcard, content or
//!   summary generation) from `Processing` to `Completed` or `Failed`.
//! - [`SectionStreamReconstructor`] rebuilds a learning guide as its outline and
//!   sections stream in, exposing partial content while a section generates.
//!
//! Both attach to a shared [`sse::EventRouter`] and unsubscribe on teardown.

pub mod job_bridge;
pub mod section_parse;
pub mod section_stream;

pub use job_bridge::{JobEventBridge, JobEventBridgeBuilder, JobResult, JobSnapshot, JobStatus};
pub use section_stream::{SectionState, SectionStreamBuilder, SectionStreamReconstructor};

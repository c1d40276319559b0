//! Field report pipeline
//!
//! A site video goes in; a stored report document with extracted frames and
//! static viewer/editor pages comes out. The member crates are re-exported here:
//!
//! - [`common`]: report document model and shared processing types
//! - [`frames`]: timestamp-driven frame extraction through an external decoder
//! - [`storage`]: object storage, key scheme and the per-key report store
//! - [`orchestrator`]: ingestion controller, narrative client, viewer pages

pub use field_report_common as common;
pub use field_report_frames as frames;
pub use field_report_orchestrator as orchestrator;
pub use field_report_storage as storage;

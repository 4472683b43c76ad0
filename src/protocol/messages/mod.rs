//! Per-API request/response payloads.
//!
//! Every module here owns exactly one wire shape: there is no version
//! negotiation, so a request type always means the one shape its module
//! documents, and a response is always read that way.

pub mod consumer_group;
pub mod fetch;
pub mod find_coordinator;
pub mod header;
pub mod heartbeat;
pub mod join_group;
pub mod leave_group;
pub mod list_offsets;
pub mod metadata;
pub mod offset_commit;
pub mod offset_fetch;
pub mod produce;
pub mod sync_group;

//! # Repository Module
//!
//! Database repository implementations.
//!
//! ## Available Repositories
//!
//! - [`events::EventRepository`] - Insert-or-ignore of mirrored events
//! - [`sync_state::SyncStateRepository`] - Stream checkpoint slot
//!
//! Repositories are cheap handles over the shared pool; get them from
//! [`crate::Database::events`] and [`crate::Database::sync_state`].

pub mod events;
pub mod sync_state;

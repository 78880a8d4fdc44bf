//! selva-cli - Debug driver for the Selva backend
//!
//! The binary replays a textual action trace through the builder and dumps
//! the final IR. The trace format is a direct serialization of the
//! semantic-action interface, not a language front end; see [`trace`].

pub mod trace;

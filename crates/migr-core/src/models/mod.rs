pub mod job;
pub mod project;
pub mod source;
pub mod sync_state;
pub mod target;

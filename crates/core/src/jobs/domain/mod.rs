pub mod event_channel;
pub mod job;
pub mod job_error;
pub mod job_registry;

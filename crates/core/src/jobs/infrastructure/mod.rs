pub mod event_stream;
pub mod job_orchestrator;

use std::collections::VecDeque;
use std::time::Duration;

use crate::jobs::domain::event_channel::EventChannel;
use crate::jobs::domain::job::{JobEvent, JobId, JobStatus};
use crate::jobs::domain::job_error::JobError;
use crate::jobs::domain::job_registry::JobRegistry;
use crate::shared::constants::STREAM_POLL_TIMEOUT;

#[derive(Clone, Debug, PartialEq)]
pub enum StreamItem {
    Event(JobEvent),
    Keepalive,
}

impl StreamItem {
    /// Server-sent-events framing.
    pub fn to_sse(&self) -> String {
        match self {
            StreamItem::Keepalive => ": keepalive\n\n".to_string(),
            StreamItem::Event(event) => match serde_json::to_string(event) {
                Ok(json) => format!("data: {json}\n\n"),
                Err(e) => {
                    log::error!("Could not serialise job event: {e}");
                    ": unserialisable event\n\n".to_string()
                }
            },
        }
    }
}

enum State {
    Start,
    Polling,
    Draining(VecDeque<JobEvent>),
    Done,
}

/// Blocking iterator over a job's events.
///
/// Yields the current status first, then events as they arrive, with a
/// keepalive whenever nothing arrived within the poll timeout. Once the job
/// is terminal the buffered events are drained, a final status event is
/// emitted and the iterator ends.
pub struct EventStream {
    registry: JobRegistry,
    id: JobId,
    channel: EventChannel,
    poll_timeout: Duration,
    state: State,
}

impl EventStream {
    pub fn open(registry: JobRegistry, id: JobId) -> Result<Self, JobError> {
        Self::with_timeout(registry, id, STREAM_POLL_TIMEOUT)
    }

    pub fn with_timeout(
        registry: JobRegistry,
        id: JobId,
        poll_timeout: Duration,
    ) -> Result<Self, JobError> {
        let channel = registry.events(id).ok_or(JobError::NotFound(id))?;
        Ok(Self {
            registry,
            id,
            channel,
            poll_timeout,
            state: State::Start,
        })
    }

    fn status_event(&self) -> JobEvent {
        match self.registry.view(self.id) {
            Some(view) => JobEvent::Status {
                status: view.status,
                error: view.error,
            },
            None => JobEvent::Status {
                status: JobStatus::Failed,
                error: Some(format!("job {} disappeared", self.id)),
            },
        }
    }

    fn finished(&self) -> bool {
        self.registry
            .status(self.id)
            .map_or(true, |status| status.is_terminal())
    }
}

impl Iterator for EventStream {
    type Item = StreamItem;

    fn next(&mut self) -> Option<StreamItem> {
        match &mut self.state {
            State::Start => {
                self.state = State::Polling;
                Some(StreamItem::Event(self.status_event()))
            }
            State::Polling => {
                let item = match self.channel.recv_timeout(self.poll_timeout) {
                    Some(event) => StreamItem::Event(event),
                    None => StreamItem::Keepalive,
                };
                if self.finished() {
                    let mut rest: VecDeque<JobEvent> = self.channel.drain().into();
                    rest.push_back(self.status_event());
                    self.state = State::Draining(rest);
                }
                Some(item)
            }
            State::Draining(rest) => match rest.pop_front() {
                Some(event) => Some(StreamItem::Event(event)),
                None => {
                    self.state = State::Done;
                    None
                }
            },
            State::Done => None,
        }
    }
}

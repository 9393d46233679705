//! Scripted in-memory transport for engine and supervisor tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use workerlink_proto::Reply;

use crate::transport::{Connector, Readiness, Socket};

/// What the worker does with the next request.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Answer with these frames.
    Reply(Vec<Vec<u8>>),
    /// Never answer; the poll times out.
    Silence,
    /// The poll itself fails.
    PollError,
    /// Readable, but receiving fails.
    RecvError,
}

impl Step {
    pub(crate) fn reply(reply: &Reply) -> Self {
        Self::Reply(vec![workerlink_proto::encode_reply(reply).unwrap()])
    }
}

/// Wire activity, tagged with the socket id it happened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Open(u64),
    Send(u64, Vec<u8>),
    Recv(u64),
    Close(u64),
}

#[derive(Debug, Default)]
struct Shared {
    script: VecDeque<Step>,
    echo: bool,
    fail_opens: bool,
    sockets: u64,
    events: Vec<Event>,
}

/// Connector whose sockets follow a shared script.
///
/// Once the script runs out, the worker stays silent, or echoes each
/// request's payload back as `info` when built with [`MockConnector::echo`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MockConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnector {
    pub(crate) fn scripted(steps: impl IntoIterator<Item = Step>) -> Self {
        let mock = Self::default();
        mock.shared.lock().unwrap().script.extend(steps);
        mock
    }

    pub(crate) fn echo() -> Self {
        let mock = Self::default();
        mock.shared.lock().unwrap().echo = true;
        mock
    }

    pub(crate) fn fail_opens(&self, fail: bool) {
        self.shared.lock().unwrap().fail_opens = fail;
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.shared.lock().unwrap().events.clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.shared.lock().unwrap().events.iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: Event) {
        self.shared.lock().unwrap().events.push(event);
    }
}

impl Connector for MockConnector {
    type Socket = MockSocket;

    async fn open(&self) -> io::Result<MockSocket> {
        let id = {
            let mut shared = self.shared.lock().unwrap();
            if shared.fail_opens {
                return Err(io::Error::other("socket creation refused"));
            }
            shared.sockets += 1;
            let id = shared.sockets;
            shared.events.push(Event::Open(id));
            id
        };
        Ok(MockSocket {
            id,
            mock: self.clone(),
            last_request: Vec::new(),
            pending: None,
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockSocket {
    id: u64,
    mock: MockConnector,
    last_request: Vec<u8>,
    pending: Option<io::Result<Vec<Vec<u8>>>>,
}

impl MockSocket {
    fn next_step(&self) -> Step {
        let mut shared = self.mock.shared.lock().unwrap();
        match shared.script.pop_front() {
            Some(step) => step,
            None if shared.echo => {
                let req = workerlink_proto::decode_request(&self.last_request).unwrap();
                Step::reply(&Reply {
                    info: req.data.unwrap_or_default(),
                    ..Reply::default()
                })
            }
            None => Step::Silence,
        }
    }
}

impl Socket for MockSocket {
    async fn send(&mut self, request: &[u8]) -> io::Result<()> {
        tokio::task::yield_now().await;
        self.last_request = request.to_vec();
        self.mock.record(Event::Send(self.id, request.to_vec()));
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> io::Result<Readiness> {
        tokio::task::yield_now().await;
        match self.next_step() {
            Step::Reply(frames) => {
                self.pending = Some(Ok(frames));
                Ok(Readiness::Readable)
            }
            Step::Silence => {
                tokio::time::sleep(timeout).await;
                Ok(Readiness::TimedOut)
            }
            Step::PollError => Err(io::Error::other("poll failed")),
            Step::RecvError => {
                self.pending = Some(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "reset mid-reply",
                )));
                Ok(Readiness::Readable)
            }
        }
    }

    async fn recv(&mut self) -> io::Result<Vec<Vec<u8>>> {
        tokio::task::yield_now().await;
        self.mock.record(Event::Recv(self.id));
        self.pending
            .take()
            .unwrap_or_else(|| Err(io::ErrorKind::NotConnected.into()))
    }

    async fn close(self) {
        self.mock.record(Event::Close(self.id));
    }
}

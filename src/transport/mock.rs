//! In-memory transport used by the unit tests.
//!
//! Every call is recorded in a shared log so tests can inspect what reached
//! the "wire", and the sinks handed to `open` are kept so tests can play the
//! server side by emitting events.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{Connector, EventSink, SubscriptionHandle, TransportSession};
use crate::utils::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String),
    Subscribe {
        destination: String,
        handle: SubscriptionHandle,
    },
    Unsubscribe(SubscriptionHandle),
    Send {
        destination: String,
        body: String,
    },
    Close,
}

#[derive(Debug, Default)]
struct Log {
    calls: Vec<(usize, Call)>,
    sinks: Vec<EventSink>,
    next_handle: u64,
    refuse_open: bool,
    fail_sends: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    log: Arc<Mutex<Log>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transport instances opened so far.
    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().sinks.len()
    }

    pub fn sink(&self, session: usize) -> EventSink {
        self.log.lock().unwrap().sinks[session].clone()
    }

    pub fn last_sink(&self) -> EventSink {
        let log = self.log.lock().unwrap();
        log.sinks.last().cloned().expect("no session opened")
    }

    pub fn calls(&self, session: usize) -> Vec<Call> {
        self.log
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(s, _)| *s == session)
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Subscriptions issued on `session` and not yet unsubscribed.
    pub fn live_subscriptions(&self, session: usize) -> BTreeMap<SubscriptionHandle, String> {
        let mut live = BTreeMap::new();
        for call in self.calls(session) {
            match call {
                Call::Subscribe {
                    destination,
                    handle,
                } => {
                    live.insert(handle, destination);
                }
                Call::Unsubscribe(handle) => {
                    live.remove(&handle);
                }
                _ => {}
            }
        }
        live
    }

    pub fn live_topics(&self, session: usize) -> Vec<String> {
        let mut topics: Vec<String> = self.live_subscriptions(session).into_values().collect();
        topics.sort();
        topics
    }

    /// Handle issued on `session` for `destination`, if still subscribed.
    pub fn handle_for(&self, session: usize, destination: &str) -> Option<SubscriptionHandle> {
        self.live_subscriptions(session)
            .into_iter()
            .find(|(_, d)| d == destination)
            .map(|(handle, _)| handle)
    }

    /// Every SEND across all sessions, in order.
    pub fn sends(&self) -> Vec<(String, String)> {
        self.log
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|(_, call)| match call {
                Call::Send { destination, body } => Some((destination.clone(), body.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self, session: usize) -> bool {
        self.calls(session).contains(&Call::Close)
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.log.lock().unwrap().refuse_open = refuse;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.log.lock().unwrap().fail_sends = fail;
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn open(&mut self, url: &str, sink: EventSink) -> Result<MockSession, TransportError> {
        let mut log = self.log.lock().unwrap();
        if log.refuse_open {
            return Err(TransportError::Unreachable(url.to_string()));
        }
        let index = log.sinks.len();
        log.sinks.push(sink);
        log.calls.push((index, Call::Open(url.to_string())));
        Ok(MockSession {
            index,
            log: self.log.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockSession {
    index: usize,
    log: Arc<Mutex<Log>>,
}

impl MockSession {
    fn record(&self, call: Call) {
        self.log.lock().unwrap().calls.push((self.index, call));
    }
}

impl TransportSession for MockSession {
    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionHandle, TransportError> {
        let handle = {
            let mut log = self.log.lock().unwrap();
            log.next_handle += 1;
            SubscriptionHandle::new(format!("mock-{}", log.next_handle))
        };
        self.record(Call::Subscribe {
            destination: destination.to_string(),
            handle: handle.clone(),
        });
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        self.record(Call::Unsubscribe(handle.clone()));
        Ok(())
    }

    fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError> {
        if self.log.lock().unwrap().fail_sends {
            return Err(TransportError::closed("mock send failure"));
        }
        self.record(Call::Send {
            destination: destination.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn close(&mut self) {
        self.record(Call::Close);
    }
}

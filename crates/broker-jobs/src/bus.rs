//! Message bus — one ordered channel per job method.
//!
//! Each channel is a bounded `tokio::sync::mpsc` queue with exactly one
//! consumer. Publishers wait for capacity rather than dropping messages.
//! A channel closes once every [`MessageBus`] handle is dropped; its
//! consumer then drains whatever is still buffered before `recv` returns
//! `None`.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use broker_core::JobMethod;

use crate::error::{JobError, JobResult};
use crate::message::JobMsg;

/// Producer side of the bus. Cheap to clone; one clone per executor
/// supervisor is fine.
#[derive(Clone, Debug)]
pub struct MessageBus {
    senders: HashMap<JobMethod, mpsc::Sender<JobMsg>>,
}

/// Consumer side of the bus: one receiver per method, each handed to
/// exactly one subscriber.
#[derive(Debug)]
pub struct BusReceivers {
    receivers: HashMap<JobMethod, mpsc::Receiver<JobMsg>>,
}

impl MessageBus {
    /// Create the bus with `capacity` buffered messages per method.
    pub fn new(capacity: usize) -> (Self, BusReceivers) {
        let capacity = capacity.max(1);
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for method in JobMethod::ALL {
            let (tx, rx) = mpsc::channel(capacity);
            senders.insert(method, tx);
            receivers.insert(method, rx);
        }
        debug!(capacity, "message bus created");
        (Self { senders }, BusReceivers { receivers })
    }

    /// Deliver `msg` to the channel for its job method, waiting for buffer
    /// space if the channel is full.
    pub async fn publish(&self, msg: JobMsg) -> JobResult<()> {
        let method = msg.method();
        let sender = self.sender(method, &msg)?;
        sender
            .send(msg)
            .await
            .map_err(|mpsc::error::SendError(msg)| JobError::BusClosed {
                method,
                msg: Box::new(msg),
            })
    }

    /// Non-waiting variant of [`publish`](Self::publish). A full channel
    /// fails with `BusFull`; either way the message is handed back.
    pub fn try_publish(&self, msg: JobMsg) -> JobResult<()> {
        let method = msg.method();
        let sender = self.sender(method, &msg)?;
        sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(msg) => JobError::BusFull {
                method,
                msg: Box::new(msg),
            },
            mpsc::error::TrySendError::Closed(msg) => JobError::BusClosed {
                method,
                msg: Box::new(msg),
            },
        })
    }

    /// Drop this handle's senders. The channels close once no other clone
    /// remains.
    pub fn close(self) {
        debug!("message bus handle closed");
    }

    fn sender(&self, method: JobMethod, msg: &JobMsg) -> JobResult<&mpsc::Sender<JobMsg>> {
        self.senders.get(&method).ok_or_else(|| JobError::BusClosed {
            method,
            msg: Box::new(msg.clone()),
        })
    }
}

impl BusReceivers {
    /// Take the receiver for `method`. Returns `None` if it was already
    /// taken.
    pub fn take(&mut self, method: JobMethod) -> Option<mpsc::Receiver<JobMsg>> {
        self.receivers.remove(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::{JobState, State};

    fn msg(token: &str, method: JobMethod) -> JobMsg {
        JobMsg::new("i1", JobState::new(token, method, State::InProgress))
    }

    #[tokio::test]
    async fn routes_by_method() {
        let (bus, mut receivers) = MessageBus::new(8);
        bus.publish(msg("t1", JobMethod::Bind)).await.unwrap();
        bus.publish(msg("t2", JobMethod::Provision)).await.unwrap();

        let mut bind_rx = receivers.take(JobMethod::Bind).unwrap();
        let mut prov_rx = receivers.take(JobMethod::Provision).unwrap();
        assert_eq!(bind_rx.recv().await.unwrap().state.token, "t1");
        assert_eq!(prov_rx.recv().await.unwrap().state.token, "t2");
        assert!(bind_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn preserves_fifo_order_per_method() {
        let (bus, mut receivers) = MessageBus::new(16);
        for i in 0..10 {
            bus.publish(msg(&format!("t{i}"), JobMethod::Deprovision))
                .await
                .unwrap();
        }
        let mut rx = receivers.take(JobMethod::Deprovision).unwrap();
        for i in 0..10 {
            assert_eq!(rx.recv().await.unwrap().state.token, format!("t{i}"));
        }
    }

    #[tokio::test]
    async fn closing_drains_buffered_messages() {
        let (bus, mut receivers) = MessageBus::new(8);
        let mut rx = receivers.take(JobMethod::Unbind).unwrap();
        for i in 0..3 {
            bus.publish(msg(&format!("t{i}"), JobMethod::Unbind))
                .await
                .unwrap();
        }
        bus.close();

        let mut seen = 0;
        while rx.recv().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[tokio::test]
    async fn publish_without_consumer_returns_message() {
        let (bus, mut receivers) = MessageBus::new(1);
        drop(receivers.take(JobMethod::Update));

        let err = bus.publish(msg("t1", JobMethod::Update)).await.unwrap_err();
        match err {
            JobError::BusClosed { method, msg } => {
                assert_eq!(method, JobMethod::Update);
                assert_eq!(msg.state.token, "t1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn try_publish_reports_full_channel() {
        let (bus, mut receivers) = MessageBus::new(1);
        let _rx = receivers.take(JobMethod::Bind).unwrap();
        bus.try_publish(msg("t1", JobMethod::Bind)).unwrap();
        match bus.try_publish(msg("t2", JobMethod::Bind)).unwrap_err() {
            JobError::BusFull { method, msg } => {
                assert_eq!(method, JobMethod::Bind);
                assert_eq!(msg.state.token, "t2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn try_publish_without_consumer_returns_message() {
        let (bus, mut receivers) = MessageBus::new(1);
        drop(receivers.take(JobMethod::Bind));

        match bus.try_publish(msg("t1", JobMethod::Bind)).unwrap_err() {
            JobError::BusClosed { method, msg } => {
                assert_eq!(method, JobMethod::Bind);
                assert_eq!(msg.state.token, "t1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn receivers_can_only_be_taken_once() {
        let (_bus, mut receivers) = MessageBus::new(1);
        assert!(receivers.take(JobMethod::Provision).is_some());
        assert!(receivers.take(JobMethod::Provision).is_none());
    }
}

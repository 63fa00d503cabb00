//! In-process broadcast bus every component publishes its `Emits` points on.
//!
//! Embedders and tests subscribe to a single [`Bus`] instead of threading a
//! bespoke callback through every constructor.

use tokio::sync::broadcast;

use crate::events::MinerEvent;

#[derive(Clone)]
pub struct Bus {
    sender: broadcast::Sender<MinerEvent>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MinerEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Errors (no subscribers) are not actionable and
    /// are dropped, matching the teacher's `Bus::publish` treatment.
    pub fn publish(&self, event: MinerEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(512)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RunState;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn publish_and_receive_event() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(MinerEvent::StateChanged {
            state: RunState::Watching,
        });

        let received = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("timeout")
            .expect("recv");
        assert!(matches!(
            received,
            MinerEvent::StateChanged {
                state: RunState::Watching
            }
        ));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_event() {
        let bus = Bus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(MinerEvent::Finished);

        assert!(matches!(rx1.recv().await.unwrap(), MinerEvent::Finished));
        assert!(matches!(rx2.recv().await.unwrap(), MinerEvent::Finished));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = Bus::new(4);
        bus.publish(MinerEvent::Finished);
    }
}

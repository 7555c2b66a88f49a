//! Event bus for brew session changes
//! Presentation tasks subscribe here instead of watching each stage on its own

use crate::types::StageId;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    pubsub::{ImmediatePublisher, PubSubChannel, Subscriber, WaitResult},
};
use serde::Serialize;
use thiserror::Error;

const EVENT_QUEUE_DEPTH: usize = 32;
const MAX_SUBSCRIBERS: usize = 4;
const MAX_PUBLISHERS: usize = 2;

/// Aggregated change notification for the whole brew session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BrewEvent {
    StageStarted {
        stage: StageId,
    },
    StageTicked {
        stage: StageId,
        elapsed_secs: u32,
        remaining_secs: u32,
    },
    StageCompleted {
        stage: StageId,
        by_skip: bool,
    },
    SessionReset,
    LeafAmountChanged {
        leaf_grams: u32,
        water_ml: u32,
    },
}

/// Anything that wants to hear about session changes.
pub trait BrewObserver {
    fn on_brew_event(&mut self, event: &BrewEvent);
}

impl<F> BrewObserver for F
where
    F: FnMut(&BrewEvent),
{
    fn on_brew_event(&mut self, event: &BrewEvent) {
        self(event)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("event bus has no free subscriber slots")]
    SubscribersExhausted,
}

type EventChannel =
    PubSubChannel<CriticalSectionRawMutex, BrewEvent, EVENT_QUEUE_DEPTH, MAX_SUBSCRIBERS, MAX_PUBLISHERS>;

pub struct EventBus {
    channel: EventChannel,
}

impl EventBus {
    pub const fn new() -> Self {
        Self {
            channel: PubSubChannel::new(),
        }
    }

    pub fn publisher(&self) -> EventPublisher<'_> {
        EventPublisher {
            inner: self.channel.immediate_publisher(),
        }
    }

    pub fn subscriber(&self) -> Result<EventSubscriber<'_>, BusError> {
        let inner = self
            .channel
            .subscriber()
            .map_err(|_| BusError::SubscribersExhausted)?;
        Ok(EventSubscriber { inner })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Never waits: when a subscriber falls behind the oldest event is dropped.
pub struct EventPublisher<'a> {
    inner: ImmediatePublisher<
        'a,
        CriticalSectionRawMutex,
        BrewEvent,
        EVENT_QUEUE_DEPTH,
        MAX_SUBSCRIBERS,
        MAX_PUBLISHERS,
    >,
}

impl BrewObserver for EventPublisher<'_> {
    fn on_brew_event(&mut self, event: &BrewEvent) {
        self.inner.publish_immediate(event.clone());
    }
}

pub struct EventSubscriber<'a> {
    inner: Subscriber<
        'a,
        CriticalSectionRawMutex,
        BrewEvent,
        EVENT_QUEUE_DEPTH,
        MAX_SUBSCRIBERS,
        MAX_PUBLISHERS,
    >,
}

impl<'a> EventSubscriber<'a> {
    pub async fn next_event(&mut self) -> BrewEvent {
        loop {
            match self.inner.next_message().await {
                WaitResult::Lagged(missed) => {
                    log::debug!("Event subscriber lagged, {} events dropped", missed);
                    continue;
                }
                WaitResult::Message(event) => return event,
            }
        }
    }

    /// Wait until an event matching the filter arrives
    pub async fn wait_for<F>(&mut self, filter: F) -> BrewEvent
    where
        F: Fn(&BrewEvent) -> bool,
    {
        loop {
            let event = self.next_event().await;
            if filter(&event) {
                return event;
            }
        }
    }

    pub fn try_next_event(&mut self) -> Option<BrewEvent> {
        loop {
            match self.inner.try_next_message()? {
                WaitResult::Lagged(_) => continue,
                WaitResult::Message(event) => return Some(event),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |event: &BrewEvent| seen.push(event.clone());
            observer.on_brew_event(&BrewEvent::SessionReset);
        }
        assert_eq!(seen, vec![BrewEvent::SessionReset]);
    }

    #[test]
    fn test_bus_delivers_to_every_subscriber() {
        let bus = EventBus::new();
        let mut first = bus.subscriber().unwrap();
        let mut second = bus.subscriber().unwrap();
        let mut publisher = bus.publisher();

        publisher.on_brew_event(&BrewEvent::StageStarted { stage: StageId::First });

        assert_eq!(
            first.try_next_event(),
            Some(BrewEvent::StageStarted { stage: StageId::First })
        );
        assert_eq!(
            second.try_next_event(),
            Some(BrewEvent::StageStarted { stage: StageId::First })
        );
        assert_eq!(first.try_next_event(), None);
    }

    #[test]
    fn test_subscriber_slots_are_bounded() {
        let bus = EventBus::new();
        let _held: Vec<_> = (0..MAX_SUBSCRIBERS).map(|_| bus.subscriber().unwrap()).collect();
        assert_eq!(bus.subscriber().err(), Some(BusError::SubscribersExhausted));
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&BrewEvent::StageCompleted {
            stage: StageId::Second,
            by_skip: true,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"stage_completed","stage":"Second","by_skip":true}"#);
        assert_eq!(
            serde_json::to_string(&BrewEvent::SessionReset).unwrap(),
            r#"{"event":"session_reset"}"#
        );
        assert_eq!(
            serde_json::to_string(&BrewEvent::LeafAmountChanged {
                leaf_grams: 5,
                water_ml: 150,
            })
            .unwrap(),
            r#"{"event":"leaf_amount_changed","leaf_grams":5,"water_ml":150}"#
        );
    }
}

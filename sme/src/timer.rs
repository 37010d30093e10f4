//! Cancellable timers, delivered to the serve loop as (deadline, event)
//! entries. An event whose id no longer matches the one recorded by the FSM
//! is stale and ignored by the receiver.

use futures::channel::mpsc;
use std::time::{Duration, Instant};

pub type EventId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent<E> {
    pub id: EventId,
    pub event: E,
}

pub type TimeEntry<E> = (Instant, TimedEvent<E>);
pub type TimeStream<E> = mpsc::UnboundedReceiver<TimeEntry<E>>;

/// Events know their own timeout.
pub trait TimeoutDuration {
    fn timeout_duration(&self) -> Duration;
}

pub struct Timer<E> {
    sender: mpsc::UnboundedSender<TimeEntry<E>>,
    next_id: EventId,
}

impl<E: TimeoutDuration> Timer<E> {
    pub fn schedule(&mut self, event: E) -> EventId {
        let deadline = Instant::now() + event.timeout_duration();
        self.schedule_at(deadline, event)
    }
}

impl<E> Timer<E> {
    pub fn schedule_at(&mut self, deadline: Instant, event: E) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        let _ = self.sender.unbounded_send((deadline, TimedEvent { id, event }));
        id
    }

    pub fn schedule_after(&mut self, duration: Duration, event: E) -> EventId {
        self.schedule_at(Instant::now() + duration, event)
    }
}

pub fn create_timer<E>() -> (Timer<E>, TimeStream<E>) {
    let (sender, receiver) = mpsc::unbounded();
    (Timer { sender, next_id: 0 }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};

    #[derive(Debug, PartialEq)]
    struct Event(u32);

    impl TimeoutDuration for Event {
        fn timeout_duration(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let (mut timer, mut stream) = create_timer::<Event>();
        let a = timer.schedule(Event(1));
        let b = timer.schedule(Event(2));
        assert!(b > a);

        let (_, event) = stream.next().now_or_never().flatten().expect("expected entry");
        assert_eq!(event.id, a);
        assert_eq!(event.event, Event(1));
    }

    #[test]
    fn deadline_honors_timeout_duration() {
        let (mut timer, mut stream) = create_timer::<Event>();
        let before = Instant::now();
        timer.schedule(Event(1));
        let (deadline, _) = stream.next().now_or_never().flatten().expect("expected entry");
        assert!(deadline >= before + Duration::from_secs(1));
    }
}

//! This module provides the [`StateMachine`]'s `Events`, `EventSubscriber` and `EventPublisher`
//! types.
//!
//! [`StateMachine`]: crate::state_machine::StateMachine

use std::{collections::BTreeSet, sync::Arc};

use tokio::sync::watch;

use gossipfl_core::{NodeId, RoundId};

use crate::{
    report::RoundReport,
    state_machine::{coordinator::CoordinatorState, phases::PhaseName},
    store::NodeStateStore,
};

/// An event emitted by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<E> {
    /// Metadata that associates this event to the round in which it is
    /// emitted.
    pub round_id: RoundId,
    /// The event itself
    pub event: E,
}

/// Eligible set update event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibleUpdate {
    Invalidate,
    New(Arc<BTreeSet<NodeId>>),
}

/// Round report update event.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportUpdate {
    Invalidate,
    New(Arc<RoundReport>),
}

/// A convenience type to emit any coordinator event.
#[derive(Debug)]
pub struct EventPublisher {
    /// Round ID that is attached to all the events.
    round_id: RoundId,
    params_tx: EventBroadcaster<CoordinatorState>,
    phase_tx: EventBroadcaster<PhaseName>,
    eligible_tx: EventBroadcaster<EligibleUpdate>,
    store_tx: EventBroadcaster<Arc<NodeStateStore>>,
    report_tx: EventBroadcaster<ReportUpdate>,
}

/// The `EventSubscriber` hands out `EventListener`s for any
/// coordinator event.
#[derive(Debug)]
pub struct EventSubscriber {
    params_rx: EventListener<CoordinatorState>,
    phase_rx: EventListener<PhaseName>,
    eligible_rx: EventListener<EligibleUpdate>,
    store_rx: EventListener<Arc<NodeStateStore>>,
    report_rx: EventListener<ReportUpdate>,
}

impl EventPublisher {
    /// Initialize a new event publisher with the given initial events.
    pub fn init(
        round_id: RoundId,
        params: CoordinatorState,
        phase: PhaseName,
        store: Arc<NodeStateStore>,
    ) -> (Self, EventSubscriber) {
        let (params_tx, params_rx) = watch::channel::<Event<CoordinatorState>>(Event {
            round_id,
            event: params,
        });

        let (phase_tx, phase_rx) = watch::channel::<Event<PhaseName>>(Event {
            round_id,
            event: phase,
        });

        let (eligible_tx, eligible_rx) = watch::channel::<Event<EligibleUpdate>>(Event {
            round_id,
            event: EligibleUpdate::Invalidate,
        });

        let (store_tx, store_rx) = watch::channel::<Event<Arc<NodeStateStore>>>(Event {
            round_id,
            event: store,
        });

        let (report_tx, report_rx) = watch::channel::<Event<ReportUpdate>>(Event {
            round_id,
            event: ReportUpdate::Invalidate,
        });

        let publisher = EventPublisher {
            round_id,
            params_tx: params_tx.into(),
            phase_tx: phase_tx.into(),
            eligible_tx: eligible_tx.into(),
            store_tx: store_tx.into(),
            report_tx: report_tx.into(),
        };

        let subscriber = EventSubscriber {
            params_rx: params_rx.into(),
            phase_rx: phase_rx.into(),
            eligible_rx: eligible_rx.into(),
            store_rx: store_rx.into(),
            report_rx: report_rx.into(),
        };

        (publisher, subscriber)
    }

    /// Set the round ID that is attached to the events the publisher broadcasts.
    pub fn set_round_id(&mut self, id: RoundId) {
        self.round_id = id;
    }

    fn event<T>(&self, event: T) -> Event<T> {
        Event {
            round_id: self.round_id,
            event,
        }
    }

    /// Emit a round parameters event
    pub fn broadcast_params(&mut self, params: CoordinatorState) {
        self.params_tx.broadcast(self.event(params));
    }

    /// Emit a phase event
    pub fn broadcast_phase(&mut self, phase: PhaseName) {
        self.phase_tx.broadcast(self.event(phase));
    }

    /// Emit an eligible set event
    pub fn broadcast_eligible(&mut self, update: EligibleUpdate) {
        self.eligible_tx.broadcast(self.event(update));
    }

    /// Emit a node state store event
    pub fn broadcast_store(&mut self, store: Arc<NodeStateStore>) {
        self.store_tx.broadcast(self.event(store));
    }

    /// Emit a round report event
    pub fn broadcast_report(&mut self, update: ReportUpdate) {
        self.report_tx.broadcast(self.event(update));
    }
}

impl EventSubscriber {
    /// Get a listener for round parameters events
    pub fn params_listener(&self) -> EventListener<CoordinatorState> {
        self.params_rx.clone()
    }

    /// Get a listener for new phase events
    pub fn phase_listener(&self) -> EventListener<PhaseName> {
        self.phase_rx.clone()
    }

    /// Get a listener for eligible set events
    pub fn eligible_listener(&self) -> EventListener<EligibleUpdate> {
        self.eligible_rx.clone()
    }

    /// Get a listener for node state store events
    pub fn store_listener(&self) -> EventListener<Arc<NodeStateStore>> {
        self.store_rx.clone()
    }

    /// Get a listener for round report events
    pub fn report_listener(&self) -> EventListener<ReportUpdate> {
        self.report_rx.clone()
    }
}

/// A listener for coordinator events. It can be used to either
/// retrieve the latest `Event<E>` emitted by the coordinator (with
/// `EventListener::get_latest`) or to wait for the next event (with
/// `EventListener::changed`).
#[derive(Debug, Clone)]
pub struct EventListener<E>(watch::Receiver<Event<E>>);

impl<E> From<watch::Receiver<Event<E>>> for EventListener<E> {
    fn from(receiver: watch::Receiver<Event<E>>) -> Self {
        EventListener(receiver)
    }
}

impl<E> EventListener<E>
where
    E: Clone,
{
    pub fn get_latest(&self) -> Event<E> {
        self.0.borrow().clone()
    }

    /// Waits for the next event. Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<Event<E>> {
        self.0.changed().await.ok()?;
        Some(self.get_latest())
    }
}

/// A channel to send `Event<E>` to all the `EventListener<E>`.
#[derive(Debug)]
pub struct EventBroadcaster<E>(watch::Sender<Event<E>>);

impl<E> EventBroadcaster<E> {
    /// Send `event` to all the `EventListener<E>`
    fn broadcast(&self, event: Event<E>) {
        // We don't care whether there's a listener or not
        let _ = self.0.send(event);
    }
}

impl<E> From<watch::Sender<Event<E>>> for EventBroadcaster<E> {
    fn from(sender: watch::Sender<Event<E>>) -> Self {
        Self(sender)
    }
}

//! Group-scoped publish/subscribe router
//!
//! The EventBus runs a single router task that owns the routing table
//! `type -> group -> {subscription}`. Producers and subscribers only talk to the
//! router through a command channel, so the table needs no locking.
//!
//! Publishing never blocks the producer:
//! - `publish()` hands the event to the router and returns
//! - the router resolves the delivery set and spawns one delivery task per publish
//! - mailboxes are unbounded, so a subscriber that stops draining only grows its
//!   own mailbox and never stalls the router or other subscribers
//!
//! Delivery tasks are chained: each one waits for the previous publish's delivery
//! to finish before sending, so every mailbox sees events in publish order.
//!
//! The bus is purely in-memory. Nothing survives a restart.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{Event, EventPayload, EventType, GroupId};

/// Identifier of one subscription
type SubscriptionId = u64;

enum Command {
    Subscribe {
        id: SubscriptionId,
        types: Vec<EventType>,
        groups: Vec<GroupId>,
        mailbox: mpsc::UnboundedSender<Event>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Publish(Event),
    RemoveGroups(Vec<GroupId>),
    Count(oneshot::Sender<usize>),
    Shutdown,
}

/// Central event distribution bus
///
/// Cheap to clone; all clones talk to the same router.
///
/// # Examples
///
/// ```
/// use jukebox_common::events::{EventBus, EventPayload, EventType, GroupId};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bus = EventBus::new();
/// let mut sub = bus.subscribe(&[EventType::Skip], &[GroupId::from("party")]);
///
/// bus.publish("party", EventPayload::Skip);
///
/// let event = sub.recv().await.unwrap();
/// assert_eq!(event.event_type(), EventType::Skip);
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus and spawn its router task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Router::default().run(rx));
        info!("EventBus router started");
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register interest in `types` published on any of `groups`
    ///
    /// The returned subscription is live until it is dropped or passed to
    /// [`EventBus::unsubscribe`]. Events published after this call returns are
    /// delivered to it.
    pub fn subscribe(&self, types: &[EventType], groups: &[GroupId]) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (mailbox, rx) = mpsc::unbounded_channel();

        let command = Command::Subscribe {
            id,
            types: types.to_vec(),
            groups: groups.to_vec(),
            mailbox,
        };
        if self.tx.send(command).is_err() {
            warn!(subscription = id, "Subscribe after EventBus router stopped");
        }

        Subscription {
            id,
            rx,
            bus: self.tx.clone(),
        }
    }

    /// Remove every registration of `sub`
    ///
    /// Safe to call more than once. Deliveries already spawned still arrive.
    pub fn unsubscribe(&self, sub: &Subscription) {
        let _ = self.tx.send(Command::Unsubscribe { id: sub.id });
    }

    /// Publish an event to all subscribers of its type on `group` or on the wildcard group
    pub fn publish(&self, group: impl Into<GroupId>, payload: EventPayload) {
        let event = Event::new(group.into(), payload);
        if let Err(mpsc::error::SendError(cmd)) = self.tx.send(Command::Publish(event)) {
            if let Command::Publish(event) = cmd {
                warn!(
                    event_type = %event.event_type(),
                    group = %event.group(),
                    "Dropping event, EventBus router stopped"
                );
            }
        }
    }

    /// Drop all registrations on `groups`
    ///
    /// Subscriptions left without any registration are closed.
    pub fn remove_groups(&self, groups: &[GroupId]) {
        let _ = self.tx.send(Command::RemoveGroups(groups.to_vec()));
    }

    /// Get the current number of live subscriptions
    ///
    /// Useful for debugging and monitoring
    pub async fn subscription_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Count(reply)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Stop the router task; later publishes are dropped
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's mailbox
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Event>,
    bus: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    /// Wait for the next event
    ///
    /// Returns `None` once the subscription has been removed from the bus and
    /// all in-flight deliveries were drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.bus.send(Command::Unsubscribe { id: self.id });
    }
}

struct Mailbox {
    sender: mpsc::UnboundedSender<Event>,
    types: Vec<EventType>,
    groups: Vec<GroupId>,
}

#[derive(Default)]
struct Router {
    routes: HashMap<EventType, HashMap<GroupId, HashSet<SubscriptionId>>>,
    mailboxes: HashMap<SubscriptionId, Mailbox>,
    /// Completion signal of the most recently spawned delivery task
    last_delivery: Option<oneshot::Receiver<()>>,
}

impl Router {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Subscribe {
                    id,
                    types,
                    groups,
                    mailbox,
                } => self.subscribe(id, types, groups, mailbox),
                Command::Unsubscribe { id } => self.unsubscribe(id),
                Command::Publish(event) => self.forward(event),
                Command::RemoveGroups(groups) => self.remove_groups(&groups),
                Command::Count(reply) => {
                    let _ = reply.send(self.mailboxes.len());
                }
                Command::Shutdown => break,
            }
        }
        info!("EventBus router stopped");
    }

    fn subscribe(
        &mut self,
        id: SubscriptionId,
        types: Vec<EventType>,
        groups: Vec<GroupId>,
        sender: mpsc::UnboundedSender<Event>,
    ) {
        for event_type in &types {
            let by_group = self.routes.entry(*event_type).or_default();
            for group in &groups {
                by_group.entry(group.clone()).or_default().insert(id);
            }
        }
        debug!(subscription = id, ?types, ?groups, "New subscription");
        self.mailboxes.insert(
            id,
            Mailbox {
                sender,
                types,
                groups,
            },
        );
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        let Some(mailbox) = self.mailboxes.remove(&id) else {
            return;
        };
        for event_type in &mailbox.types {
            if let Some(by_group) = self.routes.get_mut(event_type) {
                for group in &mailbox.groups {
                    if let Some(ids) = by_group.get_mut(group) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            by_group.remove(group);
                        }
                    }
                }
                if by_group.is_empty() {
                    self.routes.remove(event_type);
                }
            }
        }
        debug!(subscription = id, "Unsubscribed");
    }

    fn remove_groups(&mut self, groups: &[GroupId]) {
        for by_group in self.routes.values_mut() {
            for group in groups {
                by_group.remove(group);
            }
        }
        self.routes.retain(|_, by_group| !by_group.is_empty());

        let mut closed = Vec::new();
        for (id, mailbox) in self.mailboxes.iter_mut() {
            let before = mailbox.groups.len();
            mailbox.groups.retain(|g| !groups.contains(g));
            if before > 0 && mailbox.groups.is_empty() {
                closed.push(*id);
            }
        }
        for id in &closed {
            self.mailboxes.remove(id);
        }
        info!(
            groups = groups.len(),
            closed_subscriptions = closed.len(),
            "Removed event groups"
        );
    }

    fn forward(&mut self, event: Event) {
        let event_type = event.event_type();
        let mut targets: HashSet<SubscriptionId> = HashSet::new();

        if let Some(by_group) = self.routes.get(&event_type) {
            if let Some(ids) = by_group.get(event.group()) {
                targets.extend(ids.iter().copied());
            }
            if !event.group().is_any() {
                if let Some(ids) = by_group.get(&GroupId::any()) {
                    targets.extend(ids.iter().copied());
                }
            }
        }

        let senders: Vec<mpsc::UnboundedSender<Event>> = targets
            .iter()
            .filter_map(|id| self.mailboxes.get(id))
            .map(|mailbox| mailbox.sender.clone())
            .collect();

        if senders.is_empty() {
            debug!(event_type = %event_type, group = %event.group(), "No subscribers for event");
            return;
        }

        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.last_delivery.replace(done_rx);

        tokio::spawn(async move {
            if let Some(previous) = previous {
                // Err only means the previous delivery task is gone
                let _ = previous.await;
            }
            for sender in &senders {
                let _ = sender.send(event.clone());
            }
            debug!(
                event_type = %event_type,
                group = %event.group(),
                subscribers = senders.len(),
                "Forwarded event"
            );
            let _ = done_tx.send(());
        });
    }
}

use std::fmt;
use std::sync::Arc;

use log::trace;
use parking_lot::RwLock;

use crate::error::Result;
use crate::item::ClientData;
use crate::{Bucketer, Condition};

/// EventType names a point in a flag's lifecycle that subscribers can listen to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    PreCreate,
    PostCreate,
    PreEnable,
    PostEnable,
    PreDisable,
    PostDisable,
    PreDestroy,
    PostDestroy,
    PreAddCondition,
    PostAddCondition,
    PreSetConditions,
    PostSetConditions,
    PreSetBucketer,
    PostSetBucketer,
    PreSetClientData,
    PostSetClientData,
}

/// FlagEvent is emitted by the client around each store write, carrying the arguments of the
/// write. Pre events fire before the store is touched; post events after it succeeded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FlagEvent<'a> {
    PreCreate {
        feature_name: &'a str,
        is_enabled: bool,
        client_data: Option<&'a ClientData>,
    },
    PostCreate {
        feature_name: &'a str,
        is_enabled: bool,
        client_data: Option<&'a ClientData>,
    },
    PreEnable { feature_name: &'a str },
    PostEnable { feature_name: &'a str },
    PreDisable { feature_name: &'a str },
    PostDisable { feature_name: &'a str },
    PreDestroy { feature_name: &'a str },
    PostDestroy { feature_name: &'a str },
    PreAddCondition {
        feature_name: &'a str,
        condition: &'a Condition,
    },
    PostAddCondition {
        feature_name: &'a str,
        condition: &'a Condition,
    },
    PreSetConditions {
        feature_name: &'a str,
        conditions: &'a [Condition],
    },
    PostSetConditions {
        feature_name: &'a str,
        conditions: &'a [Condition],
    },
    PreSetBucketer {
        feature_name: &'a str,
        bucketer: &'a Bucketer,
    },
    PostSetBucketer {
        feature_name: &'a str,
        bucketer: &'a Bucketer,
    },
    /// `client_data` is the merged result that will be (or was) stored.
    PreSetClientData {
        feature_name: &'a str,
        client_data: &'a ClientData,
    },
    PostSetClientData {
        feature_name: &'a str,
        client_data: &'a ClientData,
    },
}

impl<'a> FlagEvent<'a> {
    pub fn event_type(&self) -> EventType {
        match self {
            FlagEvent::PreCreate { .. } => EventType::PreCreate,
            FlagEvent::PostCreate { .. } => EventType::PostCreate,
            FlagEvent::PreEnable { .. } => EventType::PreEnable,
            FlagEvent::PostEnable { .. } => EventType::PostEnable,
            FlagEvent::PreDisable { .. } => EventType::PreDisable,
            FlagEvent::PostDisable { .. } => EventType::PostDisable,
            FlagEvent::PreDestroy { .. } => EventType::PreDestroy,
            FlagEvent::PostDestroy { .. } => EventType::PostDestroy,
            FlagEvent::PreAddCondition { .. } => EventType::PreAddCondition,
            FlagEvent::PostAddCondition { .. } => EventType::PostAddCondition,
            FlagEvent::PreSetConditions { .. } => EventType::PreSetConditions,
            FlagEvent::PostSetConditions { .. } => EventType::PostSetConditions,
            FlagEvent::PreSetBucketer { .. } => EventType::PreSetBucketer,
            FlagEvent::PostSetBucketer { .. } => EventType::PostSetBucketer,
            FlagEvent::PreSetClientData { .. } => EventType::PreSetClientData,
            FlagEvent::PostSetClientData { .. } => EventType::PostSetClientData,
        }
    }

    /// The flag the event concerns.
    pub fn feature_name(&self) -> &'a str {
        match *self {
            FlagEvent::PreCreate { feature_name, .. }
            | FlagEvent::PostCreate { feature_name, .. }
            | FlagEvent::PreEnable { feature_name }
            | FlagEvent::PostEnable { feature_name }
            | FlagEvent::PreDisable { feature_name }
            | FlagEvent::PostDisable { feature_name }
            | FlagEvent::PreDestroy { feature_name }
            | FlagEvent::PostDestroy { feature_name }
            | FlagEvent::PreAddCondition { feature_name, .. }
            | FlagEvent::PostAddCondition { feature_name, .. }
            | FlagEvent::PreSetConditions { feature_name, .. }
            | FlagEvent::PostSetConditions { feature_name, .. }
            | FlagEvent::PreSetBucketer { feature_name, .. }
            | FlagEvent::PostSetBucketer { feature_name, .. }
            | FlagEvent::PreSetClientData { feature_name, .. }
            | FlagEvent::PostSetClientData { feature_name, .. } => feature_name,
        }
    }
}

/// FlagEventSubscriber receives lifecycle events. Returning an error from a pre event aborts the
/// operation before the store is written; from a post event it is reported to the caller after
/// the write.
pub trait FlagEventSubscriber: Send + Sync {
    fn on_event(&self, event: &FlagEvent<'_>) -> Result<()>;
}

impl<F> FlagEventSubscriber for F
where
    F: Fn(&FlagEvent<'_>) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &FlagEvent<'_>) -> Result<()> {
        self(event)
    }
}

struct Listener {
    // None listens to every event type.
    event_type: Option<EventType>,
    subscriber: Arc<dyn FlagEventSubscriber>,
}

/// EventEmitter dispatches events to registered subscribers in registration order.
#[derive(Default)]
pub struct EventEmitter {
    listeners: RwLock<Vec<Listener>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for events of one type.
    pub fn on(&self, event_type: EventType, subscriber: impl FlagEventSubscriber + 'static) {
        self.register(Some(event_type), Arc::new(subscriber));
    }

    /// Register `subscriber` for every event.
    pub fn subscribe(&self, subscriber: Arc<dyn FlagEventSubscriber>) {
        self.register(None, subscriber);
    }

    fn register(&self, event_type: Option<EventType>, subscriber: Arc<dyn FlagEventSubscriber>) {
        self.listeners.write().push(Listener {
            event_type,
            subscriber,
        });
    }

    /// Deliver `event` to every interested subscriber, stopping at the first error.
    pub fn emit(&self, event: &FlagEvent<'_>) -> Result<()> {
        let event_type = event.event_type();
        // Snapshot so subscribers may register further listeners while being called.
        let subscribers: Vec<Arc<dyn FlagEventSubscriber>> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.event_type.map_or(true, |t| t == event_type))
            .map(|l| l.subscriber.clone())
            .collect();

        trace!(
            "Emitting {:?} for {} to {} subscribers",
            event_type,
            event.feature_name(),
            subscribers.len()
        );
        for subscriber in subscribers {
            subscriber.on_event(event)?;
        }
        Ok(())
    }
}

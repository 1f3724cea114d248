//! Typed state change notifications between components.

use serde::{Deserialize, Serialize};
use std::{cell::RefCell, fmt, rc::Rc};

/// Identity of a component sending notifications.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "component{}", self.0) }
}

pub trait Observer<T> {
    fn on_state_changed(&mut self, source: ComponentId, state: T);
}

impl<T, O: Observer<T>> Observer<T> for Rc<RefCell<O>> {
    fn on_state_changed(&mut self, source: ComponentId, state: T) {
        self.borrow_mut().on_state_changed(source, state);
    }
}

/// Records every notification.
impl<T> Observer<T> for Vec<(ComponentId, T)> {
    fn on_state_changed(&mut self, source: ComponentId, state: T) { self.push((source, state)); }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

/// Registered observers of one component. Delivery is fire and forget.
pub struct Observers<T> {
    next_id: u32,
    observers: Vec<(ObserverId, Box<dyn Observer<T>>)>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            observers: Vec::new(),
        }
    }
}

impl<T: Copy> Observers<T> {
    pub fn new() -> Self { Self::default() }

    pub fn add<O: Observer<T> + 'static>(&mut self, observer: O) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns whether the observer was registered.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let len = self.observers.len();
        self.observers.retain(|(other, _)| *other != id);
        self.observers.len() != len
    }

    pub fn len(&self) -> usize { self.observers.len() }

    pub fn is_empty(&self) -> bool { self.observers.is_empty() }

    pub fn notify(&mut self, source: ComponentId, state: T) {
        for (_, observer) in self.observers.iter_mut() {
            observer.on_state_changed(source, state);
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed event channels.
//!
//! Handlers run in registration order. A payload triggered while the channel
//! is already dispatching is queued and delivered after the current one, so
//! every handler observes payloads in trigger order.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::host::HostAttribute;
use crate::layout::ContainerMetrics;
use crate::model::SelectionMap;

/// Handle returned by [`EventChannel::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Handler<T> = Box<dyn FnMut(&T)>;

struct ChannelState<T> {
    next_id: u64,
    handlers: Vec<(ListenerId, Handler<T>)>,
    queue: VecDeque<T>,
    dispatching: bool,
    removed: Vec<ListenerId>,
}

/// Single-threaded observer list.
pub struct EventChannel<T> {
    state: RefCell<ChannelState<T>>,
}

impl<T> Default for EventChannel<T> {
    fn default() -> Self {
        Self {
            state: RefCell::new(ChannelState {
                next_id: 1,
                handlers: Vec::new(),
                queue: VecDeque::new(),
                dispatching: false,
                removed: Vec::new(),
            }),
        }
    }
}

impl<T> EventChannel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers added during dispatch see the next payload.
    pub fn add<F>(&self, handler: F) -> ListenerId
    where
        F: FnMut(&T) + 'static,
    {
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.handlers.push((id, Box::new(handler)));
        id
    }

    /// Unregister a handler. Returns false for unknown ids.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.handlers.iter().position(|(h, _)| *h == id) {
            drop(state.handlers.remove(pos));
            return true;
        }
        if state.dispatching && !state.removed.contains(&id) && id.0 < state.next_id {
            state.removed.push(id);
            return true;
        }
        false
    }

    /// Deliver a payload to every handler.
    pub fn trigger(&self, payload: T) {
        let mut handlers = {
            let mut state = self.state.borrow_mut();
            if state.dispatching {
                state.queue.push_back(payload);
                return;
            }
            state.dispatching = true;
            state.queue.push_back(payload);
            std::mem::take(&mut state.handlers)
        };

        loop {
            let next = self.state.borrow_mut().queue.pop_front();
            let Some(payload) = next else { break };
            for (id, handler) in handlers.iter_mut() {
                if self.state.borrow().removed.contains(id) {
                    continue;
                }
                handler(&payload);
            }
            // Handlers registered mid-dispatch join from the next payload on.
            let added = std::mem::take(&mut self.state.borrow_mut().handlers);
            handlers.extend(added);
        }

        let mut state = self.state.borrow_mut();
        let removed = std::mem::take(&mut state.removed);
        handlers.retain(|(id, _)| !removed.contains(id));
        state.handlers = handlers;
        state.dispatching = false;
    }

    pub fn len(&self) -> usize {
        self.state.borrow().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every handler.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        if state.dispatching {
            let ids: Vec<ListenerId> = (1..state.next_id).map(ListenerId).collect();
            state.removed.extend(ids);
        }
        state.handlers.clear();
    }
}

/// Selection events raised by the highlighter.
#[derive(Default)]
pub struct SelectionEvents {
    pub on_highlight: EventChannel<SelectionMap>,
    pub on_clear: EventChannel<()>,
}

/// Everything the adapters feed into [`IfcViewer::dispatch`](crate::IfcViewer::dispatch).
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// A host attribute changed on the host side.
    AttributeChanged(HostAttribute),
    /// The highlighter selected elements.
    Highlight(SelectionMap),
    /// The highlighter cleared its selection.
    Clear,
    /// The container was resized.
    Resize(ContainerMetrics),
    FullscreenChanged(bool),
    /// The camera stopped moving.
    CameraRest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn handlers_run_in_registration_order() {
        let channel = EventChannel::<u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b"] {
            let log = log.clone();
            channel.add(move |v| log.borrow_mut().push(format!("{}{}", tag, v)));
        }
        channel.trigger(1);
        channel.trigger(2);

        assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn reentrant_triggers_are_queued_in_order() {
        let channel = Rc::new(EventChannel::<u32>::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let channel2 = Rc::downgrade(&channel);
            let log = log.clone();
            channel.add(move |v| {
                log.borrow_mut().push(*v);
                if *v == 1 {
                    if let Some(channel) = channel2.upgrade() {
                        channel.trigger(2);
                    }
                }
            });
        }
        {
            let log = log.clone();
            channel.add(move |v| log.borrow_mut().push(*v * 10));
        }

        channel.trigger(1);
        assert_eq!(*log.borrow(), vec![1, 10, 2, 20]);
    }

    #[test]
    fn remove_during_dispatch_takes_effect() {
        let channel = Rc::new(EventChannel::<()>::new());
        let hits = Rc::new(RefCell::new(0));

        let second = Rc::new(RefCell::new(None));
        {
            let channel2 = Rc::downgrade(&channel);
            let second = second.clone();
            channel.add(move |_| {
                if let (Some(channel), Some(id)) = (channel2.upgrade(), *second.borrow()) {
                    channel.remove(id);
                }
            });
        }
        {
            let hits = hits.clone();
            *second.borrow_mut() = Some(channel.add(move |_| *hits.borrow_mut() += 1));
        }

        channel.trigger(());
        channel.trigger(());
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn remove_unknown_listener() {
        let channel = EventChannel::<()>::new();
        let id = channel.add(|_| {});
        assert!(channel.remove(id));
        assert!(!channel.remove(id));
        assert!(channel.is_empty());
    }

    #[test]
    fn removed_handler_is_released() {
        let channel = EventChannel::<()>::new();
        let captured = Rc::new(());
        let held = Rc::clone(&captured);
        let id = channel.add(move |_| {
            let _ = &held;
        });
        assert_eq!(Rc::strong_count(&captured), 2);
        assert!(channel.remove(id));
        assert_eq!(Rc::strong_count(&captured), 1);
    }
}

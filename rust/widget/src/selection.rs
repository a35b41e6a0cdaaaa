// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Selection bridge: highlighter events to `selected_guids`.
//!
//! Each event takes a sequence ticket when it is raised. A translation that
//! completes after a newer event was raised is dropped, so the host always
//! ends on the most recent event's selection regardless of completion order.
//! The host commit and the view refresh for one event happen in the same
//! synchronous step and use the same snapshot.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::future::{self, try_join_all, FutureExt, LocalBoxFuture};

use crate::engine::Highlighter;
use crate::error::TranslationError;
use crate::host::{HostBridge, HostTransaction};
use crate::loader::LoaderPipeline;
use crate::model::SelectionMap;
use crate::views::ViewBinder;

/// What a selection event ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Committed { guids: Vec<String> },
    Cleared,
    /// A newer event was raised before this one finished.
    Stale,
}

pub struct SelectionBridge {
    host: HostBridge,
    pipeline: Rc<LoaderPipeline>,
    views: Rc<RefCell<ViewBinder>>,
    highlighter: Rc<dyn Highlighter>,
    sequence: Cell<u64>,
    current: RefCell<SelectionMap>,
}

impl SelectionBridge {
    pub fn new(
        host: HostBridge,
        pipeline: Rc<LoaderPipeline>,
        views: Rc<RefCell<ViewBinder>>,
        highlighter: Rc<dyn Highlighter>,
    ) -> Self {
        Self {
            host,
            pipeline,
            views,
            highlighter,
            sequence: Cell::new(0),
            current: RefCell::new(SelectionMap::new()),
        }
    }

    fn next_ticket(&self) -> u64 {
        let ticket = self.sequence.get() + 1;
        self.sequence.set(ticket);
        ticket
    }

    /// Translate a highlight and publish it.
    pub fn on_highlight(self: &Rc<Self>, selection: SelectionMap) -> LocalBoxFuture<'static, SelectionOutcome> {
        let ticket = self.next_ticket();
        if selection.is_empty() {
            self.publish(SelectionMap::new(), None);
            return future::ready(SelectionOutcome::Cleared).boxed_local();
        }

        // Translations start now, in model-set order, against the models
        // loaded when the event was raised.
        let translations: Vec<LocalBoxFuture<'static, Result<Vec<String>, TranslationError>>> = {
            let models = self.pipeline.models();
            selection
                .ordered(&models)
                .into_iter()
                .map(|(key, ids)| match models.get(key) {
                    Some(model) => model.translate(ids.iter().copied().collect()),
                    None => future::ready(Err(TranslationError::StaleHandle(key))).boxed_local(),
                })
                .collect()
        };

        let this = Rc::clone(self);
        async move {
            let translated = try_join_all(translations).await;
            if this.sequence.get() != ticket {
                tracing::debug!(ticket, latest = this.sequence.get(), "Dropping stale selection");
                return SelectionOutcome::Stale;
            }

            match translated {
                Ok(lists) => {
                    let guids: Vec<String> = lists.into_iter().flatten().collect();
                    if guids.is_empty() {
                        tracing::warn!(elements = selection.element_count(), "Selection has no GlobalIds; treating as empty");
                        this.drop_viewer_selection();
                        return SelectionOutcome::Cleared;
                    }
                    tracing::debug!(guids = guids.len(), "Selection committed");
                    this.publish(selection, Some(guids.clone()));
                    SelectionOutcome::Committed { guids }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Selection translation failed; treating as empty");
                    this.drop_viewer_selection();
                    SelectionOutcome::Cleared
                }
            }
        }
        .boxed_local()
    }

    /// Highlighter cleared its selection.
    pub fn on_clear(&self) -> SelectionOutcome {
        self.next_ticket();
        self.publish(SelectionMap::new(), None);
        SelectionOutcome::Cleared
    }

    /// Invalidate pending translations and stage `selected_guids = absent`
    /// on the caller's transaction. Used whenever the model set changes.
    pub fn reset(&self, tx: &mut HostTransaction) {
        self.next_ticket();
        tx.set_selected_guids(None);
        *self.current.borrow_mut() = SelectionMap::new();
        self.views.borrow_mut().on_selection_changed(&SelectionMap::new());
    }

    /// Selection of the last published event.
    pub fn current(&self) -> SelectionMap {
        self.current.borrow().clone()
    }

    /// Keep the viewer consistent with an empty committed selection.
    fn drop_viewer_selection(&self) {
        self.highlighter.clear();
        self.publish(SelectionMap::new(), None);
    }

    fn publish(&self, selection: SelectionMap, guids: Option<Vec<String>>) {
        let mut tx = self.host.transaction();
        tx.set_selected_guids(guids);
        tx.commit();
        self.views.borrow_mut().on_selection_changed(&selection);
        *self.current.borrow_mut() = selection;
    }
}

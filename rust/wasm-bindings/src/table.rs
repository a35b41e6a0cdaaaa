// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! View rows pushed into `bim-table` elements.

use ifc_anywidget::layout::expand_label;
use ifc_anywidget::{ViewId, ViewRow, ViewSink, ViewState};
use rustc_hash::FxHashMap;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::utils::set_js_prop;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCells {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "GlobalId", skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

/// Nested row in the `bim-table` data format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub data: TableCells,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TableRow>,
}

/// Nest flat rows by depth. Each row becomes a child of the nearest
/// preceding row that is shallower; rows with none are roots.
pub fn table_data(rows: &[ViewRow]) -> Vec<TableRow> {
    fn close(stack: &mut Vec<(usize, TableRow)>, roots: &mut Vec<TableRow>) {
        if let Some((_, row)) = stack.pop() {
            match stack.last_mut() {
                Some((_, parent)) => parent.children.push(row),
                None => roots.push(row),
            }
        }
    }

    let mut roots = Vec::new();
    let mut stack: Vec<(usize, TableRow)> = Vec::new();
    for row in rows {
        while stack.last().is_some_and(|(depth, _)| *depth >= row.depth) {
            close(&mut stack, &mut roots);
        }
        let cells = TableCells {
            name: row.label.clone(),
            value: row.value.clone(),
            guid: row.guid.clone(),
        };
        stack.push((
            row.depth,
            TableRow {
                data: cells,
                children: Vec::new(),
            },
        ));
    }
    while !stack.is_empty() {
        close(&mut stack, &mut roots);
    }
    roots
}

struct TableTarget {
    table: web_sys::Element,
    expand_button: Option<web_sys::Element>,
}

/// [`ViewSink`] writing into the panel's `bim-table` elements.
#[derive(Default)]
pub struct BimTableSink {
    targets: FxHashMap<ViewId, TableTarget>,
}

impl BimTableSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, view: ViewId, table: web_sys::Element, expand_button: Option<web_sys::Element>) {
        // Collapsing is applied before rows reach the table.
        set_js_prop(&table, "expanded", &JsValue::TRUE);
        self.targets.insert(view, TableTarget { table, expand_button });
    }
}

impl ViewSink for BimTableSink {
    fn render(&self, view: ViewId, rows: &[ViewRow], state: &ViewState) {
        let Some(target) = self.targets.get(&view) else {
            return;
        };
        let data = table_data(rows);
        match data.serialize(&serde_wasm_bindgen::Serializer::json_compatible()) {
            Ok(value) => {
                set_js_prop(&target.table, "data", &value);
            }
            Err(err) => tracing::error!(%view, error = %err, "Failed to convert table rows"),
        }
        if let Some(button) = &target.expand_button {
            set_js_prop(button, "label", &JsValue::from_str(expand_label(state.expanded)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(depth: usize, label: &str) -> ViewRow {
        ViewRow {
            depth,
            label: label.to_string(),
            value: None,
            guid: None,
            selected: false,
        }
    }

    #[test]
    fn nests_rows_by_depth() {
        let rows = vec![
            row(0, "IFCWALL"),
            row(1, "GlobalId"),
            row(1, "Pset_WallCommon"),
            row(2, "FireRating"),
            row(0, "IFCDOOR"),
        ];
        let data = table_data(&rows);
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].children.len(), 2);
        assert_eq!(data[0].children[1].children[0].data.name, "FireRating");
        assert!(data[1].children.is_empty());
    }

    #[test]
    fn filtered_rows_without_parents_become_roots() {
        let data = table_data(&[row(2, "FireRating"), row(2, "IsExternal"), row(3, "Source")]);
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].data.name, "IsExternal");
        assert_eq!(data[1].children[0].data.name, "Source");
    }
}

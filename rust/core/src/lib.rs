// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Anywidget Core
//!
//! STEP/IFC reading for the notebook viewer, built with [nom](https://docs.rs/nom)
//! and [memchr](https://docs.rs/memchr).
//!
//! The viewer never needs full schema decoding. It needs to know, for every
//! element the renderer can pick, which stable GlobalId the host should see
//! and which attributes the property panel should list. This crate provides:
//!
//! - **Tokenization**: zero-copy tokens for one instance line ([`parse_entity`])
//! - **Scanning**: quote-aware instance discovery ([`EntityScanner`])
//! - **Element indexing**: GlobalIds, property sets and spatial breakdown ([`ElementIndex`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifc_anywidget_core::ElementIndex;
//!
//! let index = ElementIndex::parse(&bytes)?;
//! let (guids, missing) = index.guids([5, 6]);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization of element records and property sets

pub mod elements;
pub mod error;
pub mod parser;
pub mod scanner;

pub use elements::{is_ifc_guid, ElementIndex, ElementIndexBuilder, ElementRecord, Property, PropertySet};
pub use error::{Error, Result};
pub use parser::{decode_step_string, parse_entity, Token};
pub use scanner::{file_schema, locate_data_section, EntityScanner};

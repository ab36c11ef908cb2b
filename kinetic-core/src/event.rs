//! Event Binding
//!
//! The bridge between an external event stream (gesture recognizer, scroll
//! view) and the graph's input cells.
//!
//! # How Binding Works
//!
//! 1. The host declares a [`FieldMap`]: an ordered mapping from dot-separated
//!    field paths (`"translationY"`, `"contentOffset.y"`) to target cells.
//!
//! 2. Each incoming [`Sample`] is applied field by field, in the map's
//!    declared order. Every write goes through the normal
//!    [`ValueCell::write`] path, so graph recomputation runs inline per
//!    field.
//!
//! 3. After all writes commit, the optional `on_sample` callback receives
//!    the full raw sample; it observes the post-write graph state.
//!
//! Paths must match the sample shape exactly; a missing or non-numeric
//! field is an error, never silently skipped.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cell::ValueCell;
use crate::error::{Error, Result};

/// Gesture recognizer states, as delivered in the `state` field of pan
/// gesture samples.
pub mod gesture_state {
    pub const UNDETERMINED: f64 = 0.0;
    pub const FAILED: f64 = 1.0;
    pub const BEGAN: f64 = 2.0;
    pub const CANCELLED: f64 = 3.0;
    pub const ACTIVE: f64 = 4.0;
    pub const END: f64 = 5.0;
}

/// A single field inside a sample: either a number or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleField {
    Number(f64),
    Map(IndexMap<String, SampleField>),
}

/// One event sample, shaped as nested numeric field paths.
///
/// Samples deserialize directly from the JSON shape native events arrive
/// in:
///
/// ```rust,ignore
/// let sample = Sample::from_json(r#"{"state": 4, "contentOffset": {"y": 12.0}}"#)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample(IndexMap<String, SampleField>);

impl Sample {
    /// An empty sample.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a numeric field.
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.0.insert(key.into(), SampleField::Number(value));
        self
    }

    /// Builder: set a nested group of fields.
    pub fn with_nested(mut self, key: impl Into<String>, nested: Sample) -> Self {
        self.0.insert(key.into(), SampleField::Map(nested.0));
        self
    }

    /// Parse a sample from its JSON wire shape.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Look up the numeric value at a dot-separated path.
    pub fn lookup(&self, path: &str) -> Option<f64> {
        let mut fields = &self.0;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            match fields.get(segment)? {
                SampleField::Number(n) => {
                    return if segments.peek().is_none() {
                        Some(*n)
                    } else {
                        None
                    };
                }
                SampleField::Map(nested) => fields = nested,
            }
        }
        None
    }
}

/// Ordered mapping from event field paths to target cells.
///
/// Declaration order is application order.
#[derive(Clone, Default)]
pub struct FieldMap {
    entries: Vec<(String, ValueCell)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: route the numeric value at `path` into `cell`.
    pub fn map(mut self, path: impl Into<String>, cell: &ValueCell) -> Self {
        self.entries.push((path.into(), cell.clone()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Debug for FieldMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(path, cell)| (path, cell.id())))
            .finish()
    }
}

/// Callback invoked with the full raw sample after all field writes.
pub type OnSample = Arc<dyn Fn(&Sample) + Send + Sync>;

/// Maps an external event stream's named fields onto target cells.
pub struct EventBinder;

impl EventBinder {
    /// Bind a field map, producing a handler for incoming samples.
    pub fn bind(field_map: FieldMap) -> EventHandler {
        EventHandler {
            field_map,
            on_sample: None,
        }
    }

    /// Bind a field map with a post-write sample callback.
    pub fn bind_with<F>(field_map: FieldMap, on_sample: F) -> EventHandler
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        EventHandler {
            field_map,
            on_sample: Some(Arc::new(on_sample)),
        }
    }
}

/// Applies incoming samples to the bound cells.
pub struct EventHandler {
    field_map: FieldMap,
    on_sample: Option<OnSample>,
}

impl EventHandler {
    /// Apply one sample: write every mapped field in declared order, then
    /// invoke the sample callback.
    ///
    /// Errors from graph recomputation (or a missing field) propagate to
    /// the caller; fields already written stay written.
    pub fn handle(&self, sample: &Sample) -> Result<()> {
        for (path, cell) in &self.field_map.entries {
            let value = sample
                .lookup(path)
                .ok_or_else(|| Error::MissingField(path.clone()))?;

            tracing::trace!(path = %path, cell = cell.id(), value, "event field write");
            cell.write(value)?;
        }

        if let Some(on_sample) = &self.on_sample {
            on_sample(sample);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

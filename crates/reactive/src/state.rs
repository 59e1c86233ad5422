//! Query options, derived state, and the reconciliation rule.
//!
//! `reconcile` is a pure function of the inputs a view gathers on each read.
//! Precedence, highest first:
//!
//! 1. manual override
//! 2. the synchronously available result for the current args
//! 3. the seed (initial data), until superseded
//! 4. the last resolved result, when `keep_previous_data` is on
//!
//! Errors are data: a resolved error lands in `error`, never in `data`.

use std::fmt;
use serde::Serialize;
use tether_core::{QueryOutcome, RemoteError, Value};

/// Per-view configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    /// Keep showing the previous result while new args are pending.
    pub keep_previous_data: bool,
    /// Seed shown until the first result for the view's args arrives.
    pub initial_data: Option<Value>,
}

impl QueryOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables keeping previous data.
    pub fn keep_previous_data(mut self, keep: bool) -> Self {
        self.keep_previous_data = keep;
        self
    }

    /// Sets the seed value.
    pub fn initial_data(mut self, data: Value) -> Self {
        self.initial_data = Some(data);
        self
    }
}

/// A snapshot of what a view currently shows.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    /// The result, if the resolved value is not an error
    pub data: Option<Value>,
    /// The error, if the resolved value is one
    pub error: Option<RemoteError>,
    /// No data and no error yet
    pub is_loading: bool,
    /// Showing a previous result while new args are pending
    pub is_stale: bool,
}

impl QueryState {
    /// State of a skipped view: fully inert.
    pub fn skipped() -> Self {
        Self::default()
    }

    /// Builds a state from a resolved value.
    pub fn from_resolved(resolved: Option<QueryOutcome>, is_stale: bool) -> Self {
        let (data, error) = match resolved {
            Some(Ok(value)) => (Some(value), None),
            Some(Err(err)) => (None, Some(err)),
            None => (None, None),
        };
        let is_loading = data.is_none() && error.is_none();
        Self {
            data,
            error,
            is_loading,
            is_stale,
        }
    }
}

/// Everything `reconcile` looks at.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReconcileInput<'a> {
    /// Args resolved to the skip sentinel
    pub skipped: bool,
    /// Manual override, if installed
    pub override_value: Option<&'a Value>,
    /// Cached result for the current args
    pub sync_result: Option<&'a QueryOutcome>,
    /// Seed not yet superseded
    pub seed: Option<&'a Value>,
    /// Last result delivered to this view, for any args
    pub previous: Option<&'a QueryOutcome>,
    /// `QueryOptions::keep_previous_data`
    pub keep_previous_data: bool,
    /// Current args equal the args of `previous`
    pub previous_args_match: bool,
}

/// Derives the visible state of a view.
pub fn reconcile(input: &ReconcileInput<'_>) -> QueryState {
    if input.skipped {
        return QueryState::skipped();
    }

    if let Some(value) = input.override_value {
        return QueryState::from_resolved(Some(Ok(value.clone())), false);
    }
    if let Some(outcome) = input.sync_result {
        return QueryState::from_resolved(Some(outcome.clone()), false);
    }
    if let Some(seed) = input.seed {
        return QueryState::from_resolved(Some(Ok(seed.clone())), false);
    }
    if input.keep_previous_data {
        if let Some(previous) = input.previous {
            return QueryState::from_resolved(Some(previous.clone()), !input.previous_args_match);
        }
    }
    QueryState::from_resolved(None, false)
}

/// Handle returned by `with_override`.
///
/// Releasing it clears the override it installed, unless a newer override
/// or a channel delivery has replaced it in the meantime. Dropping it without
/// releasing leaves the override in place.
#[must_use = "release the token once the write settles"]
pub struct OverrideToken {
    release: Option<Box<dyn FnOnce()>>,
}

impl OverrideToken {
    pub(crate) fn new<F>(release: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Clears the override this token installed.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for OverrideToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideToken")
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skipped_is_inert() {
        let value = json!(1);
        let outcome: QueryOutcome = Ok(json!(2));
        let state = reconcile(&ReconcileInput {
            skipped: true,
            override_value: Some(&value),
            sync_result: Some(&outcome),
            seed: Some(&value),
            previous: Some(&outcome),
            keep_previous_data: true,
            previous_args_match: false,
        });
        assert_eq!(state, QueryState::skipped());
        assert!(!state.is_loading);
    }

    #[test]
    fn test_nothing_is_loading() {
        let state = reconcile(&ReconcileInput::default());
        assert!(state.is_loading);
        assert_eq!(state.data, None);
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_override_beats_sync() {
        let o = json!("optimistic");
        let sync: QueryOutcome = Ok(json!("server"));
        let state = reconcile(&ReconcileInput {
            override_value: Some(&o),
            sync_result: Some(&sync),
            ..Default::default()
        });
        assert_eq!(state.data, Some(o));
    }

    #[test]
    fn test_sync_error_is_error_only() {
        let sync: QueryOutcome = Err(RemoteError::new("disconnected"));
        let state = reconcile(&ReconcileInput {
            sync_result: Some(&sync),
            ..Default::default()
        });
        assert_eq!(state.data, None);
        assert_eq!(state.error.unwrap().message, "disconnected");
        assert!(!state.is_loading);
    }

    #[test]
    fn test_seed_before_previous() {
        let seed = json!("seed");
        let previous: QueryOutcome = Ok(json!("previous"));
        let state = reconcile(&ReconcileInput {
            seed: Some(&seed),
            previous: Some(&previous),
            keep_previous_data: true,
            ..Default::default()
        });
        assert_eq!(state.data, Some(seed));
        assert!(!state.is_stale);
    }

    #[test]
    fn test_previous_requires_keep_previous_data() {
        let previous: QueryOutcome = Ok(json!("previous"));
        let off = reconcile(&ReconcileInput {
            previous: Some(&previous),
            ..Default::default()
        });
        assert!(off.is_loading);

        let on = reconcile(&ReconcileInput {
            previous: Some(&previous),
            keep_previous_data: true,
            previous_args_match: false,
            ..Default::default()
        });
        assert_eq!(on.data, Some(json!("previous")));
        assert!(on.is_stale);
    }

    #[test]
    fn test_previous_for_same_args_is_not_stale() {
        let previous: QueryOutcome = Ok(json!("previous"));
        let state = reconcile(&ReconcileInput {
            previous: Some(&previous),
            keep_previous_data: true,
            previous_args_match: true,
            ..Default::default()
        });
        assert!(!state.is_stale);
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = QueryState::from_resolved(Some(Ok(json!([1]))), false);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isLoading"], json!(false));
        assert_eq!(json["data"], json!([1]));
    }

    #[test]
    fn test_options_builder() {
        let options = QueryOptions::new()
            .keep_previous_data(true)
            .initial_data(json!({ "id": 1 }));
        assert!(options.keep_previous_data);
        assert_eq!(options.initial_data, Some(json!({ "id": 1 })));
    }
}

//! Per-request state shared by every task of one invocation.
//!
//! Holds the caller's parameters, the subject id and the memo of data
//! results computed so far. A context is created once per request and
//! dropped with it; nothing leaks between requests.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use records::DataResult;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

/// Memo slot of one data task. Concurrent fetchers of the same name share
/// the slot, so the task is computed at most once per request.
pub(crate) type Slot = Arc<OnceCell<Arc<DataResult>>>;

#[derive(Debug, Default)]
pub struct RequestContext {
    params: Map<String, Value>,
    id: Option<String>,
    debug: bool,
    cache: DashMap<String, Slot>,
}

impl RequestContext {
    /// Build a context from request parameters.
    ///
    /// An `id` parameter (string or number) becomes the subject id and
    /// `debug: true` turns on per-stage logging.
    pub fn new(params: Map<String, Value>) -> Self {
        let id = params.get("id").and_then(scalar_string);
        let debug = params.get("debug").and_then(Value::as_bool).unwrap_or(false);
        Self {
            params,
            id,
            debug,
            cache: DashMap::new(),
        }
    }

    /// Build a context from a request body; anything but an object is
    /// treated as no parameters.
    pub fn from_value(body: Value) -> Self {
        match body {
            Value::Object(params) => Self::new(params),
            _ => Self::default(),
        }
    }

    /// Bind the subject id, overriding any `id` parameter.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Scalar parameter as a string. `id` resolves to the bound subject id.
    pub fn lookup_str(&self, name: &str) -> Option<String> {
        if name == "id" {
            return self.id.clone();
        }
        self.params.get(name).and_then(scalar_string)
    }

    /// Supply the result of a data task up front.
    ///
    /// Returns false when the name already has a result; the first one
    /// stays.
    pub fn seed(&self, name: impl Into<String>, result: DataResult) -> bool {
        match self.cache.entry(name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(OnceCell::new_with(Some(Arc::new(result)))));
                true
            }
        }
    }

    /// Result already computed or seeded for `name`.
    pub fn cached(&self, name: &str) -> Option<Arc<DataResult>> {
        self.cache
            .get(name)
            .and_then(|slot| slot.get().cloned())
    }

    pub(crate) fn slot(&self, name: &str) -> Slot {
        self.cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use records::{Field, FieldType};
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_id_and_debug_are_read_from_params() {
        let ctx = RequestContext::new(params(json!({"id": 42, "debug": true, "city": "Oslo"})));
        assert_eq!(ctx.id(), Some("42"));
        assert!(ctx.debug());
        assert_eq!(ctx.lookup_str("city").as_deref(), Some("Oslo"));
        assert_eq!(ctx.lookup_str("missing"), None);
    }

    #[test]
    fn test_with_id_overrides_param() {
        let ctx = RequestContext::new(params(json!({"id": "a"}))).with_id("b");
        assert_eq!(ctx.lookup_str("id").as_deref(), Some("b"));
    }

    #[test]
    fn test_non_object_body_is_empty() {
        let ctx = RequestContext::from_value(json!([1, 2]));
        assert!(ctx.params().is_empty());
        assert_eq!(ctx.id(), None);
        assert!(!ctx.debug());
    }

    #[test]
    fn test_first_seed_wins() {
        let ctx = RequestContext::default();
        let fields = vec![Field::new("x", FieldType::Int32)];
        let first = DataResult::from_records("t", fields.clone(), vec![json!({"x": 1})]).unwrap();
        let second = DataResult::empty("t", fields);

        assert!(ctx.seed("t", first));
        assert!(!ctx.seed("t", second));
        assert_eq!(ctx.cached("t").unwrap().len(), 1);
        assert!(ctx.cached("other").is_none());
    }
}

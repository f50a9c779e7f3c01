//! Action, property, and batch data model shared by all pipeline components.
//!
//! Actions are immutable once constructed. Their wire form is the collector's
//! `/batch` element shape:
//!
//! ```json
//! {
//!   "type": "capture",
//!   "event": "level_completed",
//!   "distinct_id": "user-42",
//!   "timestamp": "2026-08-30T12:00:00Z",
//!   "properties": { "level": 3, "$set": { "plan": "pro" } }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// The collector only accepts individual actions smaller than 32 KB.
pub const MAX_ACTION_BYTES: usize = 32 * 1024;

/// The collector only accepts requests smaller than 512 KB; 12 KB is left
/// as margin below that.
pub const MAX_BATCH_BYTES: usize = 500 * 1024;

/// A property value: scalar or string, no nested collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer number.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// String.
    String(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Event-scoped properties plus the two user-property maps carried on
/// identify-style actions.
///
/// `$set` entries overwrite user properties at the collector; `$set_once`
/// entries are written only if absent. Maps are ordered so an action
/// serializes to the same bytes every time, keeping its computed size stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    event: BTreeMap<String, Value>,
    set: BTreeMap<String, Value>,
    set_once: BTreeMap<String, Value>,
}

impl Properties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event-scoped property. Chainable.
    pub fn set_event_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event.insert(key.into(), value.into());
        self
    }

    /// Adds a user property with overwrite semantics at the collector. Chainable.
    pub fn set_user_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    /// Adds a user property with write-if-absent semantics at the collector. Chainable.
    pub fn set_user_property_once(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set_once.insert(key.into(), value.into());
        self
    }

    /// Whether all three maps are empty.
    pub fn is_empty(&self) -> bool {
        self.event.is_empty() && self.set.is_empty() && self.set_once.is_empty()
    }

    /// Returns an event-scoped property by key.
    pub fn event_property(&self, key: &str) -> Option<&Value> {
        self.event.get(key)
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.event.len()
            + usize::from(!self.set.is_empty())
            + usize::from(!self.set_once.is_empty());
        let mut map = serializer.serialize_map(Some(len))?;
        for (key, value) in &self.event {
            map.serialize_entry(key, value)?;
        }
        if !self.set.is_empty() {
            map.serialize_entry("$set", &self.set)?;
        }
        if !self.set_once.is_empty() {
            map.serialize_entry("$set_once", &self.set_once)?;
        }
        map.end()
    }
}

/// The four kinds of telemetry action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// A discrete application event with a caller-supplied name.
    Capture,
    /// Associates user properties with a distinct id.
    Identify,
    /// Links a new distinct id to an existing one.
    Alias,
    /// A page/screen view.
    Page,
}

impl ActionKind {
    /// Wire value for the `type` field.
    pub fn wire_name(self) -> &'static str {
        match self {
            ActionKind::Capture => "capture",
            ActionKind::Identify => "identify",
            ActionKind::Alias => "alias",
            ActionKind::Page => "page",
        }
    }
}

/// One telemetry event awaiting delivery.
#[derive(Debug, Clone)]
pub struct Action {
    kind: ActionKind,
    event: String,
    distinct_id: String,
    properties: Properties,
    timestamp: DateTime<Utc>,
    /// Serialized byte size, computed once at enqueue. Not on the wire.
    size: usize,
}

impl Action {
    /// Builds a capture action for a named application event.
    pub fn capture(
        distinct_id: impl Into<String>,
        event: impl Into<String>,
        properties: Option<Properties>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            kind: ActionKind::Capture,
            event: event.into(),
            distinct_id: distinct_id.into(),
            properties: properties.unwrap_or_default(),
            timestamp: timestamp.unwrap_or_else(Utc::now),
            size: 0,
        }
    }

    /// Builds an identify action carrying user properties.
    pub fn identify(
        distinct_id: impl Into<String>,
        properties: Option<Properties>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            kind: ActionKind::Identify,
            event: "$identify".to_string(),
            distinct_id: distinct_id.into(),
            properties: properties.unwrap_or_default(),
            timestamp: timestamp.unwrap_or_else(Utc::now),
            size: 0,
        }
    }

    /// Builds an alias action linking `new_id` to `original_id`.
    ///
    /// The new id rides as the `alias` event property; the original id is the
    /// action's distinct id.
    pub fn alias(
        new_id: impl Into<String>,
        original_id: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            kind: ActionKind::Alias,
            event: "$create_alias".to_string(),
            distinct_id: original_id.into(),
            properties: Properties::new().set_event_property("alias", new_id.into()),
            timestamp: timestamp.unwrap_or_else(Utc::now),
            size: 0,
        }
    }

    /// Builds a page view action.
    pub fn page(
        distinct_id: impl Into<String>,
        properties: Option<Properties>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            kind: ActionKind::Page,
            event: "$pageview".to_string(),
            distinct_id: distinct_id.into(),
            properties: properties.unwrap_or_default(),
            timestamp: timestamp.unwrap_or_else(Utc::now),
            size: 0,
        }
    }

    /// The action kind.
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// The wire event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The distinct id this action is attributed to.
    pub fn distinct_id(&self) -> &str {
        &self.distinct_id
    }

    /// The action's properties.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// The action's timestamp (enqueue time unless supplied by the caller).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialized byte size, or 0 before the scheduler has measured it.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("type", self.kind.wire_name())?;
        map.serialize_entry("event", &self.event)?;
        map.serialize_entry("distinct_id", &self.distinct_id)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("properties", &self.properties)?;
        map.end()
    }
}

/// An ordered group of actions sent in one HTTP request.
///
/// Ordering reflects dequeue order; with more than one flush worker there is
/// no global submission-order guarantee.
#[derive(Debug, Serialize)]
pub struct Batch {
    api_key: String,
    batch: Vec<Action>,
}

impl Batch {
    /// Builds a batch from assembled actions and the client's API key.
    pub fn new(api_key: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            api_key: api_key.into(),
            batch: actions,
        }
    }

    /// The actions in this batch, in dequeue order.
    pub fn actions(&self) -> &[Action] {
        &self.batch
    }

    /// Number of actions in the batch.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether the batch holds no actions.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Sum of the members' computed serialized sizes.
    pub fn byte_size(&self) -> usize {
        self.batch.iter().map(Action::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_wire_shape() {
        let action = Action::capture(
            "user-1",
            "level_completed",
            Some(Properties::new().set_event_property("level", 3)),
            None,
        );

        let json: serde_json::Value = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "capture");
        assert_eq!(json["event"], "level_completed");
        assert_eq!(json["distinct_id"], "user-1");
        assert_eq!(json["properties"]["level"], 3);
        assert!(json["timestamp"].is_string());
        // Computed size never goes on the wire
        assert!(json.get("size").is_none());
    }

    #[test]
    fn identify_carries_set_and_set_once() {
        let props = Properties::new()
            .set_user_property("plan", "pro")
            .set_user_property_once("signup_channel", "organic");
        let action = Action::identify("user-1", Some(props), None);

        let json: serde_json::Value = serde_json::to_value(&action).unwrap();
        assert_eq!(json["event"], "$identify");
        assert_eq!(json["properties"]["$set"]["plan"], "pro");
        assert_eq!(json["properties"]["$set_once"]["signup_channel"], "organic");
    }

    #[test]
    fn empty_user_property_maps_are_omitted() {
        let action = Action::capture("user-1", "tick", None, None);
        let json: serde_json::Value = serde_json::to_value(&action).unwrap();
        let props = json["properties"].as_object().unwrap();
        assert!(!props.contains_key("$set"));
        assert!(!props.contains_key("$set_once"));
    }

    #[test]
    fn alias_uses_original_id_as_distinct_id() {
        let action = Action::alias("new-id", "old-id", None);
        assert_eq!(action.distinct_id(), "old-id");
        assert_eq!(action.event(), "$create_alias");
        assert_eq!(
            action.properties().event_property("alias"),
            Some(&Value::String("new-id".into()))
        );

        let json: serde_json::Value = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "alias");
        assert_eq!(json["properties"]["alias"], "new-id");
    }

    #[test]
    fn page_defaults_to_pageview_event() {
        let action = Action::page("user-1", None, None);
        assert_eq!(action.event(), "$pageview");
        assert_eq!(action.kind().wire_name(), "page");
    }

    #[test]
    fn explicit_timestamp_is_preserved() {
        let ts = "2024-01-15T10:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let action = Action::capture("user-1", "e", None, Some(ts));
        assert_eq!(action.timestamp(), ts);
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from(7i32), Value::Int(7));
        assert_eq!(Value::from(1.5f64), Value::Float(1.5));
        assert_eq!(Value::from("s"), Value::String("s".into()));

        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::Int(3)).unwrap(), "3");
        assert_eq!(serde_json::to_string(&Value::Bool(false)).unwrap(), "false");
    }

    #[test]
    fn serialization_is_deterministic() {
        let props = Properties::new()
            .set_event_property("zebra", 1)
            .set_event_property("apple", 2);
        let action = Action::capture("user-1", "e", Some(props), None);

        let a = serde_json::to_vec(&action).unwrap();
        let b = serde_json::to_vec(&action).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn batch_envelope_shape() {
        let actions = vec![
            Action::capture("u", "one", None, None),
            Action::capture("u", "two", None, None),
        ];
        let batch = Batch::new("phc_test_key", actions);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());

        let json: serde_json::Value = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["api_key"], "phc_test_key");
        assert_eq!(json["batch"].as_array().unwrap().len(), 2);
        assert_eq!(json["batch"][0]["event"], "one");
        assert_eq!(json["batch"][1]["event"], "two");
    }

    #[test]
    fn batch_byte_size_sums_member_sizes() {
        let mut a = Action::capture("u", "one", None, None);
        a.set_size(100);
        let mut b = Action::capture("u", "two", None, None);
        b.set_size(250);

        let batch = Batch::new("key", vec![a, b]);
        assert_eq!(batch.byte_size(), 350);
    }

    #[test]
    fn ceilings_leave_per_action_margin() {
        assert!(MAX_BATCH_BYTES > MAX_ACTION_BYTES);
        assert_eq!(MAX_ACTION_BYTES, 32 * 1024);
        assert_eq!(MAX_BATCH_BYTES, 500 * 1024);
    }
}

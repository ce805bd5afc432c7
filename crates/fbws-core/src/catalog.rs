//! Indication catalog: backing-system event names → wire indications.
//!
//! Each entry names the subsystem and indication type, plus the rule used to
//! pull `id` and `data` out of the raw event payload.

use serde_json::Value;

use crate::messages::{non_empty_id, Indication};

/// How an event payload maps onto `(id, data)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// The whole payload is the data; no id.
    Whole,
    /// `payload.error` is the data, `payload.id` the id.
    ErrorField,
    /// No data, `payload.id` the id (leaving / removed events).
    IdOnly,
    /// `payload.data` is the data, `payload.id` the id.
    DataField,
}

/// One row of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub event: &'static str,
    pub subsys: &'static str,
    pub ind_type: &'static str,
    pub shape: PayloadShape,
}

impl CatalogEntry {
    /// Build the indication for one event payload.
    pub fn indication(&self, payload: &Value) -> Indication {
        let field = |name: &str| payload.get(name).cloned().unwrap_or(Value::Null);
        let id = || payload.get("id").and_then(non_empty_id);

        let (id, data) = match self.shape {
            PayloadShape::Whole => (None, payload.clone()),
            PayloadShape::ErrorField => (id(), field("error")),
            PayloadShape::IdOnly => (id(), Value::Null),
            PayloadShape::DataField => (id(), field("data")),
        };

        Indication {
            subsys: self.subsys.to_string(),
            ind_type: self.ind_type.to_string(),
            id,
            data,
        }
    }
}

const fn entry(
    event: &'static str,
    subsys: &'static str,
    ind_type: &'static str,
    shape: PayloadShape,
) -> CatalogEntry {
    CatalogEntry {
        event,
        subsys,
        ind_type,
        shape,
    }
}

use PayloadShape::*;

/// Every event the responder knows how to push.
pub static CATALOG: &[CatalogEntry] = &[
    entry("ncError", "net", "error", Whole),
    entry("netReady", "net", "ready", Whole),
    entry("started", "net", "started", Whole),
    entry("stopped", "net", "stopped", Whole),
    entry("enabled", "net", "enabled", Whole),
    entry("disabled", "net", "disabled", Whole),
    entry("permitJoin", "net", "permitJoining", Whole),
    entry("bannedDevIncoming", "net", "bannedDevIncoming", Whole),
    entry("bannedDevReporting", "net", "bannedDevReporting", Whole),
    entry("bannedGadIncoming", "net", "bannedGadIncoming", Whole),
    entry("bannedGadReporting", "net", "bannedGadReporting", Whole),
    entry("devError", "dev", "error", ErrorField),
    entry("devIncoming", "dev", "devIncoming", DataField),
    entry("devLeaving", "dev", "devLeaving", IdOnly),
    entry("netChanged", "dev", "netChanged", DataField),
    entry("statusChanged", "dev", "statusChanged", DataField),
    entry("devPropsChanged", "dev", "propsChanged", DataField),
    entry("devAttrsChanged", "dev", "attrsChanged", DataField),
    entry("devReporting", "dev", "attrsReport", DataField),
    entry("gadError", "gad", "error", ErrorField),
    entry("gadIncoming", "gad", "gadIncoming", DataField),
    entry("gadLeaving", "gad", "gadLeaving", IdOnly),
    entry("panelChanged", "gad", "panelChanged", DataField),
    entry("gadPropsChanged", "gad", "propsChanged", DataField),
    entry("gadAttrsChanged", "gad", "attrsChanged", DataField),
    entry("gadReporting", "gad", "attrsReport", DataField),
];

/// Look up an event by name.
pub fn lookup(event: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.event == event)
}

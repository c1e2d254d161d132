#![deny(warnings)]

//! Core domain models for the custom PC builder.
//!
//! This crate defines the catalog of purchasable components, the optional
//! compatibility descriptor carried by each component, and the per-kind
//! selection a builder session mutates. Everything here is plain data with
//! validation helpers; compatibility rules and totals live in sibling crates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Unique identifier for a catalog component, e.g. "amd-ryzen-9-7950x3d".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of a purchasable part.
///
/// Declaration order is the builder's presentation order, so ordered maps
/// keyed by kind iterate in the same order the steps are shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentKind {
    /// Processor
    Cpu,
    Motherboard,
    /// Graphics card
    Gpu,
    Memory,
    Storage,
    PowerSupply,
    Cooling,
    Case,
    /// Operating system license
    Os,
    /// Assembly, warranty and similar add-on services
    Service,
    Accessory,
}

impl ComponentKind {
    /// Every kind, in presentation order.
    pub const ALL: [ComponentKind; 11] = [
        ComponentKind::Cpu,
        ComponentKind::Motherboard,
        ComponentKind::Gpu,
        ComponentKind::Memory,
        ComponentKind::Storage,
        ComponentKind::PowerSupply,
        ComponentKind::Cooling,
        ComponentKind::Case,
        ComponentKind::Os,
        ComponentKind::Service,
        ComponentKind::Accessory,
    ];

    /// Wire name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Cpu => "CPU",
            ComponentKind::Motherboard => "MOTHERBOARD",
            ComponentKind::Gpu => "GPU",
            ComponentKind::Memory => "MEMORY",
            ComponentKind::Storage => "STORAGE",
            ComponentKind::PowerSupply => "POWER_SUPPLY",
            ComponentKind::Cooling => "COOLING",
            ComponentKind::Case => "CASE",
            ComponentKind::Os => "OS",
            ComponentKind::Service => "SERVICE",
            ComponentKind::Accessory => "ACCESSORY",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

/// Compatibility descriptor of a component.
///
/// Every field is optional and an absent field means "unconstrained on that
/// axis". Which fields matter depends on the component's kind; see the
/// resolver rules in `rig-compat`. Zero numbers and empty strings are read as
/// absent. Single strings and lists are both accepted for set-valued fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawCompatibility")]
pub struct Compatibility {
    /// Physical CPU socket (CPU, MOTHERBOARD; also accepted on coolers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
    /// CPU sockets a cooler can mount on.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sockets: Vec<String>,
    /// Informational only, never matched.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chipset: Vec<String>,
    /// Memory technologies, e.g. "DDR5".
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub memory: Vec<String>,
    /// Board size classes (MOTHERBOARD) or supported size classes (CASE).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub form_factor: Vec<String>,
    /// Typical draw in watts; rated output for power supplies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wattage: Option<u32>,
    /// Manufacturer-recommended minimum PSU wattage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_psu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_mm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_gpu_length_mm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radiator_size_mm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_radiator_mm: Option<u32>,
}

/// Errors produced when a serialized descriptor cannot be read at all.
#[derive(Debug, Error)]
pub enum CompatibilityError {
    #[error("malformed compatibility descriptor: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Compatibility {
    /// Parse a serialized descriptor.
    pub fn parse(raw: &str) -> Result<Self, CompatibilityError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read a descriptor from an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, CompatibilityError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a possibly missing descriptor, degrading to "no constraints".
    ///
    /// Malformed input is logged against `id` and never surfaced as an error.
    pub fn parse_or_default(id: &ComponentId, raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Self::default();
        };
        match Self::parse(raw) {
            Ok(compat) => compat,
            Err(err) => {
                warn!(component = %id, %err, "ignoring compatibility descriptor");
                Self::default()
            }
        }
    }

    /// True when no field is declared.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Wire shape of a descriptor before normalization.
///
/// Memory kits in older catalog data declare their technology as `type`
/// rather than `memory`; both are folded into [`Compatibility::memory`].
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompatibility {
    #[serde(default, deserialize_with = "lenient::text")]
    socket: Option<String>,
    #[serde(default, deserialize_with = "lenient::texts")]
    sockets: Vec<String>,
    #[serde(default, deserialize_with = "lenient::texts")]
    chipset: Vec<String>,
    #[serde(default, deserialize_with = "lenient::texts")]
    memory: Vec<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient::texts")]
    memory_type: Vec<String>,
    #[serde(default, deserialize_with = "lenient::texts")]
    form_factor: Vec<String>,
    #[serde(default, deserialize_with = "lenient::quantity")]
    wattage: Option<u32>,
    #[serde(default, deserialize_with = "lenient::quantity")]
    recommended_psu: Option<u32>,
    #[serde(default, deserialize_with = "lenient::quantity")]
    length_mm: Option<u32>,
    #[serde(default, deserialize_with = "lenient::quantity")]
    max_gpu_length_mm: Option<u32>,
    #[serde(default, deserialize_with = "lenient::quantity")]
    radiator_size_mm: Option<u32>,
    #[serde(default, deserialize_with = "lenient::quantity")]
    max_radiator_mm: Option<u32>,
}

impl From<RawCompatibility> for Compatibility {
    fn from(raw: RawCompatibility) -> Self {
        let mut memory = raw.memory;
        for tech in raw.memory_type {
            if !memory.contains(&tech) {
                memory.push(tech);
            }
        }
        Compatibility {
            socket: raw.socket,
            sockets: raw.sockets,
            chipset: raw.chipset,
            memory,
            form_factor: raw.form_factor,
            wattage: raw.wattage,
            recommended_psu: raw.recommended_psu,
            length_mm: raw.length_mm,
            max_gpu_length_mm: raw.max_gpu_length_mm,
            radiator_size_mm: raw.radiator_size_mm,
            max_radiator_mm: raw.max_radiator_mm,
        }
    }
}

/// Field readers that drop values of the wrong shape instead of failing.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn scalar(value: Value) -> Option<String> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.and_then(scalar))
    }

    pub fn texts<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let values = match Option::<Value>::deserialize(d)? {
            Some(Value::Array(items)) => items.into_iter().filter_map(scalar).collect(),
            Some(other) => scalar(other).into_iter().collect(),
            None => Vec::new(),
        };
        Ok(values)
    }

    pub fn quantity<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        let number = match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        // Fractional sizes round up.
        Ok(number
            .filter(|n| n.is_finite() && *n > 0.0)
            .map(|n| n.ceil().min(u32::MAX as f64) as u32))
    }
}

/// A purchasable part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub description: String,
    /// Unit price in minor currency units.
    pub price_cents: u64,
    /// Featured-sorting hint, no effect on compatibility.
    #[serde(default)]
    pub is_recommended: bool,
    #[serde(default)]
    pub compatibility: Compatibility,
}

/// Validation errors for catalog data.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Kind string is not one of the known kinds.
    #[error("unknown component kind: {0}")]
    UnknownKind(String),
    /// Identifiers must be non-empty.
    #[error("component id must not be blank")]
    BlankId,
    /// Display name must be non-empty.
    #[error("component {0} has a blank name")]
    BlankName(String),
    /// The same id appears more than once.
    #[error("duplicate component id: {0}")]
    DuplicateId(String),
}

/// Validate a single component record.
pub fn validate_component(c: &Component) -> Result<(), ValidationError> {
    if c.id.0.trim().is_empty() {
        return Err(ValidationError::BlankId);
    }
    if c.name.trim().is_empty() {
        return Err(ValidationError::BlankName(c.id.0.clone()));
    }
    Ok(())
}

/// Validate a whole component list, including id uniqueness.
pub fn validate_catalog(components: &[Component]) -> Result<(), ValidationError> {
    let mut ids: BTreeSet<&ComponentId> = BTreeSet::new();
    for c in components {
        validate_component(c)?;
        if !ids.insert(&c.id) {
            return Err(ValidationError::DuplicateId(c.id.0.clone()));
        }
    }
    Ok(())
}

/// Sort components the way the storefront lists them: recommended parts
/// first, then by ascending price. The sort is stable.
pub fn sort_recommended_first(components: &mut [Component]) {
    components.sort_by(|a, b| {
        b.is_recommended
            .cmp(&a.is_recommended)
            .then(a.price_cents.cmp(&b.price_cents))
    });
}

/// Read-only snapshot of every purchasable component.
///
/// A catalog is built once and shared (typically behind an `Arc`) by every
/// builder session; nothing mutates it afterwards.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    components: Vec<Component>,
    index: HashMap<ComponentId, usize>,
}

impl Catalog {
    /// Build a catalog preserving the provider's order. When an id repeats,
    /// lookups resolve to its first occurrence.
    pub fn new(components: Vec<Component>) -> Self {
        let mut index = HashMap::with_capacity(components.len());
        for (i, c) in components.iter().enumerate() {
            index.entry(c.id.clone()).or_insert(i);
        }
        Self { components, index }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, id: &ComponentId) -> Option<&Component> {
        self.index.get(id).map(|&i| &self.components[i])
    }

    /// Components of one kind, in catalog order.
    pub fn of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> + '_ {
        self.components.iter().filter(move |c| c.kind == kind)
    }
}

impl FromIterator<Component> for Catalog {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        Catalog::new(iter.into_iter().collect())
    }
}

/// One in-progress build: at most one component per kind.
///
/// Slots are keyed by the component's own kind, so a selection can never
/// hold a part under the wrong category.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    slots: BTreeMap<ComponentKind, Component>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a starting selection from `(kind, id)` pairs, e.g. a saved
    /// build or a pre-built product's bill of materials.
    ///
    /// The first pair for a kind wins. Ids missing from the catalog, or
    /// whose catalog kind disagrees with the pair, are skipped.
    pub fn prefill<I>(catalog: &Catalog, entries: I) -> Self
    where
        I: IntoIterator<Item = (ComponentKind, ComponentId)>,
    {
        let mut selection = Selection::new();
        for (kind, id) in entries {
            if selection.contains(kind) {
                continue;
            }
            match catalog.get(&id) {
                Some(c) if c.kind == kind => {
                    selection.insert(c.clone());
                }
                Some(c) => {
                    warn!(
                        component = %id,
                        expected = %kind,
                        actual = %c.kind,
                        "skipping prefill entry with mismatched kind"
                    );
                }
                None => {
                    warn!(component = %id, %kind, "skipping prefill entry missing from catalog");
                }
            }
        }
        selection
    }

    pub fn get(&self, kind: ComponentKind) -> Option<&Component> {
        self.slots.get(&kind)
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Put `component` in its kind's slot, returning whatever it replaced.
    pub fn insert(&mut self, component: Component) -> Option<Component> {
        self.slots.insert(component.kind, component)
    }

    pub fn remove(&mut self, kind: ComponentKind) -> Option<Component> {
        self.slots.remove(&kind)
    }

    /// Selected components in kind order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> + '_ {
        self.slots.values()
    }

    /// Selected components except the one in `kind`'s slot.
    pub fn iter_except(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> + '_ {
        self.slots
            .iter()
            .filter(move |(k, _)| **k != kind)
            .map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl FromIterator<Component> for Selection {
    /// Later components replace earlier ones of the same kind.
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        let mut selection = Selection::new();
        for c in iter {
            selection.insert(c);
        }
        selection
    }
}

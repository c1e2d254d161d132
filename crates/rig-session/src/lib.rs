#![deny(warnings)]

//! Builder session state: one mutable selection over a shared catalog.
//!
//! The session is a thin wrapper; every read goes back through the pure
//! resolver and aggregator so nothing derived is ever cached.

use rig_compat::{Candidates, Conflict};
use rig_core::{Catalog, Component, ComponentId, ComponentKind, Selection};
use rig_power::Totals;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// One category panel of the builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderStep {
    pub kind: ComponentKind,
    pub label: &'static str,
    pub description: &'static str,
    /// Optional steps do not block completion.
    pub optional: bool,
}

const fn step(
    kind: ComponentKind,
    label: &'static str,
    description: &'static str,
    optional: bool,
) -> BuilderStep {
    BuilderStep {
        kind,
        label,
        description,
        optional,
    }
}

/// Builder steps in presentation order. All are shown at once and may be
/// filled in any order.
pub const BUILDER_STEPS: [BuilderStep; 10] = [
    step(
        ComponentKind::Cpu,
        "Processor",
        "Cores, clocks and socket.",
        false,
    ),
    step(
        ComponentKind::Motherboard,
        "Motherboard",
        "Chipset, memory support and board size.",
        false,
    ),
    step(
        ComponentKind::Gpu,
        "Graphics",
        "Frame rates, rendering and compute.",
        false,
    ),
    step(ComponentKind::Memory, "Memory", "Capacity and speed.", false),
    step(
        ComponentKind::Storage,
        "Primary storage",
        "System and project drive.",
        false,
    ),
    step(
        ComponentKind::PowerSupply,
        "Power supply",
        "Rated output for the whole build.",
        false,
    ),
    step(
        ComponentKind::Cooling,
        "Cooling",
        "Air or liquid CPU cooling.",
        false,
    ),
    step(
        ComponentKind::Case,
        "Chassis",
        "Enclosure, clearance and airflow.",
        false,
    ),
    step(
        ComponentKind::Os,
        "Operating system",
        "Pre-installed license.",
        true,
    ),
    step(
        ComponentKind::Service,
        "Services",
        "Assembly, testing and coverage.",
        true,
    ),
];

/// Steps that must be filled before a build can be saved or ordered.
pub fn required_kinds() -> impl Iterator<Item = ComponentKind> {
    BUILDER_STEPS
        .into_iter()
        .filter(|s| !s.optional)
        .map(|s| s.kind)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A component was offered for a slot of another kind.
    #[error("component {id} is a {actual}, not a {slot}")]
    KindMismatch {
        id: ComponentId,
        slot: ComponentKind,
        actual: ComponentKind,
    },
    #[error("component not in catalog: {0}")]
    UnknownComponent(ComponentId),
}

/// A selected part as handed to persistence or checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLine {
    pub kind: ComponentKind,
    pub component_id: ComponentId,
    pub price_cents: u64,
}

/// Flattened build: selected parts plus the three totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPayload {
    pub subtotal_cents: u64,
    pub estimated_wattage: u32,
    #[serde(alias = "minimumPsu")]
    pub minimum_psu_wattage: u32,
    pub components: Vec<BuildLine>,
}

impl BuildPayload {
    pub fn totals(&self) -> Totals {
        Totals {
            subtotal_cents: self.subtotal_cents,
            estimated_wattage: self.estimated_wattage,
            minimum_psu_wattage: self.minimum_psu_wattage,
        }
    }

    /// `(kind, id)` pairs in stored order, suitable for [`Selection::prefill`].
    pub fn entries(&self) -> impl Iterator<Item = (ComponentKind, ComponentId)> + '_ {
        self.components
            .iter()
            .map(|line| (line.kind, line.component_id.clone()))
    }
}

/// Read-only view of a session at one point in time.
#[derive(Debug)]
pub struct Snapshot<'a> {
    pub selection: &'a Selection,
    pub candidates: Candidates<'a>,
    pub totals: Totals,
    /// Selected parts that no longer fit the rest of the selection.
    pub conflicts: Vec<Conflict>,
    /// Required steps filled so far.
    pub completed: usize,
    pub required: usize,
}

impl Snapshot<'_> {
    pub fn is_complete(&self) -> bool {
        self.completed == self.required
    }
}

/// Mutable builder state for one interaction.
#[derive(Clone, Debug)]
pub struct BuilderSession {
    catalog: Arc<Catalog>,
    selection: Selection,
}

impl BuilderSession {
    /// Start with an empty selection.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_selection(catalog, Selection::new())
    }

    /// Start from an existing selection, e.g. one produced by
    /// [`Selection::prefill`]. Any partial mapping is accepted.
    pub fn with_selection(catalog: Arc<Catalog>, selection: Selection) -> Self {
        Self { catalog, selection }
    }

    /// Start from saved `(kind, id)` pairs, resolving ids in `catalog`.
    pub fn prefilled<I>(catalog: Arc<Catalog>, entries: I) -> Self
    where
        I: IntoIterator<Item = (ComponentKind, ComponentId)>,
    {
        let selection = Selection::prefill(&catalog, entries);
        debug!(prefilled = selection.len(), "starting session from saved selection");
        Self::with_selection(catalog, selection)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn steps(&self) -> &'static [BuilderStep] {
        &BUILDER_STEPS
    }

    /// Put `component` in `kind`'s slot, returning what it replaced.
    ///
    /// Compatibility is not checked here. A part that went stale after a
    /// later change stays selected until it is replaced; see [`Self::conflicts`].
    pub fn select(
        &mut self,
        kind: ComponentKind,
        component: Component,
    ) -> Result<Option<Component>, SessionError> {
        if component.kind != kind {
            return Err(SessionError::KindMismatch {
                id: component.id,
                slot: kind,
                actual: component.kind,
            });
        }
        debug!(%kind, component = %component.id, "select");
        Ok(self.selection.insert(component))
    }

    /// Select a catalog component by id.
    pub fn select_id(
        &mut self,
        kind: ComponentKind,
        id: &ComponentId,
    ) -> Result<Option<Component>, SessionError> {
        let component = self
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownComponent(id.clone()))?;
        self.select(kind, component)
    }

    /// Empty `kind`'s slot, returning what was there.
    pub fn clear(&mut self, kind: ComponentKind) -> Option<Component> {
        debug!(%kind, "clear");
        self.selection.remove(kind)
    }

    pub fn totals(&self) -> Totals {
        Totals::of(&self.selection)
    }

    pub fn candidates(&self) -> Candidates<'_> {
        rig_compat::resolve(&self.catalog, &self.selection)
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        rig_compat::validate(&self.selection)
    }

    /// `(filled required steps, total required steps)`.
    pub fn progress(&self) -> (usize, usize) {
        required_kinds().fold((0, 0), |(done, total), kind| {
            (done + usize::from(self.selection.contains(kind)), total + 1)
        })
    }

    pub fn is_complete(&self) -> bool {
        required_kinds().all(|kind| self.selection.contains(kind))
    }

    /// Recompute everything against the current selection.
    pub fn snapshot(&self) -> Snapshot<'_> {
        let (completed, required) = self.progress();
        Snapshot {
            selection: &self.selection,
            candidates: self.candidates(),
            totals: self.totals(),
            conflicts: self.conflicts(),
            completed,
            required,
        }
    }

    /// Flatten the selection for an external persistence or checkout step.
    /// Lines follow builder-step order.
    pub fn serialize(&self) -> BuildPayload {
        let totals = self.totals();
        BuildPayload {
            subtotal_cents: totals.subtotal_cents,
            estimated_wattage: totals.estimated_wattage,
            minimum_psu_wattage: totals.minimum_psu_wattage,
            components: self
                .selection
                .iter()
                .map(|c| BuildLine {
                    kind: c.kind,
                    component_id: c.id.clone(),
                    price_cents: c.price_cents,
                })
                .collect(),
        }
    }
}

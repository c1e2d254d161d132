#![deny(warnings)]

//! Power and pricing aggregation for a builder selection.
//!
//! This module provides pure helpers for:
//! - Subtotal of the selected parts in minor currency units
//! - Estimated system draw from per-part wattage declarations
//! - Minimum recommended PSU rating with a fixed safety headroom
//! - Display formatting of cent amounts

use rig_core::{Component, ComponentKind, Selection};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Fixed draw attributed to fans, board, and drives before any part is counted.
pub const BASELINE_WATTS: u32 = 150;

/// Safety factor applied to the estimated draw (1.25).
pub fn headroom() -> Decimal {
    Decimal::new(125, 2)
}

/// Derived totals of a selection. Never stored; recompute on every read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal_cents: u64,
    pub estimated_wattage: u32,
    pub minimum_psu_wattage: u32,
}

impl Totals {
    /// Totals over every selected component.
    pub fn of(selection: &Selection) -> Self {
        Self::from_components(selection.iter())
    }

    /// Totals with `kind`'s slot ignored, e.g. the PSU requirement of
    /// everything except the PSU.
    pub fn excluding(selection: &Selection, kind: ComponentKind) -> Self {
        Self::from_components(selection.iter_except(kind))
    }

    pub fn from_components<'a, I>(components: I) -> Self
    where
        I: IntoIterator<Item = &'a Component>,
    {
        let mut subtotal_cents: u64 = 0;
        let mut estimated_wattage = BASELINE_WATTS;
        let mut recommended: u32 = 0;
        for c in components {
            subtotal_cents = subtotal_cents.saturating_add(c.price_cents);
            estimated_wattage = estimated_wattage.saturating_add(draw(c));
            recommended = recommended.max(c.compatibility.recommended_psu.unwrap_or(0));
        }
        let totals = Totals {
            subtotal_cents,
            estimated_wattage,
            minimum_psu_wattage: minimum_psu_wattage(estimated_wattage, recommended),
        };
        trace!(?totals, "aggregated selection");
        totals
    }
}

/// Sum of unit prices, saturating at `u64::MAX`.
pub fn subtotal_cents<'a, I>(components: I) -> u64
where
    I: IntoIterator<Item = &'a Component>,
{
    components
        .into_iter()
        .fold(0u64, |acc, c| acc.saturating_add(c.price_cents))
}

/// Declared draw of one part; 0 when it declares no wattage.
pub fn draw(component: &Component) -> u32 {
    component.compatibility.wattage.unwrap_or(0)
}

/// Baseline plus declared per-part draw. Parts without a wattage add 0.
pub fn estimated_wattage<'a, I>(components: I) -> u32
where
    I: IntoIterator<Item = &'a Component>,
{
    components
        .into_iter()
        .fold(BASELINE_WATTS, |acc, c| acc.saturating_add(draw(c)))
}

/// Minimum PSU rating: the larger of `ceil(estimated * 1.25)` and the
/// highest manufacturer recommendation in the build.
///
/// Example:
/// assert_eq!(minimum_psu_wattage(700, 0), 875);
/// assert_eq!(minimum_psu_wattage(300, 1000), 1000);
pub fn minimum_psu_wattage(estimated_wattage: u32, max_recommended: u32) -> u32 {
    let with_headroom = (Decimal::from(estimated_wattage) * headroom())
        .ceil()
        .to_u32()
        .unwrap_or(u32::MAX);
    with_headroom.max(max_recommended)
}

/// Format a cent amount as US dollars, e.g. `169990` -> `"$1,699.90"`.
pub fn format_cents(cents: u64) -> String {
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${}.{:02}", grouped, cents % 100)
}

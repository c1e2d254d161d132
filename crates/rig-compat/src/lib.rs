#![deny(warnings)]

//! Compatibility resolution for the custom PC builder.
//!
//! Given a catalog and a partial selection, [`resolve`] filters every kind
//! down to the candidates that are compatible with what is selected in all
//! *other* kinds. Rules are pairwise and mutually dependent (a case limits
//! GPUs and GPUs limit cases), so the filter is recomputed from scratch on
//! every call and never patched incrementally.
//!
//! A missing descriptor field never excludes a part: only two declared,
//! disagreeing values do.

use rig_core::{Catalog, Compatibility, Component, ComponentId, ComponentKind, Selection};
use rig_power::Totals;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Why a part cannot join the current selection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Incompatibility {
    /// CPU and motherboard declare different sockets.
    #[error("socket {candidate} does not match the selected {with} socket {selected}")]
    SocketMismatch {
        with: ComponentKind,
        candidate: String,
        selected: String,
    },
    /// Board and case share no form factor.
    #[error("no form factor in common with the selected {with}")]
    FormFactorMismatch { with: ComponentKind },
    /// Memory technology not supported by the board.
    #[error("memory type is not supported by the selected motherboard")]
    MemoryMismatch,
    /// Cooler lists sockets, but not the CPU's.
    #[error("cooler does not support socket {socket}")]
    UnsupportedSocket { socket: String },
    #[error("graphics card is {length_mm} mm but the case fits {max_mm} mm")]
    GpuTooLong { length_mm: u32, max_mm: u32 },
    #[error("radiator is {size_mm} mm but the case fits {max_mm} mm")]
    RadiatorTooLarge { size_mm: u32, max_mm: u32 },
    /// PSU rating below what the rest of the build requires.
    #[error("power supply is rated {rated} W but the build needs {required} W")]
    Underpowered { rated: u32, required: u32 },
}

/// Minimum PSU rating demanded by everything except the PSU slot.
pub fn psu_requirement(selection: &Selection) -> u32 {
    Totals::excluding(selection, ComponentKind::PowerSupply).minimum_psu_wattage
}

/// Check one candidate against the selection, reporting the first rule it
/// breaks. The candidate's own kind slot is never consulted.
pub fn check(candidate: &Component, selection: &Selection) -> Result<(), Incompatibility> {
    let psu_required = if candidate.kind == ComponentKind::PowerSupply {
        psu_requirement(selection)
    } else {
        0
    };
    check_with(candidate, selection, psu_required)
}

pub fn is_compatible(candidate: &Component, selection: &Selection) -> bool {
    check(candidate, selection).is_ok()
}

fn check_with(
    candidate: &Component,
    selection: &Selection,
    psu_required: u32,
) -> Result<(), Incompatibility> {
    let this = &candidate.compatibility;
    let selected = |kind| slot(selection, kind);
    match candidate.kind {
        ComponentKind::Cpu => {
            if let Some(board) = selected(ComponentKind::Motherboard) {
                sockets_agree(this, board, ComponentKind::Motherboard)?;
            }
        }
        ComponentKind::Motherboard => {
            if let Some(cpu) = selected(ComponentKind::Cpu) {
                sockets_agree(this, cpu, ComponentKind::Cpu)?;
            }
            if let Some(case) = selected(ComponentKind::Case) {
                form_factors_overlap(this, case, ComponentKind::Case)?;
            }
        }
        ComponentKind::Memory => {
            if let Some(board) = selected(ComponentKind::Motherboard) {
                if !overlaps(&this.memory, &board.memory) {
                    return Err(Incompatibility::MemoryMismatch);
                }
            }
        }
        ComponentKind::Cooling => {
            if let Some(cpu) = selected(ComponentKind::Cpu) {
                cooler_fits_cpu(this, cpu)?;
            }
        }
        ComponentKind::Case => {
            if let Some(board) = selected(ComponentKind::Motherboard) {
                form_factors_overlap(board, this, ComponentKind::Motherboard)?;
            }
            if let Some(gpu) = selected(ComponentKind::Gpu) {
                gpu_fits_case(gpu, this)?;
            }
            if let Some(cooler) = selected(ComponentKind::Cooling) {
                radiator_fits_case(cooler, this)?;
            }
        }
        ComponentKind::Gpu => {
            if let Some(case) = selected(ComponentKind::Case) {
                gpu_fits_case(this, case)?;
            }
        }
        ComponentKind::PowerSupply => {
            if let Some(rated) = this.wattage {
                if rated < psu_required {
                    return Err(Incompatibility::Underpowered {
                        rated,
                        required: psu_required,
                    });
                }
            }
        }
        ComponentKind::Storage
        | ComponentKind::Os
        | ComponentKind::Service
        | ComponentKind::Accessory => {}
    }
    Ok(())
}

fn slot(selection: &Selection, kind: ComponentKind) -> Option<&Compatibility> {
    selection.get(kind).map(|c| &c.compatibility)
}

fn sockets_agree(
    candidate: &Compatibility,
    selected: &Compatibility,
    with: ComponentKind,
) -> Result<(), Incompatibility> {
    match (&candidate.socket, &selected.socket) {
        (Some(a), Some(b)) if a != b => Err(Incompatibility::SocketMismatch {
            with,
            candidate: a.clone(),
            selected: b.clone(),
        }),
        _ => Ok(()),
    }
}

/// Set intersection where an empty side means "unconstrained".
fn overlaps(a: &[String], b: &[String]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|x| b.contains(x))
}

fn form_factors_overlap(
    board: &Compatibility,
    case: &Compatibility,
    with: ComponentKind,
) -> Result<(), Incompatibility> {
    if overlaps(&board.form_factor, &case.form_factor) {
        Ok(())
    } else {
        Err(Incompatibility::FormFactorMismatch { with })
    }
}

fn cooler_fits_cpu(cooler: &Compatibility, cpu: &Compatibility) -> Result<(), Incompatibility> {
    let Some(socket) = &cpu.socket else {
        return Ok(());
    };
    // A lone `socket` on a cooler counts as a one-element supported set.
    let mut supported = cooler.sockets.iter().chain(cooler.socket.iter()).peekable();
    if supported.peek().is_none() || supported.any(|s| s == socket) {
        Ok(())
    } else {
        Err(Incompatibility::UnsupportedSocket {
            socket: socket.clone(),
        })
    }
}

fn gpu_fits_case(gpu: &Compatibility, case: &Compatibility) -> Result<(), Incompatibility> {
    match (gpu.length_mm, case.max_gpu_length_mm) {
        (Some(length_mm), Some(max_mm)) if length_mm > max_mm => {
            Err(Incompatibility::GpuTooLong { length_mm, max_mm })
        }
        _ => Ok(()),
    }
}

fn radiator_fits_case(cooler: &Compatibility, case: &Compatibility) -> Result<(), Incompatibility> {
    match (cooler.radiator_size_mm, case.max_radiator_mm) {
        (Some(size_mm), Some(max_mm)) if size_mm > max_mm => {
            Err(Incompatibility::RadiatorTooLarge { size_mm, max_mm })
        }
        _ => Ok(()),
    }
}

/// Per-kind candidate lists borrowed from a catalog.
#[derive(Clone, Debug, Default)]
pub struct Candidates<'a> {
    by_kind: BTreeMap<ComponentKind, Vec<&'a Component>>,
}

impl<'a> Candidates<'a> {
    /// Candidates for `kind` in catalog order; empty when nothing fits.
    pub fn get(&self, kind: ComponentKind) -> &[&'a Component] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, kind: ComponentKind, id: &ComponentId) -> bool {
        self.get(kind).iter().any(|c| &c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentKind, &[&'a Component])> + '_ {
        self.by_kind.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Total number of candidates across all kinds.
    pub fn total(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }
}

/// Filter the whole catalog against `selection`.
///
/// Every kind gets an entry, even when the catalog has no parts of it.
pub fn resolve<'a>(catalog: &'a Catalog, selection: &Selection) -> Candidates<'a> {
    let psu_required = psu_requirement(selection);
    let mut by_kind: BTreeMap<ComponentKind, Vec<&'a Component>> = ComponentKind::ALL
        .into_iter()
        .map(|kind| (kind, Vec::new()))
        .collect();
    for c in catalog.components() {
        if check_with(c, selection, psu_required).is_ok() {
            if let Some(list) = by_kind.get_mut(&c.kind) {
                list.push(c);
            }
        }
    }
    let candidates = Candidates { by_kind };
    debug!(
        selected = selection.len(),
        catalog = catalog.len(),
        candidates = candidates.total(),
        psu_required,
        "resolved candidates"
    );
    candidates
}

/// A selected part that no longer fits the rest of the selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ComponentKind,
    pub component_id: ComponentId,
    pub reason: Incompatibility,
}

/// Flag, without clearing, every selected part that breaks a rule against
/// the rest of the selection. Selections are never retroactively repaired,
/// so this is how a caller surfaces stale choices.
pub fn validate(selection: &Selection) -> Vec<Conflict> {
    selection
        .iter()
        .filter_map(|c| {
            check(c, selection).err().map(|reason| Conflict {
                kind: c.kind,
                component_id: c.id.clone(),
                reason,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn part(id: &str, kind: ComponentKind, compatibility: Compatibility) -> Component {
        Component {
            id: ComponentId::new(id),
            kind,
            name: id.to_string(),
            brand: String::new(),
            description: String::new(),
            price_cents: 1000,
            is_recommended: false,
            compatibility,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn cpu(id: &str, socket: &str, watts: u32) -> Component {
        part(
            id,
            ComponentKind::Cpu,
            Compatibility {
                socket: Some(socket.to_string()),
                wattage: Some(watts),
                ..Default::default()
            },
        )
    }

    fn board(id: &str, socket: &str, form: &str, memory: &str) -> Component {
        part(
            id,
            ComponentKind::Motherboard,
            Compatibility {
                socket: Some(socket.to_string()),
                form_factor: strings(&[form]),
                memory: strings(&[memory]),
                ..Default::default()
            },
        )
    }

    fn cooler(id: &str, sockets: &[&str], radiator: Option<u32>) -> Component {
        part(
            id,
            ComponentKind::Cooling,
            Compatibility {
                sockets: strings(sockets),
                radiator_size_mm: radiator,
                ..Default::default()
            },
        )
    }

    fn case(id: &str, forms: &[&str], max_gpu: Option<u32>, max_rad: Option<u32>) -> Component {
        part(
            id,
            ComponentKind::Case,
            Compatibility {
                form_factor: strings(forms),
                max_gpu_length_mm: max_gpu,
                max_radiator_mm: max_rad,
                ..Default::default()
            },
        )
    }

    fn gpu(id: &str, length: u32) -> Component {
        part(
            id,
            ComponentKind::Gpu,
            Compatibility {
                length_mm: Some(length),
                ..Default::default()
            },
        )
    }

    fn psu(id: &str, rated: Option<u32>) -> Component {
        part(
            id,
            ComponentKind::PowerSupply,
            Compatibility {
                wattage: rated,
                ..Default::default()
            },
        )
    }

    fn ids<'a>(list: &[&'a Component]) -> Vec<&'a str> {
        list.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn empty_selection_offers_everything() {
        let catalog = Catalog::new(vec![
            cpu("am5", "AM5", 120),
            board("b", "LGA1700", "ATX", "DDR5"),
            case("itx", &["Mini-ITX"], Some(300), None),
            psu("tiny", Some(150)),
        ]);
        let candidates = resolve(&catalog, &Selection::new());
        // 150 W baseline needs 188 W, so only the 150 W PSU drops out.
        assert_eq!(candidates.total(), 3);
        assert!(candidates.get(ComponentKind::Accessory).is_empty());
        assert!(candidates.get(ComponentKind::PowerSupply).is_empty());
    }

    #[test]
    fn am5_cpu_filters_coolers_by_socket() {
        let catalog = Catalog::new(vec![
            cooler("intel-only", &["LGA1700"], None),
            cooler("both", &["AM5", "LGA1700"], None),
            cooler("universal", &[], None),
        ]);
        let selection: Selection = [cpu("ryzen", "AM5", 120)].into_iter().collect();
        let candidates = resolve(&catalog, &selection);
        assert_eq!(
            ids(candidates.get(ComponentKind::Cooling)),
            ["both", "universal"]
        );
    }

    #[test]
    fn cooler_single_socket_field_counts_as_supported_set() {
        let mut single = cooler("single", &[], None);
        single.compatibility.socket = Some("LGA1700".to_string());
        let selection: Selection = [cpu("ryzen", "AM5", 120)].into_iter().collect();
        assert_eq!(
            check(&single, &selection),
            Err(Incompatibility::UnsupportedSocket {
                socket: "AM5".to_string()
            })
        );
    }

    #[test]
    fn atx_board_excludes_itx_only_case() {
        let catalog = Catalog::new(vec![
            case("itx", &["Mini-ITX"], None, None),
            case("tower", &["ATX", "E-ATX", "mATX"], None, None),
            case("undeclared", &[], None, None),
        ]);
        let selection: Selection = [board("hero", "LGA1700", "ATX", "DDR5")]
            .into_iter()
            .collect();
        let candidates = resolve(&catalog, &selection);
        assert_eq!(
            ids(candidates.get(ComponentKind::Case)),
            ["tower", "undeclared"]
        );
    }

    #[test]
    fn itx_case_excludes_atx_board() {
        let bare = part(
            "bare",
            ComponentKind::Motherboard,
            Compatibility {
                socket: Some("AM5".to_string()),
                ..Default::default()
            },
        );
        let catalog = Catalog::new(vec![
            board("hero", "LGA1700", "ATX", "DDR5"),
            board("mini", "AM5", "Mini-ITX", "DDR5"),
            bare,
        ]);
        let selection: Selection = [case("nr200", &["Mini-ITX"], None, None)]
            .into_iter()
            .collect();
        let candidates = resolve(&catalog, &selection);
        assert_eq!(
            ids(candidates.get(ComponentKind::Motherboard)),
            ["mini", "bare"]
        );
        assert_eq!(
            check(&catalog.components()[0], &selection),
            Err(Incompatibility::FormFactorMismatch {
                with: ComponentKind::Case
            })
        );
    }

    #[test]
    fn gpu_without_length_fits_any_case() {
        let unsized_gpu = part("mystery", ComponentKind::Gpu, Compatibility::default());
        let catalog = Catalog::new(vec![
            case("small", &[], Some(250), None),
            case("big", &[], Some(426), None),
        ]);
        let selection: Selection = [unsized_gpu].into_iter().collect();
        let candidates = resolve(&catalog, &selection);
        assert_eq!(ids(candidates.get(ComponentKind::Case)), ["small", "big"]);
    }

    #[test]
    fn gpu_and_case_filter_each_other_in_either_order() {
        let long_gpu = gpu("long", 340);
        let short_gpu = gpu("short", 300);
        let small_case = case("small", &[], Some(320), None);
        let big_case = case("big", &[], Some(426), None);
        let catalog = Catalog::new(vec![
            long_gpu.clone(),
            short_gpu,
            small_case.clone(),
            big_case,
        ]);

        let gpu_first: Selection = [long_gpu].into_iter().collect();
        let candidates = resolve(&catalog, &gpu_first);
        assert_eq!(ids(candidates.get(ComponentKind::Case)), ["big"]);

        let case_first: Selection = [small_case].into_iter().collect();
        let candidates = resolve(&catalog, &case_first);
        assert_eq!(ids(candidates.get(ComponentKind::Gpu)), ["short"]);
    }

    #[test]
    fn radiator_check_skipped_when_cooler_has_no_size() {
        let compact = case("compact", &[], None, Some(240));
        let air: Selection = [cooler("air", &[], None)].into_iter().collect();
        assert!(is_compatible(&compact, &air));
        let aio: Selection = [cooler("aio", &[], Some(360))].into_iter().collect();
        assert_eq!(
            check(&compact, &aio),
            Err(Incompatibility::RadiatorTooLarge {
                size_mm: 360,
                max_mm: 240
            })
        );
    }

    #[test]
    fn memory_must_share_a_technology_with_board() {
        let selection: Selection = [board("b", "AM5", "ATX", "DDR5")].into_iter().collect();
        let ddr4 = part(
            "ddr4",
            ComponentKind::Memory,
            Compatibility {
                memory: strings(&["DDR4"]),
                ..Default::default()
            },
        );
        let ddr5 = part(
            "ddr5",
            ComponentKind::Memory,
            Compatibility {
                memory: strings(&["DDR4", "DDR5"]),
                ..Default::default()
            },
        );
        let unknown = part("unknown", ComponentKind::Memory, Compatibility::default());
        assert_eq!(check(&ddr4, &selection), Err(Incompatibility::MemoryMismatch));
        assert!(is_compatible(&ddr5, &selection));
        assert!(is_compatible(&unknown, &selection));
    }

    #[test]
    fn psu_must_cover_rest_of_build() {
        let mut heavy_gpu = gpu("gpu", 300);
        heavy_gpu.compatibility.wattage = Some(300);
        let selection: Selection = [cpu("cpu", "AM5", 250), heavy_gpu].into_iter().collect();
        assert_eq!(psu_requirement(&selection), 875);
        assert_eq!(
            check(&psu("850", Some(850)), &selection),
            Err(Incompatibility::Underpowered {
                rated: 850,
                required: 875
            })
        );
        assert!(is_compatible(&psu("1000", Some(1000)), &selection));
        assert!(is_compatible(&psu("unrated", None), &selection));
    }

    #[test]
    fn selected_psu_rating_does_not_raise_its_own_requirement() {
        let selection: Selection = [cpu("cpu", "AM5", 100), psu("big", Some(1200))]
            .into_iter()
            .collect();
        assert_eq!(psu_requirement(&selection), 313);
        assert!(is_compatible(&psu("400", Some(400)), &selection));
    }

    #[test]
    fn validate_flags_stale_choices_without_clearing() {
        let selection: Selection = [
            cpu("ryzen", "AM5", 120),
            board("z790", "LGA1700", "ATX", "DDR5"),
            gpu("ssd-like", 200),
        ]
        .into_iter()
        .collect();
        let conflicts = validate(&selection);
        let kinds: Vec<_> = conflicts.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, [ComponentKind::Cpu, ComponentKind::Motherboard]);
        assert_eq!(
            conflicts[0].reason.to_string(),
            "socket AM5 does not match the selected MOTHERBOARD socket LGA1700"
        );
        assert_eq!(selection.len(), 3);
    }

    const SOCKETS: [&str; 3] = ["AM5", "LGA1700", "AM4"];
    const FORMS: [&str; 3] = ["ATX", "mATX", "Mini-ITX"];
    const MEMORY: [&str; 2] = ["DDR4", "DDR5"];

    fn pick(indices: &[usize], names: &[&str]) -> Vec<String> {
        indices.iter().map(|i| names[i % names.len()].to_string()).collect()
    }

    prop_compose! {
        fn arb_part()(kind in 0usize..11,
                      socket in proptest::option::of(0usize..3),
                      set in proptest::collection::vec(0usize..3, 0..3),
                      size in proptest::option::of(200u32..450),
                      limit in proptest::option::of(200u32..450),
                      watts in proptest::option::of(0u32..700),
                      rec in proptest::option::of(300u32..1200),
                      price in 0u64..500_000) -> Component {
            Component {
                id: ComponentId::new("pending"),
                kind: ComponentKind::ALL[kind],
                name: "part".to_string(),
                brand: String::new(),
                description: String::new(),
                price_cents: price,
                is_recommended: false,
                compatibility: Compatibility {
                    socket: socket.map(|i| SOCKETS[i].to_string()),
                    sockets: pick(&set, &SOCKETS),
                    chipset: Vec::new(),
                    memory: pick(&set, &MEMORY),
                    form_factor: pick(&set, &FORMS),
                    wattage: watts,
                    recommended_psu: rec,
                    length_mm: size,
                    max_gpu_length_mm: limit,
                    radiator_size_mm: size,
                    max_radiator_mm: limit,
                },
            }
        }
    }

    prop_compose! {
        fn arb_world()(parts in proptest::collection::vec(arb_part(), 1..40),
                       picks in proptest::collection::vec(any::<bool>(), 40))
                       -> (Catalog, Selection) {
            let parts: Vec<Component> = parts
                .into_iter()
                .enumerate()
                .map(|(i, mut c)| { c.id = ComponentId::new(format!("c{i}")); c })
                .collect();
            let selection: Selection = parts
                .iter()
                .zip(picks)
                .filter(|(_, keep)| *keep)
                .map(|(c, _)| c.clone())
                .collect();
            (Catalog::new(parts), selection)
        }
    }

    proptest! {
        #[test]
        fn candidates_only_of_their_kind((catalog, selection) in arb_world()) {
            let candidates = resolve(&catalog, &selection);
            for (kind, list) in candidates.iter() {
                prop_assert!(list.iter().all(|c| c.kind == kind));
            }
        }

        #[test]
        fn resolve_is_deterministic((catalog, selection) in arb_world()) {
            let a = resolve(&catalog, &selection);
            let b = resolve(&catalog, &selection);
            for kind in ComponentKind::ALL {
                prop_assert_eq!(ids(a.get(kind)), ids(b.get(kind)));
            }
        }

        #[test]
        fn socket_matching_is_symmetric(cs in proptest::option::of(0usize..3),
                                        bs in proptest::option::of(0usize..3)) {
            let mut c = cpu("c", "x", 65);
            c.compatibility.socket = cs.map(|i| SOCKETS[i].to_string());
            let mut b = board("b", "x", "ATX", "DDR5");
            b.compatibility.socket = bs.map(|i| SOCKETS[i].to_string());
            let with_board: Selection = [b.clone()].into_iter().collect();
            let with_cpu: Selection = [c.clone()].into_iter().collect();
            prop_assert_eq!(is_compatible(&c, &with_board), is_compatible(&b, &with_cpu));
        }

        #[test]
        fn clearing_never_shrinks_other_kinds((catalog, selection) in arb_world(),
                                              victim in 0usize..11) {
            let kind = ComponentKind::ALL[victim];
            let before = resolve(&catalog, &selection);
            let mut cleared = selection.clone();
            cleared.remove(kind);
            let after = resolve(&catalog, &cleared);
            for other in ComponentKind::ALL.into_iter().filter(|k| *k != kind) {
                for c in before.get(other) {
                    prop_assert!(after.contains(other, &c.id));
                }
            }
        }
    }
}

//! Per-slot decision of which source supplies the next output item.

/// Slots always served by the primary source at the start of a session.
pub const WARMUP_SLOTS: usize = 15;

/// Sampling needs at least this many supplementary sources with ready items.
pub const MIN_CANDIDATES: usize = 2;

/// What the aggregator sees when it fills slot `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    /// Number of items emitted so far in this session.
    pub slot: usize,
    pub mixing_enabled: bool,
    /// Supplementary sources with at least one ready item.
    pub candidates: usize,
    /// Primary still has ready items or upstream pages.
    pub primary_has_more: bool,
    pub primary_has_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChoice {
    /// Take one item from the next candidate in round-robin order.
    Supplementary,
    Primary,
    /// Primary has more upstream but nothing buffered: end this page early
    /// instead of stalling on it.
    Stall,
    /// Nothing left anywhere.
    Exhausted,
}

pub fn is_sampling_slot(state: &SlotState) -> bool {
    state.mixing_enabled
        && state.slot >= WARMUP_SLOTS
        && state.candidates >= MIN_CANDIDATES
        && (state.slot % 4 == 0 || state.slot % 5 == 0)
}

/// `Supplementary` is only ever returned with at least one candidate.
pub fn choose(state: &SlotState) -> SlotChoice {
    if state.candidates == 0 && !state.primary_has_more {
        SlotChoice::Exhausted
    } else if is_sampling_slot(state) || !state.primary_has_more {
        SlotChoice::Supplementary
    } else if !state.primary_has_ready {
        SlotChoice::Stall
    } else {
        SlotChoice::Primary
    }
}

use std::sync::Arc;

use qmc_kernel::event_group::EventGroup;

/// Panel input bits (spec §6 "on-panel inputs: event group bits 0..23"):
/// four buttons with press/release pairs, eight digital inputs with
/// high/low pairs, two lid sensors, one emergency-stop input. Debouncing
/// is explicitly NOT this crate's job — a collaborator (the panel
/// hardware driver, out of scope per spec.md §1) delivers already-
/// debounced edges and this is only the writer contract those edges
/// land on.
pub const BIT_BUTTON_1_PRESSED: u32 = 1 << 0;
pub const BIT_BUTTON_1_RELEASED: u32 = 1 << 1;
pub const BIT_BUTTON_2_PRESSED: u32 = 1 << 2;
pub const BIT_BUTTON_2_RELEASED: u32 = 1 << 3;
pub const BIT_BUTTON_3_PRESSED: u32 = 1 << 4;
pub const BIT_BUTTON_3_RELEASED: u32 = 1 << 5;
pub const BIT_BUTTON_4_PRESSED: u32 = 1 << 6;
pub const BIT_BUTTON_4_RELEASED: u32 = 1 << 7;
/// Eight digital inputs, high/low pair per input: bits 8..15 (high),
/// 16..23 (low) — together with the eight button bits above this fills
/// the nominal 0..23 range spec §6 names; the lid sensors and
/// emergency-stop input spill one word further (bits 24..26), which is
/// this crate's own open design decision since the spec's named signal
/// count (27) does not actually fit in 24 bits.
pub const BIT_DIGITAL_IN_HIGH_BASE: u32 = 8;
pub const BIT_DIGITAL_IN_LOW_BASE: u32 = 16;
pub const BIT_LID_1_OPEN: u32 = 1 << 24;
pub const BIT_LID_2_OPEN: u32 = 1 << 25;
pub const BIT_EMERGENCY_STOP: u32 = 1 << 26;

/// Thin writer over the shared panel event group. One instance per
/// device; `qmc-app` hands the `Arc<EventGroup>` to the panel hardware
/// driver (out of scope) and to whatever reads it (the fault dispatcher
/// for the e-stop bit, the REST/MQTT layer for telemetry).
pub struct PanelInputs {
    events: Arc<EventGroup>,
}

impl PanelInputs {
    pub fn new() -> Self {
        Self { events: EventGroup::new() }
    }

    pub fn events(&self) -> Arc<EventGroup> {
        self.events.clone()
    }

    pub fn button_pressed(&self, button: u8) -> bool {
        self.events.get() & (BIT_BUTTON_1_PRESSED << (button.saturating_sub(1) as u32 * 2)) != 0
    }

    pub fn digital_in_high(&self, index: u8) -> bool {
        self.events.get() & (1 << (BIT_DIGITAL_IN_HIGH_BASE + index as u32)) != 0
    }

    pub fn lid_open(&self, lid: u8) -> bool {
        match lid {
            1 => self.events.get() & BIT_LID_1_OPEN != 0,
            2 => self.events.get() & BIT_LID_2_OPEN != 0,
            _ => false,
        }
    }

    pub fn emergency_stop_asserted(&self) -> bool {
        self.events.get() & BIT_EMERGENCY_STOP != 0
    }
}

impl Default for PanelInputs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_press_bit_is_independent_per_button() {
        let panel = PanelInputs::new();
        panel.events().set(BIT_BUTTON_2_PRESSED);
        assert!(panel.button_pressed(2));
        assert!(!panel.button_pressed(1));
    }

    #[test]
    fn emergency_stop_reads_back_once_set() {
        let panel = PanelInputs::new();
        assert!(!panel.emergency_stop_asserted());
        panel.events().set(BIT_EMERGENCY_STOP);
        assert!(panel.emergency_stop_asserted());
    }

    #[test]
    fn lid_bits_are_independent() {
        let panel = PanelInputs::new();
        panel.events().set(BIT_LID_1_OPEN);
        assert!(panel.lid_open(1));
        assert!(!panel.lid_open(2));
    }
}

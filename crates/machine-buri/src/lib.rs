//! Búri homebrew computer board glue.
//!
//! The Búri is a 65C816 homebrew machine. This crate models the two pieces
//! of board-level wiring that are not chips in their own right:
//!
//! * the SPI master port the CPU bit-bangs through VIA port A, with the
//!   keyboard controller attached as device 0 ([`SpiPort`]), and
//! * the wired-OR combination of the board's interrupt sources into the
//!   single CPU IRQ input ([`IrqLines`]).
//!
//! The CPU, memory map, VIA, VDP, ACIA and sound chip are the host's
//! responsibility. The host calls [`Buri::write_via_pa`] whenever its VIA
//! emulation changes the port A output pins, reads MISO back through
//! [`Buri::read_via_pa`], routes [`Buri::keyboard_irq`] to the VIA CA1
//! input, and feeds each chip's IRQ output into the matching `set_*_irq`
//! method. All of it is synchronous: when any of these calls returns, the
//! board state — MISO, interrupt levels, aggregate IRQ — is current.

mod irq;
mod spi_port;

pub use irq::{IrqLines, IrqSource};
pub use spi_port::{DEVICE_KEYBOARD, DEVICE_NONE, SpiPort};

use emu_core::{Observable, Value};

/// Board-level wiring: SPI port plus interrupt aggregation.
pub struct Buri {
    spi: SpiPort,
    irqs: IrqLines,
}

impl Buri {
    #[must_use]
    pub fn new() -> Self {
        Self {
            spi: SpiPort::new(),
            irqs: IrqLines::new(),
        }
    }

    /// CPU wrote VIA port A: decode SPI select/clock/data transitions.
    pub fn write_via_pa(&mut self, value: u8) {
        self.spi.write_port_a(value);
    }

    /// Input pins of VIA port A: MISO on PA7.
    #[must_use]
    pub fn read_via_pa(&self) -> u8 {
        self.spi.port_a_in()
    }

    /// A scancode arrived from the upstream AT keyboard emulation.
    pub fn key_scancode(&mut self, scancode: u8) {
        self.spi.keyboard_mut().peripheral_mut().scancode_ready(scancode);
    }

    /// Keyboard data-ready level. The host routes this to the VIA CA1
    /// input; its path into the CPU IRQ runs through the VIA.
    #[must_use]
    pub fn keyboard_irq(&self) -> bool {
        self.spi.keyboard().peripheral().irq_active()
    }

    /// ACIA IRQ output changed. Returns the new aggregate level when the
    /// CPU IRQ line changed.
    pub fn set_acia_irq(&mut self, level: bool) -> Option<bool> {
        self.irqs.set(IrqSource::Acia, level)
    }

    /// VDP /INT output changed. The pin is active-low; it is normalised
    /// here, at the source, before aggregation.
    pub fn set_vdp_irq_n(&mut self, level: bool) -> Option<bool> {
        self.irqs.set(IrqSource::Vdp, !level)
    }

    /// VIA IRQ output changed. Returns the new aggregate level when the
    /// CPU IRQ line changed.
    pub fn set_via_irq(&mut self, level: bool) -> Option<bool> {
        self.irqs.set(IrqSource::Via, level)
    }

    /// Current CPU IRQ line level (the wired-OR aggregate).
    #[must_use]
    pub fn cpu_irq(&self) -> bool {
        self.irqs.asserted()
    }

    /// The SPI port, for direct inspection.
    #[must_use]
    pub fn spi(&self) -> &SpiPort {
        &self.spi
    }

    /// The SPI port, mutably.
    pub fn spi_mut(&mut self) -> &mut SpiPort {
        &mut self.spi
    }
}

impl Default for Buri {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for Buri {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "irq.acia" => Some(self.irqs.source(IrqSource::Acia).into()),
            "irq.vdp" => Some(self.irqs.source(IrqSource::Vdp).into()),
            "irq.via" => Some(self.irqs.source(IrqSource::Via).into()),
            "irq.cpu" => Some(self.irqs.asserted().into()),
            "spi.device" => Some(self.spi.selected_device().into()),
            "spi.miso" => Some(self.spi.miso().into()),
            "kbd.irq" => Some(self.keyboard_irq().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "irq.acia",
            "irq.vdp",
            "irq.via",
            "irq.cpu",
            "spi.device",
            "spi.miso",
            "kbd.irq",
        ]
    }
}

//! SPI master port: VIA port A bit decode.
//!
//! The Búri bit-bangs SPI through the 6522 VIA's port A:
//!
//! ```text
//!           |     |
//!       PA0 |-->--| CLK
//! VIA   PA1 |-->--| MOSI   SPI peripheral
//!       PA7 |--<--| MISO
//!           |     |
//! ```
//!
//! PA2–PA4 run through a 74138 3-to-8 decoder to produce the chip select
//! lines, so up to seven peripherals can be attached; device number 7 is
//! reserved for "no device". Device 0 is the keyboard controller.

use peripheral_spi_keyboard::SpiKeyboard;
use spi_slave::SpiSlave;

/// Device number the keyboard controller answers to.
pub const DEVICE_KEYBOARD: u8 = 0;

/// Device number meaning "no device selected".
pub const DEVICE_NONE: u8 = 7;

/// The board's SPI master port and its attached peripherals.
pub struct SpiPort {
    keyboard: SpiSlave<SpiKeyboard>,
    /// Device number decoded from the last port write.
    selected_device: u8,
}

impl SpiPort {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keyboard: SpiKeyboard::new_slave(),
            selected_device: DEVICE_NONE,
        }
    }

    /// Decode one CPU write to VIA port A into SPI line transitions.
    ///
    /// PA0 = CLK, PA1 = MOSI, PA2–PA4 = device select. Select is applied
    /// before the clock so a single write can select a device and start
    /// clocking it; the clock edge is processed before the MOSI update,
    /// so data intended for a sampling edge must be written first.
    pub fn write_port_a(&mut self, value: u8) {
        let clk = value & 0x01 != 0;
        let mosi = value & 0x02 != 0;
        self.selected_device = (value >> 2) & 0x07;

        self.keyboard
            .write_select(self.selected_device == DEVICE_KEYBOARD);
        self.keyboard.write_clock(clk);
        self.keyboard.write_mosi(mosi);
    }

    /// Input view of port A: MISO on PA7, other input bits low.
    #[must_use]
    pub fn port_a_in(&self) -> u8 {
        if self.keyboard.read_miso() { 0x80 } else { 0x00 }
    }

    /// Raw MISO line level.
    #[must_use]
    pub fn miso(&self) -> bool {
        self.keyboard.read_miso()
    }

    /// Device number decoded from the last port write.
    #[must_use]
    pub fn selected_device(&self) -> u8 {
        self.selected_device
    }

    /// The keyboard slave on device 0.
    #[must_use]
    pub fn keyboard(&self) -> &SpiSlave<SpiKeyboard> {
        &self.keyboard
    }

    /// The keyboard slave on device 0, mutably.
    pub fn keyboard_mut(&mut self) -> &mut SpiSlave<SpiKeyboard> {
        &mut self.keyboard
    }
}

impl Default for SpiPort {
    fn default() -> Self {
        Self::new()
    }
}

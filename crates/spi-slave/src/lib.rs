//! SPI slave line engine.
//!
//! An SPI slave exposes three serial lines — MOSI, MISO and CLK — plus a
//! select line that enables the device. Writing CLK or MOSI has no effect
//! while the select line is low. Two construction-time parameters define
//! the exact flavour of SPI:
//!
//! 1. The SPI "mode" (0–3), encoding clock polarity (CPOL: idle level) and
//!    clock phase (CPHA: which edge samples data).
//! 2. The bit order: most significant or least significant bit first.
//!
//! SPI is full duplex; each communication exchanges one byte from the
//! master to the slave and one byte from the slave to the master. The
//! engine turns raw clock edges into byte-granular exchanges and hands
//! each completed byte to its [`SpiPeripheral`], whose return value is
//! the byte sent on the next exchange.
//!
//! # Edge roles
//!
//! | Mode | CPOL | CPHA | Sample edge   | Shift edge    |
//! |------|------|------|---------------|---------------|
//! | 0    | 0    | 0    | rising        | falling       |
//! | 1    | 0    | 1    | falling       | rising        |
//! | 2    | 1    | 0    | falling       | rising        |
//! | 3    | 1    | 1    | rising        | falling       |

use emu_core::{Observable, Value};

/// SPI mode: clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0: clock idles low, sample on the first (rising) edge.
    Mode0,
    /// CPOL=0, CPHA=1: clock idles low, sample on the second (falling) edge.
    Mode1,
    /// CPOL=1, CPHA=0: clock idles high, sample on the first (falling) edge.
    Mode2,
    /// CPOL=1, CPHA=1: clock idles high, sample on the second (rising) edge.
    Mode3,
}

impl SpiMode {
    /// Clock polarity: the idle level of the clock line.
    #[must_use]
    pub fn cpol(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    /// Clock phase: false samples on the idle→active edge, true on the
    /// active→idle edge.
    #[must_use]
    pub fn cpha(self) -> bool {
        matches!(self, SpiMode::Mode1 | SpiMode::Mode3)
    }
}

/// Bit order of a byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Most significant bit first.
    MsbFirst,
    /// Least significant bit first.
    LsbFirst,
}

/// Protocol layer sitting on top of the byte-exchange primitive.
///
/// All notifications run synchronously inside the line write that caused
/// them; when a line write returns, the peripheral has fully reacted.
pub trait SpiPeripheral {
    /// The device was selected and previously wasn't.
    fn on_select(&mut self) {}

    /// The device was deselected and previously was.
    fn on_deselect(&mut self) {}

    /// A full byte has been exchanged. `received` is the byte shifted in
    /// from the master; the return value is armed as the byte sent on the
    /// next exchange (return 0x00 to send nothing meaningful).
    fn on_byte_exchanged(&mut self, received: u8) -> u8;
}

/// SPI slave exchange engine.
///
/// Owns the line state and its protocol peripheral. The master drives
/// SELECT, CLK and MOSI through the write methods; the engine drives MISO.
pub struct SpiSlave<P: SpiPeripheral> {
    mode: SpiMode,
    bit_order: BitOrder,
    /// Select line level. CLK and MOSI writes are ignored while low.
    selected: bool,
    /// Clock line level, as last written.
    clk: bool,
    /// Master-out line level, sampled on sample edges.
    mosi: bool,
    /// Slave-out line level. The only line the engine drives.
    miso: bool,
    /// Byte being shifted in from the master.
    recv_byte: u8,
    /// Byte being shifted out to the master.
    send_byte: u8,
    /// Bits sampled so far in the current exchange (0..=8).
    recv_count: u8,
    /// Bits driven so far in the current exchange (0..=8).
    send_count: u8,
    peripheral: P,
}

impl<P: SpiPeripheral> SpiSlave<P> {
    /// Create a slave with the given bus flavour, wrapping its peripheral.
    ///
    /// The clock line starts at its idle level (CPOL), so a master that
    /// begins from idle produces a recognisable first edge in every mode.
    #[must_use]
    pub fn new(mode: SpiMode, bit_order: BitOrder, peripheral: P) -> Self {
        Self {
            mode,
            bit_order,
            selected: false,
            clk: mode.cpol(),
            mosi: false,
            miso: false,
            recv_byte: 0,
            send_byte: 0,
            recv_count: 0,
            send_count: 0,
            peripheral,
        }
    }

    /// Write the select line.
    ///
    /// A rising edge clears the bit counters and notifies the peripheral;
    /// a falling edge only notifies. Rewriting the current level is a
    /// no-op.
    pub fn write_select(&mut self, level: bool) {
        if self.selected == level {
            return;
        }
        self.selected = level;
        if level {
            // Newly selected: any partial exchange is abandoned.
            self.recv_count = 0;
            self.send_count = 0;
            self.peripheral.on_select();
        } else {
            self.peripheral.on_deselect();
        }
    }

    /// Write the clock line.
    ///
    /// No-op if the level is unchanged or the device is not selected.
    /// Otherwise classifies the transition against CPOL and dispatches.
    pub fn write_clock(&mut self, level: bool) {
        if self.clk == level {
            return;
        }
        self.clk = level;
        if !self.selected {
            return;
        }
        let idle_to_active = level != self.mode.cpol();
        self.clock_edge(idle_to_active);
    }

    /// Write the MOSI line. Discarded while the device is not selected.
    pub fn write_mosi(&mut self, level: bool) {
        if self.selected {
            self.mosi = level;
        }
    }

    /// Current MISO level. Pure read, no side effect.
    #[must_use]
    pub fn read_miso(&self) -> bool {
        self.miso
    }

    /// Arm `byte` as the next byte sent to the master and drive its first
    /// bit onto MISO immediately, so the master can observe it before the
    /// next clock edge.
    ///
    /// After a completed exchange the send byte resets to 0x00 before the
    /// peripheral callback runs; the callback's return value then
    /// overrides the reset through this method.
    pub fn set_miso_byte(&mut self, byte: u8) {
        self.send_byte = byte;
        match self.bit_order {
            BitOrder::MsbFirst => self.miso = byte & 0x80 != 0,
            BitOrder::LsbFirst => self.miso = byte & 0x01 != 0,
        }
        // With CPHA=0 the first qualifying edge samples: arming launches
        // the first bit, and the register advances so the shift edges that
        // follow expose the remaining seven.
        if !self.mode.cpha() {
            self.advance_send();
        }
    }

    /// Reset the exchange state: counters and shift registers to zero,
    /// MISO released low. Line levels and the peripheral are untouched.
    pub fn reset(&mut self) {
        self.recv_count = 0;
        self.send_count = 0;
        self.recv_byte = 0;
        self.send_byte = 0;
        self.miso = false;
    }

    /// Bus mode this slave was built with.
    #[must_use]
    pub fn mode(&self) -> SpiMode {
        self.mode
    }

    /// Bit order this slave was built with.
    #[must_use]
    pub fn bit_order(&self) -> BitOrder {
        self.bit_order
    }

    /// Select line level.
    #[must_use]
    pub fn selected(&self) -> bool {
        self.selected
    }

    /// The wrapped protocol peripheral.
    #[must_use]
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// The wrapped protocol peripheral, mutably (scancode feeds, resets).
    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }

    // Diagnostic accessors for test instrumentation
    #[must_use]
    pub fn recv_count(&self) -> u8 {
        self.recv_count
    }

    #[must_use]
    pub fn send_count(&self) -> u8 {
        self.send_count
    }

    /// Handle one qualifying clock edge.
    ///
    /// CPHA selects which edge samples: with CPHA=0 data is stable on the
    /// idle→active edge; with CPHA=1 on the active→idle edge. The other
    /// edge shifts the next output bit onto MISO.
    fn clock_edge(&mut self, idle_to_active: bool) {
        let data_stable = if self.mode.cpha() {
            !idle_to_active
        } else {
            idle_to_active
        };

        if data_stable {
            // Data is stable: sample MOSI.
            self.recv_byte = match self.bit_order {
                BitOrder::MsbFirst => (self.recv_byte << 1) | u8::from(self.mosi),
                BitOrder::LsbFirst => (self.recv_byte >> 1) | (u8::from(self.mosi) << 7),
            };
            self.recv_count += 1;
        } else {
            // Data lines may change: expose the next output bit.
            match self.bit_order {
                BitOrder::MsbFirst => self.miso = self.send_byte & 0x80 != 0,
                BitOrder::LsbFirst => self.miso = self.send_byte & 0x01 != 0,
            }
            self.advance_send();
            self.send_count += 1;
        }

        if self.recv_count == 8 && self.send_count == 8 {
            // Sent and received an entire byte.
            self.recv_count = 0;
            self.send_count = 0;
            let received = self.recv_byte;
            self.set_miso_byte(0x00); // default reply
            let reply = self.peripheral.on_byte_exchanged(received);
            self.set_miso_byte(reply);
        }
    }

    fn advance_send(&mut self) {
        match self.bit_order {
            BitOrder::MsbFirst => self.send_byte <<= 1,
            BitOrder::LsbFirst => self.send_byte >>= 1,
        }
    }
}

impl<P: SpiPeripheral> Observable for SpiSlave<P> {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "selected" => Some(self.selected.into()),
            "clk" => Some(self.clk.into()),
            "mosi" => Some(self.mosi.into()),
            "miso" => Some(self.miso.into()),
            "recv_count" => Some(self.recv_count.into()),
            "send_count" => Some(self.send_count.into()),
            "mode" => Some(format!("{:?}", self.mode).into()),
            "bit_order" => Some(format!("{:?}", self.bit_order).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "selected",
            "clk",
            "mosi",
            "miso",
            "recv_count",
            "send_count",
            "mode",
            "bit_order",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test peripheral: records notifications, replies from a queue.
    struct Recorder {
        received: Vec<u8>,
        selects: u32,
        deselects: u32,
        replies: Vec<u8>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                received: Vec::new(),
                selects: 0,
                deselects: 0,
                replies: Vec::new(),
            }
        }
    }

    impl SpiPeripheral for Recorder {
        fn on_select(&mut self) {
            self.selects += 1;
        }

        fn on_deselect(&mut self) {
            self.deselects += 1;
        }

        fn on_byte_exchanged(&mut self, received: u8) -> u8 {
            self.received.push(received);
            if self.replies.is_empty() {
                0x00
            } else {
                self.replies.remove(0)
            }
        }
    }

    /// Bit-bang one full byte exchange from the master side.
    ///
    /// Drives MOSI with `tx` and returns the byte observed on MISO,
    /// sampling and shifting on the edges the slave's mode calls for.
    fn clock_byte(spi: &mut SpiSlave<Recorder>, tx: u8) -> u8 {
        let idle = spi.mode().cpol();
        let cpha = spi.mode().cpha();
        let order = spi.bit_order();
        let mut rx = 0u8;

        for bit in 0..8 {
            let out = match order {
                BitOrder::MsbFirst => tx & (0x80 >> bit) != 0,
                BitOrder::LsbFirst => tx & (1 << bit) != 0,
            };
            let in_bit = if cpha {
                // Slave shifts on idle→active, samples on active→idle.
                spi.write_clock(!idle);
                let seen = spi.read_miso();
                spi.write_mosi(out);
                spi.write_clock(idle);
                seen
            } else {
                // Slave samples on idle→active, shifts on active→idle.
                spi.write_mosi(out);
                let seen = spi.read_miso();
                spi.write_clock(!idle);
                spi.write_clock(idle);
                seen
            };
            match order {
                BitOrder::MsbFirst => rx = (rx << 1) | u8::from(in_bit),
                BitOrder::LsbFirst => rx = (rx >> 1) | (u8::from(in_bit) << 7),
            }
        }
        rx
    }

    fn all_flavours() -> [(SpiMode, BitOrder); 8] {
        [
            (SpiMode::Mode0, BitOrder::MsbFirst),
            (SpiMode::Mode0, BitOrder::LsbFirst),
            (SpiMode::Mode1, BitOrder::MsbFirst),
            (SpiMode::Mode1, BitOrder::LsbFirst),
            (SpiMode::Mode2, BitOrder::MsbFirst),
            (SpiMode::Mode2, BitOrder::LsbFirst),
            (SpiMode::Mode3, BitOrder::MsbFirst),
            (SpiMode::Mode3, BitOrder::LsbFirst),
        ]
    }

    #[test]
    fn mode_encodings() {
        assert!(!SpiMode::Mode0.cpol() && !SpiMode::Mode0.cpha());
        assert!(!SpiMode::Mode1.cpol() && SpiMode::Mode1.cpha());
        assert!(SpiMode::Mode2.cpol() && !SpiMode::Mode2.cpha());
        assert!(SpiMode::Mode3.cpol() && SpiMode::Mode3.cpha());
    }

    #[test]
    fn full_duplex_exchange_all_flavours() {
        // The value transferred must not depend on mode — only on bit
        // order and the bytes themselves.
        for (mode, order) in all_flavours() {
            let mut spi = SpiSlave::new(mode, order, Recorder::new());
            spi.peripheral_mut().replies.push(0x3C);

            spi.write_select(true);
            spi.set_miso_byte(0x5A);

            let seen1 = clock_byte(&mut spi, 0xA5);
            assert_eq!(seen1, 0x5A, "{mode:?}/{order:?} first reply");

            // The reply to the first exchange came from the peripheral's
            // return value and must appear on the second.
            let seen2 = clock_byte(&mut spi, 0x0F);
            assert_eq!(seen2, 0x3C, "{mode:?}/{order:?} second reply");

            assert_eq!(spi.peripheral().received, vec![0xA5, 0x0F]);
        }
    }

    #[test]
    fn mode0_msb_scenario() {
        // Mode 0, MSB first: master sends $A5, slave replies $3C.
        let mut spi = SpiSlave::new(SpiMode::Mode0, BitOrder::MsbFirst, Recorder::new());
        spi.write_select(true);
        spi.set_miso_byte(0x3C);

        let mut seen = Vec::new();
        for bit in 0..8 {
            spi.write_mosi(0xA5 & (0x80 >> bit) != 0);
            seen.push(spi.read_miso());
            spi.write_clock(true);
            spi.write_clock(false);
        }

        assert_eq!(spi.peripheral().received, vec![0xA5]);
        let expected: Vec<bool> = (0..8).map(|bit| 0x3C & (0x80 >> bit) != 0).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn clock_write_is_idempotent() {
        let mut spi = SpiSlave::new(SpiMode::Mode0, BitOrder::MsbFirst, Recorder::new());
        spi.write_select(true);

        spi.write_clock(true);
        assert_eq!(spi.recv_count(), 1);
        spi.write_clock(true); // no change, no edge
        assert_eq!(spi.recv_count(), 1);
        spi.write_clock(false);
        spi.write_clock(false);
        assert_eq!(spi.send_count(), 1);
    }

    #[test]
    fn clock_ignored_while_deselected() {
        let mut spi = SpiSlave::new(SpiMode::Mode0, BitOrder::MsbFirst, Recorder::new());
        spi.write_clock(true);
        spi.write_clock(false);
        assert_eq!(spi.recv_count(), 0);
        assert_eq!(spi.send_count(), 0);
    }

    #[test]
    fn mosi_discarded_while_deselected() {
        let mut spi = SpiSlave::new(SpiMode::Mode0, BitOrder::MsbFirst, Recorder::new());
        spi.write_mosi(true);
        spi.write_select(true);
        // The pre-select MOSI level must not have been latched.
        spi.write_clock(true);
        spi.write_clock(false);
        assert_eq!(spi.peripheral().received, Vec::<u8>::new());
        // One sample of a low line.
        assert_eq!(spi.recv_count(), 1);
    }

    #[test]
    fn reselect_resets_partial_exchange() {
        let mut spi = SpiSlave::new(SpiMode::Mode0, BitOrder::MsbFirst, Recorder::new());
        spi.write_select(true);

        // Three bits of a byte that never completes.
        for _ in 0..3 {
            spi.write_mosi(true);
            spi.write_clock(true);
            spi.write_clock(false);
        }
        assert_eq!(spi.recv_count(), 3);

        spi.write_select(false);
        spi.write_select(true);
        assert_eq!(spi.recv_count(), 0);
        assert_eq!(spi.send_count(), 0);

        // A full byte now completes cleanly.
        let seen = clock_byte(&mut spi, 0x81);
        assert_eq!(spi.peripheral().received, vec![0x81]);
        assert_eq!(seen, 0x00);
    }

    #[test]
    fn select_notifications_fire_once_per_transition() {
        let mut spi = SpiSlave::new(SpiMode::Mode1, BitOrder::MsbFirst, Recorder::new());
        spi.write_select(true);
        spi.write_select(true);
        spi.write_select(false);
        spi.write_select(false);
        assert_eq!(spi.peripheral().selects, 1);
        assert_eq!(spi.peripheral().deselects, 1);
    }

    #[test]
    fn send_byte_defaults_to_zero_after_exchange() {
        // Peripheral that never arms a reply: every exchange after the
        // armed first byte must send 0x00.
        let mut spi = SpiSlave::new(SpiMode::Mode1, BitOrder::MsbFirst, Recorder::new());
        spi.write_select(true);
        spi.set_miso_byte(0xFF);

        assert_eq!(clock_byte(&mut spi, 0x00), 0xFF);
        assert_eq!(clock_byte(&mut spi, 0x00), 0x00);
        assert_eq!(clock_byte(&mut spi, 0x00), 0x00);
    }

    #[test]
    fn arming_drives_first_bit_immediately() {
        let mut spi = SpiSlave::new(SpiMode::Mode0, BitOrder::MsbFirst, Recorder::new());
        assert!(!spi.read_miso());
        spi.set_miso_byte(0x80);
        assert!(spi.read_miso());

        let mut spi = SpiSlave::new(SpiMode::Mode0, BitOrder::LsbFirst, Recorder::new());
        spi.set_miso_byte(0x01);
        assert!(spi.read_miso());
    }

    #[test]
    fn reset_clears_exchange_state() {
        let mut spi = SpiSlave::new(SpiMode::Mode0, BitOrder::MsbFirst, Recorder::new());
        spi.write_select(true);
        spi.set_miso_byte(0xFF);
        spi.write_mosi(true);
        spi.write_clock(true); // one sampled bit
        assert_eq!(spi.recv_count(), 1);

        spi.reset();
        assert_eq!(spi.recv_count(), 0);
        assert_eq!(spi.send_count(), 0);
        assert!(!spi.read_miso());
    }

    #[test]
    fn observable_paths() {
        let mut spi = SpiSlave::new(SpiMode::Mode1, BitOrder::MsbFirst, Recorder::new());
        spi.write_select(true);
        assert_eq!(spi.query("selected"), Some(Value::Bool(true)));
        assert_eq!(spi.query("mode"), Some(Value::String("Mode1".into())));
        assert_eq!(spi.query("nonsense"), None);
        for path in spi.query_paths() {
            assert!(spi.query(path).is_some(), "path {path} must resolve");
        }
    }
}

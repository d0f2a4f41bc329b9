//! SPI keyboard controller.
//!
//! The keyboard controller presents AT set-1 scancodes from an upstream
//! keyboard emulation over SPI. The device speaks SPI mode 1, MSB first.
//! There are two transaction kinds: read scancode and write control.
//!
//! After selecting the device, the master exchanges exactly two bytes.
//! Further exchanges in the same selection are answered with $00 and
//! ignored.
//!
//! # Read scancode
//!
//! First byte with the high bit clear (the value is otherwise ignored):
//!
//! | MOSI | MISO     |
//! |------|----------|
//! | $00  | X        |
//! | X    | scancode |
//!
//! Reading clears the scancode register to $00 and releases the
//! data-ready interrupt, so a read with nothing pending returns $00.
//!
//! # Write control
//!
//! First byte with the high bit set; the low 7 bits are the control code
//! and the response arrives in the second exchange:
//!
//! | MOSI       | MISO     |
//! |------------|----------|
//! | $80 | ctrl | X        |
//! | X          | response |
//!
//! Control codes:
//!
//! * `$00` — reset the controller; response $00.
//! * `$01` — scancode register status: $FF if full, $00 if empty. Peeks
//!   without clearing.
//! * anything else — response $00, no effect. Not a stable interface.

use emu_core::{Observable, Value};
use spi_slave::{BitOrder, SpiMode, SpiPeripheral, SpiSlave};

/// Transaction-protocol state. Advances only on completed byte exchanges,
/// never on individual bit edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Select line low.
    NotSelected,
    /// Selected, no byte exchanged yet: the next byte is a command.
    NewlySelected,
    /// Read command seen; scancode armed for the second exchange.
    ReadyToRead,
    /// Control command seen; response armed for the second exchange.
    ReadyToRespond,
    /// Two bytes exchanged; ignore everything until deselect.
    Done,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::NotSelected => "not_selected",
            State::NewlySelected => "newly_selected",
            State::ReadyToRead => "ready_to_read",
            State::ReadyToRespond => "ready_to_respond",
            State::Done => "done",
        }
    }
}

/// SPI keyboard controller.
///
/// Feed it scancodes with [`SpiKeyboard::scancode_ready`]; the board polls
/// [`SpiKeyboard::irq_active`] for the data-ready line. The register holds
/// at most one pending byte: an unread scancode is silently overwritten by
/// the next one.
pub struct SpiKeyboard {
    state: State,
    /// Last scancode received from the upstream keyboard. $00 once read.
    scancode: u8,
    /// Scancode register holds an unread byte.
    scancode_full: bool,
    /// Data-ready interrupt level (active high, already normalised).
    irq: bool,
}

impl SpiKeyboard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::NotSelected,
            scancode: 0,
            scancode_full: false,
            irq: false,
        }
    }

    /// Wrap a new controller in an [`SpiSlave`] with the bus flavour the
    /// device is wired for: mode 1, MSB first.
    #[must_use]
    pub fn new_slave() -> SpiSlave<SpiKeyboard> {
        SpiSlave::new(SpiMode::Mode1, BitOrder::MsbFirst, SpiKeyboard::new())
    }

    /// A new scancode is available from the upstream keyboard emulation.
    ///
    /// Overwrites any unread scancode (at most one byte pends, no queue)
    /// and asserts the data-ready interrupt.
    pub fn scancode_ready(&mut self, scancode: u8) {
        self.scancode = scancode;
        self.scancode_full = true;
        self.irq = true;
    }

    /// Data-ready interrupt level. Asserted from scancode arrival until
    /// the scancode is read out or the controller is reset.
    #[must_use]
    pub fn irq_active(&self) -> bool {
        self.irq
    }

    /// Scancode register status without clearing it.
    #[must_use]
    pub fn scancode_pending(&self) -> bool {
        self.scancode_full
    }

    /// Full controller reset: protocol state, scancode register and
    /// interrupt all cleared. Also reachable over the wire as control $00.
    pub fn reset(&mut self) {
        self.state = State::NotSelected;
        self.scancode = 0;
        self.scancode_full = false;
        self.irq = false;
    }

    /// Dispatch a control code; returns the response byte.
    fn control(&mut self, code: u8) -> u8 {
        match code {
            0x00 => {
                self.reset();
                0x00
            }
            0x01 => {
                if self.scancode_full {
                    0xFF
                } else {
                    0x00
                }
            }
            // Undefined control codes answer $00 and change nothing.
            _ => 0x00,
        }
    }

    /// Consume the pending scancode, clearing the register and releasing
    /// the interrupt.
    fn take_scancode(&mut self) -> u8 {
        let scancode = self.scancode;
        self.scancode = 0;
        self.scancode_full = false;
        self.irq = false;
        scancode
    }
}

impl SpiPeripheral for SpiKeyboard {
    fn on_select(&mut self) {
        self.state = State::NewlySelected;
    }

    fn on_deselect(&mut self) {
        self.state = State::NotSelected;
    }

    fn on_byte_exchanged(&mut self, received: u8) -> u8 {
        match self.state {
            State::NewlySelected => {
                if received & 0x80 != 0 {
                    // Control: the low 7 bits select the operation. A
                    // reset control overrides the state set here.
                    self.state = State::ReadyToRespond;
                    self.control(received & 0x7F)
                } else {
                    // Read: arm the scancode and clear the register.
                    self.state = State::ReadyToRead;
                    self.take_scancode()
                }
            }
            State::ReadyToRead | State::ReadyToRespond => {
                self.state = State::Done;
                0x00
            }
            // Exchanges past the two-byte window (or while the protocol
            // thinks it is deselected) answer $00.
            _ => 0x00,
        }
    }
}

impl Default for SpiKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for SpiKeyboard {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "state" => Some(self.state.name().into()),
            "scancode" => Some(self.scancode.into()),
            "scancode_full" => Some(self.scancode_full.into()),
            "irq" => Some(self.irq.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["state", "scancode", "scancode_full", "irq"]
    }
}

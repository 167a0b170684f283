//! Four 8x8 matrix LED panels: a heart pulsing with the beats, then the rate.
// https://www.analog.com/media/en/technical-documentation/data-sheets/max7219-max7221.pdf
use crate::{DisplaySpiClkOutput, DisplaySpiCsOutput, DisplaySpiMosiOutput, DISPLAY_INTENSITY};
use arduino_hal::port::{
    mode::{self, Io},
    Pin,
};
use max7219::{connectors::PinConnector, DataError};

type DisplayInterface = max7219::MAX7219<
    PinConnector<
        Pin<mode::Output, DisplaySpiMosiOutput>,
        Pin<mode::Output, DisplaySpiCsOutput>,
        Pin<mode::Output, DisplaySpiClkOutput>,
    >,
>;

/// Number of chained panels
const PANELS: usize = 4;
/// Columns of the whole display
const COLUMNS: usize = PANELS * 8;
/// First column of the rate, after the heart
const BPM_COLUMN: usize = 11;

/// Columns (over 7 rows, lsb on top) of the heart, filled during a beat
const HEART_FULL: [u8; 7] = [0x0c, 0x1e, 0x3e, 0x7c, 0x3e, 0x1e, 0x0c];
/// Columns of the heart between two beats
const HEART_EMPTY: [u8; 7] = [0x0c, 0x12, 0x22, 0x44, 0x22, 0x12, 0x0c];
/// Columns of the digits 0 to 9, 5 columns wide
const DIGITS: [[u8; 5]; 10] = [
    [0x3e, 0x51, 0x49, 0x45, 0x3e],
    [0x00, 0x42, 0x7f, 0x40, 0x00],
    [0x42, 0x61, 0x51, 0x49, 0x46],
    [0x22, 0x41, 0x49, 0x49, 0x36],
    [0x18, 0x14, 0x12, 0x7f, 0x10],
    [0x27, 0x45, 0x45, 0x45, 0x39],
    [0x3e, 0x49, 0x49, 0x49, 0x32],
    [0x61, 0x11, 0x09, 0x05, 0x03],
    [0x36, 0x49, 0x49, 0x49, 0x36],
    [0x26, 0x49, 0x49, 0x49, 0x3e],
];
/// Placeholder of a digit while there is no rate
const DASH: [u8; 5] = [0x00, 0x08, 0x08, 0x08, 0x00];
const BLANK: [u8; 5] = [0x00; 5];

/// Main structure for the display
pub struct Display {
    /// Electronic interface with the display
    display_interface: DisplayInterface,
    /// Content of the display, once rendered
    current: [u8; COLUMNS],
    /// Content applied at the next call to render, column major,
    /// left-to-right
    buffer: [u8; COLUMNS],
}

impl Display {
    /// Initialize the display, blank.
    pub fn init(
        data: Pin<impl Io, DisplaySpiMosiOutput>,
        cs: Pin<impl Io, DisplaySpiCsOutput>,
        clk: Pin<impl Io, DisplaySpiClkOutput>,
    ) -> Result<Self, DataError> {
        let mut display_interface =
            max7219::MAX7219::from_pins(PANELS, data.into_output(), cs.into_output(), clk.into_output())?;
        display_interface.power_on()?;
        for panel in 0..PANELS {
            display_interface.set_intensity(panel, DISPLAY_INTENSITY)?;
            display_interface.clear_display(panel)?;
        }

        Ok(Self {
            display_interface,
            current: [0; COLUMNS],
            buffer: [0; COLUMNS],
        })
    }

    /// Draw the heart, filled during a beat, and the rate in three digits
    /// (dashes while the rate is unknown).
    pub fn write_pulse(&mut self, bpm: u16, beat_active: bool) {
        self.buffer = [0; COLUMNS];
        self.set_at(1, if beat_active { &HEART_FULL } else { &HEART_EMPTY });

        let glyphs = match bpm {
            0 => [DASH; 3],
            bpm => {
                let bpm = bpm.min(999);
                let hundreds = if bpm >= 100 { DIGITS[(bpm / 100) as usize] } else { BLANK };
                let tens = if bpm >= 10 { DIGITS[(bpm / 10 % 10) as usize] } else { BLANK };
                [hundreds, tens, DIGITS[(bpm % 10) as usize]]
            }
        };
        for (index, glyph) in glyphs.iter().enumerate() {
            self.set_at(BPM_COLUMN + 6 * index, glyph);
        }
    }

    /// Actually render (publish) the buffered content, if it changed.
    pub fn render(&mut self) {
        if self.buffer == self.current {
            return;
        }
        self.current = self.buffer;
        for (panel, columns) in self.current.chunks_exact(8).enumerate() {
            self.display_interface.write_raw(panel, &transpose(columns)).ok();
        }
    }

    /// Set columns beginning at the specified index, clipped to the display.
    fn set_at(&mut self, column_index: usize, value: &[u8]) {
        for (slot, byte) in self.buffer.iter_mut().skip(column_index).zip(value) {
            *slot = *byte;
        }
    }
}

/// Transpose 8 columns (lsb on top) to the 8 rows (msb on the left)
/// expected by the panel.
fn transpose(columns: &[u8]) -> [u8; 8] {
    let mut rows = [0u8; 8];
    for (index, column) in columns.iter().enumerate() {
        for (row, byte) in rows.iter_mut().enumerate() {
            if column & (1 << row) != 0 {
                *byte |= 1 << (7 - index);
            }
        }
    }
    rows
}

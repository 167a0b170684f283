//! Beat indicator led.
use embedded_hal::digital::v2::OutputPin;

/// Led lit while a beat is in progress.
/// The pin is only written when the logical state changes.
pub struct PulseIndicator<P: OutputPin> {
    /// Pin connected to the led (or its driver)
    pin: P,
    /// Mapping between the electric levels and the logical level of the led
    logical_level_high: bool,
    lit: bool,
}

impl<P: OutputPin> PulseIndicator<P> {
    /// Initialize the object, led off.
    pub fn init(pin: P, logical_level_high: bool) -> Result<Self, P::Error> {
        let mut out = Self {
            pin,
            logical_level_high,
            lit: false,
        };
        out.write(false)?;
        Ok(out)
    }

    /// Follow the beat/no-beat edge of the detector.
    pub fn update(&mut self, beat_active: bool) -> Result<(), P::Error> {
        if beat_active != self.lit {
            self.write(beat_active)?;
        }
        Ok(())
    }

    /// Follow the raw signal instead: lit above `level`, unlit below it,
    /// unchanged on the level itself.
    pub fn update_raw(&mut self, signal: u16, level: u16) -> Result<(), P::Error> {
        if signal > level {
            self.update(true)
        } else if signal < level {
            self.update(false)
        } else {
            Ok(())
        }
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Set the pin to the electrical level of the logical state.
    fn write(&mut self, lit: bool) -> Result<(), P::Error> {
        if lit == self.logical_level_high {
            self.pin.set_high()?;
        } else {
            self.pin.set_low()?;
        }
        self.lit = lit;
        Ok(())
    }
}

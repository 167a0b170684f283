//! Heartbeat detection for a photoplethysmographic pulse sensor.
//!
//! The raw waveform is sampled from an interrupt into a [`SampleQueue`],
//! drained by the main loop ([`PulseMonitor`]) and fed to an adaptive-threshold
//! [`BeatDetector`], which derives a smoothed beats-per-minute value.
//! This part of the crate is hardware independent: the board binary only
//! provides the collaborators declared in [`sampling`].
#![cfg_attr(not(test), no_std)]

pub mod calibration;
pub mod indicator;
pub mod monitor;
pub mod pulse;
pub mod sampling;
pub mod serial_commands;

pub use calibration::Calibration;
pub use monitor::{Acquisition, PulseMonitor, Reading};
pub use pulse::{BeatDetector, BpmEstimator, DetectorState, SampleOutcome, WarmUp};
pub use sampling::{AsyncDelivery, Clock, Masked, SampleInbox, SampleQueue, SampleSource};

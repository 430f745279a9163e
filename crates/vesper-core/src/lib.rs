//! Hardware-independent core library for the vesper acoustic data-logger.
//!
//! This crate contains the complete duty-cycled recording engine: the
//! cross-wake persisted state model, the dual-gain recording scheduler, the
//! interrupt-fed acquisition/compression pipeline, the per-attempt recording
//! executor and the wake-tick orchestrator.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests). All
//! hardware and peer subsystems — clocking, storage, the microphone, the
//! mode switch, power sensing and the configuration/metadata text
//! collaborators — are reached through the capability traits in [`hal`].

#![no_std]

extern crate alloc;

pub mod acquisition;
pub mod config;
pub mod datetime;
pub mod hal;
pub mod orchestrator;
pub mod recorder;
pub mod retained;
pub mod scheduler;
pub mod wav;

#[cfg(test)]
pub(crate) mod testutil;

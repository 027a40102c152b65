//! Hardware-independent core library for nbagent
//!
//! This crate contains the platform-agnostic logic of the NB-IoT
//! device-management agent: the interrupt-safe event queue, the modem
//! bring-up sequencer, the resource table mirrored to the management
//! server, the registration lifecycle and the periodic sensor sampler.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod agent;
pub mod app_state;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod modem;
pub mod platform;
pub mod resources;
pub mod sensors;

#[cfg(test)]
pub(crate) mod testing;

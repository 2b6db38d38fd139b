#![no_std]
#![allow(async_fn_in_trait)]

// Shared logic for the AirLift telemetry node.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and exposing the collaborator traits the firmware and
// emulator implement.

pub mod battery;
pub mod config;
pub mod link;
pub mod log;
pub mod panel;
pub mod recovery;
pub mod telemetry;
pub mod time;

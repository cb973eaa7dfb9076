//! A small big-endian processor with 16-bit instructions.
//!
//! Eight 16-bit registers, zero and carry flags, a 64 KiB address space and
//! a compact mode with 8-bit encodings selected by the `mode` context
//! variable (`SETM`).

#![no_std]

pub const LANGUAGE_ID: &str = "toy:BE:16:default";

pub const DESCRIPTION: &str = "Toy 16-bit processor, big-endian";

/// Compiled language description.
pub static SLA: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/toy.sla"));

pub const CONTEXT_DEFAULTS: &[(&str, u32)] = &[("mode", 0)];

//! JESD204B link-layer protocol engine.
//!
//! Cycle-accurate transmit and receive engines for the JESD204B link layer:
//! code-group synchronization, initial lane alignment, scrambled and framed
//! data transfer, the local multiframe clock, and the transport-layer mapping
//! between converter samples and lane octets. Every component is a synchronous
//! state machine advanced one protocol-clock cycle per `step` call; the
//! physical transceiver (8b/10b coding, serialization, clock recovery) is an
//! external collaborator that exchanges one [`LinkWord`] per lane per cycle.

// # Tries to deny all lints (`rustc -W help`).
#![deny(absolute_paths_not_starting_with_crate)]
#![deny(anonymous_parameters)]
#![deny(deprecated_in_future)]
#![deny(explicit_outlives_requirements)]
#![deny(keyword_idents)]
#![deny(macro_use_extern_crate)]
#![deny(missing_debug_implementations)]
#![deny(non_ascii_idents)]
#![deny(rust_2018_idioms)]
#![deny(trivial_numeric_casts)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_extern_crates)]
#![deny(unused_import_braces)]
//
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
//
#![allow(clippy::needless_lifetimes)]
#![allow(elided_lifetimes_in_paths)]

pub mod align;
pub mod cgs;
pub mod constants;
pub mod core;
pub mod fifo;
pub mod framer;
pub mod ilas;
pub mod link;
pub mod lmfc;
pub mod prbs;
pub mod scrambler;
pub mod settings;
pub mod transport;
pub mod types;

pub use crate::core::{CoreRx, CoreRxInput, CoreTx, CoreTxInput};
pub use crate::link::{LinkRx, LinkRxInput, LinkTx, LinkTxInput, RxState, TxState};
pub use crate::settings::{
    ChecksumMismatch, ChecksumMode, ConfigError, Field, LinkSettings, RangeError, SettingsError, SettingsValues,
};
pub use crate::types::{FramedWord, LinkWord};

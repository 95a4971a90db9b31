//! Blip/BPS binary delta patches: opcode model, validator, binary codec,
//! applier, diff engine, optimizer and assembler text format.
//!
//! The pipeline is pull-based throughout: [`codec::decode`] wraps a byte
//! reader in [`validate::check_decoded_stream`], [`diff::diff`] and
//! [`optimize::optimize`] both re-validate their own output via
//! [`validate::check_stream`], and [`apply::apply`] consumes whatever
//! `Operation` iterator it is handed without caring which stage produced it.

pub mod apply;
pub mod asm;
pub mod codec;
pub mod crc;
pub mod diff;
pub mod error;
pub mod optimize;
pub mod ops;
pub mod validate;
pub mod varint;

pub use apply::apply as apply_patch;
pub use codec::{decode, encode};
pub use diff::{diff, diff_with, DiffOptions};
pub use error::{CorruptPatch, Error};
pub use ops::Operation;
pub use optimize::optimize;

//! Mesh-block packs and non-blocking halo exchange.
//!
//! A [`MeshBlockPack`] is the opaque batch of uniform 1-D mesh blocks an
//! operator acts on; it carries geometry only and has no scheduling
//! semantics. [`HaloExchange`] is the message plumbing behind the
//! `init_recv` / `send_*` / `recv_*` / `clear_send` task chains: sends
//! are posted eagerly, receives are polled without blocking, and an
//! operator whose messages have not all arrived reports incomplete and
//! is polled again on a later pass.

#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod exchange;
pub mod pack;

pub use exchange::{ExchangeError, Face, HaloExchange, HaloMsg};
pub use pack::{BlockField, FaceField, MeshBlockPack};

#![warn(deprecated_in_future)]
#![warn(future_incompatible)]
#![warn(missing_copy_implementations)]
#![warn(missing_docs)]
#![warn(nonstandard_style)]
#![warn(rust_2018_compatibility)]
#![warn(rust_2018_idioms)]
#![warn(single_use_lifetimes)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused)]

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::redundant_else)]
#![allow(clippy::wildcard_imports)]


//! The dns-transport crate is the part of dogpile that talks to the wire:
//! AF_PACKET sockets, the memory-mapped receive ring, IP and UDP header
//! construction, batched transmission, and the clock and CPU plumbing the
//! packet pipeline is paced and pinned with.
//!
//! Everything here is Linux-specific, and this is the only crate in the
//! workspace allowed to contain `unsafe` code.


mod error;
pub use self::error::Error;

mod headers;
pub use self::headers::HeaderPair;

mod link;
pub use self::link::LinkAddr;

mod ring;
pub use self::ring::RxRing;

mod socket;
pub use self::socket::{ifindex, PacketSocket};

pub mod cpu;
pub mod time;

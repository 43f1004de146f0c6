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
#![allow(clippy::doc_markdown)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::non_ascii_literal)]
#![allow(clippy::redundant_else)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::wildcard_imports)]

#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]
#![deny(unsafe_code)]


//! The DNS crate is the ‘library’ part of dogpile. It deals in query
//! corpora: compiling `(name, type)` pairs into wire-format DNS query
//! messages, loading and saving whole files of them, and upgrading every
//! record in a corpus with an EDNS OPT pseudo-record.


mod strings;
pub use self::strings::Labels;

mod types;
pub use self::types::{TypeError, TypeTable};

mod wire;
pub use self::wire::{build_query, WireError};

mod opt;
pub use self::opt::Opt;

mod queryfile;
pub use self::queryfile::{QueryFile, QueryFileError, QueryRecord};

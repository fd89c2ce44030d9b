//! XML 1.0 character classification and input-encoding support.
//!
//! Everything downstream of this crate works on `&str`: the decoder is the
//! only place in the workspace that sees raw bytes.

pub mod chars;
pub mod encoding;
pub mod error;

pub use chars::{
    is_char, is_name, is_name_char, is_name_start_char, is_nmtoken, is_pubid_char, is_space,
};
pub use encoding::{Encoding, decode, decode_with, sniff};
pub use error::TextError;

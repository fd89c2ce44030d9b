//! Document type declarations and the content models compiled from them.
//!
//! The [`Dtd`] holds everything a `<!DOCTYPE ...>` subset declares:
//! element declarations with their content specs and attribute lists,
//! general and parameter entities, and notations. [`ContentSpec`] trees
//! compile into [`content::ContentState`] machines that the parser feeds
//! one child name at a time.

pub mod content;
pub mod error;
pub mod model;
pub mod normalize;

pub use content::ContentState;
pub use error::DtdError;
pub use model::{
    AttType, AttributeDecl, ContentSpec, DefaultDecl, Dtd, ElementDecl, EntityDecl, NotationDecl,
    Repetition,
};
pub use normalize::{check_fixed, normalize_attribute};

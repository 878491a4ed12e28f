//! Recording ingestion: payload discovery, command typing and assets.

mod assets;
mod command;
mod extractor;

pub use assets::*;
pub use command::*;
pub use extractor::*;

#[cfg(test)]
pub(crate) use extractor::tests::html_with;

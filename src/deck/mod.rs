//! Deck transform core — document model, container codec, export pipeline,
//! CSS scoping, and narration fragments.
//!
//! Everything in this module is a pure transform over slide markup: no I/O,
//! no state, deterministic for fixed inputs. Services compose these pieces
//! into tool execution, persistence, and export endpoints.

pub mod container;
pub mod document;
pub mod export;
pub(crate) mod html;
pub mod narration;
pub mod reveal;
pub mod scope;

pub use container::SlideFormat;
pub use document::{DeckDocument, Page, PageContent};

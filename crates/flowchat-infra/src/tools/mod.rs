//! Data-lookup tools for the gathering loop.
//!
//! Both tools return text, never errors, for anything that happens past
//! argument validation: a backend failure becomes a descriptive result the
//! gathering loop classifies as a soft error and iterates past.

pub mod market;
pub mod reference;

pub use market::MarketDataTool;
pub use reference::ReferenceLookupTool;

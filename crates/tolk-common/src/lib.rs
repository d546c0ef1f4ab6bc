//! Shared building blocks for the Tolk compiler front: source spans.

pub mod span;

pub use span::Span;

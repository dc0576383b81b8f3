//! Change notification for Revtext.
//!
//! Every edit to a live draft is published as a [`ChangeEvent`]. Comparison
//! views subscribe through a [`ChangeNotifier`] and apply what they receive
//! to their match lists.
//!
//! Delivery is synchronous: [`ChangeNotifier::notify`] enqueues on each
//! matching subscriber's unbounded channel before returning, so a caller
//! holding the repository write lock publishes edits in the order it made
//! them.

pub mod error;
pub mod event;
pub mod notifier;

pub use error::{EventError, EventResult};
pub use event::ChangeEvent;
pub use notifier::{drain, ChangeFilter, ChangeNotifier, ChangeStream};

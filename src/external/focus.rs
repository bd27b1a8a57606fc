//! `FocusManager`: the current-focus side channel consumed by the `focus`
//! route and by `ProactiveScheduler` context collection.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::SchedulerError;

/// Consumed interface for reading/writing the assistant's current focus.
#[async_trait]
pub trait FocusManager: Send + Sync {
    /// Replace the current focus text.
    async fn set_focus(&self, text: &str) -> Result<(), SchedulerError>;

    /// The current focus, if any has been set.
    async fn current_focus(&self) -> Option<String>;
}

/// In-process focus manager used by tests and as a default when no richer
/// focus-board implementation is supplied.
#[derive(Default)]
pub struct InMemoryFocusManager {
    focus: Mutex<Option<String>>,
}

impl InMemoryFocusManager {
    /// Build an empty focus manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FocusManager for InMemoryFocusManager {
    async fn set_focus(&self, text: &str) -> Result<(), SchedulerError> {
        *self.focus.lock() = Some(text.to_owned());
        Ok(())
    }

    async fn current_focus(&self) -> Option<String> {
        self.focus.lock().clone()
    }
}

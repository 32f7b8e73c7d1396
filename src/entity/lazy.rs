//! Deferred association cells.
//!
//! A [`Lazy`] field starts out detached. The entity builder either resolves it
//! immediately or parks a loader in it; the first call to [`Lazy::load`] runs
//! the parked loader and caches the outcome for every later access.

use crate::error::DaoResult;
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Re-runnable loader parked in a pending cell.
pub type Loader<T> = Arc<dyn Fn() -> BoxFuture<'static, DaoResult<T>> + Send + Sync>;

/// Single related entity. `Loaded(None)` means the relation has no target.
///
/// The resolved value lives on the heap, so an entity may hold a reference
/// to its own type.
pub type Reference<T> = Lazy<Option<T>>;

/// Related entity collection.
pub type Collection<T> = Lazy<Vec<T>>;

enum State<T> {
    Detached,
    Pending(Loader<T>),
    Loaded(Box<T>),
}

/// Association value that may be resolved on first access.
pub struct Lazy<T> {
    state: State<T>,
    failure: Option<String>,
}

impl<T> Lazy<T> {
    /// A cell with nothing to load.
    pub const fn detached() -> Self {
        Self {
            state: State::Detached,
            failure: None,
        }
    }

    /// A cell holding a value already.
    pub fn loaded(value: T) -> Self {
        Self {
            state: State::Loaded(Box::new(value)),
            failure: None,
        }
    }

    /// The resolved value. Never triggers a load.
    pub fn get(&self) -> Option<&T> {
        match &self.state {
            State::Loaded(value) => Some(value.as_ref()),
            _ => None,
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match &mut self.state {
            State::Loaded(value) => Some(value.as_mut()),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, State::Loaded(_))
    }

    /// True while a loader is parked and has not succeeded yet.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending(_))
    }

    /// Message of the most recent failed load, cleared on success.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Replace whatever the cell holds with a resolved value.
    pub fn set(&mut self, value: T) {
        self.state = State::Loaded(Box::new(value));
        self.failure = None;
    }

    /// Move the resolved value out, leaving the cell detached.
    pub fn take(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.state, State::Detached) {
            State::Loaded(value) => Some(*value),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Resolve the cell if a loader is parked.
    ///
    /// A failed load is logged, remembered in [`Lazy::failure`], and retried
    /// on the next call. Returns the value when the cell is resolved.
    pub async fn load(&mut self) -> Option<&T> {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Deferred association load failed");
            self.failure = Some(e.to_string());
        }
        self.get()
    }

    /// Like [`Lazy::load`], but the load error is returned to the caller.
    pub async fn try_load(&mut self) -> DaoResult<Option<&T>> {
        if let Err(e) = self.refresh().await {
            self.failure = Some(e.to_string());
            return Err(e);
        }
        Ok(self.get())
    }

    pub(crate) fn defer(&mut self, loader: Loader<T>) {
        self.state = State::Pending(loader);
        self.failure = None;
    }

    /// Run `loader` now. On failure the cell is either left pending with the
    /// loader, so a later `load` retries, or detached.
    pub(crate) async fn resolve_now(&mut self, loader: Loader<T>, keep_pending: bool) -> bool {
        match loader().await {
            Ok(value) => {
                self.set(value);
                true
            }
            Err(e) => {
                self.failure = Some(e.to_string());
                self.state = if keep_pending {
                    State::Pending(loader)
                } else {
                    State::Detached
                };
                false
            }
        }
    }

    async fn refresh(&mut self) -> DaoResult<()> {
        let loader = match &self.state {
            State::Pending(loader) => loader.clone(),
            _ => return Ok(()),
        };
        let value = loader().await?;
        self.set(value);
        Ok(())
    }
}

impl<T> Lazy<Option<T>> {
    /// The related entity, when resolved and present.
    pub fn target(&self) -> Option<&T> {
        self.get().and_then(Option::as_ref)
    }
}

impl<T> Lazy<Vec<T>> {
    /// Resolved items, or an empty slice while unresolved.
    pub fn items(&self) -> &[T] {
        self.get().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<T: Clone> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        let state = match &self.state {
            State::Detached => State::Detached,
            State::Pending(loader) => State::Pending(loader.clone()),
            State::Loaded(value) => State::Loaded(value.clone()),
        };
        Self {
            state,
            failure: self.failure.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Detached => "detached",
            State::Pending(_) => "pending",
            State::Loaded(_) => "loaded",
        };
        f.debug_struct("Lazy")
            .field("state", &state)
            .field("value", &self.get())
            .field("failure", &self.failure)
            .finish()
    }
}

/// Cells compare by resolved value only.
impl<T: PartialEq> PartialEq for Lazy<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

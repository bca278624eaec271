//! Internal release bag for scope and host teardown hooks.

use crate::error::DispatchResult;

/// A single teardown hook.
pub(crate) type ReleaseHook = Box<dyn FnOnce() -> DispatchResult<()> + Send>;

/// Container for release hooks with LIFO execution order.
///
/// Every hook runs even when an earlier one fails, so a single bad release
/// cannot leak the resources registered before it. The first failure is
/// reported; later ones are logged.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<ReleaseHook>,
}

impl DisposeBag {
    /// Add a release hook.
    pub(crate) fn push(&mut self, hook: ReleaseHook) {
        self.hooks.push(hook);
    }

    /// Takes every hook out of the bag, leaving it empty.
    ///
    /// Callers run the returned bag after dropping whatever lock guards this
    /// one, so hooks may register further hooks without deadlocking.
    pub(crate) fn take(&mut self) -> DisposeBag {
        DisposeBag { hooks: std::mem::take(&mut self.hooks) }
    }

    /// Execute all hooks in reverse order (LIFO).
    pub(crate) fn run_all_reverse(&mut self) -> DispatchResult<()> {
        let mut first_error = None;
        while let Some(hook) = self.hooks.pop() {
            if let Err(err) = hook() {
                if first_error.is_none() {
                    first_error = Some(err);
                } else {
                    tracing::warn!(error = %err, "additional release hook failed");
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Check if the bag is empty (no hooks registered).
    pub(crate) fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }
}

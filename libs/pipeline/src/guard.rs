use std::sync::Arc;

/// Outcome of testing a [`Transform`](crate::Transform)'s guard against an
/// entity. `Run` invokes the transform; `Skip` forwards the entity to the
/// transform's `next` list without invoking it; `Continue` means "try the
/// next sibling".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardResult {
    Run,
    Skip,
    Continue,
}

/// A boxed predicate over `&T`. In the tagged-variant world this replaces
/// the original's runtime type identification: guards are built as closures
/// matching on a discriminator rather than `dyn Any` downcasts (see
/// crate-level design notes).
pub struct Guard<T>(Arc<dyn Fn(&T) -> GuardResult + Send + Sync>);

impl<T> Clone for Guard<T> {
    fn clone(&self) -> Self {
        Guard(self.0.clone())
    }
}

impl<T> Guard<T> {
    pub fn new(f: impl Fn(&T) -> GuardResult + Send + Sync + 'static) -> Self {
        Guard(Arc::new(f))
    }

    pub fn test(&self, entity: &T) -> GuardResult {
        (self.0)(entity)
    }

    /// Matches any of a predicate set (`TypeGuard<T..>`/`ExactTypeGuard<T..>`
    /// collapse to the same shape here: a closure over the discriminator).
    pub fn matching(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Guard::new(move |e| {
            if predicate(e) {
                GuardResult::Run
            } else {
                GuardResult::Continue
            }
        })
    }

    /// Always forwards without invoking — used for the pipeline's sentinel
    /// start transform and for pass-through stages.
    pub fn always_skip() -> Self {
        Guard::new(|_| GuardResult::Skip)
    }

    /// `LambdaGuard(predicate, base)`: runs only if both `self` (the base
    /// match) and `predicate` hold.
    pub fn and(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self
    where
        T: 'static,
    {
        Guard::new(move |e| match self.test(e) {
            GuardResult::Run if predicate(e) => GuardResult::Run,
            GuardResult::Run => GuardResult::Continue,
            other => other,
        })
    }

    /// `guard || other`: chains an alternative action when the primary does
    /// not match (`Continue`).
    pub fn or(self, other: Guard<T>) -> Self
    where
        T: 'static,
    {
        Guard::new(move |e| match self.test(e) {
            GuardResult::Continue => other.test(e),
            result => result,
        })
    }
}

impl<T: 'static> std::ops::BitOr for Guard<T> {
    type Output = Guard<T>;

    fn bitor(self, rhs: Guard<T>) -> Guard<T> {
        self.or(rhs)
    }
}

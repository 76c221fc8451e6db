/// Hook called by a solver after each trial evaluation.
///
/// Returning `Some(action)` asks the solver to act (for example to stop);
/// `None` lets it continue. Closures `FnMut(&E) -> Option<A>` are observers,
/// and `()` is the observer that never intervenes.
pub trait Observer<E, A> {
    fn observe(&mut self, event: &E) -> Option<A>;
}

impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}

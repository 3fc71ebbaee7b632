//! Undo stack for multi-step resource acquisition.
//!
//! Each acquired resource pushes the action that releases it. If a later
//! step fails, [`Rollback::unwind`] runs the actions newest-first against the
//! partially built state; on success [`Rollback::commit`] discards them.
//! Nothing happens on drop: the caller decides explicitly.

type UndoAction<'a, T> = Box<dyn FnOnce(&mut T) + 'a>;

pub(crate) struct Rollback<'a, T> {
    actions: Vec<UndoAction<'a, T>>,
}

impl<'a, T> Rollback<'a, T> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Record how to release the resource just acquired.
    pub fn push(&mut self, action: impl FnOnce(&mut T) + 'a) {
        self.actions.push(Box::new(action));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Keep everything acquired so far.
    pub fn commit(mut self) {
        self.actions.clear();
    }

    /// Release everything acquired so far, newest first.
    pub fn unwind(mut self, state: &mut T) {
        while let Some(action) = self.actions.pop() {
            action(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwind_runs_in_reverse() {
        let mut log = Vec::new();
        let mut rollback = Rollback::new();
        rollback.push(|log: &mut Vec<&str>| log.push("window"));
        rollback.push(|log: &mut Vec<&str>| log.push("device"));
        rollback.push(|log: &mut Vec<&str>| log.push("surface"));
        assert_eq!(rollback.len(), 3);

        rollback.unwind(&mut log);
        assert_eq!(log, vec!["surface", "device", "window"]);
    }

    #[test]
    fn commit_discards_actions() {
        let ran = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag = ran.clone();
        let mut rollback: Rollback<()> = Rollback::new();
        rollback.push(move |_| flag.set(true));
        rollback.commit();
        assert!(!ran.get());
    }

    #[test]
    fn empty_unwind_is_noop() {
        let mut count = 0u32;
        Rollback::<u32>::new().unwind(&mut count);
        assert_eq!(count, 0);
    }
}

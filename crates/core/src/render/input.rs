//! Pointer listeners registered by modes.

use std::{cell::RefCell, fmt, rc::Rc};

use glam::Vec2;

/// Pointer input forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Vec2),
    Move(Vec2),
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type PointerListener = Box<dyn FnMut(&PointerEvent)>;

/// Listener table shared between the renderer and the active mode.
pub type SharedInput = Rc<RefCell<InputRegistry>>;

#[derive(Default)]
pub struct InputRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, PointerListener)>,
}

impl InputRegistry {
    pub fn shared() -> SharedInput {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn add(&mut self, listener: PointerListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, listener));
        id
    }

    /// Returns whether `id` was registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn dispatch(&mut self, event: &PointerEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }
}

impl fmt::Debug for InputRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_until_removed() {
        let input = InputRegistry::shared();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = input
            .borrow_mut()
            .add(Box::new(move |event| sink.borrow_mut().push(*event)));

        input.borrow_mut().dispatch(&PointerEvent::Down(Vec2::ONE));
        assert!(input.borrow_mut().remove(id));
        assert!(!input.borrow_mut().remove(id));
        input.borrow_mut().dispatch(&PointerEvent::Up);

        assert_eq!(*seen.borrow(), vec![PointerEvent::Down(Vec2::ONE)]);
        assert!(input.borrow().is_empty());
    }
}

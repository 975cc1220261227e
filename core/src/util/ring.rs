use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Bounded FIFO shared between one producer and any number of readers.
/// Once `cap` entries are held, every push evicts the oldest one.
#[derive(Debug)]
pub struct Ring<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
    cap: usize,
}

impl<T> Clone for Ring<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            cap: self.cap,
        }
    }
}

impl<T: Clone> Ring<T> {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(cap.min(1024)))),
            cap,
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<T>> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, item: T) {
        let mut g = self.guard();
        let overflow = (g.len() + 1).saturating_sub(self.cap);
        if overflow > 0 {
            g.drain(..overflow);
        }
        g.push_back(item);
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn last(&self) -> Option<T> {
        self.guard().back().cloned()
    }

    pub fn snapshot(&self) -> Vec<T> {
        let g = self.guard();
        let mut vec = Vec::with_capacity(g.len());
        vec.extend(g.iter().cloned());
        vec
    }

    /// Run `f` against the current contents without copying them out.
    pub fn with<R>(&self, f: impl FnOnce(&VecDeque<T>) -> R) -> R {
        let g = self.guard();
        f(&g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let ring = Ring::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.snapshot(), vec![2, 3, 4]);
        assert_eq!(ring.last(), Some(4));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn clones_share_storage() {
        let ring = Ring::new(4);
        let reader = ring.clone();
        ring.push("a".to_string());
        assert_eq!(reader.snapshot(), vec!["a".to_string()]);
        assert_eq!(reader.capacity(), 4);
    }
}

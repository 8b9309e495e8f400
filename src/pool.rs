//! Object pools for render contexts and other frequently recycled buffers.
//!
//! A caller is responsible for pairing every [`Pool::acquire`] with a [`Pool::release`] on every
//! exit path, success or error alike. Released objects are [`Resettable::reset`] (state cleared,
//! capacity retained) before returning to the free list.

use std::sync::Mutex;

/// A fan-in/fan-out free list. Contention is low in practice (pools are only touched at render
/// frame boundaries), so a plain mutex is used rather than a dedicated lock-free queue.
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Default> Pool<T> {
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take an item from the pool, or construct a fresh `T::default()` if the pool is empty.
    #[must_use]
    pub fn acquire(&self) -> T {
        self.free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_default()
    }

    /// Return an item to the pool after resetting its mutable state.
    pub fn release(&self, mut item: T)
    where
        T: Resettable,
    {
        item.reset();
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.max_idle {
            free.push(item);
        }
    }

    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Implemented by pooled types: clears logical contents but keeps backing allocations.
pub trait Resettable {
    fn reset(&mut self);
}

impl Resettable for String {
    #[inline(always)]
    fn reset(&mut self) {
        self.clear();
    }
}

impl<T> Resettable for Vec<T> {
    #[inline(always)]
    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_reuses_released_buffers() {
        let pool: Pool<String> = Pool::new(4);
        let mut s = pool.acquire();
        s.push_str("hello");
        let cap = s.capacity();
        pool.release(s);

        let s2 = pool.acquire();
        assert!(s2.is_empty());
        assert!(s2.capacity() >= cap || cap == 0);
    }

    #[test]
    fn idle_list_is_bounded() {
        let pool: Pool<String> = Pool::new(1);
        pool.release(String::from("a"));
        pool.release(String::from("b"));
        assert_eq!(pool.idle_len(), 1);
    }
}

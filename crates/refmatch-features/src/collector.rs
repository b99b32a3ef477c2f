//! Fixed-capacity candidate collection.

/// Append-only buffer capped at a fixed capacity.
///
/// Items pushed after the buffer is full are dropped but still counted, so
/// callers can tell how many candidates were produced before truncation.
/// Producers must push in a fixed order (raster order for keypoints) for
/// truncation to be reproducible.
#[derive(Clone, Debug)]
pub struct CandidateBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    seen: usize,
}

impl<T> CandidateBuffer<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(4096)),
            capacity,
            seen: 0,
        }
    }

    /// Returns `false` when the item was dropped.
    #[inline]
    pub fn push(&mut self, item: T) -> bool {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.seen = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of push attempts, including dropped items.
    #[inline]
    pub fn seen(&self) -> usize {
        self.seen
    }

    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.seen > self.items.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

use std::collections::VecDeque;

use super::{Job, PoolError, TASK_ALIGN};

struct Entry<J> {
    offset: usize,
    size: usize,
    job: J,
}

/// FIFO ring buffer with a fixed byte budget.
///
/// Every entry occupies a contiguous `[offset, offset + footprint)` range of the ring. When the
/// tail cannot fit the next entry, the entry is placed at the start of the ring and the unused
/// tail gap is skipped until the head passes it. The entry table is allocated once, sized for the
/// smallest possible footprint, so pushing never reallocates.
pub struct TaskQueue<J> {
    entries: VecDeque<Entry<J>>,
    capacity: usize,
    max_task_size: usize,
    head: usize,
    tail: usize,
    end: usize,
    used: usize,
}

impl<J: Job> TaskQueue<J> {
    pub fn new(capacity: usize, max_task_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity / TASK_ALIGN),
            capacity,
            max_task_size,
            head: 0,
            tail: 0,
            end: capacity,
            used: 0,
        }
    }

    /// Appends `job`, failing with `CapacityExceeded` when its footprint does not fit.
    ///
    /// The declared footprint is rounded up to a non-zero multiple of [`TASK_ALIGN`]. A failed
    /// push leaves the queue untouched.
    pub fn push(&mut self, job: J) -> Result<(), PoolError> {
        let size = job.footprint().max(1).next_multiple_of(TASK_ALIGN);
        if size > self.max_task_size {
            return Err(PoolError::TaskTooLarge {
                size,
                limit: self.max_task_size,
            });
        }

        let offset = self.reserve(size)?;
        self.entries.push_back(Entry { offset, size, job });
        Ok(())
    }

    /// Footprint of the oldest entry.
    pub fn peek_size(&self) -> Option<usize> {
        self.entries.front().map(|e| e.size)
    }

    /// Removes the oldest entry. `size` must match [`TaskQueue::peek_size`].
    pub fn pop(&mut self, size: usize) -> Result<J, PoolError> {
        match self.entries.front() {
            None => return Err(PoolError::Empty),
            Some(head) if head.size != size => {
                return Err(PoolError::SizeMismatch {
                    expected: head.size,
                    requested: size,
                });
            }
            Some(_) => {}
        }

        let Some(entry) = self.entries.pop_front() else {
            return Err(PoolError::Empty);
        };

        self.head = entry.offset + entry.size;
        self.used -= entry.size;

        if self.head == self.end {
            self.head = 0;
            self.end = self.capacity;
        }
        if self.used == 0 {
            self.reset();
        }

        Ok(entry.job)
    }

    /// Drops every queued entry without running it and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        self.reset();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently reserved by queued entries.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn reserve(&mut self, size: usize) -> Result<usize, PoolError> {
        let full = PoolError::CapacityExceeded {
            needed: size,
            free: self.capacity - self.used,
        };

        if self.used == 0 {
            self.reset();
        }

        let wrapped = self.tail < self.head || (self.tail == self.head && self.used > 0);

        let offset = if wrapped {
            if self.head - self.tail < size {
                return Err(full);
            }
            self.tail
        } else if self.capacity - self.tail >= size {
            self.tail
        } else if self.head >= size {
            self.end = self.tail;
            0
        } else {
            return Err(full);
        };

        self.tail = offset + size;
        if self.tail == self.capacity {
            self.tail = 0;
        }
        self.used += size;

        Ok(offset)
    }

    fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.end = self.capacity;
        self.used = 0;
    }
}

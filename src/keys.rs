/// Monotonic primary-key allocator for one persistence table. The starting
/// value comes from the out-of-scope sequence service; within a batch each
/// emitted row takes exactly one key and keys are never reused.
#[derive(Debug, Clone)]
pub struct KeyAllocator {
    next: u64,
}

impl KeyAllocator {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn next(&mut self) -> u64 {
        let key = self.next;
        self.next += 1;
        key
    }

    /// The next key that would be handed out, without consuming it.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// The full set of allocators a batch run needs, one per output table.
#[derive(Debug, Clone)]
pub struct BatchKeys {
    pub experiments: KeyAllocator,
    pub samples: KeyAllocator,
    pub key_values: KeyAllocator,
}

impl BatchKeys {
    pub fn starting_at(experiment: u64, sample: u64, key_value: u64) -> Self {
        Self {
            experiments: KeyAllocator::starting_at(experiment),
            samples: KeyAllocator::starting_at(sample),
            key_values: KeyAllocator::starting_at(key_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_monotonic_and_unique() {
        let mut alloc = KeyAllocator::starting_at(100);
        assert_eq!(alloc.next(), 100);
        assert_eq!(alloc.next(), 101);
        assert_eq!(alloc.peek(), 102);
        assert_eq!(alloc.next(), 102);
    }
}

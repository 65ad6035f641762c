//! Per-call arena for intermediate values.
//!
//! Values are addressed by index; every handle also records the generation it
//! was issued in, and `clear` bumps the generation, so a handle that outlives
//! its evaluation call is caught on first use instead of silently reading a
//! newer value.

use teval_core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StashHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
pub struct Stash {
    values: Vec<Value>,
    generation: u32,
}

impl Stash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `value` into the arena. Its cell buffer is not copied.
    pub fn alloc(&mut self, value: Value) -> StashHandle {
        let index = u32::try_from(self.values.len()).expect("stash exceeds u32::MAX values");
        self.values.push(value);
        StashHandle {
            index,
            generation: self.generation,
        }
    }

    pub fn is_live(&self, h: StashHandle) -> bool {
        h.generation == self.generation && (h.index as usize) < self.values.len()
    }

    pub fn get(&self, h: StashHandle) -> &Value {
        self.check(h);
        &self.values[h.index as usize]
    }

    pub fn get_mut(&mut self, h: StashHandle) -> &mut Value {
        self.check(h);
        &mut self.values[h.index as usize]
    }

    /// Drop every value and invalidate all outstanding handles. The arena's
    /// own capacity is kept for the next call.
    pub fn clear(&mut self) {
        self.values.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn check(&self, h: StashHandle) {
        assert!(
            self.is_live(h),
            "stale stash handle {}@{} (stash is at generation {} with {} values)",
            h.index,
            h.generation,
            self.generation,
            self.values.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_moves_buffer_without_copying() {
        let mut stash = Stash::new();
        let v = Value::double(4.0);
        let ptr = v.cells().as_ptr();
        let h = stash.alloc(v);
        assert_eq!(stash.get(h).cells().as_ptr(), ptr);
        assert_eq!(stash.get(h).as_double(), 4.0);
    }

    #[test]
    fn clear_keeps_capacity_and_bumps_generation() {
        let mut stash = Stash::new();
        for i in 0..8 {
            stash.alloc(Value::double(i as f64));
        }
        let cap = stash.capacity();
        let gen = stash.generation();
        stash.clear();
        assert!(stash.is_empty());
        assert_eq!(stash.capacity(), cap);
        assert_eq!(stash.generation(), gen + 1);
    }

    #[test]
    fn handles_do_not_survive_clear() {
        let mut stash = Stash::new();
        let h = stash.alloc(Value::double(1.0));
        assert!(stash.is_live(h));
        stash.clear();
        stash.alloc(Value::double(2.0));
        assert!(!stash.is_live(h));
    }

    #[test]
    #[should_panic(expected = "stale stash handle")]
    fn stale_handle_panics() {
        let mut stash = Stash::new();
        let h = stash.alloc(Value::double(1.0));
        stash.clear();
        stash.alloc(Value::double(2.0));
        let _ = stash.get(h);
    }
}

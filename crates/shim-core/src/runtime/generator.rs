// Generator delegation
//
// A generator is driven by the host one step at a time through `resume`.
// Each step hands out a key and a shared slot: a by-reference consumer writes
// through the slot and the producing generator observes the write on its next
// step.

use std::cell::RefCell;
use std::rc::Rc;

use super::value::Value;

pub type Slot = Rc<RefCell<Value>>;

pub fn slot(value: Value) -> Slot {
    Rc::new(RefCell::new(value))
}

#[derive(Debug, Clone)]
pub struct Yielded {
    pub key: Value,
    pub slot: Slot,
}

impl Yielded {
    pub fn new(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            slot: slot(value.into()),
        }
    }

    pub fn value(&self) -> Value {
        self.slot.borrow().clone()
    }
}

pub trait HostGenerator {
    /// Advance to the next element; `None` once exhausted
    fn resume(&mut self) -> Option<Yielded>;
}

/// Yields a fixed list of values keyed 0, 1, 2, ...
#[derive(Debug)]
pub struct IterGenerator {
    items: std::vec::IntoIter<Value>,
    next_key: i64,
}

impl IterGenerator {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: items.into_iter(),
            next_key: 0,
        }
    }
}

impl HostGenerator for IterGenerator {
    fn resume(&mut self) -> Option<Yielded> {
        let value = self.items.next()?;
        let key = self.next_key;
        self.next_key += 1;
        Some(Yielded::new(key, value))
    }
}

/// Generator driven by a closure
pub struct FnGenerator<F> {
    step: F,
}

impl<F> HostGenerator for FnGenerator<F>
where
    F: FnMut() -> Option<Yielded>,
{
    fn resume(&mut self) -> Option<Yielded> {
        (self.step)()
    }
}

pub fn from_fn<F>(step: F) -> FnGenerator<F>
where
    F: FnMut() -> Option<Yielded>,
{
    FnGenerator { step }
}

/// Detaches every yielded slot so consumer writes never reach the producer.
/// Applied when the intercepted declaration yields by value.
pub struct ByValue {
    inner: Box<dyn HostGenerator>,
}

impl ByValue {
    pub fn new(inner: Box<dyn HostGenerator>) -> Self {
        Self { inner }
    }
}

impl HostGenerator for ByValue {
    fn resume(&mut self) -> Option<Yielded> {
        let yielded = self.inner.resume()?;
        let copy = yielded.value();
        Some(Yielded {
            key: yielded.key,
            slot: slot(copy),
        })
    }
}

/// Drain a generator by value
pub fn collect_values(generator: &mut dyn HostGenerator) -> Vec<Value> {
    std::iter::from_fn(|| generator.resume())
        .map(|y| y.value())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts from 1 to `limit`, reading the shared slot back on each step
    fn counter(limit: i64) -> impl HostGenerator {
        let current = slot(Value::Integer(0));
        let mut key = 0;
        from_fn(move || {
            let next = current.borrow().as_int().unwrap_or(0) + 1;
            if next > limit {
                return None;
            }
            *current.borrow_mut() = Value::Integer(next);
            key += 1;
            Some(Yielded {
                key: Value::Integer(key - 1),
                slot: Rc::clone(&current),
            })
        })
    }

    /// Iterate by reference, bumping each element
    fn drain_incrementing(generator: &mut dyn HostGenerator) -> Vec<Value> {
        let mut seen = Vec::new();
        while let Some(yielded) = generator.resume() {
            seen.push(yielded.value());
            let bumped = yielded.value().as_int().unwrap_or(0) + 1;
            *yielded.slot.borrow_mut() = Value::Integer(bumped);
        }
        seen
    }

    #[test]
    fn test_reference_iteration_writes_back() {
        let seen = drain_incrementing(&mut counter(10));
        let expected: Vec<Value> = [1i64, 3, 5, 7, 9].into_iter().map(Value::from).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_by_value_detaches_slots() {
        let mut generator = ByValue::new(Box::new(counter(10)));
        let seen = drain_incrementing(&mut generator);
        let expected: Vec<Value> = (1..=10i64).map(Value::from).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_iter_generator_keys() {
        let mut generator = IterGenerator::new(vec![Value::from("a"), Value::from("b")]);
        let first = generator.resume().expect("first");
        assert_eq!(first.key, Value::Integer(0));
        let second = generator.resume().expect("second");
        assert_eq!(second.key, Value::Integer(1));
        assert!(generator.resume().is_none());
        assert!(collect_values(&mut IterGenerator::new(vec![])).is_empty());
    }
}

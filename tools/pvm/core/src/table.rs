//! One-based sequence helpers behind `add`, `del`, `deli`, `count`, `foreach`
//! and `all`. Generic over the script engine's value type.

use alloc::vec::Vec;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sequence<T> {
    items: Vec<T>,
}

impl<T> From<Vec<T>> for Sequence<T> {
    fn from(items: Vec<T>) -> Self {
        Sequence { items }
    }
}

impl<T: Clone + PartialEq> Sequence<T> {
    pub fn new() -> Self {
        Sequence { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// 1-based lookup.
    pub fn get(&self, i: usize) -> Option<&T> {
        i.checked_sub(1).and_then(|i| self.items.get(i))
    }

    /// Appends, or inserts at 1-based `index` (clamped to `1..=len+1`).
    /// Returns the value's new 1-based index.
    pub fn add(&mut self, value: T, index: Option<usize>) -> usize {
        let at = match index {
            Some(i) => i.clamp(1, self.items.len() + 1) - 1,
            None => self.items.len(),
        };
        self.items.insert(at, value);
        at + 1
    }

    /// Removes the first element equal to `value`.
    pub fn del(&mut self, value: &T) -> Option<T> {
        let at = self.items.iter().position(|v| v == value)?;
        Some(self.items.remove(at))
    }

    /// Removes by 1-based index, or the last element.
    pub fn deli(&mut self, index: Option<usize>) -> Option<T> {
        match index {
            None => self.items.pop(),
            Some(i) if (1..=self.items.len()).contains(&i) => Some(self.items.remove(i - 1)),
            Some(_) => None,
        }
    }

    /// Length, or the number of elements equal to `value`.
    pub fn count(&self, value: Option<&T>) -> usize {
        match value {
            None => self.items.len(),
            Some(value) => self.items.iter().filter(|&v| v == value).count(),
        }
    }

    pub fn all(&self) -> AllCursor {
        AllCursor { next: 0, len: self.items.len() }
    }

    /// Calls `f` for each element; `f` may remove elements as it goes.
    pub fn foreach(&mut self, mut f: impl FnMut(&mut Self, T)) {
        let mut cursor = self.all();
        while let Some(v) = cursor.next(self).cloned() {
            f(self, v);
        }
    }
}

/// Iteration position that survives removal of the current element.
#[derive(Copy, Clone, Debug)]
pub struct AllCursor {
    next: usize,
    len: usize,
}

impl AllCursor {
    pub fn next<'s, T>(&mut self, seq: &'s Sequence<T>) -> Option<&'s T> {
        let len = seq.items.len();
        if len < self.len {
            self.next = self.next.saturating_sub(self.len - len);
        }
        let item = seq.items.get(self.next)?;
        self.next += 1;
        self.len = len;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn add_and_insert() {
        let mut s = Sequence::new();
        assert_eq!(s.add(10, None), 1);
        assert_eq!(s.add(30, None), 2);
        assert_eq!(s.add(20, Some(2)), 2);
        assert_eq!(s.add(5, Some(0)), 1);
        assert_eq!(s.as_slice(), &[5, 10, 20, 30]);
        assert_eq!(s.get(1), Some(&5));
        assert_eq!(s.get(0), None);
    }

    #[test]
    fn delete_by_value_and_index() {
        let mut s = Sequence::from(vec![1, 2, 3, 2]);
        assert_eq!(s.del(&2), Some(2));
        assert_eq!(s.as_slice(), &[1, 3, 2]);
        assert_eq!(s.del(&9), None);
        assert_eq!(s.deli(Some(1)), Some(1));
        assert_eq!(s.deli(None), Some(2));
        assert_eq!(s.deli(Some(5)), None);
        assert_eq!(s.as_slice(), &[3]);
    }

    #[test]
    fn count_values() {
        let s = Sequence::from(vec![1, 2, 2, 3]);
        assert_eq!(s.count(None), 4);
        assert_eq!(s.count(Some(&2)), 2);
    }

    #[test]
    fn all_tolerates_deleting_current() {
        let mut s = Sequence::from(vec![1, 2, 3, 4]);
        let mut seen = vec![];
        let mut cursor = s.all();
        while let Some(&v) = cursor.next(&s) {
            seen.push(v);
            if v % 2 == 0 {
                s.del(&v);
            }
        }
        assert_eq!(seen, [1, 2, 3, 4]);
        assert_eq!(s.as_slice(), &[1, 3]);
    }

    #[test]
    fn foreach_can_remove() {
        let mut s = Sequence::from(vec![1, 2, 3]);
        let mut sum = 0;
        s.foreach(|seq, v| {
            sum += v;
            seq.del(&v);
        });
        assert_eq!(sum, 6);
        assert!(s.is_empty());
    }
}

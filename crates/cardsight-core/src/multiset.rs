use std::collections::HashMap;
use std::hash::Hash;

/// Counted bag of values. Iteration order is the order of first insertion.
#[derive(Debug, Clone)]
pub struct Multiset<T: Eq + Hash + Clone> {
    counts: HashMap<T, usize>,
    order: Vec<T>,
}

impl<T: Eq + Hash + Clone> Multiset<T> {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) {
        let count = self.counts.entry(value.clone()).or_insert(0);
        if *count == 0 {
            self.order.push(value);
        }
        *count += 1;
    }

    pub fn count(&self, value: &T) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occurrences in `self` not matched by an occurrence in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Self::new();
        for value in &self.order {
            let extra = self.count(value).saturating_sub(other.count(value));
            for _ in 0..extra {
                out.insert(value.clone());
            }
        }
        out
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = Self::new();
        for value in &self.order {
            let shared = self.count(value).min(other.count(value));
            for _ in 0..shared {
                out.insert(value.clone());
            }
        }
        out
    }

    /// Every occurrence, grouped by value in first-insertion order.
    pub fn to_vec(&self) -> Vec<T> {
        self.order
            .iter()
            .flat_map(|value| std::iter::repeat(value.clone()).take(self.count(value)))
            .collect()
    }
}

impl<T: Eq + Hash + Clone> Default for Multiset<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for Multiset<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

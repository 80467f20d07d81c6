/// Ordered open sessions with one "current" slot.
///
/// The index is `None` only when nothing is selected. Switching never
/// reorders the entries; removing the current entry re-seats the index on
/// the nearest valid lower position.
#[derive(Debug)]
pub struct Connections<T> {
    entries: Vec<T>,
    index: Option<usize>,
}

impl<T> Default for Connections<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: None,
        }
    }
}

impl<T: PartialEq> Connections<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn current(&self) -> Option<&T> {
        self.index.and_then(|i| self.entries.get(i))
    }

    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.index.and_then(|i| self.entries.get_mut(i))
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    pub fn add(&mut self, entry: T) {
        self.entries.push(entry);
    }

    /// Selects `entry`, appending it first if it is not registered yet.
    pub fn set_current(&mut self, entry: T) {
        let position = match self.entries.iter().position(|e| *e == entry) {
            Some(position) => position,
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        self.index = Some(position);
    }

    /// Returns false and changes nothing when `index` is out of range.
    pub fn set_index(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.index = Some(index);
            true
        } else {
            false
        }
    }

    /// Removes and returns the current entry.
    pub fn remove_current(&mut self) -> Option<T> {
        let index = self.index?;
        let removed = self.entries.remove(index);
        self.index = match self.entries.len() {
            0 => None,
            len if index >= len => Some(len - 1),
            _ => Some(index),
        };
        Some(removed)
    }
}

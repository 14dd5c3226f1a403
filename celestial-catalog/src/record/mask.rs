//! Boolean row selection. `true` means keep.

use std::ops::Index;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(Vec<bool>);

impl Mask {
    /// A mask keeping all `len` rows.
    pub fn all(len: usize) -> Self {
        Self(vec![true; len])
    }

    /// A mask keeping no rows.
    pub fn none(len: usize) -> Self {
        Self(vec![false; len])
    }

    pub fn from_fn(len: usize, f: impl FnMut(usize) -> bool) -> Self {
        Self((0..len).map(f).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> bool {
        self.0[i]
    }

    pub fn set(&mut self, i: usize, keep: bool) {
        self.0[i] = keep;
    }

    /// Narrows this mask: a row stays selected only if `other` keeps it too.
    ///
    /// # Panics
    /// If the masks have different lengths.
    pub fn and_assign(&mut self, other: &Mask) {
        assert_eq!(self.len(), other.len(), "mask length mismatch");
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a = *a && *b;
        }
    }

    /// Narrows this mask with a per-row test, evaluated only for rows still selected.
    pub fn retain(&mut self, mut keep: impl FnMut(usize) -> bool) {
        for (i, selected) in self.0.iter_mut().enumerate() {
            if *selected && !keep(i) {
                *selected = false;
            }
        }
    }

    pub fn count_selected(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<bool> {
        self.0
    }

    /// `true` if every row selected here is also selected in `other`.
    pub fn is_subset_of(&self, other: &Mask) -> bool {
        self.len() == other.len() && self.0.iter().zip(&other.0).all(|(a, b)| !*a || *b)
    }
}

impl From<Vec<bool>> for Mask {
    fn from(v: Vec<bool>) -> Self {
        Self(v)
    }
}

impl Index<usize> for Mask {
    type Output = bool;

    fn index(&self, i: usize) -> &bool {
        &self.0[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_assign_only_narrows() {
        let mut m = Mask::from(vec![true, true, false, true]);
        m.and_assign(&Mask::from(vec![true, false, true, true]));
        assert_eq!(m.as_slice(), &[true, false, false, true]);
    }

    #[test]
    fn test_retain_skips_deselected_rows() {
        let mut m = Mask::from(vec![true, false, true]);
        let mut seen = Vec::new();
        m.retain(|i| {
            seen.push(i);
            i != 2
        });
        assert_eq!(seen, vec![0, 2]);
        assert_eq!(m.selected_indices(), vec![0]);
    }

    #[test]
    fn test_subset() {
        let a = Mask::from(vec![true, false]);
        let b = Mask::from(vec![true, true]);
        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
    }
}

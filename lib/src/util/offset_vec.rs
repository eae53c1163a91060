use std::fmt::{Debug, Error, Formatter};
use std::iter::FromIterator;
use std::slice::{Iter, IterMut};

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// The constant pool is the motivating case: indexing starts at 1 and `long`/`double` entries
/// occupy two slots, the second of which is unusable.
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,

    /// Offset for the first element (usually 0, but 1 for constant pools)
    initial_offset: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        Self::new_starting_at(Offset(0))
    }

    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
            initial_offset,
        }
    }

    /// Number of entries (not the same as the offset length)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset at which the next pushed element will land
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back, returning its offset
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));
        offset
    }

    /// Get an entry by its offset
    ///
    /// Offsets that fall in the middle of a wide entry are rejected. This uses binary search.
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|found| &self.entries[found].1)
    }

    /// Iterate over entries along with their offsets
    pub fn iter(&self) -> impl Iterator<Item = (Offset, &T)> + '_ {
        self.entries.iter().map(|(off, elem)| (*off, elem))
    }

    /// Iterate over entries without offsets
    pub fn values(&self) -> Values<'_, T> {
        Values(self.entries.iter())
    }

    /// Iterate mutably over entries without offsets
    ///
    /// Callers must not change the width of an entry, since that would shift every later offset.
    pub(crate) fn values_mut(&mut self) -> ValuesMut<'_, T> {
        ValuesMut(self.entries.iter_mut())
    }
}

pub struct Values<'a, T>(Iter<'a, (Offset, T)>);

impl<'a, T> Iterator for Values<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        self.0.next().map(|(_, elem)| elem)
    }
}

pub(crate) struct ValuesMut<'a, T>(IterMut<'a, (Offset, T)>);

impl<'a, T> Iterator for ValuesMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<&'a mut T> {
        self.0.next().map(|(_, elem)| elem)
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.initial_offset == other.initial_offset && self.entries == other.entries
    }
}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        for elem in elems {
            offset_vec.push(elem);
        }
        offset_vec
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Slot {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::Narrow(_) => 1,
                Slot::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn wide_entries_skip_a_slot() {
        let mut slots = OffsetVec::new_starting_at(Offset(1));
        assert_eq!(slots.push(Slot::Narrow(1)), Offset(1));
        assert_eq!(slots.push(Slot::Wide(2)), Offset(2));
        assert_eq!(slots.push(Slot::Narrow(3)), Offset(4));
        assert_eq!(slots.offset_len(), Offset(5));
        assert_eq!(slots.len(), 3);

        assert_eq!(slots.get_offset(Offset(2)), Some(&Slot::Wide(2)));
        assert_eq!(slots.get_offset(Offset(3)), None);
        assert_eq!(slots.get_offset(Offset(4)), Some(&Slot::Narrow(3)));
        assert_eq!(slots.get_offset(Offset(0)), None);
        assert_eq!(slots.get_offset(Offset(9)), None);
    }

    #[test]
    fn mutation_keeps_offsets() {
        let mut slots: OffsetVec<Slot> = vec![Slot::Wide(1), Slot::Narrow(2)].into_iter().collect();
        for slot in slots.values_mut() {
            if let Slot::Narrow(n) = slot {
                *n += 10;
            }
        }
        assert_eq!(
            slots.iter().collect::<Vec<_>>(),
            vec![(Offset(0), &Slot::Wide(1)), (Offset(2), &Slot::Narrow(12))]
        );
    }
}

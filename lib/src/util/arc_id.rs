use std::fmt::{Debug, Error, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Wrapper type whose "identity" for equality and hashing is determined from the shared
/// allocation (ie. the pointer) and not from the underlying data.
///
/// Class handles are trait objects behind an [`Arc`], so comparing them structurally is not an
/// option. Only the data address is compared, never the vtable.
pub struct ArcId<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> ArcId<T> {
    fn address(&self) -> *const u8 {
        Arc::as_ptr(&self.0) as *const u8
    }
}

impl<T: ?Sized> Clone for ArcId<T> {
    fn clone(&self) -> Self {
        ArcId(self.0.clone())
    }
}

impl<T: ?Sized> Hash for ArcId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.address(), state)
    }
}

impl<T: ?Sized> PartialEq for ArcId<T> {
    fn eq(&self, other: &ArcId<T>) -> bool {
        std::ptr::eq(self.address(), other.address())
    }
}

impl<T: ?Sized> Eq for ArcId<T> {}

impl<T: ?Sized> Deref for ArcId<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

impl<T: ?Sized + Debug> Debug for ArcId<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_not_contents() {
        let a: Arc<str> = Arc::from("java/lang/Object");
        let b: Arc<str> = Arc::from("java/lang/Object");

        let mut seen = HashSet::new();
        assert!(seen.insert(ArcId(a.clone())));
        assert!(seen.insert(ArcId(b)));
        assert!(!seen.insert(ArcId(a)));
        assert_eq!(seen.len(), 2);
    }
}

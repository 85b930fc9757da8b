//! Typed resource handles
//!
//! A [`Handle`] is either a slot index into one specific [`Registry`] or the
//! invalid sentinel. The kind parameter keeps buffer handles from being used as
//! texture handles; it carries no data.
//!
//! [`Registry`]: crate::registry::Registry

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Names the resource family a handle belongs to
pub trait HandleKind: 'static {
    /// Human readable name used in errors and logs
    const NAME: &'static str;
}

/// Opaque identifier of a slot in a registry
pub struct Handle<K> {
    index: Option<u32>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Handle<K> {
    /// The sentinel that never refers to a live resource
    pub const INVALID: Self = Self {
        index: None,
        _kind: PhantomData,
    };

    pub(crate) const fn from_index(index: u32) -> Self {
        Self {
            index: Some(index),
            _kind: PhantomData,
        }
    }

    /// Slot index, or `None` for the invalid sentinel
    pub const fn index(&self) -> Option<u32> {
        self.index
    }

    pub const fn is_invalid(&self) -> bool {
        self.index.is_none()
    }
}

impl<K> Default for Handle<K> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}#{}", K::NAME, index),
            None => write!(f, "{}#invalid", K::NAME),
        }
    }
}

impl<K: HandleKind> fmt::Display for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Mesh {}
    impl HandleKind for Mesh {
        const NAME: &'static str = "mesh";
    }

    #[test]
    fn test_default_is_invalid() {
        let handle: Handle<Mesh> = Handle::default();
        assert!(handle.is_invalid());
        assert_eq!(handle, Handle::INVALID);
        assert_eq!(handle.index(), None);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format!("{:?}", Handle::<Mesh>::from_index(3)), "mesh#3");
        assert_eq!(Handle::<Mesh>::INVALID.to_string(), "mesh#invalid");
    }

    #[test]
    fn test_index_zero_is_valid() {
        let handle = Handle::<Mesh>::from_index(0);
        assert!(!handle.is_invalid());
        assert_ne!(handle, Handle::INVALID);
    }
}

//! Identity types for the sync client
//!
//! Object identities are assigned by the server and opaque to the client.
//! Channel generations are local and only ever increase.

use std::borrow::Borrow;
use std::fmt;

/// Server-assigned stable identity of an object instance
#[derive(Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ObjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        ObjectId(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        ObjectId(id)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Petri-net identity linking an object to the external assignment workflow
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct PetriNetId(pub i32);

impl PetriNetId {
    pub const NONE: PetriNetId = PetriNetId(0);

    #[inline]
    pub fn new(id: i32) -> Self {
        PetriNetId(id)
    }

    /// Only objects with a positive petri-net id take part in selection
    #[inline]
    pub fn is_selectable(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for PetriNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel generation - bumped on every successful channel change
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    #[inline]
    pub fn new(value: u64) -> Self {
        Generation(value)
    }

    #[inline]
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gen({})", self.0)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_object_id_lookup_by_str() {
        let mut ids = HashSet::new();
        ids.insert(ObjectId::new("X1"));

        assert!(ids.contains("X1"));
        assert!(!ids.contains("X2"));
    }

    #[test]
    fn test_petri_net_selectable() {
        assert!(PetriNetId::new(3).is_selectable());
        assert!(!PetriNetId::NONE.is_selectable());
        assert!(!PetriNetId::new(-1).is_selectable());
    }

    #[test]
    fn test_generation_ordering() {
        let g = Generation::ZERO;
        assert!(g.next() > g);
        assert_eq!(g.next().next(), Generation::new(2));
    }
}

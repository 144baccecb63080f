use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

// ids are written into plan archives as bare integers
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ------------- Id -------------
/// A typed index into an [`Arena`]. The kind parameter only keeps ids of
/// different object kinds apart at compile time.
pub struct Id<K> {
    index: u32,
    kind: PhantomData<fn() -> K>,
}

impl<K> Id<K> {
    pub const fn new(index: u32) -> Self {
        Self { index, kind: PhantomData }
    }
    pub fn index(self) -> u32 {
        self.index
    }
    fn slot(self) -> usize {
        self.index as usize
    }
}

// Derives would demand the same traits from K, which is only a marker.
impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<K> Copy for Id<K> {}
impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl<K> Eq for Id<K> {}
impl<K> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<K> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}
impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}
impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}
impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}
impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.index)
    }
}
impl<'de, K> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Id::new)
    }
}

// ------------- Kinds -------------
/// Marker for variables in the data space (scalars, arrays and row sets).
pub enum Variable {}
/// Marker for registered nodes.
pub enum NodeKind {}
/// Marker for registered actions.
pub enum ActionKind {}
/// Marker for registered sub-plan threads.
pub enum ThreadKind {}
/// Marker for registered lockers.
pub enum LockerKind {}
/// Marker for registered file access objects.
pub enum FileKind {}

pub type VarId = Id<Variable>;
pub type NodeId = Id<NodeKind>;
pub type ActionId = Id<ActionKind>;
pub type ThreadId = Id<ThreadKind>;
pub type LockerId = Id<LockerKind>;
pub type FileId = Id<FileKind>;

// ------------- Arena -------------
/// Append-only keeper. Objects are never removed while the arena lives, so
/// an id handed out once stays valid for the whole statement.
pub struct Arena<K, T> {
    kept: Vec<T>,
    kind: PhantomData<fn() -> K>,
}

impl<K, T> Arena<K, T> {
    pub fn new() -> Self {
        Self { kept: Vec::new(), kind: PhantomData }
    }
    pub fn keep(&mut self, object: T) -> Id<K> {
        self.kept.push(object);
        Id::new((self.kept.len() - 1) as u32)
    }
    pub fn get(&self, id: Id<K>) -> Option<&T> {
        self.kept.get(id.slot())
    }
    pub fn get_mut(&mut self, id: Id<K>) -> Option<&mut T> {
        self.kept.get_mut(id.slot())
    }
    /// The id the next call to `keep` will return.
    pub fn next_id(&self) -> Id<K> {
        Id::new(self.kept.len() as u32)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (Id<K>, &T)> + '_ {
        self.kept.iter().enumerate().map(|(i, t)| (Id::new(i as u32), t))
    }
}

impl<K, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T: fmt::Debug> fmt::Debug for Arena<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.kept.iter()).finish()
    }
}

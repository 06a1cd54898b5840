//! Type-erased cancellation identifiers.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of a hashable, comparable key.
trait Key: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn Key) -> bool;
    fn hash_key(&self, state: &mut dyn Hasher);
}

impl<T> Key for T
where
    T: Any + fmt::Debug + Hash + Eq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_key(&self, other: &dyn Key) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Cancellation identity shared by a group of effects
///
/// Any `Hash + Eq + Debug` value can serve as an id. Ids built from values of
/// different types never compare equal, so `EffectId::new(1_u64)` and
/// `EffectId::new(1_u32)` name two distinct groups.
///
/// # Example
///
/// ```
/// use unistore_core::EffectId;
///
/// #[derive(Debug, Hash, PartialEq, Eq)]
/// enum TimerId {
///     Tick,
/// }
///
/// let a = EffectId::new(TimerId::Tick);
/// let b = EffectId::new(TimerId::Tick);
/// assert_eq!(a, b);
/// assert_ne!(EffectId::from("tick"), a);
/// ```
#[derive(Clone)]
pub struct EffectId(Arc<dyn Key>);

impl EffectId {
    /// Wrap any hashable token as a cancellation id
    #[must_use]
    pub fn new<T>(key: T) -> Self
    where
        T: Any + fmt::Debug + Hash + Eq + Send + Sync,
    {
        Self(Arc::new(key))
    }
}

impl PartialEq for EffectId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_key(&*other.0)
    }
}

impl Eq for EffectId {}

impl Hash for EffectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_key(state);
    }
}

impl fmt::Debug for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EffectId({:?})", &*self.0)
    }
}

impl From<&'static str> for EffectId {
    fn from(key: &'static str) -> Self {
        Self::new(key)
    }
}

impl From<String> for EffectId {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl From<u64> for EffectId {
    fn from(key: u64) -> Self {
        Self::new(key)
    }
}

impl From<usize> for EffectId {
    fn from(key: usize) -> Self {
        Self::new(key)
    }
}

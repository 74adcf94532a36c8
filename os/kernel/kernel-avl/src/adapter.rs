use core::cmp::Ordering;
use core::fmt;
use core::marker::PhantomData;

/// Capabilities a tree needs from the values it indexes.
///
/// The adapter is bound to the tree at construction time and replaces a
/// table of allocate/compare/print callbacks: node storage is owned by the
/// tree's arena, everything value-specific goes through this trait.
///
/// `compare` does not have to be a total order over all *possible* keys,
/// only over the keys actually stored. The extent tree, for example, reports
/// [`Ordering::Equal`] for any two overlapping ranges, which makes an
/// overlapping insert a key collision.
pub trait TreeAdapter {
    /// The stored value (the "node payload").
    type Value;
    /// The key the tree is ordered by.
    type Key: ?Sized;

    /// Extract the key from a stored value.
    fn key<'v>(&self, value: &'v Self::Value) -> &'v Self::Key;

    /// Three-way compare `probe` against the key of a stored node.
    fn compare(&self, probe: &Self::Key, node: &Self::Key) -> Ordering;

    /// Render a value for debug dumps.
    fn describe(&self, value: &Self::Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let _ = value;
        f.write_str("<node>")
    }
}

/// Adapter for plain ordered values: the value is its own key.
pub struct OrdAdapter<T>(PhantomData<fn() -> T>);

impl<T> OrdAdapter<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for OrdAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + fmt::Debug> TreeAdapter for OrdAdapter<T> {
    type Value = T;
    type Key = T;

    #[inline]
    fn key<'v>(&self, value: &'v T) -> &'v T {
        value
    }

    #[inline]
    fn compare(&self, probe: &T, node: &T) -> Ordering {
        probe.cmp(node)
    }

    fn describe(&self, value: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(value, f)
    }
}

/// `Display` shim that routes through [`TreeAdapter::describe`].
pub(crate) struct Describe<'a, A: TreeAdapter> {
    pub(crate) adapter: &'a A,
    pub(crate) value: &'a A::Value,
}

impl<A: TreeAdapter> fmt::Display for Describe<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.adapter.describe(self.value, f)
    }
}

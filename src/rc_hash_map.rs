//! A reference-counting map, used for deferred node removal.
//!
//! Counts are taken in bulk with [`RcHashMap::add_or_insert_with`] when a removal starts,
//! released one by one, and entries are [drained](`RcHashMap::drain_weak`) once they reach zero.

use core::{
	borrow::Borrow,
	hash::{BuildHasher, Hash},
};
use hashbrown::{
	hash_map::{DefaultHashBuilder, Entry},
	HashMap,
};
use num_traits::{CheckedAdd, CheckedSub, One, Zero};

/// Entries stay until their count is [drained](`RcHashMap::drain_weak`) at zero.
pub struct RcHashMap<K, C, V, S = DefaultHashBuilder>(HashMap<K, (C, V), S>)
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher;
impl<K, C, V, S> Default for RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: Default + BuildHasher,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<K, C, V, S> RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher,
{
	#[must_use]
	pub fn new() -> Self
	where
		S: Default,
	{
		Self(HashMap::with_hasher(S::default()))
	}

	/// Adds `count` to `k`'s count, inserting it with `count` if absent.
	///
	/// Leaves the count unchanged if it would saturate.
	pub fn add_or_insert_with<F: FnOnce() -> V>(&mut self, k: K, count: C, v: F) -> Result<&mut V, CountSaturatedError> {
		match self.0.entry(k) {
			Entry::Occupied(occupied) => {
				let (c, v) = occupied.into_mut();
				*c = c.checked_add(&count).ok_or(CountSaturatedError)?;
				Ok(v)
			}
			Entry::Vacant(vacant) => Ok(&mut vacant.insert((count, v())).1),
		}
	}

	/// Decrements without removing. Errors on a zero count.
	pub fn weak_decrement<Q: ?Sized>(&mut self, k: &Q) -> Result<Option<&mut V>, CountSaturatedError>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		match self.0.get_mut(k) {
			Some((c, v)) => {
				*c = c.checked_sub(&C::one()).ok_or(CountSaturatedError)?;
				Ok(Some(v))
			}
			None => Ok(None),
		}
	}

	/// Removes and yields all entries with a zero count.
	pub fn drain_weak(&mut self) -> impl '_ + Iterator<Item = (K, V)> {
		self.0.drain_filter(|_, (c, _)| c.is_zero()).map(|(k, (_, v))| (k, v))
	}

	pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		self.0.contains_key(k)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn clear(&mut self) {
		self.0.clear()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Reference count saturated")]
pub struct CountSaturatedError;

#[cfg(test)]
mod tests {
	use super::RcHashMap;

	#[test]
	fn drains_at_zero() {
		let mut map = RcHashMap::<u32, u8, &str>::new();
		map.add_or_insert_with(1, 1, || "one").unwrap();
		map.add_or_insert_with(1, 1, || unreachable!()).unwrap();
		map.add_or_insert_with(2, 1, || "two").unwrap();
		assert!(map.add_or_insert_with(2, u8::MAX, || unreachable!()).is_err());

		map.weak_decrement(&1).unwrap();
		map.weak_decrement(&2).unwrap();
		assert_eq!(map.drain_weak().collect::<Vec<_>>(), [(2, "two")]);
		assert_eq!(map.len(), 1);

		map.weak_decrement(&1).unwrap();
		assert!(map.weak_decrement(&1).is_err());
		assert_eq!(map.drain_weak().count(), 1);
		assert!(map.is_empty());
	}
}

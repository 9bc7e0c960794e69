//! Read tracking and write invalidation over plain [`Object`]s.

use crate::{
	scheduler::{Scheduler, VmState},
	value::{ObjectIdentity, WeakObject},
	Key, Object, Value,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	hash::Hash,
};
use hashbrown::{hash_map::Entry, HashMap};
use std::rc::{Rc, Weak};
use tracing::{trace, trace_span, warn};

/// The VMs that read one (object, key) pair during their last render.
#[derive(Default)]
pub(crate) struct DepRecord {
	observers: RefCell<Vec<Weak<VmState>>>,
}
impl DepRecord {
	/// Returns whether `vm` was newly added.
	fn add(&self, vm: &Rc<VmState>) -> bool {
		let mut observers = self.observers.borrow_mut();
		if observers.first().map_or(false, |first| first.as_ptr() == Rc::as_ptr(vm)) {
			return false;
		}
		if observers.iter().any(|observer| observer.as_ptr() == Rc::as_ptr(vm)) {
			return false;
		}
		observers.push(Rc::downgrade(vm));
		true
	}

	pub(crate) fn remove(&self, vm: &VmState) {
		self.observers.borrow_mut().retain(|observer| !core::ptr::eq(observer.as_ptr(), vm));
	}

	fn observers(&self) -> Vec<Rc<VmState>> {
		self.observers.borrow().iter().filter_map(Weak::upgrade).collect()
	}
}

/// A weakly retaining memo of one replica per key.
pub(crate) struct ReplicaTable<K: Hash + Eq, R> {
	replicas: HashMap<K, Weak<R>>,
}
impl<K: Hash + Eq, R> Default for ReplicaTable<K, R> {
	fn default() -> Self {
		Self {
			replicas: HashMap::new(),
		}
	}
}
impl<K: Hash + Eq, R> ReplicaTable<K, R> {
	/// Returns the live replica for `key` if `is_current` accepts it, or memoizes a new one.
	pub(crate) fn get_or_insert_with(&mut self, key: K, is_current: impl FnOnce(&R) -> bool, create: impl FnOnce() -> Rc<R>) -> Rc<R> {
		match self.replicas.entry(key) {
			Entry::Occupied(mut occupied) => match occupied.get().upgrade().filter(|replica| is_current(replica)) {
				Some(replica) => replica,
				None => {
					let replica = create();
					occupied.insert(Rc::downgrade(&replica));
					replica
				}
			},
			Entry::Vacant(vacant) => {
				let replica = create();
				vacant.insert(Rc::downgrade(&replica));
				replica
			}
		}
	}

	/// Drops entries whose replica is gone.
	pub(crate) fn purge(&mut self) -> usize {
		self.replicas.drain_filter(|_, replica| replica.strong_count() == 0).count()
	}

	pub(crate) fn len(&self) -> usize {
		self.replicas.len()
	}
}

struct TargetRecord {
	target: WeakObject,
	keys: HashMap<Key, Rc<DepRecord>>,
}
impl TargetRecord {
	fn new(target: &Object) -> Self {
		Self {
			target: target.downgrade(),
			keys: HashMap::new(),
		}
	}
}

/// Hands out [`Tracked`] wrappers and keeps the dependency records behind them.
///
/// Records reference their target weakly, so tracking never extends an object's lifetime.
#[derive(Clone)]
pub struct ReactiveMembrane(Rc<MembraneInner>);

struct MembraneInner {
	scheduler: Scheduler,
	records: RefCell<HashMap<ObjectIdentity, TargetRecord>>,
	replicas: RefCell<ReplicaTable<ObjectIdentity, TrackedInner>>,
}

impl ReactiveMembrane {
	#[must_use]
	pub fn new(scheduler: Scheduler) -> Self {
		Self(Rc::new(MembraneInner {
			scheduler,
			records: RefCell::default(),
			replicas: RefCell::default(),
		}))
	}

	#[must_use]
	pub fn scheduler(&self) -> &Scheduler {
		&self.0.scheduler
	}

	/// Returns the tracking wrapper for `object`, the same one for as long as it is in use.
	#[must_use]
	pub fn wrap(&self, object: Object) -> Tracked {
		let identity = object.identity();
		Tracked(self.0.replicas.borrow_mut().get_or_insert_with(
			identity,
			|replica| replica.target.ptr_eq(&object),
			|| {
				Rc::new(TrackedInner {
					target: object.clone(),
					membrane: self.clone(),
				})
			},
		))
	}

	pub(crate) fn subscribe(&self, vm: &Rc<VmState>, target: &Object, key: &Key) {
		let record = {
			let mut records = self.0.records.borrow_mut();
			let target_record = match records.entry(target.identity()) {
				Entry::Occupied(occupied) => {
					let target_record = occupied.into_mut();
					if !(target_record.target.is_alive() && target_record.target.refers_to(target)) {
						*target_record = TargetRecord::new(target);
					}
					target_record
				}
				Entry::Vacant(vacant) => vacant.insert(TargetRecord::new(target)),
			};
			target_record.keys.entry(key.clone()).or_insert_with(Default::default).clone()
		};
		if record.add(vm) {
			trace!(vm = ?vm.id, ?key, "Subscribed");
			vm.deps.borrow_mut().push(record);
		}
	}

	/// Invalidates every VM that read `key` on `target`.
	pub(crate) fn notify(&self, target: &Object, key: &Key) {
		let record = {
			let records = self.0.records.borrow();
			records
				.get(&target.identity())
				.filter(|target_record| target_record.target.refers_to(target))
				.and_then(|target_record| target_record.keys.get(key).cloned())
		};
		if let Some(record) = record {
			for vm in record.observers() {
				self.0.scheduler.invalidate(&vm);
			}
		}
	}

	/// Drops side-table entries for objects and wrappers that are gone.
	pub fn collect_garbage(&self) {
		let span = trace_span!("Collecting membrane garbage");
		let _enter = span.enter();

		let records = self
			.0
			.records
			.borrow_mut()
			.drain_filter(|_, target_record| !target_record.target.is_alive())
			.count();
		let replicas = self.0.replicas.borrow_mut().purge();
		trace!(records, replicas, "Purged");
	}

	/// The number of objects with dependency records.
	#[must_use]
	pub fn record_count(&self) -> usize {
		self.0.records.borrow().len()
	}

	/// The number of memoized wrappers, live or not yet purged.
	#[must_use]
	pub fn replica_count(&self) -> usize {
		self.0.replicas.borrow().len()
	}
}
impl Debug for ReactiveMembrane {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ReactiveMembrane")
			.field("records", &self.record_count())
			.field("replicas", &self.replica_count())
			.finish()
	}
}

/// A tracking view of an [`Object`].
///
/// Reads made while a component renders subscribe it to the key that was read.
/// Writes invalidate the subscribers of the written key, but are rejected while any component renders.
#[derive(Clone)]
pub struct Tracked(Rc<TrackedInner>);

struct TrackedInner {
	target: Object,
	membrane: ReactiveMembrane,
}

impl Tracked {
	/// The plain object behind this wrapper.
	#[must_use]
	pub fn target(&self) -> Object {
		self.0.target.clone()
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	#[must_use]
	pub fn membrane(&self) -> &ReactiveMembrane {
		&self.0.membrane
	}

	fn track(&self, key: &Key) {
		if let Some(vm) = self.0.membrane.scheduler().vm_being_rendered() {
			self.0.membrane.subscribe(&vm, &self.0.target, key)
		}
	}

	fn wrap_value(&self, value: Value) -> Value {
		match value {
			Value::Object(object) => Value::Tracked(self.0.membrane.wrap(object)),
			other => other,
		}
	}

	fn writable(&self, operation: &str) -> bool {
		if self.0.membrane.scheduler().is_rendering() {
			warn!(operation, target = ?self.0.target, "Rejected mutation of tracked data during render");
			false
		} else {
			true
		}
	}

	/// Reads `key`, wrapping object values in their own [`Tracked`].
	pub fn get(&self, key: impl Into<Key>) -> Value {
		let key = key.into();
		self.track(&key);
		self.wrap_value(self.0.target.get(&key))
	}

	/// Writes `key`.
	///
	/// Returns `false` (without writing) during render, or if a list would grow past [`MAX_LIST_LENGTH`](`crate::value::MAX_LIST_LENGTH`).
	pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
		if !self.writable("set") {
			return false;
		}
		let key = key.into();
		let value = value.into().unwrap_tracked();
		let old_len = self.0.target.is_list().then(|| self.0.target.len());
		if self.0.target.get(&key) != value || key == Key::Length {
			if self.0.target.set(&key, value).is_none() {
				return false;
			}
			self.0.membrane.notify(&self.0.target, &key);
			if let Some(old_len) = old_len {
				let new_len = self.0.target.len();
				if new_len != old_len && key != Key::Length {
					self.0.membrane.notify(&self.0.target, &Key::Length);
				}
			}
		}
		true
	}

	/// Removes `key`, notifying its subscribers even if it was absent.
	///
	/// Returns `false` (without removing) during render.
	pub fn delete(&self, key: impl Into<Key>) -> bool {
		if !self.writable("delete") {
			return false;
		}
		let key = key.into();
		self.0.target.delete(&key);
		self.0.membrane.notify(&self.0.target, &key);
		true
	}

	/// The tracked item or entry count.
	#[must_use]
	pub fn len(&self) -> usize {
		self.track(&Key::Length);
		self.0.target.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Reads every item of a list, tracking its length and each index.
	///
	/// Returns an empty [`Vec`] for records.
	#[must_use]
	pub fn items(&self) -> Vec<Value> {
		if !self.0.target.is_list() {
			return Vec::new();
		}
		(0..self.len()).map(|index| self.get(index)).collect()
	}

	/// Appends to a list. Always notifies the length.
	///
	/// Returns `false` for records and during render.
	pub fn push(&self, value: impl Into<Value>) -> bool {
		if !self.writable("push") {
			return false;
		}
		match self.0.target.push(value.into()) {
			Some(len) => {
				self.0.membrane.notify(&self.0.target, &Key::Index(len - 1));
				self.0.membrane.notify(&self.0.target, &Key::Length);
				true
			}
			None => false,
		}
	}

	/// Replaces `delete_count` items at `start` with `items`, returning the removed ones.
	///
	/// Every index from `start` onwards is notified, as well as the length.
	/// Returns [`None`] for records and during render.
	pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Option<Vec<Value>> {
		if !self.writable("splice") {
			return None;
		}
		let (removed, old_len, new_len) = self.0.target.splice(start, delete_count, items)?;
		for index in start.min(old_len)..old_len.max(new_len) {
			self.0.membrane.notify(&self.0.target, &Key::Index(index));
		}
		self.0.membrane.notify(&self.0.target, &Key::Length);
		Some(removed)
	}
}
impl Debug for Tracked {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Tracked").field(&self.0.target).finish()
	}
}
impl PartialEq for Tracked {
	fn eq(&self, other: &Self) -> bool {
		self.0.target.ptr_eq(&other.0.target)
	}
}

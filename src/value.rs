//! Plain, untracked data.
//!
//! [`Object`]s are shared by reference and compared by identity,
//! so that the same underlying object can be recognised by the membranes.

use crate::reactive::Tracked;
use core::{
	cell::{Ref, RefCell},
	fmt::{self, Debug, Formatter},
	hash::{Hash, Hasher},
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::warn;

/// Lists never grow past this many items through [`Object::set`].
pub const MAX_LIST_LENGTH: usize = 1 << 24;

#[derive(Clone)]
pub enum Value {
	Undefined,
	Null,
	Bool(bool),
	Number(f64),
	String(Rc<str>),
	Object(Object),
	/// A tracking wrapper, as handed out by [`Tracked::get`].
	Tracked(Tracked),
}
impl Default for Value {
	fn default() -> Self {
		Self::Undefined
	}
}
impl Value {
	#[must_use]
	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	#[must_use]
	pub fn is_nullish(&self) -> bool {
		matches!(self, Value::Undefined | Value::Null)
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(string) => Some(string),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Number(number) => Some(*number),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(bool) => Some(*bool),
			_ => None,
		}
	}

	/// The underlying plain object, seeing through tracking wrappers.
	#[must_use]
	pub fn as_object(&self) -> Option<Object> {
		match self {
			Value::Object(object) => Some(object.clone()),
			Value::Tracked(tracked) => Some(tracked.target()),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_tracked(&self) -> Option<&Tracked> {
		match self {
			Value::Tracked(tracked) => Some(tracked),
			_ => None,
		}
	}

	/// Strips tracking wrappers, for storage inside plain objects.
	#[must_use]
	pub fn unwrap_tracked(self) -> Self {
		match self {
			Value::Tracked(tracked) => Value::Object(tracked.target()),
			other => other,
		}
	}

	/// Text as it would appear in a text node or attribute.
	#[must_use]
	pub fn to_text(&self) -> String {
		match self {
			Value::Undefined => "undefined".to_owned(),
			Value::Null => "null".to_owned(),
			Value::Bool(bool) => bool.to_string(),
			Value::Number(number) => format_number(*number),
			Value::String(string) => string.to_string(),
			Value::Object(_) | Value::Tracked(_) => "[object Object]".to_owned(),
		}
	}
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn format_number(number: f64) -> String {
	if number.is_finite() && number.trunc() == number && number.abs() < 1e15 {
		format!("{}", number as i64)
	} else if number.is_nan() {
		"NaN".to_owned()
	} else {
		number.to_string()
	}
}

/// Strict equality: objects by identity, `NaN` unequal to itself.
impl PartialEq for Value {
	#[allow(clippy::float_cmp)]
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Number(a), Value::Number(b)) => a == b,
			(Value::String(a), Value::String(b)) => a == b,
			(a, b) => match (a.as_object(), b.as_object()) {
				(Some(a), Some(b)) => a.ptr_eq(&b),
				_ => false,
			},
		}
	}
}
impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Undefined => f.write_str("undefined"),
			Value::Null => f.write_str("null"),
			Value::Bool(bool) => Debug::fmt(bool, f),
			Value::Number(number) => Debug::fmt(number, f),
			Value::String(string) => Debug::fmt(string, f),
			Value::Object(object) => Debug::fmt(object, f),
			Value::Tracked(tracked) => Debug::fmt(tracked, f),
		}
	}
}

impl From<bool> for Value {
	fn from(bool: bool) -> Self {
		Self::Bool(bool)
	}
}
impl From<f64> for Value {
	fn from(number: f64) -> Self {
		Self::Number(number)
	}
}
impl From<i32> for Value {
	fn from(number: i32) -> Self {
		Self::Number(number.into())
	}
}
impl From<u32> for Value {
	fn from(number: u32) -> Self {
		Self::Number(number.into())
	}
}
impl From<&str> for Value {
	fn from(string: &str) -> Self {
		Self::String(string.into())
	}
}
impl From<String> for Value {
	fn from(string: String) -> Self {
		Self::String(string.into())
	}
}
impl From<Rc<str>> for Value {
	fn from(string: Rc<str>) -> Self {
		Self::String(string)
	}
}
impl From<Object> for Value {
	fn from(object: Object) -> Self {
		Self::Object(object)
	}
}
impl From<Tracked> for Value {
	fn from(tracked: Tracked) -> Self {
		Self::Tracked(tracked)
	}
}
impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(option: Option<T>) -> Self {
		option.map_or(Value::Null, Into::into)
	}
}

/// A property key on an [`Object`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Name(Rc<str>),
	Index(usize),
	/// The length of a list (or entry count of a record).
	Length,
}
impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Self::Name(name.into())
	}
}
impl From<Rc<str>> for Key {
	fn from(name: Rc<str>) -> Self {
		Self::Name(name)
	}
}
impl From<usize> for Key {
	fn from(index: usize) -> Self {
		Self::Index(index)
	}
}

#[derive(Debug, Clone)]
pub enum Data {
	Record(HashMap<Rc<str>, Value>),
	List(Vec<Value>),
}

/// A plain shared object: a string-keyed record or an ordered list.
#[derive(Clone)]
pub struct Object(Rc<RefCell<Data>>);
impl Object {
	#[must_use]
	pub fn record() -> Self {
		Self(Rc::new(RefCell::new(Data::Record(HashMap::new()))))
	}

	#[must_use]
	pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
		Self(Rc::new(RefCell::new(Data::List(items.into_iter().collect()))))
	}

	#[must_use]
	pub fn from_entries<K: Into<Rc<str>>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
		Self(Rc::new(RefCell::new(Data::Record(
			entries.into_iter().map(|(k, v)| (k.into(), v.into().unwrap_tracked())).collect(),
		))))
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	#[must_use]
	pub fn is_list(&self) -> bool {
		matches!(&*self.0.borrow(), Data::List(_))
	}

	#[must_use]
	pub fn data(&self) -> Ref<'_, Data> {
		self.0.borrow()
	}

	/// Untracked read.
	#[must_use]
	pub fn get(&self, key: &Key) -> Value {
		match (&*self.0.borrow(), key) {
			(Data::Record(record), Key::Name(name)) => record.get(name).cloned().unwrap_or_default(),
			(Data::Record(record), Key::Index(index)) => record.get(index.to_string().as_str()).cloned().unwrap_or_default(),
			(Data::List(list), Key::Index(index)) => list.get(*index).cloned().unwrap_or_default(),
			#[allow(clippy::cast_precision_loss)]
			(Data::List(list), Key::Length) => Value::Number(list.len() as f64),
			#[allow(clippy::cast_precision_loss)]
			(Data::Record(record), Key::Length) => Value::Number(record.len() as f64),
			(Data::List(_), Key::Name(_)) => Value::Undefined,
		}
	}

	/// Untracked write. Returns the previous value.
	///
	/// Returns [`None`] (without writing) if a list would grow past [`MAX_LIST_LENGTH`].
	pub fn set(&self, key: &Key, value: Value) -> Option<Value> {
		let value = value.unwrap_tracked();
		Some(match (&mut *self.0.borrow_mut(), key) {
			(Data::Record(record), Key::Name(name)) => record.insert(name.clone(), value).unwrap_or_default(),
			(Data::Record(record), Key::Index(index)) => record.insert(index.to_string().into(), value).unwrap_or_default(),
			(Data::List(list), Key::Index(index)) => {
				if *index >= list.len() {
					match index.checked_add(1).filter(|&length| length <= MAX_LIST_LENGTH) {
						Some(length) => list.resize(length, Value::Undefined),
						None => {
							warn!(index, "Refused list write past the maximum length");
							return None;
						}
					}
				}
				core::mem::replace(&mut list[*index], value)
			}
			(Data::List(list), Key::Length) => {
				#[allow(clippy::cast_precision_loss)]
				let previous = Value::Number(list.len() as f64);
				if let Some(length) = value.as_f64() {
					#[allow(clippy::cast_precision_loss)]
					let max = MAX_LIST_LENGTH as f64;
					if length.is_nan() || length > max {
						warn!(length, "Refused list length past the maximum");
						return None;
					}
					#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
					list.resize(length.max(0.0) as usize, Value::Undefined);
				}
				previous
			}
			(Data::Record(_), Key::Length) | (Data::List(_), Key::Name(_)) => Value::Undefined,
		})
	}

	/// Untracked delete. Returns the removed value.
	pub fn delete(&self, key: &Key) -> Value {
		match (&mut *self.0.borrow_mut(), key) {
			(Data::Record(record), Key::Name(name)) => record.remove(name).unwrap_or_default(),
			(Data::Record(record), Key::Index(index)) => record.remove(index.to_string().as_str()).unwrap_or_default(),
			(Data::List(list), Key::Index(index)) => list.get_mut(*index).map(|slot| core::mem::take(slot)).unwrap_or_default(),
			(_, Key::Length) | (Data::List(_), Key::Name(_)) => Value::Undefined,
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		match &*self.0.borrow() {
			Data::Record(record) => record.len(),
			Data::List(list) => list.len(),
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub(crate) fn push(&self, value: Value) -> Option<usize> {
		match &mut *self.0.borrow_mut() {
			Data::List(list) => {
				list.push(value.unwrap_tracked());
				Some(list.len())
			}
			Data::Record(_) => None,
		}
	}

	pub(crate) fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Option<(Vec<Value>, usize, usize)> {
		match &mut *self.0.borrow_mut() {
			Data::List(list) => {
				let old_len = list.len();
				let start = start.min(old_len);
				let end = start.saturating_add(delete_count).min(old_len);
				let removed = list.splice(start..end, items.into_iter().map(Value::unwrap_tracked)).collect();
				Some((removed, old_len, list.len()))
			}
			Data::Record(_) => None,
		}
	}

	pub(crate) fn identity(&self) -> ObjectIdentity {
		ObjectIdentity(Rc::as_ptr(&self.0) as usize)
	}

	pub(crate) fn downgrade(&self) -> WeakObject {
		WeakObject(Rc::downgrade(&self.0))
	}
}
impl Debug for Object {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Object").field(&Rc::as_ptr(&self.0)).finish()
	}
}
impl PartialEq for Object {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}
impl Eq for Object {}
impl Hash for Object {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.identity().hash(state)
	}
}

/// Address of an [`Object`]'s allocation, used as side-table key.
///
/// Only meaningful together with a [`WeakObject`] check, as addresses are reused after deallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObjectIdentity(usize);

#[derive(Debug, Clone)]
pub(crate) struct WeakObject(Weak<RefCell<Data>>);
impl WeakObject {
	pub(crate) fn is_alive(&self) -> bool {
		self.0.strong_count() > 0
	}

	pub(crate) fn refers_to(&self, object: &Object) -> bool {
		Weak::ptr_eq(&self.0, &Rc::downgrade(&object.0))
	}
}

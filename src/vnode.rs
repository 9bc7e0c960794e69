//! The virtual node model.

use crate::{component::ComponentDef, dom::Event, patch::ElementListener, NodeId, Value, VmId};
use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// A small insertion-ordered map, as found in [`VNodeData`].
#[derive(Clone, PartialEq)]
pub struct Map<V>(Vec<(Rc<str>, V)>);
impl<V> Default for Map<V> {
	fn default() -> Self {
		Self(Vec::new())
	}
}
impl<V> Map<V> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&V> {
		self.0.iter().find(|(key, _)| &**key == name).map(|(_, value)| value)
	}

	pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
		self.0.iter_mut().find(|(key, _)| &**key == name).map(|(_, value)| value)
	}

	#[must_use]
	pub fn contains_key(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	/// Replaces in place if `name` is present. Returns the previous value.
	pub fn insert(&mut self, name: impl Into<Rc<str>>, value: V) -> Option<V> {
		let name = name.into();
		match self.0.iter_mut().find(|(key, _)| *key == name) {
			Some((_, slot)) => Some(core::mem::replace(slot, value)),
			None => {
				self.0.push((name, value));
				None
			}
		}
	}

	pub fn remove(&mut self, name: &str) -> Option<V> {
		let index = self.0.iter().position(|(key, _)| &**key == name)?;
		Some(self.0.remove(index).1)
	}

	pub fn iter(&self) -> impl '_ + Iterator<Item = (&Rc<str>, &V)> {
		self.0.iter().map(|(key, value)| (key, value))
	}

	pub fn keys(&self) -> impl '_ + Iterator<Item = &Rc<str>> {
		self.0.iter().map(|(key, _)| key)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl<K: Into<Rc<str>>, V> FromIterator<(K, V)> for Map<V> {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		let mut map = Self::new();
		for (key, value) in iter {
			map.insert(key, value);
		}
		map
	}
}
impl<V: Debug> Debug for Map<V> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.iter()).finish()
	}
}

/// An event handler in [`VNodeData`] or registered on a component.
///
/// Compared by identity. Carries the uid of the VM it was bound by, if any.
#[derive(Clone)]
pub struct Handler {
	owner: Option<VmId>,
	f: Rc<dyn Fn(&Event)>,
}
impl Handler {
	pub fn new(f: impl 'static + Fn(&Event)) -> Self {
		Self { owner: None, f: Rc::new(f) }
	}

	pub(crate) fn bound(owner: Option<VmId>, f: impl 'static + Fn(&Event)) -> Self {
		Self { owner, f: Rc::new(f) }
	}

	#[must_use]
	pub fn owner(&self) -> Option<VmId> {
		self.owner
	}

	pub fn call(&self, event: &Event) {
		(self.f)(event)
	}
}
impl PartialEq for Handler {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.f, &other.f)
	}
}
impl Debug for Handler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Handler")
			.field("owner", &self.owner)
			.field("f", &Rc::as_ptr(&self.f).cast::<()>())
			.finish()
	}
}

/// Called with the element instead of detaching it right away.
///
/// The element stays in place until [`Engine::complete_removal`](`crate::Engine::complete_removal`) is called for it.
#[derive(Clone)]
pub struct RemoveHook(Rc<dyn Fn(NodeId)>);
impl RemoveHook {
	pub fn new(f: impl 'static + Fn(NodeId)) -> Self {
		Self(Rc::new(f))
	}

	pub(crate) fn call(&self, element: NodeId) {
		(self.0)(element)
	}
}
impl Debug for RemoveHook {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("RemoveHook").field(&Rc::as_ptr(&self.0).cast::<()>()).finish()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Style {
	Text(Rc<str>),
	Map(Map<Rc<str>>),
}

/// The content passed into a component for one slot name.
pub type Slot = Rc<[VNode]>;

#[derive(Debug, Clone, Default)]
pub struct VNodeData {
	pub key: Option<Rc<str>>,
	pub ns: Option<Rc<str>>,
	/// DOM properties of plain elements.
	pub props: Map<Value>,
	pub attrs: Map<Value>,
	pub class: Map<bool>,
	pub style: Option<Style>,
	pub on: Map<Handler>,
	/// Public properties of a component.
	pub component_props: Map<Value>,
	pub slotset: Map<Slot>,
	pub on_remove: Option<RemoveHook>,
}
impl VNodeData {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn key(mut self, key: impl Into<Rc<str>>) -> Self {
		self.key = Some(key.into());
		self
	}

	#[must_use]
	pub fn prop(mut self, name: impl Into<Rc<str>>, value: impl Into<Value>) -> Self {
		self.props.insert(name, value.into());
		self
	}

	#[must_use]
	pub fn attr(mut self, name: impl Into<Rc<str>>, value: impl Into<Value>) -> Self {
		self.attrs.insert(name, value.into());
		self
	}

	#[must_use]
	pub fn class(mut self, name: impl Into<Rc<str>>, on: bool) -> Self {
		self.class.insert(name, on);
		self
	}

	/// Adds each whitespace-separated class in `class_name`.
	#[must_use]
	pub fn class_name(mut self, class_name: &str) -> Self {
		for name in class_name.split_whitespace() {
			self.class.insert(name, true);
		}
		self
	}

	#[must_use]
	pub fn style(mut self, name: impl Into<Rc<str>>, value: impl Into<Rc<str>>) -> Self {
		match &mut self.style {
			Some(Style::Map(map)) => {
				map.insert(name, value.into());
			}
			style => *style = Some(Style::Map([(name, value.into())].into_iter().collect())),
		}
		self
	}

	#[must_use]
	pub fn style_text(mut self, css_text: impl Into<Rc<str>>) -> Self {
		self.style = Some(Style::Text(css_text.into()));
		self
	}

	#[must_use]
	pub fn on(mut self, kind: impl Into<Rc<str>>, handler: Handler) -> Self {
		self.on.insert(kind, handler);
		self
	}

	#[must_use]
	pub fn slot(mut self, name: impl Into<Rc<str>>, content: Vec<VNode>) -> Self {
		self.slotset.insert(name, content.into());
		self
	}

	#[must_use]
	pub fn on_remove(mut self, hook: RemoveHook) -> Self {
		self.on_remove = Some(hook);
		self
	}
}

#[derive(Clone, Default)]
pub struct VNode {
	/// [`None`] for text nodes, `"!"` for comments.
	pub sel: Option<Rc<str>>,
	pub data: VNodeData,
	pub children: Option<Vec<VNode>>,
	pub text: Option<Rc<str>>,
	pub elm: Option<NodeId>,
	pub ctor: Option<Rc<ComponentDef>>,
	/// The uid of the VM that rendered this node, [`None`] at the top level.
	pub owner: Option<VmId>,
	pub is_root: bool,
	pub(crate) vm: Option<VmId>,
	pub(crate) listener: Option<ElementListener>,
}
impl VNode {
	#[must_use]
	pub fn key(&self) -> Option<&Rc<str>> {
		self.data.key.as_ref()
	}

	#[must_use]
	pub fn vm(&self) -> Option<VmId> {
		self.vm
	}

	#[must_use]
	pub fn is_text(&self) -> bool {
		self.sel.is_none()
	}

	#[must_use]
	pub fn is_comment(&self) -> bool {
		self.sel.as_deref() == Some("!")
	}

	/// Whether `self` and `other` describe the same logical node, which is then patched in place.
	#[must_use]
	pub fn same(&self, other: &Self) -> bool {
		self.data.key == other.data.key
			&& self.sel == other.sel
			&& match (&self.ctor, &other.ctor) {
				(None, None) => true,
				(Some(a), Some(b)) => Rc::ptr_eq(a, b),
				_ => false,
			}
	}

	/// A copy without children.
	#[must_use]
	pub(crate) fn shallow(&self) -> Self {
		Self {
			sel: self.sel.clone(),
			data: self.data.clone(),
			children: None,
			text: self.text.clone(),
			elm: self.elm,
			ctor: self.ctor.clone(),
			owner: self.owner,
			is_root: self.is_root,
			vm: self.vm,
			listener: self.listener.clone(),
		}
	}
}
impl Debug for VNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("VNode");
		debug.field("sel", &self.sel);
		if let Some(key) = &self.data.key {
			debug.field("key", key);
		}
		if let Some(text) = &self.text {
			debug.field("text", text);
		}
		if let Some(children) = &self.children {
			debug.field("children", children);
		}
		if let Some(ctor) = &self.ctor {
			debug.field("ctor", &ctor.name());
		}
		debug.field("elm", &self.elm).field("owner", &self.owner).field("vm", &self.vm).finish()
	}
}

/// A parsed `tag#id.class1.class2` selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Selector<'a> {
	pub(crate) tag: &'a str,
	pub(crate) id: Option<&'a str>,
	/// Dot-separated.
	pub(crate) classes: Option<&'a str>,
}
impl<'a> Selector<'a> {
	pub(crate) fn parse(sel: &'a str) -> Self {
		let hash_index = sel.find('#');
		let dot_index = {
			let from = hash_index.unwrap_or(0);
			sel[from..].find('.').map(|index| from + index)
		};
		let hash = hash_index.filter(|&index| index > 0).unwrap_or(sel.len());
		let dot = dot_index.filter(|&index| index > 0).unwrap_or(sel.len());
		let tag = if hash_index.is_some() || dot_index.is_some() {
			&sel[..hash.min(dot)]
		} else {
			sel
		};
		Self {
			tag,
			id: (hash < dot).then(|| &sel[hash + 1..dot]),
			classes: dot_index.filter(|&index| index > 0).map(|_| &sel[dot + 1..]),
		}
	}

	pub(crate) fn class_names(&self) -> impl 'a + Iterator<Item = &'a str> {
		self.classes.into_iter().flat_map(|classes| classes.split('.')).filter(|name| !name.is_empty())
	}
}

#[cfg(test)]
mod tests {
	use super::Selector;

	#[test]
	fn selectors() {
		assert_eq!(
			Selector::parse("div"),
			Selector {
				tag: "div",
				id: None,
				classes: None
			}
		);
		assert_eq!(
			Selector::parse("div#main.a.b"),
			Selector {
				tag: "div",
				id: Some("main"),
				classes: Some("a.b")
			}
		);
		assert_eq!(Selector::parse("span.x").class_names().collect::<Vec<_>>(), ["x"]);
		assert_eq!(Selector::parse("p#only").id, Some("only"));
	}
}

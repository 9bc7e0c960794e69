//! Render helpers, as used by (compiled or hand-written) render functions.

use crate::{
	component::ComponentDef,
	dom::{Event, SVG_NAMESPACE},
	vnode::{Handler, VNode, VNodeData},
	Value, VmId,
};
use std::rc::Rc;

/// One entry of a fragment under construction.
#[derive(Debug, Clone)]
pub enum Item {
	Node(VNode),
	Nodes(Vec<VNode>),
	Nothing,
}
impl From<VNode> for Item {
	fn from(vnode: VNode) -> Self {
		Self::Node(vnode)
	}
}
impl From<Vec<VNode>> for Item {
	fn from(vnodes: Vec<VNode>) -> Self {
		Self::Nodes(vnodes)
	}
}
impl From<Option<VNode>> for Item {
	fn from(vnode: Option<VNode>) -> Self {
		vnode.map_or(Self::Nothing, Self::Node)
	}
}

/// VNode constructors bound to the VM that renders them.
///
/// Obtained through [`Context::api`](`crate::Context::api`) during render, or [`Api::top_level`] outside of any component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Api {
	owner: Option<VmId>,
}
impl Api {
	pub(crate) fn new(owner: Option<VmId>) -> Self {
		Self { owner }
	}

	#[must_use]
	pub fn top_level() -> Self {
		Self::new(None)
	}

	#[must_use]
	pub fn owner(&self) -> Option<VmId> {
		self.owner
	}

	/// The base constructor. Stamps the owner.
	#[must_use]
	pub fn v(
		&self,
		sel: Option<&str>,
		data: VNodeData,
		children: Option<Vec<VNode>>,
		text: Option<Rc<str>>,
		ctor: Option<Rc<ComponentDef>>,
	) -> VNode {
		VNode {
			sel: sel.map(Into::into),
			data,
			children,
			text,
			elm: None,
			ctor,
			owner: self.owner,
			is_root: false,
			vm: None,
			listener: None,
		}
	}

	/// An element. `svg` subtrees get the SVG namespace, up to any `foreignObject`.
	#[must_use]
	pub fn h(&self, sel: &str, mut data: VNodeData, mut children: Vec<VNode>) -> VNode {
		let bytes = sel.as_bytes();
		if bytes.starts_with(b"svg") && matches!(bytes.get(3), None | Some(b'.' | b'#')) {
			add_ns(&mut data, Some(&mut children), sel);
		}
		self.v(Some(sel), data, Some(children), None, None)
	}

	/// A custom element backed by `def`.
	///
	/// Element properties in `data` become the component's public properties.
	#[must_use]
	pub fn c(&self, sel: &str, def: &Rc<ComponentDef>, mut data: VNodeData) -> VNode {
		let props = core::mem::take(&mut data.props);
		for (name, value) in props.iter() {
			data.component_props.insert(name.clone(), value.clone());
		}
		self.v(Some(sel), data, None, None, Some(def.clone()))
	}

	/// Iterates `items` through `factory(item, index, is_first, is_last)` and flattens the results.
	pub fn i<T, I>(&self, items: I, mut factory: impl FnMut(T, usize, bool, bool) -> Item) -> Vec<VNode>
	where
		I: IntoIterator<Item = T>,
		I::IntoIter: ExactSizeIterator,
	{
		let items = items.into_iter();
		let len = items.len();
		self.f(items.enumerate().map(|(index, item)| factory(item, index, index == 0, index + 1 == len)))
	}

	/// Flattens.
	pub fn f(&self, items: impl IntoIterator<Item = Item>) -> Vec<VNode> {
		let mut flattened = Vec::new();
		for item in items {
			match item {
				Item::Node(vnode) => flattened.push(vnode),
				Item::Nodes(vnodes) => flattened.extend(vnodes),
				Item::Nothing => (),
			}
		}
		flattened
	}

	/// Text.
	#[must_use]
	pub fn t(&self, text: impl Into<Rc<str>>) -> VNode {
		self.v(None, VNodeData::default(), None, Some(text.into()), None)
	}

	/// Dynamic text. Nothing for `undefined` and `null`.
	#[must_use]
	pub fn d(&self, value: &Value) -> Option<VNode> {
		(!value.is_nullish()).then(|| self.t(value.to_text()))
	}

	/// A comment.
	#[must_use]
	pub fn p(&self, text: impl Into<Rc<str>>) -> VNode {
		self.v(Some("!"), VNodeData::default(), None, Some(text.into()), None)
	}

	/// Binds `f` as handler owned by the rendering VM.
	pub fn b(&self, f: impl 'static + Fn(&Event)) -> Handler {
		Handler::bound(self.owner, f)
	}
}

fn add_ns(data: &mut VNodeData, children: Option<&mut Vec<VNode>>, sel: &str) {
	data.ns = Some(SVG_NAMESPACE.into());
	if sel != "foreignObject" {
		for child in children.into_iter().flatten() {
			if let Some(child_sel) = child.sel.clone() {
				add_ns(&mut child.data, child.children.as_mut(), &child_sel);
			}
		}
	}
}

//! Keyed reconciliation of VNode trees against the DOM.

use crate::{
	dom::{DomError, Listener},
	engine::PatchTarget,
	modules::MODULES,
	vnode::{Handler, Map, Selector, VNode},
	Engine, Error, NodeId, Result, VmId,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span};

/// VMs whose host VNodes were created during one patch, in creation order.
type InsertQueue = Vec<VmId>;

/// The single DOM listener of an element, which looks up the current handler at dispatch time.
#[derive(Clone)]
pub(crate) struct ElementListener {
	handlers: Rc<RefCell<Map<Handler>>>,
	listener: Listener,
}
impl ElementListener {
	pub(crate) fn new() -> Self {
		let handlers: Rc<RefCell<Map<Handler>>> = Rc::default();
		let listener = Listener::new({
			let handlers = handlers.clone();
			move |event| {
				let handler = handlers.borrow().get(event.kind()).cloned();
				if let Some(handler) = handler {
					handler.call(event)
				}
			}
		});
		Self { handlers, listener }
	}

	pub(crate) fn set_handlers(&self, handlers: Map<Handler>) {
		*self.handlers.borrow_mut() = handlers;
	}

	pub(crate) fn listener(&self) -> &Listener {
		&self.listener
	}
}
impl Debug for ElementListener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ElementListener")
			.field("handlers", &self.handlers.borrow().len())
			.field("listener", &self.listener)
			.finish()
	}
}

pub(crate) fn elm_of(vnode: &VNode) -> Result<NodeId> {
	vnode.elm.ok_or_else(|| DomError::Other("VNode was never realized".to_owned()).into())
}

/// Logs adapter failures before they are propagated.
pub(crate) fn logged<T>(result: core::result::Result<T, DomError>) -> Result<T> {
	result.map_err(|error| {
		error!(%error, "DOM operation failed");
		Error::Dom(error)
	})
}

fn is_same(old: &Option<VNode>, vnode: &VNode) -> bool {
	old.as_ref().map_or(false, |old| old.same(vnode))
}

impl Engine {
	/// Reconciles `vnode` against `old`, realizing it in the DOM.
	///
	/// If the two aren't the [same](`VNode::same`) node, `vnode` is created and takes `old`'s place.
	/// Components created along the way are inserted (and thereby rendered) before this returns.
	#[instrument(skip(self, old, vnode))]
	pub fn patch(&mut self, old: PatchTarget, vnode: &mut VNode) -> Result<()> {
		for module in MODULES {
			module.pre(self)?;
		}
		let mut queue = InsertQueue::new();
		let old = match old {
			PatchTarget::Element(element) => self.empty_node_at(element)?,
			PatchTarget::VNode(old) => old,
		};

		if old.same(vnode) {
			self.patch_vnode(&mut queue, old, vnode)?;
		} else {
			let elm = elm_of(&old)?;
			let parent = self.dom.parent_node(elm);
			self.create_elm(&mut queue, vnode)?;
			if let Some(parent) = parent {
				let next = self.dom.next_sibling(elm);
				logged(self.dom.insert_before(parent, elm_of(vnode)?, next))?;
				self.remove_vnodes(parent, vec![old])?;
			}
		}

		for vm in queue {
			self.insert_vm(vm)?;
		}
		for module in MODULES {
			module.post(self)?;
		}
		Ok(())
	}

	fn empty_node_at(&self, element: NodeId) -> Result<VNode> {
		let mut sel = self.dom.tag_name(element).ok_or(Error::UnknownNode(element))?.to_ascii_lowercase();
		if let Some(id) = self.dom.get_attribute(element, "id").filter(|id| !id.is_empty()) {
			sel.push('#');
			sel.push_str(&id);
		}
		if let Some(class_name) = self.dom.get_attribute(element, "class") {
			for class in class_name.split_whitespace() {
				sel.push('.');
				sel.push_str(class);
			}
		}
		Ok(VNode {
			sel: Some(sel.into()),
			children: Some(Vec::new()),
			elm: Some(element),
			..VNode::default()
		})
	}

	fn create_elm(&mut self, queue: &mut InsertQueue, vnode: &mut VNode) -> Result<()> {
		let sel = match vnode.sel.clone() {
			None => {
				let text = vnode.text.as_deref().unwrap_or_default();
				let elm = self.dom.create_text_node(text);
				if cfg!(feature = "dangerous-logging") {
					trace!(?elm, text, "Created text node");
				}
				vnode.elm = Some(elm);
				if let Some(owner) = vnode.owner {
					self.owners.insert(elm, owner);
				}
				return Ok(());
			}
			Some(sel) if &*sel == "!" => {
				vnode.elm = Some(self.dom.create_comment(vnode.text.as_deref().unwrap_or_default()));
				return Ok(());
			}
			Some(sel) => sel,
		};
		let span = trace_span!("Creating element", sel = &*sel);
		let _enter = span.enter();

		let selector = Selector::parse(&sel);
		let elm = logged(match &vnode.data.ns {
			Some(ns) => self.dom.create_element_ns(ns, selector.tag),
			None => self.dom.create_element(selector.tag),
		})?;
		if let Some(id) = selector.id {
			logged(self.dom.set_attribute(elm, "id", id))?;
		}
		if selector.classes.is_some() {
			let class_name = selector.class_names().collect::<Vec<_>>().join(" ");
			logged(self.dom.set_attribute(elm, "class", &class_name))?;
		}
		vnode.elm = Some(elm);

		let empty = VNode::default();
		for module in MODULES {
			module.create(self, &empty, vnode)?;
		}

		if let Some(children) = &mut vnode.children {
			for child in children {
				self.create_elm(queue, child)?;
				logged(self.dom.append_child(elm, elm_of(child)?))?;
			}
		} else if let Some(text) = &vnode.text {
			let text = self.dom.create_text_node(text);
			logged(self.dom.append_child(elm, text))?;
		}

		if let (Some(vm), false) = (vnode.vm, vnode.is_root) {
			queue.push(vm);
		}
		Ok(())
	}

	fn add_vnodes(&mut self, queue: &mut InsertQueue, parent: NodeId, before: Option<NodeId>, vnodes: &mut [VNode]) -> Result<()> {
		for vnode in vnodes {
			self.create_elm(queue, vnode)?;
			logged(self.dom.insert_before(parent, elm_of(vnode)?, before))?;
		}
		Ok(())
	}

	/// Removes element VNodes through the deferred removal table, text VNodes right away.
	///
	/// An element is detached once its own count, one count per module and the count of its `on_remove` hook are all released.
	fn remove_vnodes(&mut self, parent: NodeId, vnodes: Vec<VNode>) -> Result<()> {
		for vnode in vnodes {
			let elm = elm_of(&vnode)?;
			if vnode.sel.is_none() {
				self.owners.remove(&elm);
				logged(self.dom.remove_child(parent, elm))?;
				continue;
			}

			self.invoke_destroy_hook(&vnode)?;
			#[allow(clippy::cast_possible_truncation)]
			let count = 1 + MODULES.len() as u16 + u16::from(vnode.data.on_remove.is_some());
			if let Err(error) = self.removals.add_or_insert_with(elm, count, || ()) {
				error!(%error, ?elm, "Too many pending removals");
			}
			for module in MODULES {
				module.remove(self, &vnode)?;
			}
			if let Some(hook) = &vnode.data.on_remove {
				trace!(?elm, "Deferring removal");
				hook.call(elm);
			}
			self.complete_removal(elm)?;
		}
		Ok(())
	}

	/// Runs destroy hooks over `vnode`'s subtree, including component fragments.
	pub(crate) fn invoke_destroy_hook(&mut self, vnode: &VNode) -> Result<()> {
		if vnode.sel.is_none() {
			if let Some(elm) = vnode.elm {
				self.owners.remove(&elm);
			}
			return Ok(());
		}

		if let Some(vm) = vnode.vm {
			match self.vm(vm).map(|vm| vm.state.idx()) {
				Ok(0) if !vnode.is_root => self.release_vm(vm),
				Ok(0) | Err(_) => (),
				Ok(_) => self.destroy_vm(vm)?,
			}
		}
		for module in MODULES {
			module.destroy(self, vnode)?;
		}
		for child in vnode.children.iter().flatten() {
			self.invoke_destroy_hook(child)?;
		}

		if let Some(vm) = vnode.vm {
			let fragment = match self.vm_mut(vm) {
				Ok(vm) => core::mem::take(&mut vm.fragment),
				Err(_) => return Ok(()),
			};
			let result = fragment.iter().try_for_each(|child| self.invoke_destroy_hook(child));
			if let Ok(vm) = self.vm_mut(vm) {
				vm.fragment = fragment;
			}
			result?;
		}
		Ok(())
	}

	/// Four-pointer keyed child reconciliation.
	fn update_children(&mut self, queue: &mut InsertQueue, parent: NodeId, old_ch: Vec<VNode>, new_ch: &mut [VNode]) -> Result<()> {
		let span = trace_span!("Updating children", old = old_ch.len(), new = new_ch.len());
		let _enter = span.enter();

		let mut old_ch: Vec<Option<VNode>> = old_ch.into_iter().map(Some).collect();
		let (mut old_start, mut old_end) = (0, old_ch.len());
		let (mut new_start, mut new_end) = (0, new_ch.len());
		let mut keys: Option<HashMap<Rc<str>, usize>> = None;

		while old_start < old_end && new_start < new_end {
			if old_ch[old_start].is_none() {
				old_start += 1;
			} else if old_ch[old_end - 1].is_none() {
				old_end -= 1;
			} else if is_same(&old_ch[old_start], &new_ch[new_start]) {
				let old = old_ch[old_start].take().ok_or_else(missing)?;
				self.patch_vnode(queue, old, &mut new_ch[new_start])?;
				old_start += 1;
				new_start += 1;
			} else if is_same(&old_ch[old_end - 1], &new_ch[new_end - 1]) {
				let old = old_ch[old_end - 1].take().ok_or_else(missing)?;
				self.patch_vnode(queue, old, &mut new_ch[new_end - 1])?;
				old_end -= 1;
				new_end -= 1;
			} else if is_same(&old_ch[old_start], &new_ch[new_end - 1]) {
				// Moved right.
				let old_end_elm = old_ch[old_end - 1].as_ref().map(elm_of).ok_or_else(missing)??;
				let old = old_ch[old_start].take().ok_or_else(missing)?;
				self.patch_vnode(queue, old, &mut new_ch[new_end - 1])?;
				let next = self.dom.next_sibling(old_end_elm);
				logged(self.dom.insert_before(parent, elm_of(&new_ch[new_end - 1])?, next))?;
				old_start += 1;
				new_end -= 1;
			} else if is_same(&old_ch[old_end - 1], &new_ch[new_start]) {
				// Moved left.
				let old_start_elm = old_ch[old_start].as_ref().map(elm_of).ok_or_else(missing)??;
				let old = old_ch[old_end - 1].take().ok_or_else(missing)?;
				self.patch_vnode(queue, old, &mut new_ch[new_start])?;
				logged(self.dom.insert_before(parent, elm_of(&new_ch[new_start])?, Some(old_start_elm)))?;
				old_end -= 1;
				new_start += 1;
			} else {
				let key_map = keys.get_or_insert_with(|| {
					old_ch[old_start..old_end]
						.iter()
						.enumerate()
						.filter_map(|(offset, old)| Some((old.as_ref()?.key()?.clone(), old_start + offset)))
						.collect()
				});
				let old_start_elm = old_ch[old_start].as_ref().map(elm_of).ok_or_else(missing)??;
				let index = new_ch[new_start].key().and_then(|key| key_map.get(key)).copied();
				match index {
					Some(index) if is_same(&old_ch[index], &new_ch[new_start]) => {
						let old = old_ch[index].take().ok_or_else(missing)?;
						self.patch_vnode(queue, old, &mut new_ch[new_start])?;
					}
					_ => self.create_elm(queue, &mut new_ch[new_start])?,
				}
				logged(self.dom.insert_before(parent, elm_of(&new_ch[new_start])?, Some(old_start_elm)))?;
				new_start += 1;
			}
		}

		if old_start >= old_end {
			let before = new_ch.get(new_end).and_then(|vnode| vnode.elm);
			self.add_vnodes(queue, parent, before, &mut new_ch[new_start..new_end])?;
		} else if new_start >= new_end {
			let removed = old_ch[old_start..old_end].iter_mut().filter_map(Option::take).collect();
			self.remove_vnodes(parent, removed)?;
		}
		Ok(())
	}

	fn patch_vnode(&mut self, queue: &mut InsertQueue, old: VNode, vnode: &mut VNode) -> Result<()> {
		let elm = elm_of(&old)?;
		vnode.elm = Some(elm);
		if vnode.sel.is_some() {
			for module in MODULES {
				module.update(self, &old, vnode)?;
			}
		}

		let VNode {
			children: old_children,
			text: old_text,
			..
		} = old;
		if vnode.ctor.is_some() {
			if let Some(vm) = vnode.vm {
				self.apply_pending_fragment(queue, vm, elm)?;
			}
		} else if let Some(text) = vnode.text.clone() {
			if old_text.as_deref() != Some(&*text) {
				if let Some(old_children) = old_children {
					self.remove_vnodes(elm, old_children)?;
				}
				if cfg!(feature = "dangerous-logging") {
					trace!(?elm, text = &*text, "Updated text");
				}
				self.dom.set_text_content(elm, &text);
			}
		} else {
			match (old_children, &mut vnode.children) {
				(Some(old_children), Some(children)) => self.update_children(queue, elm, old_children, children)?,
				(None, Some(children)) => {
					if old_text.is_some() {
						self.dom.set_text_content(elm, "");
					}
					self.add_vnodes(queue, elm, None, children)?;
				}
				(Some(old_children), None) => self.remove_vnodes(elm, old_children)?,
				(None, None) => {
					if old_text.is_some() {
						self.dom.set_text_content(elm, "");
					}
				}
			}
		}

		if let (Some(vm), false) = (vnode.vm, vnode.is_root) {
			if self.vm(vm)?.state.idx() == 0 {
				queue.push(vm);
			}
		}
		Ok(())
	}

	/// Reconciles a component's latest render output into its host.
	fn apply_pending_fragment(&mut self, queue: &mut InsertQueue, vm: VmId, elm: NodeId) -> Result<()> {
		let vm_ref = self.vm_mut(vm)?;
		let mut fragment = match vm_ref.pending.take() {
			Some(fragment) => fragment,
			None => return Ok(()),
		};
		let old_fragment = core::mem::take(&mut vm_ref.fragment);
		let result = self.update_children(queue, elm, old_fragment, &mut fragment);
		self.vm_mut(vm)?.fragment = fragment;
		result
	}
}

fn missing() -> Error {
	DomError::Other("Child slot vanished during reconciliation".to_owned()).into()
}

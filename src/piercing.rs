//! Mediated node access across component boundaries.
//!
//! Components don't get to walk the DOM freely. Instead, they [`pierce`](`crate::Context::pierce`) nodes
//! and [`reach`](`crate::Context::reach`) through them, with each step passing through the piercing hooks of all registered services.
//! The default hook, which is always installed first, keeps a component inside the part of the tree it owns.

use crate::{reactive::ReplicaTable, Engine, Error, NodeId, Result, VmId};
use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;
use tracing::{instrument, trace};

/// A node property a component may reach for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeProperty {
	ParentNode,
	ParentElement,
	NextSibling,
	ChildNodes,
	QuerySelector(Rc<str>),
	QuerySelectorAll(Rc<str>),
}

/// The (possibly substituted) result of reaching through a [`Pierced`] node.
#[derive(Debug, Clone, PartialEq)]
pub enum Reached {
	Nothing,
	Node(Pierced),
	Nodes(Vec<Pierced>),
	/// The shadow root of a VM, standing in for its host element as parent.
	ShadowRoot(VmId),
	/// A VM's component, standing in for its own host element.
	Component(VmId),
}

/// A node handle specific to one VM, stable for as long as it is held.
#[derive(Clone)]
pub struct Pierced(Rc<PiercedInner>);

pub(crate) struct PiercedInner {
	node: NodeId,
	vm: VmId,
}

impl Pierced {
	#[must_use]
	pub fn node(&self) -> NodeId {
		self.0.node
	}

	#[must_use]
	pub fn vm(&self) -> VmId {
		self.0.vm
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl PartialEq for Pierced {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}
impl Debug for Pierced {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Pierced").field("node", &self.0.node).field("vm", &self.0.vm).finish()
	}
}

/// One VM's memo of [`Pierced`] replicas.
#[derive(Default)]
pub(crate) struct PiercingMembrane {
	replicas: ReplicaTable<NodeId, PiercedInner>,
}
impl PiercingMembrane {
	fn pierce(&mut self, vm: VmId, node: NodeId) -> Pierced {
		Pierced(
			self.replicas
				.get_or_insert_with(node, |replica| replica.vm == vm, || Rc::new(PiercedInner { node, vm })),
		)
	}

	pub(crate) fn purge(&mut self) -> usize {
		self.replicas.purge()
	}
}

/// What a piercing hook gets to see.
pub struct PiercingContext<'a> {
	engine: &'a Engine,
	vm: VmId,
	host: Option<NodeId>,
	target: NodeId,
}
impl<'a> PiercingContext<'a> {
	/// The VM doing the piercing.
	#[must_use]
	pub fn vm(&self) -> VmId {
		self.vm
	}

	/// That VM's host element.
	#[must_use]
	pub fn host(&self) -> Option<NodeId> {
		self.host
	}

	/// The node reached through.
	#[must_use]
	pub fn target(&self) -> NodeId {
		self.target
	}

	/// The VM whose render created `node`, if any.
	#[must_use]
	pub fn owner_of(&self, node: NodeId) -> Option<VmId> {
		self.engine.owner_of(node)
	}

	#[must_use]
	pub fn dom(&self) -> &'a dyn crate::DomAdapter {
		self.engine.dom()
	}
}

fn default_piercing(cx: &PiercingContext<'_>, property: &NodeProperty, value: &Reached) -> Option<Reached> {
	let target_owner = cx.owner_of(cx.target());
	match (property, value) {
		(NodeProperty::QuerySelector(_) | NodeProperty::QuerySelectorAll(_), Reached::Nodes(nodes)) => {
			let scope = if Some(cx.target()) == cx.host() {
				Some(cx.vm())
			} else {
				target_owner
			};
			Some(Reached::Nodes(
				nodes.iter().filter(|node| cx.owner_of(node.node()) == scope).cloned().collect(),
			))
		}
		(NodeProperty::ParentNode | NodeProperty::ParentElement, Reached::Node(parent)) => {
			if Some(parent.node()) == cx.host() {
				Some(Reached::ShadowRoot(cx.vm()))
			} else if cx.owner_of(parent.node()) != target_owner {
				Some(Reached::Nothing)
			} else {
				None
			}
		}
		(_, Reached::Node(node)) if Some(node.node()) == cx.host() => Some(Reached::Component(cx.vm())),
		(_, Reached::Nodes(nodes)) if nodes.iter().any(|node| Some(node.node()) == cx.host()) => Some(Reached::Nodes(
			nodes.iter().filter(|node| Some(node.node()) != cx.host()).cloned().collect(),
		)),
		_ => None,
	}
}

impl Engine {
	pub(crate) fn pierce(&mut self, vm: VmId, node: NodeId) -> Result<Pierced> {
		Ok(self.vm_mut(vm)?.piercing.get_or_insert_with(Default::default).pierce(vm, node))
	}

	#[instrument(skip(self))]
	pub(crate) fn reach(&mut self, vm: VmId, target: &Pierced, property: NodeProperty) -> Result<Reached> {
		if target.vm() != vm {
			return Err(Error::UnknownNode(target.node()));
		}
		let node = target.node();
		let raw = match &property {
			NodeProperty::ParentNode => self.dom.parent_node(node).map(|parent| vec![parent]),
			NodeProperty::ParentElement => self
				.dom
				.parent_node(node)
				.filter(|&parent| self.dom.is_element(parent))
				.map(|parent| vec![parent]),
			NodeProperty::NextSibling => self.dom.next_sibling(node).map(|sibling| vec![sibling]),
			NodeProperty::ChildNodes | NodeProperty::QuerySelector(_) | NodeProperty::QuerySelectorAll(_) => None,
		};
		let mut value = match (&property, raw) {
			(_, Some(nodes)) => Reached::Node(self.pierce(vm, nodes[0])?),
			(NodeProperty::ChildNodes, None) => {
				let children = self.dom.child_nodes(node);
				Reached::Nodes(self.pierce_all(vm, children)?)
			}
			(NodeProperty::QuerySelector(selector) | NodeProperty::QuerySelectorAll(selector), None) => {
				let matches = self.dom.query_selector_all(node, selector);
				Reached::Nodes(self.pierce_all(vm, matches)?)
			}
			(_, None) => Reached::Nothing,
		};

		let hooks = self.services.piercing().to_vec();
		let cx = PiercingContext {
			engine: &*self,
			vm,
			host: self.vm(vm)?.vnode.elm,
			target: node,
		};
		if let Some(substitute) = default_piercing(&cx, &property, &value) {
			value = substitute;
		}
		for hook in hooks {
			if let Some(substitute) = hook(&cx, &property, &value) {
				trace!(?substitute, "Substituted");
				value = substitute;
			}
		}

		Ok(match (property, value) {
			(NodeProperty::QuerySelector(_), Reached::Nodes(nodes)) => nodes.into_iter().next().map_or(Reached::Nothing, Reached::Node),
			(_, value) => value,
		})
	}

	fn pierce_all(&mut self, vm: VmId, nodes: Vec<NodeId>) -> Result<Vec<Pierced>> {
		nodes.into_iter().map(|node| self.pierce(vm, node)).collect()
	}
}

//! The [`Engine`]: owner of all VMs and the entry points for mounting components.

use crate::{
	component::ComponentDef,
	dom::{DomAdapter, Event},
	error::Callback,
	rc_hash_map::RcHashMap,
	reactive::ReactiveMembrane,
	scheduler::{Scheduler, Task},
	services::{Service, ServiceHook, Services},
	vm::Vm,
	vnode::{VNode, VNodeData},
	Error, NodeId, Result, Value, VmId,
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span, warn, Level};

/// What to [`patch`](`Engine::patch`) against.
#[derive(Debug, Clone)]
pub enum PatchTarget {
	/// An existing element, for the first mount.
	Element(NodeId),
	VNode(VNode),
}
impl From<VNode> for PatchTarget {
	fn from(vnode: VNode) -> Self {
		Self::VNode(vnode)
	}
}

/// Configures an [`Engine`].
pub struct EngineBuilder {
	dom: Box<dyn DomAdapter>,
	tick_handler: Option<Box<dyn Fn()>>,
	services: Vec<Service>,
}
impl EngineBuilder {
	/// Called once each time work is queued for an empty next tick.
	#[must_use]
	pub fn tick_handler(mut self, handler: impl 'static + Fn()) -> Self {
		self.tick_handler = Some(Box::new(handler));
		self
	}

	#[must_use]
	pub fn service(mut self, service: Service) -> Self {
		self.services.push(service);
		self
	}

	#[must_use]
	pub fn build(self) -> Engine {
		let scheduler = Scheduler::new();
		if let Some(handler) = self.tick_handler {
			scheduler.set_tick_handler(handler);
		}
		let mut services = Services::default();
		for service in self.services {
			services.register(service);
		}
		Engine {
			dom: self.dom,
			membrane: ReactiveMembrane::new(scheduler.clone()),
			scheduler,
			vms: HashMap::new(),
			last_uid: 0,
			services,
			owners: HashMap::new(),
			hosts: HashMap::new(),
			removals: RcHashMap::new(),
			insertion_counter: 0,
		}
	}
}

/// Renders components into a [`DomAdapter`] and keeps them up to date.
///
/// All deferred work (rehydration and life-cycle callbacks) runs in [`Engine::tick`],
/// which the embedder should call whenever the tick handler fired and the current synchronous work is done.
pub struct Engine {
	pub(crate) dom: Box<dyn DomAdapter>,
	pub(crate) scheduler: Scheduler,
	pub(crate) membrane: ReactiveMembrane,
	/// Live VMs only. Released VMs are removed.
	pub(crate) vms: HashMap<VmId, Vm>,
	pub(crate) last_uid: u32,
	pub(crate) services: Services,
	/// Rendered node → the VM that rendered it.
	pub(crate) owners: HashMap<NodeId, VmId>,
	/// Host element → its VM.
	pub(crate) hosts: HashMap<NodeId, VmId>,
	pub(crate) removals: RcHashMap<NodeId, u16, ()>,
	pub(crate) insertion_counter: u32,
}

impl Engine {
	pub fn builder(dom: impl 'static + DomAdapter) -> EngineBuilder {
		EngineBuilder {
			dom: Box::new(dom),
			tick_handler: None,
			services: Vec::new(),
		}
	}

	pub fn new(dom: impl 'static + DomAdapter) -> Self {
		Self::builder(dom).build()
	}

	#[must_use]
	pub fn dom(&self) -> &dyn DomAdapter {
		&*self.dom
	}

	pub fn dom_mut(&mut self) -> &mut dyn DomAdapter {
		&mut *self.dom
	}

	#[must_use]
	pub fn scheduler(&self) -> &Scheduler {
		&self.scheduler
	}

	#[must_use]
	pub fn membrane(&self) -> &ReactiveMembrane {
		&self.membrane
	}

	pub fn register_service(&mut self, service: Service) {
		self.services.register(service)
	}

	/// Drops all deferred work and pending removals.
	pub fn reset(&mut self) {
		self.scheduler.reset();
		self.removals.clear();
	}

	/// The VM whose render created `node`.
	#[must_use]
	pub fn owner_of(&self, node: NodeId) -> Option<VmId> {
		self.owners.get(&node).copied()
	}

	/// The VM hosted by `element`.
	#[must_use]
	pub fn vm_of(&self, element: NodeId) -> Option<VmId> {
		self.hosts.get(&element).copied()
	}

	/// How many VMs are alive, mounted or not.
	#[must_use]
	pub fn vm_count(&self) -> usize {
		self.vms.len()
	}

	/// The insertion index of a mounted VM, `0` while unmounted.
	#[must_use]
	pub fn insertion_index(&self, vm: VmId) -> Option<u32> {
		self.vm(vm).ok().map(|vm| vm.state.idx())
	}

	#[must_use]
	pub fn is_dirty(&self, vm: VmId) -> Option<bool> {
		self.vm(vm).ok().map(|vm| vm.state.is_dirty())
	}

	#[must_use]
	pub fn is_scheduled(&self, vm: VmId) -> Option<bool> {
		self.vm(vm).ok().map(|vm| vm.state.is_scheduled())
	}

	/// Marks `vm` dirty and schedules its rehydration, even if it is dirty already.
	pub fn mark_dirty(&mut self, vm: VmId) -> Result<()> {
		let state = self.vm(vm)?.state.clone();
		state.set_dirty(true);
		self.scheduler.schedule_rehydration(&state);
		Ok(())
	}

	/// Runs all deferred work, including work queued while doing so.
	///
	/// Every task runs even if an earlier one fails. The first error is returned, later ones are logged.
	#[instrument(skip(self))]
	pub fn tick(&mut self) -> Result<()> {
		let mut first_error = None;
		loop {
			let tasks = self.scheduler.take_tasks();
			if tasks.is_empty() {
				break;
			}
			for task in tasks {
				if let Err(error) = self.run_task(task) {
					if first_error.is_none() {
						first_error = Some(error);
					} else {
						error!(?task, %error, "Deferred task failed");
					}
				}
			}
		}
		self.collect_garbage();
		first_error.map_or(Ok(()), Err)
	}

	fn run_task(&mut self, task: Task) -> Result<()> {
		let span = trace_span!("Running task", ?task);
		let _enter = span.enter();

		match task {
			Task::FlushRehydration => self.flush_rehydration_queue(),
			Task::Connected(vm) if self.vm(vm).is_ok() => self.with_component(vm, Callback::Connected, |component, cx| component.connected(cx)),
			Task::Disconnected(vm) if self.vm(vm).is_ok() => self.with_component(vm, Callback::Disconnected, |component, cx| component.disconnected(cx)),
			Task::Rendered(vm) if self.vm(vm).is_ok() => self.with_component(vm, Callback::Rendered, |component, cx| component.rendered(cx)),
			Task::Service(hook, vm) if self.vm(vm).is_ok() => self.invoke_service_hook(vm, hook),
			Task::Release(vm) => {
				// Re-inserted in the meantime, or a root that may be appended again.
				if let Ok(vm_ref) = self.vm(vm) {
					if vm_ref.state.idx() == 0 && !vm_ref.vnode.is_root {
						self.release_vm(vm);
					}
				}
				Ok(())
			}
			Task::Connected(vm) | Task::Disconnected(vm) | Task::Rendered(vm) | Task::Service(_, vm) => {
				trace!(?vm, "Skipped task of released VM");
				Ok(())
			}
		}
	}

	/// Rehydrates each queued VM, ancestors first.
	fn flush_rehydration_queue(&mut self) -> Result<()> {
		let mut first_error = None;
		for state in self.scheduler.take_rehydration_queue() {
			if let Err(error) = self.rehydrate(&state) {
				if first_error.is_none() {
					first_error = Some(error);
				} else {
					error!(vm = ?state.id, %error, "Rehydration failed");
				}
			}
		}
		first_error.map_or(Ok(()), Err)
	}

	pub(crate) fn invoke_service_hook(&mut self, vm: VmId, hook: ServiceHook) -> Result<()> {
		let callbacks = self.services.hooks(hook).to_vec();
		if callbacks.is_empty() {
			return Ok(());
		}
		let vm_ref = self.vm(vm)?;
		let cx = crate::services::ServiceContext {
			vm,
			element: vm_ref.vnode.elm,
			def: &vm_ref.def,
			context: &vm_ref.context,
			wired: &vm_ref.wired,
		};
		for callback in callbacks {
			callback(&cx)
		}
		Ok(())
	}

	fn collect_garbage(&mut self) {
		self.membrane.collect_garbage();
		for vm in self.vms.values_mut() {
			if let Some(piercing) = &mut vm.piercing {
				piercing.purge();
			}
		}
	}

	/// Creates an element, upgraded to a root component if `def` is given.
	#[instrument(skip(self, def))]
	pub fn create_element(&mut self, tag: &str, def: Option<&Rc<ComponentDef>>) -> Result<NodeId> {
		let element = self.dom.create_element(tag).map_err(|error| {
			error!(%error, "Failed to create element");
			error
		})?;
		if let Some(def) = def {
			self.upgrade_element(element, Some(def))?;
		}
		Ok(element)
	}

	/// Turns an existing element into the host of a new root VM.
	///
	/// Declared props are picked up from the element's DOM properties. The component renders once the element is
	/// [appended](`Engine::append_child`) or [inserted](`Engine::insert_before`) through the engine.
	#[instrument(skip(self, def))]
	pub fn upgrade_element(&mut self, element: NodeId, def: Option<&Rc<ComponentDef>>) -> Result<VmId> {
		let tag = self
			.dom
			.tag_name(element)
			.ok_or(Error::UnknownNode(element))?
			.to_ascii_lowercase();
		let def = def.ok_or_else(|| Error::InvalidComponentDefinition { tag: tag.clone() })?;
		if let Some(vm) = self.vm_of(element) {
			warn!(?vm, "Element is already upgraded");
			return Ok(vm);
		}

		let mut data = VNodeData::new();
		for prop in def.props() {
			let value = self.dom.get_property(element, &prop.name);
			if !value.is_undefined() {
				data.component_props.insert(prop.name.clone(), value);
			}
		}
		if let Some(class_name) = self.dom.get_attribute(element, "class") {
			data = data.class_name(&class_name);
		}
		let mut vnode = VNode {
			sel: Some(tag.as_str().into()),
			data,
			ctor: Some(def.clone()),
			is_root: true,
			..VNode::default()
		};
		let placeholder = VNode {
			sel: Some(tag.into()),
			children: Some(Vec::new()),
			elm: Some(element),
			ctor: Some(def.clone()),
			..VNode::default()
		};
		self.patch(PatchTarget::VNode(placeholder), &mut vnode)?;
		vnode.vm.ok_or(Error::UnknownNode(element))
	}

	/// Reads an attribute of an element.
	#[must_use]
	pub fn get_attribute(&self, element: NodeId, name: &str) -> Option<String> {
		self.dom.get_attribute(element, name)
	}

	/// Sets an attribute, notifying a root component that observes it.
	///
	/// Attributes that shadow a public property of a root component are ignored.
	#[instrument(skip(self, value))]
	pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<()> {
		self.change_root_attribute(element, name, Some(value))
	}

	/// Removes an attribute, notifying a root component that observes it.
	#[instrument(skip(self))]
	pub fn remove_attribute(&mut self, element: NodeId, name: &str) -> Result<()> {
		self.change_root_attribute(element, name, None)
	}

	fn change_root_attribute(&mut self, element: NodeId, name: &str, value: Option<&str>) -> Result<()> {
		let root = self.vm_of(element).filter(|&vm| self.vm(vm).map_or(false, |vm| vm.vnode.is_root));
		if let Some(vm) = root {
			let def = self.vm(vm)?.def.clone();
			let prop_name = crate::component::prop_name_from_attr(name);
			if def.prop_def(&prop_name).is_some() {
				warn!(?vm, name, "Ignored attribute backed by a public property. Set the property instead.");
				return Ok(());
			}
			let old = self.dom.get_attribute(element, name);
			self.set_dom_attribute(element, name, value)?;
			let new = self.dom.get_attribute(element, name);
			if def.observes(name) && old != new {
				let (old, new) = (Value::from(old), Value::from(new));
				self.with_component(vm, Callback::AttributeChanged, |component, cx| {
					component.attribute_changed(cx, name, &old, &new)
				})?;
			}
			Ok(())
		} else {
			self.set_dom_attribute(element, name, value)
		}
	}

	fn set_dom_attribute(&mut self, element: NodeId, name: &str, value: Option<&str>) -> Result<()> {
		match value {
			Some(value) => self.dom.set_attribute(element, name, value),
			None => self.dom.remove_attribute(element, name),
		}
		.map_err(|error| {
			error!(%error, "Attribute update failed");
			error.into()
		})
	}

	/// Writes a public property of a root component through the controlled update path.
	#[instrument(skip(self, value))]
	pub fn set_prop(&mut self, element: NodeId, name: &str, value: Value) -> Result<()> {
		let vm = self.vm_of(element).ok_or(Error::UnknownNode(element))?;
		self.update_component_prop(vm, name, value)
	}

	/// Reads a public property of a component, through its custom getter if it has one.
	pub fn get_prop(&mut self, element: NodeId, name: &str) -> Result<Value> {
		let vm = self.vm_of(element).ok_or(Error::UnknownNode(element))?;
		self.component_prop(vm, name)
	}

	/// Appends `child`, connecting it if it hosts a root component.
	#[instrument(skip(self))]
	pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
		self.insert_before(parent, child, None)
	}

	/// Inserts `node`, connecting it if it hosts a root component.
	#[instrument(skip(self))]
	pub fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<()> {
		self.dom.insert_before(parent, node, reference).map_err(|error| {
			error!(%error, "Insertion failed");
			error
		})?;
		if let Some(vm) = self.root_vm(node) {
			self.insert_vm(vm)?;
		}
		Ok(())
	}

	/// Removes `child`, disconnecting it if it hosts a root component.
	#[instrument(skip(self))]
	pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
		self.dom.remove_child(parent, child).map_err(|error| {
			error!(%error, "Removal failed");
			error
		})?;
		if let Some(vm) = self.root_vm(child) {
			if self.vm(vm)?.state.idx() > 0 {
				let vnode = self.vm(vm)?.vnode.clone();
				self.invoke_destroy_hook(&vnode)?;
			}
		}
		Ok(())
	}

	fn root_vm(&self, element: NodeId) -> Option<VmId> {
		self.vm_of(element).filter(|&vm| self.vm(vm).map_or(false, |vm| vm.vnode.is_root))
	}

	/// Dispatches `event` at `node`. It bubbles.
	pub fn dispatch_event(&mut self, node: NodeId, event: &Event) {
		if tracing::level_filters::STATIC_MAX_LEVEL >= Level::TRACE {
			trace!(?node, kind = event.kind(), "Dispatching event");
		}
		self.dom.dispatch_event(node, event)
	}

	/// Releases one deferred count of a removal started for `node`, detaching it once none remain.
	#[instrument(skip(self))]
	pub fn complete_removal(&mut self, node: NodeId) -> Result<()> {
		match self.removals.weak_decrement(&node) {
			Ok(Some(())) => (),
			Ok(None) => {
				warn!("No removal pending");
				return Ok(());
			}
			Err(error) => {
				error!(%error, "Removal already completed");
				return Ok(());
			}
		}
		let drained: Vec<_> = self.removals.drain_weak().map(|(node, ())| node).collect();
		for node in drained {
			if let Some(parent) = self.dom.parent_node(node) {
				trace!(?node, ?parent, "Detaching");
				self.dom.remove_child(parent, node).map_err(|error| {
					error!(%error, "Detaching failed");
					error
				})?;
			}
		}
		Ok(())
	}

	/// Whether `node` is awaiting a deferred removal.
	#[must_use]
	pub fn is_removal_pending(&self, node: NodeId) -> bool {
		self.removals.contains_key(&node)
	}
}
impl Debug for Engine {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Engine")
			.field("scheduler", &self.scheduler)
			.field("membrane", &self.membrane)
			.field("vms", &self.vms.len())
			.field("last_uid", &self.last_uid)
			.field("services", &self.services)
			.field("removals", &self.removals.len())
			.finish_non_exhaustive()
	}
}

//! View-models: one per live component instance, stored in the engine's arena.

use crate::{
	component::{attr_name_from_prop, Component, ComponentDef},
	context::Context,
	dom::{Event, Listener},
	error::{BoxError, Callback},
	piercing::PiercingMembrane,
	scheduler::{Task, VmState},
	services::ServiceHook,
	vnode::{Handler, Map, Slot, VNode},
	Engine, Error, Key, Object, Result, Tracked, Value,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;
use tracing::{error, trace, trace_span, warn};

/// The uid of a VM. Uids increase monotonically in creation order, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmId(u32);
impl VmId {
	#[must_use]
	pub fn uid(self) -> u32 {
		self.0
	}
}

pub(crate) struct Vm {
	pub(crate) state: Rc<VmState>,
	pub(crate) def: Rc<ComponentDef>,
	/// Taken out while one of its callbacks runs.
	pub(crate) component: Option<Box<dyn Component>>,
	/// Shallow snapshot of the host VNode.
	pub(crate) vnode: VNode,
	pub(crate) props: Object,
	pub(crate) tracked_state: Option<Tracked>,
	pub(crate) wired: Tracked,
	pub(crate) context: Object,
	/// Untracked memo space that persists across renders.
	pub(crate) render_cache: Object,
	pub(crate) slots: Map<Slot>,
	pub(crate) classes: Map<bool>,
	pub(crate) events: Rc<RefCell<Map<Vec<Handler>>>>,
	pub(crate) listener: Listener,
	pub(crate) fragment: Vec<VNode>,
	/// Render output not yet reconciled into [`Vm::fragment`].
	pub(crate) pending: Option<Vec<VNode>>,
	pub(crate) piercing: Option<PiercingMembrane>,
}
impl Debug for Vm {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Vm")
			.field("state", &self.state)
			.field("def", &self.def.name())
			.field("elm", &self.vnode.elm)
			.field("fragment", &self.fragment.len())
			.finish_non_exhaustive()
	}
}

fn dispatch_component_event(events: &RefCell<Map<Vec<Handler>>>, event: &Event) {
	let handlers = events.borrow().get(event.kind()).cloned();
	for handler in handlers.into_iter().flatten() {
		handler.call(event);
		if event.immediate_propagation_stopped() {
			break;
		}
	}
}

impl Engine {
	pub(crate) fn vm(&self, vm: VmId) -> Result<&Vm> {
		self.vms.get(&vm).ok_or(Error::UnknownVm(vm))
	}

	pub(crate) fn vm_mut(&mut self, vm: VmId) -> Result<&mut Vm> {
		self.vms.get_mut(&vm).ok_or(Error::UnknownVm(vm))
	}

	/// Creates and constructs the VM for a component VNode.
	pub(crate) fn create_vm(&mut self, vnode: &mut VNode) -> Result<()> {
		let (def, elm) = match (&vnode.ctor, vnode.elm) {
			(Some(def), Some(elm)) => (def.clone(), elm),
			_ => return Ok(()),
		};
		self.last_uid += 1;
		let id = VmId(self.last_uid);
		let span = trace_span!("Creating VM", vm = ?id, component = def.name());
		let _enter = span.enter();

		let events: Rc<RefCell<Map<Vec<Handler>>>> = Rc::default();
		let listener = Listener::new({
			let events = events.clone();
			move |event| dispatch_component_event(&events, event)
		});
		let props = Object::record();
		for prop in def.props() {
			if !prop.default.is_undefined() {
				props.set(&Key::Name(prop.name.clone()), prop.default.clone());
			}
		}
		vnode.vm = Some(id);
		self.vms.insert(id, Vm {
			state: VmState::new(id),
			def: def.clone(),
			component: None,
			vnode: vnode.shallow(),
			props,
			tracked_state: None,
			wired: self.membrane.wrap(Object::record()),
			context: Object::record(),
			render_cache: Object::record(),
			slots: Map::new(),
			classes: Map::new(),
			events,
			listener,
			fragment: Vec::new(),
			pending: None,
			piercing: None,
		});
		self.hosts.insert(elm, id);

		let constructed = {
			let _construction = self.scheduler.enter_construction(id);
			def.construct(&mut Context::new(self, id))
		};
		match constructed {
			Ok(component) => self.vm_mut(id)?.component = Some(component),
			Err(source) => {
				error!(%source, "Construction failed");
				self.release_vm(id);
				return Err(Error::Lifecycle {
					vm: id,
					callback: Callback::Construct,
					source,
				});
			}
		}

		if !def.wired().is_empty() {
			self.invoke_service_hook(id, ServiceHook::Wiring)?;
		}
		Ok(())
	}

	/// Reuses `vm` for a VNode that replaces its previous one.
	pub(crate) fn relink_vm(&mut self, vm: VmId, vnode: &mut VNode) -> Result<()> {
		vnode.vm = Some(vm);
		self.vm_mut(vm)?.vnode = vnode.shallow();
		Ok(())
	}

	pub(crate) fn release_vm(&mut self, vm: VmId) {
		if let Some(released) = self.vms.remove(&vm) {
			trace!(?vm, "Released");
			if let Some(elm) = released.vnode.elm {
				if self.hosts.get(&elm) == Some(&vm) {
					self.hosts.remove(&elm);
				}
			}
			released.state.clear_listeners();
		}
	}

	/// Runs `f` with `vm`'s component taken out of the arena, so that `f` may freely use the engine.
	pub(crate) fn with_component<R>(
		&mut self,
		vm: VmId,
		callback: Callback,
		f: impl FnOnce(&mut dyn Component, &mut Context<'_>) -> core::result::Result<R, BoxError>,
	) -> Result<R> {
		let mut component = self.vm_mut(vm)?.component.take().ok_or(Error::Reentrant(vm))?;
		let result = f(&mut *component, &mut Context::new(self, vm));
		if let Ok(vm) = self.vm_mut(vm) {
			vm.component = Some(component);
		}
		result.map_err(|source| Error::Lifecycle { vm, callback, source })
	}

	pub(crate) fn component_prop(&mut self, vm: VmId, name: &str) -> Result<Value> {
		let vm_ref = self.vm(vm)?;
		match vm_ref.def.prop_def(name) {
			None => {
				warn!(?vm, name, "Unknown public property");
				Ok(Value::Undefined)
			}
			Some(prop) if prop.custom_getter => Ok(vm_ref.component.as_ref().ok_or(Error::Reentrant(vm))?.get_property(name)),
			Some(_) => Ok(vm_ref.props.get(&Key::from(name))),
		}
	}

	/// Writes a public property through its custom setter or into storage, then notifies observers.
	pub(crate) fn update_component_prop(&mut self, vm: VmId, name: &str, value: Value) -> Result<()> {
		let vm_ref = self.vm(vm)?;
		let def = vm_ref.def.clone();
		let prop = match def.prop_def(name) {
			Some(prop) => prop,
			None => {
				warn!(?vm, name, "Ignored unknown public property");
				return Ok(());
			}
		};
		if prop.custom_setter {
			return self.with_component(vm, Callback::PropertySetter, |component, cx| component.set_property(cx, name, value));
		}
		let value = value.unwrap_tracked();
		self.store_component_prop(vm, &def, name, value)
	}

	/// Resets a public property to its declared default.
	pub(crate) fn reset_component_prop(&mut self, vm: VmId, name: &str) -> Result<()> {
		let def = self.vm(vm)?.def.clone();
		let prop = match def.prop_def(name) {
			Some(prop) => prop,
			None => return Ok(()),
		};
		let default = prop.default.clone();
		if prop.custom_setter {
			return self.with_component(vm, Callback::PropertySetter, |component, cx| component.set_property(cx, name, default));
		}
		self.store_component_prop(vm, &def, name, default)
	}

	fn store_component_prop(&mut self, vm: VmId, def: &ComponentDef, name: &str, value: Value) -> Result<()> {
		let props = self.vm(vm)?.props.clone();
		let key = Key::from(name);
		let old = props.get(&key);
		if old == value {
			return Ok(());
		}
		props.set(&key, value.clone());
		trace!(?vm, name, "Updated public property");

		let attribute = attr_name_from_prop(name);
		if def.observes(&attribute) {
			self.with_component(vm, Callback::AttributeChanged, |component, cx| {
				component.attribute_changed(cx, &attribute, &old, &value)
			})?;
		}
		self.membrane.notify(&props, &key);
		Ok(())
	}

	pub(crate) fn attribute_changed(&mut self, vm: VmId, name: &str, old: &Value, new: &Value) -> Result<()> {
		self.with_component(vm, Callback::AttributeChanged, |component, cx| component.attribute_changed(cx, name, old, new))
	}

	pub(crate) fn add_component_slot(&mut self, vm: VmId, name: Rc<str>, slot: Slot) -> Result<()> {
		let vm_ref = self.vm_mut(vm)?;
		vm_ref.slots.insert(name, slot);
		vm_ref.state.set_dirty(true);
		Ok(())
	}

	pub(crate) fn remove_component_slot(&mut self, vm: VmId, name: &str) -> Result<()> {
		let vm_ref = self.vm_mut(vm)?;
		if vm_ref.slots.remove(name).is_some() {
			vm_ref.state.set_dirty(true);
		}
		Ok(())
	}

	/// Registers a component event handler. The first handler of a kind attaches the VM's listener to its host.
	pub(crate) fn add_component_event_listener(&mut self, vm: VmId, kind: &str, handler: Handler) -> Result<()> {
		let vm_ref = self.vm(vm)?;
		let first = {
			let mut events = vm_ref.events.borrow_mut();
			match events.get_mut(kind) {
				Some(handlers) => {
					if handlers.contains(&handler) {
						warn!(?vm, kind, "Ignored duplicate event handler");
						return Ok(());
					}
					handlers.push(handler);
					false
				}
				None => {
					events.insert(kind, vec![handler]);
					true
				}
			}
		};
		if let (true, Some(elm)) = (first, vm_ref.vnode.elm) {
			let listener = vm_ref.listener.clone();
			self.dom.add_event_listener(elm, kind, &listener);
		}
		Ok(())
	}

	pub(crate) fn remove_component_event_listener(&mut self, vm: VmId, kind: &str, handler: &Handler) -> Result<()> {
		let vm_ref = self.vm(vm)?;
		let last = {
			let mut events = vm_ref.events.borrow_mut();
			match events.get_mut(kind) {
				Some(handlers) => {
					handlers.retain(|registered| registered != handler);
					if handlers.is_empty() {
						events.remove(kind);
						true
					} else {
						false
					}
				}
				None => false,
			}
		};
		if let (true, Some(elm)) = (last, vm_ref.vnode.elm) {
			let listener = vm_ref.listener.clone();
			self.dom.remove_event_listener(elm, kind, &listener);
		}
		Ok(())
	}

	/// Renders `vm` into [`Vm::pending`].
	///
	/// The render context is restored whether or not the component succeeds.
	/// On failure, `vm` stays dirty and keeps no subscriptions.
	pub(crate) fn render_component(&mut self, vm: VmId) -> Result<()> {
		let span = trace_span!("Rendering", ?vm);
		let _enter = span.enter();

		let state = self.vm(vm)?.state.clone();
		state.clear_listeners();
		let rendered = {
			let _render = self.scheduler.enter_render(state.clone());
			self.with_component(vm, Callback::Render, |component, cx| component.render(cx))
		};
		let fragment = rendered.map_err(|error| {
			error!(%error, "Render failed");
			state.clear_listeners();
			error
		})?;
		state.set_dirty(false);
		self.vm_mut(vm)?.pending = Some(fragment);

		self.scheduler.add_task(Task::Rendered(vm));
		if self.services.has(ServiceHook::Rehydrated) {
			self.scheduler.add_task(Task::Service(ServiceHook::Rehydrated, vm));
		}
		Ok(())
	}

	/// Re-renders a mounted, dirty VM in place, without involving its parent.
	pub(crate) fn rehydrate(&mut self, state: &Rc<VmState>) -> Result<()> {
		state.set_scheduled(false);
		if state.idx() == 0 || !state.is_dirty() {
			return Ok(());
		}
		let span = trace_span!("Rehydrating", vm = ?state.id);
		let _enter = span.enter();

		let old = self.vm(state.id)?.vnode.clone();
		let mut vnode = old.clone();
		self.patch(old.into(), &mut vnode)
	}

	/// The insert hook: assigns the next insertion index, queues `connected` and renders if needed.
	///
	/// Ancestors are connected before their descendants.
	pub(crate) fn insert_vm(&mut self, vm: VmId) -> Result<()> {
		let state = self.vm(vm)?.state.clone();
		if state.idx() > 0 {
			self.destroy_vm(vm)?;
		}
		self.insertion_counter += 1;
		state.set_idx(self.insertion_counter);
		trace!(?vm, idx = state.idx(), "Inserted");

		self.scheduler.add_task(Task::Connected(vm));
		if self.services.has(ServiceHook::Connected) {
			self.scheduler.add_task(Task::Service(ServiceHook::Connected, vm));
		}
		if state.is_dirty() {
			self.rehydrate(&state)?;
		}
		Ok(())
	}

	/// The destroy hook: unmounts and drops all subscriptions.
	pub(crate) fn destroy_vm(&mut self, vm: VmId) -> Result<()> {
		let state = self.vm(vm)?.state.clone();
		trace!(?vm, "Destroyed");
		state.set_idx(0);
		state.set_dirty(true);
		state.clear_listeners();

		self.scheduler.add_task(Task::Disconnected(vm));
		if self.services.has(ServiceHook::Disconnected) {
			self.scheduler.add_task(Task::Service(ServiceHook::Disconnected, vm));
		}
		self.scheduler.add_task(Task::Release(vm));
		Ok(())
	}
}

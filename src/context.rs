//! A component's handle on its own VM.

use crate::{
	api::Api,
	dom::Event,
	modules::to_attribute_value,
	piercing::{NodeProperty, Pierced, Reached},
	vnode::{Handler, VNode},
	Engine, Error, Key, NodeId, Object, Result, Tracked, Value, VmId,
};
use core::fmt::{self, Debug, Formatter};
use tracing::{trace, warn};

/// Passed to every [`Component`](`crate::Component`) callback.
pub struct Context<'a> {
	engine: &'a mut Engine,
	vm: VmId,
}
impl<'a> Context<'a> {
	pub(crate) fn new(engine: &'a mut Engine, vm: VmId) -> Self {
		Self { engine, vm }
	}

	#[must_use]
	pub fn vm(&self) -> VmId {
		self.vm
	}

	/// VNode constructors that stamp this component as owner.
	#[must_use]
	pub fn api(&self) -> Api {
		Api::new(Some(self.vm))
	}

	/// The host element, once created.
	#[must_use]
	pub fn host(&self) -> Option<NodeId> {
		self.engine.vm(self.vm).ok().and_then(|vm| vm.vnode.elm)
	}

	/// Reads a public property.
	///
	/// During render, this subscribes the component to the property. Objects are returned [tracked](`Tracked`).
	/// Public properties aren't set yet during construction, so this is always [`Value::Undefined`] there.
	///
	/// Props with a custom getter are read from storage too: while a callback runs, the component isn't available to the engine.
	/// Call [`Component::get_property`](`crate::Component::get_property`) on `self` instead.
	pub fn prop(&self, name: &str) -> Value {
		if self.engine.scheduler.is_being_constructed(self.vm) {
			warn!(vm = ?self.vm, name, "Public properties can't be read during construction");
			return Value::Undefined;
		}
		let vm = match self.engine.vm(self.vm) {
			Ok(vm) => vm,
			Err(_) => return Value::Undefined,
		};
		if vm.def.prop_def(name).is_none() {
			warn!(vm = ?self.vm, name, "Unknown public property");
			return Value::Undefined;
		}

		let key = Key::from(name);
		if let Some(rendering) = self.engine.scheduler.vm_being_rendered() {
			if rendering.id == self.vm {
				self.engine.membrane.subscribe(&rendering, &vm.props, &key);
			}
		}
		match vm.props.get(&key) {
			Value::Object(object) => Value::Tracked(self.engine.membrane.wrap(object)),
			value => value,
		}
	}

	/// Initializes a public property. Only allowed during construction.
	pub fn set_prop(&mut self, name: &str, value: impl Into<Value>) -> bool {
		if !self.engine.scheduler.is_being_constructed(self.vm) {
			warn!(vm = ?self.vm, name, "Public properties are read-only to their component");
			return false;
		}
		match self.engine.vm(self.vm) {
			Ok(vm) if vm.def.prop_def(name).is_some() => {
				vm.props.set(&Key::from(name), value.into().unwrap_tracked());
				true
			}
			Ok(_) => {
				warn!(vm = ?self.vm, name, "Unknown public property");
				false
			}
			Err(_) => false,
		}
	}

	/// The component's tracked internal state, created on first access.
	pub fn state(&mut self) -> Result<Tracked> {
		let membrane = self.engine.membrane.clone();
		let vm = self.engine.vm_mut(self.vm)?;
		Ok(vm.tracked_state.get_or_insert_with(|| membrane.wrap(Object::record())).clone())
	}

	/// Replaces the internal state. Rejected during render.
	pub fn set_state(&mut self, state: Object) -> Result<bool> {
		if self.engine.scheduler.is_rendering() {
			warn!(vm = ?self.vm, "State can't be replaced during render");
			return Ok(false);
		}
		let tracked = self.engine.membrane.wrap(state);
		let vm = self.engine.vm_mut(self.vm)?;
		vm.tracked_state = Some(tracked);
		let state = vm.state.clone();
		self.engine.scheduler.invalidate(&state);
		Ok(true)
	}

	/// Values written by services during wiring.
	pub fn wired(&self) -> Result<Tracked> {
		Ok(self.engine.vm(self.vm)?.wired.clone())
	}

	/// Scratch space shared with services.
	pub fn context(&self) -> Result<Object> {
		Ok(self.engine.vm(self.vm)?.context.clone())
	}

	/// Memo space for render output, kept for as long as the VM lives.
	///
	/// Unlike [`Context::state`], reads aren't tracked and writes are allowed during render.
	pub fn render_cache(&self) -> Result<Object> {
		Ok(self.engine.vm(self.vm)?.render_cache.clone())
	}

	pub fn class_list(&mut self) -> ClassList<'_> {
		ClassList {
			engine: &mut *self.engine,
			vm: self.vm,
		}
	}

	pub fn add_event_listener(&mut self, kind: &str, handler: Handler) -> Result<()> {
		self.engine.add_component_event_listener(self.vm, kind, handler)
	}

	pub fn remove_event_listener(&mut self, kind: &str, handler: &Handler) -> Result<()> {
		self.engine.remove_component_event_listener(self.vm, kind, handler)
	}

	/// Dispatches `event` at the host element.
	pub fn dispatch_event(&mut self, event: &Event) -> Result<()> {
		let host = self.host().ok_or(Error::UnknownVm(self.vm))?;
		trace!(vm = ?self.vm, kind = event.kind(), "Dispatching component event");
		self.engine.dom.dispatch_event(host, event);
		Ok(())
	}

	/// Reads an attribute of the host as set by its owner.
	///
	/// # Errors
	///
	/// [`Error::MissingArgument`] iff `name` is [`None`].
	pub fn get_attribute(&self, name: Option<&str>) -> Result<Option<String>> {
		let name = name.ok_or(Error::MissingArgument {
			method: "get_attribute",
			vm: self.vm,
		})?;
		let vm = self.engine.vm(self.vm)?;
		if vm.vnode.is_root {
			return Ok(vm.vnode.elm.and_then(|elm| self.engine.dom.get_attribute(elm, name)));
		}
		Ok(vm.vnode.data.attrs.get(name).and_then(to_attribute_value))
	}

	#[must_use]
	pub fn tag_name(&self) -> Option<String> {
		self.host().and_then(|host| self.engine.dom.tag_name(host))
	}

	/// The content the owner passed for the slot `name`.
	pub fn slot(&self, name: &str) -> Vec<VNode> {
		self.engine
			.vm(self.vm)
			.ok()
			.and_then(|vm| vm.slots.get(name))
			.map(|slot| slot.to_vec())
			.unwrap_or_default()
	}

	/// First node below the host that was passed in by this component's owner.
	pub fn query_selector(&mut self, selector: &str) -> Result<Option<Pierced>> {
		Ok(self.query_selector_all(selector)?.into_iter().next())
	}

	pub fn query_selector_all(&mut self, selector: &str) -> Result<Vec<Pierced>> {
		let owner = self.engine.vm(self.vm)?.vnode.owner;
		self.query_host(selector, owner)
	}

	/// First node below the host that this component rendered itself.
	pub fn root_query_selector(&mut self, selector: &str) -> Result<Option<Pierced>> {
		Ok(self.root_query_selector_all(selector)?.into_iter().next())
	}

	pub fn root_query_selector_all(&mut self, selector: &str) -> Result<Vec<Pierced>> {
		self.query_host(selector, Some(self.vm))
	}

	fn query_host(&mut self, selector: &str, owner: Option<VmId>) -> Result<Vec<Pierced>> {
		let host = match self.host() {
			Some(host) => host,
			None => return Ok(Vec::new()),
		};
		let nodes: Vec<NodeId> = self
			.engine
			.dom
			.query_selector_all(host, selector)
			.into_iter()
			.filter(|&node| self.engine.owner_of(node) == owner)
			.collect();
		nodes.into_iter().map(|node| self.engine.pierce(self.vm, node)).collect()
	}

	/// Wraps `node` for traversal through [`Context::reach`].
	pub fn pierce(&mut self, node: NodeId) -> Result<Pierced> {
		self.engine.pierce(self.vm, node)
	}

	/// Reads `property` of a pierced node, as filtered by the installed piercing services.
	pub fn reach(&mut self, target: &Pierced, property: NodeProperty) -> Result<Reached> {
		self.engine.reach(self.vm, target, property)
	}
}
impl Debug for Context<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context").field("vm", &self.vm).finish_non_exhaustive()
	}
}

/// The classes a component puts on its own host element.
pub struct ClassList<'a> {
	engine: &'a mut Engine,
	vm: VmId,
}
impl ClassList<'_> {
	/// The host, if mounted.
	fn mounted_host(&self) -> Result<Option<NodeId>> {
		let vm = self.engine.vm(self.vm)?;
		Ok(vm.vnode.elm.filter(|_| vm.state.idx() > 0))
	}

	pub fn add(&mut self, name: &str) -> Result<()> {
		self.engine.vm_mut(self.vm)?.classes.insert(name, true);
		if let Some(host) = self.mounted_host()? {
			self.engine.dom.add_class(host, name);
		}
		Ok(())
	}

	/// Classes the owner sets on the host stay in the DOM.
	pub fn remove(&mut self, name: &str) -> Result<()> {
		let vm = self.engine.vm_mut(self.vm)?;
		vm.classes.remove(name);
		let forced = vm.vnode.data.class.get(name) == Some(&true);
		if let (false, Some(host)) = (forced, self.mounted_host()?) {
			self.engine.dom.remove_class(host, name);
		}
		Ok(())
	}

	/// Returns whether `name` is now present.
	pub fn toggle(&mut self, name: &str, force: Option<bool>) -> Result<bool> {
		let on = force.unwrap_or(!self.contains(name));
		if on {
			self.add(name)?;
		} else {
			self.remove(name)?;
		}
		Ok(on)
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.engine
			.vm(self.vm)
			.map_or(false, |vm| vm.classes.get(name) == Some(&true))
	}

	#[must_use]
	pub fn item(&self, index: usize) -> Option<String> {
		self.names().into_iter().nth(index)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.names().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn names(&self) -> Vec<String> {
		self.engine.vm(self.vm).map_or_else(
			|_| Vec::new(),
			|vm| vm.classes.iter().filter(|(_, on)| **on).map(|(name, _)| name.to_string()).collect(),
		)
	}
}
impl fmt::Display for ClassList<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.names().join(" "))
	}
}
impl Debug for ClassList<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ClassList").field(&self.names()).finish()
	}
}

//! Per-concern VNode hooks, run in [`MODULES`] order around each patch and on element creation, update, removal and destruction.

use crate::{
	dom::{XLINK_NAMESPACE, XML_NAMESPACE},
	patch::{elm_of, logged, ElementListener},
	vnode::{Map, Style, VNode},
	Engine, Result, Value,
};
use std::{borrow::Cow, rc::Rc};
use tracing::trace;

pub(crate) trait Module: Sync {
	/// Runs once at the start of each [`Engine::patch`].
	fn pre(&self, engine: &mut Engine) -> Result<()> {
		let _ = engine;
		Ok(())
	}

	/// `empty` is a blank VNode.
	fn create(&self, engine: &mut Engine, empty: &VNode, vnode: &mut VNode) -> Result<()> {
		self.update(engine, empty, vnode)
	}

	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()>;

	/// Each module holds one count of `vnode`'s pending removal,
	/// which it must release through [`Engine::complete_removal`] exactly once.
	fn remove(&self, engine: &mut Engine, vnode: &VNode) -> Result<()> {
		engine.complete_removal(elm_of(vnode)?)
	}

	fn destroy(&self, engine: &mut Engine, vnode: &VNode) -> Result<()> {
		let _ = (engine, vnode);
		Ok(())
	}

	/// Runs once at the end of each [`Engine::patch`], after its components were inserted.
	fn post(&self, engine: &mut Engine) -> Result<()> {
		let _ = engine;
		Ok(())
	}
}

pub(crate) static MODULES: [&dyn Module; 13] = [
	&ComponentInit,
	&ComponentSlotset,
	&ComponentProps,
	&ComponentAttrs,
	&ComponentEvents,
	&ComponentClasses,
	&ComponentRerender,
	&Props,
	&Attrs,
	&Class,
	&StyleModule,
	&EventListeners,
	&Owners,
];

/// The attribute form of `value`: [`None`] means absent.
pub(crate) fn to_attribute_value(value: &Value) -> Option<String> {
	match value {
		Value::Bool(true) => Some(String::new()),
		Value::Bool(false) | Value::Undefined | Value::Null => None,
		value => Some(value.to_text()),
	}
}

/// Whether `old` belonged to the same component instance as `vnode`.
fn same_vm(old: &VNode, vnode: &VNode) -> bool {
	old.vm.is_some() && old.vm == vnode.vm
}

/// Creates or relinks the VM of component VNodes.
struct ComponentInit;
impl Module for ComponentInit {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		if vnode.ctor.is_none() {
			return Ok(());
		}
		match (old.vm, &old.ctor, &vnode.ctor) {
			(Some(vm), Some(old_ctor), Some(ctor)) if Rc::ptr_eq(old_ctor, ctor) && engine.vm(vm).is_ok() => engine.relink_vm(vm, vnode),
			(Some(released), ..) => {
				// The host still holds the released VM's fragment.
				trace!(vm = ?released, "Recreating released VM");
				let elm = elm_of(vnode)?;
				for child in engine.dom.child_nodes(elm) {
					engine.owners.remove(&child);
					logged(engine.dom.remove_child(elm, child))?;
				}
				engine.create_vm(vnode)
			}
			_ => engine.create_vm(vnode),
		}
	}
}

struct ComponentSlotset;
impl Module for ComponentSlotset {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		let vm = match vnode.vm {
			Some(vm) => vm,
			None => return Ok(()),
		};
		let empty = Map::new();
		let old_slots = if same_vm(old, vnode) { &old.data.slotset } else { &empty };

		for name in old_slots.keys() {
			if !vnode.data.slotset.contains_key(name) {
				engine.remove_component_slot(vm, name)?;
			}
		}
		for (name, slot) in vnode.data.slotset.iter() {
			let changed = old_slots.get(name).map_or(true, |old| !Rc::ptr_eq(old, slot));
			if !changed {
				continue;
			}
			if slot.is_empty() {
				engine.remove_component_slot(vm, name)?;
			} else {
				engine.add_component_slot(vm, name.clone(), slot.clone())?;
			}
		}
		Ok(())
	}
}

struct ComponentProps;
impl Module for ComponentProps {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		let vm = match vnode.vm {
			Some(vm) => vm,
			None => return Ok(()),
		};
		let empty = Map::new();
		let old_props = if same_vm(old, vnode) { &old.data.component_props } else { &empty };

		for name in old_props.keys() {
			if !vnode.data.component_props.contains_key(name) {
				engine.reset_component_prop(vm, name)?;
			}
		}
		for (name, value) in vnode.data.component_props.iter() {
			if old_props.get(name) != Some(value) {
				engine.update_component_prop(vm, name, value.clone())?;
			}
		}
		Ok(())
	}
}

/// Forwards changes of observed attributes to `attribute_changed`.
struct ComponentAttrs;
impl Module for ComponentAttrs {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		let vm = match vnode.vm {
			Some(vm) => vm,
			None => return Ok(()),
		};
		let def = engine.vm(vm)?.def.clone();
		if def.observed_attributes().is_empty() {
			return Ok(());
		}
		let empty = Map::new();
		let old_attrs = if same_vm(old, vnode) { &old.data.attrs } else { &empty };

		for (name, old_value) in old_attrs.iter() {
			if !vnode.data.attrs.contains_key(name) && def.observes(name) {
				let old_value = Value::from(to_attribute_value(old_value));
				engine.attribute_changed(vm, name, &old_value, &Value::Null)?;
			}
		}
		for (name, value) in vnode.data.attrs.iter() {
			if !def.observes(name) {
				continue;
			}
			let old_value = old_attrs.get(name).and_then(to_attribute_value);
			let new_value = to_attribute_value(value);
			if old_value != new_value {
				engine.attribute_changed(vm, name, &Value::from(old_value), &Value::from(new_value))?;
			}
		}
		Ok(())
	}
}

/// `on` handlers of component VNodes become component event listeners.
struct ComponentEvents;
impl Module for ComponentEvents {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		let vm = match vnode.vm {
			Some(vm) => vm,
			None => return Ok(()),
		};
		let empty = Map::new();
		let old_on = if same_vm(old, vnode) { &old.data.on } else { &empty };

		for (kind, handler) in old_on.iter() {
			if vnode.data.on.get(kind) != Some(handler) {
				engine.remove_component_event_listener(vm, kind, handler)?;
			}
		}
		for (kind, handler) in vnode.data.on.iter() {
			if old_on.get(kind) != Some(handler) {
				engine.add_component_event_listener(vm, kind, handler.clone())?;
			}
		}
		Ok(())
	}
}

/// Applies classes a component added to itself before its host existed.
struct ComponentClasses;
impl Module for ComponentClasses {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		let vm = match vnode.vm {
			Some(vm) if !same_vm(old, vnode) => vm,
			_ => return Ok(()),
		};
		let elm = elm_of(vnode)?;
		let classes: Vec<Rc<str>> = engine
			.vm(vm)?
			.classes
			.iter()
			.filter(|(_, on)| **on)
			.map(|(name, _)| name.clone())
			.collect();
		for name in classes {
			engine.dom.add_class(elm, &name);
		}
		Ok(())
	}
}

/// Renders mounted dirty components, so their output is reconciled in the same patch.
struct ComponentRerender;
impl Module for ComponentRerender {
	fn update(&self, engine: &mut Engine, _old: &VNode, vnode: &mut VNode) -> Result<()> {
		let vm = match vnode.vm {
			Some(vm) => vm,
			None => return Ok(()),
		};
		let state = engine.vm(vm)?.state.clone();
		if state.idx() > 0 && state.is_dirty() {
			engine.render_component(vm)?;
		}
		Ok(())
	}
}

/// DOM properties of plain elements.
struct Props;
impl Module for Props {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		if old.data.props.is_empty() && vnode.data.props.is_empty() {
			return Ok(());
		}
		let elm = elm_of(vnode)?;
		for name in old.data.props.keys() {
			if !vnode.data.props.contains_key(name) {
				engine.dom.remove_property(elm, name);
			}
		}
		for (name, value) in vnode.data.props.iter() {
			// Inputs change their own value.
			let stale = old.data.props.get(name) != Some(value) || (&**name == "value" && engine.dom.get_property(elm, name) != *value);
			if stale {
				engine.dom.set_property(elm, name, value);
			}
		}
		Ok(())
	}
}

struct Attrs;
impl Module for Attrs {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		if old.data.attrs.is_empty() && vnode.data.attrs.is_empty() {
			return Ok(());
		}
		let elm = elm_of(vnode)?;
		for (name, value) in vnode.data.attrs.iter() {
			if old.data.attrs.get(name) == Some(value) {
				continue;
			}
			match to_attribute_value(value) {
				None => logged(engine.dom.remove_attribute(elm, name))?,
				Some(value) => {
					let namespace = if name.starts_with("xml:") {
						Some(XML_NAMESPACE)
					} else if name.starts_with("xlink:") {
						Some(XLINK_NAMESPACE)
					} else {
						None
					};
					logged(match namespace {
						Some(namespace) => engine.dom.set_attribute_ns(elm, namespace, name, &value),
						None => engine.dom.set_attribute(elm, name, &value),
					})?;
				}
			}
		}
		for name in old.data.attrs.keys() {
			if !vnode.data.attrs.contains_key(name) {
				logged(engine.dom.remove_attribute(elm, name))?;
			}
		}
		Ok(())
	}
}

/// Leaves classes alone that the element's own component keeps on.
struct Class;
impl Module for Class {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		if old.data.class.is_empty() && vnode.data.class.is_empty() {
			return Ok(());
		}
		let elm = elm_of(vnode)?;
		let own = match vnode.vm {
			Some(vm) => engine.vm(vm)?.classes.clone(),
			None => Map::new(),
		};
		for (name, on) in old.data.class.iter() {
			if *on && vnode.data.class.get(name) != Some(&true) && own.get(name) != Some(&true) {
				engine.dom.remove_class(elm, name);
			}
		}
		for (name, on) in vnode.data.class.iter() {
			if *on && old.data.class.get(name) != Some(&true) {
				engine.dom.add_class(elm, name);
			}
		}
		Ok(())
	}
}

/// `backgroundColor` → `background-color`. Custom properties pass unchanged.
fn css_property_name(name: &str) -> Cow<'_, str> {
	if name.starts_with("--") || !name.contains(|c: char| c.is_ascii_uppercase()) {
		return Cow::Borrowed(name);
	}
	let mut property = String::with_capacity(name.len() + 2);
	for c in name.chars() {
		if c.is_ascii_uppercase() {
			property.push('-');
			property.push(c.to_ascii_lowercase());
		} else {
			property.push(c);
		}
	}
	Cow::Owned(property)
}

struct StyleModule;
impl Module for StyleModule {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		if old.data.style.is_none() && vnode.data.style.is_none() {
			return Ok(());
		}
		let elm = elm_of(vnode)?;
		let empty = Map::new();
		let old_map = match &old.data.style {
			Some(Style::Map(map)) => map,
			_ => &empty,
		};
		match &vnode.data.style {
			Some(Style::Text(css_text)) => {
				if old.data.style.as_ref() != vnode.data.style.as_ref() {
					engine.dom.set_style_text(elm, css_text);
				}
			}
			Some(Style::Map(map)) => {
				if let Some(Style::Text(_)) = &old.data.style {
					engine.dom.set_style_text(elm, "");
				}
				for name in old_map.keys() {
					if !map.contains_key(name) {
						engine.dom.remove_style_property(elm, &css_property_name(name));
					}
				}
				for (name, value) in map.iter() {
					if old_map.get(name) != Some(value) {
						engine.dom.set_style_property(elm, &css_property_name(name), value);
					}
				}
			}
			None => match &old.data.style {
				Some(Style::Text(_)) => engine.dom.set_style_text(elm, ""),
				_ => {
					for name in old_map.keys() {
						engine.dom.remove_style_property(elm, &css_property_name(name));
					}
				}
			},
		}
		Ok(())
	}
}

/// `on` handlers of plain elements, through one [`ElementListener`] per element.
struct EventListeners;
impl Module for EventListeners {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		if vnode.ctor.is_some() || (old.data.on.is_empty() && vnode.data.on.is_empty()) {
			return Ok(());
		}
		let elm = elm_of(vnode)?;
		let listener = old.listener.clone().unwrap_or_else(ElementListener::new);
		listener.set_handlers(vnode.data.on.clone());

		for kind in old.data.on.keys() {
			if !vnode.data.on.contains_key(kind) {
				engine.dom.remove_event_listener(elm, kind, listener.listener());
			}
		}
		for kind in vnode.data.on.keys() {
			if !old.data.on.contains_key(kind) {
				engine.dom.add_event_listener(elm, kind, listener.listener());
			}
		}
		vnode.listener = if vnode.data.on.is_empty() { None } else { Some(listener) };
		Ok(())
	}

	fn destroy(&self, engine: &mut Engine, vnode: &VNode) -> Result<()> {
		if let (Some(listener), Some(elm)) = (&vnode.listener, vnode.elm) {
			for kind in vnode.data.on.keys() {
				engine.dom.remove_event_listener(elm, kind, listener.listener());
			}
		}
		Ok(())
	}
}

/// Stamps rendered elements with the uid of the VM that rendered them.
struct Owners;
impl Module for Owners {
	fn update(&self, engine: &mut Engine, old: &VNode, vnode: &mut VNode) -> Result<()> {
		if old.elm.is_some() && old.owner == vnode.owner {
			return Ok(());
		}
		let elm = elm_of(vnode)?;
		match vnode.owner {
			Some(owner) => {
				trace!(?elm, ?owner, "Stamped");
				engine.owners.insert(elm, owner);
			}
			None => {
				engine.owners.remove(&elm);
			}
		}
		Ok(())
	}

	fn destroy(&self, engine: &mut Engine, vnode: &VNode) -> Result<()> {
		if let Some(elm) = vnode.elm {
			engine.owners.remove(&elm);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::{css_property_name, to_attribute_value};
	use crate::Value;

	#[test]
	fn attribute_values() {
		assert_eq!(to_attribute_value(&Value::Bool(true)).as_deref(), Some(""));
		assert_eq!(to_attribute_value(&Value::Bool(false)), None);
		assert_eq!(to_attribute_value(&Value::Null), None);
		assert_eq!(to_attribute_value(&Value::from("x")).as_deref(), Some("x"));
	}

	#[test]
	fn css_names() {
		assert_eq!(css_property_name("backgroundColor"), "background-color");
		assert_eq!(css_property_name("--mainColor"), "--mainColor");
		assert_eq!(css_property_name("color"), "color");
	}
}

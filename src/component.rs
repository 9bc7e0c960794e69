//! Component definitions and the life-cycle capabilities a component may implement.

use crate::{context::Context, error::BoxError, Value, VNode};
use core::fmt::{self, Debug, Formatter};
use std::{borrow::Cow, rc::Rc};

/// A live component instance.
///
/// Only [`render`](`Component::render`) is required. Every other capability defaults to a no-op.
pub trait Component: 'static {
	/// Produces the component's fragment. Called inside a render context.
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError>;

	fn connected(&mut self, cx: &mut Context<'_>) -> Result<(), BoxError> {
		let _ = cx;
		Ok(())
	}

	fn disconnected(&mut self, cx: &mut Context<'_>) -> Result<(), BoxError> {
		let _ = cx;
		Ok(())
	}

	fn rendered(&mut self, cx: &mut Context<'_>) -> Result<(), BoxError> {
		let _ = cx;
		Ok(())
	}

	/// Called for attributes in [`ComponentDef::observe`] only.
	fn attribute_changed(&mut self, cx: &mut Context<'_>, name: &str, old: &Value, new: &Value) -> Result<(), BoxError> {
		let _ = (cx, name, old, new);
		Ok(())
	}

	/// Backs props declared with a custom getter.
	fn get_property(&self, name: &str) -> Value {
		let _ = name;
		Value::Undefined
	}

	/// Backs props declared with a custom setter.
	fn set_property(&mut self, cx: &mut Context<'_>, name: &str, value: Value) -> Result<(), BoxError> {
		let _ = (cx, name, value);
		Ok(())
	}
}

type Constructor = dyn Fn(&mut Context<'_>) -> Result<Box<dyn Component>, BoxError>;

fn erased<F>(constructor: F) -> F
where
	F: 'static + Fn(&mut Context<'_>) -> Result<Box<dyn Component>, BoxError>,
{
	constructor
}

/// A declared public property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropDef {
	pub name: Rc<str>,
	/// What the property holds initially and after it is no longer passed.
	pub default: Value,
	pub custom_getter: bool,
	pub custom_setter: bool,
}

/// Everything the engine needs to know about a component class.
///
/// Compared by identity wherever a VNode's constructor is concerned, so share it through an [`Rc`].
pub struct ComponentDef {
	name: Rc<str>,
	props: Vec<PropDef>,
	observed_attributes: Vec<Rc<str>>,
	wired: Vec<Rc<str>>,
	constructor: Box<Constructor>,
}
impl ComponentDef {
	pub fn new<C: Component>(name: impl Into<Rc<str>>, constructor: impl 'static + Fn(&mut Context<'_>) -> Result<C, BoxError>) -> Self {
		Self {
			name: name.into(),
			props: Vec::new(),
			observed_attributes: Vec::new(),
			wired: Vec::new(),
			constructor: Box::new(erased(move |cx| constructor(cx).map(|component| Box::new(component) as Box<dyn Component>))),
		}
	}

	/// Declares a public property stored by the engine.
	#[must_use]
	pub fn prop(self, name: impl Into<Rc<str>>) -> Self {
		self.prop_with(name, Value::Undefined, false, false)
	}

	#[must_use]
	pub fn prop_with_default(self, name: impl Into<Rc<str>>, default: impl Into<Value>) -> Self {
		self.prop_with(name, default.into(), false, false)
	}

	/// Declares a public property, optionally backed by [`Component::get_property`] and [`Component::set_property`].
	#[must_use]
	pub fn prop_with(mut self, name: impl Into<Rc<str>>, default: Value, custom_getter: bool, custom_setter: bool) -> Self {
		self.props.push(PropDef {
			name: name.into(),
			default: default.unwrap_tracked(),
			custom_getter,
			custom_setter,
		});
		self
	}

	#[must_use]
	pub fn observe(mut self, attribute: impl Into<Rc<str>>) -> Self {
		self.observed_attributes.push(attribute.into());
		self
	}

	/// Declares a property whose value is supplied by a `wiring` service.
	#[must_use]
	pub fn wire(mut self, name: impl Into<Rc<str>>) -> Self {
		self.wired.push(name.into());
		self
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn props(&self) -> &[PropDef] {
		&self.props
	}

	#[must_use]
	pub fn prop_def(&self, name: &str) -> Option<&PropDef> {
		self.props.iter().find(|prop| &*prop.name == name)
	}

	#[must_use]
	pub fn observed_attributes(&self) -> &[Rc<str>] {
		&self.observed_attributes
	}

	#[must_use]
	pub fn observes(&self, attribute: &str) -> bool {
		self.observed_attributes.iter().any(|observed| &**observed == attribute)
	}

	#[must_use]
	pub fn wired(&self) -> &[Rc<str>] {
		&self.wired
	}

	pub(crate) fn construct(&self, cx: &mut Context<'_>) -> Result<Box<dyn Component>, BoxError> {
		(self.constructor)(cx)
	}
}
impl Debug for ComponentDef {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentDef")
			.field("name", &self.name)
			.field("props", &self.props)
			.field("observed_attributes", &self.observed_attributes)
			.field("wired", &self.wired)
			.finish_non_exhaustive()
	}
}

/// `fooBar` → `foo-bar`, with the `className` and `htmlFor` exceptions.
#[must_use]
pub fn attr_name_from_prop(prop: &str) -> Cow<'_, str> {
	match prop {
		"className" => "class".into(),
		"htmlFor" => "for".into(),
		prop if prop.chars().any(char::is_uppercase) => {
			let mut attr = String::with_capacity(prop.len() + 2);
			for c in prop.chars() {
				if c.is_uppercase() {
					attr.push('-');
					attr.extend(c.to_lowercase());
				} else {
					attr.push(c);
				}
			}
			attr.into()
		}
		prop => prop.into(),
	}
}

/// `foo-bar` → `fooBar`, with the `class` and `for` exceptions.
#[must_use]
pub fn prop_name_from_attr(attr: &str) -> Cow<'_, str> {
	match attr {
		"class" => "className".into(),
		"for" => "htmlFor".into(),
		attr if attr.contains('-') => {
			let mut prop = String::with_capacity(attr.len());
			let mut upper = false;
			for c in attr.chars() {
				if c == '-' {
					upper = true;
				} else if upper {
					prop.extend(c.to_uppercase());
					upper = false;
				} else {
					prop.push(c);
				}
			}
			prop.into()
		}
		attr => attr.into(),
	}
}

#[cfg(test)]
mod tests {
	use super::{attr_name_from_prop, prop_name_from_attr};

	#[test]
	fn name_mapping() {
		assert_eq!(attr_name_from_prop("fooBarBaz"), "foo-bar-baz");
		assert_eq!(attr_name_from_prop("title"), "title");
		assert_eq!(attr_name_from_prop("className"), "class");
		assert_eq!(attr_name_from_prop("htmlFor"), "for");
		assert_eq!(prop_name_from_attr("aria-label"), "ariaLabel");
		assert_eq!(prop_name_from_attr("class"), "className");
	}
}

//! The browser [`DomAdapter`], over [`web_sys`].

use crate::{
	dom::{DomAdapter, DomError, Event, Listener, NodeKind},
	NodeId, Value,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use js_sys::{Promise, Reflect};
use std::rc::Rc;
use tracing::{error, trace};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

const NODE_ID_KEY: &str = "__xylemNodeId";

fn js_error(value: JsValue) -> DomError {
	DomError::Other(format!("{:?}", value))
}

fn to_js(value: &Value) -> JsValue {
	match value {
		Value::Undefined => JsValue::UNDEFINED,
		Value::Null => JsValue::NULL,
		Value::Bool(bool) => JsValue::from_bool(*bool),
		Value::Number(number) => JsValue::from_f64(*number),
		Value::String(string) => JsValue::from_str(string),
		Value::Object(_) | Value::Tracked(_) => {
			error!("Objects can't be passed to the browser DOM. Setting `undefined` instead.");
			JsValue::UNDEFINED
		}
	}
}

fn from_js(value: &JsValue) -> Value {
	if value.is_null() {
		Value::Null
	} else if let Some(bool) = value.as_bool() {
		Value::Bool(bool)
	} else if let Some(number) = value.as_f64() {
		Value::Number(number)
	} else if let Some(string) = value.as_string() {
		Value::String(string.into())
	} else {
		Value::Undefined
	}
}

/// What a listener sees of the event currently dispatched through [`WebDom::dispatch_event`].
#[derive(Default)]
struct Dispatch {
	detail: Value,
	stopped: bool,
	immediately_stopped: bool,
}

struct Binding {
	node: NodeId,
	kind: Rc<str>,
	listener: Listener,
	closure: Closure<dyn Fn(web_sys::Event)>,
}

/// Nodes are identified through a side table, and tagged with their index so they can be found again.
pub struct WebDom {
	document: web_sys::Document,
	nodes: RefCell<Vec<web_sys::Node>>,
	bindings: Vec<Binding>,
	dispatch: Rc<RefCell<Option<Dispatch>>>,
}
impl WebDom {
	#[must_use]
	pub fn new(document: web_sys::Document) -> Self {
		Self {
			document,
			nodes: RefCell::default(),
			bindings: Vec::new(),
			dispatch: Rc::default(),
		}
	}

	/// The id of an existing node, assigning one if necessary.
	pub fn adopt(&self, node: &web_sys::Node) -> NodeId {
		let key = JsValue::from_str(NODE_ID_KEY);
		if let Some(raw) = Reflect::get(node, &key).ok().and_then(|raw| raw.as_f64()) {
			#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
			return NodeId::from_raw(raw as u32);
		}
		let mut nodes = self.nodes.borrow_mut();
		#[allow(clippy::cast_possible_truncation)]
		let id = NodeId::from_raw(nodes.len() as u32);
		if Reflect::set(node, &key, &JsValue::from(id.raw())).is_err() {
			error!("Failed to tag node");
		}
		nodes.push(node.clone());
		id
	}

	#[must_use]
	pub fn node(&self, node: NodeId) -> Option<web_sys::Node> {
		self.nodes.borrow().get(node.raw() as usize).cloned()
	}

	fn get(&self, node: NodeId) -> Result<web_sys::Node, DomError> {
		self.node(node).ok_or(DomError::UnknownNode(node))
	}

	fn element(&self, element: NodeId) -> Result<web_sys::Element, DomError> {
		self.get(element)?.dyn_into().map_err(|_| DomError::NotAnElement(element))
	}

	fn style(&self, element: NodeId) -> Option<web_sys::CssStyleDeclaration> {
		self.get(element).ok()?.dyn_into::<web_sys::HtmlElement>().ok().map(|element| element.style())
	}
}
impl Debug for WebDom {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebDom")
			.field("nodes", &self.nodes.borrow().len())
			.field("bindings", &self.bindings.len())
			.finish_non_exhaustive()
	}
}

impl DomAdapter for WebDom {
	fn create_element(&mut self, tag: &str) -> Result<NodeId, DomError> {
		let element = self.document.create_element(tag).map_err(js_error)?;
		Ok(self.adopt(&element))
	}

	fn create_element_ns(&mut self, namespace: &str, tag: &str) -> Result<NodeId, DomError> {
		let element = self.document.create_element_ns(Some(namespace), tag).map_err(js_error)?;
		Ok(self.adopt(&element))
	}

	fn create_text_node(&mut self, text: &str) -> NodeId {
		let text = self.document.create_text_node(text);
		self.adopt(&text)
	}

	fn create_comment(&mut self, text: &str) -> NodeId {
		let comment = self.document.create_comment(text);
		self.adopt(&comment)
	}

	fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<(), DomError> {
		let reference = reference.map(|reference| self.get(reference)).transpose()?;
		self.get(parent)?
			.insert_before(&self.get(node)?, reference.as_ref())
			.map(drop)
			.map_err(js_error)
	}

	fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
		self.get(parent)?.remove_child(&self.get(child)?).map(drop).map_err(js_error)
	}

	fn parent_node(&self, node: NodeId) -> Option<NodeId> {
		self.node(node)?.parent_node().map(|parent| self.adopt(&parent))
	}

	fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
		self.node(node)?.next_sibling().map(|sibling| self.adopt(&sibling))
	}

	fn child_nodes(&self, node: NodeId) -> Vec<NodeId> {
		let list = match self.node(node) {
			Some(node) => node.child_nodes(),
			None => return Vec::new(),
		};
		(0..list.length()).filter_map(|i| list.get(i)).map(|child| self.adopt(&child)).collect()
	}

	fn kind(&self, node: NodeId) -> Option<NodeKind> {
		match self.node(node)?.node_type() {
			web_sys::Node::ELEMENT_NODE => Some(NodeKind::Element),
			web_sys::Node::TEXT_NODE => Some(NodeKind::Text),
			web_sys::Node::COMMENT_NODE => Some(NodeKind::Comment),
			_ => None,
		}
	}

	fn tag_name(&self, element: NodeId) -> Option<String> {
		self.element(element).ok().map(|element| element.tag_name())
	}

	fn set_text_content(&mut self, node: NodeId, text: &str) {
		if let Some(node) = self.node(node) {
			node.set_text_content(Some(text));
		}
	}

	fn text_content(&self, node: NodeId) -> Option<String> {
		self.node(node)?.text_content()
	}

	fn get_attribute(&self, element: NodeId, name: &str) -> Option<String> {
		self.element(element).ok()?.get_attribute(name)
	}

	fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<(), DomError> {
		self.element(element)?.set_attribute(name, value).map_err(js_error)
	}

	fn set_attribute_ns(&mut self, element: NodeId, namespace: &str, name: &str, value: &str) -> Result<(), DomError> {
		self.element(element)?.set_attribute_ns(Some(namespace), name, value).map_err(js_error)
	}

	fn remove_attribute(&mut self, element: NodeId, name: &str) -> Result<(), DomError> {
		self.element(element)?.remove_attribute(name).map_err(js_error)
	}

	fn get_property(&self, node: NodeId, name: &str) -> Value {
		self.node(node)
			.and_then(|node| Reflect::get(&node, &JsValue::from_str(name)).ok())
			.map_or(Value::Undefined, |value| from_js(&value))
	}

	fn set_property(&mut self, node: NodeId, name: &str, value: &Value) {
		if let Some(node) = self.node(node) {
			if let Err(error) = Reflect::set(&node, &JsValue::from_str(name), &to_js(value)) {
				error!(?error, name, "Failed to set property");
			}
		}
	}

	fn remove_property(&mut self, node: NodeId, name: &str) {
		if let Some(node) = self.node(node) {
			if let Err(error) = Reflect::delete_property(node.unchecked_ref(), &JsValue::from_str(name)) {
				error!(?error, name, "Failed to delete property");
			}
		}
	}

	fn add_class(&mut self, element: NodeId, class: &str) {
		if let Ok(element) = self.element(element) {
			if let Err(error) = element.class_list().add_1(class) {
				error!(?error, class, "Failed to add class");
			}
		}
	}

	fn remove_class(&mut self, element: NodeId, class: &str) {
		if let Ok(element) = self.element(element) {
			if let Err(error) = element.class_list().remove_1(class) {
				error!(?error, class, "Failed to remove class");
			}
		}
	}

	fn set_style_property(&mut self, element: NodeId, name: &str, value: &str) {
		if let Some(style) = self.style(element) {
			if let Err(error) = style.set_property(name, value) {
				error!(?error, name, "Failed to set style property");
			}
		}
	}

	fn remove_style_property(&mut self, element: NodeId, name: &str) {
		if let Some(style) = self.style(element) {
			if let Err(error) = style.remove_property(name) {
				error!(?error, name, "Failed to remove style property");
			}
		}
	}

	fn set_style_text(&mut self, element: NodeId, css_text: &str) {
		if let Some(style) = self.style(element) {
			style.set_css_text(css_text);
		}
	}

	fn add_event_listener(&mut self, node: NodeId, kind: &str, listener: &Listener) {
		if self
			.bindings
			.iter()
			.any(|binding| binding.node == node && &*binding.kind == kind && binding.listener == *listener)
		{
			return;
		}
		let target = match self.node(node) {
			Some(target) => target,
			None => return,
		};
		let closure = Closure::wrap(Box::new({
			let listener = listener.clone();
			let dispatch = self.dispatch.clone();
			move |event: web_sys::Event| {
				let detail = dispatch.borrow().as_ref().map(|dispatch| dispatch.detail.clone()).unwrap_or_default();
				let ours = Event::with_detail(event.type_(), detail);
				listener.call(&ours);
				if ours.immediate_propagation_stopped() {
					event.stop_immediate_propagation();
				} else if ours.propagation_stopped() {
					event.stop_propagation();
				}
				if let Some(dispatch) = &mut *dispatch.borrow_mut() {
					dispatch.stopped |= ours.propagation_stopped();
					dispatch.immediately_stopped |= ours.immediate_propagation_stopped();
				}
			}
		}) as Box<dyn Fn(web_sys::Event)>);
		if let Err(error) = target.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref()) {
			error!(?error, kind, "Failed to add event listener");
			return;
		}
		trace!(?node, kind, "Added event listener");
		self.bindings.push(Binding {
			node,
			kind: kind.into(),
			listener: listener.clone(),
			closure,
		});
	}

	fn remove_event_listener(&mut self, node: NodeId, kind: &str, listener: &Listener) {
		let index = match self
			.bindings
			.iter()
			.position(|binding| binding.node == node && &*binding.kind == kind && binding.listener == *listener)
		{
			Some(index) => index,
			None => return,
		};
		let binding = self.bindings.swap_remove(index);
		if let Some(target) = self.node(node) {
			if let Err(error) = target.remove_event_listener_with_callback(kind, binding.closure.as_ref().unchecked_ref()) {
				error!(?error, kind, "Failed to remove event listener");
			}
		}
	}

	fn dispatch_event(&mut self, node: NodeId, event: &Event) {
		let target = match self.node(node) {
			Some(target) => target,
			None => return,
		};
		let mut init = web_sys::EventInit::new();
		init.bubbles(true);
		let web_event = match web_sys::Event::new_with_event_init_dict(event.kind(), &init) {
			Ok(web_event) => web_event,
			Err(error) => {
				error!(?error, "Failed to create event");
				return;
			}
		};

		let outer = self.dispatch.replace(Some(Dispatch {
			detail: event.detail().clone(),
			..Dispatch::default()
		}));
		if let Err(error) = target.dispatch_event(&web_event) {
			error!(?error, "Event dispatch failed");
		}
		let dispatched = self.dispatch.replace(outer);

		if let Some(dispatched) = dispatched {
			if dispatched.immediately_stopped {
				event.stop_immediate_propagation();
			} else if dispatched.stopped {
				event.stop_propagation();
			}
		}
	}

	fn query_selector_all(&self, root: NodeId, selector: &str) -> Vec<NodeId> {
		let list = match self.element(root).map(|root| root.query_selector_all(selector)) {
			Ok(Ok(list)) => list,
			Ok(Err(error)) => {
				error!(?error, selector, "Invalid selector");
				return Vec::new();
			}
			Err(_) => return Vec::new(),
		};
		(0..list.length()).filter_map(|i| list.get(i)).map(|node| self.adopt(&node)).collect()
	}
}

/// A tick handler that calls `tick` in a microtask.
///
/// Pass the result to [`EngineBuilder::tick_handler`](`crate::EngineBuilder::tick_handler`).
pub fn microtask_tick(tick: impl 'static + Fn()) -> impl Fn() {
	let closure = Closure::wrap(Box::new(move |_: JsValue| tick()) as Box<dyn FnMut(JsValue)>);
	move || drop(Promise::resolve(&JsValue::NULL).then(&closure))
}

//! The capability set the reconciler needs from a document.
//!
//! Nothing outside of this module talks to a concrete DOM, so the engine runs the same against
//! [`MockDom`](`crate::mock_dom::MockDom`) and (with the `"web"` feature) [`WebDom`](`crate::web::WebDom`).

use crate::Value;
use core::{
	cell::Cell,
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;

/// An opaque handle to a node owned by a [`DomAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
impl NodeId {
	#[must_use]
	pub fn from_raw(raw: u32) -> Self {
		Self(raw)
	}

	#[must_use]
	pub fn raw(self) -> u32 {
		self.0
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
	Element,
	Text,
	Comment,
}

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
	#[error("Unknown node {0:?}")]
	UnknownNode(NodeId),
	#[error("{child:?} is not a child of {parent:?}")]
	NotAChild { parent: NodeId, child: NodeId },
	#[error("{0:?} is not an element")]
	NotAnElement(NodeId),
	#[error("Inserting {node:?} into {parent:?} would create a cycle")]
	HierarchyRequest { parent: NodeId, node: NodeId },
	#[error("DOM operation failed: {0}")]
	Other(String),
}

/// A DOM event as seen by handlers.
pub struct Event {
	kind: Rc<str>,
	detail: Value,
	propagation_stopped: Cell<bool>,
	immediate_propagation_stopped: Cell<bool>,
}
impl Event {
	#[must_use]
	pub fn new(kind: impl Into<Rc<str>>) -> Self {
		Self::with_detail(kind, Value::Undefined)
	}

	#[must_use]
	pub fn with_detail(kind: impl Into<Rc<str>>, detail: Value) -> Self {
		Self {
			kind: kind.into(),
			detail,
			propagation_stopped: Cell::new(false),
			immediate_propagation_stopped: Cell::new(false),
		}
	}

	#[must_use]
	pub fn kind(&self) -> &str {
		&self.kind
	}

	#[must_use]
	pub fn detail(&self) -> &Value {
		&self.detail
	}

	pub fn stop_propagation(&self) {
		self.propagation_stopped.set(true)
	}

	pub fn stop_immediate_propagation(&self) {
		self.propagation_stopped.set(true);
		self.immediate_propagation_stopped.set(true)
	}

	#[must_use]
	pub fn propagation_stopped(&self) -> bool {
		self.propagation_stopped.get()
	}

	#[must_use]
	pub fn immediate_propagation_stopped(&self) -> bool {
		self.immediate_propagation_stopped.get()
	}
}
impl Debug for Event {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event")
			.field("kind", &self.kind)
			.field("detail", &self.detail)
			.field("propagation_stopped", &self.propagation_stopped.get())
			.finish()
	}
}

/// A DOM event listener. Compared by identity.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Event)>);
impl Listener {
	pub fn new(f: impl 'static + Fn(&Event)) -> Self {
		Self(Rc::new(f))
	}

	pub fn call(&self, event: &Event) {
		(self.0)(event)
	}
}
impl PartialEq for Listener {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Listener {}
impl Debug for Listener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Listener").field(&Rc::as_ptr(&self.0).cast::<()>()).finish()
	}
}

/// Document operations the engine performs.
///
/// Fallible structural operations report [`DomError`]s,
/// while lookups on unknown nodes answer with [`None`] or an empty result.
pub trait DomAdapter {
	fn create_element(&mut self, tag: &str) -> Result<NodeId, DomError>;
	fn create_element_ns(&mut self, namespace: &str, tag: &str) -> Result<NodeId, DomError>;
	fn create_text_node(&mut self, text: &str) -> NodeId;
	fn create_comment(&mut self, text: &str) -> NodeId;

	/// Moves `node` if it is already attached somewhere.
	fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<(), DomError>;
	fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError>;
	fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
		self.insert_before(parent, child, None)
	}

	fn parent_node(&self, node: NodeId) -> Option<NodeId>;
	fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
	fn child_nodes(&self, node: NodeId) -> Vec<NodeId>;

	fn kind(&self, node: NodeId) -> Option<NodeKind>;
	fn is_element(&self, node: NodeId) -> bool {
		self.kind(node) == Some(NodeKind::Element)
	}
	fn is_text(&self, node: NodeId) -> bool {
		self.kind(node) == Some(NodeKind::Text)
	}
	fn is_comment(&self, node: NodeId) -> bool {
		self.kind(node) == Some(NodeKind::Comment)
	}

	/// Upper-case for HTML elements, as in browsers.
	fn tag_name(&self, element: NodeId) -> Option<String>;

	fn set_text_content(&mut self, node: NodeId, text: &str);
	fn text_content(&self, node: NodeId) -> Option<String>;

	fn get_attribute(&self, element: NodeId, name: &str) -> Option<String>;
	fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<(), DomError>;
	fn set_attribute_ns(&mut self, element: NodeId, namespace: &str, name: &str, value: &str) -> Result<(), DomError>;
	fn remove_attribute(&mut self, element: NodeId, name: &str) -> Result<(), DomError>;

	fn get_property(&self, node: NodeId, name: &str) -> Value;
	fn set_property(&mut self, node: NodeId, name: &str, value: &Value);
	fn remove_property(&mut self, node: NodeId, name: &str);

	fn add_class(&mut self, element: NodeId, class: &str);
	fn remove_class(&mut self, element: NodeId, class: &str);

	fn set_style_property(&mut self, element: NodeId, name: &str, value: &str);
	fn remove_style_property(&mut self, element: NodeId, name: &str);
	fn set_style_text(&mut self, element: NodeId, css_text: &str);

	fn add_event_listener(&mut self, node: NodeId, kind: &str, listener: &Listener);
	fn remove_event_listener(&mut self, node: NodeId, kind: &str, listener: &Listener);
	fn dispatch_event(&mut self, node: NodeId, event: &Event);

	/// Matches descendants of `root` in document order.
	fn query_selector_all(&self, root: NodeId, selector: &str) -> Vec<NodeId>;
}

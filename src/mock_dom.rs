//! An in-memory [`DomAdapter`] for tests and headless rendering.
//!
//! [`MockDom`] is a cheap handle: clones share one document, so a test can keep one to inspect what the engine did.

use crate::{
	dom::{DomAdapter, DomError, Event, Listener, NodeKind},
	NodeId, Value,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::trace;

/// Counts of structural operations, for asserting on DOM churn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
	pub created: usize,
	pub inserted: usize,
	pub removed: usize,
	pub attribute_writes: usize,
	pub text_writes: usize,
}

struct MockNode {
	kind: NodeKind,
	tag: String,
	text: String,
	attributes: Vec<(String, String)>,
	properties: HashMap<String, Value>,
	styles: Vec<(String, String)>,
	listeners: Vec<(Rc<str>, Listener)>,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}
impl MockNode {
	fn new(kind: NodeKind) -> Self {
		Self {
			kind,
			tag: String::new(),
			text: String::new(),
			attributes: Vec::new(),
			properties: HashMap::new(),
			styles: Vec::new(),
			listeners: Vec::new(),
			parent: None,
			children: Vec::new(),
		}
	}

	fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}

	fn set_attribute(&mut self, name: &str, value: String) {
		match self.attributes.iter_mut().find(|(key, _)| key == name) {
			Some((_, slot)) => *slot = value,
			None => self.attributes.push((name.to_owned(), value)),
		}
	}

	fn classes(&self) -> Vec<&str> {
		self.attribute("class").map(|class| class.split_whitespace().collect()).unwrap_or_default()
	}
}

#[derive(Default)]
struct MockState {
	nodes: Vec<MockNode>,
	stats: MockStats,
}
impl MockState {
	fn node(&self, node: NodeId) -> Result<&MockNode, DomError> {
		self.nodes.get(node.raw() as usize).ok_or(DomError::UnknownNode(node))
	}

	fn node_mut(&mut self, node: NodeId) -> Result<&mut MockNode, DomError> {
		self.nodes.get_mut(node.raw() as usize).ok_or(DomError::UnknownNode(node))
	}

	fn element_mut(&mut self, element: NodeId) -> Result<&mut MockNode, DomError> {
		let node = self.node_mut(element)?;
		if node.kind == NodeKind::Element {
			Ok(node)
		} else {
			Err(DomError::NotAnElement(element))
		}
	}

	fn push(&mut self, node: MockNode) -> NodeId {
		#[allow(clippy::cast_possible_truncation)]
		let id = NodeId::from_raw(self.nodes.len() as u32);
		self.nodes.push(node);
		self.stats.created += 1;
		id
	}

	fn detach(&mut self, node: NodeId) {
		let parent = self.nodes[node.raw() as usize].parent.take();
		if let Some(parent) = parent {
			self.nodes[parent.raw() as usize].children.retain(|&child| child != node);
		}
	}

	fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
		loop {
			if node == ancestor {
				return true;
			}
			match self.nodes[node.raw() as usize].parent {
				Some(parent) => node = parent,
				None => return false,
			}
		}
	}

	fn descendants(&self, root: NodeId, into: &mut Vec<NodeId>) {
		for &child in &self.nodes[root.raw() as usize].children {
			into.push(child);
			self.descendants(child, into);
		}
	}

	fn write_html(&self, node: NodeId, html: &mut String) {
		let data = &self.nodes[node.raw() as usize];
		match data.kind {
			NodeKind::Text => html.push_str(&data.text),
			NodeKind::Comment => {
				html.push_str("<!--");
				html.push_str(&data.text);
				html.push_str("-->");
			}
			NodeKind::Element => {
				let tag = data.tag.to_ascii_lowercase();
				html.push('<');
				html.push_str(&tag);
				for (name, value) in &data.attributes {
					html.push(' ');
					html.push_str(name);
					html.push_str("=\"");
					html.push_str(value);
					html.push('"');
				}
				if !data.styles.is_empty() {
					html.push_str(" style=\"");
					html.push_str(&style_text(&data.styles));
					html.push('"');
				}
				html.push('>');
				for &child in &data.children {
					self.write_html(child, html);
				}
				html.push_str("</");
				html.push_str(&tag);
				html.push('>');
			}
		}
	}

	fn write_text(&self, node: NodeId, text: &mut String) {
		let data = &self.nodes[node.raw() as usize];
		match data.kind {
			NodeKind::Text => text.push_str(&data.text),
			NodeKind::Comment => (),
			NodeKind::Element => {
				for &child in &data.children {
					self.write_text(child, text);
				}
			}
		}
	}

	fn matches(&self, node: NodeId, selector: &str) -> bool {
		let data = &self.nodes[node.raw() as usize];
		if data.kind != NodeKind::Element {
			return false;
		}
		selector.split(',').map(str::trim).any(|compound| {
			if compound == "*" {
				return true;
			}
			let (tag, id, classes) = parse_compound(compound);
			(tag.is_empty() || tag.eq_ignore_ascii_case(&data.tag))
				&& id.map_or(true, |id| data.attribute("id") == Some(id))
				&& classes.iter().all(|class| data.classes().contains(class))
		})
	}
}

/// `tag#id.class.class`, each part optional.
fn parse_compound(compound: &str) -> (&str, Option<&str>, Vec<&str>) {
	let is_marker = |c: char| c == '#' || c == '.';
	let tag_end = compound.find(is_marker).unwrap_or(compound.len());
	let (mut id, mut classes) = (None, Vec::new());
	let mut rest = &compound[tag_end..];
	while let Some(marker) = rest.chars().next() {
		let body = &rest[1..];
		let end = body.find(is_marker).unwrap_or(body.len());
		if marker == '#' {
			id = Some(&body[..end]);
		} else {
			classes.push(&body[..end]);
		}
		rest = &body[end..];
	}
	(&compound[..tag_end], id, classes)
}

fn style_text(styles: &[(String, String)]) -> String {
	styles.iter().map(|(name, value)| format!("{}: {};", name, value)).collect::<Vec<_>>().join(" ")
}

fn is_valid_tag(tag: &str) -> bool {
	tag.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
		&& tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ':')
}

#[derive(Clone, Default)]
pub struct MockDom(Rc<RefCell<MockState>>);
impl MockDom {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn stats(&self) -> MockStats {
		self.0.borrow().stats
	}

	pub fn reset_stats(&self) {
		self.0.borrow_mut().stats = MockStats::default();
	}

	/// Serializes `node` and its subtree, with lowercase tag names.
	#[must_use]
	pub fn outer_html(&self, node: NodeId) -> String {
		let state = self.0.borrow();
		let mut html = String::new();
		if state.node(node).is_ok() {
			state.write_html(node, &mut html);
		}
		html
	}

	#[must_use]
	pub fn inner_html(&self, node: NodeId) -> String {
		let state = self.0.borrow();
		let mut html = String::new();
		if let Ok(data) = state.node(node) {
			for &child in &data.children {
				state.write_html(child, &mut html);
			}
		}
		html
	}

	#[must_use]
	pub fn style(&self, element: NodeId, name: &str) -> Option<String> {
		let state = self.0.borrow();
		let data = state.node(element).ok()?;
		data.styles.iter().find(|(key, _)| key == name).map(|(_, value)| value.clone())
	}

	#[must_use]
	pub fn listener_count(&self, node: NodeId) -> usize {
		self.0.borrow().node(node).map_or(0, |data| data.listeners.len())
	}

	#[must_use]
	pub fn has_class(&self, element: NodeId, class: &str) -> bool {
		self.0.borrow().node(element).map_or(false, |data| data.classes().contains(&class))
	}
}
impl Debug for MockDom {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let state = self.0.borrow();
		f.debug_struct("MockDom")
			.field("nodes", &state.nodes.len())
			.field("stats", &state.stats)
			.finish()
	}
}

impl DomAdapter for MockDom {
	fn create_element(&mut self, tag: &str) -> Result<NodeId, DomError> {
		if !is_valid_tag(tag) {
			return Err(DomError::Other(format!("Invalid tag name {:?}", tag)));
		}
		let mut node = MockNode::new(NodeKind::Element);
		node.tag = tag.to_ascii_uppercase();
		Ok(self.0.borrow_mut().push(node))
	}

	fn create_element_ns(&mut self, _namespace: &str, tag: &str) -> Result<NodeId, DomError> {
		if !is_valid_tag(tag) {
			return Err(DomError::Other(format!("Invalid tag name {:?}", tag)));
		}
		let mut node = MockNode::new(NodeKind::Element);
		node.tag = tag.to_owned();
		Ok(self.0.borrow_mut().push(node))
	}

	fn create_text_node(&mut self, text: &str) -> NodeId {
		let mut node = MockNode::new(NodeKind::Text);
		node.text = text.to_owned();
		self.0.borrow_mut().push(node)
	}

	fn create_comment(&mut self, text: &str) -> NodeId {
		let mut node = MockNode::new(NodeKind::Comment);
		node.text = text.to_owned();
		self.0.borrow_mut().push(node)
	}

	fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<(), DomError> {
		let mut state = self.0.borrow_mut();
		state.element_mut(parent)?;
		state.node(node)?;
		if state.is_inclusive_ancestor(node, parent) {
			return Err(DomError::HierarchyRequest { parent, node });
		}
		if let Some(reference) = reference {
			if state.node(reference)?.parent != Some(parent) {
				return Err(DomError::NotAChild { parent, child: reference });
			}
		}
		if reference == Some(node) {
			return Ok(());
		}

		state.detach(node);
		let children = &mut state.nodes[parent.raw() as usize].children;
		let index = reference
			.and_then(|reference| children.iter().position(|&child| child == reference))
			.unwrap_or(children.len());
		children.insert(index, node);
		state.nodes[node.raw() as usize].parent = Some(parent);
		state.stats.inserted += 1;
		Ok(())
	}

	fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
		let mut state = self.0.borrow_mut();
		if state.node(child)?.parent != Some(parent) {
			return Err(DomError::NotAChild { parent, child });
		}
		state.detach(child);
		state.stats.removed += 1;
		Ok(())
	}

	fn parent_node(&self, node: NodeId) -> Option<NodeId> {
		self.0.borrow().node(node).ok()?.parent
	}

	fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
		let state = self.0.borrow();
		let parent = state.node(node).ok()?.parent?;
		let siblings = &state.nodes[parent.raw() as usize].children;
		let index = siblings.iter().position(|&sibling| sibling == node)?;
		siblings.get(index + 1).copied()
	}

	fn child_nodes(&self, node: NodeId) -> Vec<NodeId> {
		self.0.borrow().node(node).map(|data| data.children.clone()).unwrap_or_default()
	}

	fn kind(&self, node: NodeId) -> Option<NodeKind> {
		self.0.borrow().node(node).ok().map(|data| data.kind)
	}

	fn tag_name(&self, element: NodeId) -> Option<String> {
		let state = self.0.borrow();
		let data = state.node(element).ok()?;
		(data.kind == NodeKind::Element).then(|| data.tag.clone())
	}

	fn set_text_content(&mut self, node: NodeId, text: &str) {
		let mut state = self.0.borrow_mut();
		let kind = match state.node(node) {
			Ok(data) => data.kind,
			Err(_) => return,
		};
		state.stats.text_writes += 1;
		if kind != NodeKind::Element {
			state.nodes[node.raw() as usize].text = text.to_owned();
			return;
		}
		for child in core::mem::take(&mut state.nodes[node.raw() as usize].children) {
			state.nodes[child.raw() as usize].parent = None;
		}
		if !text.is_empty() {
			let mut text_node = MockNode::new(NodeKind::Text);
			text_node.text = text.to_owned();
			text_node.parent = Some(node);
			let id = state.push(text_node);
			state.nodes[node.raw() as usize].children.push(id);
		}
	}

	fn text_content(&self, node: NodeId) -> Option<String> {
		let state = self.0.borrow();
		state.node(node).ok()?;
		let mut text = String::new();
		match state.nodes[node.raw() as usize].kind {
			NodeKind::Element => state.write_text(node, &mut text),
			_ => text.push_str(&state.nodes[node.raw() as usize].text),
		}
		Some(text)
	}

	fn get_attribute(&self, element: NodeId, name: &str) -> Option<String> {
		self.0.borrow().node(element).ok()?.attribute(name).map(ToOwned::to_owned)
	}

	fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<(), DomError> {
		let mut state = self.0.borrow_mut();
		state.element_mut(element)?.set_attribute(name, value.to_owned());
		state.stats.attribute_writes += 1;
		Ok(())
	}

	fn set_attribute_ns(&mut self, element: NodeId, _namespace: &str, name: &str, value: &str) -> Result<(), DomError> {
		self.set_attribute(element, name, value)
	}

	fn remove_attribute(&mut self, element: NodeId, name: &str) -> Result<(), DomError> {
		let mut state = self.0.borrow_mut();
		state.element_mut(element)?.attributes.retain(|(key, _)| key != name);
		state.stats.attribute_writes += 1;
		Ok(())
	}

	fn get_property(&self, node: NodeId, name: &str) -> Value {
		self.0
			.borrow()
			.node(node)
			.ok()
			.and_then(|data| data.properties.get(name).cloned())
			.unwrap_or_default()
	}

	fn set_property(&mut self, node: NodeId, name: &str, value: &Value) {
		if let Ok(data) = self.0.borrow_mut().node_mut(node) {
			data.properties.insert(name.to_owned(), value.clone());
		}
	}

	fn remove_property(&mut self, node: NodeId, name: &str) {
		if let Ok(data) = self.0.borrow_mut().node_mut(node) {
			data.properties.remove(name);
		}
	}

	fn add_class(&mut self, element: NodeId, class: &str) {
		let mut state = self.0.borrow_mut();
		if let Ok(data) = state.element_mut(element) {
			let mut classes = data.classes();
			if !classes.contains(&class) {
				classes.push(class);
				let joined = classes.join(" ");
				data.set_attribute("class", joined);
				state.stats.attribute_writes += 1;
			}
		}
	}

	fn remove_class(&mut self, element: NodeId, class: &str) {
		let mut state = self.0.borrow_mut();
		if let Ok(data) = state.element_mut(element) {
			let classes = data.classes();
			if classes.contains(&class) {
				let joined = classes.into_iter().filter(|&name| name != class).collect::<Vec<_>>().join(" ");
				data.set_attribute("class", joined);
				state.stats.attribute_writes += 1;
			}
		}
	}

	fn set_style_property(&mut self, element: NodeId, name: &str, value: &str) {
		if let Ok(data) = self.0.borrow_mut().element_mut(element) {
			match data.styles.iter_mut().find(|(key, _)| key == name) {
				Some((_, slot)) => *slot = value.to_owned(),
				None => data.styles.push((name.to_owned(), value.to_owned())),
			}
		}
	}

	fn remove_style_property(&mut self, element: NodeId, name: &str) {
		if let Ok(data) = self.0.borrow_mut().element_mut(element) {
			data.styles.retain(|(key, _)| key != name);
		}
	}

	fn set_style_text(&mut self, element: NodeId, css_text: &str) {
		if let Ok(data) = self.0.borrow_mut().element_mut(element) {
			data.styles = css_text
				.split(';')
				.filter_map(|declaration| {
					let (name, value) = declaration.split_once(':')?;
					Some((name.trim().to_owned(), value.trim().to_owned()))
				})
				.collect();
		}
	}

	fn add_event_listener(&mut self, node: NodeId, kind: &str, listener: &Listener) {
		if let Ok(data) = self.0.borrow_mut().node_mut(node) {
			if !data.listeners.iter().any(|(k, l)| &**k == kind && l == listener) {
				data.listeners.push((kind.into(), listener.clone()));
			}
		}
	}

	fn remove_event_listener(&mut self, node: NodeId, kind: &str, listener: &Listener) {
		if let Ok(data) = self.0.borrow_mut().node_mut(node) {
			data.listeners.retain(|(k, l)| !(&**k == kind && l == listener));
		}
	}

	/// Bubbles from `node` to the root of its tree.
	fn dispatch_event(&mut self, node: NodeId, event: &Event) {
		let path: Vec<(NodeId, Vec<Listener>)> = {
			let state = self.0.borrow();
			let mut path = Vec::new();
			let mut current = state.node(node).ok().map(|_| node);
			while let Some(target) = current {
				let data = &state.nodes[target.raw() as usize];
				let listeners = data
					.listeners
					.iter()
					.filter(|(kind, _)| &**kind == event.kind())
					.map(|(_, listener)| listener.clone())
					.collect();
				path.push((target, listeners));
				current = data.parent;
			}
			path
		};

		for (target, listeners) in path {
			trace!(?target, kind = event.kind(), "Event at");
			for listener in listeners {
				listener.call(event);
				if event.immediate_propagation_stopped() {
					return;
				}
			}
			if event.propagation_stopped() {
				return;
			}
		}
	}

	fn query_selector_all(&self, root: NodeId, selector: &str) -> Vec<NodeId> {
		let state = self.0.borrow();
		if state.node(root).is_err() {
			return Vec::new();
		}
		let mut descendants = Vec::new();
		state.descendants(root, &mut descendants);
		descendants.into_iter().filter(|&node| state.matches(node, selector)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::MockDom;
	use crate::{dom::DomAdapter, Event, Listener};
	use std::{cell::Cell, rc::Rc};

	#[test]
	fn tree_operations() {
		let mut dom = MockDom::new();
		let root = dom.create_element("div").unwrap();
		let a = dom.create_element("span").unwrap();
		let b = dom.create_text_node("b");
		dom.append_child(root, b).unwrap();
		dom.insert_before(root, a, Some(b)).unwrap();
		assert_eq!(dom.child_nodes(root), [a, b]);
		assert_eq!(dom.next_sibling(a), Some(b));
		assert_eq!(dom.outer_html(root), "<div><span></span>b</div>");
		assert!(dom.insert_before(a, root, None).is_err());

		dom.remove_child(root, a).unwrap();
		assert!(dom.remove_child(root, a).is_err());
		assert_eq!(dom.text_content(root).as_deref(), Some("b"));
	}

	#[test]
	fn selectors_and_classes() {
		let mut dom = MockDom::new();
		let root = dom.create_element("div").unwrap();
		let p = dom.create_element("p").unwrap();
		dom.set_attribute(p, "id", "main").unwrap();
		dom.add_class(p, "a");
		dom.add_class(p, "b");
		dom.append_child(root, p).unwrap();

		assert_eq!(dom.query_selector_all(root, "p#main.a.b"), [p]);
		assert_eq!(dom.query_selector_all(root, "span, .b"), [p]);
		assert!(dom.query_selector_all(root, ".c").is_empty());
		dom.remove_class(p, "a");
		assert_eq!(dom.get_attribute(p, "class").as_deref(), Some("b"));
	}

	#[test]
	fn bubbling() {
		let mut dom = MockDom::new();
		let outer = dom.create_element("div").unwrap();
		let inner = dom.create_element("button").unwrap();
		dom.append_child(outer, inner).unwrap();

		let calls = Rc::new(Cell::new(0));
		let counting = Listener::new({
			let calls = calls.clone();
			move |_| calls.set(calls.get() + 1)
		});
		dom.add_event_listener(outer, "click", &counting);
		dom.add_event_listener(outer, "click", &counting);
		dom.add_event_listener(inner, "click", &Listener::new(|_| ()));

		dom.dispatch_event(inner, &Event::new("click"));
		assert_eq!(calls.get(), 1);

		dom.add_event_listener(inner, "click", &Listener::new(Event::stop_propagation));
		dom.dispatch_event(inner, &Event::new("click"));
		assert_eq!(calls.get(), 1);
	}
}

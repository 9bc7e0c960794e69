use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};
use xylem::{
	mock_dom::MockDom, BoxError, Component, ComponentDef, Context, DomAdapter, Engine, Key, NodeId, Object, Tracked, VNode, Value,
	MAX_LIST_LENGTH,
};

/// Renders `state[key]` as text.
struct Reader {
	key: &'static str,
	state: Tracked,
	renders: Rc<Cell<usize>>,
	rejected_write: Rc<Cell<Option<bool>>>,
}
impl Component for Reader {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		self.renders.set(self.renders.get() + 1);
		if let Some(rejected) = self.rejected_write.get() {
			if !rejected {
				self.rejected_write.set(Some(!self.state.set("other", "written during render")));
			}
		}
		let value = self.state.get(self.key);
		Ok(vec![cx.api().t(value.to_text())])
	}
}

fn reader(key: &'static str, state: &Tracked) -> (Rc<ComponentDef>, Rc<Cell<usize>>) {
	let renders = Rc::new(Cell::new(0));
	let def = Rc::new(ComponentDef::new("x-reader", {
		let (state, renders) = (state.clone(), renders.clone());
		move |_| {
			Ok(Reader {
				key,
				state: state.clone(),
				renders: renders.clone(),
				rejected_write: Rc::default(),
			})
		}
	}));
	(def, renders)
}

fn mount(engine: &mut Engine, def: &Rc<ComponentDef>) -> NodeId {
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-reader", Some(def)).unwrap();
	engine.append_child(body, host).unwrap();
	host
}

#[test]
fn only_readers_of_a_key_rerender() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let state = engine.membrane().wrap(Object::from_entries([("a", 1), ("b", 1)]));
	let (a_def, a_renders) = reader("a", &state);
	let (b_def, b_renders) = reader("b", &state);
	let a_host = mount(&mut engine, &a_def);
	let b_host = mount(&mut engine, &b_def);
	assert_eq!((a_renders.get(), b_renders.get()), (1, 1));

	assert!(state.set("a", 2));
	engine.tick().unwrap();
	assert_eq!((a_renders.get(), b_renders.get()), (2, 1));
	assert_eq!(dom.text_content(a_host).as_deref(), Some("2"));
	assert_eq!(dom.text_content(b_host).as_deref(), Some("1"));
}

#[test]
fn invalidation_is_idempotent() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let state = engine.membrane().wrap(Object::from_entries([("a", 1)]));
	let (def, renders) = reader("a", &state);
	let host = mount(&mut engine, &def);
	let vm = engine.vm_of(host).unwrap();
	engine.tick().unwrap();

	state.set("a", 2);
	state.set("a", 3);
	assert_eq!(engine.is_dirty(vm), Some(true));
	assert_eq!(engine.is_scheduled(vm), Some(true));

	engine.tick().unwrap();
	assert_eq!(renders.get(), 2);
	assert_eq!(engine.is_dirty(vm), Some(false));
	assert_eq!(engine.is_scheduled(vm), Some(false));
	assert_eq!(dom.text_content(host).as_deref(), Some("3"));
}

#[test]
fn unchanged_writes_do_not_schedule() {
	let mut engine = Engine::new(MockDom::new());
	let state = engine.membrane().wrap(Object::from_entries([("a", 1)]));
	let (def, renders) = reader("a", &state);
	mount(&mut engine, &def);
	engine.tick().unwrap();

	state.set("a", 1);
	assert!(!engine.scheduler().has_pending_work());
	engine.tick().unwrap();
	assert_eq!(renders.get(), 1);
}

#[test]
fn tick_handler_fires_once_per_batch() {
	let requests = Rc::new(Cell::new(0));
	let mut engine = Engine::builder(MockDom::new())
		.tick_handler({
			let requests = requests.clone();
			move || requests.set(requests.get() + 1)
		})
		.build();
	let state = engine.membrane().wrap(Object::from_entries([("a", 1)]));
	let (def, _) = reader("a", &state);
	mount(&mut engine, &def);
	engine.tick().unwrap();
	let baseline = requests.get();

	state.set("a", 2);
	state.set("a", 3);
	assert_eq!(requests.get(), baseline + 1);
}

#[test]
fn writes_during_render_are_rejected() {
	let mut engine = Engine::new(MockDom::new());
	let state = engine.membrane().wrap(Object::from_entries([("a", 1)]));
	let rejected = Rc::new(Cell::new(Some(false)));
	let def = Rc::new(ComponentDef::new("x-reader", {
		let (state, rejected) = (state.clone(), rejected.clone());
		move |_| {
			Ok(Reader {
				key: "a",
				state: state.clone(),
				renders: Rc::default(),
				rejected_write: rejected.clone(),
			})
		}
	}));
	mount(&mut engine, &def);

	assert_eq!(rejected.get(), Some(true));
	assert_eq!(state.get("other"), Value::Undefined);
	assert!(!engine.scheduler().is_rendering());
}

#[test]
fn nested_objects_are_tracked() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let inner = Object::from_entries([("label", "old")]);
	let state = engine.membrane().wrap(Object::from_entries([("inner", inner.clone())]));

	struct Nested(Tracked);
	impl Component for Nested {
		fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
			let inner = self.0.get("inner");
			let label = inner.as_tracked().map_or(Value::Undefined, |inner| inner.get("label"));
			Ok(vec![cx.api().t(label.to_text())])
		}
	}
	let def = Rc::new(ComponentDef::new("x-nested", {
		let state = state.clone();
		move |_| Ok(Nested(state.clone()))
	}));
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-nested", Some(&def)).unwrap();
	engine.append_child(body, host).unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("old"));

	assert!(engine.membrane().wrap(inner).set("label", "new"));
	engine.tick().unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("new"));
}

#[test]
fn list_growth_notifies_length_readers() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let list = engine.membrane().wrap(Object::list([Value::from("a")]));
	let lengths = Rc::new(RefCell::new(Vec::new()));

	struct Count(Tracked, Rc<RefCell<Vec<usize>>>);
	impl Component for Count {
		fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
			let len = self.0.len();
			self.1.borrow_mut().push(len);
			Ok(vec![cx.api().t(len.to_string())])
		}
	}
	let def = Rc::new(ComponentDef::new("x-count", {
		let (list, lengths) = (list.clone(), lengths.clone());
		move |_| Ok(Count(list.clone(), lengths.clone()))
	}));
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-count", Some(&def)).unwrap();
	engine.append_child(body, host).unwrap();

	assert!(list.push("b"));
	engine.tick().unwrap();
	assert!(list.splice(0, 2, vec![Value::from("c")]).is_some());
	engine.tick().unwrap();
	assert_eq!(*lengths.borrow(), [1, 2, 1]);
	assert_eq!(dom.text_content(host).as_deref(), Some("1"));
}

#[test]
fn wrappers_are_memoized() {
	let engine = Engine::new(MockDom::new());
	let object = Object::record();
	let a = engine.membrane().wrap(object.clone());
	let b = engine.membrane().wrap(object.clone());
	assert!(a.ptr_eq(&b));
	assert_eq!(a.target(), object);

	drop((a, b));
	engine.membrane().collect_garbage();
	assert_eq!(engine.membrane().replica_count(), 0);
}

#[test]
fn deletion_always_notifies() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let state = engine.membrane().wrap(Object::from_entries([("a", 1)]));
	let (def, renders) = reader("a", &state);
	let host = mount(&mut engine, &def);
	let vm = engine.vm_of(host).unwrap();
	engine.tick().unwrap();

	assert!(state.delete("a"));
	assert_eq!(engine.is_scheduled(vm), Some(true));
	engine.tick().unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("undefined"));

	// Already absent.
	assert!(state.delete("a"));
	assert_eq!(engine.is_dirty(vm), Some(true));
	engine.tick().unwrap();
	assert_eq!(renders.get(), 3);
}

#[test]
fn oversized_list_writes_are_refused() {
	let engine = Engine::new(MockDom::new());
	let list = engine.membrane().wrap(Object::list([Value::from(1)]));

	assert!(!list.set(usize::MAX, 2));
	assert!(!list.set(MAX_LIST_LENGTH, 2));
	assert!(!list.set(Key::Length, f64::INFINITY));
	assert!(!list.set(Key::Length, f64::NAN));
	assert_eq!(list.target().len(), 1);

	assert!(list.set(3_usize, 4));
	assert_eq!(list.target().len(), 4);
	assert!(list.set(Key::Length, 2.0));
	assert_eq!(list.target().len(), 2);
}

use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};
use xylem::{
	mock_dom::MockDom, BoxError, Callback, Component, ComponentDef, Context, DomAdapter, Engine, Error, Key, NodeId, Object, Service,
	ServiceContext, Tracked, VNode, VNodeData, Value,
};

type Log = Rc<RefCell<Vec<String>>>;

/// Set `RUST_LOG=xylem=trace` to follow along.
fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init()
		.ok();
}

fn log(log: &Log, entry: impl Into<String>) {
	log.borrow_mut().push(entry.into());
}

fn take(log: &Log) -> Vec<String> {
	log.borrow_mut().drain(..).collect()
}

/// Reads `state.x` and its `label` prop.
struct Child {
	state: Tracked,
	log: Log,
}
impl Component for Child {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		log(&self.log, "render child");
		let text = format!("{}:{}", cx.prop("label").to_text(), self.state.get("x").to_text());
		Ok(vec![cx.api().t(text)])
	}

	fn connected(&mut self, _: &mut Context<'_>) -> Result<(), BoxError> {
		log(&self.log, "connected child");
		Ok(())
	}

	fn disconnected(&mut self, _: &mut Context<'_>) -> Result<(), BoxError> {
		log(&self.log, "disconnected child");
		Ok(())
	}
}

/// Reads `state.y` and renders a [`Child`] when `state.show` isn't `false`.
struct Parent {
	state: Tracked,
	child: Rc<ComponentDef>,
	log: Log,
}
impl Component for Parent {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		log(&self.log, "render parent");
		let api = cx.api();
		let label = self.state.get("y");
		if self.state.get("show") == Value::Bool(false) {
			return Ok(vec![]);
		}
		Ok(vec![api.c("x-child", &self.child, VNodeData::new().prop("label", label))])
	}

	fn connected(&mut self, _: &mut Context<'_>) -> Result<(), BoxError> {
		log(&self.log, "connected parent");
		Ok(())
	}

	fn rendered(&mut self, _: &mut Context<'_>) -> Result<(), BoxError> {
		log(&self.log, "rendered parent");
		Ok(())
	}
}

fn family(engine: &mut Engine, log: &Log) -> (Tracked, NodeId) {
	let state = engine.membrane().wrap(Object::from_entries([("x", "x0"), ("y", "y0")]));
	let child = Rc::new(
		ComponentDef::new("x-child", {
			let (state, log) = (state.clone(), log.clone());
			move |_| {
				Ok(Child {
					state: state.clone(),
					log: log.clone(),
				})
			}
		})
		.prop("label"),
	);
	let parent = Rc::new(ComponentDef::new("x-parent", {
		let (state, log) = (state.clone(), log.clone());
		move |_| {
			Ok(Parent {
				state: state.clone(),
				child: child.clone(),
				log: log.clone(),
			})
		}
	}));

	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-parent", Some(&parent)).unwrap();
	engine.append_child(body, host).unwrap();
	(state, host)
}

#[test]
fn mounting_order() {
	init_tracing();
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let (_, host) = family(&mut engine, &log);

	assert_eq!(dom.outer_html(host), "<x-parent><x-child>y0:x0</x-child></x-parent>");
	assert_eq!(take(&log), ["render parent", "render child"]);

	engine.tick().unwrap();
	assert_eq!(take(&log), ["connected parent", "rendered parent", "connected child"]);
}

#[test]
fn ancestors_rehydrate_first() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let (state, host) = family(&mut engine, &log);
	engine.tick().unwrap();
	take(&log);

	// The child is queued first, but the parent has the lower insertion index.
	state.set("x", "x1");
	state.set("y", "y1");
	engine.tick().unwrap();

	assert_eq!(take(&log), ["render parent", "render child", "rendered parent"]);
	assert_eq!(dom.outer_html(host), "<x-parent><x-child>y1:x1</x-child></x-parent>");
}

#[test]
fn removal_disconnects_and_releases() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let (state, host) = family(&mut engine, &log);
	engine.tick().unwrap();
	let child_host = dom.child_nodes(host)[0];
	let child = engine.vm_of(child_host).unwrap();
	take(&log);

	state.set("show", false);
	engine.tick().unwrap();
	assert_eq!(take(&log), ["render parent", "rendered parent", "disconnected child"]);
	assert_eq!(dom.parent_node(child_host), None);
	assert_eq!(engine.insertion_index(child), None);

	// Writes to what the released child read no longer schedule anything.
	state.set("x", "x2");
	assert!(!engine.scheduler().has_pending_work());
}

#[test]
fn services_see_children_disconnect() {
	let dom = MockDom::new();
	let seen = Log::default();
	let mut engine = Engine::builder(dom.clone())
		.service(Service::new().disconnected({
			let seen = seen.clone();
			move |cx: &ServiceContext<'_>| log(&seen, cx.def().name())
		}))
		.build();
	let (state, host) = family(&mut engine, &Log::default());
	engine.tick().unwrap();
	let child = engine.vm_of(dom.child_nodes(host)[0]).unwrap();

	state.set("show", false);
	engine.tick().unwrap();
	assert_eq!(take(&seen), ["x-child"]);
	assert_eq!(engine.insertion_index(child), None);
	assert_eq!(engine.vm_count(), 1);
}

#[test]
fn root_removal_disconnects() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let (_, host) = family(&mut engine, &log);
	engine.tick().unwrap();
	take(&log);

	let body = dom.parent_node(host).unwrap();
	let parent = engine.vm_of(host).unwrap();
	engine.remove_child(body, host).unwrap();
	engine.tick().unwrap();
	assert_eq!(take(&log), ["disconnected child"]);
	assert_eq!(engine.insertion_index(parent), Some(0));

	// The disconnected child was released, so it comes back as a fresh instance.
	engine.append_child(body, host).unwrap();
	assert_eq!(take(&log), ["render parent", "render child"]);
	assert_eq!(engine.insertion_index(parent).map(|idx| idx > 0), Some(true));
	assert_eq!(dom.outer_html(host), "<x-parent><x-child>y0:x0</x-child></x-parent>");
}

struct Flaky {
	fail: Rc<Cell<bool>>,
	state: Tracked,
}
impl Component for Flaky {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		let value = self.state.get("value");
		if self.fail.get() {
			return Err("render failed".into());
		}
		Ok(vec![cx.api().t(value.to_text())])
	}
}

#[test]
fn render_failure_restores_context() {
	init_tracing();
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let state = engine.membrane().wrap(Object::from_entries([("value", "ok")]));
	let fail = Rc::new(Cell::new(true));
	let def = Rc::new(ComponentDef::new("x-flaky", {
		let (fail, state) = (fail.clone(), state.clone());
		move |_| {
			Ok(Flaky {
				fail: fail.clone(),
				state: state.clone(),
			})
		}
	}));
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-flaky", Some(&def)).unwrap();
	let vm = engine.vm_of(host).unwrap();

	match engine.append_child(body, host) {
		Err(Error::Lifecycle {
			vm: failed,
			callback: Callback::Render,
			..
		}) => assert_eq!(failed, vm),
		other => panic!("Expected a render failure, got {:?}", other),
	}
	assert!(!engine.scheduler().is_rendering());
	assert_eq!(engine.is_dirty(vm), Some(true));
	assert_eq!(engine.is_scheduled(vm), Some(false));

	// Subscriptions were dropped with the failed render.
	state.set("value", "still ok");
	assert_eq!(engine.is_scheduled(vm), Some(false));

	fail.set(false);
	engine.mark_dirty(vm).unwrap();
	engine.tick().unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("still ok"));
	assert_eq!(engine.is_dirty(vm), Some(false));
}

#[test]
fn construction_failure_is_reported() {
	init_tracing();
	let mut engine = Engine::new(MockDom::new());
	let def = Rc::new(ComponentDef::new::<Flaky>("x-broken", |_| Err("nope".into())));
	match engine.create_element("x-broken", Some(&def)) {
		Err(Error::Lifecycle {
			callback: Callback::Construct,
			..
		}) => (),
		other => panic!("Expected a construction failure, got {:?}", other),
	}
	assert!(!engine.scheduler().is_rendering());
}

#[test]
fn upgrade_requires_a_definition() {
	let mut engine = Engine::new(MockDom::new());
	let element = engine.dom_mut().create_element("x-unknown").unwrap();
	match engine.upgrade_element(element, None) {
		Err(Error::InvalidComponentDefinition { tag }) => assert_eq!(tag, "x-unknown"),
		other => panic!("Expected an invalid definition error, got {:?}", other),
	}
}

/// Shows its `title` prop and records attribute changes.
struct Titled {
	log: Log,
}
impl Component for Titled {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		Ok(vec![cx.api().t(cx.prop("title").to_text())])
	}

	fn attribute_changed(&mut self, _: &mut Context<'_>, name: &str, old: &Value, new: &Value) -> Result<(), BoxError> {
		log(&self.log, format!("{}: {} -> {}", name, old.to_text(), new.to_text()));
		Ok(())
	}
}

fn titled(log: &Log) -> Rc<ComponentDef> {
	let log = log.clone();
	Rc::new(
		ComponentDef::new("x-titled", move |_| Ok(Titled { log: log.clone() }))
			.prop_with_default("title", "untitled")
			.observe("title")
			.observe("data-mode"),
	)
}

#[test]
fn root_props_round_trip() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-titled", Some(&titled(&log))).unwrap();
	engine.append_child(body, host).unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("untitled"));
	assert_eq!(engine.get_prop(host, "title").unwrap(), Value::from("untitled"));

	engine.set_prop(host, "title", Value::from("Hello")).unwrap();
	assert_eq!(engine.get_prop(host, "title").unwrap(), Value::from("Hello"));
	assert_eq!(take(&log), ["title: untitled -> Hello"]);
	engine.tick().unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("Hello"));
}

#[test]
fn root_attributes() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let host = engine.create_element("x-titled", Some(&titled(&log))).unwrap();

	// Backed by a public property, so ignored.
	engine.set_attribute(host, "title", "ignored").unwrap();
	assert_eq!(engine.get_attribute(host, "title"), None);

	engine.set_attribute(host, "data-mode", "dark").unwrap();
	engine.set_attribute(host, "data-mode", "dark").unwrap();
	engine.remove_attribute(host, "data-mode").unwrap();
	engine.set_attribute(host, "data-other", "x").unwrap();
	assert_eq!(take(&log), ["data-mode: null -> dark", "data-mode: dark -> null"]);
	assert_eq!(dom.get_attribute(host, "data-other").as_deref(), Some("x"));
}

#[test]
fn upgrade_reads_element_state() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let element = engine.dom_mut().create_element("x-titled").unwrap();
	engine.dom_mut().set_property(element, "title", &Value::from("from property"));
	engine.dom_mut().set_attribute(element, "class", "a b").unwrap();

	let vm = engine.upgrade_element(element, Some(&titled(&log))).unwrap();
	assert_eq!(engine.vm_of(element), Some(vm));
	let body = engine.dom_mut().create_element("body").unwrap();
	engine.append_child(body, element).unwrap();
	assert_eq!(dom.text_content(element).as_deref(), Some("from property"));
	assert!(dom.has_class(element, "a") && dom.has_class(element, "b"));
}

/// Passes `state.title` to an [`Titled`] only while it's not `null`.
struct Owner {
	state: Tracked,
	titled: Rc<ComponentDef>,
}
impl Component for Owner {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		let title = self.state.get("title");
		let mut data = VNodeData::new().attr("data-mode", self.state.get("mode"));
		if !title.is_nullish() {
			data = data.prop("title", title);
		}
		Ok(vec![cx.api().c("x-titled", &self.titled, data)])
	}
}

#[test]
fn props_reset_when_no_longer_passed() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let state = engine.membrane().wrap(Object::from_entries([("title", "given"), ("mode", "light")]));
	let def = Rc::new(ComponentDef::new("x-owner", {
		let (state, titled) = (state.clone(), titled(&log));
		move |_| {
			Ok(Owner {
				state: state.clone(),
				titled: titled.clone(),
			})
		}
	}));
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-owner", Some(&def)).unwrap();
	engine.append_child(body, host).unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("given"));
	assert_eq!(take(&log), ["title: untitled -> given", "data-mode: null -> light"]);

	state.set("title", Value::Null);
	state.set("mode", "dark");
	engine.tick().unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("untitled"));
	assert_eq!(take(&log), ["title: given -> untitled", "data-mode: light -> dark"]);
}

#[test]
fn missing_attribute_name() {
	struct Asking(Rc<RefCell<Option<Result<Option<String>, String>>>>);
	impl Component for Asking {
		fn render(&mut self, _: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
			Ok(vec![])
		}

		fn connected(&mut self, cx: &mut Context<'_>) -> Result<(), BoxError> {
			*self.0.borrow_mut() = Some(cx.get_attribute(None).map_err(|error| error.to_string()));
			match cx.get_attribute(None) {
				Err(Error::MissingArgument { method, .. }) => assert_eq!(method, "get_attribute"),
				other => panic!("Expected a missing argument, got {:?}", other),
			}
			Ok(())
		}
	}

	let mut engine = Engine::new(MockDom::new());
	let seen = Rc::new(RefCell::new(None));
	let def = Rc::new(ComponentDef::new("x-asking", {
		let seen = seen.clone();
		move |_| Ok(Asking(seen.clone()))
	}));
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-asking", Some(&def)).unwrap();
	engine.append_child(body, host).unwrap();
	engine.tick().unwrap();
	assert!(matches!(&*seen.borrow(), Some(Err(message)) if message.contains("1 argument is required")));
}

/// Builds its heading once per instance and counts its renders.
struct Cached {
	state: Tracked,
	builds: Rc<Cell<usize>>,
}
impl Component for Cached {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		let cache = cx.render_cache()?;
		let renders = cache.get(&Key::from("renders")).as_f64().unwrap_or(0.0) + 1.0;
		cache.set(&Key::from("renders"), Value::from(renders));
		if cache.get(&Key::from("heading")).is_undefined() {
			self.builds.set(self.builds.get() + 1);
			cache.set(&Key::from("heading"), Value::from("Heading"));
		}
		let heading = cache.get(&Key::from("heading")).to_text();
		let text = format!("{} #{} {}", heading, Value::from(renders).to_text(), self.state.get("x").to_text());
		Ok(vec![cx.api().t(text)])
	}
}

#[test]
fn render_cache_survives_rehydration() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let state = engine.membrane().wrap(Object::from_entries([("x", "x0")]));
	let builds = Rc::new(Cell::new(0));
	let def = Rc::new(ComponentDef::new("x-cached", {
		let (state, builds) = (state.clone(), builds.clone());
		move |_| {
			Ok(Cached {
				state: state.clone(),
				builds: builds.clone(),
			})
		}
	}));
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-cached", Some(&def)).unwrap();
	engine.append_child(body, host).unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("Heading #1 x0"));

	// Writing the cache during render doesn't schedule anything.
	assert!(!engine.is_scheduled(engine.vm_of(host).unwrap()).unwrap());
	state.set("x", "x1");
	engine.tick().unwrap();
	assert_eq!(dom.text_content(host).as_deref(), Some("Heading #2 x1"));
	assert_eq!(builds.get(), 1);
}

struct Leaf;
impl Component for Leaf {
	fn render(&mut self, _: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		Ok(vec![])
	}
}

/// Renders one [`Leaf`], keyed by `state.round`.
struct Rekeyed {
	state: Tracked,
	leaf: Rc<ComponentDef>,
}
impl Component for Rekeyed {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		let round = self.state.get("round").to_text();
		Ok(vec![cx.api().c("x-leaf", &self.leaf, VNodeData::new().key(round))])
	}
}

#[test]
fn replaced_vms_are_freed() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let state = engine.membrane().wrap(Object::from_entries([("round", 0)]));
	let leaf = Rc::new(ComponentDef::new("x-leaf", |_| Ok(Leaf)));
	let def = Rc::new(ComponentDef::new("x-rekeyed", {
		let state = state.clone();
		move |_| {
			Ok(Rekeyed {
				state: state.clone(),
				leaf: leaf.clone(),
			})
		}
	}));
	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-rekeyed", Some(&def)).unwrap();
	engine.append_child(body, host).unwrap();
	engine.tick().unwrap();

	let mut uids = Vec::new();
	for round in 1..=100 {
		state.set("round", round);
		engine.tick().unwrap();
		uids.push(engine.vm_of(dom.child_nodes(host)[0]).unwrap().uid());
	}
	assert_eq!(engine.vm_count(), 2);
	assert!(uids.windows(2).all(|pair| pair[0] < pair[1]));
}

use std::{cell::RefCell, rc::Rc};
use xylem::{
	mock_dom::MockDom, Api, BoxError, Component, ComponentDef, Context, DomAdapter, Engine, Event, Handler, Listener, NodeId,
	PatchTarget, Tracked, VNode, VNodeData, Value,
};

type Log = Rc<RefCell<Vec<String>>>;

fn recorder(log: &Log, entry: &'static str) -> Handler {
	let log = log.clone();
	Handler::new(move |_| log.borrow_mut().push(entry.to_owned()))
}

fn take(log: &Log) -> Vec<String> {
	log.borrow_mut().drain(..).collect()
}

fn mount_element(engine: &mut Engine, vnode: &mut VNode) -> (NodeId, NodeId) {
	let body = engine.dom_mut().create_element("body").unwrap();
	let element = engine.dom_mut().create_element(vnode.sel.as_deref().unwrap()).unwrap();
	engine.append_child(body, element).unwrap();
	engine.patch(PatchTarget::Element(element), vnode).unwrap();
	(body, element)
}

#[test]
fn element_handlers_swap_in_place() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let api = Api::top_level();
	let log = Log::default();

	let mut old = api.h("button", VNodeData::new().on("click", recorder(&log, "first")), vec![]);
	let (_, button) = mount_element(&mut engine, &mut old);
	engine.dispatch_event(button, &Event::new("click"));
	assert_eq!(take(&log), ["first"]);

	let mut new = api.h("button", VNodeData::new().on("click", recorder(&log, "second")), vec![]);
	engine.patch(old.into(), &mut new).unwrap();
	assert_eq!(dom.listener_count(button), 1);
	engine.dispatch_event(button, &Event::new("click"));
	assert_eq!(take(&log), ["second"]);

	let mut bare = api.h("button", VNodeData::new(), vec![]);
	engine.patch(new.into(), &mut bare).unwrap();
	assert_eq!(dom.listener_count(button), 0);
	engine.dispatch_event(button, &Event::new("click"));
	assert!(take(&log).is_empty());
}

#[test]
fn element_events_bubble_until_stopped() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let api = Api::top_level();
	let log = Log::default();

	let stopper = {
		let log = log.clone();
		Handler::new(move |event| {
			log.borrow_mut().push("item".to_owned());
			if event.detail() == &Value::from("stop") {
				event.stop_propagation();
			}
		})
	};
	let mut list = api.h(
		"ul",
		VNodeData::new().on("select", recorder(&log, "list")),
		vec![api.h("li", VNodeData::new().on("select", stopper), vec![])],
	);
	let (_, ul) = mount_element(&mut engine, &mut list);
	let li = dom.child_nodes(ul)[0];

	engine.dispatch_event(li, &Event::new("select"));
	assert_eq!(take(&log), ["item", "list"]);
	engine.dispatch_event(li, &Event::with_detail("select", Value::from("stop")));
	assert_eq!(take(&log), ["item"]);
}

#[test]
fn component_listeners_stop_immediately() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();

	struct Quiet;
	impl Component for Quiet {
		fn render(&mut self, _: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
			Ok(vec![])
		}
	}
	let def = Rc::new(ComponentDef::new("x-quiet", {
		let log = log.clone();
		move |cx| {
			let first = {
				let log = log.clone();
				Handler::new(move |event| {
					log.borrow_mut().push("first".to_owned());
					if event.detail() == &Value::from("stop") {
						event.stop_immediate_propagation();
					}
				})
			};
			cx.add_event_listener("ping", first)?;
			cx.add_event_listener("ping", recorder(&log, "second"))?;
			Ok(Quiet)
		}
	}));

	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-quiet", Some(&def)).unwrap();
	engine.append_child(body, host).unwrap();
	let outer = {
		let log = log.clone();
		Listener::new(move |_| log.borrow_mut().push("body".to_owned()))
	};
	engine.dom_mut().add_event_listener(body, "ping", &outer);
	assert_eq!(dom.listener_count(host), 1);

	engine.dispatch_event(host, &Event::new("ping"));
	assert_eq!(take(&log), ["first", "second", "body"]);
	engine.dispatch_event(host, &Event::with_detail("ping", Value::from("stop")));
	assert_eq!(take(&log), ["first"]);
}

/// Announces itself to its owner once connected.
struct Announcer;
impl Component for Announcer {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		Ok(vec![cx.api().t("announcer")])
	}

	fn connected(&mut self, cx: &mut Context<'_>) -> Result<(), BoxError> {
		cx.dispatch_event(&Event::with_detail("announce", Value::from(42)))?;
		Ok(())
	}
}

/// Listens to an [`Announcer`], rebinding its handler on every render.
struct Listening {
	state: Tracked,
	announcer: Rc<ComponentDef>,
	log: Log,
}
impl Component for Listening {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		let api = cx.api();
		let round = self.state.get("round").to_text();
		let handler = {
			let log = self.log.clone();
			api.b(move |event| log.borrow_mut().push(format!("{} in round {}", event.detail().to_text(), round)))
		};
		Ok(vec![api.c("x-announcer", &self.announcer, VNodeData::new().on("announce", handler))])
	}
}

#[test]
fn owners_receive_component_events() {
	let dom = MockDom::new();
	let mut engine = Engine::new(dom.clone());
	let log = Log::default();
	let state = engine.membrane().wrap(xylem::Object::from_entries([("round", 1)]));
	let announcer = Rc::new(ComponentDef::new("x-announcer", |_| Ok(Announcer)));
	let def = Rc::new(ComponentDef::new("x-listening", {
		let (state, log) = (state.clone(), log.clone());
		move |_| {
			Ok(Listening {
				state: state.clone(),
				announcer: announcer.clone(),
				log: log.clone(),
			})
		}
	}));

	let body = engine.dom_mut().create_element("body").unwrap();
	let host = engine.create_element("x-listening", Some(&def)).unwrap();
	engine.append_child(body, host).unwrap();
	engine.tick().unwrap();
	assert_eq!(take(&log), ["42 in round 1"]);

	state.set("round", 2);
	engine.tick().unwrap();
	let child = dom.child_nodes(host)[0];
	assert_eq!(dom.listener_count(child), 1);

	engine.dispatch_event(child, &Event::with_detail("announce", Value::from(7)));
	assert_eq!(take(&log), ["7 in round 2"]);
}

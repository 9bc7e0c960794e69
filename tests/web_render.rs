#![cfg(all(feature = "web", target_arch = "wasm32"))]

use std::{cell::Cell, rc::Rc};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::window;
use xylem::{web::WebDom, Api, BoxError, Component, ComponentDef, Context, Engine, Event, Handler, Object, PatchTarget, Tracked, VNode, VNodeData};

wasm_bindgen_test_configure!(run_in_browser);

/// A fresh container in the page body, so tests don't see each other's nodes.
fn container() -> (web_sys::Document, web_sys::Element) {
	tracing_wasm::try_set_as_global_default().ok();
	let document = window().unwrap().document().unwrap();
	let container = document.create_element("div").unwrap();
	document.body().unwrap().append_child(&container).unwrap();
	(document, container)
}

#[wasm_bindgen_test]
fn keyed_list() {
	let (document, container) = container();
	let dom = WebDom::new(document);
	let root = dom.adopt(&container);
	let mut engine = Engine::new(dom);

	let list = |keys: &[&str]| {
		let api = Api::top_level();
		api.h(
			"div",
			VNodeData::new(),
			keys.iter().map(|&key| api.h("p", VNodeData::new().key(key), vec![api.t(key)])).collect(),
		)
	};
	let mut old = list(&["a", "b", "c"]);
	engine.patch(PatchTarget::Element(root), &mut old).unwrap();
	assert_eq!(container.inner_html(), "<p>a</p><p>b</p><p>c</p>");

	let first = container.first_child().unwrap();
	let mut new = list(&["c", "a"]);
	engine.patch(old.into(), &mut new).unwrap();
	assert_eq!(container.inner_html(), "<p>c</p><p>a</p>");
	assert!(container.last_child().unwrap().is_same_node(Some(&first)));
}

struct Clicker {
	state: Tracked,
}
impl Component for Clicker {
	fn render(&mut self, cx: &mut Context<'_>) -> Result<Vec<VNode>, BoxError> {
		let api = cx.api();
		let clicks = self.state.get("clicks");
		let state = self.state.clone();
		let onclick = api.b(move |_| {
			let clicks = state.get("clicks").as_f64().unwrap_or_default();
			state.set("clicks", clicks + 1.);
		});
		Ok(vec![api.h("button", VNodeData::new().on("click", onclick), vec![api.t(clicks.to_text())])])
	}
}

#[wasm_bindgen_test]
fn component_events() {
	let (document, container) = container();
	let dom = WebDom::new(document);
	let root = dom.adopt(&container);
	let mut engine = Engine::new(dom);

	let state = engine.membrane().wrap(Object::from_entries([("clicks", 0)]));
	let def = Rc::new(ComponentDef::new("x-clicker", {
		let state = state.clone();
		move |_| Ok(Clicker { state: state.clone() })
	}));
	let host = engine.create_element("x-clicker", Some(&def)).unwrap();
	engine.append_child(root, host).unwrap();
	assert_eq!(container.inner_html(), "<x-clicker><button>0</button></x-clicker>");

	let pinged = Rc::new(Cell::new(false));
	let button = container.query_selector("button").unwrap().unwrap();
	button
		.dispatch_event(&web_sys::Event::new("click").unwrap())
		.unwrap();
	engine.tick().unwrap();
	assert_eq!(container.inner_html(), "<x-clicker><button>1</button></x-clicker>");

	let api = Api::top_level();
	let mut watcher = api.h(
		"section",
		VNodeData::new().on("ping", {
			let pinged = pinged.clone();
			Handler::new(move |event| pinged.set(event.detail().as_str() == Some("hi")))
		}),
		vec![],
	);
	let section = engine.dom_mut().create_element("section").unwrap();
	engine.append_child(root, section).unwrap();
	engine.patch(PatchTarget::Element(section), &mut watcher).unwrap();
	engine.dispatch_event(section, &Event::with_detail("ping", "hi".into()));
	assert!(pinged.get());
}

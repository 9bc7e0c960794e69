//! Engine-wide hooks into component life cycles.

use crate::{
	component::ComponentDef,
	piercing::{NodeProperty, PiercingContext, Reached},
	NodeId, Object, Tracked, VmId,
};
use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// Which hook of a [`Service`] to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceHook {
	/// Synchronously when a component with wired props is linked.
	Wiring,
	/// On the tick after each render.
	Rehydrated,
	Connected,
	Disconnected,
}

pub type ServiceCallback = Rc<dyn Fn(&ServiceContext<'_>)>;
pub type PiercingCallback = Rc<dyn Fn(&PiercingContext<'_>, &NodeProperty, &Reached) -> Option<Reached>>;

/// What a service hook gets to see of a VM.
pub struct ServiceContext<'a> {
	pub(crate) vm: VmId,
	pub(crate) element: Option<NodeId>,
	pub(crate) def: &'a ComponentDef,
	pub(crate) context: &'a Object,
	pub(crate) wired: &'a Tracked,
}
impl<'a> ServiceContext<'a> {
	#[must_use]
	pub fn vm(&self) -> VmId {
		self.vm
	}

	#[must_use]
	pub fn element(&self) -> Option<NodeId> {
		self.element
	}

	#[must_use]
	pub fn def(&self) -> &'a ComponentDef {
		self.def
	}

	/// Per-VM storage for services.
	#[must_use]
	pub fn context(&self) -> &'a Object {
		self.context
	}

	/// The component's wired values. Writes here re-render the component as needed.
	#[must_use]
	pub fn wired(&self) -> &'a Tracked {
		self.wired
	}
}

/// A set of optional hooks, registered through [`EngineBuilder::service`](`crate::EngineBuilder::service`).
#[derive(Clone, Default)]
pub struct Service {
	pub wiring: Option<ServiceCallback>,
	pub rehydrated: Option<ServiceCallback>,
	pub connected: Option<ServiceCallback>,
	pub disconnected: Option<ServiceCallback>,
	/// May substitute what a pierced node access returns.
	pub piercing: Option<PiercingCallback>,
}
impl Service {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn wiring(mut self, hook: impl 'static + Fn(&ServiceContext<'_>)) -> Self {
		self.wiring = Some(Rc::new(hook));
		self
	}

	#[must_use]
	pub fn rehydrated(mut self, hook: impl 'static + Fn(&ServiceContext<'_>)) -> Self {
		self.rehydrated = Some(Rc::new(hook));
		self
	}

	#[must_use]
	pub fn connected(mut self, hook: impl 'static + Fn(&ServiceContext<'_>)) -> Self {
		self.connected = Some(Rc::new(hook));
		self
	}

	#[must_use]
	pub fn disconnected(mut self, hook: impl 'static + Fn(&ServiceContext<'_>)) -> Self {
		self.disconnected = Some(Rc::new(hook));
		self
	}

	#[must_use]
	pub fn piercing(mut self, hook: impl 'static + Fn(&PiercingContext<'_>, &NodeProperty, &Reached) -> Option<Reached>) -> Self {
		self.piercing = Some(Rc::new(hook));
		self
	}
}
impl Debug for Service {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Service")
			.field("wiring", &self.wiring.is_some())
			.field("rehydrated", &self.rehydrated.is_some())
			.field("connected", &self.connected.is_some())
			.field("disconnected", &self.disconnected.is_some())
			.field("piercing", &self.piercing.is_some())
			.finish()
	}
}

/// Registered hooks, by kind, in registration order.
#[derive(Clone, Default)]
pub(crate) struct Services {
	wiring: Vec<ServiceCallback>,
	rehydrated: Vec<ServiceCallback>,
	connected: Vec<ServiceCallback>,
	disconnected: Vec<ServiceCallback>,
	piercing: Vec<PiercingCallback>,
}
impl Services {
	pub(crate) fn register(&mut self, service: Service) {
		let Service {
			wiring,
			rehydrated,
			connected,
			disconnected,
			piercing,
		} = service;
		self.wiring.extend(wiring);
		self.rehydrated.extend(rehydrated);
		self.connected.extend(connected);
		self.disconnected.extend(disconnected);
		self.piercing.extend(piercing);
	}

	pub(crate) fn hooks(&self, hook: ServiceHook) -> &[ServiceCallback] {
		match hook {
			ServiceHook::Wiring => &self.wiring,
			ServiceHook::Rehydrated => &self.rehydrated,
			ServiceHook::Connected => &self.connected,
			ServiceHook::Disconnected => &self.disconnected,
		}
	}

	pub(crate) fn has(&self, hook: ServiceHook) -> bool {
		!self.hooks(hook).is_empty()
	}

	pub(crate) fn piercing(&self) -> &[PiercingCallback] {
		&self.piercing
	}
}
impl Debug for Services {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Services")
			.field("wiring", &self.wiring.len())
			.field("rehydrated", &self.rehydrated.len())
			.field("connected", &self.connected.len())
			.field("disconnected", &self.disconnected.len())
			.field("piercing", &self.piercing.len())
			.finish()
	}
}

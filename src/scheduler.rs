//! Render context, dirty tracking and the deferred work queues.
//!
//! A [`Scheduler`] is shared (by cloning) between an [`Engine`](`crate::Engine`) and every [`Tracked`](`crate::Tracked`) it hands out,
//! so that writes made from event handlers can invalidate views without access to the engine itself.

use crate::{reactive::DepRecord, services::ServiceHook, VmId};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;
use tracing::{trace, trace_span};

/// The part of a VM that reactive bookkeeping needs to see.
pub(crate) struct VmState {
	pub(crate) id: VmId,
	/// Insertion index, `0` while unmounted.
	idx: Cell<u32>,
	dirty: Cell<bool>,
	scheduled: Cell<bool>,
	pub(crate) deps: RefCell<Vec<Rc<DepRecord>>>,
}
impl VmState {
	pub(crate) fn new(id: VmId) -> Rc<Self> {
		Rc::new(Self {
			id,
			idx: Cell::new(0),
			dirty: Cell::new(true),
			scheduled: Cell::new(false),
			deps: RefCell::default(),
		})
	}

	pub(crate) fn idx(&self) -> u32 {
		self.idx.get()
	}

	pub(crate) fn set_idx(&self, idx: u32) {
		self.idx.set(idx)
	}

	pub(crate) fn is_dirty(&self) -> bool {
		self.dirty.get()
	}

	pub(crate) fn set_dirty(&self, dirty: bool) {
		self.dirty.set(dirty)
	}

	pub(crate) fn is_scheduled(&self) -> bool {
		self.scheduled.get()
	}

	pub(crate) fn set_scheduled(&self, scheduled: bool) {
		self.scheduled.set(scheduled)
	}

	/// Removes this VM from every dependency record it subscribed to.
	pub(crate) fn clear_listeners(&self) {
		let deps = self.deps.take();
		if !deps.is_empty() {
			trace!(vm = ?self.id, count = deps.len(), "Clearing listeners");
		}
		for record in deps {
			record.remove(self);
		}
	}
}
impl Debug for VmState {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("VmState")
			.field("id", &self.id)
			.field("idx", &self.idx.get())
			.field("dirty", &self.dirty.get())
			.field("scheduled", &self.scheduled.get())
			.field("deps", &self.deps.borrow().len())
			.finish()
	}
}

/// Work deferred to the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
	FlushRehydration,
	Connected(VmId),
	Disconnected(VmId),
	Rendered(VmId),
	Service(ServiceHook, VmId),
	/// Drops a VM that is still unmounted once its disconnection has been observed.
	Release(VmId),
}

/// The process-wide scheduling state of one [`Engine`](`crate::Engine`).
#[derive(Clone, Default)]
pub struct Scheduler(Rc<SchedulerInner>);

#[derive(Default)]
struct SchedulerInner {
	rendering: RefCell<Option<Rc<VmState>>>,
	constructing: Cell<Option<VmId>>,
	rehydration_queue: RefCell<Vec<Rc<VmState>>>,
	tasks: RefCell<Vec<Task>>,
	tick_handler: RefCell<Option<Rc<dyn Fn()>>>,
}

impl Scheduler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the callback that is invoked whenever work is queued for an empty next tick.
	///
	/// It should arrange for [`Engine::tick`](`crate::Engine::tick`) to be called once the current synchronous work has completed.
	pub fn set_tick_handler(&self, handler: impl 'static + Fn()) {
		*self.0.tick_handler.borrow_mut() = Some(Rc::new(handler));
	}

	/// Drops all queued work and ambient context, without touching the tick handler.
	pub fn reset(&self) {
		for vm in self.0.rehydration_queue.take() {
			vm.set_scheduled(false);
		}
		self.0.tasks.take();
		self.0.rendering.take();
		self.0.constructing.take();
	}

	#[must_use]
	pub fn is_rendering(&self) -> bool {
		self.0.rendering.borrow().is_some()
	}

	#[must_use]
	pub fn has_pending_work(&self) -> bool {
		!self.0.tasks.borrow().is_empty()
	}

	pub(crate) fn vm_being_rendered(&self) -> Option<Rc<VmState>> {
		self.0.rendering.borrow().clone()
	}

	pub(crate) fn is_being_constructed(&self, vm: VmId) -> bool {
		self.0.constructing.get() == Some(vm)
	}

	/// Enters the render context of `vm` until the returned guard is dropped.
	#[must_use]
	pub(crate) fn enter_render(&self, vm: Rc<VmState>) -> impl Drop {
		#![allow(clippy::items_after_statements)]

		let previous = self.0.rendering.replace(Some(vm));
		return RenderContext {
			scheduler: self.clone(),
			previous,
		};

		struct RenderContext {
			scheduler: Scheduler,
			previous: Option<Rc<VmState>>,
		}
		impl Drop for RenderContext {
			fn drop(&mut self) {
				*self.scheduler.0.rendering.borrow_mut() = self.previous.take();
			}
		}
	}

	/// Enters the construction context of `vm` until the returned guard is dropped.
	#[must_use]
	pub(crate) fn enter_construction(&self, vm: VmId) -> impl Drop {
		#![allow(clippy::items_after_statements)]

		let previous = self.0.constructing.replace(Some(vm));
		return ConstructionContext {
			scheduler: self.clone(),
			previous,
		};

		struct ConstructionContext {
			scheduler: Scheduler,
			previous: Option<VmId>,
		}
		impl Drop for ConstructionContext {
			fn drop(&mut self) {
				self.scheduler.0.constructing.set(self.previous);
			}
		}
	}

	/// Marks `vm` dirty and schedules its rehydration, unless it is dirty already.
	pub(crate) fn invalidate(&self, vm: &Rc<VmState>) {
		if !vm.is_dirty() {
			vm.set_dirty(true);
			self.schedule_rehydration(vm);
		}
	}

	pub(crate) fn schedule_rehydration(&self, vm: &Rc<VmState>) {
		if vm.is_scheduled() {
			return;
		}
		let span = trace_span!("Scheduling rehydration", vm = ?vm.id);
		let _enter = span.enter();

		vm.set_scheduled(true);
		let was_empty = {
			let mut queue = self.0.rehydration_queue.borrow_mut();
			let was_empty = queue.is_empty();
			queue.push(vm.clone());
			was_empty
		};
		if was_empty {
			self.add_task(Task::FlushRehydration);
		}
	}

	/// Installs a fresh queue and returns the previous one, ancestors first.
	pub(crate) fn take_rehydration_queue(&self) -> Vec<Rc<VmState>> {
		let mut vms = self.0.rehydration_queue.take();
		vms.sort_by_key(|vm| vm.idx());
		vms
	}

	pub(crate) fn add_task(&self, task: Task) {
		let was_empty = {
			let mut tasks = self.0.tasks.borrow_mut();
			let was_empty = tasks.is_empty();
			tasks.push(task);
			was_empty
		};
		if was_empty {
			let handler = self.0.tick_handler.borrow().clone();
			if let Some(handler) = handler {
				trace!("Requesting tick");
				handler()
			}
		}
	}

	/// Installs a fresh task queue and returns the previous one.
	pub(crate) fn take_tasks(&self) -> Vec<Task> {
		self.0.tasks.take()
	}
}
impl Debug for Scheduler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scheduler")
			.field("rendering", &self.0.rendering.borrow().as_ref().map(|vm| vm.id))
			.field("constructing", &self.0.constructing.get())
			.field("rehydration_queue", &self.0.rehydration_queue.borrow().len())
			.field("tasks", &self.0.tasks.borrow().len())
			.finish()
	}
}

#![doc(html_root_url = "https://docs.rs/xylem/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::items_after_statements, clippy::module_name_repetitions)]

//! A component rendering engine.
//!
//! Components render [`VNode`] trees, which the [`Engine`] reconciles into a [`DomAdapter`].
//! Values read through a [`Tracked`] wrapper during render are remembered, and writing them later
//! schedules exactly the components that read them for rehydration on the next [`Engine::tick`].

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod api;
pub mod component;
pub mod context;
pub mod dom;
pub mod engine;
pub mod error;
pub mod mock_dom;
pub mod piercing;
pub mod reactive;
pub mod scheduler;
pub mod services;
pub mod value;
pub mod vnode;
#[cfg(feature = "web")]
pub mod web;

mod modules;
mod patch;
mod rc_hash_map;
mod vm;

pub use api::{Api, Item};
pub use component::{Component, ComponentDef, PropDef};
pub use context::{ClassList, Context};
pub use dom::{DomAdapter, DomError, Event, Listener, NodeId, NodeKind};
pub use engine::{Engine, EngineBuilder, PatchTarget};
pub use error::{BoxError, Callback, Error, Result};
pub use piercing::{NodeProperty, Pierced, PiercingContext, Reached};
pub use reactive::{ReactiveMembrane, Tracked};
pub use scheduler::Scheduler;
pub use services::{Service, ServiceContext, ServiceHook};
pub use value::{Data, Key, Object, Value, MAX_LIST_LENGTH};
pub use vm::VmId;
pub use vnode::{Handler, Map, RemoveHook, Slot, Style, VNode, VNodeData};

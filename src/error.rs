use crate::{dom::DomError, NodeId, VmId};
use core::fmt::{self, Display, Formatter};

/// Errors raised by user component code.
pub type BoxError = Box<dyn std::error::Error + 'static>;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The component callback an [`Error::Lifecycle`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
	Construct,
	Render,
	Connected,
	Disconnected,
	Rendered,
	AttributeChanged,
	PropertySetter,
	PropertyGetter,
}
impl Display for Callback {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Callback::Construct => "construct",
			Callback::Render => "render",
			Callback::Connected => "connected",
			Callback::Disconnected => "disconnected",
			Callback::Rendered => "rendered",
			Callback::AttributeChanged => "attribute_changed",
			Callback::PropertySetter => "property setter",
			Callback::PropertyGetter => "property getter",
		})
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid component definition for <{tag}>")]
	InvalidComponentDefinition { tag: String },

	#[error("Failed to execute `{method}` on {vm:?}: 1 argument is required, got 0")]
	MissingArgument { method: &'static str, vm: VmId },

	#[error("{callback} of {vm:?} failed: {source}")]
	Lifecycle {
		vm: VmId,
		callback: Callback,
		#[source]
		source: BoxError,
	},

	#[error("{0:?} is already executing a callback")]
	Reentrant(VmId),

	#[error("Unknown {0:?}")]
	UnknownVm(VmId),

	#[error("Unknown or detached {0:?}")]
	UnknownNode(NodeId),

	#[error(transparent)]
	Dom(#[from] DomError),
}

//! Control mapping: configured bindings, indexed lookup, and action
//! dispatch onto the decks.

mod actions;
mod mapping;

pub use actions::{dispatch_event, DispatchContext, InputState};
pub use mapping::{ActionType, ButtonState, EventType, Mapping, MappingRegistry, MappingSource};

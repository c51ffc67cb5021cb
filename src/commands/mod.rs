// Chat command registry, argument parsing, dispatch and handlers.

pub mod args;
pub mod dispatcher;
mod handlers;
pub mod registry;

pub use dispatcher::{Dispatcher, InboundMessage};

//! Callback table for routing inbound frames by command id.
//!
//! Resolution order for a frame: the handler registered for its command,
//! else the generic handler, else the frame is dropped.
//!
//! # Example
//!
//! ```ignore
//! use ca821x_link::dispatch::{CallbackTable, Disposition};
//! use ca821x_link::protocol::CommandId;
//!
//! let mut table = CallbackTable::new();
//!
//! table.register(CommandId::MCPS_DATA_INDICATION, |frame: &Frame| {
//!     println!("data: {:?}", frame.payload());
//!     Ok(Disposition::Handled)
//! });
//!
//! table.register_generic(|_frame: &Frame| Ok(Disposition::NotHandled));
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::error::Result;
use crate::protocol::{CommandId, Frame};

/// What a handler did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The frame was consumed.
    Handled,
    /// The handler declined the frame.
    NotHandled,
}

/// Result type for handler functions.
pub type HandlerResult = Result<Disposition>;

/// Where a dispatched frame ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Completed the outstanding synchronous wait.
    Completed,
    /// Routed to the handler registered for its command.
    Handler(Disposition),
    /// Routed to the generic handler.
    Generic(Disposition),
    /// No handler; the frame was dropped.
    Dropped,
}

impl Dispatched {
    /// True if some handler or waiter consumed the frame.
    pub fn is_handled(self) -> bool {
        matches!(
            self,
            Dispatched::Completed
                | Dispatched::Handler(Disposition::Handled)
                | Dispatched::Generic(Disposition::Handled)
        )
    }
}

/// Trait for frame handlers.
pub trait Handler: 'static {
    /// Handle an inbound frame.
    fn call(&mut self, frame: &Frame) -> HandlerResult;
}

impl<F> Handler for F
where
    F: FnMut(&Frame) -> HandlerResult + 'static,
{
    fn call(&mut self, frame: &Frame) -> HandlerResult {
        self(frame)
    }
}

/// Handler paired with caller-owned context state.
pub struct ContextHandler<C, F>
where
    C: 'static,
    F: FnMut(&Frame, &mut C) -> HandlerResult + 'static,
{
    handler: F,
    context: C,
    _phantom: PhantomData<fn(&mut C)>,
}

impl<C, F> ContextHandler<C, F>
where
    C: 'static,
    F: FnMut(&Frame, &mut C) -> HandlerResult + 'static,
{
    /// Create a new context handler.
    pub fn new(context: C, handler: F) -> Self {
        Self {
            handler,
            context,
            _phantom: PhantomData,
        }
    }
}

impl<C, F> Handler for ContextHandler<C, F>
where
    C: 'static,
    F: FnMut(&Frame, &mut C) -> HandlerResult + 'static,
{
    fn call(&mut self, frame: &Frame) -> HandlerResult {
        (self.handler)(frame, &mut self.context)
    }
}

/// Map from command id to handler, plus an optional generic fallback.
pub struct CallbackTable {
    /// Handlers by command.
    handlers: HashMap<CommandId, Box<dyn Handler>>,
    /// Fallback for commands without a specific entry.
    generic: Option<Box<dyn Handler>>,
}

impl CallbackTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            generic: None,
        }
    }

    /// Register `handler` for `command`, replacing any existing one.
    pub fn register<H: Handler>(&mut self, command: CommandId, handler: H) {
        if self.handlers.insert(command, Box::new(handler)).is_some() {
            tracing::debug!("Replaced handler for {}", command);
        }
    }

    /// Register a handler that receives `context` on every call.
    pub fn register_with_context<C, F>(&mut self, command: CommandId, context: C, handler: F)
    where
        C: 'static,
        F: FnMut(&Frame, &mut C) -> HandlerResult + 'static,
    {
        self.register(command, ContextHandler::new(context, handler));
    }

    /// Remove the handler for `command`. Returns true if one was registered.
    pub fn unregister(&mut self, command: CommandId) -> bool {
        self.handlers.remove(&command).is_some()
    }

    /// Set the fallback handler.
    pub fn register_generic<H: Handler>(&mut self, handler: H) {
        self.generic = Some(Box::new(handler));
    }

    /// Remove the fallback handler.
    pub fn clear_generic(&mut self) {
        self.generic = None;
    }

    /// True if a specific handler exists for `command`.
    pub fn contains(&self, command: CommandId) -> bool {
        self.handlers.contains_key(&command)
    }

    /// True if a generic handler is set.
    pub fn has_generic(&self) -> bool {
        self.generic.is_some()
    }

    /// Number of specific handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no specific handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route `frame` to its handler.
    pub fn dispatch(&mut self, frame: &Frame) -> Result<Dispatched> {
        if let Some(handler) = self.handlers.get_mut(&frame.command()) {
            return Ok(Dispatched::Handler(handler.call(frame)?));
        }

        if let Some(generic) = self.generic.as_mut() {
            return Ok(Dispatched::Generic(generic.call(frame)?));
        }

        tracing::debug!("No handler for {}, dropping", frame.command());
        Ok(Dispatched::Dropped)
    }
}

impl Default for CallbackTable {
    fn default() -> Self {
        Self::new()
    }
}

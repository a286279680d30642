//! The pluggable authentication methods and their registry.

use bastion::{wire::PacketReader, Error, Result};

use crate::context::AuthContext;

/// The outcome of a single authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The credentials checked out.
    Authenticated,

    /// The credentials did not check out.
    NotAuthenticated,

    /// The method will resolve over one or more continuation messages; no
    /// reply is to be sent until then.
    Postponed,

    /// The attempt failed for an operational reason not attributable to the
    /// user, and must not be charged against them.
    ServerCausedFailure,
}

/// Replies queued by a method, sent out before the attempt's own reply.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Vec<u8>>,
}

impl Outbox {
    /// Queue a raw payload.
    pub fn push(&mut self, payload: Vec<u8>) {
        self.queue.push(payload);
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Vec<u8>> {
        self.queue.drain(..)
    }
}

/// An authentication method, with its name, its enablement and its handler.
pub trait Method: Send {
    /// Name of the method, as it appears on the wire; no commas.
    fn name(&self) -> &'static str;

    /// Whether configuration currently enables the method.
    fn enabled(&self) -> bool;

    /// Process an attempt, consuming the method-specific fields left in the
    /// reader.
    fn authenticate(
        &mut self,
        context: &mut AuthContext,
        fields: &mut PacketReader<'_>,
        out: &mut Outbox,
    ) -> Result<Outcome>;

    /// Whether a postponed attempt of this method consumes the given
    /// message number.
    fn wants(&self, _message_id: u8) -> bool {
        false
    }

    /// Process a continuation message of a postponed attempt.
    fn resume(
        &mut self,
        _context: &mut AuthContext,
        _message: &mut PacketReader<'_>,
        _out: &mut Outbox,
    ) -> Result<Outcome> {
        Err(Error::UnexpectedMessage)
    }

    /// Drop any state kept between messages of a multi-round attempt.
    fn stop(&mut self) {}
}

/// The `none` method in its default rendition, present so the probe has a
/// well-defined target but never succeeding.
struct NoneDisabled;

impl Method for NoneDisabled {
    fn name(&self) -> &'static str {
        "none"
    }

    fn enabled(&self) -> bool {
        false
    }

    fn authenticate(
        &mut self,
        _context: &mut AuthContext,
        _fields: &mut PacketReader<'_>,
        _out: &mut Outbox,
    ) -> Result<Outcome> {
        Ok(Outcome::NotAuthenticated)
    }
}

/// A [`Method`] built from a name, an enabled predicate and a closure.
pub struct FnMethod<F> {
    name: &'static str,
    enabled: Box<dyn Fn() -> bool + Send>,
    handler: F,
}

impl<F> FnMethod<F>
where
    F: FnMut(&mut AuthContext, &mut PacketReader<'_>, &mut Outbox) -> Result<Outcome> + Send,
{
    /// Create an always-enabled method around the handler.
    pub fn new(name: &'static str, handler: F) -> Self {
        Self {
            name,
            enabled: Box::new(|| true),
            handler,
        }
    }

    /// Gate the method behind a configuration predicate.
    pub fn enabled_if(mut self, enabled: impl Fn() -> bool + Send + 'static) -> Self {
        self.enabled = Box::new(enabled);
        self
    }
}

impl<F> Method for FnMethod<F>
where
    F: FnMut(&mut AuthContext, &mut PacketReader<'_>, &mut Outbox) -> Result<Outcome> + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn enabled(&self) -> bool {
        (self.enabled)()
    }

    fn authenticate(
        &mut self,
        context: &mut AuthContext,
        fields: &mut PacketReader<'_>,
        out: &mut Outbox,
    ) -> Result<Outcome> {
        (self.handler)(context, fields, out)
    }
}

/// The ordered catalog of methods offered by a server.
///
/// The `none` method is always present; its position and the insertion
/// order of the others fix the order of the advertised name list.
pub struct Registry {
    methods: Vec<Box<dyn Method>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry holding only the default `none` method.
    pub fn new() -> Self {
        Self {
            methods: vec![Box::new(NoneDisabled)],
        }
    }

    /// Add a method, replacing any previous one of the same name in place.
    pub fn with(mut self, method: impl Method + 'static) -> Self {
        match self
            .methods
            .iter()
            .position(|known| known.name() == method.name())
        {
            Some(index) => self.methods[index] = Box::new(method),
            None => self.methods.push(Box::new(method)),
        }

        self
    }

    /// Iterate the methods in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Method> {
        self.methods.iter().map(|method| &**method)
    }

    /// Whether a name resolves to a method of the registry.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|method| method.name() == name)
    }

    pub(crate) fn get(&self, index: usize) -> &dyn Method {
        &*self.methods[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut dyn Method {
        &mut *self.methods[index]
    }

    pub(crate) fn stop_all(&mut self) {
        for method in &mut self.methods {
            method.stop();
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.methods.iter().map(|method| method.name()))
            .finish()
    }
}

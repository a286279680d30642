//! The server-side authentication controller.

use bastion::{
    stream::Stream,
    wire::{
        msg, AuthFailure, AuthRequest, AuthSuccess, Banner, Disconnect, DisconnectReason,
        PacketReader, ServiceAccept, ServiceRequest,
    },
    DisconnectError, DisconnectedBy, Error, Pipe, Result,
};

use crate::{
    banner,
    context::{Accounts, AuthContext},
    method::{Outbox, Outcome, Registry},
    policy, CompatFlags, Options, SERVICE_NAME,
};

/// Notifications to a privilege-separation monitor; a failing monitor is
/// fatal to the connection.
pub trait Monitor: Send {
    /// Report the service and style the user bound on its first attempt.
    fn inform_authserv(&mut self, service: &str, style: Option<&str>) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Only a service request for `ssh-userauth` is acceptable.
    #[default]
    Start,

    /// Authentication requests are being processed.
    Auth,

    /// Authentication succeeded; further requests are ignored.
    Done,
}

/// The authentication controller for one connection.
pub struct Auth<A> {
    options: Options,
    compat: CompatFlags,

    accounts: A,
    registry: Registry,
    monitor: Option<Box<dyn Monitor>>,

    context: AuthContext,
    state: State,
    active: Option<usize>,
}

impl<A: Accounts> Auth<A> {
    /// Create a controller over an account oracle, with an empty method
    /// registry rejecting everything but the `none` probe.
    pub fn new(options: Options, accounts: A) -> Self {
        Self {
            options,
            compat: CompatFlags::empty(),

            accounts,
            registry: Registry::new(),
            monitor: None,

            context: AuthContext::default(),
            state: State::default(),
            active: None,
        }
    }

    /// Set the peer-compatibility bits gathered from version exchange.
    pub fn compat(mut self, compat: CompatFlags) -> Self {
        self.compat = compat;
        self
    }

    /// Set the method registry.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Attach a privilege-separation monitor.
    pub fn monitor(mut self, monitor: impl Monitor + 'static) -> Self {
        self.monitor = Some(Box::new(monitor));
        self
    }

    /// The per-connection state accumulated so far.
    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    /// Drive the exchange until authentication succeeds, the peer
    /// disconnects, or a failure cap is hit.
    pub async fn run<S: Pipe>(&mut self, stream: &mut Stream<S>) -> Result<()> {
        while !self.context.success() {
            let payload = stream.recv().await?;

            self.step(stream, &payload).await?;
        }

        Ok(())
    }

    /// Process a single inbound message.
    pub async fn step<S: Pipe>(&mut self, stream: &mut Stream<S>, payload: &[u8]) -> Result<()> {
        let mut reader = PacketReader::new(payload)?;

        if reader.message_id() == msg::DISCONNECT {
            let message = Disconnect::decode(&mut reader)?;

            return Err(Error::Disconnected(DisconnectError {
                by: DisconnectedBy::Them,
                reason: message.reason,
                description: message.description,
            }));
        }

        match self.state {
            State::Start => self.on_service_request(stream, &mut reader).await,
            State::Auth if reader.message_id() == msg::USERAUTH_REQUEST => {
                self.on_userauth_request(stream, &mut reader).await
            }
            State::Auth => self.on_continuation(stream, &mut reader).await,
            State::Done => {
                tracing::debug!(
                    "Ignored message ^{:#x} after successful authentication",
                    reader.message_id(),
                );

                Ok(())
            }
        }
    }

    async fn on_service_request<S: Pipe>(
        &mut self,
        stream: &mut Stream<S>,
        reader: &mut PacketReader<'_>,
    ) -> Result<()> {
        if reader.message_id() != msg::SERVICE_REQUEST {
            return Err(stream
                .disconnect(
                    DisconnectReason::ProtocolError,
                    "Unexpected message before the service request.",
                )
                .await);
        }

        let request = ServiceRequest::decode(reader)?;
        if request.service_name != SERVICE_NAME {
            tracing::debug!("Bad service request `{}`", request.service_name);

            return Err(stream
                .disconnect(
                    DisconnectReason::ServiceNotAvailable,
                    format!("Bad service request `{}`.", request.service_name),
                )
                .await);
        }

        stream
            .send(
                &ServiceAccept {
                    service_name: request.service_name,
                }
                .encode(),
            )
            .await?;

        self.state = State::Auth;

        Ok(())
    }

    async fn on_userauth_request<S: Pipe>(
        &mut self,
        stream: &mut Stream<S>,
        reader: &mut PacketReader<'_>,
    ) -> Result<()> {
        let request = AuthRequest::decode(reader)?;
        let (user, style) = match request.username.split_once(':') {
            Some((user, style)) => (user, Some(style)),
            None => (request.username.as_str(), None),
        };

        tracing::debug!(
            "Request for user `{user}` service `{}` method `{}`",
            request.service_name,
            request.method,
        );
        tracing::debug!(
            "Attempt {} failures {}",
            self.context.attempt(),
            self.context.failures(),
        );

        if self.context.next_attempt() == 1 {
            let account = self.accounts.lookup(user);
            if account.is_none() {
                tracing::info!("Invalid user `{user}`");
            }

            self.context.bind(
                user,
                &request.service_name,
                style,
                account,
                self.accounts.fake_account(),
            );

            if let Some(monitor) = &mut self.monitor {
                monitor.inform_authserv(&request.service_name, style)?;
            }

            self.send_banner(stream).await?;

            if policy::setup(&mut self.context, &self.options, &self.registry).is_err() {
                return Err(stream
                    .disconnect(
                        DisconnectReason::NoMoreAuthMethodsAvailable,
                        "No authentication methods enabled.",
                    )
                    .await);
            }
        } else if self.context.user() != Some(user)
            || self.context.service() != Some(request.service_name.as_str())
        {
            return Err(stream
                .disconnect(
                    DisconnectReason::ProtocolError,
                    format!(
                        "Change of username or service not allowed: ({},{}) -> ({user},{})",
                        self.context.user().unwrap_or_default(),
                        self.context.service().unwrap_or_default(),
                        request.service_name,
                    ),
                )
                .await);
        }

        // A fresh request voids any attempt still in flight.
        self.registry.stop_all();
        self.active = None;
        self.context.clear_postponed();
        self.context.clear_server_caused_failure();

        let mut outcome = Outcome::NotAuthenticated;
        if self.context.failures() < self.options.max_authtries {
            match self.registry.index_of(&request.method) {
                Some(index)
                    if self.registry.get(index).enabled()
                        && policy::method_allowed(&self.context, &self.options, &request.method) =>
                {
                    tracing::debug!("Trying method `{}`", request.method);

                    let mut out = Outbox::default();
                    outcome =
                        self.registry
                            .get_mut(index)
                            .authenticate(&mut self.context, reader, &mut out)?;

                    for payload in out.drain() {
                        stream.send(&payload).await?;
                    }

                    if outcome == Outcome::Postponed {
                        self.context.set_postponed();
                        self.active = Some(index);
                    }
                }
                _ => tracing::debug!("Unrecognized or unavailable method `{}`", request.method),
            }
        }

        self.finish(stream, outcome, &request.method, None).await
    }

    async fn on_continuation<S: Pipe>(
        &mut self,
        stream: &mut Stream<S>,
        reader: &mut PacketReader<'_>,
    ) -> Result<()> {
        let index = match self.active {
            Some(index)
                if self.context.postponed()
                    && self.registry.get(index).wants(reader.message_id()) =>
            {
                index
            }
            _ => {
                return Err(stream
                    .disconnect(
                        DisconnectReason::ProtocolError,
                        "Unexpected message during authentication.",
                    )
                    .await);
            }
        };

        self.context.clear_postponed();

        let mut out = Outbox::default();
        let outcome = self
            .registry
            .get_mut(index)
            .resume(&mut self.context, reader, &mut out)?;

        for payload in out.drain() {
            stream.send(&payload).await?;
        }

        if outcome == Outcome::Postponed {
            self.context.set_postponed();
        } else {
            self.active = None;
        }

        let method = self.registry.get(index).name();

        self.finish(stream, outcome, method, None).await
    }

    /// Settle an attempt: enforce the root and multi-method policies, emit
    /// the audit record, and send the reply the outcome calls for.
    #[allow(clippy::panic)]
    async fn finish<S: Pipe>(
        &mut self,
        stream: &mut Stream<S>,
        outcome: Outcome,
        method: &str,
        submethod: Option<&str>,
    ) -> Result<()> {
        if outcome == Outcome::ServerCausedFailure {
            self.context.set_server_caused_failure();
        }

        let mut authenticated = outcome == Outcome::Authenticated;

        if authenticated && !self.context.valid() {
            panic!(
                "authenticated invalid user `{}`",
                self.context.user().unwrap_or_default(),
            );
        }
        if authenticated && self.context.postponed() {
            panic!("authenticated while a continuation is pending");
        }

        if authenticated
            && self.context.account().is_some_and(|account| account.uid == 0)
            && !self.accounts.root_allowed(method)
        {
            authenticated = false;
        }

        let mut partial = false;
        if authenticated
            && !self.options.auth_methods.is_empty()
            && !policy::update(&mut self.context, method)
        {
            authenticated = false;
            partial = true;
        }

        // The audit record goes out before the reply does.
        tracing::info!(
            "{} {method}{} for {}{} ssh2",
            if self.context.postponed() {
                "Postponed"
            } else if partial {
                "Partial"
            } else if authenticated {
                "Accepted"
            } else {
                "Failed"
            },
            submethod.map(|sub| format!("/{sub}")).unwrap_or_default(),
            if self.context.valid() { "" } else { "invalid user " },
            self.context.user().unwrap_or("unknown"),
        );

        if self.context.postponed() {
            return Ok(());
        }

        if authenticated {
            self.state = State::Done;

            stream.send(&AuthSuccess.encode()).await?;
            self.context.set_success();

            Ok(())
        } else {
            // The opening `none` probe is how clients discover the method
            // list; it costs nothing.
            if !self.context.server_caused_failure()
                && (self.context.attempt() > 1 || method != "none")
            {
                self.context.add_failure();
            }

            if self.context.failures() >= self.options.max_authtries {
                return Err(stream
                    .disconnect(
                        DisconnectReason::NoMoreAuthMethodsAvailable,
                        format!(
                            "Too many authentication failures for {}",
                            self.context.user().unwrap_or("unknown"),
                        ),
                    )
                    .await);
            }

            let continue_with = policy::advertise(&self.context, &self.options, &self.registry);
            tracing::debug!("Failure; partial={partial} next methods=\"{continue_with}\"");

            stream
                .send(
                    &AuthFailure {
                        continue_with,
                        partial_success: partial,
                    }
                    .encode(),
                )
                .await
        }
    }

    async fn send_banner<S: Pipe>(&mut self, stream: &mut Stream<S>) -> Result<()> {
        let Some(path) = &self.options.banner else {
            return Ok(());
        };

        if path
            .to_str()
            .is_some_and(|path| path.eq_ignore_ascii_case("none"))
            || self.compat.contains(CompatFlags::BANNER_BUG)
        {
            return Ok(());
        }

        let Some(message) = banner::read(path) else {
            return Ok(());
        };

        stream
            .send(
                &Banner {
                    message,
                    language: String::new(),
                }
                .encode(),
            )
            .await?;

        tracing::debug!("Sent the authentication banner");

        Ok(())
    }
}

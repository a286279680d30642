//! Per-connection authentication state.

use crate::policy::MethodList;

/// A user account record, as resolved by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Login name of the account.
    pub name: String,

    /// Numeric identity of the account, `0` being the superuser.
    pub uid: u32,
}

/// The account oracle resolving users and their policies.
pub trait Accounts {
    /// Resolve a user name into an account, `None` when the user does not
    /// exist or may not log in at all.
    fn lookup(&mut self, user: &str) -> Option<Account>;

    /// A deterministic placeholder record, substituted for unknown users so
    /// their attempts cost the same as attempts against existing ones.
    fn fake_account(&self) -> Account {
        Account {
            name: "unknown".into(),
            uid: u32::MAX,
        }
    }

    /// Whether the superuser may log in through the named method.
    fn root_allowed(&self, method: &str) -> bool;
}

/// The state accumulated over the authentication exchange of one connection.
#[derive(Debug, Default)]
pub struct AuthContext {
    user: Option<String>,
    style: Option<String>,
    service: Option<String>,

    valid: bool,
    account: Option<Account>,

    attempt: u32,
    failures: u32,

    success: bool,
    postponed: bool,
    server_caused_failure: bool,

    auth_methods: Vec<MethodList>,
}

impl AuthContext {
    /// The user name bound by the first request.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// The authentication style extracted from a `user:style` name.
    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    /// The service bound by the first request.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Whether the bound user exists and may authenticate.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The account record in use, a placeholder one for unknown users.
    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    /// Requests processed so far, the one in flight included.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Failures charged against the user so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether authentication has terminally succeeded.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Whether a method is waiting on a continuation message.
    pub fn postponed(&self) -> bool {
        self.postponed
    }

    /// Whether the failure in flight was caused by the server rather than
    /// the user's credentials.
    pub fn server_caused_failure(&self) -> bool {
        self.server_caused_failure
    }

    /// The method sequences still to be completed.
    pub fn method_lists(&self) -> &[MethodList] {
        &self.auth_methods
    }

    pub(crate) fn next_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Fix the user, style and service bindings, on the first request only.
    ///
    /// The binding is `valid` only when the oracle resolved the user and
    /// the requested service is the connection service; everything else
    /// proceeds against the placeholder record.
    pub(crate) fn bind(
        &mut self,
        user: &str,
        service: &str,
        style: Option<&str>,
        account: Option<Account>,
        fake: Account,
    ) {
        match account {
            Some(account) if service == crate::CONNECTION_SERVICE_NAME => {
                self.valid = true;
                self.account = Some(account);
            }
            _ => {
                self.valid = false;
                self.account = Some(fake);
            }
        }

        self.user = Some(user.into());
        self.service = Some(service.into());
        self.style = style.map(Into::into);
    }

    pub(crate) fn add_failure(&mut self) {
        self.failures += 1;
    }

    pub(crate) fn set_success(&mut self) {
        self.success = true;
    }

    pub(crate) fn set_postponed(&mut self) {
        self.postponed = true;
    }

    pub(crate) fn clear_postponed(&mut self) {
        self.postponed = false;
    }

    pub(crate) fn set_server_caused_failure(&mut self) {
        self.server_caused_failure = true;
    }

    pub(crate) fn clear_server_caused_failure(&mut self) {
        self.server_caused_failure = false;
    }

    pub(crate) fn set_method_lists(&mut self, lists: Vec<MethodList>) {
        self.auth_methods = lists;
    }

    pub(crate) fn method_lists_mut(&mut self) -> &mut Vec<MethodList> {
        &mut self.auth_methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SingleUser;

    impl Accounts for SingleUser {
        fn lookup(&mut self, user: &str) -> Option<Account> {
            (user == "alice").then(|| Account {
                name: user.into(),
                uid: 1000,
            })
        }

        fn root_allowed(&self, _method: &str) -> bool {
            true
        }
    }

    #[test]
    fn binds_a_known_user_on_the_connection_service() {
        let mut accounts = SingleUser;
        let mut context = AuthContext::default();

        let account = accounts.lookup("alice");
        context.bind(
            "alice",
            "ssh-connection",
            None,
            account,
            accounts.fake_account(),
        );

        assert!(context.valid());
        assert_eq!(context.user(), Some("alice"));
        assert_eq!(context.account().map(|account| account.uid), Some(1000));
    }

    #[test]
    fn substitutes_the_placeholder_for_an_unknown_user() {
        let mut accounts = SingleUser;
        let mut context = AuthContext::default();

        let account = accounts.lookup("mallory");
        context.bind(
            "mallory",
            "ssh-connection",
            None,
            account,
            accounts.fake_account(),
        );

        assert!(!context.valid());
        assert_eq!(context.account(), Some(&accounts.fake_account()));
    }

    #[test]
    fn rejects_a_known_user_on_a_foreign_service() {
        let mut accounts = SingleUser;
        let mut context = AuthContext::default();

        let account = accounts.lookup("alice");
        context.bind(
            "alice",
            "ssh-forwarding",
            Some("otp"),
            account,
            accounts.fake_account(),
        );

        assert!(!context.valid());
        assert_eq!(context.style(), Some("otp"));
    }
}

//! Multi-method authentication policies.
//!
//! A policy is an ordered set of method sequences; a client is admitted
//! once it has completed every method of any one sequence, in order.

use thiserror::Error;

use crate::{context::AuthContext, method::Registry, options::Options};

/// The ways a configured method list can be invalid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListError {
    /// The list, or one of its entries, is empty.
    #[error("empty authentication method list")]
    Empty,

    /// An entry that is not in the method registry.
    #[error("unknown authentication method \"{0}\"")]
    UnknownMethod(String),

    /// An entry naming a method that configuration has disabled.
    #[error("disabled authentication method \"{0}\"")]
    DisabledMethod(String),

    /// The `none` probe can never be part of a required sequence.
    #[error("\"none\" is not permitted in an authentication method list")]
    NoneListed,
}

impl From<ListError> for bastion::Error {
    fn from(error: ListError) -> Self {
        Self::InvalidMethodList(error.to_string())
    }
}

/// One configured method sequence, in the order it must be completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodList {
    methods: Vec<String>,
}

impl MethodList {
    fn parse(list: &str) -> Result<Self, ListError> {
        if list.is_empty() {
            return Err(ListError::Empty);
        }

        let methods = list
            .split(',')
            .map(|method| {
                if method.is_empty() {
                    Err(ListError::Empty)
                } else {
                    Ok(method.to_owned())
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { methods })
    }

    /// The method the sequence currently requires.
    pub fn head(&self) -> Option<&str> {
        self.methods.first().map(String::as_str)
    }

    /// Whether every method of the sequence has been completed.
    pub fn is_complete(&self) -> bool {
        self.methods.is_empty()
    }

    fn strip_head(&mut self) {
        self.methods.remove(0);
    }
}

impl std::fmt::Display for MethodList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.methods.join(","))
    }
}

/// Check a comma-separated method list against the registry, also requiring
/// every named method to be enabled when `require_enabled` is set.
pub fn validate(registry: &Registry, list: &str, require_enabled: bool) -> Result<(), ListError> {
    let parsed = MethodList::parse(list)?;

    for method in &parsed.methods {
        if method == "none" {
            return Err(ListError::NoneListed);
        }

        let index = registry
            .index_of(method)
            .ok_or_else(|| ListError::UnknownMethod(method.clone()))?;

        if require_enabled && !registry.get(index).enabled() {
            return Err(ListError::DisabledMethod(method.clone()));
        }
    }

    Ok(())
}

/// Load the configured lists into the context, pruning any list that names
/// a disabled method.
///
/// An empty configuration leaves the context without a policy; a non-empty
/// one from which every list was pruned is a configuration error.
pub(crate) fn setup(
    context: &mut AuthContext,
    options: &Options,
    registry: &Registry,
) -> bastion::Result<()> {
    if options.auth_methods.is_empty() {
        context.set_method_lists(Vec::new());

        return Ok(());
    }

    let mut lists = Vec::new();
    for list in &options.auth_methods {
        match validate(registry, list, true) {
            Ok(()) => {
                tracing::debug!("Authentication methods list {}: {list}", lists.len());
                lists.push(MethodList::parse(list).map_err(bastion::Error::from)?);
            }
            Err(error @ ListError::DisabledMethod(_)) => {
                tracing::info!("Authentication methods list \"{list}\" skipped: {error}");
            }
            Err(error) => return Err(error.into()),
        }
    }

    if lists.is_empty() {
        tracing::error!("No authentication methods list left after eliminating disabled methods");

        return Err(bastion::Error::NoMethodsRemain);
    }

    context.set_method_lists(lists);

    Ok(())
}

/// Whether a method may presently be attempted; always true without a
/// policy in force, otherwise the method must head one of the sequences.
///
/// NB. the context may legitimately hold zero lists after pruning, so the
/// policy presence is read from the configuration.
pub(crate) fn method_allowed(context: &AuthContext, options: &Options, method: &str) -> bool {
    if options.auth_methods.is_empty() {
        return true;
    }

    context
        .method_lists()
        .iter()
        .any(|list| list.head() == Some(method))
}

/// The comma-separated list of methods able to continue the exchange, in
/// registry order; `none` is never advertised.
pub(crate) fn advertise(context: &AuthContext, options: &Options, registry: &Registry) -> String {
    let mut names = String::new();

    for method in registry.iter() {
        if method.name() == "none" || !method.enabled() {
            continue;
        }
        if !method_allowed(context, options, method.name()) {
            continue;
        }

        if !names.is_empty() {
            names.push(',');
        }
        names.push_str(method.name());
    }

    names
}

/// Strip a successfully completed method off the head of every sequence it
/// heads, reporting whether that completed any sequence in full.
#[allow(clippy::panic)]
pub(crate) fn update(context: &mut AuthContext, method: &str) -> bool {
    let mut found = false;

    for (index, list) in context.method_lists_mut().iter_mut().enumerate() {
        if list.head() != Some(method) {
            continue;
        }

        found = true;
        list.strip_head();

        if list.is_complete() {
            tracing::debug!("Authentication methods list {index} complete");

            return true;
        }

        tracing::debug!("Authentication methods list {index} remaining: \"{list}\"");
    }

    // A method that heads no sequence must never have been dispatched.
    if !found {
        panic!("method \"{method}\" not found in any authentication methods list");
    }

    false
}

#[cfg(test)]
mod tests {
    use bastion::Result;
    use rstest::rstest;

    use super::*;
    use crate::method::{FnMethod, Outcome};

    fn registry() -> Registry {
        Registry::new()
            .with(FnMethod::new("publickey", |_, _, _| {
                Ok(Outcome::NotAuthenticated)
            }))
            .with(FnMethod::new("password", |_, _, _| {
                Ok(Outcome::NotAuthenticated)
            }))
            .with(
                FnMethod::new("hostbased", |_, _, _| Ok(Outcome::NotAuthenticated))
                    .enabled_if(|| false),
            )
    }

    fn options(lists: &[&str]) -> Options {
        Options {
            auth_methods: lists.iter().map(|list| (*list).to_owned()).collect(),
            ..Default::default()
        }
    }

    fn context_with(lists: &[&str]) -> Result<AuthContext> {
        let mut context = AuthContext::default();
        setup(&mut context, &options(lists), &registry())?;

        Ok(context)
    }

    #[rstest]
    #[case::empty("", ListError::Empty)]
    #[case::empty_token("publickey,", ListError::Empty)]
    #[case::unknown("publickey,gssapi", ListError::UnknownMethod("gssapi".into()))]
    #[case::disabled("hostbased", ListError::DisabledMethod("hostbased".into()))]
    #[case::none_probe("publickey,none", ListError::NoneListed)]
    fn validation_rejects(#[case] list: &str, #[case] error: ListError) {
        assert_eq!(validate(&registry(), list, true), Err(error));
    }

    #[test]
    fn validation_of_a_disabled_method_is_opt_in() {
        assert_eq!(validate(&registry(), "hostbased,password", false), Ok(()));
    }

    #[test]
    fn setup_prunes_lists_with_disabled_methods() -> Result<()> {
        let context = context_with(&["hostbased,password", "publickey,password"])?;

        assert_eq!(context.method_lists().len(), 1);
        assert_eq!(context.method_lists()[0].head(), Some("publickey"));

        Ok(())
    }

    #[test]
    fn setup_fails_once_every_list_is_pruned() {
        assert!(matches!(
            context_with(&["hostbased"]),
            Err(bastion::Error::NoMethodsRemain)
        ));
    }

    #[test]
    fn setup_without_a_policy_leaves_the_context_empty() -> Result<()> {
        let context = context_with(&[])?;

        assert!(context.method_lists().is_empty());

        Ok(())
    }

    #[test]
    fn only_heads_are_allowed_under_a_policy() -> Result<()> {
        let context = context_with(&["publickey,password"])?;
        let options = options(&["publickey,password"]);

        assert!(method_allowed(&context, &options, "publickey"));
        assert!(!method_allowed(&context, &options, "password"));

        Ok(())
    }

    #[test]
    fn anything_is_allowed_without_a_policy() -> Result<()> {
        let context = context_with(&[])?;

        assert!(method_allowed(&context, &options(&[]), "password"));
        assert!(method_allowed(&context, &options(&[]), "unheard-of"));

        Ok(())
    }

    #[test]
    fn advertises_enabled_methods_in_registry_order() -> Result<()> {
        let context = context_with(&[])?;

        assert_eq!(
            advertise(&context, &options(&[]), &registry()),
            "publickey,password"
        );

        Ok(())
    }

    #[test]
    fn advertises_only_the_heads_under_a_policy() -> Result<()> {
        let context = context_with(&["publickey,password"])?;
        let options = options(&["publickey,password"]);

        assert_eq!(advertise(&context, &options, &registry()), "publickey");

        Ok(())
    }

    #[test]
    fn update_strips_the_head_and_completes_the_list() -> Result<()> {
        let mut context = context_with(&["publickey,password"])?;

        assert!(!update(&mut context, "publickey"));
        assert_eq!(context.method_lists()[0].head(), Some("password"));

        assert!(update(&mut context, "password"));
        assert!(context.method_lists()[0].is_complete());

        Ok(())
    }

    #[test]
    fn update_completes_on_a_single_method_list() -> Result<()> {
        let mut context = context_with(&["password", "publickey,password"])?;

        assert!(update(&mut context, "password"));

        Ok(())
    }

    #[test]
    #[should_panic(expected = "not found in any authentication methods list")]
    fn update_aborts_on_a_method_heading_no_list() {
        let mut context = context_with(&["publickey,password"]).expect("valid configuration");

        update(&mut context, "password");
    }
}

//! Configuration consumed by the authentication controller.

use std::path::PathBuf;

use bitflags::bitflags;

/// The configuration fragment driving the controller.
#[derive(Debug, Clone)]
pub struct Options {
    /// Path of the banner file sent before the first attempt, the literal
    /// `none` meaning no banner.
    pub banner: Option<PathBuf>,

    /// Cap on the failed attempts before the connection is dropped.
    pub max_authtries: u32,

    /// Comma-separated method sequences a client must complete in full,
    /// any one of them, before being admitted. Empty means any single
    /// method suffices.
    pub auth_methods: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            banner: None,
            max_authtries: 6,
            auth_methods: Vec::new(),
        }
    }
}

bitflags! {
    /// Workaround bits advertised by buggy peer implementations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompatFlags: u32 {
        /// The peer chokes on `SSH_MSG_USERAUTH_BANNER` messages.
        const BANNER_BUG = 1 << 0;
    }
}

//! Platform specific implementations of the selector and related types.
//!
//! Unix targets get the real `epoll`/`kqueue`/`poll` backed selector behind
//! `os-poll`. Every other target, and unix builds without `os-poll`, fall
//! back to the `shell` module, which panics if actually driven.

cfg_os_poll! {
    #[cfg(unix)]
    mod unix;
    #[cfg(unix)]
    pub(crate) use self::unix::*;
}

#[cfg(any(not(feature = "os-poll"), not(unix)))]
mod shell;
#[cfg(any(not(feature = "os-poll"), not(unix)))]
pub(crate) use self::shell::*;

//! Unix specific extensions.

/// Helper macro to execute a system call that returns an `io::Result`.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

cfg_os_poll! {
    mod selector;
    pub(crate) use self::selector::{event, Event, Events, Selector};

    mod sourcefd;
    pub use self::sourcefd::SourceFd;

    mod waker;
    pub(crate) use self::waker::Waker;

    cfg_net! {
        pub(crate) mod net;
    }

    cfg_any_os_util! {
        mod socket;
    }
}

cfg_net! {
    pub(crate) mod tcp;
    pub(crate) mod udp;
    pub(crate) mod uds;
    pub(crate) use std::os::unix::net::SocketAddr;
}

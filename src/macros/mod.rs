#![allow(unused_macros)]

macro_rules! cfg_os_poll {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "os-poll")]
            #[cfg_attr(docsrs, doc(cfg(feature = "os-poll")))]
            $item
        )*
    }
}

macro_rules! cfg_not_os_poll {
    ($($item:item)*) => {
        $(
            #[cfg(not(feature = "os-poll"))]
            $item
        )*
    }
}

macro_rules! cfg_net {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "net")]
            #[cfg_attr(docsrs, doc(cfg(feature = "net")))]
            $item
        )*
    }
}

macro_rules! cfg_os_ext {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "os-ext")]
            #[cfg_attr(docsrs, doc(cfg(feature = "os-ext")))]
            $item
        )*
    }
}

// cfg for any feature that requires the OS's adapter for `RawFd`/`RawSocket`.
macro_rules! cfg_any_os_util {
    ($($item:item)*) => {
        $(
            #[cfg(any(feature = "os-poll", feature = "net"))]
            #[cfg_attr(docsrs, doc(cfg(any(feature = "os-poll", feature = "net"))))]
            $item
        )*
    }
}

macro_rules! cfg_io_source {
    ($($item:item)*) => {
        $(
            #[cfg(all(not(target_os = "wasi"), feature = "os-poll"))]
            $item
        )*
    }
}

// cfg for the incremental JSON/XML parsers, which have no OS dependency and
// are gated independently of `os-poll`/`net`.
macro_rules! cfg_parsers {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "parsers")]
            #[cfg_attr(docsrs, doc(cfg(feature = "parsers")))]
            $item
        )*
    }
}

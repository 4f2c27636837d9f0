#![doc(html_root_url = "https://docs.rs/mtrt/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A fast, low-level I/O library for Rust focused on non-blocking APIs and
//! event notification for building high performance I/O apps with as little
//! overhead as possible over the OS abstractions, plus the message-passing
//! runtime built on top of it: a per-thread [`eventloop`] multiplexing
//! socket readiness, timers and idle work; a lock-free [`message`] fabric
//! that lets any thread deliver typed payloads to an [`object`] pinned to
//! another thread's loop via a [`pipe`] or [`signal`]; a [`thread`] that
//! pairs a queue and loop with a worker OS thread; and, independent of the
//! rest, incremental JSON/XML [`parser`]s that consume network-chunked
//! input without ever buffering a whole document.
//!
//! # Usage
//!
//! Using this crate starts by creating a [`Poll`], which reads events from
//! the OS and puts them into [`Events`]. You can handle I/O events from the
//! OS with it.
//!
//! For more information on this approach, see the [`Poll`] documentation.
//!
//! ## Examples
//!
//! ```
//! use mtrt::net::{TcpListener, TcpStream};
//! use mtrt::{Events, Interest, Poll, Token};
//!
//! # fn main() -> std::io::Result<()> {
//! let mut poll = Poll::new()?;
//! let mut events = Events::with_capacity(128);
//!
//! const SERVER: Token = Token(0);
//!
//! let addr = "127.0.0.1:0".parse().unwrap();
//! let mut server = TcpListener::bind(addr)?;
//!
//! poll.registry()
//!     .register(&mut server, SERVER, Interest::READABLE)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! This crate is split into several features, see the [`features`] module
//! for more details.

#[macro_use]
mod macros;

mod interest;
mod sys;
mod token;

pub mod event;

cfg_io_source! {
    mod io_source;
}

cfg_net! {
    pub mod net;
}

cfg_os_poll! {
    mod poll;
    mod waker;

    pub use crate::poll::{Poll, Registry};
    pub use crate::waker::Waker;

    pub mod queue;
    pub mod message;
    pub mod object;
    pub mod pipe;
    pub mod signal;
    pub mod eventloop;
    pub mod thread;
}

cfg_parsers! {
    pub mod parser;
}

pub use crate::interest::Interest;
pub use crate::token::Token;
pub use event::{Event, Events};

pub mod features {
    //! # Features in this crate
    //!
    //! This document describes the available features.
    //!
    //! ## Available features
    //!
    //! | Feature name | Dependencies | Description |
    //! |--------------|--------------|--------------------------------------------------------------------------------------------------------------------------------------|
    //! | `os-poll`    | None         | Enable `mtrt::Poll`, `mtrt::Registry` and the message-passing runtime (`mtrt::eventloop`, `mtrt::message`, `mtrt::object`, `mtrt::pipe`, `mtrt::signal`, `mtrt::thread`), which are built on top of them. |
    //! | `os-ext`     | `os-poll`    | Enables additional OS specific facilities. |
    //! | `net`        | None         | Enable `mtrt::net` types such as `TcpListener` and `UdpSocket`. |
    //! | `parsers`    | None         | Enable `mtrt::parser`, the incremental JSON/XML readers and JSON writer. Has no OS dependency: linking only the event loop does not pay for it. |
    //!
    //! [`Poll`]: crate::Poll
    //! [`Registry`]: crate::Registry
}

// Copyright 2017-2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
A framework for notifying users about what tools are doing.

This module provides a way for Rubbl libraries and programs to tell the user
about actions taken, problems, and so on. Libraries accept a
`NotificationBackend` and never print directly; programs pick a backend. The
colorized terminal backend and the `clap` helpers are only available with the
`notifications` feature.

*/

#[cfg(feature = "notifications")]
pub mod termcolor;

use anyhow::Error;
use std::fmt::Arguments;

/// How chatty the notification system should be.
#[repr(usize)]
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ChatterLevel {
    /// Only warnings and errors are reported.
    Minimal = 0,

    /// Informational messages are reported too.
    Normal,
}

/// The kind of notification that is being produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotificationKind {
    /// Something the user may want to know.
    Note,

    /// An unusual condition that the task can work around.
    Warning,

    /// A problem that will probably make the task fail, though it carries on.
    Severe,

    /// A problem that stops the task.
    Fatal,
}

/// Something that can deliver notifications to the user.
pub trait NotificationBackend {
    /// Deliver one notification.
    ///
    /// If `err` is given, its message and causes are reported after the main
    /// text.
    fn notify(&mut self, kind: NotificationKind, args: Arguments, err: Option<Error>);
}

/// Send an informational notification to the user.
///
/// Standard usage looks like this:
///
/// ```rust,ignore
/// rn_note!(nb, "read {} histograms", n_hists);
/// ```
///
/// where `nb` is a type implementing the NotificationBackend trait. An Error
/// value may follow a semicolon; backends report its causes after the
/// message.
#[macro_export]
macro_rules! rn_note {
    ($dest:expr, $( $fmt_args:expr ),*) => {
        $dest.notify($crate::notify::NotificationKind::Note, format_args!($( $fmt_args ),*), None)
    };
    ($dest:expr, $( $fmt_args:expr ),* ; $err:expr) => {
        $dest.notify($crate::notify::NotificationKind::Note, format_args!($( $fmt_args ),*), Some($err))
    };
}

/// Warn the user of a problematic condition.
///
/// Usage is as for `rn_note!`. Use this when something is off but the task
/// at hand can still succeed, such as a truncated record in a data file.
#[macro_export]
macro_rules! rn_warning {
    ($dest:expr, $( $fmt_args:expr ),*) => {
        $dest.notify($crate::notify::NotificationKind::Warning, format_args!($( $fmt_args ),*), None)
    };
    ($dest:expr, $( $fmt_args:expr ),* ; $err:expr) => {
        $dest.notify($crate::notify::NotificationKind::Warning, format_args!($( $fmt_args ),*), Some($err))
    };
}

/// A no-op notification backend.
///
/// This empty structure implements the NotificationBackend trait. Its
/// `notify()` function does nothing, which is handy when a library function
/// wants a backend but nobody cares what it says.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotificationBackend {}

impl NoopNotificationBackend {
    /// Create a new NoopNotificationBackend object.
    pub fn new() -> NoopNotificationBackend {
        NoopNotificationBackend {}
    }
}

impl NotificationBackend for NoopNotificationBackend {
    fn notify(&mut self, _kind: NotificationKind, _args: Arguments, _err: Option<Error>) {}
}

#[derive(Debug)]
struct NotificationData {
    kind: NotificationKind,
    text: String,
    err: Option<Error>,
}

/// A notification backend that buffers notifications and emits them later.
///
/// The buffered messages can also be inspected directly, which is handy in
/// test suites.
#[derive(Debug, Default)]
pub struct BufferingNotificationBackend {
    buf: Vec<NotificationData>,
}

impl BufferingNotificationBackend {
    /// Create and return a new BufferingNotificationBackend.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Get the number of notifications buffered so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Query whether no notifications have been buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Iterate over the buffered notifications as `(kind, text)` pairs.
    pub fn messages(&self) -> impl Iterator<Item = (NotificationKind, &str)> {
        self.buf.iter().map(|n| (n.kind, n.text.as_ref()))
    }

    /// Empty the buffered notifications into a different notification backend.
    ///
    /// This function consumes the object.
    pub fn drain<B: NotificationBackend + ?Sized>(mut self, other: &mut B) {
        for info in self.buf.drain(..) {
            other.notify(info.kind, format_args!("{}", info.text), info.err);
        }
    }
}

impl NotificationBackend for BufferingNotificationBackend {
    fn notify(&mut self, kind: NotificationKind, args: Arguments, err: Option<Error>) {
        self.buf.push(NotificationData {
            kind,
            text: format!("{args}"),
            err,
        });
    }
}

/// An extension trait for adding standard notification arguments to a clap
/// Command object.
#[cfg(feature = "notifications")]
pub trait ClapNotificationArgsExt {
    /// Add standard Rubbl notification-related arguments to this Command.
    fn rubbl_notify_args(self) -> Self;
}

#[cfg(feature = "notifications")]
impl ClapNotificationArgsExt for clap::Command {
    fn rubbl_notify_args(self) -> Self {
        self.arg(
            clap::Arg::new("chatter_level")
                .long("chatter")
                .short('c')
                .value_name("LEVEL")
                .help("How much chatter to print when running")
                .value_parser(["default", "minimal"])
                .default_value("default"),
        )
    }
}

/// Run a function with colorized reporting of errors.
///
/// The function receives the parsed arguments and a notification backend;
/// if it fails, the error and its causes are printed and the exit code is 1.
#[cfg(feature = "notifications")]
pub fn run_with_notifications<E, F>(matches: clap::ArgMatches, inner: F) -> i32
where
    E: Into<Error>,
    F: FnOnce(&clap::ArgMatches, &mut dyn NotificationBackend) -> Result<i32, E>,
{
    let chatter = match matches.get_one::<String>("chatter_level").map(|s| s.as_str()) {
        Some("minimal") => ChatterLevel::Minimal,
        _ => ChatterLevel::Normal,
    };

    let mut tnb = termcolor::TermcolorNotificationBackend::new(chatter);

    match inner(&matches, &mut tnb) {
        Ok(ret) => ret,

        Err(e) => {
            tnb.bare_error(e);
            1
        }
    }
}

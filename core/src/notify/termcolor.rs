// Copyright 2017-2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
A notification backend that sends colorized output to the terminal.

Notes go to standard output; everything more serious goes to standard error.
Each message gets a colored prefix (`note:`, `warning:`, and so on).

*/

use anyhow::Error;
use std::backtrace::BacktraceStatus;
use std::fmt::Arguments;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use super::{ChatterLevel, NotificationBackend, NotificationKind};

/// A notification backend that writes colorized output to the terminal.
pub struct TermcolorNotificationBackend {
    chatter: ChatterLevel,
    stdout: StandardStream,
    stderr: StandardStream,
    note_spec: ColorSpec,
    warning_spec: ColorSpec,
    error_spec: ColorSpec,
}

impl TermcolorNotificationBackend {
    /// Create a new backend that colorizes when the terminal supports it.
    pub fn new(chatter: ChatterLevel) -> TermcolorNotificationBackend {
        Self::with_color_choice(chatter, ColorChoice::Auto)
    }

    /// Create a new backend with an explicit coloring policy.
    pub fn with_color_choice(chatter: ChatterLevel, choice: ColorChoice) -> Self {
        let mut note_spec = ColorSpec::new();
        note_spec.set_fg(Some(Color::Green)).set_bold(true);

        let mut warning_spec = ColorSpec::new();
        warning_spec.set_fg(Some(Color::Yellow)).set_bold(true);

        // Severe and fatal messages share a style.
        let mut error_spec = ColorSpec::new();
        error_spec.set_fg(Some(Color::Red)).set_bold(true);

        TermcolorNotificationBackend {
            chatter,
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
            note_spec,
            warning_spec,
            error_spec,
        }
    }

    fn is_muted(&self, kind: NotificationKind) -> bool {
        kind == NotificationKind::Note && self.chatter <= ChatterLevel::Minimal
    }

    fn message(&mut self, kind: NotificationKind, prefix: Option<&str>, args: Arguments) {
        if self.is_muted(kind) {
            return;
        }

        let text = prefix.unwrap_or(match kind {
            NotificationKind::Note => "note:",
            NotificationKind::Warning => "warning:",
            NotificationKind::Severe => "severe:",
            NotificationKind::Fatal => "fatal:",
        });

        let (spec, stream) = match kind {
            NotificationKind::Note => (&self.note_spec, &mut self.stdout),
            NotificationKind::Warning => (&self.warning_spec, &mut self.stderr),
            NotificationKind::Severe | NotificationKind::Fatal => {
                (&self.error_spec, &mut self.stderr)
            }
        };

        // If the terminal is gone there is nowhere left to complain to.
        let _r = stream.set_color(spec);
        let _r = write!(stream, "{text}");
        let _r = stream.reset();
        let _r = writeln!(stream, " {args}");
    }

    fn error_chain(&mut self, kind: NotificationKind, first_prefix: Option<&str>, err: &Error) {
        let mut prefix = first_prefix;

        for cause in err.chain() {
            self.message(kind, Some(prefix.unwrap_or("caused by:")), format_args!("{cause}"));
            prefix = None;
        }

        let backtrace = err.backtrace();

        if backtrace.status() == BacktraceStatus::Captured {
            self.message(kind, Some("debugging:"), format_args!("backtrace follows:"));
            let _r = writeln!(self.stderr, "{backtrace}");
        }
    }

    /// Print the information contained in an Error object.
    ///
    /// This function prints out the error, the sub-errors that caused it, and
    /// its associated backtrace if one was captured, with colorization. It is
    /// meant for the top level of command-line programs.
    pub fn bare_error<E: Into<Error>>(&mut self, err: E) {
        let err = err.into();
        self.error_chain(NotificationKind::Severe, Some("error:"), &err);
    }
}

impl NotificationBackend for TermcolorNotificationBackend {
    fn notify(&mut self, kind: NotificationKind, args: Arguments, err: Option<Error>) {
        self.message(kind, None, args);

        if let Some(e) = err {
            self.error_chain(kind, None, &e);
        }
    }
}

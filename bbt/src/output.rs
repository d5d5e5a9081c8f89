// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal output for the `bbt` command: color selection, the stderr logger and the miette hook.

use clap::{Args, ValueEnum};
use miette::MietteHandlerOpts;
use owo_colors::{OwoColorize, Style};
use std::fmt;
use tracing::{level_filters::LevelFilter, Event, Level, Subscriber};
use tracing_subscriber::{
    filter::{ParseError, Targets},
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
};

/// The environment variable used to override log levels, as a list of `target=level` directives.
pub const LOG_ENV: &str = "BBT_LOG";

#[derive(Copy, Clone, Debug, Args)]
#[command(next_help_heading = "Output options")]
pub(crate) struct OutputOpts {
    /// Stream case output as it's produced, and show bbt's debug messages (needs --parallel 1)
    #[arg(long, short, env = "BBT_VERBOSE")]
    pub(crate) verbose: bool,

    /// When to use colors: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        value_name = "WHEN",
        env = "BBT_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    pub(crate) fn init(self) -> OutputContext {
        let context = OutputContext {
            verbose: self.verbose,
            color: self.color,
        };
        context.install_logger();
        context.install_miette_hook();
        context
    }
}

/// Output settings resolved from the command line.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) color: Color,
}

impl OutputContext {
    /// Styles for error messages written to stderr.
    pub fn stderr_styles(&self) -> StderrStyles {
        StderrStyles::new(self.colorize_stderr())
    }

    fn colorize_stderr(&self) -> bool {
        self.color.should_colorize(supports_color::Stream::Stderr)
    }

    fn install_logger(&self) {
        let env = std::env::var(LOG_ENV).ok();
        let (targets, invalid) = log_targets(env.as_deref(), self.verbose);
        let colorize = self.colorize_stderr();
        let layer = tracing_subscriber::fmt::layer()
            .event_format(LevelPrefix { colorize })
            .with_ansi(colorize)
            .with_writer(std::io::stderr)
            .with_filter(targets);

        // Only the first call in a process installs a logger.
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            return;
        }
        if let Some(err) = invalid {
            tracing::warn!("ignoring invalid {LOG_ENV}: {err}");
        }
    }

    fn install_miette_hook(&self) {
        let colorize = self.colorize_stderr();
        let installed = miette::set_hook(Box::new(move |_| {
            Box::new(
                MietteHandlerOpts::new()
                    .color(colorize)
                    .unicode(colorize)
                    .build(),
            )
        }));
        if installed.is_err() {
            tracing::debug!("miette hook already installed");
        }
    }
}

/// When to produce color output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub enum Color {
    /// Colorize if the stream is a terminal that supports it.
    #[default]
    Auto,
    /// Always colorize.
    Always,
    /// Never colorize.
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

/// Builds the log filter from the value of [`LOG_ENV`], if set.
///
/// Returns the parse error alongside the fallback filter if the value was invalid.
fn log_targets(env: Option<&str>, verbose: bool) -> (Targets, Option<ParseError>) {
    let fallback = Targets::new().with_default(LevelFilter::WARN);
    let fallback = if verbose {
        fallback.with_target("bbt", LevelFilter::DEBUG)
    } else {
        fallback
    };

    match env.map(str::trim) {
        None | Some("") => (fallback, None),
        Some(directives) => match directives.parse() {
            Ok(targets) => (targets, None),
            Err(err) => (fallback, Some(err)),
        },
    }
}

/// Writes events as `level: message key=value ...`, one per line.
struct LevelPrefix {
    colorize: bool,
}

impl LevelPrefix {
    fn label(&self, level: Level) -> (&'static str, Style) {
        let (label, style) = match level {
            Level::ERROR => ("error", Style::new().red().bold()),
            Level::WARN => ("warning", Style::new().yellow().bold()),
            Level::INFO => ("info", Style::new().bold()),
            Level::DEBUG => ("debug", Style::new().dimmed()),
            Level::TRACE => ("trace", Style::new().dimmed()),
        };
        if self.colorize {
            (label, style)
        } else {
            (label, Style::new())
        }
    }
}

impl<S, N> FormatEvent<S, N> for LevelPrefix
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let (label, style) = self.label(*event.metadata().level());
        write!(writer, "{}: ", label.style(style))?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Styles for error messages written to stderr.
#[derive(Clone, Debug, Default)]
pub struct StderrStyles {
    pub(crate) highlight: Style,
}

impl StderrStyles {
    fn new(colorize: bool) -> Self {
        if colorize {
            Self {
                highlight: Style::new().bold(),
            }
        } else {
            Self::default()
        }
    }
}

// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{BbtExitCode, ExpectedError, Result},
    output::{OutputContext, OutputOpts},
};
use bbt_filtering::TagFilter;
use bbt_runner::{
    config::{BbtConfig, RunConfig},
    discovery::discover_cases,
    reporter::RunReporter,
    signal::{InterruptController, SignalHandlerKind},
    CaseRegistry, RunnerBuilder,
};
use camino::Utf8PathBuf;
use clap::{Args, Parser};
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

/// Run black-box test cases.
///
/// Cases are files under FILE_OR_DIR whose entry points are registered in this harness. Options
/// not given on the command line are read from bbt.toml in the current directory.
#[derive(Debug, Parser)]
#[command(version, about, max_term_width = 100)]
pub struct BbtApp {
    /// A case file, or a directory to search for case files
    #[arg(value_name = "FILE_OR_DIR")]
    file_or_dir: Utf8PathBuf,

    #[clap(flatten)]
    run_opts: RunOpts,

    #[clap(flatten)]
    output: OutputOpts,
}

impl BbtApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, running cases from `registry`.
    ///
    /// Returns the exit code on success.
    pub fn exec(self, registry: &CaseRegistry, output: OutputContext) -> Result<i32> {
        let cwd = current_dir()?;
        let config = BbtConfig::from_sources(&cwd, self.run_opts.config_file.as_deref())?;
        let mut settings = config.run;
        self.run_opts.apply_to(output.verbose, &mut settings);
        tracing::debug!(?settings, "resolved run settings");

        let filter = TagFilter::parse(settings.filter.clone())?;
        let cases = discover_cases(&self.file_or_dir, &settings.case_extension)?;
        let colorize = output.color.should_colorize(supports_color::Stream::Stdout);

        if self.run_opts.list {
            let mut stdout = io::stdout().lock();
            write_case_list(&cases, registry, &filter, colorize, &mut stdout)
                .map_err(|err| ExpectedError::WriteOutput { err })?;
            return Ok(BbtExitCode::OK);
        }

        let mut builder = RunnerBuilder::default();
        builder
            .set_parallel(settings.parallel)
            .set_dont_stop(settings.dont_stop)
            .set_verbose(settings.verbose)
            .set_colorize(colorize)
            .set_filter(filter)
            .set_flags(settings.flags)
            .set_start_from(self.run_opts.start_from)
            .set_tmp_dir(settings.tmp_dir);
        let runner = builder.build(cases, registry)?;

        let mut reporter = RunReporter::new(io::stdout());
        if colorize {
            reporter.colorize();
        }
        reporter
            .report_options(&runner)
            .map_err(|err| ExpectedError::WriteOutput { err })?;

        runner.clean_tmp_dir()?;
        let interrupts = InterruptController::new(SignalHandlerKind::Standard)?;

        let summary = runner.execute(&interrupts, move |event| {
            if let Err(err) = reporter.report_event(event) {
                tracing::warn!("error writing run output: {err}");
            }
        });

        if let Some(fatal) = summary.fatal {
            return Err(fatal.into());
        }
        if !summary.errors.is_empty() {
            return Err(ExpectedError::CasesFailed {
                failed: summary.errors.len(),
            });
        }
        Ok(BbtExitCode::OK)
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Run options")]
struct RunOpts {
    /// Tag filter expression, for example `smoke and not slow`
    #[arg(long, value_name = "EXPR")]
    filter: Option<String>,

    /// Flags passed through to case code
    #[arg(long, num_args = 1.., value_name = "FLAG")]
    flags: Vec<String>,

    /// Number of cases to run at the same time
    #[arg(long, short = 'j', value_name = "N")]
    parallel: Option<usize>,

    /// Skip every case before this one
    #[arg(long, value_name = "CASE")]
    start_from: Option<String>,

    /// Keep running cases after one fails
    #[arg(long)]
    dont_stop: bool,

    /// Config file to use instead of bbt.toml in the current directory
    #[arg(long, value_name = "PATH", env = "BBT_CONFIG_FILE")]
    config_file: Option<Utf8PathBuf>,

    /// List the discovered cases and their tags without running them
    #[arg(long)]
    list: bool,
}

impl RunOpts {
    /// Overlays options given on the command line onto the configured ones.
    fn apply_to(&self, verbose: bool, settings: &mut RunConfig) {
        if let Some(filter) = &self.filter {
            settings.filter.clone_from(filter);
        }
        if !self.flags.is_empty() {
            settings.flags.clone_from(&self.flags);
        }
        if let Some(parallel) = self.parallel {
            settings.parallel = parallel;
        }
        settings.dont_stop |= self.dont_stop;
        settings.verbose |= verbose;
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| ExpectedError::CurrentDir { err })?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| ExpectedError::NonUtf8CurrentDir { path })
}

fn write_case_list(
    cases: &[String],
    registry: &CaseRegistry,
    filter: &TagFilter,
    colorize: bool,
    writer: &mut dyn Write,
) -> io::Result<()> {
    let (name_style, note_style) = if colorize {
        (Style::new().bold(), Style::new().magenta())
    } else {
        (Style::new(), Style::new())
    };

    for case in cases {
        let Some(entry) = registry.get(case) else {
            writeln!(
                writer,
                "{} {}",
                case.style(name_style),
                "(no entry point)".style(note_style)
            )?;
            continue;
        };
        let definition = entry();
        let tags = definition.declared_tags();
        write!(writer, "{}", case.style(name_style))?;
        if !tags.is_empty() {
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            write!(writer, " [{}]", tags.join(", "))?;
        }
        if definition.is_skipped() {
            write!(writer, " {}", "(skip)".style(note_style))?;
        } else if !filter.matches(tags) {
            write!(writer, " {}", "(filtered out)".style(note_style))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::Directive, fmt, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::cli::Options;

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// reports.
pub fn init_tracing(opts: &Options) -> eyre::Result<()> {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(opts.log_level))
        .from_env_lossy();

    let use_color = opts.log_color.use_ansi(std::io::stderr().is_terminal());

    let include_target = matches!(opts.log_level, Level::DEBUG | Level::TRACE);

    let fmt_layer = fmt::layer()
        .with_target(include_target)
        .with_ansi(use_color)
        .with_writer(std::io::stderr);

    Registry::default()
        .with(fmt_layer.with_filter(log_filter))
        .try_init()?;
    Ok(())
}

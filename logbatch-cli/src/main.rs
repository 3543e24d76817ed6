//! Reads lines from stdin and writes them out in batches.

#![forbid(unsafe_code)]

use clap::Parser;
use logbatch::LogBuffer;
use tokio::io::AsyncBufReadExt;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use self::config::Arguments;
use self::output::Output;

mod config;
mod output;

fn main() -> eyre::Result<()> {
    let args = Arguments::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .with_env_var("LOGBATCH_LOG")
                    .from_env()?,
            )
            .with_writer(std::io::stderr)
            .compact()
            .finish(),
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(&args));

    // Stdin is read on a blocking thread that may still be parked waiting for input.
    runtime.shutdown_background();

    result
}

async fn run(args: &Arguments) -> eyre::Result<()> {
    let settings = args.settings()?;
    let output = Output::open(settings.output.as_deref()).await?;

    let (buffer, flush_loop) = LogBuffer::builder(output)
        .formatter(settings.format)
        .config(settings.buffer)
        .build()?;
    let flush_loop = tokio::spawn(flush_loop.run());

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let input = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    buffer.append(line)?;
                }
                Ok(None) => {
                    tracing::debug!("end of input");
                    break Ok(());
                }
                Err(error) => break Err(error),
            },
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                break Ok(());
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break Ok(());
            }
        }
    };

    buffer.close()?;
    let summary = flush_loop.await?;

    input?;
    if summary.failures > 0 {
        eyre::bail!(
            "failed to write {} batches, {} lines were lost",
            summary.failures,
            summary.lost
        );
    }

    Ok(())
}

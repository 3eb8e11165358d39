use clap::{command, Parser};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use umeme::{ConfigUpdate, Error, Executor, ExecutorConfig, ExecutorEvent, EXAMPLE_CODE};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Program to run; the starter example when omitted
    script: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replay the program until stopped
    #[arg(long = "loop")]
    loop_program: bool,

    /// Number of components on the board
    #[arg(long)]
    components: Option<usize>,

    /// Read direct commands from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Prints output lines until the bus closes. Resolves to whether the last
/// reported error is still set.
fn spawn_printer(executor: &Executor, timestamps: bool) -> JoinHandle<bool> {
    let mut stream = BroadcastStream::new(executor.subscribe().receiver);
    tokio::spawn(async move {
        let mut failed = false;
        while let Some(event) = stream.next().await {
            match event {
                Ok(ExecutorEvent::Output(output)) => println!("{}", output.formatted(timestamps)),
                Ok(ExecutorEvent::Error(error)) => failed = error.is_some(),
                Ok(event) => debug!("Event: {:?}", event),
                Err(e) => debug!("Printer lagged: {}", e),
            }
        }
        failed
    })
}

async fn run_script(executor: &Executor, source: &str) -> Result<(), Error> {
    executor.start(source).await?;
    tokio::select! {
        result = executor.wait_until_idle() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| Error::Internal(format!("Failed to wait for Ctrl+C: {}", e)))?;
            executor.stop().await;
        }
    }
    Ok(())
}

async fn run_interactive(executor: &Executor) -> Result<(), Error> {
    println!("Andika amri (acha = simamisha, safisha = reset, toka = ondoka)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line
                .map_err(|e| Error::Internal(format!("Failed to read stdin: {}", e)))?,
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| Error::Internal(format!("Failed to wait for Ctrl+C: {}", e)))?;
                executor.stop().await;
                None
            }
        };
        let Some(line) = line else {
            return Ok(());
        };
        match line.trim() {
            "toka" => return Ok(()),
            "acha" => executor.stop().await,
            "safisha" => executor.reset_components().await,
            command => {
                // Failures are already on the output stream.
                let _ = executor.execute_direct_command(command).await;
            }
        }
    }
}

async fn run(cli: &Cli) -> Result<bool, Error> {
    let mut config = match &cli.config {
        Some(path) => ExecutorConfig::from_file(path)?,
        None => ExecutorConfig::default(),
    };
    config.apply(&ConfigUpdate {
        component_count: cli.components,
        loop_program: cli.loop_program.then_some(true),
    });
    info!("config loaded.");
    debug!("config: {:?}", config);

    let timestamps = config.timestamps;
    let executor = Executor::new(config);
    let printer = spawn_printer(&executor, timestamps);

    if let Some(path) = &cli.script {
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Internal(format!("Failed to read script file: {}", e)))?;
        run_script(&executor, &source).await?;
    } else if !cli.interactive {
        run_script(&executor, EXAMPLE_CODE).await?;
    }

    if cli.interactive {
        run_interactive(&executor).await?;
    }

    drop(executor);
    let failed = tokio::time::timeout(Duration::from_secs(1), printer)
        .await
        .map_err(|_| Error::internal("Output printer did not finish"))?
        .map_err(|e| Error::Internal(format!("Output printer failed: {}", e)))?;
    Ok(failed)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).await {
        Ok(false) => {}
        Ok(true) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

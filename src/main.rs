// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use segsim::metrics::logger::MetricsLogger;
use segsim::prelude::*;
use segsim::simulation::{SweepRow, sweep};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{Level, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send messages over the lossy link and trace every event.
    Run {
        /// Message to send; repeat for more. Without -m or --input the
        /// messages are read from a prompt.
        #[arg(short, long = "message")]
        messages: Vec<String>,
        /// File with one message per line.
        #[arg(short, long, conflicts_with = "messages")]
        input: Option<PathBuf>,
        /// JSON config; the flags below override it.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        loss: Option<f64>,
        #[arg(short, long)]
        window: Option<usize>,
        #[arg(short = 'P', long)]
        max_payload: Option<usize>,
        #[arg(long)]
        delay: Option<u64>,
        #[arg(long)]
        rto: Option<u64>,
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(long)]
        max_events: Option<u64>,
        #[arg(long)]
        no_trace: bool,
        /// Write the run report here as JSON.
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Many seeded runs per loss probability, summarised as CSV.
    Sweep {
        #[arg(short, long, default_value = "0.0,0.1,0.2,0.3,0.4,0.5,0.6")]
        losses: String,
        #[arg(short, long, default_value_t = 20)]
        runs: u32,
        #[arg(short, long = "message", default_value = "the quick brown fox jumps over the lazy dog")]
        messages: Vec<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        window: Option<usize>,
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the wire form of a single segment.
    Encode {
        #[arg(long, default_value_t = 0)]
        seq: u32,
        #[arg(long, default_value_t = 0)]
        ack: u32,
        #[arg(short, long, default_value = "")]
        data: String,
        #[arg(long)]
        fin: bool,
        /// Build an ACK segment instead of a data segment.
        #[arg(long)]
        ack_only: bool,
        #[arg(short, long, default_value_t = 0)]
        window: u16,
    },
}

fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            messages,
            input,
            config,
            loss,
            window,
            max_payload,
            delay,
            rto,
            seed,
            max_events,
            no_trace,
            report,
        } => {
            let mut config = match config {
                Some(path) => SimConfig::load(path)?,
                None => SimConfig::default(),
            };
            if let Some(loss) = loss {
                config.loss_probability = loss;
            }
            if let Some(window) = window {
                config.window = window;
            }
            if let Some(max_payload) = max_payload {
                config.max_payload = max_payload;
            }
            if let Some(delay) = delay {
                config.transmission_delay = delay;
                // keep the default rto proportional unless one was given
                if rto.is_none() {
                    config.rto = delay.saturating_mul(4);
                }
            }
            if let Some(rto) = rto {
                config.rto = rto;
            }
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if let Some(max_events) = max_events {
                config.max_events = Some(max_events);
            }
            if no_trace {
                config.trace = false;
            }

            let source: Box<dyn MessageSource> = if let Some(path) = input {
                let file = File::open(&path)
                    .with_context(|| format!("opening {}", path.display()))?;
                Box::new(LineSource::new(BufReader::new(file)))
            } else if messages.is_empty() {
                Box::new(LineSource::new(std::io::stdin().lock()).with_prompt("Enter a message: "))
            } else {
                Box::new(ScriptedSource::new(messages.into_iter().map(String::into_bytes)))
            };

            run_single(config, source, report)?;
        }

        Commands::Sweep {
            losses,
            runs,
            messages,
            config,
            window,
            seed,
            output,
        } => {
            let mut base = match config {
                Some(path) => SimConfig::load(path)?,
                None => SimConfig::default(),
            };
            if let Some(window) = window {
                base.window = window;
            }
            base = base.with_seed(seed).with_trace(false);

            let losses = parse_losses(&losses)?;
            let messages: Vec<Vec<u8>> = messages.into_iter().map(String::into_bytes).collect();

            run_sweep(base, &losses, runs, &messages, output)?;
        }

        Commands::Encode {
            seq,
            ack,
            data,
            fin,
            ack_only,
            window,
        } => {
            let segment = if ack_only {
                anyhow::ensure!(data.is_empty(), "an ACK segment carries no data");
                Segment::ack(seq, ack, fin, window)
            } else {
                Segment::data(seq, ack, data.into_bytes(), fin, window)
            };
            let wire = segment.encode();

            println!("{}", segment);
            println!("checksum: 0x{:04x} (verifies: {})", segment.checksum(), segment.verify());
            println!("{} bytes:", wire.len());
            for row in wire.chunks(4) {
                let hex: Vec<String> = row.iter().map(|b| format!("{:02x}", b)).collect();
                println!("  {}", hex.join(" "));
            }
        }
    }

    let total_time = program_start.elapsed();
    info!("Total runtime: {:.2}s", total_time.as_secs_f64());

    Ok(())
}

fn run_single(config: SimConfig, source: Box<dyn MessageSource>, report_path: Option<PathBuf>) -> Result<()> {
    info!("segsim: Single Run");

    let mut sim = Simulation::new(config, source)?;
    let report = sim.run()?;

    for (i, message) in report.delivered.iter().enumerate() {
        info!("Delivered message {}: {:?}", i + 1, message);
    }
    let m = &report.metrics;
    info!(
        "Segments sent: {}, retransmissions: {}, lost: {} ({:.1}%), discarded: {}",
        m.segments_sent,
        m.retransmissions,
        m.segments_lost,
        m.loss_rate() * 100.0,
        m.segments_discarded
    );

    if let Some(path) = report_path {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report {}", path.display()))?;
        info!("Report saved to: {}", path.display());
    }

    Ok(())
}

fn run_sweep(
    base: SimConfig,
    losses: &[f64],
    runs: u32,
    messages: &[Vec<u8>],
    output: Option<PathBuf>,
) -> Result<()> {
    info!("segsim: Loss Sweep");
    info!("");
    info!("Loss probabilities: {:?}", losses);
    info!("Runs per probability: {}", runs);
    info!("Window: {}, rto: {}", base.window, base.rto);
    info!("");

    let rows = sweep(&base, losses, runs, messages, true)?;

    sweep_table(&rows);

    let path = match output {
        Some(path) => path,
        None => {
            std::fs::create_dir_all("results")?;
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            PathBuf::from(format!("results/sweep_{}.csv", timestamp))
        }
    };
    let mut logger = MetricsLogger::new(&path)?;
    logger.log_batch(&rows)?;
    info!("Sweep saved to: {}", path.display());

    Ok(())
}

fn parse_losses(list: &str) -> Result<Vec<f64>> {
    let losses = list
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .with_context(|| format!("invalid loss probability '{}'", s))
        })
        .collect::<Result<Vec<_>>>()?;

    if losses.is_empty() {
        anyhow::bail!("No loss probabilities given");
    }
    Ok(losses)
}

fn sweep_table(rows: &[SweepRow]) {
    println!("\n╔═════════════════════════════════════════════════════════════════╗");
    println!("║                           LOSS SWEEP                            ║");
    println!("╠══════════╦═══════════╦════════════╦════════════╦════════════════╣");
    println!("║ Loss     ║ Completed ║ Retransmit ║ Final time ║ Observed loss  ║");
    println!("║ (p)      ║ (%)       ║ (avg)      ║ (avg)      ║ (%)            ║");
    println!("╠══════════╬═══════════╬════════════╬════════════╬════════════════╣");

    for row in rows {
        println!(
            "║ {:<8.2} ║ {:>8.1}% ║ {:>10.2} ║ {:>10.1} ║ {:>13.2}% ║",
            row.loss_probability,
            row.delivery_rate * 100.0,
            row.avg_retransmissions,
            row.avg_final_time,
            row.avg_observed_loss * 100.0,
        );
    }

    println!("╚══════════╩═══════════╩════════════╩════════════╩════════════════╝\n");
}

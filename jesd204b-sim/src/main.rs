//! Cycle-accurate loopback simulation of a JESD204B link.
//!
//! Wires a transmit core to a receive core through per-lane elastic buffers,
//! loops `jsync` back, and reports link bring-up, test-pattern integrity and
//! status counters. Link parameters come from a JSON settings file or from
//! the built-in two-lane configuration.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jesd204b::fifo::ElasticBuffer;
use jesd204b::settings::{ChecksumMode, LinkSettings, SettingsValues};
use jesd204b::{CoreRx, CoreRxInput, CoreTx, CoreTxInput, LinkWord};

#[derive(Debug, Parser)]
#[command(about = "JESD204B link-layer loopback simulator")]
struct Args {
    /// JSON file with the link settings (named-field form).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Number of protocol-clock cycles to simulate.
    #[arg(long, default_value_t = 2000)]
    cycles: usize,

    /// Deassert the transmitter's enable for one multiframe at this cycle.
    #[arg(long)]
    inject_desync: Option<usize>,

    /// Corrupt one octet on lane 0 at this cycle.
    #[arg(long)]
    inject_error: Option<usize>,

    /// Disable strict preamble checking on the receiver.
    #[arg(long)]
    no_strict_ilas: bool,

    /// Period of the external multiframe reference pulse, in multiframes.
    #[arg(long, default_value_t = 4)]
    jref_period: u32,
}

fn load_settings(args: &Args) -> Result<LinkSettings> {
    let values = match &args.settings {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SettingsValues {
            did: 0x5a,
            bid: 0x5,
            lid: 0,
            l: 2,
            scr: 1,
            f: 2,
            k: 16,
            m: 2,
            n: 16,
            cs: 0,
            np: 16,
            subclassv: 1,
            s: 1,
            jesdv: 1,
            cf: 0,
            hd: 0,
            checksum_mode: ChecksumMode::FieldSum,
        },
    };
    LinkSettings::from_values(&values).context("building link settings")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let settings = load_settings(&args)?;
    info!("link settings:\n{settings}");

    let mut tx = CoreTx::new(&settings)?;
    let mut rx = CoreRx::new(&settings, !args.no_strict_ilas)?;
    tx.set_enable(true);
    rx.set_enable(true);
    tx.set_stpl_enable(true);
    rx.set_stpl_enable(true);

    let lanes = tx.lane_count();
    let mut ebufs: Vec<ElasticBuffer> = (0..lanes).map(|_| ElasticBuffer::new()).collect();
    let samples = vec![vec![0u32; settings.samples_per_clock() as usize]; settings.m() as usize];
    let jref_period = (args.jref_period * settings.lmfc_cycles()) as usize;
    let desync_window = settings.lmfc_cycles() as usize;

    let mut jsync = false;
    let mut tx_ready_at = None;
    let mut rx_ready_at = None;
    let mut settled_at = None;

    for cycle in 0..args.cycles {
        if let Some(at) = args.inject_desync {
            if cycle == at {
                info!(cycle, "injecting desynchronization");
                tx.set_enable(false);
            }
            if cycle == at + desync_window {
                tx.set_enable(true);
            }
        }

        let jref = cycle % jref_period == 0;
        let words = tx.step(&CoreTxInput { samples: &samples, jsync, jref }).to_vec();
        let mut delayed: Vec<LinkWord> = words.into_iter().zip(&mut ebufs).map(|(w, e)| e.step(w)).collect();
        if args.inject_error == Some(cycle) {
            info!(cycle, "corrupting one octet on lane 0");
            delayed[0].data ^= 0xff;
        }
        rx.step(&CoreRxInput { words: &delayed, jref });
        jsync = rx.jsync();

        if tx.ready() && tx_ready_at.is_none() {
            tx_ready_at = Some(cycle);
            info!(cycle, "transmitter entered the data phase");
        }
        if rx.ready() && rx_ready_at.is_none() {
            rx_ready_at = Some(cycle);
            info!(cycle, "receiver entered the data phase");
        }
        // Give the pipeline one multiframe to flush, then count pattern
        // errors over the remainder of the run.
        if rx.ready() && settled_at.is_none() {
            settled_at = Some(cycle + desync_window);
        }
        if settled_at == Some(cycle) {
            rx.reset_stpl_errors();
        }
    }

    info!("simulation finished after {} cycles", args.cycles);
    match (tx_ready_at, rx_ready_at) {
        (Some(tx_at), Some(rx_at)) => info!(tx_at, rx_at, "link came up"),
        _ => info!("link did not come up"),
    }
    info!(
        jsync_errors = rx.jsync_errors(),
        stpl_errors = rx.stpl_errors(),
        "status counters"
    );
    for lane in 0..lanes {
        info!(
            lane,
            ilas_errors = rx.links()[lane].ilas_errors(),
            skew_level = rx.skew_level(lane),
            "lane status"
        );
    }
    Ok(())
}

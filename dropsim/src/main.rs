#[macro_use]
extern crate log;

mod generator;

use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use dropsketch::table::{CountCell, SumCell, XorCell};
use dropsketch::*;
use generator::LoadGenerator;

#[derive(Parser, Debug)]
#[command(about = "Simulates packet loss and decodes the dropped packets from sketches.")]
struct Cli {
    /// Sketch type
    #[arg(value_enum)]
    sketch: SketchType,
    /// Number of logged packets
    #[arg(short = 'n', long, default_value_t = 10000)]
    num_logged: usize,
    /// Probability that a logged packet is dropped
    #[arg(short = 'p', long, default_value_t = 0.001)]
    p_dropped: f64,
    /// Whether the receiver reports a packet that was never sent
    #[arg(long)]
    malicious: bool,
    /// Number of trials to run. Reports the median decode time.
    #[arg(long, default_value_t = 1)]
    trials: usize,
    /// Seed of the first trial
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Number of buckets in the table
    #[arg(long, default_value_t = 1000)]
    buckets: usize,
    /// Number of hash functions
    #[arg(short = 'k', long, default_value_t = 2)]
    hashes: u32,
    /// Give each hash function its own range of buckets
    #[arg(long)]
    disjoint: bool,
    /// Fingerprint width in bits
    #[arg(short = 'w', long, default_value_t = 32)]
    fingerprint_bits: u32,
    /// Prime modulus of the field
    #[arg(long, default_value_t = 4294967291)]
    modulus: u32,
    /// Number of power sums
    #[arg(short = 'd', long, default_value_t = 20)]
    degree: usize,
    /// Length of every packet in bytes
    #[arg(long, default_value_t = 16)]
    packet_bytes: usize,
    /// Solver for the reconciliation model
    #[arg(long, value_enum, default_value_t = SolverType::Backtracking)]
    solver: SolverType,
}

#[derive(ValueEnum, Debug, Copy, Clone)]
enum SketchType {
    Counting,
    Invertible,
    Summing,
    PowerSum,
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
enum SolverType {
    Backtracking,
    Glpk,
}

impl Cli {
    fn config(&self) -> SessionConfig {
        let policy = if self.disjoint { HashPolicy::Disjoint } else { HashPolicy::Shared };
        SessionConfig::default()
            .with_buckets(self.buckets)
            .with_hashes(self.hashes)
            .with_hash_policy(policy)
            .with_fingerprint_bits(self.fingerprint_bits)
            .with_modulus(self.modulus)
            .with_degree(self.degree)
            .with_packet_bytes(self.packet_bytes)
            .with_hash_seed(self.seed)
    }

    fn solver(&self) -> Result<Box<dyn Solver>> {
        match self.solver {
            SolverType::Backtracking => Ok(Box::new(BacktrackingSolver::default())),
            #[cfg(feature = "glpk")]
            SolverType::Glpk => Ok(Box::new(GlpkSolver)),
            #[cfg(not(feature = "glpk"))]
            SolverType::Glpk => Err(Error::InvalidConfig(
                "built without the glpk feature".into(),
            )),
        }
    }
}

/// Outcome of one trial.
struct Trial {
    /// Time to decode the difference.
    time: Duration,
    /// Bytes in the receiver's snapshot.
    nbytes: usize,
    /// Whether the decode reported the truth: the dropped packets for an
    /// honest receiver, an error for a malicious one.
    correct: bool,
}

fn check(
    result: Result<Vec<usize>>,
    g: &LoadGenerator,
) -> bool {
    match (result, g.malicious_i) {
        (Ok(indices), None) => indices == g.dropped,
        (Err(e), Some(_)) => {
            debug!("rejected malicious receiver: {}", e);
            true
        }
        (Ok(indices), Some(i)) => {
            error!("accepted {} drops despite malicious packet {}", indices.len(), i);
            false
        }
        (Err(e), None) => {
            error!("failed to decode {} drops: {}", g.dropped.len(), e);
            false
        }
    }
}

fn run_table<C: Decode>(
    config: &SessionConfig,
    g: &LoadGenerator,
    solver: &mut dyn Solver,
) -> Result<Trial> {
    let offset = Fingerprinter::from_config(config)?.choose_offset(&g.log)?;
    let t1 = Instant::now();
    let mut received = BucketTable::<C>::new(config.clone(), offset)?;
    for packet in &g.received {
        received.insert_packet(packet)?;
    }
    let t2 = Instant::now();
    let result = reconcile_log(&g.log, &received, solver).map(|recovery| {
        info!("peeled {}, solved {}", recovery.peeled, recovery.solved);
        recovery.indices
    });
    let t3 = Instant::now();
    debug!("built table of {} packets: {:?}", g.received.len(), t2 - t1);
    Ok(Trial {
        time: t3 - t2,
        nbytes: received.to_bytes()?.len(),
        correct: check(result, g),
    })
}

fn run_power_sum(config: &SessionConfig, g: &LoadGenerator) -> Result<Trial> {
    let mut sent = BufferingAccumulator::new(config.clone())?;
    let mut received = BufferingAccumulator::new(config.clone())?;
    for packet in &g.log {
        sent.insert(packet)?;
    }
    for packet in &g.received {
        received.insert(packet)?;
    }
    let t1 = Instant::now();
    let sent = sent.finalize(None)?;
    let received = received.finalize(Some(sent.offset()))?;
    let t2 = Instant::now();
    let result = sent.subtract(&received).and_then(|diff| diff.decode_with_log(&g.log));
    let t3 = Instant::now();
    debug!("finalized accumulators: {:?}", t2 - t1);
    Ok(Trial {
        time: t3 - t2,
        nbytes: received.to_bytes()?.len(),
        correct: check(result, g),
    })
}

fn median(mut results: Vec<Duration>) -> Duration {
    if results.is_empty() {
        return Duration::ZERO;
    }
    results.sort();
    let mid = results.len() / 2;
    if results.len() & 1 == 0 {
        (results[mid - 1] + results[mid]) / 2
    } else {
        results[mid]
    }
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let args = Cli::parse();
    let config = args.config();
    config.validate()?;
    if !(0.0..=1.0).contains(&args.p_dropped) {
        return Err(Error::InvalidConfig(format!(
            "drop probability {} is not in [0, 1]",
            args.p_dropped
        )));
    }
    let mut solver = args.solver()?;
    debug!("{:?}", args);

    let mut results = vec![];
    let mut errors = 0;
    let mut nbytes = 0;
    for trial in 0..args.trials {
        let g = LoadGenerator::with_seed(
            args.seed + trial as u64,
            args.num_logged,
            args.packet_bytes,
            args.p_dropped,
            args.malicious,
        );
        info!("trial {}: dropped {}/{}", trial, g.dropped.len(), g.log.len());
        let result = match args.sketch {
            SketchType::Counting => run_table::<CountCell>(&config, &g, solver.as_mut())?,
            SketchType::Invertible => run_table::<XorCell>(&config, &g, solver.as_mut())?,
            SketchType::Summing => run_table::<SumCell>(&config, &g, solver.as_mut())?,
            SketchType::PowerSum => run_power_sum(&config, &g)?,
        };
        nbytes = result.nbytes;
        if result.correct {
            results.push(result.time);
        } else {
            errors += 1;
        }
    }
    info!("errors\tlogged\tp_drop\tbytes\tmedian");
    info!(
        "{}\t{}\t{}\t{}\t{:?}",
        errors,
        args.num_logged,
        args.p_dropped,
        nbytes,
        median(results),
    );
    Ok(())
}

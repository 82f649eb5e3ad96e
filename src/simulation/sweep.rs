// Many independent seeded runs per loss probability, spread over rayon. Each
// run owns its whole world, so nothing but the progress bar is shared.

use super::{RunReport, SimConfig, Simulation};
use crate::session::ScriptedSource;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// Without a cap a run at loss 1.0 would retransmit forever.
const DEFAULT_SWEEP_EVENT_CAP: u64 = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRow {
    pub loss_probability: f64,
    pub runs: u32,
    pub completed_runs: u32,
    pub delivery_rate: f64,
    pub avg_retransmissions: f64,
    pub avg_final_time: f64,
    pub avg_observed_loss: f64,
}

impl SweepRow {
    fn from_reports(loss_probability: f64, reports: &[RunReport], expected: usize) -> Self {
        let n = reports.len().max(1) as f64;
        let completed_runs = reports
            .iter()
            .filter(|r| r.drained && r.delivered.len() == expected)
            .count() as u32;

        Self {
            loss_probability,
            runs: reports.len() as u32,
            completed_runs,
            delivery_rate: completed_runs as f64 / n,
            avg_retransmissions: reports.iter().map(|r| r.metrics.retransmissions as f64).sum::<f64>() / n,
            avg_final_time: reports.iter().map(|r| r.metrics.final_time as f64).sum::<f64>() / n,
            avg_observed_loss: reports.iter().map(|r| r.metrics.loss_rate()).sum::<f64>() / n,
        }
    }
}

/// Runs `runs` seeds for every probability in `losses`. Seeds are
/// `base.seed + run index`, so a sweep is reproducible.
pub fn sweep(
    base: &SimConfig,
    losses: &[f64],
    runs: u32,
    messages: &[Vec<u8>],
    progress: bool,
) -> Result<Vec<SweepRow>> {
    anyhow::ensure!(runs > 0, "sweep needs at least one run per probability");
    anyhow::ensure!(!messages.is_empty(), "sweep needs at least one message");

    let first_seed = base.seed.unwrap_or(0);
    let cap = base.max_events.unwrap_or(DEFAULT_SWEEP_EVENT_CAP);

    let jobs: Vec<(usize, u64)> = (0..losses.len())
        .flat_map(|i| (0..runs as u64).map(move |r| (i, first_seed.wrapping_add(r))))
        .collect();

    let pb = if progress {
        ProgressBar::new(jobs.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len} runs {msg}")?
            .progress_chars("█▓░"),
    );

    let reports: Vec<(usize, RunReport)> = jobs
        .par_iter()
        .map(|&(i, seed)| -> Result<(usize, RunReport)> {
            let config = base
                .clone()
                .with_name(format!("{}_p{}_s{}", base.name, losses[i], seed))
                .with_loss(losses[i])
                .with_seed(seed)
                .with_trace(false)
                .with_max_events(cap);
            let source = ScriptedSource::new(messages.to_vec());

            let mut sim = Simulation::new(config, Box::new(source))?;
            let report = sim.run()?;
            pb.inc(1);
            Ok((i, report))
        })
        .collect::<Result<_>>()?;

    pb.finish_with_message("Sweep complete");

    let rows = losses
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let group: Vec<RunReport> = reports
                .iter()
                .filter(|(idx, _)| *idx == i)
                .map(|(_, r)| r.clone())
                .collect();
            SweepRow::from_reports(p, &group, messages.len())
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs() -> Vec<Vec<u8>> {
        vec![b"hello world".to_vec(), b"again".to_vec()]
    }

    #[test]
    fn lossless_sweep_always_delivers() {
        let base = SimConfig::default().with_seed(100);
        let rows = sweep(&base, &[0.0], 4, &msgs(), false).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].runs, 4);
        assert_eq!(rows[0].completed_runs, 4);
        assert_eq!(rows[0].avg_retransmissions, 0.0);
    }

    #[test]
    fn total_loss_never_delivers() {
        let base = SimConfig::default().with_seed(1).with_max_events(200);
        let rows = sweep(&base, &[1.0], 2, &msgs(), false).unwrap();
        assert_eq!(rows[0].completed_runs, 0);
        assert_eq!(rows[0].delivery_rate, 0.0);
        assert!(rows[0].avg_retransmissions > 0.0);
    }

    #[test]
    fn same_seed_same_rows() {
        let base = SimConfig::default().with_seed(7);
        let a = sweep(&base, &[0.3, 0.6], 3, &msgs(), false).unwrap();
        let b = sweep(&base, &[0.3, 0.6], 3, &msgs(), false).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.avg_retransmissions, y.avg_retransmissions);
            assert_eq!(x.avg_final_time, y.avg_final_time);
        }
    }

    #[test]
    fn seeds_wrap_at_the_top_of_the_range() {
        let base = SimConfig::default().with_seed(u64::MAX);
        let rows = sweep(&base, &[0.0], 2, &msgs(), false).unwrap();
        assert_eq!(rows[0].completed_runs, 2);
    }

    #[test]
    fn rejects_empty_inputs() {
        let base = SimConfig::default();
        assert!(sweep(&base, &[0.1], 0, &msgs(), false).is_err());
        assert!(sweep(&base, &[0.1], 1, &[], false).is_err());
    }
}

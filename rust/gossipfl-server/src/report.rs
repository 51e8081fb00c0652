//! Round-indexed metrics of a run.
//!
//! The history is consumed by plotting tools, therefore it is serialized as plain JSON.

use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use gossipfl_core::{NodeId, RoundId};

/// The local training metrics of an eligible node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub node: NodeId,
    pub local_epochs: u32,
    pub samples: usize,
    /// The local loss after training.
    pub loss: f64,
}

/// The metrics of a completed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round_id: RoundId,
    pub eligible: BTreeSet<NodeId>,
    /// The local metrics in ascending node order.
    pub nodes: Vec<NodeReport>,
    /// The loss of the mean of all node states, if global evaluation is enabled.
    pub global_loss: Option<f64>,
}

impl RoundReport {
    /// Computes the sample-weighted mean of the local losses.
    pub fn mean_local_loss(&self) -> Option<f64> {
        let samples = self.nodes.iter().map(|node| node.samples).sum::<usize>();
        if samples == 0 {
            return None;
        }
        let total = self
            .nodes
            .iter()
            .map(|node| node.loss * node.samples as f64)
            .sum::<f64>();
        Some(total / samples as f64)
    }
}

/// The metrics of all completed rounds of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    pub algorithm: String,
    pub rounds: Vec<RoundReport>,
}

impl RunHistory {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            rounds: Vec::new(),
        }
    }

    pub fn push(&mut self, report: RoundReport) {
        self.rounds.push(report);
    }

    pub fn last(&self) -> Option<&RoundReport> {
        self.rounds.last()
    }

    /// Writes the history as pretty printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("failed to serialize report")?;
        writer.flush().context("failed to write report")?;
        Ok(())
    }
}

use super::evolution_engine::ProgressCallback;
use log::{debug, info};

/// Reports search progress through the `log` facade
#[derive(Debug, Default)]
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        debug!("generation {} starting", generation);
    }

    fn on_generation_complete(&mut self, generation: usize, best_score: f64, hall_of_fame_size: usize) {
        info!(
            "generation {} complete. best score: {:.5}, hall of fame size: {}",
            generation, best_score, hall_of_fame_size
        );
    }

    fn on_individuals_evaluated(&mut self, batch: usize, total: usize) {
        debug!("evaluated {} pipeline(s), {} in total", batch, total);
    }
}

/// Progress events forwarded over a channel, for callers watching a search
/// from another thread
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart(usize),
    GenerationComplete {
        generation: usize,
        best_score: f64,
        hall_of_fame_size: usize,
    },
    IndividualsEvaluated { batch: usize, total: usize },
}

pub struct ChannelProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

impl ChannelProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&mut self, generation: usize, best_score: f64, hall_of_fame_size: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete {
            generation,
            best_score,
            hall_of_fame_size,
        });
    }

    fn on_individuals_evaluated(&mut self, batch: usize, total: usize) {
        let _ = self
            .sender
            .send(ProgressMessage::IndividualsEvaluated { batch, total });
    }
}

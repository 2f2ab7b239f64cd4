//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::ChannelMetricsAggregator;

/// Statistics from a simulation run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Fiducials emitted by the pulse train
    pub fiducials: u64,

    /// Event captures observed in the FIFO
    pub events: u64,

    /// Channel pickups served
    pub pickups: u64,

    /// Pickups that needed the wall-clock fallback
    pub fallbacks: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Number of registered channels
    pub active_channels: usize,

    /// Per-channel aggregation
    pub channel_metrics: ChannelMetricsAggregator,
}

impl PipelineStats {
    /// Pickups served per wall-clock second
    pub fn pickups_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.pickups as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Simulated time covered by the run
    pub fn simulated_secs(&self) -> f64 {
        self.fiducials as f64 / contracts::FIDUCIAL_RATE_HZ
    }

    /// Fallback rate as percentage
    pub fn fallback_rate(&self) -> f64 {
        if self.pickups > 0 {
            (self.fallbacks as f64 / self.pickups as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                   Simulation Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Simulated: {:.3}s", self.simulated_secs());
        println!("   ├─ Fiducials: {}", self.fiducials);
        println!("   ├─ Events captured: {}", self.events);
        println!("   ├─ Pickups: {} ({:.0}/s)", self.pickups, self.pickups_per_sec());
        println!(
            "   ├─ Fallbacks: {} ({:.2}%)",
            self.fallbacks,
            self.fallback_rate()
        );
        println!("   └─ Active channels: {}", self.active_channels);

        println!("\n📈 Channels");
        print!("{}", self.channel_metrics.summary());
        println!();
    }
}

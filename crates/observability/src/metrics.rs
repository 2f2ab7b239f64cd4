//! Channel 指标收集模块
//!
//! 基于 ChannelReport 收集和统计时间戳通道的运行指标。

use std::collections::BTreeMap;

use contracts::{ChannelReport, SyncError};
use metrics::{counter, gauge, histogram};

/// 从 ChannelReport 记录指标
///
/// 每次通道 update 之后调用，导出同步状态与统计窗口。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_channel_report;
///
/// let report = channel.update(&config);
/// record_channel_report("CAM1", &report);
/// ```
pub fn record_channel_report(channel: &str, report: &ChannelReport) {
    gauge!("tsfifo_report_synced", "channel" => channel.to_string())
        .set(if report.synced { 1.0 } else { 0.0 });

    gauge!("tsfifo_report_diff_vs_expected_ms", "channel" => channel.to_string())
        .set(report.diff_vs_expected_ms);
    gauge!("tsfifo_report_min_diff_ms", "channel" => channel.to_string())
        .set(report.min_diff_ms);
    gauge!("tsfifo_report_max_diff_ms", "channel" => channel.to_string())
        .set(report.max_diff_ms);

    gauge!("tsfifo_report_min_latency_ms", "channel" => channel.to_string())
        .set(report.min_latency_ms);
    gauge!("tsfifo_report_max_latency_ms", "channel" => channel.to_string())
        .set(report.max_latency_ms);

    // 相关器
    gauge!("tsfifo_report_correlator_avg_ms", "channel" => channel.to_string())
        .set(report.correlator_avg_ms);
    gauge!("tsfifo_report_delta_s", "channel" => channel.to_string()).set(report.delta_s);
}

/// 记录一次轮询延迟 (从事件捕获到取时间戳)
pub fn record_pickup_latency_ms(channel: &str, latency_ms: f64) {
    histogram!(
        "tsfifo_pickup_latency_ms",
        "channel" => channel.to_string()
    )
    .record(latency_ms);
}

/// 记录注入的 FIFO 事件
pub fn record_event_pushed(event_code: u32) {
    counter!(
        "tsfifo_events_pushed_total",
        "event_code" => event_code.to_string()
    )
    .increment(1);
}

/// 通道指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ChannelMetricsAggregator {
    /// 各通道统计 (按名称排序)
    pub channels: BTreeMap<String, ChannelTally>,
}

/// 单通道累计
#[derive(Debug, Clone, Default)]
pub struct ChannelTally {
    /// 总请求数
    pub requests: u64,

    /// 同步成功数
    pub synced: u64,

    /// 各错误类型次数
    pub errors: BTreeMap<&'static str, u64>,

    /// diff_vs_expected 统计 (毫秒)
    pub diff_stats: RunningStats,

    /// 相关器误差统计 (毫秒)
    pub correlator_stats: RunningStats,
}

impl ChannelMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次请求结果
    pub fn record_request(&mut self, channel: &str, error: Option<&SyncError>) {
        let tally = self.tally(channel);
        tally.requests += 1;
        match error {
            None => tally.synced += 1,
            Some(err) => *tally.errors.entry(err.label()).or_insert(0) += 1,
        }
    }

    /// 更新聚合统计
    pub fn update(&mut self, channel: &str, report: &ChannelReport) {
        let tally = self.tally(channel);
        if report.synced {
            tally.diff_stats.push(report.diff_vs_expected_ms);
        }
        if report.correlator_diff_ms != 0.0 {
            tally.correlator_stats.push(report.correlator_diff_ms);
        }
    }

    fn tally(&mut self, channel: &str) -> &mut ChannelTally {
        self.channels.entry(channel.to_string()).or_default()
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let channels = self
            .channels
            .iter()
            .map(|(name, tally)| ChannelSummary {
                name: name.clone(),
                requests: tally.requests,
                synced: tally.synced,
                sync_rate: if tally.requests > 0 {
                    tally.synced as f64 / tally.requests as f64 * 100.0
                } else {
                    0.0
                },
                errors: tally.errors.clone(),
                diff_ms: StatsSummary::from(&tally.diff_stats),
                correlator_ms: StatsSummary::from(&tally.correlator_stats),
            })
            .collect::<Vec<_>>();

        MetricsSummary {
            total_requests: channels.iter().map(|c| c.requests).sum(),
            total_synced: channels.iter().map(|c| c.synced).sum(),
            channels,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub total_synced: u64,
    pub channels: Vec<ChannelSummary>,
}

/// 单通道摘要
#[derive(Debug, Clone, Default)]
pub struct ChannelSummary {
    pub name: String,
    pub requests: u64,
    pub synced: u64,
    pub sync_rate: f64,
    pub errors: BTreeMap<&'static str, u64>,
    pub diff_ms: StatsSummary,
    pub correlator_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Timestamp FIFO Summary ===")?;
        writeln!(f, "Total requests: {}", self.total_requests)?;
        writeln!(f, "Synced: {}", self.total_synced)?;

        for channel in &self.channels {
            writeln!(
                f,
                "[{}] requests={} synced={} ({:.2}%)",
                channel.name, channel.requests, channel.synced, channel.sync_rate
            )?;
            writeln!(f, "  diff vs expected (ms): {}", channel.diff_ms)?;
            if channel.correlator_ms.count > 0 {
                writeln!(f, "  correlator error (ms): {}", channel.correlator_ms)?;
            }
            for (error, count) in &channel.errors {
                writeln!(f, "  {}: {}", error, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

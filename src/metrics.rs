//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存代理的指标收集功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 指标收集器
///
/// 收集各层操作的计数、耗时和队列规模。更复杂的直方图
/// 由外部遥测汇聚端负责，这里只保留可观测所需的最小集合
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 计数器: name -> count
    pub counters: Arc<Mutex<HashMap<String, u64>>>,
    /// 瞬时值: name -> value
    pub gauges: Arc<Mutex<HashMap<String, u64>>>,
    /// 操作耗时（累积秒数和次数，用于计算平均值）
    /// name -> (total_duration_secs, count)
    pub durations: Arc<Mutex<HashMap<String, (f64, u64)>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 计数器加一
    pub fn incr_counter(&self, name: &str) {
        self.incr_counter_by(name, 1);
    }

    /// 计数器增加指定数量
    pub fn incr_counter_by(&self, name: &str, delta: u64) {
        let mut map = self.counters.lock().unwrap();
        *map.entry(name.to_string()).or_insert(0) += delta;
    }

    /// 设置瞬时值（如缓冲区长度）
    pub fn set_gauge(&self, name: &str, value: u64) {
        let mut map = self.gauges.lock().unwrap();
        map.insert(name.to_string(), value);
    }

    /// 记录一次操作耗时
    pub fn observe_duration(&self, name: &str, duration: Duration) {
        let mut map = self.durations.lock().unwrap();
        let entry = map.entry(name.to_string()).or_insert((0.0, 0));
        entry.0 += duration.as_secs_f64();
        entry.1 += 1;
    }

    /// 读取计数器当前值
    pub fn counter(&self, name: &str) -> u64 {
        let map = self.counters.lock().unwrap();
        map.get(name).copied().unwrap_or(0)
    }

    /// 读取瞬时值
    pub fn gauge(&self, name: &str) -> u64 {
        let map = self.gauges.lock().unwrap();
        map.get(name).copied().unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为字符串返回，用于监控系统采集
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let counters = metrics.counters.lock().unwrap();
    let gauges = metrics.gauges.lock().unwrap();
    let durations = metrics.durations.lock().unwrap();

    let mut output = String::new();
    for (k, v) in counters.iter() {
        output.push_str(&format!("memstrata_{} {}\n", k, v));
    }
    for (k, v) in gauges.iter() {
        output.push_str(&format!("memstrata_{} {}\n", k, v));
    }
    for (k, (total, count)) in durations.iter() {
        output.push_str(&format!("memstrata_{}_seconds_sum {}\n", k, total));
        output.push_str(&format!("memstrata_{}_seconds_count {}\n", k, count));
    }
    output
}

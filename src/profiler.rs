use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecisionTimes {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionSummary {
    pub agent: String,
    pub decisions: u64,
    pub mean_us: f64,
    pub max_us: f64,
}

// Wall clock time spent in agent decisions, keyed by agent name. Each game gets
// its own profiler and they are merged once the games are done.
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    times: BTreeMap<String, DecisionTimes>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, agent: &str, elapsed: Duration) {
        let times = self.times.entry(agent.to_string()).or_default();
        times.count += 1;
        times.total += elapsed;
        times.max = times.max.max(elapsed);
    }

    pub fn merge(&mut self, other: &Profiler) {
        for (agent, other_times) in &other.times {
            let times = self.times.entry(agent.clone()).or_default();
            times.count += other_times.count;
            times.total += other_times.total;
            times.max = times.max.max(other_times.max);
        }
    }

    pub fn get(&self, agent: &str) -> Option<&DecisionTimes> {
        self.times.get(agent)
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn summary(&self) -> Vec<DecisionSummary> {
        self.times
            .iter()
            .map(|(agent, times)| DecisionSummary {
                agent: agent.clone(),
                decisions: times.count,
                mean_us: if times.count == 0 { 0.0 } else { times.total.as_secs_f64() * 1e6 / times.count as f64 },
                max_us: times.max.as_secs_f64() * 1e6,
            })
            .collect()
    }

    pub fn report(&self) {
        println!("{:<20} {:>10} {:>12} {:>12}", "Agent", "Decisions", "Mean (us)", "Max (us)");
        for row in self.summary() {
            println!("{:<20} {:>10} {:>12.2} {:>12.2}", row.agent, row.decisions, row.mean_us, row.max_us);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let mut a = Profiler::new();
        a.record("Greedy_0", Duration::from_micros(10));
        a.record("Greedy_0", Duration::from_micros(30));

        let mut b = Profiler::new();
        b.record("Greedy_0", Duration::from_micros(50));
        b.record("Random_1", Duration::from_micros(5));

        a.merge(&b);
        let greedy = a.get("Greedy_0").unwrap();
        assert_eq!(greedy.count, 3);
        assert_eq!(greedy.total, Duration::from_micros(90));
        assert_eq!(greedy.max, Duration::from_micros(50));

        let summary = a.summary();
        assert_eq!(summary.len(), 2);
        assert!((summary[0].mean_us - 30.0).abs() < 1e-6);
        assert_eq!(summary[1].agent, "Random_1");
    }
}

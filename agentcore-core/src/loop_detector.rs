//! Loop detection for the tool-dispatch path.
//!
//! Maintains a bounded ring of recent tool invocations and classifies
//! repetition patterns before a prospective call reaches its handler. Five
//! classifiers run in a fixed order; the first one to fire wins.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LoopDetectorConfig;

/// High-signal argument keys used to build a parameter fingerprint when the
/// full canonicalised arguments would otherwise dominate the comparison.
const FINGERPRINT_KEYS: &[&str] = &[
    "command", "query", "path", "file", "url", "message", "content", "action", "method",
];

/// Keys whose values dominate semantic-similarity scoring.
const HIGH_SIGNAL_KEYS: &[&str] = &["command", "query", "message", "content"];
const MID_SIGNAL_KEYS: &[&str] = &["path", "file", "url", "action", "method"];

/// One recorded tool invocation, canonicalised for comparison.
#[derive(Debug, Clone)]
struct ToolCallRecord {
    tool_name: String,
    serialized_parameters: String,
    parameter_fingerprint: String,
    arguments: Value,
    timestamp: Instant,
    sequence_number: u64,
}

/// Which classifier flagged a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    ExactRepeat,
    AlternatingPattern,
    ParameterCycle,
    ToolSequence,
    SemanticSimilarity,
}

/// Outcome of offering a prospective call to the detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectionResult {
    pub is_loop: bool,
    pub loop_type: Option<LoopType>,
    pub repeat_count: Option<usize>,
    pub similarity: Option<f32>,
    pub description: String,
    pub suggestion: String,
}

impl LoopDetectionResult {
    fn clean() -> Self {
        Self {
            is_loop: false,
            loop_type: None,
            repeat_count: None,
            similarity: None,
            description: String::new(),
            suggestion: String::new(),
        }
    }

    fn flagged(loop_type: LoopType, description: String, suggestion: String) -> Self {
        Self {
            is_loop: true,
            loop_type: Some(loop_type),
            repeat_count: None,
            similarity: None,
            description,
            suggestion,
        }
    }

    fn with_repeat_count(mut self, count: usize) -> Self {
        self.repeat_count = Some(count);
        self
    }

    fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }
}

/// Default capacity for the ring of recorded calls (spec range 20-25).
const DEFAULT_RING_CAPACITY: usize = 25;

/// Detects repetitive or pathological tool-call patterns within a single
/// task run. One instance is owned by the Main Agent Loop and shared with
/// any sub-agents spawned from it.
pub struct LoopDetector {
    config: LoopDetectorConfig,
    records: VecDeque<ToolCallRecord>,
    capacity: usize,
    next_sequence: u64,
}

impl LoopDetector {
    pub fn new(config: LoopDetectorConfig) -> Self {
        Self {
            config,
            records: VecDeque::with_capacity(DEFAULT_RING_CAPACITY),
            capacity: DEFAULT_RING_CAPACITY,
            next_sequence: 0,
        }
    }

    /// Reset all recorded state, e.g. at a task boundary.
    pub fn reset(&mut self) {
        self.records.clear();
        self.next_sequence = 0;
    }

    /// Offer a prospective tool call. Records it, then evaluates the
    /// classifiers in spec order. Returns the first positive classification,
    /// or a clean result if none fire.
    pub fn check(&mut self, tool_name: &str, arguments: &Value) -> LoopDetectionResult {
        if !self.config.enabled {
            return LoopDetectionResult::clean();
        }

        let record = self.build_record(tool_name, arguments);
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front();
        }

        self.check_exact_repeat()
            .or_else(|| self.check_alternating_pattern())
            .or_else(|| self.check_parameter_cycle())
            .or_else(|| self.check_tool_sequence())
            .or_else(|| self.check_semantic_similarity())
            .unwrap_or_else(LoopDetectionResult::clean)
    }

    fn build_record(&mut self, tool_name: &str, arguments: &Value) -> ToolCallRecord {
        let canonical = canonicalize(arguments);
        let serialized_parameters =
            serde_json::to_string(&canonical).unwrap_or_else(|_| "{}".to_string());
        let parameter_fingerprint = fingerprint(&canonical);
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        ToolCallRecord {
            tool_name: tool_name.to_string(),
            serialized_parameters,
            parameter_fingerprint,
            arguments: canonical,
            timestamp: Instant::now(),
            sequence_number,
        }
    }

    /// Classifier 1: the last K records are identical in (name, params).
    fn check_exact_repeat(&self) -> Option<LoopDetectionResult> {
        let k = self.config.exact_repeat_threshold.max(1);
        if self.records.len() < k {
            return None;
        }
        let tail: Vec<&ToolCallRecord> = self.records.iter().rev().take(k).collect();
        let head = tail[0];
        let all_same = tail
            .iter()
            .all(|r| r.tool_name == head.tool_name && r.serialized_parameters == head.serialized_parameters);
        if all_same {
            Some(
                LoopDetectionResult::flagged(
                    LoopType::ExactRepeat,
                    format!(
                        "Tool '{}' was called with identical arguments {} times in a row",
                        head.tool_name, k
                    ),
                    "Try a different approach or different arguments instead of repeating the same call".to_string(),
                )
                .with_repeat_count(k),
            )
        } else {
            None
        }
    }

    /// Classifier 2: the last 4 records form an A-B-A-B shape, A != B.
    fn check_alternating_pattern(&self) -> Option<LoopDetectionResult> {
        let threshold = self.config.alternating_pattern_threshold;
        if threshold < 2 || self.records.len() < 4 {
            return None;
        }
        let last4: Vec<&ToolCallRecord> = self.records.iter().rev().take(4).collect();
        let (d, c, b, a) = (last4[0], last4[1], last4[2], last4[3]);
        let same = |x: &ToolCallRecord, y: &ToolCallRecord| {
            x.tool_name == y.tool_name && x.serialized_parameters == y.serialized_parameters
        };
        let is_alternating = same(a, c) && same(b, d) && !same(a, b);
        if is_alternating {
            Some(LoopDetectionResult::flagged(
                LoopType::AlternatingPattern,
                format!(
                    "Detected an alternating A-B-A-B pattern between '{}' and '{}'",
                    a.tool_name, b.tool_name
                ),
                "Break the oscillation by reconsidering the goal instead of alternating between these two calls".to_string(),
            ))
        } else {
            None
        }
    }

    /// Classifier 3: within the last 2*M records for a single tool, some
    /// exact parameter string occurs >= 3 times.
    fn check_parameter_cycle(&self) -> Option<LoopDetectionResult> {
        let m = self.config.parameter_cycle_threshold.max(1);
        let window = 2 * m;
        let tail: Vec<&ToolCallRecord> = self.records.iter().rev().take(window).collect();
        let Some(current) = tail.first() else {
            return None;
        };
        let same_tool: Vec<&&ToolCallRecord> = tail
            .iter()
            .filter(|r| r.tool_name == current.tool_name)
            .collect();

        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for r in &same_tool {
            *counts.entry(r.serialized_parameters.as_str()).or_insert(0) += 1;
        }
        if let Some((params, count)) = counts.into_iter().find(|(_, c)| *c >= 3) {
            Some(
                LoopDetectionResult::flagged(
                    LoopType::ParameterCycle,
                    format!(
                        "Tool '{}' has been called with the same parameters ({}) {} times within the last {} calls",
                        current.tool_name, params, count, window
                    ),
                    "The same arguments keep recurring; try different parameters or a different tool".to_string(),
                )
                .with_repeat_count(count),
            )
        } else {
            None
        }
    }

    /// Classifier 4: for L in {2,3}, the last 2L records split into two
    /// halves that are equal pairwise (a repeated sequence of calls).
    fn check_tool_sequence(&self) -> Option<LoopDetectionResult> {
        for l in [2usize, 3usize] {
            let window = 2 * l;
            if self.records.len() < window || window > self.config.tool_sequence_window {
                continue;
            }
            let tail: Vec<&ToolCallRecord> = self.records.iter().rev().take(window).collect();
            // tail[0..l] is the more recent half, tail[l..2l] the earlier half.
            let recent = &tail[0..l];
            let earlier = &tail[l..2 * l];
            let matches = recent.iter().zip(earlier.iter()).all(|(a, b)| {
                a.tool_name == b.tool_name && a.serialized_parameters == b.serialized_parameters
            });
            if matches {
                let sequence: Vec<String> = recent
                    .iter()
                    .rev()
                    .map(|r| r.tool_name.clone())
                    .collect();
                return Some(LoopDetectionResult::flagged(
                    LoopType::ToolSequence,
                    format!(
                        "Detected a repeated {}-call sequence: {}",
                        l,
                        sequence.join(" -> ")
                    ),
                    "This sequence of calls just repeated itself; change the plan instead of repeating it".to_string(),
                ));
            }
        }
        None
    }

    /// Classifier 5 (optional): weighted field-wise similarity among recent
    /// invocations of the same tool, gated by a minimum elapsed time so
    /// genuinely new rapid calls aren't penalised.
    fn check_semantic_similarity(&self) -> Option<LoopDetectionResult> {
        let threshold = self.config.semantic_similarity_threshold;
        if threshold <= 0.0 || threshold > 1.0 {
            return None;
        }
        let Some(current) = self.records.back() else {
            return None;
        };
        for prior in self.records.iter().rev().skip(1) {
            if prior.tool_name != current.tool_name {
                continue;
            }
            let similarity = field_similarity(&prior.arguments, &current.arguments);
            if similarity >= threshold {
                let elapsed = current.timestamp.duration_since(prior.timestamp);
                if elapsed.as_secs_f32() >= 5.0 {
                    return Some(
                        LoopDetectionResult::flagged(
                            LoopType::SemanticSimilarity,
                            format!(
                                "Tool '{}' was called with arguments {:.0}% similar to a call {:.1}s ago",
                                current.tool_name,
                                similarity * 100.0,
                                elapsed.as_secs_f32()
                            ),
                            "These arguments are nearly identical to a prior call; confirm this call is actually necessary".to_string(),
                        )
                        .with_similarity(similarity),
                    );
                }
            }
        }
        None
    }
}

/// Recursively sort object keys so equivalent invocations hash identically.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Project a canonicalised object onto the fixed set of high-signal keys;
/// fall back to the whole object if none are present.
fn fingerprint(canonical: &Value) -> String {
    if let Value::Object(map) = canonical {
        let mut projection = serde_json::Map::new();
        for key in FINGERPRINT_KEYS {
            if let Some(v) = map.get(*key) {
                projection.insert((*key).to_string(), v.clone());
            }
        }
        if !projection.is_empty() {
            return serde_json::to_string(&Value::Object(projection)).unwrap_or_default();
        }
    }
    serde_json::to_string(canonical).unwrap_or_default()
}

fn field_weight(key: &str) -> f32 {
    if HIGH_SIGNAL_KEYS.contains(&key) {
        1.0
    } else if MID_SIGNAL_KEYS.contains(&key) {
        0.85
    } else {
        0.5
    }
}

/// Weighted mean of per-field similarity across the union of keys present in
/// either argument object.
fn field_similarity(a: &Value, b: &Value) -> f32 {
    let (Value::Object(am), Value::Object(bm)) = (a, b) else {
        return if a == b { 1.0 } else { 0.0 };
    };
    let mut keys: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    keys.extend(am.keys().map(|k| k.as_str()));
    keys.extend(bm.keys().map(|k| k.as_str()));
    if keys.is_empty() {
        return 1.0;
    }

    let mut weighted_sum = 0.0f32;
    let mut weight_total = 0.0f32;
    for key in keys {
        let weight = field_weight(key);
        let score = match (am.get(key), bm.get(key)) {
            (Some(av), Some(bv)) => field_value_similarity(av, bv),
            _ => 0.0,
        };
        weighted_sum += weight * score;
        weight_total += weight;
    }
    if weight_total == 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}

fn field_value_similarity(a: &Value, b: &Value) -> f32 {
    if a == b {
        return 1.0;
    }
    match (a, b) {
        (Value::String(s1), Value::String(s2)) => {
            let s1 = s1.to_lowercase();
            let s2 = s2.to_lowercase();
            let max_len = s1.chars().count().max(s2.chars().count());
            if max_len == 0 {
                return 1.0;
            }
            let dist = edit_distance(&s1, &s2);
            (1.0 - (dist as f32 / max_len as f32)).max(0.0)
        }
        (Value::Number(_), Value::Number(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_)) => 0.5,
        _ => 0.0,
    }
}

/// Classic Levenshtein distance over characters.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut row: Vec<usize> = (0..=m).collect();
    for i in 1..=n {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=m {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = temp;
        }
    }
    row[m]
}

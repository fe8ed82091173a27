//! Tick-time histogram text parser.
//!
//! The managed process exposes one cumulative histogram per thread:
//!
//! ```text
//! tickTime_count{name="svMain"} 5201
//! tickTime_sum{name="svMain"} 23.81
//! tickTime_bucket{name="svMain",le="0.005"} 4980
//! ...
//! tickTime_bucket{name="svMain",le="+Inf"} 5201
//! ```
//!
//! A sample is accepted only as a whole. Boundaries come from the
//! reference thread, every other thread must list the same boundaries in
//! the same order, and cumulative bucket values are converted to
//! per-bucket counts before leaving this module.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::trace;

use tickscope_core::config::ParserConfig;
use tickscope_core::{Boundaries, Boundary, Snapshot, ThreadCounters};

use crate::error::{ParseError, ParseResult};

/// A validated sample: boundaries plus per-bucket counters per thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSample {
    pub boundaries: Boundaries,
    pub counters: Snapshot,
}

/// A thread's histogram as exposed on the wire, where every bucket also
/// counts all lower buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeHistogram {
    pub count: u64,
    pub sum: f64,
    pub buckets: Vec<u64>,
}

impl CumulativeHistogram {
    /// Convert to per-bucket counts. On failure returns the index of the
    /// first bucket lower than its predecessor.
    pub fn into_counters(self) -> Result<ThreadCounters, usize> {
        Ok(ThreadCounters {
            count: self.count,
            sum: self.sum,
            buckets: cumulative_to_per_bucket(&self.buckets)?,
        })
    }
}

/// `out[0] = in[0]`, `out[i] = in[i] - in[i-1]`. Fails with the offending
/// index when the sequence decreases.
pub fn cumulative_to_per_bucket(cumulative: &[u64]) -> Result<Vec<u64>, usize> {
    let mut out = Vec::with_capacity(cumulative.len());
    let mut previous = 0u64;
    for (index, &value) in cumulative.iter().enumerate() {
        let diff = value.checked_sub(previous).ok_or(index)?;
        out.push(diff);
        previous = value;
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    Count,
    Sum,
    Bucket,
}

#[derive(Debug)]
struct SampleLine<'a> {
    line: usize,
    suffix: Suffix,
    thread: &'a str,
    le: Option<&'a str>,
    value: &'a str,
}

#[derive(Debug, Default)]
struct PartialHistogram {
    count: Option<u64>,
    sum: Option<f64>,
    buckets: Vec<u64>,
}

/// Parser for one metric family, built once from configuration.
#[derive(Debug, Clone)]
pub struct MetricsParser {
    family: String,
    threads: Vec<String>,
    reference_thread: String,
    bucket_count: usize,
    line_re: Regex,
}

impl MetricsParser {
    pub fn new(config: &ParserConfig) -> ParseResult<Self> {
        let pattern = format!(
            r#"^{}_(count|sum|bucket)\{{name="([^"]*)"(?:,le="([^"]*)")?\}}\s+(\S+)$"#,
            regex::escape(&config.family)
        );
        let line_re = Regex::new(&pattern).map_err(|e| ParseError::Pattern(e.to_string()))?;
        Ok(Self {
            family: config.family.clone(),
            threads: config.threads.clone(),
            reference_thread: config.reference_thread.clone(),
            bucket_count: config.bucket_count,
            line_re,
        })
    }

    /// Parse and validate one raw sample.
    pub fn parse(&self, raw: &str) -> ParseResult<ParsedSample> {
        let lines = self.tokenize(raw)?;

        for thread in &self.threads {
            if !lines.iter().any(|l| l.thread == thread.as_str()) {
                return Err(ParseError::MissingThread(thread.clone()));
            }
        }

        let boundaries = self.extract_boundaries(&lines)?;

        let mut partial: BTreeMap<&str, PartialHistogram> = self
            .threads
            .iter()
            .map(|t| (t.as_str(), PartialHistogram::default()))
            .collect();

        for line in &lines {
            let Some(hist) = partial.get_mut(line.thread) else {
                continue;
            };
            match line.suffix {
                Suffix::Count => {
                    if hist.count.is_some() {
                        return Err(duplicate(line.thread, "count"));
                    }
                    hist.count = Some(parse_integer(line.value).ok_or_else(|| invalid(line))?);
                }
                Suffix::Sum => {
                    if hist.sum.is_some() {
                        return Err(duplicate(line.thread, "sum"));
                    }
                    hist.sum = Some(line.value.parse::<f64>().map_err(|_| invalid(line))?);
                }
                Suffix::Bucket => {
                    let found = parse_le(line)?;
                    let index = hist.buckets.len();
                    let expected = boundaries.get(index).ok_or_else(|| ParseError::BucketCount {
                        thread: line.thread.to_string(),
                        expected: self.bucket_count,
                        found: index + 1,
                    })?;
                    if found != expected {
                        return Err(ParseError::BucketMismatch {
                            thread: line.thread.to_string(),
                            index,
                            expected,
                            found,
                        });
                    }
                    hist.buckets
                        .push(parse_integer(line.value).ok_or_else(|| invalid(line))?);
                }
            }
        }

        let mut counters = BTreeMap::new();
        for (thread, hist) in partial {
            let count = match hist.count {
                Some(c) if c > 0 => c,
                _ => return Err(ParseError::InvalidCount { thread: thread.to_string() }),
            };
            let sum = match hist.sum {
                Some(s) if s.is_finite() && s > 0.0 => s,
                _ => return Err(ParseError::InvalidSum { thread: thread.to_string() }),
            };
            if hist.buckets.len() != self.bucket_count {
                return Err(ParseError::BucketCount {
                    thread: thread.to_string(),
                    expected: self.bucket_count,
                    found: hist.buckets.len(),
                });
            }

            let cumulative = CumulativeHistogram {
                count,
                sum,
                buckets: hist.buckets,
            };
            let per_bucket = cumulative
                .into_counters()
                .map_err(|index| ParseError::Retrograde {
                    thread: thread.to_string(),
                    index,
                })?;
            counters.insert(thread.to_string(), per_bucket);
        }

        trace!(threads = counters.len(), "metrics sample parsed");
        Ok(ParsedSample {
            boundaries,
            counters: Snapshot::new(counters),
        })
    }

    fn tokenize<'a>(&self, raw: &'a str) -> ParseResult<Vec<SampleLine<'a>>> {
        let prefix = format!("{}_", self.family);
        let mut lines = Vec::new();

        for (idx, raw_line) in raw.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || !line.starts_with(&prefix) {
                continue;
            }
            let caps = self
                .line_re
                .captures(line)
                .ok_or_else(|| ParseError::MalformedLine {
                    line: idx + 1,
                    content: line.to_string(),
                })?;

            let suffix = match caps.get(1).map(|m| m.as_str()) {
                Some("count") => Suffix::Count,
                Some("sum") => Suffix::Sum,
                _ => Suffix::Bucket,
            };
            let (Some(thread), Some(value)) = (caps.get(2), caps.get(4)) else {
                return Err(ParseError::MalformedLine {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            lines.push(SampleLine {
                line: idx + 1,
                suffix,
                thread: thread.as_str(),
                le: caps.get(3).map(|m| m.as_str()),
                value: value.as_str(),
            });
        }

        if lines.is_empty() {
            return Err(ParseError::MissingFamily(self.family.clone()));
        }
        Ok(lines)
    }

    fn extract_boundaries(&self, lines: &[SampleLine<'_>]) -> ParseResult<Boundaries> {
        let values = lines
            .iter()
            .filter(|l| l.suffix == Suffix::Bucket && l.thread == self.reference_thread)
            .map(parse_le)
            .collect::<ParseResult<Vec<Boundary>>>()?;
        Ok(Boundaries::try_new(values, self.bucket_count)?)
    }
}

fn parse_le(line: &SampleLine<'_>) -> ParseResult<Boundary> {
    let le = line.le.ok_or_else(|| ParseError::MissingLe {
        thread: line.thread.to_string(),
        line: line.line,
    })?;
    Boundary::parse(le).ok_or_else(|| ParseError::InvalidValue {
        line: line.line,
        value: le.to_string(),
    })
}

/// Accepts plain integers and integral floats such as `1.2e+06`.
fn parse_integer(s: &str) -> Option<u64> {
    if let Ok(v) = s.parse::<u64>() {
        return Some(v);
    }
    let v: f64 = s.parse().ok()?;
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64).then_some(v as u64)
}

fn invalid(line: &SampleLine<'_>) -> ParseError {
    ParseError::InvalidValue {
        line: line.line,
        value: line.value.to_string(),
    }
}

fn duplicate(thread: &str, field: &'static str) -> ParseError {
    ParseError::DuplicateField {
        thread: thread.to_string(),
        field,
    }
}

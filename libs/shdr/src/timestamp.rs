use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use pipeline::{Frame, Guard, GuardResult, Transform};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampMode {
    Absolute,
    Relative,
    Ignore,
}

struct RelativeState {
    base: DateTime<Utc>,
    offset: Option<Duration>,
}

/// Consumes the first token as a timestamp (§4.3.2), emitting a
/// `Frame::Timestamped` carrying the remaining tokens.
pub struct TimestampExtractor {
    mode: TimestampMode,
    relative: Mutex<Option<RelativeState>>,
}

impl TimestampExtractor {
    pub fn new(mode: TimestampMode) -> Self {
        TimestampExtractor {
            mode,
            relative: Mutex::new(None),
        }
    }

    fn extract(&self, first_token: &str) -> (DateTime<Utc>, Option<f64>) {
        let (main, duration) = split_duration(first_token);
        let now = Utc::now();
        let ts = match self.mode {
            TimestampMode::Ignore => now,
            TimestampMode::Absolute => {
                if main.is_empty() {
                    now
                } else {
                    parse_instant(main).unwrap_or_else(|| {
                        warn!(token = main, "malformed SHDR timestamp, using agent clock");
                        now
                    })
                }
            }
            TimestampMode::Relative => self.extract_relative(main, now),
        };
        (ts, duration)
    }

    fn extract_relative(&self, main: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut guard = self.relative.lock();
        if guard.is_none() {
            *guard = Some(RelativeState {
                base: now,
                offset: None,
            });
        }
        let state = guard.as_mut().unwrap();
        if let Some(parsed) = parse_instant(main) {
            let offset = *state.offset.get_or_insert_with(|| now.signed_duration_since(parsed));
            parsed + offset
        } else if let Ok(ms) = main.parse::<f64>() {
            state.base + Duration::milliseconds(ms as i64)
        } else {
            now
        }
    }
}

fn split_duration(token: &str) -> (&str, Option<f64>) {
    match token.split_once('@') {
        Some((main, dur)) => (main, dur.trim().parse::<f64>().ok()),
        None => (token, None),
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Accept a bare "Z"-less ISO instant with fractional seconds.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    None
}

impl Transform<Frame> for TimestampExtractor {
    fn name(&self) -> &str {
        "timestamp_extractor"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Tokens { .. } => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::Tokens { mut tokens, device } => {
                if tokens.is_empty() {
                    return None;
                }
                let first = tokens.remove(0);
                let (timestamp, duration) = self.extract(&first);
                Some(Frame::Timestamped {
                    timestamp,
                    duration,
                    tokens,
                    device,
                })
            }
            other => Some(other),
        }
    }
}

/// Time-ordered throughput observations (bytes/second) from one benchmark run.
///
/// Open while the benchmark runs; `finish` freezes it. Consumers only ever
/// borrow the samples.
#[derive(Debug, Clone, Default)]
pub struct SampleSequence {
    samples:  Vec<f64>,
    finished: bool,
}

impl SampleSequence {
    pub fn new() -> Self { Self::default() }

    /// Append one observation. Returns false (and drops the value) when the
    /// sequence is frozen or the value is negative / not finite.
    pub fn push(&mut self, bytes_per_sec: f64) -> bool {
        if self.finished || !bytes_per_sec.is_finite() || bytes_per_sec < 0.0 {
            return false;
        }
        self.samples.push(bytes_per_sec);
        true
    }

    pub fn finish(&mut self) { self.finished = true; }

    pub fn is_finished(&self) -> bool { self.finished }

    pub fn as_slice(&self) -> &[f64] { &self.samples }

    pub fn len(&self) -> usize { self.samples.len() }

    pub fn is_empty(&self) -> bool { self.samples.is_empty() }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() { return None; }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }
}

impl FromIterator<f64> for SampleSequence {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut seq = SampleSequence::new();
        for v in iter { seq.push(v); }
        seq.finish();
        seq
    }
}

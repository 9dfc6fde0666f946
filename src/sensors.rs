use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::engine::EngineHandle;
use crate::error::{TrackerError, TrackerResult};
use crate::types::SensorSample;

/// Scoped sensor acquisition: while open, every sample from the stream is
/// forwarded into the engine queue in stream order.
///
/// Closing (or dropping) the session aborts the forwarder, so no sample from
/// this stream reaches the engine after `close()` returns.
pub struct SensorSession {
    task: Option<JoinHandle<TrackerResult<u64>>>,
}

impl SensorSession {
    pub fn open<S>(stream: S, handle: EngineHandle) -> Self
    where
        S: Stream<Item = SensorSample> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            let mut forwarded = 0u64;
            while let Some(sample) = stream.next().await {
                handle.push(sample).await?;
                forwarded += 1;
            }
            debug!(target: "sensors", "stream ended after {} samples", forwarded);
            Ok(forwarded)
        });
        Self { task: Some(task) }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the stream to end; returns how many samples were forwarded.
    pub async fn finished(mut self) -> TrackerResult<u64> {
        match self.task.take() {
            Some(task) => task.await.map_err(|_| TrackerError::EngineClosed)?,
            None => Ok(0),
        }
    }

    /// Stop forwarding. Returns after the forwarder is gone.
    pub async fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SensorSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ===== Replay logs =====

/// Read a JSON-lines sensor log, gunzipping `.gz` files.
///
/// Blank lines are skipped; a malformed line fails the whole load.
pub fn load_log(path: &Path) -> TrackerResult<Vec<SensorSample>> {
    let file = File::open(path)?;
    let samples = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        parse_lines(GzDecoder::new(file))?
    } else {
        parse_lines(file)?
    };
    info!(target: "sensors", "loaded {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

fn parse_lines<R: Read>(reader: R) -> TrackerResult<Vec<SensorSample>> {
    let mut samples = Vec::new();
    let mut last_ts = 0u64;
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: SensorSample = serde_json::from_str(line)?;
        if sample.timestamp_ns() < last_ts {
            warn!(target: "sensors", "timestamp went backwards: {} < {}", sample.timestamp_ns(), last_ts);
        }
        last_ts = sample.timestamp_ns();
        samples.push(sample);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstimatorConfig;
    use crate::engine::Engine;
    use crate::integrator::IntegratorPhase;
    use crate::types::AccelSample;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const LOG: &str = r#"{"kind":"orientation","values":[0.0,0.0,0.0,1.0],"timestamp_ns":0}

{"kind":"accel","x":1.0,"y":0.0,"z":0.0,"timestamp_ns":0}
{"kind":"accel","x":1.0,"y":0.0,"z":0.0,"timestamp_ns":100000000}
"#;

    fn accel_stream(count: u64) -> impl Stream<Item = SensorSample> {
        futures::stream::iter(
            (0..count).map(|i| SensorSample::Accel(AccelSample::new(1.0, 0.0, 0.0, i * 100_000_000))),
        )
    }

    #[test]
    fn test_parse_json_lines() {
        let samples = parse_lines(LOG.as_bytes()).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(matches!(samples[0], SensorSample::Orientation(_)));
        assert_eq!(samples[2].timestamp_ns(), 100_000_000);
    }

    #[test]
    fn test_malformed_line_fails() {
        let err = parse_lines("{\"kind\":\"gyro\"}\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TrackerError::Json(_)));
    }

    #[test]
    fn test_load_gzipped_log() {
        let path = std::env::temp_dir().join(format!("dr_log_{}.jsonl.gz", std::process::id()));
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(LOG.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let samples = load_log(&path).unwrap();
        assert_eq!(samples.len(), 3);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_session_forwards_whole_stream() {
        let mut config = EstimatorConfig::default();
        config.integration.lowpass_alpha = 0.0;
        let (handle, task) = Engine::spawn(config).unwrap();
        handle.start().await.unwrap();

        let session = SensorSession::open(accel_stream(4), handle.clone());
        assert_eq!(session.finished().await.unwrap(), 4);
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let snap = handle.snapshot();
        assert_eq!(snap.steps_integrated, 3);
        assert_eq!(snap.phase, IntegratorPhase::Integrating);
    }

    #[tokio::test]
    async fn test_close_stops_forwarding() {
        let (handle, _task) = Engine::spawn(EstimatorConfig::default()).unwrap();
        handle.start().await.unwrap();

        // never ends on its own
        let session = SensorSession::open(futures::stream::pending(), handle.clone());
        assert!(!session.is_finished());
        session.close().await;

        handle.reset().await.unwrap();
        assert_eq!(handle.snapshot().steps_integrated, 0);
    }
}

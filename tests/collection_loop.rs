mod common;

use airq_chords::sensors::NoSignal;
use airq_chords::{
    AirqError, AuxFields, CollectionLoop, Config, CycleOutcome, DeliveryQueue, FieldValue,
    ReadingSource, Result, SensorRecord, SignalProbe,
};
use chrono::NaiveDateTime;
use common::ScriptedTransport;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_stream::StreamExt;

/// Source that plays back queued results, then repeats a fixed reading.
struct ScriptedSource {
    script: VecDeque<Result<SensorRecord>>,
    fallback: SensorRecord,
}

impl ScriptedSource {
    fn repeating(reading: SensorRecord) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: reading,
        }
    }

    fn then(mut self, result: Result<SensorRecord>) -> Self {
        self.script.push_back(result);
        self
    }
}

impl ReadingSource for ScriptedSource {
    fn reading(&mut self) -> Result<SensorRecord> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

struct FixedProbe(AuxFields);

impl SignalProbe for FixedProbe {
    fn probe(&mut self) -> Option<AuxFields> {
        Some(self.0.clone())
    }
}

fn gas_reading() -> SensorRecord {
    SensorRecord::new()
        .with("tvoc_ppb", 120i64)
        .with("eco2_ppm", 450i64)
        .with("rh", 40.2)
}

fn is_timestamp(value: &FieldValue) -> bool {
    match value {
        FieldValue::Text(s) => {
            s.len() == 20
                && s.ends_with('Z')
                && NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ").is_ok()
        }
        _ => false,
    }
}

#[tokio::test(start_paused = true)]
async fn one_submission_per_tick() {
    let config = Config::builtin().unwrap();
    let transport = ScriptedTransport::always_ok();
    let (queue, _worker) = DeliveryQueue::spawn(transport.clone(), config.retry_policy());

    let collection =
        CollectionLoop::new(&config, ScriptedSource::repeating(gas_reading()), NoSignal, queue.clone())
            .unwrap();
    assert_eq!(collection.interval(), Duration::from_secs(60));
    let mut cycles = collection.start_stream();

    let start = Instant::now();
    let first = cycles.next().await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61));

    let CycleOutcome::Enqueued { record, uri, .. } = first else {
        panic!("expected an enqueued cycle");
    };
    let keys: Vec<&str> = record.vars.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["at", "eco2", "rh", "tvoc"]);
    assert_eq!(record.vars["tvoc"], FieldValue::Int(120));
    assert_eq!(record.vars["eco2"], FieldValue::Int(450));
    assert_eq!(record.vars["rh"], FieldValue::Float(40.2));
    assert!(is_timestamp(&record.vars["at"]));
    assert_eq!(record.inst_id, "1");
    assert!(!record.test);

    let pairs: Vec<(String, String)> = uri.query_pairs().into_owned().collect();
    assert_eq!(pairs[0], ("instrument_id".to_string(), "1".to_string()));
    assert!(pairs.contains(&("key".to_string(), "secret_key".to_string())));
    assert!(!pairs.iter().any(|(k, _)| k == "test"));

    let second = cycles.next().await.unwrap();
    assert!(matches!(second, CycleOutcome::Enqueued { .. }));
    assert!(start.elapsed() >= Duration::from_secs(120));

    time::sleep(Duration::from_secs(1)).await;
    let status = queue.status().await.unwrap();
    assert_eq!(status.enqueued, 2);
    assert_eq!(status.delivered, 2);
    assert_eq!(transport.delivered().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sensor_failure_skips_only_that_cycle() {
    let config = Config::builtin().unwrap();
    let (queue, _worker) =
        DeliveryQueue::spawn(ScriptedTransport::always_ok(), config.retry_policy());

    let source = ScriptedSource::repeating(gas_reading())
        .then(Err(AirqError::sensor_error("ccs811 bus timeout")));
    let mut collection = CollectionLoop::new(&config, source, NoSignal, queue.clone()).unwrap();

    match collection.cycle() {
        CycleOutcome::Skipped { reason } => assert!(reason.contains("bus timeout")),
        other => panic!("expected a skipped cycle, got {:?}", other),
    }
    assert!(matches!(collection.cycle(), CycleOutcome::Enqueued { .. }));

    let status = queue.status().await.unwrap();
    assert_eq!(status.enqueued, 1);
}

#[tokio::test(start_paused = true)]
async fn probe_fields_are_merged_and_win() {
    let config = Config::builtin().unwrap();
    let (queue, _worker) =
        DeliveryQueue::spawn(ScriptedTransport::always_ok(), config.retry_policy());

    let mut aux = AuxFields::new();
    aux.insert("sig_dbm".to_string(), FieldValue::Int(-40));
    aux.insert("rh".to_string(), FieldValue::Float(99.0));

    let mut collection = CollectionLoop::new(
        &config,
        ScriptedSource::repeating(gas_reading()),
        FixedProbe(aux),
        queue,
    )
    .unwrap();

    let CycleOutcome::Enqueued { record, .. } = collection.cycle() else {
        panic!("expected an enqueued cycle");
    };
    assert_eq!(record.vars["sig_dbm"], FieldValue::Int(-40));
    assert_eq!(record.vars["rh"], FieldValue::Float(99.0));
}

#[tokio::test(start_paused = true)]
async fn disabled_delivery_collects_without_enqueueing() {
    let mut config = Config::builtin().unwrap();
    config.chords.enabled = false;
    let (queue, _worker) =
        DeliveryQueue::spawn(ScriptedTransport::always_ok(), config.retry_policy());

    let mut collection = CollectionLoop::new(
        &config,
        ScriptedSource::repeating(gas_reading()),
        NoSignal,
        queue.clone(),
    )
    .unwrap();

    let outcome = collection.cycle();
    assert!(matches!(outcome, CycleOutcome::Collected { .. }));
    assert!(outcome.uri().is_some());
    assert_eq!(queue.status().await.unwrap().enqueued, 0);
}

#[tokio::test(start_paused = true)]
async fn closed_queue_skips_the_cycle() {
    let config = Config::builtin().unwrap();
    let (queue, worker) =
        DeliveryQueue::spawn(ScriptedTransport::always_ok(), config.retry_policy());
    queue.shutdown().await.unwrap();
    worker.await.unwrap();

    let mut collection = CollectionLoop::new(
        &config,
        ScriptedSource::repeating(gas_reading()),
        NoSignal,
        queue,
    )
    .unwrap();
    assert!(matches!(collection.cycle(), CycleOutcome::Skipped { .. }));
}

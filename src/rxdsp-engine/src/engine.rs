// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Engine worker: owns the source, the sink list, and the correction
//! state, and drives acquisition from a single-threaded event loop.
//!
//! Two event streams reach the loop: control requests from any number of
//! handles, and data-ready wake-ups from the source's sample ring.
//! Commands win ties, so the control plane stays responsive while the
//! pump is hot; one drain pass never exceeds a second of signal for the
//! same reason.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use rxdsp_core::{
    CommandResponse, DataReady, EngineCommand, EngineReport, EngineRequest, EngineState,
    SampleCorrections, SampleSink, SampleSource, SinkId,
};

use crate::handle::EngineHandle;

/// Capacity of the request channel between handles and the worker.
const REQUEST_CHANNEL_BUFFER: usize = 32;

/// The DSP engine worker.
///
/// All fields are touched only from [`run`](Engine::run); external code
/// interacts through an [`EngineHandle`].
pub struct Engine {
    request_rx: mpsc::Receiver<EngineRequest>,
    data_rx: mpsc::Receiver<()>,
    data_ready: DataReady,
    report_tx: mpsc::UnboundedSender<EngineReport>,
    state: EngineState,
    source: Option<Box<dyn SampleSource>>,
    sinks: Vec<(SinkId, Box<dyn SampleSink>)>,
    sample_rate: u32,
    center_frequency: u64,
    dc_offset_correction: bool,
    iq_imbalance_correction: bool,
    corrections: SampleCorrections,
    error_message: String,
    device_description: String,
}

impl Engine {
    /// Spawn the worker task and return the handle that controls it.
    /// Reports about source parameter changes arrive on `report_tx`.
    pub fn spawn(report_tx: mpsc::UnboundedSender<EngineReport>) -> EngineHandle {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_BUFFER);
        let (data_ready, data_rx) = DataReady::channel();
        let engine = Engine::new(request_rx, data_rx, data_ready, report_tx);
        tokio::spawn(engine.run());
        EngineHandle::new(request_tx)
    }

    pub fn new(
        request_rx: mpsc::Receiver<EngineRequest>,
        data_rx: mpsc::Receiver<()>,
        data_ready: DataReady,
        report_tx: mpsc::UnboundedSender<EngineReport>,
    ) -> Self {
        Engine {
            request_rx,
            data_rx,
            data_ready,
            report_tx,
            state: EngineState::NotStarted,
            source: None,
            sinks: Vec::new(),
            sample_rate: 0,
            center_frequency: 0,
            dc_offset_correction: false,
            iq_imbalance_correction: false,
            corrections: SampleCorrections::default(),
            error_message: String::new(),
            device_description: String::new(),
        }
    }

    /// Event loop. Returns when told to exit or when every handle is
    /// gone; either way acquisition is stopped first.
    pub async fn run(mut self) {
        self.state = EngineState::Idle;
        info!("engine worker started");

        'event: loop {
            tokio::select! {
                biased;

                request = self.request_rx.recv() => {
                    let Some(request) = request else {
                        // Every handle dropped: tear down as if told to exit.
                        self.goto_idle();
                        self.state = EngineState::NotStarted;
                        break 'event;
                    };
                    let mut exit = self.handle_request(request);
                    while !exit {
                        match self.request_rx.try_recv() {
                            Ok(request) => exit = self.handle_request(request),
                            Err(_) => break,
                        }
                    }
                    if exit {
                        break 'event;
                    }
                }

                Some(()) = self.data_rx.recv() => self.handle_data(),
            }
        }

        info!("engine worker stopped");
    }

    fn handle_data(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        self.work();

        // A pass cut short by a pending command or the fairness ceiling
        // leaves samples behind with no writer to announce them; queue our
        // own wake-up so the pump resumes after the command drain.
        if self.sample_rate == 0 {
            return;
        }
        if let Some(source) = self.source.as_ref() {
            if source.sample_ring().fill() > 0 {
                self.data_ready.notify();
            }
        }
    }

    /// One bounded drain pass over the source ring.
    fn work(&mut self) {
        let ring = match self.source.as_ref() {
            Some(source) => source.sample_ring(),
            None => return,
        };

        let pass_limit = self.sample_rate as usize;
        let mut samples_done = 0usize;
        let mut first_of_burst = true;

        while ring.fill() > 0 && self.request_rx.is_empty() && samples_done < pass_limit {
            let mut read = ring.read_begin(ring.fill());
            let count = read.len();
            {
                let (part1, part2) = read.parts();
                for part in [part1, part2] {
                    if part.is_empty() {
                        continue;
                    }
                    if self.dc_offset_correction {
                        self.corrections.dc_offset(part);
                    }
                    if self.iq_imbalance_correction {
                        self.corrections.iq_imbalance(part);
                    }
                    for (_, sink) in self.sinks.iter_mut() {
                        sink.feed(part, first_of_burst);
                    }
                    first_of_burst = false;
                }
            }
            read.commit(count);
            samples_done += count;
        }
    }

    /// Dispatch one request; returns true when the loop must terminate.
    fn handle_request(&mut self, request: EngineRequest) -> bool {
        let EngineRequest {
            command,
            respond_to,
        } = request;
        debug!("engine command: {:?}", command);

        let mut exit = false;
        let response = match command {
            EngineCommand::Ping => CommandResponse::State(self.state),

            EngineCommand::Exit => {
                self.goto_idle();
                self.state = EngineState::NotStarted;
                exit = true;
                CommandResponse::State(self.state)
            }

            EngineCommand::AcquisitionStart => {
                self.state = self.goto_idle();
                if self.state == EngineState::Idle {
                    self.state = self.goto_running();
                }
                CommandResponse::State(self.state)
            }

            EngineCommand::AcquisitionStop => {
                self.state = self.goto_idle();
                CommandResponse::State(self.state)
            }

            EngineCommand::GetDeviceDescription => {
                CommandResponse::Text(self.device_description.clone())
            }

            EngineCommand::GetErrorMessage => CommandResponse::Text(self.error_message.clone()),

            EngineCommand::SetSource(source) => {
                self.handle_set_source(source);
                CommandResponse::Done
            }

            EngineCommand::AddSink(mut sink) => {
                if self.state == EngineState::Running {
                    sink.set_sample_rate(self.sample_rate);
                    sink.start();
                }
                let id = SinkId::new();
                self.sinks.push((id, sink));
                CommandResponse::SinkAdded(id)
            }

            EngineCommand::RemoveSink(id) => {
                match self.sinks.iter().position(|(sink_id, _)| *sink_id == id) {
                    Some(index) => {
                        let (_, mut sink) = self.sinks.remove(index);
                        if self.state == EngineState::Running {
                            sink.stop();
                        }
                    }
                    None => debug!("remove for unknown sink {:?}", id),
                }
                CommandResponse::Done
            }

            EngineCommand::ConfigureCorrections {
                dc_offset,
                iq_imbalance,
            } => {
                // A stage toggled from off to on restarts from scratch.
                if dc_offset && !self.dc_offset_correction {
                    self.corrections.reset_dc_offset();
                }
                if iq_imbalance && !self.iq_imbalance_correction {
                    self.corrections.reset_iq_imbalance();
                }
                self.dc_offset_correction = dc_offset;
                self.iq_imbalance_correction = iq_imbalance;
                CommandResponse::Done
            }

            EngineCommand::ConfigureSource(config) => {
                if let Some(source) = self.source.as_mut() {
                    source.handle_configuration(&config);
                }
                if self.source.is_some() {
                    self.generate_report();
                }
                CommandResponse::Done
            }

            EngineCommand::Broadcast(message) => {
                for (_, sink) in self.sinks.iter_mut() {
                    sink.handle_message(&message);
                }
                CommandResponse::Done
            }
        };

        if let Some(respond_to) = respond_to {
            let _ = respond_to.send(response);
        }
        exit
    }

    fn handle_set_source(&mut self, source: Box<dyn SampleSource>) {
        self.state = self.goto_idle();
        if let Some(old) = self.source.take() {
            old.sample_ring().clear_data_ready();
        }
        source.sample_ring().set_data_ready(self.data_ready.clone());
        self.source = Some(source);
        self.generate_report();
    }

    /// Publish a report when the source's stream parameters changed;
    /// every sink is re-rated before the report goes out.
    fn generate_report(&mut self) {
        let (sample_rate, center_frequency) = match self.source.as_ref() {
            Some(source) => (source.sample_rate(), source.center_frequency()),
            None => return,
        };

        let mut changed = false;
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            changed = true;
            for (_, sink) in self.sinks.iter_mut() {
                sink.set_sample_rate(sample_rate);
            }
        }
        if center_frequency != self.center_frequency {
            self.center_frequency = center_frequency;
            changed = true;
        }

        if changed {
            let _ = self.report_tx.send(EngineReport {
                sample_rate: self.sample_rate,
                center_frequency: self.center_frequency,
            });
        }
    }

    fn goto_idle(&mut self) -> EngineState {
        match self.state {
            EngineState::NotStarted => return EngineState::NotStarted,
            EngineState::Idle | EngineState::Error => return EngineState::Idle,
            EngineState::Running => {}
        }
        if self.source.is_none() {
            return EngineState::Idle;
        }

        info!("stopping acquisition");
        for (_, sink) in self.sinks.iter_mut() {
            sink.stop();
        }
        if let Some(source) = self.source.as_mut() {
            source.stop_input();
        }
        self.device_description.clear();
        EngineState::Idle
    }

    fn goto_running(&mut self) -> EngineState {
        match self.state {
            EngineState::NotStarted => return EngineState::NotStarted,
            EngineState::Running => return EngineState::Running,
            EngineState::Idle | EngineState::Error => {}
        }

        if self.source.is_none() {
            return self.goto_error("No sample source configured");
        }

        self.corrections.reset();

        let started = self
            .source
            .as_mut()
            .is_some_and(|source| source.start_input(0));
        if !started {
            return self.goto_error("Could not start sample source");
        }

        self.device_description = self
            .source
            .as_ref()
            .map(|source| source.device_description())
            .unwrap_or_default();
        info!("acquisition started: {}", self.device_description);

        for (_, sink) in self.sinks.iter_mut() {
            sink.start();
        }
        EngineState::Running
    }

    fn goto_error(&mut self, message: &str) -> EngineState {
        error!("engine error: {}", message);
        self.error_message = message.to_string();
        self.device_description.clear();
        self.state = EngineState::Error;
        EngineState::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::oneshot;

    use rxdsp_core::{Sample, SampleRing, SinkMessage};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SinkEvent {
        Started(&'static str),
        Stopped(&'static str),
        SampleRate(&'static str, u32),
        Feed {
            label: &'static str,
            len: usize,
            first: bool,
        },
        Message(&'static str, String),
    }

    #[derive(Clone, Default)]
    struct SinkLog(Arc<Mutex<Vec<SinkEvent>>>);

    impl SinkLog {
        fn push(&self, event: SinkEvent) {
            self.0.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<SinkEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    struct RecordingSink {
        label: &'static str,
        log: SinkLog,
        samples: Arc<Mutex<Vec<Sample>>>,
    }

    impl RecordingSink {
        fn new(label: &'static str, log: &SinkLog) -> (Box<Self>, Arc<Mutex<Vec<Sample>>>) {
            let samples = Arc::new(Mutex::new(Vec::new()));
            (
                Box::new(RecordingSink {
                    label,
                    log: log.clone(),
                    samples: samples.clone(),
                }),
                samples,
            )
        }
    }

    impl SampleSink for RecordingSink {
        fn start(&mut self) {
            self.log.push(SinkEvent::Started(self.label));
        }

        fn stop(&mut self) {
            self.log.push(SinkEvent::Stopped(self.label));
        }

        fn set_sample_rate(&mut self, sample_rate: u32) {
            self.log.push(SinkEvent::SampleRate(self.label, sample_rate));
        }

        fn feed(&mut self, samples: &[Sample], first_of_burst: bool) {
            self.samples.lock().unwrap().extend_from_slice(samples);
            self.log.push(SinkEvent::Feed {
                label: self.label,
                len: samples.len(),
                first: first_of_burst,
            });
        }

        fn handle_message(&mut self, message: &SinkMessage) {
            self.log
                .push(SinkEvent::Message(self.label, message.name.clone()));
        }
    }

    struct TestSource {
        ring: Arc<SampleRing>,
        sample_rate: u32,
        center_frequency: Arc<AtomicU64>,
        description: &'static str,
        fail_start: Arc<AtomicBool>,
        started: Arc<AtomicBool>,
    }

    impl TestSource {
        fn new(ring_capacity: usize, sample_rate: u32, center_frequency: u64) -> Self {
            TestSource {
                ring: Arc::new(SampleRing::new(ring_capacity)),
                sample_rate,
                center_frequency: Arc::new(AtomicU64::new(center_frequency)),
                description: "test source",
                fail_start: Arc::new(AtomicBool::new(false)),
                started: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl SampleSource for TestSource {
        fn start_input(&mut self, _flags: u32) -> bool {
            if self.fail_start.load(Ordering::SeqCst) {
                return false;
            }
            self.started.store(true, Ordering::SeqCst);
            true
        }

        fn stop_input(&mut self) {
            self.started.store(false, Ordering::SeqCst);
        }

        fn sample_ring(&self) -> Arc<SampleRing> {
            self.ring.clone()
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn center_frequency(&self) -> u64 {
            self.center_frequency.load(Ordering::SeqCst)
        }

        fn device_description(&self) -> String {
            self.description.to_string()
        }

        fn handle_configuration(&mut self, config: &[u8]) {
            // Test payload: 8 bytes of big-endian center frequency.
            if let Ok(raw) = <[u8; 8]>::try_from(config) {
                self.center_frequency
                    .store(u64::from_be_bytes(raw), Ordering::SeqCst);
            }
        }
    }

    fn new_engine() -> (
        Engine,
        mpsc::Sender<EngineRequest>,
        mpsc::UnboundedReceiver<EngineReport>,
    ) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_BUFFER);
        let (data_ready, data_rx) = DataReady::channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        (
            Engine::new(request_rx, data_rx, data_ready, report_tx),
            request_tx,
            report_rx,
        )
    }

    fn dispatch(engine: &mut Engine, command: EngineCommand) -> CommandResponse {
        let (respond_to, mut response) = oneshot::channel();
        engine.handle_request(EngineRequest {
            command,
            respond_to: Some(respond_to),
        });
        response.try_recv().expect("command not completed")
    }

    fn dispatch_state(engine: &mut Engine, command: EngineCommand) -> EngineState {
        match dispatch(engine, command) {
            CommandResponse::State(state) => state,
            other => panic!("expected a state response, got {:?}", other),
        }
    }

    fn seq(range: std::ops::Range<i16>) -> Vec<Sample> {
        range.map(|v| Sample::new(v, !v)).collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    // ------------------------------------------------------------------
    // State machine and dispatch, driven synchronously
    // ------------------------------------------------------------------

    #[test]
    fn acquisition_start_before_the_worker_runs_is_refused() {
        let (mut engine, _tx, _reports) = new_engine();
        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::NotStarted
        );
    }

    #[test]
    fn acquisition_start_without_source_goes_to_error() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::Error
        );
        match dispatch(&mut engine, EngineCommand::GetErrorMessage) {
            CommandResponse::Text(text) => assert_eq!(text, "No sample source configured"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn acquisition_start_retries_from_error() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        let source = TestSource::new(64, 48_000, 7_100_000);
        let fail_start = source.fail_start.clone();
        fail_start.store(true, Ordering::SeqCst);
        dispatch(&mut engine, EngineCommand::SetSource(Box::new(source)));

        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::Error
        );
        match dispatch(&mut engine, EngineCommand::GetErrorMessage) {
            CommandResponse::Text(text) => assert_eq!(text, "Could not start sample source"),
            other => panic!("expected text, got {:?}", other),
        }

        fail_start.store(false, Ordering::SeqCst);
        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::Running
        );
    }

    #[test]
    fn set_source_publishes_a_report_and_attaches_data_ready() {
        let (mut engine, _tx, mut reports) = new_engine();
        engine.state = EngineState::Idle;

        let source = TestSource::new(64, 2_000_000, 100_000_000);
        let ring = source.ring.clone();
        dispatch(&mut engine, EngineCommand::SetSource(Box::new(source)));

        assert_eq!(
            reports.try_recv().unwrap(),
            EngineReport {
                sample_rate: 2_000_000,
                center_frequency: 100_000_000,
            }
        );

        // The ring now wakes the worker on writes.
        ring.write(&seq(0..4));
        assert!(engine.data_rx.try_recv().is_ok());
    }

    #[test]
    fn configure_source_forwards_and_reports_changes() {
        let (mut engine, _tx, mut reports) = new_engine();
        engine.state = EngineState::Idle;

        dispatch(
            &mut engine,
            EngineCommand::SetSource(Box::new(TestSource::new(64, 48_000, 7_100_000))),
        );
        reports.try_recv().unwrap();

        let retune = 14_200_000u64;
        dispatch(
            &mut engine,
            EngineCommand::ConfigureSource(Bytes::copy_from_slice(&retune.to_be_bytes())),
        );
        assert_eq!(
            reports.try_recv().unwrap(),
            EngineReport {
                sample_rate: 48_000,
                center_frequency: retune,
            }
        );

        // No change, no report.
        dispatch(
            &mut engine,
            EngineCommand::ConfigureSource(Bytes::copy_from_slice(&retune.to_be_bytes())),
        );
        assert!(reports.try_recv().is_err());
    }

    #[test]
    fn correction_toggle_resets_only_on_off_to_on() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        dispatch(
            &mut engine,
            EngineCommand::ConfigureCorrections {
                dc_offset: true,
                iq_imbalance: true,
            },
        );

        // Prime the running DC estimate to (10, -4).
        let mut span: Vec<Sample> = vec![Sample::new(40, -16); 64];
        engine.corrections.dc_offset(&mut span);
        assert_eq!(engine.corrections.dc_offsets(), (10, -4));

        // Re-sending the same flags must not disturb the estimate.
        dispatch(
            &mut engine,
            EngineCommand::ConfigureCorrections {
                dc_offset: true,
                iq_imbalance: true,
            },
        );
        assert_eq!(engine.corrections.dc_offsets(), (10, -4));

        // Off, then on again: the estimate restarts from zero.
        dispatch(
            &mut engine,
            EngineCommand::ConfigureCorrections {
                dc_offset: false,
                iq_imbalance: true,
            },
        );
        assert_eq!(engine.corrections.dc_offsets(), (10, -4));
        dispatch(
            &mut engine,
            EngineCommand::ConfigureCorrections {
                dc_offset: true,
                iq_imbalance: true,
            },
        );
        assert_eq!(engine.corrections.dc_offsets(), (0, 0));
    }

    #[test]
    fn entering_running_resets_the_correction_state() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        let mut span: Vec<Sample> = vec![Sample::new(40, -16); 64];
        engine.corrections.dc_offset(&mut span);
        assert_ne!(engine.corrections.dc_offsets(), (0, 0));

        dispatch(
            &mut engine,
            EngineCommand::SetSource(Box::new(TestSource::new(64, 48_000, 0))),
        );
        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::Running
        );
        assert_eq!(engine.corrections.dc_offsets(), (0, 0));
    }

    #[test]
    fn drain_pass_feeds_sinks_in_order_and_flags_one_burst() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        let source = TestSource::new(16, 1_000_000, 0);
        let ring = source.ring.clone();
        dispatch(&mut engine, EngineCommand::SetSource(Box::new(source)));

        let log = SinkLog::default();
        let (sink_a, samples_a) = RecordingSink::new("a", &log);
        let (sink_b, samples_b) = RecordingSink::new("b", &log);
        dispatch(&mut engine, EngineCommand::AddSink(sink_a));
        dispatch(&mut engine, EngineCommand::AddSink(sink_b));

        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::Running
        );

        let first = seq(0..12);
        ring.write(&first);
        engine.work();
        assert_eq!(*samples_a.lock().unwrap(), first);
        assert_eq!(*samples_b.lock().unwrap(), first);

        // Both sinks saw the span in insertion order, flagged once.
        let feeds: Vec<SinkEvent> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, SinkEvent::Feed { .. }))
            .collect();
        assert_eq!(
            feeds,
            vec![
                SinkEvent::Feed {
                    label: "a",
                    len: 12,
                    first: true
                },
                SinkEvent::Feed {
                    label: "b",
                    len: 12,
                    first: true
                },
            ]
        );
    }

    #[test]
    fn wrapped_drain_pass_feeds_the_wrapped_span() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        let source = TestSource::new(16, 1_000_000, 0);
        let ring = source.ring.clone();
        dispatch(&mut engine, EngineCommand::SetSource(Box::new(source)));

        let log = SinkLog::default();
        let (sink, samples) = RecordingSink::new("a", &log);
        dispatch(&mut engine, EngineCommand::AddSink(sink));
        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::Running
        );

        // Move head to 12, then write a burst that wraps 4 + 6.
        ring.write(&seq(0..12));
        engine.work();
        samples.lock().unwrap().clear();

        let wrapped = seq(100..110);
        ring.write(&wrapped);
        engine.work();

        assert_eq!(*samples.lock().unwrap(), wrapped);
        let feeds: Vec<SinkEvent> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, SinkEvent::Feed { .. }))
            .skip(1)
            .collect();
        assert_eq!(
            feeds,
            vec![
                SinkEvent::Feed {
                    label: "a",
                    len: 4,
                    first: true
                },
                SinkEvent::Feed {
                    label: "a",
                    len: 6,
                    first: false
                },
            ]
        );
        assert!(ring.is_empty());
    }

    #[test]
    fn pending_commands_preempt_the_drain_pass() {
        let (mut engine, request_tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        let source = TestSource::new(64, 1_000_000, 0);
        let ring = source.ring.clone();
        dispatch(&mut engine, EngineCommand::SetSource(Box::new(source)));

        let log = SinkLog::default();
        let (sink, samples) = RecordingSink::new("a", &log);
        dispatch(&mut engine, EngineCommand::AddSink(sink));
        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::Running
        );

        ring.write(&seq(0..32));
        request_tx
            .try_send(EngineRequest {
                command: EngineCommand::Ping,
                respond_to: None,
            })
            .unwrap();

        engine.work();
        assert!(samples.lock().unwrap().is_empty());
        assert_eq!(ring.fill(), 32);
    }

    #[test]
    fn remove_sink_stops_it_only_while_running() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        let log = SinkLog::default();
        let (sink, _) = RecordingSink::new("a", &log);
        let id = match dispatch(&mut engine, EngineCommand::AddSink(sink)) {
            CommandResponse::SinkAdded(id) => id,
            other => panic!("expected a sink id, got {:?}", other),
        };

        dispatch(&mut engine, EngineCommand::RemoveSink(id));
        assert!(log.events().is_empty(), "idle removal must not call stop");
        assert!(engine.sinks.is_empty());
    }

    #[test]
    fn broadcast_reaches_every_sink_in_order() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        let log = SinkLog::default();
        let (sink_a, _) = RecordingSink::new("a", &log);
        let (sink_b, _) = RecordingSink::new("b", &log);
        dispatch(&mut engine, EngineCommand::AddSink(sink_a));
        dispatch(&mut engine, EngineCommand::AddSink(sink_b));

        dispatch(
            &mut engine,
            EngineCommand::Broadcast(SinkMessage {
                name: "squelch".to_string(),
                payload: Bytes::new(),
            }),
        );
        assert_eq!(
            log.events(),
            vec![
                SinkEvent::Message("a", "squelch".to_string()),
                SinkEvent::Message("b", "squelch".to_string()),
            ]
        );
    }

    #[test]
    fn exit_from_running_tears_down_in_order() {
        let (mut engine, _tx, _reports) = new_engine();
        engine.state = EngineState::Idle;

        let source = TestSource::new(64, 48_000, 0);
        let started = source.started.clone();
        dispatch(&mut engine, EngineCommand::SetSource(Box::new(source)));

        let log = SinkLog::default();
        let (sink_a, _) = RecordingSink::new("a", &log);
        let (sink_b, _) = RecordingSink::new("b", &log);
        dispatch(&mut engine, EngineCommand::AddSink(sink_a));
        dispatch(&mut engine, EngineCommand::AddSink(sink_b));

        assert_eq!(
            dispatch_state(&mut engine, EngineCommand::AcquisitionStart),
            EngineState::Running
        );
        assert!(started.load(Ordering::SeqCst));

        let (respond_to, mut response) = oneshot::channel();
        let exit = engine.handle_request(EngineRequest {
            command: EngineCommand::Exit,
            respond_to: Some(respond_to),
        });
        assert!(exit, "exit must terminate the event loop");
        assert!(matches!(
            response.try_recv(),
            Ok(CommandResponse::State(EngineState::NotStarted))
        ));
        assert!(!started.load(Ordering::SeqCst));

        let stops: Vec<SinkEvent> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, SinkEvent::Stopped(_)))
            .collect();
        assert_eq!(stops, vec![SinkEvent::Stopped("a"), SinkEvent::Stopped("b")]);
    }

    // ------------------------------------------------------------------
    // End-to-end scenarios against a spawned worker
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn cold_start_reports_missing_source() {
        let (report_tx, _reports) = mpsc::unbounded_channel();
        let handle = Engine::spawn(report_tx);

        assert_eq!(handle.start().await.unwrap(), EngineState::Idle);
        assert_eq!(
            handle.start_acquisition().await.unwrap(),
            EngineState::Error
        );
        assert_eq!(
            handle.error_message().await.unwrap(),
            "No sample source configured"
        );
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn happy_path_streams_samples_in_fifo_order() {
        let (report_tx, mut reports) = mpsc::unbounded_channel();
        let handle = Engine::spawn(report_tx);
        assert_eq!(handle.start().await.unwrap(), EngineState::Idle);

        let source = TestSource::new(4096, 2_000_000, 100_000_000);
        let ring = source.ring.clone();
        handle.set_source(Box::new(source)).await.unwrap();
        assert_eq!(
            reports.recv().await.unwrap(),
            EngineReport {
                sample_rate: 2_000_000,
                center_frequency: 100_000_000,
            }
        );

        let log = SinkLog::default();
        let (sink, samples) = RecordingSink::new("spectrum", &log);
        handle.add_sink(sink).await.unwrap();

        assert_eq!(
            handle.start_acquisition().await.unwrap(),
            EngineState::Running
        );
        assert_eq!(handle.device_description().await.unwrap(), "test source");

        let expected: Vec<Sample> = (0..1024)
            .map(|v| Sample::new(v as i16, (v % 251) as i16))
            .collect();
        for chunk in expected.chunks(256) {
            ring.write(chunk);
        }

        wait_until(|| samples.lock().unwrap().len() == expected.len()).await;
        assert_eq!(*samples.lock().unwrap(), expected);

        let feeds: Vec<SinkEvent> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, SinkEvent::Feed { .. }))
            .collect();
        assert!(matches!(feeds[0], SinkEvent::Feed { first: true, .. }));

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn sink_added_while_running_is_rated_then_started_before_feeding() {
        let (report_tx, _reports) = mpsc::unbounded_channel();
        let handle = Engine::spawn(report_tx);

        let source = TestSource::new(1024, 250_000, 0);
        let ring = source.ring.clone();
        handle.set_source(Box::new(source)).await.unwrap();
        assert_eq!(
            handle.start_acquisition().await.unwrap(),
            EngineState::Running
        );

        let log = SinkLog::default();
        let (sink, samples) = RecordingSink::new("late", &log);
        handle.add_sink(sink).await.unwrap();

        ring.write(&seq(0..64));
        wait_until(|| !samples.lock().unwrap().is_empty()).await;

        let events = log.events();
        assert_eq!(events[0], SinkEvent::SampleRate("late", 250_000));
        assert_eq!(events[1], SinkEvent::Started("late"));
        assert!(matches!(events[2], SinkEvent::Feed { .. }));

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn removed_sink_sees_no_further_samples() {
        let (report_tx, _reports) = mpsc::unbounded_channel();
        let handle = Engine::spawn(report_tx);

        let source = TestSource::new(1024, 250_000, 0);
        let ring = source.ring.clone();
        handle.set_source(Box::new(source)).await.unwrap();
        assert_eq!(
            handle.start_acquisition().await.unwrap(),
            EngineState::Running
        );

        let log = SinkLog::default();
        let (sink, samples) = RecordingSink::new("a", &log);
        let id = handle.add_sink(sink).await.unwrap();

        ring.write(&seq(0..32));
        wait_until(|| samples.lock().unwrap().len() == 32).await;

        handle.remove_sink(id).await.unwrap();
        assert!(log.events().contains(&SinkEvent::Stopped("a")));

        ring.write(&seq(32..64));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(samples.lock().unwrap().len(), 32);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn exit_from_running_stops_everything_and_ends_the_task() {
        let (report_tx, _reports) = mpsc::unbounded_channel();
        let handle = Engine::spawn(report_tx);

        let source = TestSource::new(256, 48_000, 0);
        let started = source.started.clone();
        handle.set_source(Box::new(source)).await.unwrap();

        let log = SinkLog::default();
        let (sink_a, _) = RecordingSink::new("a", &log);
        let (sink_b, _) = RecordingSink::new("b", &log);
        handle.add_sink(sink_a).await.unwrap();
        handle.add_sink(sink_b).await.unwrap();

        assert_eq!(
            handle.start_acquisition().await.unwrap(),
            EngineState::Running
        );
        assert_eq!(handle.stop().await.unwrap(), EngineState::NotStarted);
        assert!(!started.load(Ordering::SeqCst));

        let stops: Vec<SinkEvent> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, SinkEvent::Stopped(_)))
            .collect();
        assert_eq!(stops, vec![SinkEvent::Stopped("a"), SinkEvent::Stopped("b")]);

        // The worker is gone; further requests fail cleanly.
        assert!(handle.ping().await.is_err());
    }
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exposure and conversion dispatch to the analytics collaborator.
//!
//! Evaluation never waits on analytics. [`Tracker`] implementations accept
//! events synchronously and must not block; [`QueuedTracker`] buffers them in a
//! bounded queue that drops the oldest event on overflow and delivers batches
//! to a [`TrackingSink`] from a background task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cohort_flags_core::{ConversionEvent, ExposureEvent, TrackingEvent};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TrackingError;

/// Receives exposure and conversion events from the engine.
///
/// Calls happen on the evaluation path, so implementations hand the event off
/// and return. Delivery failures are the implementation's concern.
pub trait Tracker: Send + Sync {
	fn track_exposure(&self, event: ExposureEvent);

	fn track_conversion(&self, event: ConversionEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTracker;

impl Tracker for NoOpTracker {
	fn track_exposure(&self, _event: ExposureEvent) {}

	fn track_conversion(&self, _event: ConversionEvent) {}
}

/// Keeps every event in memory. Useful in tests and local tooling.
#[derive(Debug, Default)]
pub struct RecordingTracker {
	events: Mutex<Vec<TrackingEvent>>,
}

impl RecordingTracker {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<TrackingEvent> {
		self.events.lock().clone()
	}

	pub fn exposures(&self) -> Vec<ExposureEvent> {
		self
			.events
			.lock()
			.iter()
			.filter_map(|e| match e {
				TrackingEvent::Exposure(e) => Some(e.clone()),
				TrackingEvent::Conversion(_) => None,
			})
			.collect()
	}

	pub fn conversions(&self) -> Vec<ConversionEvent> {
		self
			.events
			.lock()
			.iter()
			.filter_map(|e| match e {
				TrackingEvent::Conversion(e) => Some(e.clone()),
				TrackingEvent::Exposure(_) => None,
			})
			.collect()
	}

	pub fn len(&self) -> usize {
		self.events.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.events.lock().is_empty()
	}

	pub fn clear(&self) {
		self.events.lock().clear();
	}
}

impl Tracker for RecordingTracker {
	fn track_exposure(&self, event: ExposureEvent) {
		self.events.lock().push(event.into());
	}

	fn track_conversion(&self, event: ConversionEvent) {
		self.events.lock().push(event.into());
	}
}

/// Destination for batches of tracking events.
#[async_trait::async_trait]
pub trait TrackingSink: Send + Sync {
	async fn send(&self, events: Vec<TrackingEvent>) -> Result<(), TrackingError>;
}

/// Writes each event to the tracing subscriber at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait::async_trait]
impl TrackingSink for TracingSink {
	async fn send(&self, events: Vec<TrackingEvent>) -> Result<(), TrackingError> {
		for event in events {
			info!(
				target: "cohort::tracking",
				event = event.event_name(),
				id = %event.id(),
				experiment = event.experiment(),
				subject_id = event.subject_id(),
				properties = %event.to_event_properties(),
				"tracking event"
			);
		}
		Ok(())
	}
}

/// Shortest flush interval [`QueuedTracker`] will run with.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Queue and flush settings for [`QueuedTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
	/// Events held before the oldest is dropped.
	pub max_queue_size: usize,
	/// Events per sink call; reaching it also triggers an early flush.
	pub max_batch_size: usize,
	/// Raised to [`MIN_FLUSH_INTERVAL`] when shorter.
	pub flush_interval: Duration,
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			max_queue_size: 1000,
			max_batch_size: 50,
			flush_interval: Duration::from_secs(5),
		}
	}
}

/// A [`Tracker`] that buffers events and delivers them in the background.
pub struct QueuedTracker {
	config: BatchConfig,
	sink: Arc<dyn TrackingSink>,
	queue: Mutex<VecDeque<TrackingEvent>>,
	shutdown: AtomicBool,
	dropped: AtomicU64,
	flush_notify: Notify,
}

impl std::fmt::Debug for QueuedTracker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("QueuedTracker")
			.field("config", &self.config)
			.field("queue_len", &self.queue_len())
			.field("dropped", &self.dropped_events())
			.field("shutdown", &self.is_shutdown())
			.finish()
	}
}

impl QueuedTracker {
	pub fn new(config: BatchConfig, sink: Arc<dyn TrackingSink>) -> Self {
		let config = BatchConfig {
			max_queue_size: config.max_queue_size.max(1),
			max_batch_size: config.max_batch_size.max(1),
			flush_interval: config.flush_interval.max(MIN_FLUSH_INTERVAL),
		};
		Self {
			queue: Mutex::new(VecDeque::with_capacity(config.max_queue_size)),
			config,
			sink,
			shutdown: AtomicBool::new(false),
			dropped: AtomicU64::new(0),
			flush_notify: Notify::new(),
		}
	}

	/// Creates a tracker and starts its flush loop on the current tokio runtime.
	pub fn spawn(config: BatchConfig, sink: Arc<dyn TrackingSink>) -> (Arc<Self>, JoinHandle<()>) {
		let tracker = Arc::new(Self::new(config, sink));
		let runner = Arc::clone(&tracker);
		let handle = tokio::spawn(async move { runner.run().await });
		(tracker, handle)
	}

	/// Adds an event to the queue without waiting.
	pub fn enqueue(&self, event: TrackingEvent) {
		// The flag is read and written under the queue lock so nothing lands
		// after the final shutdown flush.
		let mut queue = self.queue.lock();
		if self.is_shutdown() {
			drop(queue);
			debug!(event = event.event_name(), "tracker shut down, event discarded");
			self.dropped.fetch_add(1, Ordering::Relaxed);
			return;
		}

		while queue.len() >= self.config.max_queue_size {
			if let Some(dropped) = queue.pop_front() {
				self.dropped.fetch_add(1, Ordering::Relaxed);
				warn!(
					event = dropped.event_name(),
					experiment = dropped.experiment(),
					subject_id = dropped.subject_id(),
					"dropped tracking event due to queue overflow"
				);
			}
		}
		queue.push_back(event);

		if queue.len() >= self.config.max_batch_size {
			drop(queue);
			self.flush_notify.notify_one();
		}
	}

	/// Delivers everything queued so far, one batch at a time.
	///
	/// A batch the sink rejects is dropped; the remaining batches are still sent.
	pub async fn flush(&self) -> Result<(), TrackingError> {
		let mut first_error = None;

		loop {
			let batch: Vec<TrackingEvent> = {
				let mut queue = self.queue.lock();
				let n = queue.len().min(self.config.max_batch_size);
				queue.drain(..n).collect()
			};
			if batch.is_empty() {
				break;
			}

			let count = batch.len();
			debug!(count, "flushing tracking batch");
			if let Err(e) = self.sink.send(batch).await {
				self.dropped.fetch_add(count as u64, Ordering::Relaxed);
				warn!(error = %e, count, "tracking sink failed, batch dropped");
				first_error.get_or_insert(e);
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	pub fn queue_len(&self) -> usize {
		self.queue.lock().len()
	}

	/// Events lost to overflow, sink failures or late arrival after shutdown.
	pub fn dropped_events(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}

	pub fn is_shutdown(&self) -> bool {
		self.shutdown.load(Ordering::SeqCst)
	}

	/// Stops accepting events, wakes the flush loop and delivers what is left.
	pub async fn shutdown(&self) -> Result<(), TrackingError> {
		{
			let _queue = self.queue.lock();
			self.shutdown.store(true, Ordering::SeqCst);
		}
		self.flush_notify.notify_one();
		self.flush().await
	}

	/// Runs the background flush loop until shutdown.
	pub async fn run(&self) {
		info!(
			flush_interval_ms = self.config.flush_interval.as_millis() as u64,
			max_batch_size = self.config.max_batch_size,
			max_queue_size = self.config.max_queue_size,
			"starting tracking dispatcher"
		);

		loop {
			tokio::select! {
				_ = tokio::time::sleep(self.config.flush_interval) => {}
				_ = self.flush_notify.notified() => {}
			}

			// Sink failures are already logged by flush.
			let _ = self.flush().await;

			if self.is_shutdown() {
				break;
			}
		}

		info!(dropped = self.dropped_events(), "tracking dispatcher stopped");
	}
}

impl Tracker for QueuedTracker {
	fn track_exposure(&self, event: ExposureEvent) {
		self.enqueue(event.into());
	}

	fn track_conversion(&self, event: ConversionEvent) {
		self.enqueue(event.into());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use proptest::prelude::*;

	#[derive(Default)]
	struct MockSink {
		batches: Mutex<Vec<Vec<TrackingEvent>>>,
		should_fail: AtomicBool,
	}

	impl MockSink {
		fn batches(&self) -> Vec<Vec<TrackingEvent>> {
			self.batches.lock().clone()
		}

		fn sent(&self) -> usize {
			self.batches.lock().iter().map(Vec::len).sum()
		}
	}

	#[async_trait::async_trait]
	impl TrackingSink for MockSink {
		async fn send(&self, events: Vec<TrackingEvent>) -> Result<(), TrackingError> {
			if self.should_fail.load(Ordering::SeqCst) {
				return Err(TrackingError::Sink("mock failure".to_string()));
			}
			self.batches.lock().push(events);
			Ok(())
		}
	}

	fn exposure(subject: &str) -> TrackingEvent {
		ExposureEvent::new("homepage_layout", subject, "control", Utc::now()).into()
	}

	fn config(max_queue_size: usize, max_batch_size: usize) -> BatchConfig {
		BatchConfig {
			max_queue_size,
			max_batch_size,
			flush_interval: Duration::from_secs(60),
		}
	}

	#[test]
	fn test_noop_tracker_accepts_events() {
		let tracker = NoOpTracker;
		tracker.track_exposure(ExposureEvent::new("exp", "user-1", "a", Utc::now()));
		tracker.track_conversion(ConversionEvent::new("exp", "user-1", "signup", None, Utc::now()));
	}

	#[test]
	fn test_recording_tracker_splits_kinds() {
		let tracker = RecordingTracker::new();
		tracker.track_exposure(ExposureEvent::new("exp", "user-1", "a", Utc::now()));
		tracker.track_conversion(ConversionEvent::new("exp", "user-1", "signup", None, Utc::now()));

		assert_eq!(tracker.len(), 2);
		assert_eq!(tracker.exposures().len(), 1);
		assert_eq!(tracker.conversions().len(), 1);

		tracker.clear();
		assert!(tracker.is_empty());
	}

	#[tokio::test]
	async fn test_enqueue_and_flush() {
		let sink = Arc::new(MockSink::default());
		let tracker = QueuedTracker::new(config(100, 10), sink.clone());

		tracker.enqueue(exposure("user-1"));
		tracker.enqueue(exposure("user-2"));
		assert_eq!(tracker.queue_len(), 2);

		tracker.flush().await.unwrap();
		assert_eq!(tracker.queue_len(), 0);
		assert_eq!(sink.batches().len(), 1);
		assert_eq!(sink.sent(), 2);
	}

	#[tokio::test]
	async fn test_flush_respects_batch_size() {
		let sink = Arc::new(MockSink::default());
		let tracker = QueuedTracker::new(config(100, 3), sink.clone());

		for i in 0..7 {
			tracker.enqueue(exposure(&format!("user-{i}")));
		}
		tracker.flush().await.unwrap();

		let sizes: Vec<_> = sink.batches().iter().map(Vec::len).collect();
		assert_eq!(sizes, vec![3, 3, 1]);
	}

	#[tokio::test]
	async fn test_overflow_drops_oldest() {
		let sink = Arc::new(MockSink::default());
		let tracker = QueuedTracker::new(config(3, 100), sink.clone());

		for i in 0..5 {
			tracker.enqueue(exposure(&format!("user-{i}")));
		}
		assert_eq!(tracker.queue_len(), 3);
		assert_eq!(tracker.dropped_events(), 2);

		tracker.flush().await.unwrap();
		let subjects: Vec<_> = sink.batches()[0]
			.iter()
			.map(|e| e.subject_id().to_string())
			.collect();
		assert_eq!(subjects, vec!["user-2", "user-3", "user-4"]);
	}

	#[tokio::test]
	async fn test_sink_failure_is_counted_and_not_requeued() {
		let sink = Arc::new(MockSink::default());
		sink.should_fail.store(true, Ordering::SeqCst);
		let tracker = QueuedTracker::new(config(100, 10), sink.clone());

		tracker.enqueue(exposure("user-1"));
		let result = tracker.flush().await;

		assert!(matches!(result, Err(TrackingError::Sink(_))));
		assert_eq!(tracker.queue_len(), 0);
		assert_eq!(tracker.dropped_events(), 1);
	}

	#[tokio::test]
	async fn test_shutdown_flushes_and_rejects_new_events() {
		let sink = Arc::new(MockSink::default());
		let tracker = QueuedTracker::new(config(100, 10), sink.clone());

		tracker.enqueue(exposure("user-1"));
		tracker.shutdown().await.unwrap();
		assert_eq!(sink.sent(), 1);

		tracker.enqueue(exposure("user-2"));
		assert_eq!(tracker.queue_len(), 0);
		assert_eq!(tracker.dropped_events(), 1);
	}

	#[tokio::test]
	async fn test_background_loop_flushes_full_batch() {
		let sink = Arc::new(MockSink::default());
		let (tracker, handle) = QueuedTracker::spawn(config(100, 2), sink.clone());

		tracker.track_exposure(ExposureEvent::new("exp", "user-1", "a", Utc::now()));
		tracker.track_conversion(ConversionEvent::new("exp", "user-1", "signup", None, Utc::now()));

		for _ in 0..100 {
			if sink.sent() == 2 {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(sink.sent(), 2);

		tracker.shutdown().await.unwrap();
		handle.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_background_loop_flushes_on_interval() {
		let sink = Arc::new(MockSink::default());
		let config = BatchConfig {
			max_queue_size: 100,
			max_batch_size: 50,
			flush_interval: Duration::from_millis(100),
		};
		let (tracker, handle) = QueuedTracker::spawn(config, sink.clone());

		tracker.enqueue(exposure("user-1"));
		tokio::time::sleep(Duration::from_millis(250)).await;
		assert_eq!(sink.sent(), 1);

		tracker.shutdown().await.unwrap();
		handle.await.unwrap();
	}

	#[test]
	fn test_zero_flush_interval_is_clamped() {
		let config = BatchConfig {
			flush_interval: Duration::ZERO,
			..BatchConfig::default()
		};
		let tracker = QueuedTracker::new(config, Arc::new(TracingSink));
		assert_eq!(tracker.config.flush_interval, MIN_FLUSH_INTERVAL);

		let tracker = QueuedTracker::new(BatchConfig::default(), Arc::new(TracingSink));
		assert_eq!(tracker.config.flush_interval, Duration::from_secs(5));
	}

	#[tokio::test(start_paused = true)]
	async fn test_zero_flush_interval_does_not_spin() {
		let sink = Arc::new(MockSink::default());
		let config = BatchConfig {
			max_queue_size: 100,
			max_batch_size: 50,
			flush_interval: Duration::ZERO,
		};
		let (tracker, handle) = QueuedTracker::spawn(config, sink.clone());

		tracker.enqueue(exposure("user-1"));
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(sink.sent(), 1);
		assert!(sink.batches().len() <= 1);

		tracker.shutdown().await.unwrap();
		handle.await.unwrap();
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_events_racing_shutdown_are_delivered_or_counted() {
		const PRODUCERS: usize = 4;
		const PER_PRODUCER: usize = 500;

		let sink = Arc::new(MockSink::default());
		let tracker = Arc::new(QueuedTracker::new(config(100_000, 64), sink.clone()));

		let producers: Vec<_> = (0..PRODUCERS)
			.map(|p| {
				let tracker = Arc::clone(&tracker);
				std::thread::spawn(move || {
					for i in 0..PER_PRODUCER {
						tracker.enqueue(exposure(&format!("user-{p}-{i}")));
					}
				})
			})
			.collect();

		tokio::task::yield_now().await;
		tracker.shutdown().await.unwrap();
		for producer in producers {
			producer.join().unwrap();
		}

		assert_eq!(tracker.queue_len(), 0);
		assert_eq!(
			sink.sent() + tracker.dropped_events() as usize,
			PRODUCERS * PER_PRODUCER
		);
	}

	#[test]
	fn test_zero_sizes_are_clamped() {
		let tracker = QueuedTracker::new(config(0, 0), Arc::new(TracingSink));
		tracker.enqueue(exposure("user-1"));
		tracker.enqueue(exposure("user-2"));
		assert_eq!(tracker.queue_len(), 1);
		assert_eq!(tracker.dropped_events(), 1);
	}

	proptest! {
		#[test]
		fn queue_never_exceeds_capacity(capacity in 1usize..50, events in 0usize..200) {
			let tracker = QueuedTracker::new(config(capacity, 1000), Arc::new(TracingSink));
			for i in 0..events {
				tracker.enqueue(exposure(&format!("user-{i}")));
			}
			prop_assert_eq!(tracker.queue_len(), events.min(capacity));
			prop_assert_eq!(tracker.dropped_events() as usize, events.saturating_sub(capacity));
		}
	}
}

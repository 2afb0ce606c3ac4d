// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ordered, non-blocking event delivery.
//!
//! Events go onto a bounded channel and a single background task starts a
//! [`Transport`] send for each one, in the order they were built. Submission
//! is serialized; responses are not awaited before the next send starts, so
//! a slow collector never holds back the events behind it. Each attempt is
//! bounded by a timeout and at most `max_in_flight` sends run at once. A
//! failed delivery is logged and reported to the optional
//! [`DeliveryObserver`], never retried.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use jitsu_analytics_core::Event;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{AnalyticsError, Result};
use crate::transport::Transport;

/// Configuration for the dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
	/// Events that may wait for delivery before new ones are dropped.
	pub queue_capacity: usize,
	/// Upper bound on a single delivery attempt.
	pub send_timeout: Duration,
	/// Sends allowed to wait for a response at the same time.
	pub max_in_flight: usize,
	/// Upper bound on the whole shutdown drain.
	pub shutdown_timeout: Duration,
}

impl Default for DispatchConfig {
	fn default() -> Self {
		Self {
			queue_capacity: 1000,
			send_timeout: Duration::from_secs(5),
			max_in_flight: 16,
			shutdown_timeout: Duration::from_secs(5),
		}
	}
}

/// Result of one delivery attempt.
#[derive(Debug)]
pub enum DeliveryOutcome {
	Delivered,
	Failed(AnalyticsError),
}

impl DeliveryOutcome {
	pub fn is_delivered(&self) -> bool {
		matches!(self, DeliveryOutcome::Delivered)
	}
}

/// Receives the outcome of every delivery attempt, in completion order.
///
/// Called on the dispatch task; keep implementations quick.
#[async_trait]
pub trait DeliveryObserver: Send + Sync + 'static {
	async fn on_delivery(&self, event: &Event, outcome: &DeliveryOutcome);
}

pub type SharedDeliveryObserver = Arc<dyn DeliveryObserver>;

/// Counters of what happened to enqueued events.
#[derive(Debug, Default)]
pub struct DispatchStats {
	delivered: AtomicU64,
	failed: AtomicU64,
	dropped: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
	pub delivered: u64,
	pub failed: u64,
	pub dropped: u64,
}

impl DispatchStats {
	pub fn snapshot(&self) -> DispatchStatsSnapshot {
		DispatchStatsSnapshot {
			delivered: self.delivered.load(Ordering::SeqCst),
			failed: self.failed.load(Ordering::SeqCst),
			dropped: self.dropped.load(Ordering::SeqCst),
		}
	}
}

/// Command sent to the dispatch task.
#[derive(Debug)]
enum DispatchCommand {
	Send(Box<Event>),
	Flush(oneshot::Sender<()>),
	Shutdown(oneshot::Sender<()>),
}

/// Handle to the background dispatch task.
pub struct Dispatcher {
	tx: mpsc::Sender<DispatchCommand>,
	shutdown: AtomicBool,
	stats: Arc<DispatchStats>,
}

impl Dispatcher {
	/// Starts the dispatch task on the current Tokio runtime.
	pub fn spawn(
		config: DispatchConfig,
		transport: Arc<dyn Transport>,
		observer: Option<SharedDeliveryObserver>,
	) -> Result<Self> {
		let runtime = tokio::runtime::Handle::try_current().map_err(|_| AnalyticsError::NoRuntime)?;
		let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
		let stats = Arc::new(DispatchStats::default());

		let worker = DispatchWorker {
			rx,
			deliverer: Deliverer {
				transport,
				observer,
				send_timeout: config.send_timeout,
				stats: Arc::clone(&stats),
			},
			max_in_flight: config.max_in_flight.max(1),
			shutdown_timeout: config.shutdown_timeout,
			stats: Arc::clone(&stats),
		};
		runtime.spawn(worker.run());

		Ok(Self {
			tx,
			shutdown: AtomicBool::new(false),
			stats,
		})
	}

	/// Enqueues an event without waiting. Fails when the queue is full or
	/// the dispatcher has shut down; the event is dropped in both cases.
	pub fn send(&self, event: Event) -> Result<()> {
		if self.shutdown.load(Ordering::SeqCst) {
			return Err(AnalyticsError::ClientShutdown);
		}

		match self.tx.try_send(DispatchCommand::Send(Box::new(event))) {
			Ok(()) => Ok(()),
			Err(mpsc::error::TrySendError::Full(_)) => {
				self.stats.dropped.fetch_add(1, Ordering::SeqCst);
				Err(AnalyticsError::QueueFull)
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {
				self.stats.dropped.fetch_add(1, Ordering::SeqCst);
				Err(AnalyticsError::ClientShutdown)
			}
		}
	}

	/// Waits until every event enqueued before this call has been attempted
	/// and its outcome recorded.
	pub async fn flush(&self) -> Result<()> {
		let (ack_tx, ack_rx) = oneshot::channel();
		self
			.tx
			.send(DispatchCommand::Flush(ack_tx))
			.await
			.map_err(|_| AnalyticsError::ClientShutdown)?;
		ack_rx.await.map_err(|_| AnalyticsError::ClientShutdown)
	}

	/// Stops accepting events, attempts everything already queued within
	/// `shutdown_timeout`, then stops the task. Events still unsent or
	/// unanswered at the deadline count as dropped. Calling it again is a
	/// no-op.
	pub async fn shutdown(&self) -> Result<()> {
		if self.shutdown.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		let (ack_tx, ack_rx) = oneshot::channel();
		self
			.tx
			.send(DispatchCommand::Shutdown(ack_tx))
			.await
			.map_err(|_| AnalyticsError::ClientShutdown)?;
		ack_rx.await.map_err(|_| AnalyticsError::ClientShutdown)
	}

	pub fn is_shutdown(&self) -> bool {
		self.shutdown.load(Ordering::SeqCst)
	}

	pub fn stats(&self) -> DispatchStatsSnapshot {
		self.stats.snapshot()
	}
}

type InFlight = FuturesUnordered<BoxFuture<'static, ()>>;

struct DispatchWorker {
	rx: mpsc::Receiver<DispatchCommand>,
	deliverer: Deliverer,
	max_in_flight: usize,
	shutdown_timeout: Duration,
	stats: Arc<DispatchStats>,
}

impl DispatchWorker {
	async fn run(mut self) {
		info!(
			send_timeout_ms = self.deliverer.send_timeout.as_millis() as u64,
			max_in_flight = self.max_in_flight,
			"Starting event dispatcher"
		);

		let mut in_flight = InFlight::new();
		loop {
			// In-flight sends are polled first, so a freshly submitted send gets
			// its first poll before the next command is taken off the queue.
			tokio::select! {
				biased;
				Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
				command = self.rx.recv(), if in_flight.len() < self.max_in_flight => {
					match command {
						Some(DispatchCommand::Send(event)) => self.submit(&mut in_flight, event),
						Some(DispatchCommand::Flush(ack)) => {
							drain(&mut in_flight).await;
							let _ = ack.send(());
						}
						Some(DispatchCommand::Shutdown(ack)) => {
							self.shutdown(&mut in_flight).await;
							let _ = ack.send(());
							break;
						}
						None => {
							drain(&mut in_flight).await;
							break;
						}
					}
				}
			}
		}

		info!("Event dispatcher stopped");
	}

	fn submit(&self, in_flight: &mut InFlight, event: Box<Event>) {
		in_flight.push(Box::pin(self.deliverer.clone().deliver(event)));
	}

	async fn shutdown(&mut self, in_flight: &mut InFlight) {
		self.rx.close();

		let deadline = self.shutdown_timeout;
		let drained = tokio::time::timeout(deadline, async {
			while let Some(command) = self.rx.recv().await {
				match command {
					DispatchCommand::Send(event) => {
						while in_flight.len() >= self.max_in_flight {
							in_flight.next().await;
						}
						self.submit(in_flight, event);
					}
					DispatchCommand::Flush(ack) | DispatchCommand::Shutdown(ack) => {
						let _ = ack.send(());
					}
				}
			}
			drain(in_flight).await;
		})
		.await;

		if drained.is_err() {
			let mut abandoned = in_flight.len() as u64;
			while let Ok(command) = self.rx.try_recv() {
				match command {
					DispatchCommand::Send(_) => abandoned += 1,
					DispatchCommand::Flush(ack) | DispatchCommand::Shutdown(ack) => {
						let _ = ack.send(());
					}
				}
			}
			in_flight.clear();
			self.stats.dropped.fetch_add(abandoned, Ordering::SeqCst);
			warn!(
				abandoned,
				shutdown_timeout_ms = deadline.as_millis() as u64,
				"Shutdown deadline reached, abandoning undelivered events"
			);
		}
	}
}

async fn drain(in_flight: &mut InFlight) {
	while in_flight.next().await.is_some() {}
}

/// Everything a single send needs, detached from the worker so sends can
/// run concurrently.
#[derive(Clone)]
struct Deliverer {
	transport: Arc<dyn Transport>,
	observer: Option<SharedDeliveryObserver>,
	send_timeout: Duration,
	stats: Arc<DispatchStats>,
}

impl Deliverer {
	async fn deliver(self, event: Box<Event>) {
		let outcome = match tokio::time::timeout(self.send_timeout, self.transport.send(&event)).await {
			Ok(Ok(())) => DeliveryOutcome::Delivered,
			Ok(Err(e)) => DeliveryOutcome::Failed(e),
			Err(_) => DeliveryOutcome::Failed(AnalyticsError::Timeout(self.send_timeout)),
		};

		match &outcome {
			DeliveryOutcome::Delivered => {
				self.stats.delivered.fetch_add(1, Ordering::SeqCst);
				debug!(
					event_type = %event.event_type,
					message_id = %event.message_id,
					"Delivered event"
				);
			}
			DeliveryOutcome::Failed(e) => {
				self.stats.failed.fetch_add(1, Ordering::SeqCst);
				warn!(
					event_type = %event.event_type,
					message_id = %event.message_id,
					error = %e,
					"Failed to deliver event"
				);
			}
		}

		if let Some(observer) = &self.observer {
			observer.on_delivery(&event, &outcome).await;
		}
	}
}

//! Fixed-interval device presence poller.
//!
//! One tick per interval: poll each discovery family sequentially, diff the
//! observed id set against the previous tick, dispatch connect/disconnect
//! transitions, then go back to sleep. The inter-tick wait is the loop's
//! only suspension and cancellation point.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::PollerConfig;
use crate::device::{DeviceId, DeviceState, Platform};
use crate::discovery::DeviceDiscovery;
use crate::events::{EventSink, HerdEvent};
use crate::registry::DeviceRegistry;
use crate::session::SessionOrchestrator;

/// Drives the registry and orchestrator from discovery observations.
pub struct PresencePoller {
	config: PollerConfig,
	discoveries: Vec<Arc<dyn DeviceDiscovery>>,
	registry: Arc<DeviceRegistry>,
	orchestrator: Arc<SessionOrchestrator>,
	events: Arc<dyn EventSink>,
	/// Connected-id set from the previous tick, per platform family. The
	/// only state carried across ticks.
	previous: HashMap<Platform, BTreeSet<DeviceId>>,
}

impl PresencePoller {
	/// Creates a poller over the given collaborators.
	pub fn new(
		config: PollerConfig,
		discoveries: Vec<Arc<dyn DeviceDiscovery>>,
		registry: Arc<DeviceRegistry>,
		orchestrator: Arc<SessionOrchestrator>,
		events: Arc<dyn EventSink>,
	) -> Self {
		Self {
			config,
			discoveries,
			registry,
			orchestrator,
			events,
			previous: HashMap::new(),
		}
	}

	/// Enables or disables automatic session management at runtime.
	pub fn set_auto_manage(&mut self, enabled: bool) {
		self.config.auto_manage = enabled;
	}

	/// Runs the poll loop until `shutdown` flips, then stops every session.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
		info!(
			target = "herd.poll",
			families = self.discoveries.len(),
			interval_ms = self.config.interval.as_millis() as u64,
			auto_manage = self.config.auto_manage,
			"presence poller running"
		);

		loop {
			if *shutdown.borrow() {
				break;
			}
			self.tick().await;
			tokio::select! {
				_ = tokio::time::sleep(self.config.interval) => {}
				_ = shutdown.changed() => break,
			}
		}

		self.stop_all_sessions().await;
		info!(target = "herd.poll", "presence poller stopped");
	}

	/// Runs one poll pass across every discovery family.
	pub async fn tick(&mut self) {
		// Sequential on purpose: dispatch ordering stays deterministic.
		for discovery in self.discoveries.clone() {
			self.poll_family(discovery.as_ref()).await;
		}
	}

	async fn poll_family(&mut self, discovery: &dyn DeviceDiscovery) {
		let platform = discovery.platform();
		let current = match discovery.list_connected().await {
			Ok(ids) => ids,
			Err(err) => {
				// Leaving `previous` untouched keeps a flaky tool from
				// mass-disconnecting its whole family.
				warn!(target = "herd.poll", %platform, error = %err, "discovery query failed; keeping previous state");
				return;
			}
		};
		let previous = self.previous.get(&platform).cloned().unwrap_or_default();

		for id in current.difference(&previous) {
			self.handle_connect(discovery, id).await;
		}
		for id in previous.difference(&current) {
			self.handle_disconnect(id).await;
		}
		for id in &current {
			self.registry.touch(id);
		}
		if self.config.auto_manage {
			for id in &current {
				self.ensure_session(id).await;
			}
		}

		self.previous.insert(platform, current);
	}

	async fn handle_connect(&self, discovery: &dyn DeviceDiscovery, id: &DeviceId) {
		let platform = discovery.platform();
		let name = discovery.display_name(id).await.unwrap_or_else(|_| id.as_str().to_string());
		let kind = discovery.kind_of(id);

		self.registry.observe_connected(id, platform, kind, &name);
		info!(target = "herd.poll", device = %id, %platform, name = %name, "device connected");
		self.events.emit(&HerdEvent::DeviceConnected { device_id: id.clone(), platform });
	}

	async fn handle_disconnect(&self, id: &DeviceId) {
		if self.registry.get(id).is_some_and(|d| d.has_running_session()) {
			if !self.orchestrator.stop_session(id).await {
				warn!(target = "herd.poll", device = %id, "session stop was unclean");
			}
			self.events.emit(&HerdEvent::SessionEnded { device_id: id.clone() });
		}

		self.registry.mark_disconnected(id);
		info!(target = "herd.poll", device = %id, "device disconnected");
		self.events.emit(&HerdEvent::DeviceDisconnected { device_id: id.clone() });
	}

	/// Starts a session for a connected device that has none.
	///
	/// Covers fresh appearances and devices whose earlier start failed
	/// (capacity, flaky spawn), which get another chance each tick. A
	/// device with a running session is left alone.
	async fn ensure_session(&self, id: &DeviceId) {
		let Some(device) = self.registry.get(id) else {
			return;
		};
		if device.state != DeviceState::Connected || device.has_running_session() {
			return;
		}

		let Some(session) = self.orchestrator.start_session(&device).await else {
			return;
		};
		self.events.emit(&HerdEvent::SessionStarted {
			device_id: id.clone(),
			session_id: session.id.clone(),
			ports: session.ports.clone(),
		});
		self.registry.attach_session(id, session);
	}

	/// Best-effort stop of every running session, used at shutdown.
	///
	/// Individual failures are logged and skipped so one stuck device never
	/// blocks the rest.
	pub async fn stop_all_sessions(&self) {
		let ids = self.registry.all_connected_ids();
		info!(target = "herd.poll", devices = ids.len(), "stopping all sessions");
		for id in ids {
			if self.registry.get(&id).is_some_and(|d| d.has_running_session()) {
				if !self.orchestrator.stop_session(&id).await {
					warn!(target = "herd.poll", device = %id, "session stop failed during shutdown; continuing");
				}
				self.events.emit(&HerdEvent::SessionEnded { device_id: id.clone() });
			}
		}
	}
}

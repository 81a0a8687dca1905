//! Consecutive port-block allocation over a configured range.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Probe answering whether a port can currently be bound on the host.
pub type BindProbe = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Thread-safe pool handing out contiguous port windows from one range.
///
/// Allocation is first-fit: the lowest window whose ports are neither in the
/// internal used-set nor bound elsewhere on the host wins, so released
/// windows are preferentially reused and assignments stay predictable for
/// external client configuration.
pub struct PortPool {
	/// First port of the range (inclusive).
	start: u16,
	/// Last port of the range (inclusive).
	end: u16,
	/// Ports currently owned by live allocations.
	used: Mutex<BTreeSet<u16>>,
	probe: BindProbe,
}

impl PortPool {
	/// Creates a pool over `start..=end` with the OS loopback bind probe.
	pub fn new(start: u16, end: u16) -> Self {
		Self::with_probe(start, end, Arc::new(herd_runtime::process::port_available))
	}

	/// Creates a pool with a caller-supplied bind probe.
	pub fn with_probe(start: u16, end: u16, probe: BindProbe) -> Self {
		assert!(start <= end, "port range start must not exceed end");
		Self {
			start,
			end,
			used: Mutex::new(BTreeSet::new()),
			probe,
		}
	}

	/// Allocates the lowest window of `count` consecutive free ports.
	///
	/// Returns `None` when no window fits; exhaustion is an expected
	/// condition, not a failure. The scan and the mark-used step happen
	/// under one lock acquisition so two callers can never be handed
	/// overlapping windows.
	pub fn allocate_consecutive(&self, count: u16) -> Option<Vec<u16>> {
		if count == 0 {
			return Some(Vec::new());
		}

		let mut used = self.used.lock();
		let last_start = u32::from(self.end).checked_sub(u32::from(count) - 1)?;

		let mut candidate = u32::from(self.start);
		while candidate <= last_start {
			match self.first_blocked(&used, candidate as u16, count) {
				None => {
					let block: Vec<u16> = (0..count).map(|i| candidate as u16 + i).collect();
					used.extend(block.iter().copied());
					debug!(target = "herd.ports", ports = ?block, "allocated port window");
					return Some(block);
				}
				// Windows overlapping the blocked port cannot fit either.
				Some(blocked) => candidate = u32::from(blocked) + 1,
			}
		}
		None
	}

	/// Returns the lowest port in `[window_start, window_start + count)` that
	/// is unavailable, or `None` when the whole window is free.
	fn first_blocked(&self, used: &BTreeSet<u16>, window_start: u16, count: u16) -> Option<u16> {
		(0..count).map(|i| window_start + i).find(|port| used.contains(port) || !(self.probe)(*port))
	}

	/// Releases `ports` back to the pool.
	///
	/// Releasing a port that is already free is a silent no-op, so retry
	/// paths may release the same block more than once without harm.
	pub fn release(&self, ports: &[u16]) {
		let mut used = self.used.lock();
		for port in ports {
			used.remove(port);
		}
		debug!(target = "herd.ports", ?ports, "released ports");
	}

	/// Returns all currently allocated ports in ascending order.
	pub fn allocated(&self) -> Vec<u16> {
		self.used.lock().iter().copied().collect()
	}

	/// Returns `true` when `port` is owned by a live allocation.
	pub fn is_in_use(&self, port: u16) -> bool {
		self.used.lock().contains(&port)
	}

	/// Total number of ports in the range.
	pub fn capacity(&self) -> usize {
		usize::from(self.end - self.start) + 1
	}

	/// Number of ports not owned by a live allocation.
	pub fn available(&self) -> usize {
		self.capacity() - self.used.lock().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn open_pool(start: u16, end: u16) -> PortPool {
		PortPool::with_probe(start, end, Arc::new(|_| true))
	}

	#[test]
	fn first_fit_allocates_and_reuses_lowest_window() {
		let pool = open_pool(4723, 4730);

		assert_eq!(pool.allocate_consecutive(3), Some(vec![4723, 4724, 4725]));
		assert_eq!(pool.allocate_consecutive(2), Some(vec![4726, 4727]));

		pool.release(&[4723, 4724, 4725]);
		assert_eq!(pool.allocate_consecutive(3), Some(vec![4723, 4724, 4725]));
	}

	#[test]
	fn live_allocations_never_overlap() {
		let pool = open_pool(5000, 5019);
		let mut seen = BTreeSet::new();
		while let Some(block) = pool.allocate_consecutive(3) {
			for port in block {
				assert!(seen.insert(port), "port {port} handed out twice");
			}
		}
		assert!(seen.len() >= 18);
	}

	#[test]
	fn gap_wide_enough_still_fits_after_partial_use() {
		let pool = open_pool(4723, 4730);
		assert_eq!(pool.allocate_consecutive(2), Some(vec![4723, 4724]));
		assert_eq!(pool.allocate_consecutive(3), Some(vec![4725, 4726, 4727]));
	}

	#[test]
	fn exhaustion_returns_none() {
		let pool = open_pool(4723, 4730);
		assert!(pool.allocate_consecutive(3).is_some());
		assert!(pool.allocate_consecutive(3).is_some());
		// Two ports remain; a 3-wide request cannot fit.
		assert_eq!(pool.allocate_consecutive(3), None);
		assert_eq!(pool.allocate_consecutive(2), Some(vec![4729, 4730]));
		assert_eq!(pool.allocate_consecutive(1), None);
	}

	#[test]
	fn request_wider_than_range_returns_none() {
		let pool = open_pool(5000, 5003);
		assert_eq!(pool.allocate_consecutive(5), None);
	}

	#[test]
	fn os_blocked_port_splits_the_window() {
		let pool = PortPool::with_probe(5000, 5007, Arc::new(|port| port != 5001));
		// 5000 is free but 5001 is bound elsewhere, so the first 2-wide
		// window starts past it.
		assert_eq!(pool.allocate_consecutive(2), Some(vec![5002, 5003]));
		assert!(!pool.is_in_use(5001));
	}

	#[test]
	fn release_is_idempotent() {
		let pool = open_pool(5000, 5007);
		let block = pool.allocate_consecutive(2).unwrap();
		pool.release(&block);
		pool.release(&block);
		assert_eq!(pool.allocated(), Vec::<u16>::new());
		assert_eq!(pool.available(), 8);
	}

	#[test]
	fn utilization_reporting_tracks_allocations() {
		let pool = open_pool(5000, 5007);
		assert_eq!(pool.capacity(), 8);
		assert_eq!(pool.available(), 8);

		let block = pool.allocate_consecutive(3).unwrap();
		assert_eq!(pool.available(), 5);
		assert_eq!(pool.allocated(), vec![5000, 5001, 5002]);
		assert!(pool.is_in_use(5001));
		assert!(!pool.is_in_use(5003));

		pool.release(&block);
		assert_eq!(pool.available(), 8);
	}

	#[test]
	fn range_end_boundary_is_allocatable() {
		let pool = open_pool(65534, 65535);
		assert_eq!(pool.allocate_consecutive(2), Some(vec![65534, 65535]));
		assert_eq!(pool.allocate_consecutive(1), None);
	}
}

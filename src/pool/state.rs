//! Pool bookkeeping and the allocation decision.
//!
//! Everything here runs under the pool lock. [`PoolState::decide`] is a pure
//! function of the state and the clock, so the allocation rules can be tested
//! without threads or processes.

use super::pool::PoolConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type WorkerId = u64;

/// A renderer instance together with its pool identity.
///
/// Handed out by [`WorkerPool::acquire`](super::WorkerPool::acquire); the
/// holder has exclusive use of the instance until it is released.
#[derive(Debug)]
pub struct Worker<I> {
    id: WorkerId,
    font: String,
    started: Instant,
    instance: I,
}

impl<I> Worker<I> {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn font(&self) -> &str {
        &self.font
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn instance_mut(&mut self) -> &mut I {
        &mut self.instance
    }

    pub(crate) fn into_instance(self) -> I {
        self.instance
    }
}

/// What the pool knows about every live instance, busy or not.
#[derive(Debug)]
struct Member {
    font: String,
}

/// Next step for a caller that wants an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Check out `available[index]`.
    Take(usize),
    /// An instance with the font exists but is busy; wait for it.
    WaitForSameFont(Duration),
    /// At capacity: close `available[index]` and spawn in its place.
    Reclaim(usize),
    /// At capacity with nothing idle; wait for a release.
    WaitForRelease,
    /// Too soon after the last spawn; wait this long.
    Throttle(Duration),
    Spawn,
}

/// Shared pool state. `available` is always a subset of `members`.
#[derive(Debug)]
pub struct PoolState<I> {
    members: HashMap<WorkerId, Member>,
    available: Vec<Worker<I>>,
    /// Reclaimed instances being closed outside the lock. Each holds a slot.
    closing: usize,
    last_created: Option<Instant>,
    /// `last_used_at_level[n]`: last time `n + 1` instances were busy at once.
    last_used_at_level: Vec<Option<Instant>>,
    next_id: WorkerId,
    pub shutting_down: bool,
}

impl<I> PoolState<I> {
    pub fn new(max_instances: usize) -> Self {
        Self {
            members: HashMap::new(),
            available: Vec::new(),
            closing: 0,
            last_created: None,
            last_used_at_level: vec![None; max_instances],
            next_id: 0,
            shutting_down: false,
        }
    }

    /// Live instances, busy or idle.
    pub fn live(&self) -> usize {
        self.members.len()
    }

    pub fn idle(&self) -> usize {
        self.available.len()
    }

    pub fn busy(&self) -> usize {
        self.members.len() - self.available.len()
    }

    /// Decide how to serve a request for `font`.
    ///
    /// `grace_deadline` bounds how long the caller keeps waiting for a busy
    /// instance of its own font before it considers spawning another.
    pub fn decide(
        &self,
        font: &str,
        now: Instant,
        grace_deadline: Instant,
        config: &PoolConfig,
    ) -> Decision {
        if let Some(index) = self.available.iter().position(|w| w.font == font) {
            return Decision::Take(index);
        }

        if now < grace_deadline && self.members.values().any(|m| m.font == font) {
            return Decision::WaitForSameFont(grace_deadline - now);
        }

        if self.members.len() + self.closing >= config.max_instances {
            return match self.oldest_available() {
                Some(index) => Decision::Reclaim(index),
                None => Decision::WaitForRelease,
            };
        }

        if let Some(last) = self.last_created {
            let next = last + config.creation_interval;
            if now < next {
                return Decision::Throttle(next - now);
            }
        }

        Decision::Spawn
    }

    fn oldest_available(&self) -> Option<usize> {
        self.available
            .iter()
            .enumerate()
            .min_by_key(|(_, w)| w.started)
            .map(|(index, _)| index)
    }

    /// Remove `available[index]` for checkout and stamp the concurrency level.
    pub fn checkout(&mut self, index: usize, now: Instant) -> Worker<I> {
        let worker = self.available.swap_remove(index);
        self.stamp_level(now);
        worker
    }

    /// Remove `available[index]` for good.
    pub fn evict(&mut self, index: usize) -> Worker<I> {
        let worker = self.available.swap_remove(index);
        self.members.remove(&worker.id);
        worker
    }

    /// Evict `available[index]` for closing, keeping its slot reserved
    /// until [`finish_close`](Self::finish_close).
    pub fn begin_reclaim(&mut self, index: usize) -> Worker<I> {
        self.closing += 1;
        self.evict(index)
    }

    pub fn finish_close(&mut self) {
        self.closing = self.closing.saturating_sub(1);
    }

    /// Note that a spawn is being attempted now.
    pub fn mark_created(&mut self, now: Instant) {
        self.last_created = Some(now);
    }

    /// Admit a freshly spawned instance, already checked out.
    pub fn admit(&mut self, font: &str, instance: I, now: Instant) -> Worker<I> {
        let id = self.next_id;
        self.next_id += 1;
        self.members.insert(
            id,
            Member {
                font: font.to_string(),
            },
        );
        self.stamp_level(now);
        Worker {
            id,
            font: font.to_string(),
            started: now,
            instance,
        }
    }

    /// Return a healthy worker to the idle set.
    pub fn check_in(&mut self, worker: Worker<I>) {
        debug_assert!(self.members.contains_key(&worker.id));
        self.available.push(worker);
    }

    /// Forget a worker that has been (or is being) closed.
    pub fn forget(&mut self, id: WorkerId) {
        self.members.remove(&id);
    }

    /// Take every idle worker, leaving only busy ones as members.
    pub fn drain_available(&mut self) -> Vec<Worker<I>> {
        let drained: Vec<_> = self.available.drain(..).collect();
        for worker in &drained {
            self.members.remove(&worker.id);
        }
        drained
    }

    fn stamp_level(&mut self, now: Instant) {
        let busy = self.busy();
        if let Some(slot) = busy
            .checked_sub(1)
            .and_then(|level| self.last_used_at_level.get_mut(level))
        {
            *slot = Some(now);
        }
    }

    /// Highest concurrency seen within `window` of `now` (at least 1).
    pub fn recent_peak(&self, now: Instant, window: Duration) -> usize {
        self.last_used_at_level
            .iter()
            .enumerate()
            .rev()
            .find(|(_, stamp)| stamp.is_some_and(|t| now.saturating_duration_since(t) <= window))
            .map_or(1, |(level, _)| level + 1)
    }

    /// Pick idle instances beyond the recent peak for closing.
    ///
    /// Non-default fonts go first, then the default font; oldest first within
    /// each group. At least one instance always survives.
    pub fn take_spares(&mut self, now: Instant, window: Duration, default_font: &str) -> Vec<Worker<I>> {
        let surplus = self.members.len().saturating_sub(self.recent_peak(now, window));
        if surplus == 0 {
            return Vec::new();
        }

        let mut order: Vec<(bool, Instant, WorkerId)> = self
            .available
            .iter()
            .map(|w| (w.font == default_font, w.started, w.id))
            .collect();
        order.sort();
        let victims: Vec<WorkerId> = order.into_iter().take(surplus).map(|(_, _, id)| id).collect();

        let mut taken = Vec::with_capacity(victims.len());
        for id in victims {
            if let Some(index) = self.available.iter().position(|w| w.id == id) {
                taken.push(self.evict(index));
            }
        }
        taken
    }

    /// Panics if the pool bookkeeping is inconsistent.
    #[cfg(test)]
    pub fn assert_invariants(&self, max_instances: usize) {
        assert!(
            self.members.len() + self.closing <= max_instances,
            "too many instances"
        );
        let mut seen = std::collections::HashSet::new();
        for worker in &self.available {
            assert!(self.members.contains_key(&worker.id), "idle worker not a member");
            assert!(seen.insert(worker.id), "worker idle twice");
            assert_eq!(self.members[&worker.id].font, worker.font);
        }
    }

    #[cfg(test)]
    pub fn fonts(&self) -> Vec<String> {
        let mut fonts: Vec<_> = self.members.values().map(|m| m.font.clone()).collect();
        fonts.sort();
        fonts
    }

    #[cfg(test)]
    pub fn set_level_stamp(&mut self, level: usize, at: Option<Instant>) {
        self.last_used_at_level[level] = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_instances: usize) -> PoolConfig {
        PoolConfig {
            max_instances,
            creation_interval: Duration::from_millis(200),
            same_font_grace: Duration::from_millis(500),
            ..PoolConfig::default()
        }
    }

    fn state_with(fonts: &[&str], start: Instant) -> PoolState<()> {
        let mut state = PoolState::new(4);
        for (i, font) in fonts.iter().enumerate() {
            let worker = state.admit(font, (), start + Duration::from_secs(i as u64));
            state.check_in(worker);
        }
        state
    }

    #[test]
    fn test_takes_idle_instance_with_same_font() {
        let now = Instant::now();
        let state = state_with(&["TeX", "STIX-Web"], now);
        let decision = state.decide("STIX-Web", now, now, &config(4));
        assert_eq!(decision, Decision::Take(1));
    }

    #[test]
    fn test_waits_for_busy_same_font_within_grace() {
        let now = Instant::now();
        let mut state = state_with(&["TeX"], now);
        let _busy = state.checkout(0, now);

        let deadline = now + Duration::from_millis(500);
        let later = now + Duration::from_millis(100);
        assert_eq!(
            state.decide("TeX", later, deadline, &config(4)),
            Decision::WaitForSameFont(Duration::from_millis(400))
        );
    }

    #[test]
    fn test_spawns_after_grace_expires() {
        let now = Instant::now();
        let mut state = state_with(&["TeX"], now);
        let _busy = state.checkout(0, now);

        let deadline = now + Duration::from_millis(500);
        assert_eq!(
            state.decide("TeX", deadline, deadline, &config(4)),
            Decision::Spawn
        );
    }

    #[test]
    fn test_reclaims_oldest_idle_at_capacity() {
        let now = Instant::now();
        let state = state_with(&["Neo-Euler", "TeX"], now);
        let decision = state.decide("STIX-Web", now, now, &config(2));
        assert_eq!(decision, Decision::Reclaim(0));
    }

    #[test]
    fn test_closing_slot_counts_against_capacity() {
        let now = Instant::now();
        let mut state = state_with(&["TeX", "STIX-Web"], now);
        let _busy = state.checkout(1, now);
        let victim = state.begin_reclaim(0);
        assert_eq!(victim.font(), "TeX");
        assert_eq!(state.live(), 1);

        assert_eq!(
            state.decide("Neo-Euler", now, now, &config(2)),
            Decision::WaitForRelease
        );
        state.assert_invariants(2);

        state.finish_close();
        assert_eq!(state.decide("Neo-Euler", now, now, &config(2)), Decision::Spawn);
    }

    #[test]
    fn test_waits_for_release_when_all_busy_at_capacity() {
        let now = Instant::now();
        let mut state = state_with(&["TeX"], now);
        let _busy = state.checkout(0, now);
        assert_eq!(
            state.decide("STIX-Web", now, now, &config(1)),
            Decision::WaitForRelease
        );
    }

    #[test]
    fn test_throttles_creation() {
        let now = Instant::now();
        let mut state: PoolState<()> = PoolState::new(4);
        state.mark_created(now);

        let soon = now + Duration::from_millis(50);
        assert_eq!(
            state.decide("TeX", soon, soon, &config(4)),
            Decision::Throttle(Duration::from_millis(150))
        );
        let later = now + Duration::from_millis(200);
        assert_eq!(state.decide("TeX", later, later, &config(4)), Decision::Spawn);
    }

    #[test]
    fn test_checkout_stamps_concurrency_level() {
        let now = Instant::now();
        let mut state = state_with(&["TeX", "STIX-Web"], now);
        let _a = state.checkout(0, now);
        let t = now + Duration::from_secs(5);
        let _b = state.checkout(0, t);

        assert_eq!(state.busy(), 2);
        assert_eq!(state.recent_peak(t, Duration::from_secs(1)), 2);
        state.assert_invariants(4);
    }

    #[test]
    fn test_recent_peak_ignores_stale_levels() {
        let now = Instant::now();
        let mut state: PoolState<()> = PoolState::new(4);
        state.set_level_stamp(0, Some(now));
        state.set_level_stamp(3, Some(now));

        let later = now + Duration::from_secs(180);
        assert_eq!(state.recent_peak(now, Duration::from_secs(120)), 4);
        assert_eq!(state.recent_peak(later, Duration::from_secs(120)), 1);
    }

    #[test]
    fn test_spares_prefer_non_default_fonts_oldest_first() {
        let now = Instant::now();
        let mut state = state_with(&["TeX", "STIX-Web", "Neo-Euler", "TeX"], now);
        state.set_level_stamp(1, Some(now));

        // Peak of 2 busy: two of the four go.
        let taken = state.take_spares(now, Duration::from_secs(120), "TeX");
        let fonts: Vec<_> = taken.iter().map(|w| w.font().to_string()).collect();
        assert_eq!(fonts, vec!["STIX-Web", "Neo-Euler"]);
        assert_eq!(state.fonts(), vec!["TeX", "TeX"]);
        state.assert_invariants(4);
    }

    #[test]
    fn test_spares_keep_at_least_one() {
        let now = Instant::now();
        let mut state = state_with(&["TeX", "TeX", "TeX"], now);

        let taken = state.take_spares(now, Duration::from_secs(120), "TeX");
        assert_eq!(taken.len(), 2);
        // The oldest go first; the newest survives.
        assert!(taken.iter().all(|w| w.started() < now + Duration::from_secs(2)));
        assert_eq!(state.live(), 1);
    }

    #[test]
    fn test_spares_only_come_from_idle() {
        let now = Instant::now();
        let mut state = state_with(&["STIX-Web", "TeX"], now);
        let _busy = state.checkout(0, now);
        state.set_level_stamp(0, None);

        let taken = state.take_spares(now, Duration::from_secs(120), "TeX");
        assert_eq!(taken.len(), 1);
        assert_eq!(state.live(), 1);
        assert_eq!(state.idle(), 0);
    }

    #[test]
    fn test_drain_available_leaves_busy_members() {
        let now = Instant::now();
        let mut state = state_with(&["TeX", "STIX-Web"], now);
        let busy = state.checkout(0, now);

        let drained = state.drain_available();
        assert_eq!(drained.len(), 1);
        assert_eq!(state.live(), 1);

        state.forget(busy.id());
        assert_eq!(state.live(), 0);
    }
}

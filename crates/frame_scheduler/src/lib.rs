use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Tile notifications drained from the store channel per display tick; the rest wait
    /// for the next tick.
    pub max_notifications_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_notifications_per_tick: 1024,
        }
    }
}

bitflags! {
    /// Why a redraw was requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RedrawReasons: u8 {
        const TILES_AVAILABLE = 1 << 0;
        const VIEW_CHANGED = 1 << 1;
        const RESIZED = 1 << 2;
        const CONFIG_CHANGED = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("render pass {sequence} is still running")]
    PassInProgress { sequence: u64 },
    #[error("no render pass is running")]
    NoPassInProgress,
}

/// Handed to the render loop for the duration of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassTicket {
    pub sequence: u64,
    pub reasons: RedrawReasons,
    pub coalesced_tile_notifications: u32,
}

/// Coalesces redraw requests into at most one pending pass per display tick.
///
/// Requests that arrive while a pass runs are kept for the following pass, never run
/// inside the current one.
#[derive(Debug, Clone)]
pub struct RedrawScheduler {
    config: SchedulerConfig,
    pending: RedrawReasons,
    pending_tile_notifications: u32,
    running: Option<u64>,
    next_sequence: u64,
}

impl RedrawScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            pending: RedrawReasons::empty(),
            pending_tile_notifications: 0,
            running: None,
            next_sequence: 0,
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Records a redraw request. Returns `true` when the caller should ask the display for
    /// a new tick: nothing was pending before and no pass is running.
    pub fn request(&mut self, reasons: RedrawReasons) -> bool {
        let was_idle = self.pending.is_empty();
        self.pending |= reasons;
        was_idle && !reasons.is_empty() && self.running.is_none()
    }

    pub fn tiles_available(&mut self, count: u32) -> bool {
        if count == 0 {
            return false;
        }
        self.pending_tile_notifications = self.pending_tile_notifications.saturating_add(count);
        self.request(RedrawReasons::TILES_AVAILABLE)
    }

    pub fn begin_pass(&mut self) -> Result<PassTicket, SchedulerError> {
        if let Some(sequence) = self.running {
            return Err(SchedulerError::PassInProgress { sequence });
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.running = Some(sequence);
        let ticket = PassTicket {
            sequence,
            reasons: std::mem::take(&mut self.pending),
            coalesced_tile_notifications: std::mem::take(&mut self.pending_tile_notifications),
        };
        Ok(ticket)
    }

    /// Finishes the running pass. Returns `true` when requests arrived during it and a
    /// further tick is needed.
    pub fn end_pass(&mut self) -> Result<bool, SchedulerError> {
        if self.running.take().is_none() {
            return Err(SchedulerError::NoPassInProgress);
        }
        Ok(!self.pending.is_empty())
    }
}

impl Default for RedrawScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_asks_for_a_tick_and_later_ones_coalesce() {
        let mut scheduler = RedrawScheduler::default();

        assert!(scheduler.tiles_available(3));
        assert!(!scheduler.tiles_available(2));
        assert!(!scheduler.request(RedrawReasons::VIEW_CHANGED));

        let ticket = scheduler.begin_pass().expect("begin pass");
        assert_eq!(ticket.sequence, 0);
        assert!(ticket.reasons.contains(RedrawReasons::TILES_AVAILABLE));
        assert!(ticket.reasons.contains(RedrawReasons::VIEW_CHANGED));
        assert!(!ticket.reasons.contains(RedrawReasons::RESIZED));
        assert_eq!(ticket.coalesced_tile_notifications, 5);
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn passes_are_not_reentrant() {
        let mut scheduler = RedrawScheduler::default();
        scheduler.begin_pass().expect("begin pass");

        assert_eq!(
            scheduler.begin_pass(),
            Err(SchedulerError::PassInProgress { sequence: 0 })
        );
        assert_eq!(scheduler.end_pass(), Ok(false));
        assert_eq!(scheduler.end_pass(), Err(SchedulerError::NoPassInProgress));
    }

    #[test]
    fn requests_during_a_pass_schedule_the_next_one() {
        let mut scheduler = RedrawScheduler::default();
        scheduler.begin_pass().expect("begin pass");

        assert!(!scheduler.tiles_available(1));
        assert_eq!(scheduler.end_pass(), Ok(true));

        let ticket = scheduler.begin_pass().expect("second pass");
        assert_eq!(ticket.sequence, 1);
        assert_eq!(ticket.reasons, RedrawReasons::TILES_AVAILABLE);
    }

    #[test]
    fn empty_requests_do_not_schedule() {
        let mut scheduler = RedrawScheduler::default();
        assert!(!scheduler.tiles_available(0));
        assert!(!scheduler.request(RedrawReasons::empty()));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn unrequested_pass_carries_no_reasons() {
        let mut scheduler = RedrawScheduler::default();
        let ticket = scheduler.begin_pass().expect("begin pass");
        assert!(ticket.reasons.is_empty());
        assert_eq!(ticket.coalesced_tile_notifications, 0);
    }

    #[test]
    fn ticket_carries_the_union_of_pending_reasons() {
        let mut scheduler = RedrawScheduler::default();
        assert!(scheduler.request(RedrawReasons::VIEW_CHANGED));
        assert!(!scheduler.request(RedrawReasons::RESIZED | RedrawReasons::VIEW_CHANGED));
        assert!(!scheduler.tiles_available(2));

        let ticket = scheduler.begin_pass().expect("begin pass");
        assert_eq!(
            ticket.reasons,
            RedrawReasons::VIEW_CHANGED | RedrawReasons::RESIZED | RedrawReasons::TILES_AVAILABLE
        );
        assert!(!ticket.reasons.contains(RedrawReasons::CONFIG_CHANGED));
        assert_eq!(RedrawReasons::default(), RedrawReasons::empty());
        assert!(!scheduler.is_pending());
    }
}

//! Clock discipline: fetch NTP time, compare against the device clock and
//! adjust when the drift exceeds tolerance.

use chrono::NaiveDateTime;
use chrono::TimeDelta;
use log::info;
use log::warn;

use crate::clock::DeviceClock;
use crate::dst::DstSchedule;
use crate::ntp::NtpClient;
use crate::ntp::UdpExchange;
use crate::Result;

/// Configuration for the sync engine.
///
/// `resync_interval_secs` is carried for the caller's scheduler; the engine
/// itself owns no timer and syncs only when [`TimeSync::update_now`] is
/// called.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSyncSettings {
    /// Server tried first.
    pub primary_server: String,
    /// Fallback server.
    pub alternate_server: String,
    /// Base offset from UTC in minutes.
    pub timezone_offset_minutes: i32,
    /// Drift at or below this many milliseconds leaves the clock alone.
    pub tolerance_ms: u32,
    /// Whether to evaluate the DST rules at all.
    pub auto_dst: bool,
    /// DST start rule, e.g. `Mar lastSun`.
    pub dst_start: String,
    /// DST end rule, e.g. `Oct lastSun @3`.
    pub dst_end: String,
    /// Minutes added while daylight saving is in effect.
    pub dst_offset_minutes: i32,
    /// Suggested seconds between syncs, for the caller's scheduler.
    pub resync_interval_secs: u32,
}

impl Default for TimeSyncSettings {
    fn default() -> Self {
        Self {
            primary_server: "time.windows.com".to_string(),
            alternate_server: "1.pool.ntp.org".to_string(),
            timezone_offset_minutes: 0,
            tolerance_ms: 3_000,
            auto_dst: false,
            dst_start: "Mar lastSun".to_string(),
            dst_end: "Oct lastSun @3".to_string(),
            dst_offset_minutes: 60,
            resync_interval_secs: 3_600,
        }
    }
}

/// Whether the last sync round reached any server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// At least one server answered.
    Succeeded,
    /// Every attempt failed.
    Failed,
}

/// Status of the last sync round, updated whether or not the clock moved.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSyncStatus {
    /// Outcome of the round.
    pub outcome: SyncOutcome,
    /// Server whose answer was used, when one answered.
    pub source_server: Option<String>,
    /// Observed drift, device clock minus server time, in milliseconds.
    pub offset_ms: i64,
}

impl Default for TimeSyncStatus {
    fn default() -> Self {
        Self {
            outcome: SyncOutcome::Failed,
            source_server: None,
            offset_ms: 0,
        }
    }
}

/// What one sync round did, with the local time that was observed.
#[derive(Clone, Debug, PartialEq)]
pub enum TimeSyncEvent {
    /// Drift exceeded tolerance; the clock was set to this local time.
    TimeChanged(NaiveDateTime),
    /// Drift was within tolerance; the clock was left at this local time.
    TimeChecked(NaiveDateTime),
    /// No server answered.
    SyncFailed,
}

/// Drives the device clock from NTP.
#[derive(Debug)]
pub struct TimeSync {
    settings: TimeSyncSettings,
    ntp: NtpClient,
    clock: DeviceClock,
    dst: Option<DstSchedule>,
    status: TimeSyncStatus,
}

impl TimeSync {
    /// Build the engine. DST rules are parsed up front when `auto_dst` is
    /// on, so a bad rule fails here instead of at the first sync.
    pub fn new(
        settings: TimeSyncSettings,
        udp: impl UdpExchange,
        clock: DeviceClock,
    ) -> Result<Self> {
        let dst = if settings.auto_dst {
            Some(DstSchedule::new(
                &settings.dst_start,
                &settings.dst_end,
                settings.dst_offset_minutes,
            )?)
        } else {
            None
        };

        let ntp = NtpClient::new(udp)
            .with_timezone_offset_minutes(settings.timezone_offset_minutes)
            .with_dst(dst);

        Ok(Self {
            settings,
            ntp,
            clock,
            dst,
            status: TimeSyncStatus::default(),
        })
    }

    /// The settings the engine was built with.
    pub fn settings(&self) -> &TimeSyncSettings {
        &self.settings
    }

    /// Status of the last sync round.
    pub fn status(&self) -> &TimeSyncStatus {
        &self.status
    }

    /// The clock this engine disciplines.
    pub fn clock(&self) -> &DeviceClock {
        &self.clock
    }

    /// Local time according to the device clock: the clock's UTC plus the
    /// timezone offset, plus the DST offset when in effect.
    pub fn local_now(&self) -> NaiveDateTime {
        let mut local = self.clock.now_utc().naive_utc()
            + TimeDelta::minutes(self.settings.timezone_offset_minutes as i64);
        if let Some(dst) = &self.dst {
            if dst.is_daylight(local) {
                local += TimeDelta::minutes(dst.offset_minutes() as i64);
            }
        }
        local
    }

    /// Run one sync round.
    ///
    /// Servers are tried primary, alternate, primary, alternate; the first
    /// answer wins. When the observed drift exceeds the tolerance the clock
    /// is set from the answer, otherwise it is only checked. The status is
    /// updated either way.
    pub fn update_now(&mut self) -> TimeSyncEvent {
        let order = [
            self.settings.primary_server.clone(),
            self.settings.alternate_server.clone(),
            self.settings.primary_server.clone(),
            self.settings.alternate_server.clone(),
        ];

        for server in &order {
            let Some(sample) = self.ntp.fetch_time(server) else {
                continue;
            };

            let offset_ms = (self.local_now() - sample.local).num_milliseconds();
            self.status = TimeSyncStatus {
                outcome: SyncOutcome::Succeeded,
                source_server: Some(server.clone()),
                offset_ms,
            };

            if offset_ms.unsigned_abs() > self.settings.tolerance_ms as u64 {
                // The clock stores the sample's UTC instant; local time is
                // rebuilt from it on every read, so set and read stay
                // inverse operations whether or not daylight saving is in
                // effect and repeated syncs converge.
                self.clock.set_utc(sample.utc);
                info!(
                    "time set from {server}: {} (drift was {offset_ms} ms)",
                    sample.local
                );
                return TimeSyncEvent::TimeChanged(sample.local);
            }

            info!("time checked against {server}: drift {offset_ms} ms within tolerance");
            return TimeSyncEvent::TimeChecked(sample.local);
        }

        warn!(
            "time sync failed: no answer from {} or {}",
            self.settings.primary_server, self.settings.alternate_server
        );
        self.status = TimeSyncStatus::default();
        TimeSyncEvent::SyncFailed
    }
}

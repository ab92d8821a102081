//! Calendar operations
//!
//! The protected operations shipped with the gateway. The calendar itself is
//! a static mock; the availability, clock and conversion queries are real.
//! Timezones are IANA names resolved through `chrono-tz`, or fixed offsets.

use crate::{
    action::{Authorization, Operation},
    clock::Clock,
    error::ActionError,
    scope::CALENDAR_VIEW,
};
use async_trait::async_trait;
use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SecondsFormat,
    TimeZone, Utc,
};
use chrono_tz::{OffsetComponents, Tz};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Gap left after the last event before a proposed slot
pub const SLOT_BUFFER_MINUTES: i64 = 15;

/// Slot length when the caller does not ask for one
pub const DEFAULT_SLOT_MINUTES: i64 = 30;

/// Longest slot that can be requested (one day)
pub const MAX_SLOT_MINUTES: i64 = 24 * 60;

/// Calendar entry, in local wall-clock time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Event start
    #[serde(with = "minute_format")]
    pub start: NaiveDateTime,

    /// Event end
    #[serde(with = "minute_format")]
    pub end: NaiveDateTime,
}

/// Set of calendar entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calendar {
    events: Vec<CalendarEvent>,
}

impl Calendar {
    /// Calendar with the given events
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self { events }
    }

    /// Fixed demo calendar: two meetings on 2025-03-01
    pub fn mock() -> Option<Self> {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1)?;

        Some(Self::new(vec![
            CalendarEvent {
                start: day.and_hms_opt(9, 0, 0)?,
                end: day.and_hms_opt(10, 0, 0)?,
            },
            CalendarEvent {
                start: day.and_hms_opt(11, 0, 0)?,
                end: day.and_hms_opt(11, 30, 0)?,
            },
        ]))
    }

    /// Events ordered by start time
    pub fn events_by_start(&self) -> Vec<&CalendarEvent> {
        let mut events: Vec<&CalendarEvent> = self.events.iter().collect();
        events.sort_by_key(|e| e.start);
        events
    }
}

/// A proposed free slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot start
    #[serde(with = "minute_format")]
    pub start: NaiveDateTime,

    /// Slot end
    #[serde(with = "minute_format")]
    pub end: NaiveDateTime,
}

/// Payload for [`FindSlot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindSlotRequest {
    /// Requested slot length in minutes
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i64,
}

fn default_duration_minutes() -> i64 {
    DEFAULT_SLOT_MINUTES
}

impl Default for FindSlotRequest {
    fn default() -> Self {
        Self {
            duration_minutes: DEFAULT_SLOT_MINUTES,
        }
    }
}

/// Proposes the next free slot after the calendar's last event
#[derive(Debug, Clone)]
pub struct FindSlot {
    calendar: Arc<Calendar>,
}

impl FindSlot {
    /// Query `calendar`
    pub fn new(calendar: Arc<Calendar>) -> Self {
        Self { calendar }
    }

    /// Compute the slot without any authorization
    pub fn propose(&self, request: &FindSlotRequest) -> Result<Slot, ActionError> {
        if request.duration_minutes <= 0 || request.duration_minutes > MAX_SLOT_MINUTES {
            return Err(ActionError::InvalidPayload(format!(
                "duration_minutes must be between 1 and {}, got {}",
                MAX_SLOT_MINUTES, request.duration_minutes
            )));
        }

        let last = self
            .calendar
            .events_by_start()
            .last()
            .map(|e| e.end)
            .ok_or_else(|| ActionError::NoSlotAvailable("calendar has no events".to_string()))?;

        let start = last + Duration::minutes(SLOT_BUFFER_MINUTES);
        Ok(Slot {
            start,
            end: start + Duration::minutes(request.duration_minutes),
        })
    }
}

#[async_trait]
impl Operation for FindSlot {
    type Payload = FindSlotRequest;
    type Output = Slot;

    fn name(&self) -> &'static str {
        "find_slot"
    }

    fn required_scope(&self) -> &'static str {
        CALENDAR_VIEW
    }

    async fn execute(
        &self,
        _caller: &Authorization,
        payload: FindSlotRequest,
    ) -> Result<Slot, ActionError> {
        self.propose(&payload)
    }
}

/// Timezone accepted by the clock operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// IANA zone such as `Europe/Paris` or `UTC`
    Named(Tz),

    /// Fixed offset such as `+09:00`
    Fixed(FixedOffset),
}

impl FromStr for Zone {
    type Err = ActionError;

    fn from_str(raw: &str) -> Result<Self, ActionError> {
        let raw = raw.trim();

        if let Ok(tz) = raw.parse::<Tz>() {
            return Ok(Zone::Named(tz));
        }

        raw.parse::<FixedOffset>().map(Zone::Fixed).map_err(|_| {
            ActionError::InvalidPayload(format!(
                "invalid timezone '{}', expected a name like 'Europe/Paris' or an offset like '+09:00'",
                raw
            ))
        })
    }
}

impl Zone {
    /// UTC offset in effect at `instant`, and whether it includes daylight saving
    pub fn offset_at(&self, instant: DateTime<Utc>) -> (FixedOffset, bool) {
        match self {
            Zone::Named(tz) => {
                let offset = tz.offset_from_utc_datetime(&instant.naive_utc());
                (offset.fix(), offset.dst_offset() != Duration::zero())
            }
            Zone::Fixed(offset) => (*offset, false),
        }
    }

    /// Instant at which this zone's wall clock reads `local`
    ///
    /// An ambiguous reading (clocks turned back) resolves to the earlier
    /// instant; a skipped one (clocks turned forward) is rejected.
    pub fn instant_of(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, ActionError> {
        let instant = match self {
            Zone::Named(tz) => tz
                .from_local_datetime(&local)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Zone::Fixed(offset) => offset
                .from_local_datetime(&local)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        };

        instant.ok_or_else(|| {
            ActionError::InvalidPayload(format!("{} does not exist in that timezone", local))
        })
    }

    /// Wall-clock reading of `instant`, labelled with the zone as requested
    pub fn reading(&self, label: impl Into<String>, instant: DateTime<Utc>) -> ZonedTime {
        let (offset, is_dst) = self.offset_at(instant);

        ZonedTime {
            timezone: label.into(),
            datetime: instant
                .with_timezone(&offset)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            is_dst,
        }
    }
}

/// A time as seen in one timezone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZonedTime {
    /// Timezone as requested
    pub timezone: String,

    /// RFC 3339 timestamp with the zone's offset
    pub datetime: String,

    /// Whether daylight saving is in effect
    pub is_dst: bool,
}

/// Payload for [`CurrentTime`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTimeRequest {
    /// IANA name or fixed offset
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for CurrentTimeRequest {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

/// Reports the current time in a timezone
#[derive(Clone)]
pub struct CurrentTime {
    clock: Arc<dyn Clock>,
}

impl CurrentTime {
    /// Read time from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl Operation for CurrentTime {
    type Payload = CurrentTimeRequest;
    type Output = ZonedTime;

    fn name(&self) -> &'static str {
        "current_time"
    }

    fn required_scope(&self) -> &'static str {
        CALENDAR_VIEW
    }

    async fn execute(
        &self,
        _caller: &Authorization,
        payload: CurrentTimeRequest,
    ) -> Result<ZonedTime, ActionError> {
        let zone: Zone = payload.timezone.parse()?;
        Ok(zone.reading(payload.timezone, self.clock.now()))
    }
}

/// Payload for [`ConvertTime`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertTimeRequest {
    /// Zone `time` is expressed in
    pub source_timezone: String,

    /// Wall-clock time, `HH:MM` (24-hour)
    #[serde(alias = "time_str")]
    pub time: String,

    /// Zone to convert into
    pub target_timezone: String,
}

/// Result of a conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertTimeResponse {
    /// The requested time in the source zone
    pub source: ZonedTime,

    /// The same instant in the target zone
    pub target: ZonedTime,

    /// Target offset minus source offset, e.g. `+8.0h` or `+5.75h`
    pub time_difference: String,
}

/// Converts a wall-clock time from one timezone to another
///
/// The time is taken on today's date in the source zone.
#[derive(Clone)]
pub struct ConvertTime {
    clock: Arc<dyn Clock>,
}

impl ConvertTime {
    /// Take "today" from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Run the conversion without any authorization
    pub fn convert(&self, request: ConvertTimeRequest) -> Result<ConvertTimeResponse, ActionError> {
        let source: Zone = request.source_timezone.parse()?;
        let target: Zone = request.target_timezone.parse()?;

        let time = NaiveTime::parse_from_str(request.time.trim(), "%H:%M").map_err(|_| {
            ActionError::InvalidPayload(format!(
                "time must be HH:MM (24-hour), got '{}'",
                request.time
            ))
        })?;

        let now = self.clock.now();
        let today = now.with_timezone(&source.offset_at(now).0).date_naive();
        let instant = source.instant_of(today.and_time(time))?;

        let (source_offset, _) = source.offset_at(instant);
        let (target_offset, _) = target.offset_at(instant);

        Ok(ConvertTimeResponse {
            source: source.reading(request.source_timezone, instant),
            target: target.reading(request.target_timezone, instant),
            time_difference: format_hour_difference(
                target_offset.local_minus_utc() - source_offset.local_minus_utc(),
            ),
        })
    }
}

#[async_trait]
impl Operation for ConvertTime {
    type Payload = ConvertTimeRequest;
    type Output = ConvertTimeResponse;

    fn name(&self) -> &'static str {
        "convert_time"
    }

    fn required_scope(&self) -> &'static str {
        CALENDAR_VIEW
    }

    async fn execute(
        &self,
        _caller: &Authorization,
        payload: ConvertTimeRequest,
    ) -> Result<ConvertTimeResponse, ActionError> {
        self.convert(payload)
    }
}

/// `+8.0h` for whole hours, otherwise up to two decimals (`+5.5h`, `+5.75h`)
fn format_hour_difference(seconds: i32) -> String {
    let hours = f64::from(seconds) / 3600.0;

    if seconds % 3600 == 0 {
        format!("{:+.1}h", hours)
    } else {
        let raw = format!("{:+.2}", hours);
        format!("{}h", raw.trim_end_matches('0').trim_end_matches('.'))
    }
}

/// Serde module for minute-precision local timestamps
mod minute_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

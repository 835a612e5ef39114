//! Recurrence engine for task schedules
//!
//! Computes the next eligible execution instant for the five frequency
//! classes. All calendar arithmetic happens on a civil calendar in an
//! explicit timezone; the stored state is plain Unix timestamps so the
//! schedule table stays timezone-agnostic.
//!
//! Day-of-month values beyond a month's length clamp down to the last day of
//! that month, and the clamp is recomputed on every rollover so short months
//! never skip a cycle.

use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc,
};
use chrono_tz::Tz;

use crate::models::{FrequencyClass, ScheduleInput, ScheduleRecord};

#[derive(Debug, Clone)]
pub struct Scheduler {
    frequency: Option<FrequencyClass>,
    schedule_param: u32,
    next_event_time: i64,
    /// Operational "now"; overridable so tests can pin the clock.
    time: i64,
    changed: bool,
    timezone: Tz,
}

impl Scheduler {
    /// A schedule with no frequency configured yet. It reports as due
    /// (nothing has ever been projected forward) and `advance` is a no-op
    /// until a frequency is set.
    pub fn new(timezone: Tz) -> Self {
        let mut scheduler = Self {
            frequency: None,
            schedule_param: 0,
            next_event_time: 0,
            time: 0,
            changed: false,
            timezone,
        };
        scheduler.set_time(None);
        scheduler
    }

    /// Rehydrate from a persisted schedule row.
    ///
    /// An unknown frequency code leaves the frequency unset, which keeps
    /// `advance` a no-op rather than failing the whole task load.
    pub fn from_record(record: &ScheduleRecord, timezone: Tz) -> Self {
        let mut scheduler = Self::new(timezone);
        scheduler.frequency = FrequencyClass::from_code(record.frequency);
        scheduler.schedule_param = record.schedule_param.clamp(0, u32::MAX as i64) as u32;
        scheduler.next_event_time = record.next_event_time;
        scheduler
    }

    /// Export the schedule fields for persistence.
    pub fn to_record(&self, id: i64, task_id: i64) -> ScheduleRecord {
        ScheduleRecord {
            id,
            task_id,
            frequency: self.frequency.map(FrequencyClass::code).unwrap_or(0),
            schedule_param: i64::from(self.schedule_param),
            next_event_time: self.next_event_time,
        }
    }

    /// Set the operational time; `None` means the wall clock.
    pub fn set_time(&mut self, time: Option<i64>) {
        self.time = time.unwrap_or_else(|| Utc::now().timestamp());
    }

    pub fn frequency(&self) -> Option<FrequencyClass> {
        self.frequency
    }

    pub fn schedule_param(&self) -> u32 {
        self.schedule_param
    }

    /// When the next event is going to run.
    pub fn scheduled_time(&self) -> i64 {
        self.next_event_time
    }

    /// Whether this scheduler mutated its state since it was created/loaded.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Whether the next event time has passed.
    pub fn is_due(&self) -> bool {
        self.next_event_time < self.time
    }

    /// Force immediate eligibility regardless of frequency class.
    pub fn do_asap(&mut self) {
        self.changed = true;
        self.next_event_time = self.time - 1;
    }

    /// Apply schedule fields submitted by the configuration surface.
    ///
    /// `initialize_now` makes the schedule due immediately; otherwise the
    /// next event is projected forward from the current settings.
    pub fn apply_user_input(&mut self, input: &ScheduleInput) {
        self.frequency = Some(input.frequency);
        self.schedule_param = input.schedule_param;
        if input.initialize_now {
            self.do_asap();
        } else {
            self.advance(None, false, None);
        }
    }

    /// Recompute the next event time from `timestamp` (default: now).
    ///
    /// `is_automatic_run` distinguishes the periodic tick (true) from an
    /// initial save or manual reschedule (false): only non-automatic calls
    /// may land a Weekly/Monthly schedule on today's own slot, even when
    /// that instant is already in the past.
    ///
    /// No-op when no frequency is configured.
    pub fn advance(
        &mut self,
        timestamp: Option<i64>,
        is_automatic_run: bool,
        timezone_override: Option<Tz>,
    ) -> &mut Self {
        let Some(frequency) = self.frequency else {
            return self;
        };

        self.set_time(timestamp);
        let tz = timezone_override.unwrap_or(self.timezone);
        let Some(now) = civil_at(tz, self.time) else {
            return self;
        };

        self.changed = true;
        let today = now.date_naive();

        let next = match frequency {
            FrequencyClass::Minutely => {
                let step = self.schedule_param.max(1);
                let minute = now.minute() / step * step;
                let candidate = resolve_local(tz, today, hms(now.hour(), minute));
                if candidate.timestamp() <= self.time {
                    candidate + Duration::minutes(i64::from(step))
                } else {
                    candidate
                }
            }
            FrequencyClass::Hourly => {
                let step = self.schedule_param.max(1);
                let hour = now.hour() / step.min(24) * step.min(24);
                let candidate = resolve_local(tz, today, hms(hour, 0));
                if candidate.timestamp() <= self.time {
                    candidate + Duration::hours(i64::from(step))
                } else {
                    candidate
                }
            }
            FrequencyClass::Daily => {
                let hour = self.schedule_param.min(23);
                let candidate = resolve_local(tz, today, hms(hour, 0));
                if candidate.timestamp() <= self.time {
                    resolve_local(tz, today.succ_opt().unwrap_or(today), hms(hour, 0))
                } else {
                    candidate
                }
            }
            FrequencyClass::Weekly => {
                let weekday = i64::from(now.weekday().num_days_from_sunday());
                let target = i64::from(self.schedule_param.min(6));
                if target == weekday && !is_automatic_run {
                    resolve_local(tz, today, NaiveTime::MIN)
                } else {
                    let mut diff = target - weekday;
                    if diff <= 0 {
                        diff += 7;
                    }
                    let date = today
                        .checked_add_days(Days::new(diff as u64))
                        .unwrap_or(today);
                    resolve_local(tz, date, NaiveTime::MIN)
                }
            }
            FrequencyClass::Monthly => {
                let target = i64::from(self.schedule_param.max(1));
                if target == i64::from(now.day()) && !is_automatic_run {
                    resolve_local(tz, today, NaiveTime::MIN)
                } else {
                    let date = clamped_day_of_month(now.year(), now.month(), target, today);
                    let candidate = resolve_local(tz, date, NaiveTime::MIN);
                    if candidate.timestamp() <= self.time {
                        let (year, month) = if now.month() == 12 {
                            (now.year() + 1, 1)
                        } else {
                            (now.year(), now.month() + 1)
                        };
                        let date = clamped_day_of_month(year, month, target, today);
                        resolve_local(tz, date, NaiveTime::MIN)
                    } else {
                        candidate
                    }
                }
            }
        };

        self.next_event_time = next.timestamp();
        self
    }
}

/// The civil date-time for a Unix timestamp in the given timezone.
fn civil_at(tz: Tz, timestamp: i64) -> Option<DateTime<Tz>> {
    DateTime::<Utc>::from_timestamp(timestamp, 0).map(|utc| tz.from_utc_datetime(&utc.naive_utc()))
}

fn hms(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// The date for `day` in `year`/`month`, clamped to the month's length.
fn clamped_day_of_month(year: i32, month: u32, day: i64, fallback: NaiveDate) -> NaiveDate {
    let max_days = i64::from(days_in_month(year, month));
    let day = day.clamp(1, max_days) as u32;
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(fallback)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Resolve a civil date+time to an instant in `tz`.
///
/// Ambiguous local times (fall-back transition) take the earlier instant;
/// a local time inside a spring-forward gap is pushed past the gap.
fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(earlier, _) => earlier,
        chrono::LocalResult::None => shift_out_of_gap(tz, naive),
    }
}

fn shift_out_of_gap(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    for minutes in [30i64, 60, 90, 120] {
        let shifted = naive + Duration::minutes(minutes);
        if let chrono::LocalResult::Single(dt) = tz.from_local_datetime(&shifted) {
            return dt;
        }
    }
    // DST gaps never exceed two hours; interpreting as UTC is a last resort.
    tz.from_utc_datetime(&naive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrequencyClass as F;

    fn scheduler_with(frequency: F, param: u32, next_event_time: i64) -> Scheduler {
        let record = ScheduleRecord {
            id: 0,
            task_id: 0,
            frequency: frequency.code(),
            schedule_param: i64::from(param),
            next_event_time,
        };
        Scheduler::from_record(&record, chrono_tz::UTC)
    }

    #[test]
    fn do_asap_makes_schedule_due() {
        let mut scheduler = scheduler_with(F::Daily, 10, i64::MAX);
        scheduler.set_time(Some(1_389_394_800));
        assert!(!scheduler.is_due());
        assert!(!scheduler.is_changed());

        scheduler.do_asap();
        assert!(scheduler.is_due());
        assert!(scheduler.is_changed());
        assert_eq!(scheduler.scheduled_time(), 1_389_394_799);
    }

    #[test]
    fn advance_moves_past_reference_time() {
        let timestamp = 1_389_394_800;
        let mut scheduler = scheduler_with(F::Daily, 10, 0);
        scheduler.advance(Some(timestamp), true, None);
        assert!(scheduler.scheduled_time() > timestamp);
        assert!(!scheduler.is_due());
        assert!(scheduler.is_changed());
    }

    #[test]
    fn advance_without_frequency_is_a_no_op() {
        let mut scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler.next_event_time = 42;
        scheduler.advance(Some(1_389_394_800), true, None);
        assert_eq!(scheduler.scheduled_time(), 42);
        assert!(!scheduler.is_changed());
    }

    /// Legacy estimation table: (frequency, param, current event, now,
    /// expected next event), all evaluated in UTC with a non-automatic run.
    fn schedule_plan() -> Vec<(F, u32, i64, i64, i64)> {
        vec![
            (F::Daily, 10, 1389394800, 1389394800, 1389434400),
            (F::Daily, 15, 1394202900, 1394202900, 1394204400),
            (F::Daily, 15, 1394204400, 1394204400, 1394290800),
            (F::Weekly, 4, 1389484800, 1389484800, 1389830400),
            (F::Weekly, 5, 1394118600, 1394118600, 1394150400),
            (F::Weekly, 5, 1394205000, 1394205000, 1394150400),
            (F::Weekly, 5, 1394291400, 1394291400, 1394755200),
            (F::Monthly, 6, 1389052800, 1389052800, 1391644800),
            (F::Monthly, 31, 1391212800, 1391212800, 1393545600),
            (F::Monthly, 31, 1454284800, 1454284800, 1456704000),
            (F::Monthly, 29, 1394041665, 1394041665, 1396051200),
            (F::Monthly, 1, 1394041665, 1394041665, 1396310400),
            (F::Monthly, 5, 1394041665, 1394041665, 1393977600),
            (F::Hourly, 1, 1427346000, 1427346793, 1427349600),
            (F::Hourly, 1, 1427410800, 1427410800, 1427414400),
            (F::Hourly, 8, 1427446800, 1427454000, 1427472000),
            (F::Hourly, 8, 1427472000, 1427472000, 1427500800),
            (F::Minutely, 1, 1427559300, 1427559300, 1427559360),
            (F::Minutely, 1, 1427561940, 1427561940, 1427562000),
            (F::Minutely, 15, 1427556600, 1427556665, 1427557500),
            (F::Minutely, 15, 1427557500, 1427557500, 1427558400),
        ]
    }

    #[test]
    fn advance_matches_legacy_estimation_table() {
        for (frequency, param, current_event, now, expected) in schedule_plan() {
            let mut scheduler = scheduler_with(frequency, param, current_event);
            scheduler.advance(Some(now), false, Some(chrono_tz::UTC));
            assert_eq!(
                scheduler.scheduled_time(),
                expected,
                "{frequency} - {param}: now={now} expected={expected} got={}",
                scheduler.scheduled_time()
            );
        }
    }

    #[test]
    fn weekly_same_day_depends_on_run_kind() {
        // 1394118600 is Thursday 6 Mar 2014 15:10 UTC.
        let mut manual = scheduler_with(F::Weekly, 4, 0);
        manual.advance(Some(1394118600), false, None);
        assert_eq!(manual.scheduled_time(), 1394064000); // Thu 6 Mar 00:00

        let mut automatic = scheduler_with(F::Weekly, 4, 0);
        automatic.advance(Some(1394118600), true, None);
        assert_eq!(automatic.scheduled_time(), 1394668800); // Thu 13 Mar 00:00
    }

    #[test]
    fn monthly_rolls_over_and_clamps_per_month() {
        // Automatic run at 10 Nov 2009 12:36 UTC with day-of-month 10: the
        // 10th has already passed today, so the event lands on 10 Dec 00:00.
        let mut scheduler = scheduler_with(F::Monthly, 10, 0);
        scheduler.advance(Some(1_257_856_560), true, None);
        assert_eq!(scheduler.scheduled_time(), 1_260_403_200);

        // Day 31 clamps to 28 in February, then recovers to 31 in March.
        let mut scheduler = scheduler_with(F::Monthly, 31, 0);
        scheduler.advance(Some(1391212800), false, None); // 1 Feb 2014
        assert_eq!(scheduler.scheduled_time(), 1393545600); // 28 Feb 2014
        scheduler.advance(Some(scheduler.scheduled_time() + 60), true, None);
        assert_eq!(scheduler.scheduled_time(), 1396224000); // 31 Mar 2014
    }

    #[test]
    fn repeated_advance_is_strictly_monotonic() {
        for (frequency, param) in [
            (F::Minutely, 5),
            (F::Hourly, 3),
            (F::Daily, 7),
            (F::Weekly, 2),
            (F::Monthly, 15),
        ] {
            let mut scheduler = scheduler_with(frequency, param, 0);
            scheduler.advance(Some(1_389_394_800), true, None);
            let first = scheduler.scheduled_time();
            scheduler.advance(Some(first + 1), true, None);
            let second = scheduler.scheduled_time();
            assert!(
                second > first,
                "{frequency}({param}): {second} should be after {first}"
            );
        }
    }

    #[test]
    fn daily_respects_timezone_override() {
        // 10 Jan 2014 00:00 UTC is 11:00 in Sydney (UTC+11); hour 10 has
        // passed locally, so the next event is 11 Jan 10:00 AEDT.
        let mut scheduler = scheduler_with(F::Daily, 10, 0);
        scheduler.advance(Some(1_389_312_000), true, Some(chrono_tz::Australia::Sydney));
        assert_eq!(scheduler.scheduled_time(), 1_389_394_800);
    }

    #[test]
    fn user_input_initializes_or_projects() {
        let mut scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler.set_time(Some(1_389_394_800));
        scheduler.apply_user_input(&ScheduleInput {
            frequency: F::Daily,
            schedule_param: 10,
            initialize_now: true,
        });
        assert!(scheduler.is_due());

        let mut scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler.set_time(Some(1_389_394_800));
        scheduler.apply_user_input(&ScheduleInput {
            frequency: F::Daily,
            schedule_param: 10,
            initialize_now: false,
        });
        assert!(!scheduler.is_due());
        assert!(scheduler.scheduled_time() > 1_389_394_800);
    }

    #[test]
    fn record_round_trip_preserves_fields() {
        let mut scheduler = scheduler_with(F::Monthly, 6, 1389052800);
        scheduler.advance(Some(1389052800), false, None);
        let record = scheduler.to_record(3, 7);
        assert_eq!(record.id, 3);
        assert_eq!(record.task_id, 7);
        assert_eq!(record.frequency, F::Monthly.code());
        assert_eq!(record.schedule_param, 6);
        assert_eq!(record.next_event_time, 1391644800);

        let restored = Scheduler::from_record(&record, chrono_tz::UTC);
        assert_eq!(restored.frequency(), Some(F::Monthly));
        assert_eq!(restored.scheduled_time(), 1391644800);
        assert!(!restored.is_changed());
    }
}

//! Simulation clock — owns the calendar, the tick counter, and pause.

use crate::{
    error::{SimError, SimResult},
    types::{RunId, Tick},
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub run_id:       RunId,
    /// Days simulated so far.
    pub current_tick: Tick,
    /// The next day to simulate.
    pub next_date:    NaiveDate,
    pub start_date:   NaiveDate,
    pub end_date:     NaiveDate,
    pub paused:       bool,
}

impl SimClock {
    pub fn new(run_id: RunId, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            run_id,
            current_tick: 0,
            next_date: start_date,
            start_date,
            end_date,
            paused: true,
        }
    }

    /// Advance one day. Returns the tick number and the date to simulate.
    /// Panics if called while paused — callers must check.
    pub fn advance(&mut self) -> SimResult<(Tick, NaiveDate)> {
        assert!(!self.paused, "advance() called on paused clock");
        if self.is_finished() {
            return Err(SimError::RunComplete { end: self.end_date });
        }
        let today = self.next_date;
        self.next_date = today
            .succ_opt()
            .ok_or_else(|| SimError::config("end_date", "calendar overflow"))?;
        self.current_tick += 1;
        Ok((self.current_tick, today))
    }

    /// True once the end date has been simulated.
    pub fn is_finished(&self) -> bool {
        self.next_date > self.end_date
    }

    /// The last simulated day, if any.
    pub fn current_date(&self) -> Option<NaiveDate> {
        if self.current_tick == 0 {
            None
        } else {
            self.next_date.pred_opt()
        }
    }

    pub fn days_remaining(&self) -> u64 {
        if self.is_finished() {
            return 0;
        }
        (self.end_date - self.next_date).num_days() as u64 + 1
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }
}

/// True when `date` is the last day of its calendar month.
pub fn is_month_end(date: NaiveDate) -> bool {
    date.succ_opt().map_or(true, |next| next.month() != date.month())
}

/// True when `date` is 31 December.
pub fn is_year_end(date: NaiveDate) -> bool {
    date.month() == 12 && date.day() == 31
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn advances_through_end_date_then_stops() {
        let mut clock = SimClock::new("c".into(), d(2024, 12, 30), d(2024, 12, 31));
        clock.resume();
        assert_eq!(clock.advance().unwrap(), (1, d(2024, 12, 30)));
        assert_eq!(clock.advance().unwrap(), (2, d(2024, 12, 31)));
        assert!(clock.is_finished());
        assert!(matches!(clock.advance(), Err(SimError::RunComplete { .. })));
        assert_eq!(clock.current_date(), Some(d(2024, 12, 31)));
    }

    #[test]
    fn month_end_detection_handles_leap_years() {
        assert!(is_month_end(d(2024, 2, 29)));
        assert!(!is_month_end(d(2024, 2, 28)));
        assert!(is_month_end(d(2023, 2, 28)));
        assert!(is_year_end(d(2023, 12, 31)));
    }
}

//! Calendar date sources used to drive rotation.
//!
//! Rotation only cares about the calendar day, never the time of day, so the
//! pool asks a [`DateProvider`] for "today" on every append instead of
//! reading the system clock directly.

use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use parking_lot::Mutex;

/// Supplies the current calendar date.
pub trait DateProvider: Send + Sync {
    /// Returns today's date.
    fn today(&self) -> NaiveDate;
}

impl<T: DateProvider + ?Sized> DateProvider for Arc<T> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}

/// Date provider backed by the local system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDate;

impl DateProvider for SystemDate {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Date provider whose date only changes when told to.
///
/// Used to simulate day boundaries deterministically.
#[derive(Debug)]
pub struct ManualDate {
    date: Mutex<NaiveDate>,
}

impl ManualDate {
    /// Creates a provider that reports `date` until changed.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    /// Sets the reported date.
    pub fn set(&self, date: NaiveDate) {
        *self.date.lock() = date;
    }

    /// Moves the reported date forward by `days`, saturating at the latest
    /// representable date.
    pub fn advance_days(&self, days: u64) {
        let mut date = self.date.lock();
        *date = date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX);
    }
}

impl DateProvider for ManualDate {
    fn today(&self) -> NaiveDate {
        *self.date.lock()
    }
}

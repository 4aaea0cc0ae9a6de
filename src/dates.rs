//! Calendar ranges behind the daily, weekly and monthly views.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::i18n::Language;
use crate::models::Appointment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for ViewMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(ViewMode::Daily),
            "weekly" | "week" => Ok(ViewMode::Weekly),
            "monthly" | "month" => Ok(ViewMode::Monthly),
            other => Err(ValidationError::UnknownView(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Sunday that opens the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let back = u64::from(date.weekday().num_days_from_sunday());
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date);
    (first, last)
}

/// Days shown by `view` when `date` is selected
pub fn view_range(view: ViewMode, date: NaiveDate) -> DateRange {
    match view {
        ViewMode::Daily => DateRange { start: date, end: date },
        ViewMode::Weekly => {
            let start = week_start(date);
            let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
            DateRange { start, end }
        }
        ViewMode::Monthly => {
            let (start, end) = month_bounds(date);
            DateRange { start, end }
        }
    }
}

/// Step the selected date one view-width backwards or forwards.
/// Month steps clamp the day to the target month's length (Jan 31 → Feb 29).
pub fn navigate(view: ViewMode, date: NaiveDate, direction: Direction) -> NaiveDate {
    let stepped = match (view, direction) {
        (ViewMode::Daily, Direction::Next) => date.checked_add_days(Days::new(1)),
        (ViewMode::Daily, Direction::Prev) => date.checked_sub_days(Days::new(1)),
        (ViewMode::Weekly, Direction::Next) => date.checked_add_days(Days::new(7)),
        (ViewMode::Weekly, Direction::Prev) => date.checked_sub_days(Days::new(7)),
        (ViewMode::Monthly, Direction::Next) => date.checked_add_months(Months::new(1)),
        (ViewMode::Monthly, Direction::Prev) => date.checked_sub_months(Months::new(1)),
    };
    stepped.unwrap_or(date)
}

fn long_date(date: NaiveDate, lang: Language) -> String {
    let sep = lang.date_joiner();
    format!(
        "{}{sep}{}{sep}{}",
        date.day(),
        lang.month_name(date.month()),
        date.year()
    )
}

/// Human-readable heading for the selected range
pub fn range_label(view: ViewMode, date: NaiveDate, lang: Language) -> String {
    match view {
        ViewMode::Daily => long_date(date, lang),
        ViewMode::Weekly => {
            let range = view_range(ViewMode::Weekly, date);
            format!(
                "{}{}{} - {}",
                range.start.day(),
                lang.date_joiner(),
                lang.short_month_name(range.start.month()),
                long_date(range.end, lang)
            )
        }
        ViewMode::Monthly => format!(
            "{}{}{}",
            lang.month_name(date.month()),
            lang.date_joiner(),
            date.year()
        ),
    }
}

/// Appointments inside the view range whose client name or service matches `search`
/// (case-insensitive substring, empty matches everything).
pub fn filter_appointments<'a>(
    appointments: &'a [Appointment],
    view: ViewMode,
    date: NaiveDate,
    search: &str,
) -> Vec<&'a Appointment> {
    let range = view_range(view, date);
    let needle = search.trim().to_lowercase();
    appointments
        .iter()
        .filter(|apt| range.contains(apt.date))
        .filter(|apt| {
            needle.is_empty()
                || apt.client_name.to_lowercase().contains(&needle)
                || apt.service.to_lowercase().contains(&needle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekly_range_runs_sunday_to_saturday() {
        // 2024-06-01 is a Saturday
        let range = view_range(ViewMode::Weekly, d(2024, 6, 1));
        assert_eq!(range, DateRange { start: d(2024, 5, 26), end: d(2024, 6, 1) });

        let sunday = view_range(ViewMode::Weekly, d(2024, 6, 2));
        assert_eq!(sunday.start, d(2024, 6, 2));
        assert_eq!(sunday.end, d(2024, 6, 8));
    }

    #[test]
    fn monthly_range_handles_leap_february() {
        let range = view_range(ViewMode::Monthly, d(2024, 2, 10));
        assert_eq!(range, DateRange { start: d(2024, 2, 1), end: d(2024, 2, 29) });
        let december = view_range(ViewMode::Monthly, d(2023, 12, 31));
        assert_eq!(december.end, d(2023, 12, 31));
    }

    #[test]
    fn navigate_clamps_month_end() {
        assert_eq!(navigate(ViewMode::Monthly, d(2024, 1, 31), Direction::Next), d(2024, 2, 29));
        assert_eq!(navigate(ViewMode::Monthly, d(2024, 3, 31), Direction::Prev), d(2024, 2, 29));
        assert_eq!(navigate(ViewMode::Weekly, d(2024, 6, 1), Direction::Prev), d(2024, 5, 25));
        assert_eq!(navigate(ViewMode::Daily, d(2024, 12, 31), Direction::Next), d(2025, 1, 1));
    }

    #[test]
    fn labels_per_view_and_language() {
        let date = d(2024, 6, 1);
        assert_eq!(range_label(ViewMode::Daily, date, Language::En), "1 June 2024");
        assert_eq!(range_label(ViewMode::Daily, date, Language::Pt), "1 de junho de 2024");
        assert_eq!(range_label(ViewMode::Weekly, date, Language::En), "26 May - 1 June 2024");
        assert_eq!(range_label(ViewMode::Monthly, date, Language::Es), "junio de 2024");
        assert_eq!(range_label(ViewMode::Monthly, date, Language::Fr), "juin 2024");
    }

    #[test]
    fn filter_by_range_and_search() {
        let t = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let appointments = vec![
            Appointment::new("Ana Souza".into(), d(2024, 6, 1), t, "Corte".into()),
            Appointment::new("Bruno".into(), d(2024, 6, 3), t, "Barba".into()),
            Appointment::new("Carla".into(), d(2024, 5, 27), t, "Manicure".into()),
        ];

        let week: Vec<_> = filter_appointments(&appointments, ViewMode::Weekly, d(2024, 5, 30), "")
            .into_iter()
            .map(|a| a.client_name.as_str())
            .collect();
        assert_eq!(week, vec!["Ana Souza", "Carla"]);

        let search: Vec<_> = filter_appointments(&appointments, ViewMode::Monthly, d(2024, 6, 15), "BARBA")
            .into_iter()
            .map(|a| a.client_name.as_str())
            .collect();
        assert_eq!(search, vec!["Bruno"]);
    }
}

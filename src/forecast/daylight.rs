use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Calendar month number (1 = January). Out-of-range values are accepted.
pub type Month = i64;

/// Approximate sunrise-to-sunset window, `[sunrise, sunset)` in whole hours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaylightWindow {
    pub sunrise: i64,
    pub sunset: i64,
}

impl DaylightWindow {
    pub const fn new(sunrise: i64, sunset: i64) -> Self {
        Self { sunrise, sunset }
    }

    pub fn contains(&self, hour: i64) -> bool {
        self.sunrise <= hour && hour < self.sunset
    }
}

/// Window used for autumn and for any month outside 1..=12
pub const DEFAULT_WINDOW: DaylightWindow = DaylightWindow::new(6, 18);

/// Seasonal daylight windows keyed by month
pub static DAYLIGHT_WINDOWS: Lazy<HashMap<Month, DaylightWindow>> = Lazy::new(|| {
    let seasons = [
        ([12, 1, 2], DaylightWindow::new(7, 17)),
        ([3, 4, 5], DaylightWindow::new(6, 19)),
        ([6, 7, 8], DaylightWindow::new(5, 20)),
        ([9, 10, 11], DEFAULT_WINDOW),
    ];

    let mut map = HashMap::new();
    for (months, window) in seasons {
        for month in months {
            map.insert(month, window);
        }
    }
    map
});

/// Get the daylight window for a month
pub fn window_for_month(month: Month) -> DaylightWindow {
    DAYLIGHT_WINDOWS
        .get(&month)
        .copied()
        .unwrap_or(DEFAULT_WINDOW)
}

/// 1 if `hour` lies inside the month's daylight window, else 0
pub fn daylight_indicator(hour: i64, month: Month) -> u8 {
    u8::from(window_for_month(month).contains(hour))
}

impl std::fmt::Display for DaylightWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.sunrise, self.sunset)
    }
}

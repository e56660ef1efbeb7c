use chrono::{DateTime, Days, Duration, Local, NaiveTime, TimeZone};

/// First moment strictly after `now` whose wall-clock time is `at`.
/// A time skipped by a DST jump moves to the next day that has it.
pub fn next_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    for offset in 0..=2 {
        let Some(day) = today.checked_add_days(Days::new(offset)) else {
            break;
        };
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
    }

    now.clone() + Duration::days(1)
}

/// Sleeps until the next local `at`.
pub async fn sleep_until_next(at: NaiveTime) {
    let now = Local::now();
    let next = next_run(&now, at);
    let wait = (next - now).to_std().unwrap_or_default();
    tracing::info!(next = %next.format("%Y-%m-%d %H:%M"), "next delivery scheduled");
    tokio::time::sleep(wait).await;
}

use std::time::Duration;

/// `hh:mm:ss.SSS`, or `hh:mm:ss` without milliseconds.
pub fn time_delta_to_str(delta: Duration, with_millis: bool) -> String {
    let total = delta.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if with_millis {
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            hours,
            minutes,
            seconds,
            delta.subsec_millis()
        )
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

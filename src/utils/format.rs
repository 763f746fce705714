// src/utils/format.rs

/// HH:MM:SS rendering used on the wizard and on saved trip records.
pub fn format_duration(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

pub fn duration_from_components(hours: u32, minutes: u32, seconds: u32) -> i64 {
    i64::from(hours) * 3600 + i64::from(minutes) * 60 + i64::from(seconds)
}

pub fn duration_components(total_seconds: i64) -> (u32, u32, u32) {
    let total = total_seconds.max(0);
    (
        (total / 3600) as u32,
        ((total % 3600) / 60) as u32,
        (total % 60) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_and_padding() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(61), "00:01:01");
        assert_eq!(format_duration(3600 * 3 + 60 * 25 + 9), "03:25:09");
    }

    #[test]
    fn negative_seconds_render_as_zero() {
        assert_eq!(format_duration(-5), "00:00:00");
    }

    #[test]
    fn components_round_trip() {
        let total = duration_from_components(2, 34, 56);
        assert_eq!(total, 2 * 3600 + 34 * 60 + 56);
        assert_eq!(duration_components(total), (2, 34, 56));
    }
}

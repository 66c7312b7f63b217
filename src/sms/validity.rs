// ABOUTME: Relative validity period encoding for SMS-SUBMIT (TS 23.040 TP-VP)
// ABOUTME: Converts a validity in minutes to the one-octet relative format, rounding up

/// Octet used when no validity is requested: 24 hours
pub const DEFAULT_RELATIVE_VALIDITY: u8 = 167;

/// Encodes `minutes` as a relative validity octet
///
/// Values are rounded up to the next unit of their range and clamp to 63
/// weeks. Zero selects the 24 hour default.
pub fn validity_to_relative(minutes: u32) -> u8 {
    fn round_up(value: u32, unit: u32) -> u32 {
        if value % unit != 0 { value + unit } else { value }
    }

    match minutes {
        0 => DEFAULT_RELATIVE_VALIDITY,
        // 5 minute units up to 12 hours
        1..=720 => (round_up(minutes, 5) / 5 - 1) as u8,
        // 12 hours plus 30 minute units up to 1 day
        721..=1440 => {
            let v = round_up(minutes, 30).min(1440);
            (143 + (v - 720) / 30) as u8
        }
        // days, up to 30
        1441..=43200 => {
            let v = round_up(minutes, 1440).min(43200);
            (167 + (v - 1440) / 1440) as u8
        }
        // weeks, up to 63
        43201..=635040 => {
            let v = round_up(minutes, 10080).min(635040);
            (196 + (v - 40320) / 10080) as u8
        }
        _ => 255,
    }
}

use crate::error::VarstoreResult;
use log;
use std::{
    fmt::{Binary, Display},
    sync::Once,
};

pub type Result<T> = VarstoreResult<T>;

pub const MISSING_INTEGER: i32 = i32::MIN;
pub const VECTOR_END_INTEGER: i32 = i32::MIN + 1;
pub const MISSING_FLOAT_BITS: u32 = 0x7F80_0001;
pub const VECTOR_END_FLOAT_BITS: u32 = 0x7F80_0002;

#[allow(unused)]
static INIT_LOG: Once = Once::new();

#[allow(unused)]
pub fn init_logger() {
    INIT_LOG.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .is_test(true)
            .init();
    });
}

pub fn handle_error_and_exit(err: impl Display) -> ! {
    log::error!("{err}");
    std::process::exit(1);
}

pub fn is_missing_float(value: f32) -> bool {
    value.to_bits() == MISSING_FLOAT_BITS || value.to_bits() == VECTOR_END_FLOAT_BITS
}

pub fn is_missing_integer(value: i32) -> bool {
    value == MISSING_INTEGER || value == VECTOR_END_INTEGER
}

pub fn readable_size(bytes: u64) -> (f64, &'static str) {
    const UNITS: [(f64, &str); 5] = [
        (1.0, "B"),
        (1024.0, "KiB"),
        (1024.0 * 1024.0, "MiB"),
        (1024.0 * 1024.0 * 1024.0, "GiB"),
        (1024.0 * 1024.0 * 1024.0 * 1024.0, "TiB"),
    ];

    let value = bytes as f64;
    let mut unit = UNITS[0];
    for next in UNITS.iter().skip(1) {
        if value >= next.0 {
            unit = *next;
        } else {
            break;
        }
    }

    (value / unit.0, unit.1)
}

pub fn format_number_with_commas<T>(n: T) -> String
where
    T: Display + Binary,
{
    let s = n.to_string();
    let (sign, digits) = s.strip_prefix('-').map_or(("", s.as_str()), |d| ("-", d));

    if let 0..=3 = digits.len() {
        return s;
    }

    let mut result = String::with_capacity(digits.len() + (digits.len() - 1) / 3 + sign.len());
    for (digit_count, c) in digits.chars().rev().enumerate() {
        if digit_count > 0 && digit_count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result = result.chars().rev().collect();
    if !sign.is_empty() {
        result.insert_str(0, sign);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_with_commas_signed() {
        assert_eq!(format_number_with_commas(0i64), "0");
        assert_eq!(format_number_with_commas(999i64), "999");
        assert_eq!(format_number_with_commas(1_000_000i64), "1,000,000");
        assert_eq!(format_number_with_commas(-1_000_000i64), "-1,000,000");
    }

    #[test]
    fn test_format_number_with_commas_unsigned() {
        assert_eq!(format_number_with_commas(1_048_576u64), "1,048,576");
        assert_eq!(
            format_number_with_commas(usize::MAX),
            "18,446,744,073,709,551,615"
        );
    }

    #[test]
    fn test_readable_size_picks_largest_fitting_unit() {
        assert_eq!(readable_size(512), (512.0, "B"));
        assert_eq!(readable_size(1024), (1.0, "KiB"));
        assert_eq!(readable_size(1_048_576 * 3), (3.0, "MiB"));
    }

    #[test]
    fn test_missing_sentinels_are_recognised() {
        assert!(is_missing_integer(MISSING_INTEGER));
        assert!(is_missing_integer(VECTOR_END_INTEGER));
        assert!(!is_missing_integer(0));
        assert!(is_missing_float(f32::from_bits(MISSING_FLOAT_BITS)));
        assert!(is_missing_float(f32::from_bits(VECTOR_END_FLOAT_BITS)));
        assert!(!is_missing_float(1.5));
    }
}

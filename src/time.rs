//! Time related utils.

use chrono::DateTime;
use chrono::Utc;

/// Format a time into an RFC1123 date string, e.g. `Wed, 21 Oct 2020 08:53:19 GMT`.
///
/// This is the form the table service expects in `x-ms-date` and in the
/// string-to-sign.
pub fn format_http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Format a time into the Atom `<updated>` form, e.g. `2020-10-21T08:53:19.0000000Z`.
///
/// The fractional part is fixed at seven zeros; the service only needs
/// second precision here.
pub fn format_atom_timestamp(t: DateTime<Utc>) -> String {
    format!("{}.0000000Z", t.format("%Y-%m-%dT%H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_http_date() {
        let t = Utc.with_ymd_and_hms(2020, 10, 21, 8, 53, 19).unwrap();
        assert_eq!(format_http_date(t), "Wed, 21 Oct 2020 08:53:19 GMT");
    }

    #[test]
    fn test_format_atom_timestamp() {
        let t = Utc.with_ymd_and_hms(2020, 9, 30, 23, 31, 4).unwrap();
        assert_eq!(format_atom_timestamp(t), "2020-09-30T23:31:04.0000000Z");
    }
}

//! Text exposition of a [`Snapshot`].
//!
//! Every reading becomes a gauge named `obd_<key>`. Values are written
//! verbatim; nothing checks that they are numeric.

use crate::snapshot::Snapshot;
use std::fmt::Write;

/// Prefix prepended to every sensor key.
pub const METRIC_PREFIX: &str = "obd_";

/// Content type advertised for the rendered body.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render a snapshot in the Prometheus text format.
///
/// Metrics appear in sorted key order and are separated by a blank line.
/// An empty snapshot renders as an empty string.
///
/// # Examples
///
/// ```
/// use obd_exporter::exposition::render;
/// use obd_exporter::snapshot::Snapshot;
///
/// let snapshot: Snapshot = [("EngineRPM", "850")].into_iter().collect();
/// assert_eq!(
///     render(&snapshot),
///     "# HELP obd_EngineRPM No description\n# TYPE obd_EngineRPM gauge\nobd_EngineRPM 850\n\n"
/// );
/// ```
pub fn render(snapshot: &Snapshot) -> String {
    let mut body = String::new();

    for (key, value) in snapshot.iter() {
        // Writing to a String cannot fail.
        let _ = write!(
            body,
            "# HELP {METRIC_PREFIX}{key} No description\n\
             # TYPE {METRIC_PREFIX}{key} gauge\n\
             {METRIC_PREFIX}{key} {value}\n\n"
        );
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn lines(body: &str) -> HashSet<&str> {
        body.lines().filter(|line| !line.is_empty()).collect()
    }

    #[test]
    fn test_empty_snapshot_renders_nothing() {
        assert_eq!(render(&Snapshot::empty()), "");
    }

    #[test]
    fn test_renders_one_block_per_reading() {
        let snapshot: Snapshot = [("EngineRPM", "850"), ("VehicleSpeed", "0")]
            .into_iter()
            .collect();
        let body = render(&snapshot);

        let expected: HashSet<&str> = [
            "# HELP obd_EngineRPM No description",
            "# TYPE obd_EngineRPM gauge",
            "obd_EngineRPM 850",
            "# HELP obd_VehicleSpeed No description",
            "# TYPE obd_VehicleSpeed gauge",
            "obd_VehicleSpeed 0",
        ]
        .into_iter()
        .collect();

        assert_eq!(lines(&body), expected);
        assert_eq!(body.matches("# HELP").count(), 2);
        assert!(body.ends_with("obd_VehicleSpeed 0\n\n"));
    }

    #[test]
    fn test_non_numeric_values_are_emitted_verbatim() {
        let snapshot: Snapshot = [("OBDStandards", "not-a-number")].into_iter().collect();
        assert!(render(&snapshot).contains("obd_OBDStandards not-a-number\n"));
    }

    #[test]
    fn test_rendering_is_pure() {
        let snapshot: Snapshot = [("Fuel", "41.568627"), ("EngineLoad", "12.549020")]
            .into_iter()
            .collect();
        assert_eq!(lines(&render(&snapshot)), lines(&render(&snapshot)));
    }
}

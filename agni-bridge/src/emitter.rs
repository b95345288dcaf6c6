//! collectd exec-plugin output
//!
//! Successful polls become `PUTVAL` lines on stdout:
//!
//! ```text
//! PUTVAL <host>/<plugin>/<kind>-<name> interval=<secs> <unix ts>:<value>
//! ```
//!
//! Failures become `<plugin>/<name>: <cause>` lines on stderr. Every line is
//! written with one locked write so concurrent pollers never split a line.

use std::fmt;
use std::io::Write;

use tracing::error;

use crate::manifest::Series;

/// One `PUTVAL` command
#[derive(Debug, Clone, Copy)]
pub struct PutVal<'a> {
    pub hostname: &'a str,
    pub plugin: &'a str,
    pub series: &'a Series,
    pub interval_secs: u64,
    pub timestamp: i64,
    pub value: f64,
}

impl fmt::Display for PutVal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PUTVAL {}/{}/{}-{} interval={} {}:{}",
            self.hostname,
            self.plugin,
            self.series.kind(),
            self.series.name(),
            self.interval_secs,
            self.timestamp,
            format_value(self.value)
        )
    }
}

/// Diagnostic line for a failed poll
pub fn diagnostic_line(plugin: &str, series: &Series, cause: &dyn fmt::Display) -> String {
    format!("{}/{}: {}", plugin, series.name(), cause)
}

/// Shortest round-trip representation, switching to exponent notation when
/// the decimal exponent is below -4 or at least 6 (`42`, `3.5`, `1e+06`,
/// `1.5e-05`).
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return value.to_string(),
    };

    if value != 0.0 && (exponent < -4 || exponent >= 6) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        value.to_string()
    }
}

/// Destination for poll results
pub trait LineSink: Send + Sync {
    /// Write one protocol line
    fn put(&self, line: &str);
    /// Write one diagnostic line
    fn diagnostic(&self, line: &str);
}

/// stdout for `PUTVAL`, stderr for diagnostics
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl LineSink for StdioSink {
    fn put(&self, line: &str) {
        if let Err(e) = write_line(&mut std::io::stdout().lock(), line) {
            error!("Failed to write to stdout: {}", e);
        }
    }

    fn diagnostic(&self, line: &str) {
        if let Err(e) = write_line(&mut std::io::stderr().lock(), line) {
            error!("Failed to write to stderr: {}", e);
        }
    }
}

fn write_line(out: &mut impl Write, line: &str) -> std::io::Result<()> {
    writeln!(out, "{}", line)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_putval_line() {
        let series = Series::parse("gauge-smoke", "Q1").unwrap();
        let line = PutVal {
            hostname: "h",
            plugin: "magic",
            series: &series,
            interval_secs: 20,
            timestamp: 1000,
            value: 3.5,
        };
        assert_eq!(line.to_string(), "PUTVAL h/magic/gauge-smoke interval=20 1000:3.5");

        let series = Series::parse("counter-bunnies", "Q2").unwrap();
        let line = PutVal { series: &series, value: 42.0, ..line };
        assert_eq!(line.to_string(), "PUTVAL h/magic/counter-bunnies interval=20 1000:42");
    }

    #[test]
    fn test_format_value_decimal() {
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(-0.0), "-0");
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(3.5), "3.5");
        assert_eq!(format_value(-2.25), "-2.25");
        assert_eq!(format_value(0.1), "0.1");
        assert_eq!(format_value(0.0001), "0.0001");
        assert_eq!(format_value(123456.0), "123456");
        assert_eq!(format_value(999999.5), "999999.5");
    }

    #[test]
    fn test_format_value_exponent() {
        assert_eq!(format_value(1e6), "1e+06");
        assert_eq!(format_value(1234567.0), "1.234567e+06");
        assert_eq!(format_value(0.00001), "1e-05");
        assert_eq!(format_value(0.000015), "1.5e-05");
        assert_eq!(format_value(-2.5e-7), "-2.5e-07");
        assert_eq!(format_value(1e21), "1e+21");
        assert_eq!(format_value(6.02214076e23), "6.02214076e+23");
        assert_eq!(format_value(5e-324), "5e-324");
    }

    #[test]
    fn test_format_value_special() {
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_diagnostic_line() {
        let series = Series::parse("gauge-smoke", "Q1").unwrap();
        assert_eq!(diagnostic_line("magic", &series, &"timeout"), "magic/smoke: timeout");
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_line() {
        let mut buf = Vec::new();
        write_line(&mut buf, "magic/smoke: timeout").unwrap();
        assert_eq!(buf, b"magic/smoke: timeout\n");

        let err = write_line(&mut ClosedPipe, "lost").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}

use std::fmt;
use std::time::{Duration, SystemTime};

/// A seismic channel + time window: network, station, location, channel
/// codes (may carry FDSN wildcards `*?` — this crate never interprets them,
/// the routing service does) and a start/end time.
///
/// `starttime < endtime` whenever both are set. An absent `endtime` means
/// "open" — treated as `now` for POST routing substitution, left open for GET
/// (see `RouteResolver`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamEpoch {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub starttime: Timestamp,
    pub endtime: Option<Timestamp>,
}

/// Second-resolution UTC timestamp. FDSN SNCL lines use ISO-8601; we keep the
/// parsed form plus the exact rendered string so round-tripping to the
/// routing/endpoint services never drifts from what was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_unix_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn unix_secs(&self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self(secs)
    }

    /// Parse a subset of ISO-8601 as used by FDSN: `YYYY-MM-DDTHH:MM:SS[.ffffff]`
    /// or `YYYY-MM-DD`. No timezone suffix is accepted — FDSN times are
    /// implicitly UTC.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty timestamp".into());
        }
        let (date_part, time_part) = match s.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (s, None),
        };
        let mut date_fields = date_part.split('-');
        let year: i64 = date_fields
            .next()
            .ok_or("missing year")?
            .parse()
            .map_err(|_| "bad year")?;
        let month: i64 = date_fields
            .next()
            .unwrap_or("1")
            .parse()
            .map_err(|_| "bad month")?;
        let day: i64 = date_fields
            .next()
            .unwrap_or("1")
            .parse()
            .map_err(|_| "bad day")?;

        let (hour, minute, sec) = if let Some(t) = time_part {
            let t = t.trim_end_matches('Z');
            let mut fields = t.split(':');
            let h: i64 = fields.next().unwrap_or("0").parse().map_err(|_| "bad hour")?;
            let m: i64 = fields.next().unwrap_or("0").parse().map_err(|_| "bad minute")?;
            let s_field = fields.next().unwrap_or("0");
            let s: f64 = s_field.parse().map_err(|_| "bad second")?;
            (h, m, s)
        } else {
            (0, 0, 0.0)
        };

        let days = days_from_civil(year, month, day);
        let secs = days * 86_400 + hour * 3600 + minute * 60 + sec as i64;
        Ok(Self(secs))
    }

    pub fn to_iso(&self) -> String {
        let (y, mo, d) = civil_from_days(self.0.div_euclid(86_400));
        let rem = self.0.rem_euclid(86_400);
        let h = rem / 3600;
        let mi = (rem % 3600) / 60;
        let s = rem % 60;
        format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}")
    }

    pub fn duration_since(&self, other: Timestamp) -> Duration {
        Duration::from_secs(self.0.saturating_sub(other.0).max(0) as u64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_iso())
    }
}

/// Howard Hinnant's days-from-civil algorithm (proleptic Gregorian, no
/// external date/time dependency needed for the narrow FDSN range we parse).
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

impl StreamEpoch {
    /// Parse a routing-table SNCL row: `NET STA LOC CHA STARTISO [ENDISO]`.
    /// An absent end is only valid when the request used GET.
    pub fn from_sncl_line(line: &str, default_endtime: Option<Timestamp>) -> Result<Self, String> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(format!("malformed SNCL line: {line:?}"));
        }
        let location = if fields[2] == "--" { String::new() } else { fields[2].to_string() };
        let starttime = Timestamp::parse(fields[4])?;
        let endtime = match fields.get(5) {
            Some(s) => Some(Timestamp::parse(s)?),
            None => default_endtime,
        };
        if let Some(et) = endtime {
            if et < starttime {
                return Err(format!("endtime before starttime: {line:?}"));
            }
        }
        Ok(Self {
            network: fields[0].to_string(),
            station: fields[1].to_string(),
            location,
            channel: fields[3].to_string(),
            starttime,
            endtime,
        })
    }

    pub fn to_sncl_line(&self) -> String {
        let loc = if self.location.is_empty() { "--" } else { &self.location };
        match self.endtime {
            Some(et) => format!(
                "{} {} {} {} {} {}",
                self.network, self.station, loc, self.channel, self.starttime, et
            ),
            None => format!(
                "{} {} {} {} {}",
                self.network, self.station, loc, self.channel, self.starttime
            ),
        }
    }

    /// Duration, treating an open end as `now`.
    pub fn duration(&self) -> Duration {
        let end = self.endtime.unwrap_or_else(Timestamp::now);
        end.duration_since(self.starttime)
    }

    /// `network.station.location.channel` identifier (no times) — used as the
    /// key when merging availability/station results across sub-responses.
    pub fn nslc(&self) -> String {
        format!("{}.{}.{}.{}", self.network, self.station, self.location, self.channel)
    }

    /// Split this epoch's time window into `factor` equal-length
    /// contiguous sub-epochs. `factor` must be >= 2.
    pub fn split(&self, factor: u32) -> Vec<StreamEpoch> {
        debug_assert!(factor >= 2);
        let end = self.endtime.unwrap_or_else(Timestamp::now);
        let total = end.unix_secs() - self.starttime.unix_secs();
        let step = (total / factor as i64).max(1);
        let mut out = Vec::with_capacity(factor as usize);
        let mut cursor = self.starttime.unix_secs();
        for i in 0..factor {
            let seg_end = if i + 1 == factor { end.unix_secs() } else { cursor + step };
            out.push(StreamEpoch {
                network: self.network.clone(),
                station: self.station.clone(),
                location: self.location.clone(),
                channel: self.channel.clone(),
                starttime: Timestamp::from_unix_secs(cursor),
                endtime: Some(Timestamp::from_unix_secs(seg_end)),
            });
            cursor = seg_end;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sncl_line_with_endtime() {
        let se = StreamEpoch::from_sncl_line(
            "CH HASLI -- LHZ 2019-01-01T00:00:00 2019-01-05T00:00:00",
            None,
        )
        .unwrap();
        assert_eq!(se.network, "CH");
        assert_eq!(se.station, "HASLI");
        assert_eq!(se.location, "");
        assert_eq!(se.channel, "LHZ");
        assert_eq!(se.endtime.unwrap().to_iso(), "2019-01-05T00:00:00");
    }

    #[test]
    fn open_end_defaults_when_provided() {
        let default = Timestamp::parse("2020-06-01T00:00:00").unwrap();
        let se = StreamEpoch::from_sncl_line("CH HASLI -- LHZ 2019-01-01T00:00:00", Some(default))
            .unwrap();
        assert_eq!(se.endtime, Some(default));
    }

    #[test]
    fn open_end_stays_open_without_default() {
        let se = StreamEpoch::from_sncl_line("CH HASLI -- LHZ 2019-01-01T00:00:00", None).unwrap();
        assert_eq!(se.endtime, None);
    }

    #[test]
    fn splits_into_contiguous_ranges() {
        let se = StreamEpoch {
            network: "CH".into(),
            station: "HASLI".into(),
            location: String::new(),
            channel: "LHZ".into(),
            starttime: Timestamp::from_unix_secs(0),
            endtime: Some(Timestamp::from_unix_secs(1000)),
        };
        let parts = se.split(4);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].starttime.unix_secs(), 0);
        for w in parts.windows(2) {
            assert_eq!(w[0].endtime.unwrap().unix_secs(), w[1].starttime.unix_secs());
        }
        assert_eq!(parts.last().unwrap().endtime.unwrap().unix_secs(), 1000);
    }

    #[test]
    fn roundtrips_iso_timestamp() {
        let ts = Timestamp::parse("2019-03-17T12:34:56").unwrap();
        assert_eq!(ts.to_iso(), "2019-03-17T12:34:56");
    }
}

//! Positions read from text input, one `lat,lon` pair per line.

use std::time::Duration;

use songtrax_core::{Error, Position, Result};
use songtrax_proximity::ChannelPositionSource;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Parse `lat,lon` (whitespace around either number is fine).
pub fn parse_position(line: &str) -> Result<Position> {
    let (lat, lon) = line
        .split_once(',')
        .ok_or_else(|| Error::InvalidArgument(format!("expected `lat,lon`, got {line:?}")))?;

    let parse = |raw: &str| {
        raw.trim()
            .parse::<f64>()
            .map_err(|e| Error::InvalidArgument(format!("bad coordinate {raw:?}: {e}")))
    };
    let position = Position::new(parse(lat)?, parse(lon)?);

    if !position.is_valid() {
        return Err(Error::InvalidArgument(format!(
            "coordinates out of range: {position}"
        )));
    }
    Ok(position)
}

/// Feed every line of `reader` into `source`, then close it.
///
/// Lines that are blank or start with `#` are skipped; unparseable ones are
/// reported to subscribers as transport errors. After each reading the
/// feeder waits `pace` so the next one is not filtered as too frequent.
pub async fn feed_positions<R>(reader: R, source: &ChannelPositionSource, pace: Duration)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut fed = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read position input: {e}");
                source.push_error(e.to_string());
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_position(line) {
            Ok(position) => {
                source.push(position);
                fed += 1;
                tokio::time::sleep(pace).await;
            }
            Err(e) => source.push_error(e.to_string()),
        }
    }

    debug!("Position input ended after {fed} readings");
    source.close();
}

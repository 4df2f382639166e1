//! Single sequential write-then-read round trip.

use std::path::Path;
use std::time::{Duration, Instant};

use core_crypto::SessionKey;
use core_directio::{self as directio, Channel};

/// Time one full `write_once` + `read_once` on `path`. No retry.
pub fn probe_latency(channel: &Channel, payload: &[u8], key: &SessionKey, path: &Path) -> directio::Result<Duration> {
    let start = Instant::now();
    channel.write_once(payload, key, path)?;
    channel.read_once(path, key)?;
    Ok(start.elapsed())
}

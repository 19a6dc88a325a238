//! Interactive channel selection on stdin.

use std::io::{BufRead, Write};
use tracing::warn;
use xradio_proto::catalog::{Catalog, CatalogEntry};

use crate::error::FatalError;

pub const MAX_ATTEMPTS: u32 = 3;

/// Show the catalog and ask for a channel id until a known one is entered.
/// End of input counts as a failed attempt.
pub fn select_channel<R, W>(catalog: &Catalog, input: &mut R, out: &mut W) -> Result<CatalogEntry, FatalError>
where
    R: BufRead,
    W: Write,
{
    let _ = writeln!(out, "{}", catalog.listing());

    for attempt in 1..=MAX_ATTEMPTS {
        let _ = write!(out, "Enter channel id: ");
        let _ = out.flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => warn!("No channel id entered"),
            Ok(_) => match line.trim().parse::<u64>() {
                Ok(id) => match catalog.get(id) {
                    Some(entry) => return Ok(entry.clone()),
                    None => warn!("Channel {} is not in the list", id),
                },
                Err(_) => warn!("\"{}\" is not a channel id", line.trim()),
            },
            Err(e) => warn!("Couldn't read channel id: {}", e),
        }
        if attempt < MAX_ATTEMPTS {
            let _ = writeln!(out, "Wrong channel id, try again.");
        }
    }
    Err(FatalError::ChannelSelection {
        attempts: MAX_ATTEMPTS,
    })
}

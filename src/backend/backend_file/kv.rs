use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};

use log::error;

use crate::backend::StoreError;

pub type KeyValues = HashMap<String, String>;

/// Reads `key: value` lines, failing if any of `required` is missing.
pub fn read(input: impl Read, required: &[&str]) -> Result<KeyValues, StoreError> {
    let mut kv = HashMap::new();

    for line in BufReader::new(input).lines() {
        let line = line.map_err(|e| {
            error!("couldn't read line: {e}");
            StoreError::Unavailable
        })?;

        let (k, v) = line.split_once(':').ok_or_else(|| {
            error!("invalid line, can't split");
            StoreError::Corrupt
        })?;

        let Some(v) = v.strip_prefix(' ') else {
            error!("invalid line - no whitespace after colon");
            return Err(StoreError::Corrupt);
        };

        kv.insert(k.into(), v.into());
    }

    if let Some(missing) = required.iter().find(|k| !kv.contains_key(**k)) {
        error!("missing key \"{missing}\"");
        return Err(StoreError::Corrupt);
    }

    Ok(kv)
}

/// Writes in a fixed key order so files diff cleanly.
pub fn write(mut output: impl Write, keyvalues: &KeyValues) -> Result<(), std::io::Error> {
    let mut keys: Vec<_> = keyvalues.keys().collect();
    keys.sort();

    for k in keys {
        writeln!(output, "{}: {}", k, keyvalues[k])?;
    }
    Ok(())
}

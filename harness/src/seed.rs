//! Synthetic item generation and table seeding

use std::path::Path;

use querybench_shared::Item;
use rand::Rng;
use tracing::info;

use crate::error::SeedError;
use crate::store::{KeySchema, TableAdmin, MAX_BATCH_WRITE};

/// Characters random attribute values are drawn from
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Width of the zero-padded sort key
pub const SORT_ID_WIDTH: usize = 10;

/// Ordered list of `(attribute name, value length)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<(String, usize)>,
}

impl Schema {
    /// Parse `name,length` lines. Blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, SeedError> {
        let mut fields = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = index + 1;

            let (name, length) = line.split_once(',').ok_or_else(|| SeedError::Parse {
                line: line_no,
                reason: format!("expected 'name,length', got '{}'", line),
            })?;

            let name = name.trim();
            if name.is_empty() {
                return Err(SeedError::Parse {
                    line: line_no,
                    reason: "empty field name".to_string(),
                });
            }

            let length = length.trim().parse::<usize>().map_err(|e| SeedError::Parse {
                line: line_no,
                reason: format!("invalid length '{}': {}", length.trim(), e),
            })?;

            // Later lines win, like a dict built line by line
            match fields.iter_mut().find(|(n, _)| n == name) {
                Some(field) => field.1 = length,
                None => fields.push((name.to_string(), length)),
            }
        }

        Ok(Self { fields })
    }

    pub fn from_file(path: &Path) -> Result<Self, SeedError> {
        let text = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Reject fields that would overwrite a key attribute
    pub fn check_reserved(&self, key_schema: &KeySchema) -> Result<(), SeedError> {
        match self
            .fields
            .iter()
            .find(|(name, _)| key_schema.is_key_attribute(name))
        {
            Some((name, _)) => Err(SeedError::ReservedField(name.clone())),
            None => Ok(()),
        }
    }

    pub fn fields(&self) -> &[(String, usize)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Random string of `len` characters over `A-Z0-9`
pub fn random_string<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Sort key for the `seq`-th item (1-based)
pub fn sort_id(seq: u64) -> String {
    format!("{:0width$}", seq, width = SORT_ID_WIDTH)
}

pub fn generate_item<R: Rng + ?Sized>(
    rng: &mut R,
    key_schema: &KeySchema,
    partition_key: &str,
    seq: u64,
    schema: &Schema,
) -> Item {
    let mut item = Item::with_capacity(schema.len() + 2);
    item.insert(key_schema.partition_key.clone(), partition_key.to_string());
    item.insert(key_schema.sort_key.clone(), sort_id(seq));
    for (name, len) in schema.fields() {
        item.insert(name.clone(), random_string(rng, *len));
    }
    item
}

/// Write `count` generated items under `partition_key` in batches.
///
/// `on_written` receives the running total after each batch.
pub async fn seed_table<A, R, P>(
    admin: &A,
    schema: &Schema,
    partition_key: &str,
    count: u64,
    rng: &mut R,
    mut on_written: P,
) -> Result<u64, SeedError>
where
    A: TableAdmin + ?Sized,
    R: Rng + ?Sized,
    P: FnMut(u64),
{
    let key_schema = admin.key_schema();
    schema.check_reserved(key_schema)?;

    info!(
        "Seeding table with {} items ({} attributes each)...",
        count,
        schema.len()
    );

    let mut written = 0u64;
    let mut batch = Vec::with_capacity(MAX_BATCH_WRITE);
    for seq in 1..=count {
        batch.push(generate_item(rng, key_schema, partition_key, seq, schema));
        if batch.len() == MAX_BATCH_WRITE || seq == count {
            let len = batch.len() as u64;
            admin.put_items(std::mem::take(&mut batch)).await?;
            written += len;
            on_written(written);
        }
    }

    info!("Wrote {} items to table.", written);
    Ok(written)
}

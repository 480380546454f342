use crate::error::{MarketError, Result};
use crate::storage::Transaction;
use crate::types::FileRecord;
use ethers::types::Address;
use log::debug;

fn file_key(owner: &Address, id: u64) -> Vec<u8> {
    format!("file:{:?}:{:020}", owner, id).into_bytes()
}

fn file_scope(owner: &Address) -> Vec<u8> {
    format!("file:{:?}:", owner).into_bytes()
}

fn file_seq_key(owner: &Address) -> Vec<u8> {
    format!("seq:file:{:?}", owner).into_bytes()
}

fn not_found(owner: &Address, id: u64) -> MarketError {
    MarketError::NotFound(format!("file #{} of {:?}", id, owner))
}

/// Uploaded file records, scoped by owner. Authorization is the caller's
/// job; the order book is the only writer.
#[derive(Debug, Clone, Default)]
pub struct FileRegistry;

impl FileRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn create(
        &self,
        tx: &mut Transaction<'_>,
        owner: Address,
        content_hash: String,
    ) -> Result<FileRecord> {
        let id = tx.next_id(file_seq_key(&owner))?;
        let record = FileRecord {
            id,
            content_hash,
            owner,
            pub_key: String::new(),
        };
        tx.put(file_key(&owner, id), &record)?;
        debug!("(files) created file #{} for {:?}", id, owner);
        Ok(record)
    }

    /// Overwrites any key already attached
    pub fn attach_key(
        &self,
        tx: &mut Transaction<'_>,
        owner: &Address,
        id: u64,
        pub_key: String,
    ) -> Result<FileRecord> {
        let key = file_key(owner, id);
        let mut record = tx
            .get::<FileRecord>(&key)?
            .ok_or_else(|| not_found(owner, id))?;
        record.pub_key = pub_key;
        tx.put(key, &record)?;
        Ok(record)
    }

    pub fn remove(&self, tx: &mut Transaction<'_>, owner: &Address, id: u64) -> Result<FileRecord> {
        let key = file_key(owner, id);
        let record = tx
            .get::<FileRecord>(&key)?
            .ok_or_else(|| not_found(owner, id))?;
        tx.delete(key);
        debug!("(files) removed file #{} of {:?}", id, owner);
        Ok(record)
    }

    pub fn get(&self, tx: &Transaction<'_>, owner: &Address, id: u64) -> Result<FileRecord> {
        tx.get::<FileRecord>(&file_key(owner, id))?
            .ok_or_else(|| not_found(owner, id))
    }

    pub fn by_owner(&self, tx: &Transaction<'_>, owner: &Address) -> Result<Vec<FileRecord>> {
        Ok(tx.scan::<FileRecord>(&file_scope(owner))?)
    }
}

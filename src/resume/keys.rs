/// Key layout for the resume store partitions
///
/// - `resume`: resume:{item_id:020} -> engine resume blob
/// - `metadata`: meta:failure:{item_id:020} -> last failure message
use crate::model::ItemId;

const RESUME_PREFIX: &str = "resume:";
const FAILURE_PREFIX: &str = "meta:failure:";

/// Encode a resume key: resume:{item_id:020}
pub fn encode_resume_key(item: ItemId) -> Vec<u8> {
    format!("{}{:020}", RESUME_PREFIX, item.0).into_bytes()
}

/// Decode a resume key back to its item id
pub fn decode_resume_key(key: &[u8]) -> Option<ItemId> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str
        .strip_prefix(RESUME_PREFIX)?
        .parse()
        .ok()
        .map(ItemId)
}

/// Encode a failure note key: meta:failure:{item_id:020}
pub fn encode_failure_key(item: ItemId) -> Vec<u8> {
    format!("{}{:020}", FAILURE_PREFIX, item.0).into_bytes()
}

use crate::error::Error;
use crate::fixed::{copy_truncating, str_until_nul};
use crate::portal::FixedField;
use crate::record::checksum;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::mem::size_of;

pub const MAX_ID_LEN: usize = 5;
pub const MAX_LABEL_LEN: usize = 16;

/// An application defined configuration item beyond the fixed record.
///
/// The backing buffer is owned by the application. Its length is the maximum length of the value,
/// the value itself is null-padded like the fixed record fields.
pub struct DynamicField<'a> {
    id: &'a str,
    label: &'a str,
    data: &'a mut [u8],
}

impl<'a> DynamicField<'a> {
    /// Usage: `DynamicField::new("mqtt", "MQTT Server", &mut mqtt_server)`
    ///
    /// Panics if the id is empty or longer than [`MAX_ID_LEN`], or if the label is longer than
    /// [`MAX_LABEL_LEN`]. The id must not be one of the [`FixedField`] keys either: the portal
    /// would route its updates to the fixed field and never complete.
    pub fn new(id: &'a str, label: &'a str, data: &'a mut [u8]) -> Self {
        assert!(!id.is_empty() && id.len() <= MAX_ID_LEN);
        assert!(label.len() <= MAX_LABEL_LEN);
        assert!(
            id.parse::<FixedField>().is_err(),
            "dynamic field id is a fixed field key"
        );
        Self { id, label, data }
    }

    pub fn id(&self) -> &str {
        self.id
    }

    pub fn label(&self) -> &str {
        self.label
    }

    pub fn max_len(&self) -> usize {
        self.data.len()
    }

    pub fn value(&self) -> &str {
        str_until_nul(self.data)
    }

    /// Overwrites the value, truncated to [`max_len`](Self::max_len).
    pub fn set(&mut self, value: &str) {
        copy_truncating(self.data, value);
    }

    pub(crate) fn raw(&self) -> &[u8] {
        self.data
    }
}

impl fmt::Debug for DynamicField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicField")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("value", &self.value())
            .finish()
    }
}

/// The ordered set of dynamic fields, persisted as one blob: every buffer at its full length,
/// concatenated, followed by the additive checksum of those bytes (u32, little endian).
#[derive(Debug, Default)]
pub struct DynamicFields<'a> {
    fields: Vec<DynamicField<'a>>,
}

impl<'a> DynamicFields<'a> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Panics if a field with the same id was pushed before.
    pub fn push(&mut self, field: DynamicField<'a>) {
        assert!(self.find(field.id).is_none(), "duplicate dynamic field id");
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynamicField<'a>> {
        self.fields.iter()
    }

    pub fn find(&self, id: &str) -> Option<&DynamicField<'a>> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut DynamicField<'a>> {
        self.fields.iter_mut().find(|f| f.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    /// Length of the data part of the blob, without the checksum.
    pub fn data_len(&self) -> usize {
        self.fields.iter().map(DynamicField::max_len).sum()
    }

    pub fn blob_len(&self) -> usize {
        self.data_len() + size_of::<u32>()
    }

    pub fn checksum(&self) -> u32 {
        self.fields
            .iter()
            .fold(0u32, |acc, f| acc.wrapping_add(checksum(f.raw())))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.blob_len());
        for field in &self.fields {
            blob.extend_from_slice(field.raw());
        }
        blob.extend_from_slice(&self.checksum().to_le_bytes());
        blob
    }

    /// Verifies a stored blob and copies it into the field buffers. The buffers are left
    /// untouched when the blob does not verify.
    pub fn decode(&mut self, blob: &[u8]) -> Result<(), Error> {
        let data_len = self.data_len();
        if blob.len() != self.blob_len() {
            warn!(
                "dynamic: blob length {} does not match fields {}",
                blob.len(),
                self.blob_len()
            );
            return Err(Error::DynamicDataInvalid);
        }

        let (data, stored) = blob.split_at(data_len);
        let mut stored_bytes = [0u8; size_of::<u32>()];
        stored_bytes.copy_from_slice(stored);
        let stored = u32::from_le_bytes(stored_bytes);
        let calculated = checksum(data);
        if stored != calculated {
            warn!(
                "dynamic: checksum mismatch, stored {:#x} calculated {:#x}",
                stored,
                calculated
            );
            return Err(Error::DynamicDataInvalid);
        }

        let mut offset = 0;
        for field in &mut self.fields {
            let len = field.max_len();
            field.data.copy_from_slice(&data[offset..offset + len]);
            offset += len;
        }
        Ok(())
    }

    /// Writes back values staged in a portal session, in field order.
    pub(crate) fn apply(&mut self, values: &[Vec<u8>]) {
        for (field, value) in self.fields.iter_mut().zip(values) {
            let len = field.max_len().min(value.len());
            field.data[..len].copy_from_slice(&value[..len]);
            field.data[len..].fill(0);
        }
    }

    /// Empty buffers for every field, each sized like the field it stages.
    pub(crate) fn staging(&self) -> Vec<Vec<u8>> {
        self.fields.iter().map(|f| vec![0u8; f.max_len()]).collect()
    }

    pub fn set_blank(&mut self) {
        for field in &mut self.fields {
            field.set(crate::record::BLANK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_truncated_and_padded() {
        let mut buf = [0xaau8; 6];
        let mut field = DynamicField::new("mq", "MQTT", &mut buf);
        field.set("broker.local");
        assert_eq!(field.value(), "broker");
        field.set("ab");
        assert_eq!(field.raw(), b"ab\0\0\0\0");
    }

    #[test]
    #[should_panic(expected = "dynamic field id is a fixed field key")]
    fn fixed_field_key_is_rejected() {
        let mut buf = [0u8; 6];
        DynamicField::new("pt", "Port", &mut buf);
    }

    #[test]
    #[should_panic(expected = "duplicate dynamic field id")]
    fn duplicate_id_is_rejected() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        let mut fields = DynamicFields::new();
        fields.push(DynamicField::new("mqtt", "MQTT", &mut a));
        fields.push(DynamicField::new("mqtt", "MQTT again", &mut b));
    }

    #[test]
    fn corrupt_blob_leaves_buffers_alone() {
        let mut a = *b"old\0";
        let mut fields = DynamicFields::new();
        fields.push(DynamicField::new("a", "A", &mut a));

        let mut blob = vec![b'n', b'e', b'w', 0];
        blob.extend_from_slice(&(checksum(b"new") + 1).to_le_bytes());
        assert_eq!(fields.decode(&blob), Err(Error::DynamicDataInvalid));
        assert_eq!(fields.find("a").map(DynamicField::value), Some("old"));

        let short = [0u8; 3];
        assert_eq!(fields.decode(&short), Err(Error::DynamicDataInvalid));
    }

    #[test]
    fn checksum_spans_all_buffers() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 8];
        let mut fields = DynamicFields::new();
        fields.push(DynamicField::new("a", "A", &mut a));
        fields.push(DynamicField::new("b", "B", &mut b));
        if let Some(f) = fields.find_mut("a") {
            f.set("xy");
        }
        if let Some(f) = fields.find_mut("b") {
            f.set("z");
        }

        let blob = fields.encode();
        assert_eq!(blob.len(), 4 + 8 + 4);
        let expected = u32::from(b'x') + u32::from(b'y') + u32::from(b'z');
        assert_eq!(&blob[12..], &expected.to_le_bytes()[..]);
    }
}

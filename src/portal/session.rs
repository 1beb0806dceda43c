use crate::dynamic::DynamicFields;
use crate::fixed::copy_truncating;
use crate::portal::FixedField;
use crate::record::{
    AuthToken, BoardName, ConfigRecord, DEFAULT_CLOUD_PORT, Password, ServerAddress, Ssid,
};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use strum::{EnumCount, IntoEnumIterator};

/// Identity of a field the portal accepts updates for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldKey {
    Fixed(FixedField),
    /// Index into the dynamic fields.
    Dynamic(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateOutcome {
    /// The key does not name any field, nothing changed.
    UnknownField,
    Updated,
    /// Every required field has now been received at least once.
    Complete,
}

/// The state of one config mode activation. Collects field updates in RAM, nothing is written
/// to the medium until every field has been received.
#[derive(Debug, Clone)]
pub struct PortalSession {
    record: ConfigRecord,
    dynamic_ids: Vec<String>,
    dynamic_values: Vec<Vec<u8>>,
    updated: BTreeMap<FieldKey, bool>,
    updated_count: usize,
    page_served: bool,
}

impl PortalSession {
    /// Starts from an all-zero record carrying `header`, so fields that are never sent can not
    /// leak stale values into the commit.
    pub fn new(header: &str, fields: &DynamicFields<'_>) -> Self {
        let mut updated = BTreeMap::new();
        for field in FixedField::iter() {
            updated.insert(FieldKey::Fixed(field), false);
        }
        for index in 0..fields.len() {
            updated.insert(FieldKey::Dynamic(index), false);
        }

        Self {
            record: ConfigRecord::zeroed(header),
            dynamic_ids: fields.iter().map(|f| String::from(f.id())).collect(),
            dynamic_values: fields.staging(),
            updated,
            updated_count: 0,
            page_served: false,
        }
    }

    /// Number of fields that have to be received before the session commits.
    pub fn required_count(&self) -> usize {
        FixedField::COUNT + self.dynamic_ids.len()
    }

    pub fn updated_count(&self) -> usize {
        self.updated_count
    }

    pub fn is_updated(&self, key: FieldKey) -> bool {
        self.updated.get(&key).copied().unwrap_or(false)
    }

    pub fn is_complete(&self) -> bool {
        self.updated_count == self.required_count()
    }

    /// The form has been fetched or a field has been sent.
    pub fn is_in_use(&self) -> bool {
        self.page_served || self.updated_count > 0
    }

    pub(crate) fn mark_page_served(&mut self) {
        self.page_served = true;
    }

    pub fn record(&self) -> &ConfigRecord {
        &self.record
    }

    pub fn dynamic_value(&self, id: &str) -> Option<&str> {
        let index = self.dynamic_ids.iter().position(|i| i == id)?;
        Some(crate::fixed::str_until_nul(&self.dynamic_values[index]))
    }

    pub(crate) fn dynamic_values(&self) -> &[Vec<u8>] {
        &self.dynamic_values
    }

    fn resolve(&self, key: &str) -> Option<FieldKey> {
        if let Ok(field) = key.parse::<FixedField>() {
            return Some(FieldKey::Fixed(field));
        }
        self.dynamic_ids
            .iter()
            .position(|id| id == key)
            .map(FieldKey::Dynamic)
    }

    /// Stores `value` in the field named `key`, truncated to the field length. The first update
    /// of a field counts towards completion, repeated updates only overwrite the value.
    pub fn update(&mut self, key: &str, value: &str) -> UpdateOutcome {
        let Some(field) = self.resolve(key) else {
            warn!("portal: unknown field {}", key);
            return UpdateOutcome::UnknownField;
        };

        match field {
            FieldKey::Fixed(fixed) => self.set_fixed(fixed, value),
            FieldKey::Dynamic(index) => copy_truncating(&mut self.dynamic_values[index], value),
        }

        let seen = self.updated.entry(field).or_insert(false);
        if !*seen {
            *seen = true;
            self.updated_count += 1;
        }
        trace!(
            "portal: {} updated, {} of {} fields",
            key,
            self.updated_count,
            self.required_count()
        );

        if self.is_complete() {
            UpdateOutcome::Complete
        } else {
            UpdateOutcome::Updated
        }
    }

    fn set_fixed(&mut self, field: FixedField, value: &str) {
        let record = &mut self.record;
        match field {
            FixedField::WifiSsid0 => record.wifi[0].ssid = Ssid::truncating(value),
            FixedField::WifiPassword0 => record.wifi[0].password = Password::truncating(value),
            FixedField::WifiSsid1 => record.wifi[1].ssid = Ssid::truncating(value),
            FixedField::WifiPassword1 => record.wifi[1].password = Password::truncating(value),
            FixedField::Server0 => record.cloud[0].server = ServerAddress::truncating(value),
            FixedField::Token0 => record.cloud[0].token = AuthToken::truncating(value),
            FixedField::Server1 => record.cloud[1].server = ServerAddress::truncating(value),
            FixedField::Token1 => record.cloud[1].token = AuthToken::truncating(value),
            FixedField::Port => record.port = parse_port(value),
            FixedField::BoardName => record.board_name = BoardName::truncating(value),
        }
    }
}

fn parse_port(value: &str) -> u16 {
    match value.trim().parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            warn!("portal: invalid port {}, using {}", value, DEFAULT_CLOUD_PORT);
            DEFAULT_CLOUD_PORT
        }
    }
}

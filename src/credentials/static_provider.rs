//! Provider wrapping a fixed credential record.

use super::{CredentialError, CredentialProvider, CredentialRecord};

/// Always answers with the record it was built with.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    record: CredentialRecord,
}

impl StaticProvider {
    pub fn new(record: CredentialRecord) -> Self {
        Self { record }
    }
}

impl CredentialProvider for StaticProvider {
    fn name(&self) -> String {
        "static".to_string()
    }

    fn get_credentials(&self) -> Result<CredentialRecord, CredentialError> {
        if !self.record.is_usable() {
            return Err(CredentialError::Missing("host".to_string()));
        }
        Ok(self.record.clone())
    }

    fn refresh(&self) {}
}

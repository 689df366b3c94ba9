//! Small shared newtypes.

use crate::error::{BrokerError, BrokerResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey(String);

impl RouteKey {
    pub fn parse(raw: &str) -> BrokerResult<RouteKey> {
        if raw.is_empty() {
            return Err(BrokerError::EmptyRoute);
        }
        Ok(RouteKey(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

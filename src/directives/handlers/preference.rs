//! `set_preference(key, value)` / `get_preference(key)`

use async_trait::async_trait;

use crate::core::DirectiveError;
use crate::directives::registry::{Args, DirectiveContext, DirectiveHandler};
use crate::directives::DirectiveEvent;
use crate::memory::PreferenceStore;

pub struct SetPreference {
    store: PreferenceStore,
}

impl SetPreference {
    pub fn new(store: PreferenceStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DirectiveHandler for SetPreference {
    fn name(&self) -> &str {
        "set_preference"
    }

    fn description(&self) -> &str {
        "set_preference(key, value): remember a user preference"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        _ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(2, 2)?;
        let key = args.text(0)?;
        let value = args.text(1)?;
        self.store
            .set(key, value)
            .map_err(|e| DirectiveError::Preference(e.to_string()))?;
        Ok(vec![DirectiveEvent::status(format!("Preference '{}' set", key))])
    }
}

pub struct GetPreference {
    store: PreferenceStore,
}

impl GetPreference {
    pub fn new(store: PreferenceStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DirectiveHandler for GetPreference {
    fn name(&self) -> &str {
        "get_preference"
    }

    fn description(&self) -> &str {
        "get_preference(key): look up a stored preference"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        _ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(1, 1)?;
        let key = args.text(0)?;
        let message = match self
            .store
            .get(key)
            .map_err(|e| DirectiveError::Preference(e.to_string()))?
        {
            Some(value) => format!("Preference '{}' = {}", key, value),
            None => format!("Preference '{}' is not set", key),
        };
        Ok(vec![DirectiveEvent::status(message)])
    }
}

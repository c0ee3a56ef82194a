use std::collections::HashMap;

use courier_common::ChannelKind;

use crate::adapter::ChannelAdapter;

/// Registry of the loaded channel adapters, keyed by channel kind.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChannelKind, Box<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Box<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: ChannelKind) -> Option<&dyn ChannelAdapter> {
        self.adapters.get(&kind).map(|a| a.as_ref())
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.adapters.keys().copied().collect()
    }
}

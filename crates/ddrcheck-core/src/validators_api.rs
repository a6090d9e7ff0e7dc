use crate::cancel::CancellationToken;
use crate::model::ErrorMap;
use crate::storage::ExtractorFile;
use std::sync::Arc;

/// Outcome of a validator that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Completed(ErrorMap),
    Aborted,
}

impl Validation {
    pub fn ok() -> Self {
        Validation::Completed(ErrorMap::new())
    }
}

/// One check applied to one file.
///
/// Implementations run on a blocking thread and should poll `cancel`
/// between fields and between emitted rows, returning
/// [`Validation::Aborted`] once it fires.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(
        &self,
        file: &ExtractorFile,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Validation>;
}

pub type ValidatorCtor = fn() -> Arc<dyn Validator>;

/// Ordered id -> constructor table. Order defines matrix columns.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    entries: Vec<(&'static str, ValidatorCtor)>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `ctor` under `id`, replacing an earlier entry with that id.
    pub fn register(&mut self, id: &'static str, ctor: ValidatorCtor) -> &mut Self {
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = ctor,
            None => self.entries.push((id, ctor)),
        }
        self
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn create(&self, id: &str) -> Option<Arc<dyn Validator>> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, ctor)| ctor())
    }

    /// One fresh instance of every registered validator, in order.
    pub fn instantiate(&self) -> Vec<Arc<dyn Validator>> {
        self.entries.iter().map(|(_, ctor)| ctor()).collect()
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
